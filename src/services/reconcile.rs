//! Reconciliation of asynchronous payment notifications.
//!
//! One invocation per webhook delivery; deliveries may repeat or run
//! concurrently across workers sharing the store (at-least-once
//! semantics). Correctness comes from the store's conditional
//! PENDING→PAID write, not from in-process locking: at most one delivery
//! per payment record gets to materialize an order, every other delivery
//! resolves to an idempotent OK.

use crate::error::AppError;
use crate::models::{generate_confirmation_code, Order, Payment, PaymentStatus, ProductType};
use crate::services::cart::CartStore;
use crate::services::catalog::ProductCatalog;
use crate::services::mail::{ConfirmationEmail, ConfirmationMailer, EmailLineItem};
use crate::services::metrics::{record_ipn_outcome, record_order_confirmed};
use crate::services::repository::{OrderStore, PaymentStore};
use crate::services::verifier::{GatewayOrderStatus, NotificationVerifier};
use std::sync::Arc;
use uuid::Uuid;

const PAYMENT_METHOD_LABEL: &str = "IZIPAY";

/// Handler-visible outcome of one delivery. Both map to HTTP 2xx: the
/// gateway only needs an acknowledgment, and rejections must not leak
/// verification details to an unauthenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnOutcome {
    Ok,
    Ignored,
}

pub struct ReconciliationService {
    verifier: NotificationVerifier,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn ProductCatalog>,
    mailer: Arc<dyn ConfirmationMailer>,
}

impl ReconciliationService {
    pub fn new(
        verifier: NotificationVerifier,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn ProductCatalog>,
        mailer: Arc<dyn ConfirmationMailer>,
    ) -> Self {
        Self {
            verifier,
            payments,
            orders,
            carts,
            catalog,
            mailer,
        }
    }

    /// Process one raw webhook delivery.
    pub async fn reconcile(&self, raw_body: &[u8]) -> Result<IpnOutcome, AppError> {
        let outcome = self.reconcile_inner(raw_body).await?;
        record_ipn_outcome(match outcome {
            IpnOutcome::Ok => "ok",
            IpnOutcome::Ignored => "ignored",
        });
        Ok(outcome)
    }

    async fn reconcile_inner(&self, raw_body: &[u8]) -> Result<IpnOutcome, AppError> {
        if raw_body.is_empty() {
            return Ok(IpnOutcome::Ignored);
        }

        // Sole authentication gate on this path: there is no session or
        // caller identity, only the signature.
        let notification = match self.verifier.verify(raw_body) {
            Ok(n) => n,
            Err(rejection) => {
                tracing::warn!(reason = %rejection, "IPN rejected");
                return Ok(IpnOutcome::Ignored);
            }
        };

        if notification.answer.order_status != GatewayOrderStatus::Paid {
            tracing::debug!("IPN for non-PAID status, ignoring");
            return Ok(IpnOutcome::Ignored);
        }

        let Some(gateway_order_id) = notification
            .answer
            .order_details
            .as_ref()
            .and_then(|d| d.order_id.clone())
        else {
            tracing::warn!("PAID IPN without an order id, ignoring");
            return Ok(IpnOutcome::Ignored);
        };

        let Some(payment) = self
            .payments
            .find_by_gateway_order_id(&gateway_order_id)
            .await?
        else {
            tracing::warn!(
                gateway_order_id = %gateway_order_id,
                "IPN references an untracked payment, ignoring"
            );
            return Ok(IpnOutcome::Ignored);
        };

        // Idempotency gate, fast path: a redelivered notification for an
        // already-confirmed payment acknowledges without side effects.
        if payment.status == PaymentStatus::Paid {
            tracing::info!(payment_id = %payment.id, "Payment already confirmed, duplicate IPN");
            return Ok(IpnOutcome::Ok);
        }

        // Pre-assign the order id so the promotion to PAID and the order
        // reference land in one conditional write. If the write does not
        // apply, a concurrent delivery won the race and the order either
        // exists or is about to; nothing more to do here.
        let order_id = Uuid::new_v4();
        let transaction_uuid = notification
            .answer
            .transactions
            .first()
            .and_then(|t| t.uuid.clone());

        let claimed = self
            .payments
            .mark_paid_if_pending(
                payment.id,
                order_id,
                transaction_uuid.as_deref(),
                &notification.raw_answer,
            )
            .await?;

        if !claimed {
            tracing::info!(payment_id = %payment.id, "Lost promotion race, duplicate IPN");
            return Ok(IpnOutcome::Ok);
        }

        let order = Order::from_draft(
            order_id,
            &payment.order_draft,
            PAYMENT_METHOD_LABEL,
            generate_confirmation_code(),
        );
        self.orders.insert(&order).await?;

        record_order_confirmed(&order.currency);
        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            confirmation_code = %order.confirmation_code,
            "Payment confirmed"
        );

        // Downstream effects are best-effort: the durable state (payment
        // PAID + order created) already succeeded.
        self.dispatch_side_effects(&payment, &order).await;

        Ok(IpnOutcome::Ok)
    }

    async fn dispatch_side_effects(&self, payment: &Payment, order: &Order) {
        let email = self.build_confirmation_email(payment, order).await;

        let sent = if payment.user_id.is_some() {
            self.mailer.send_payment_confirmation(&email).await
        } else {
            self.mailer.send_guest_payment_confirmation(&email).await
        };
        if let Err(e) = sent {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Failed to send confirmation email"
            );
        }

        if let Some(user_id) = payment.user_id.as_deref() {
            if let Err(e) = self.carts.clear_open_cart_by_user_id(user_id).await {
                tracing::error!(user_id = %user_id, error = %e, "Failed to clear user cart");
            }
        } else if let Some(session_id) = payment.session_id.as_deref() {
            if let Err(e) = self.carts.clear_open_cart_by_session_id(session_id).await {
                tracing::error!(session_id = %session_id, error = %e, "Failed to clear guest cart");
            }
        }
    }

    /// Build the display-ready email, enriching line items with product
    /// titles. Every lookup degrades to a placeholder instead of failing.
    async fn build_confirmation_email(&self, payment: &Payment, order: &Order) -> ConfirmationEmail {
        let mut items = Vec::with_capacity(order.items.len());

        for item in &order.items {
            let name = match self
                .catalog
                .product_title(item.product_type, &item.product_id)
                .await
            {
                Ok(Some(title)) => title,
                Ok(None) => placeholder_name(item.product_type),
                Err(e) => {
                    tracing::warn!(
                        product_id = %item.product_id,
                        error = %e,
                        "Product lookup failed, using placeholder"
                    );
                    placeholder_name(item.product_type)
                }
            };

            let quantity = item.adults.unwrap_or(0)
                + item.children.unwrap_or(0)
                + item.infants.unwrap_or(0);
            let quantity = if quantity == 0 { 1 } else { quantity };

            let date = item
                .travel_date
                .map(|d| d.format("%d-%m-%Y").to_string())
                .unwrap_or_default();

            items.push(EmailLineItem {
                name,
                quantity,
                date,
                unit_price: item.unit_price,
                total_price: item.total_price,
            });
        }

        ConfirmationEmail {
            to: payment.order_draft.customer_email.clone(),
            customer_name: payment.order_draft.customer_name.clone(),
            order_id: order.id.to_string(),
            confirmation_code: order.confirmation_code.clone(),
            total: order.grand_total,
            currency: order.currency.clone(),
            items,
        }
    }
}

fn placeholder_name(product_type: ProductType) -> String {
    match product_type {
        ProductType::Tour => "Tour".to_string(),
        ProductType::Transport => "Transport".to_string(),
    }
}
