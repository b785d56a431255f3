use crate::models::{Order, OrderStatus, Payment, PaymentStatus, ProductType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One line of an order draft. Prices are frozen at cart time and copied
/// verbatim into the confirmed order.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    pub product_id: String,
    pub product_type: ProductType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub adults: Option<u32>,
    #[serde(default)]
    pub children: Option<u32>,
    #[serde(default)]
    pub infants: Option<u32>,
    #[validate(range(min = 0.0))]
    pub unit_price: f64,
    #[validate(range(min = 0.0))]
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_offer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

/// The order-creation payload captured at form-token time. Stored inside
/// the payment record unmodified until confirmation.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[validate(length(min = 1))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<DraftItem>,
    #[validate(range(min = 0.0))]
    pub subtotal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub discount_total: Option<f64>,
    #[validate(range(min = 0.0))]
    pub grand_total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Request for a hosted-payment form token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    #[validate(nested)]
    pub order_data: OrderDraft,
    /// Guest cart handle, used to clear the cart after confirmation.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Authenticated user id; a bearer token on the request takes
    /// precedence over this field.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub form_token: String,
    pub public_key: String,
    pub payment_id: Uuid,
}

/// Webhook acknowledgment. Always delivered with a 2xx status; the body
/// is informational only.
#[derive(Debug, Serialize)]
pub struct IpnResponse {
    pub status: &'static str,
}

impl IpnResponse {
    pub fn ok() -> Self {
        Self { status: "OK" }
    }

    pub fn ignored() -> Self {
        Self { status: "IGNORED" }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub order_id: Option<Uuid>,
    pub gateway_order_id: Option<String>,
    pub transaction_uuid: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            order_id: p.order_id,
            gateway_order_id: p.gateway_order_id,
            transaction_uuid: p.transaction_uuid,
            created_at: p.created_at.to_string(),
            updated_at: p.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub items: Vec<DraftItem>,
    pub subtotal: f64,
    pub discount_total: f64,
    pub grand_total: f64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub confirmation_code: String,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            user_id: o.user_id,
            customer_name: o.customer_name,
            customer_email: o.customer_email,
            customer_phone: o.customer_phone,
            items: o.items,
            subtotal: o.subtotal,
            discount_total: o.discount_total,
            grand_total: o.grand_total,
            currency: o.currency,
            status: o.status,
            payment_status: o.payment_status,
            payment_method: o.payment_method,
            confirmation_code: o.confirmation_code,
            created_at: o.created_at.to_string(),
        }
    }
}
