//! Transactional email dispatch over a Brevo-style HTTP API.
//!
//! Invoked by the reconciliation engine after an order is confirmed.
//! Failures here must never roll back the order or the payment record;
//! the engine logs and swallows them.

use crate::config::MailConfig;
use crate::error::AppError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::json;
use std::time::Duration;

/// Display-ready line item for the confirmation email.
#[derive(Debug, Clone)]
pub struct EmailLineItem {
    pub name: String,
    pub quantity: u32,
    pub date: String,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone)]
pub struct ConfirmationEmail {
    pub to: String,
    pub customer_name: String,
    pub order_id: String,
    pub confirmation_code: String,
    pub total: f64,
    pub currency: String,
    pub items: Vec<EmailLineItem>,
}

#[async_trait]
pub trait ConfirmationMailer: Send + Sync {
    /// Confirmation for a registered user.
    async fn send_payment_confirmation(&self, email: &ConfirmationEmail) -> Result<(), AppError>;

    /// Confirmation for a guest checkout.
    async fn send_guest_payment_confirmation(
        &self,
        email: &ConfirmationEmail,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct MailClient {
    client: Client,
    config: MailConfig,
}

impl MailClient {
    /// The send is awaited on the webhook path, so the HTTP client gets a
    /// bounded timeout; a slow mail API must not stall the acknowledgment.
    pub fn new(config: MailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    async fn send(&self, to: &str, to_name: &str, subject: &str, html: String) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::debug!(to = %to, subject = %subject, "Mail disabled, skipping send");
            return Ok(());
        }

        let body = json!({
            "sender": {
                "email": self.config.from_email,
                "name": self.config.from_name,
            },
            "to": [{ "email": to, "name": to_name }],
            "subject": subject,
            "htmlContent": html,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .header("api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::EmailError(format!(
                "Mail API returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn items_table(items: &[EmailLineItem]) -> String {
        let rows: String = items
            .iter()
            .map(|i| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>",
                    i.name, i.quantity, i.date, i.unit_price, i.total_price
                )
            })
            .collect();

        format!(
            "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\">\
             <tr><th>Item</th><th>Qty</th><th>Date</th><th>Unit</th><th>Total</th></tr>{}</table>",
            rows
        )
    }

    fn customer_html(&self, email: &ConfirmationEmail) -> String {
        format!(
            "<html><body>\
             <h2>Payment confirmed</h2>\
             <p>Hello {name},</p>\
             <p>Your booking is confirmed.</p>\
             <p><strong>Confirmation code:</strong> {code}</p>\
             <p><strong>Order:</strong> {order}</p>\
             {items}\
             <p><strong>Total:</strong> {total:.2} {currency}</p>\
             </body></html>",
            name = email.customer_name,
            code = email.confirmation_code,
            order = email.order_id,
            items = Self::items_table(&email.items),
            total = email.total,
            currency = email.currency,
        )
    }

    fn admin_html(&self, email: &ConfirmationEmail, guest: bool) -> String {
        format!(
            "<html><body>\
             <h2>New order registered{guest_tag}</h2>\
             <p><strong>Customer:</strong> {name}</p>\
             <p><strong>Email:</strong> {to}</p>\
             <p><strong>Order:</strong> {order}</p>\
             <p><strong>Confirmation code:</strong> {code}</p>\
             <p><strong>Total:</strong> {total:.2} {currency}</p>\
             </body></html>",
            guest_tag = if guest { " (guest)" } else { "" },
            name = email.customer_name,
            to = email.to,
            order = email.order_id,
            code = email.confirmation_code,
            total = email.total,
            currency = email.currency,
        )
    }

    async fn send_confirmation(
        &self,
        email: &ConfirmationEmail,
        guest: bool,
    ) -> Result<(), AppError> {
        let subject = if guest {
            "Payment confirmed - your booking"
        } else {
            "Payment confirmed - booking receipt"
        };

        self.send(
            &email.to,
            &email.customer_name,
            subject,
            self.customer_html(email),
        )
        .await?;

        // Admin copy; shares the fate of the customer send at the caller.
        self.send(
            &self.config.admin_email,
            &self.config.from_name,
            "New order registered",
            self.admin_html(email, guest),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ConfirmationMailer for MailClient {
    async fn send_payment_confirmation(&self, email: &ConfirmationEmail) -> Result<(), AppError> {
        self.send_confirmation(email, false).await
    }

    async fn send_guest_payment_confirmation(
        &self,
        email: &ConfirmationEmail,
    ) -> Result<(), AppError> {
        self.send_confirmation(email, true).await
    }
}
