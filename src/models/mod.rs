use crate::dtos::{DraftItem, OrderDraft};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a payment attempt. Legal transitions are
/// PENDING→PAID, PENDING→FAILED and PAID→REFUNDED; a PAID record
/// never goes back to PENDING.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Canceled,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    Tour,
    Transport,
}

/// One payment attempt, from form-token issuance through confirmation.
/// The record's own id doubles as the correlation id handed to the
/// gateway, so the asynchronous notification can be matched back here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Full order-creation payload, captured verbatim at form-token time
    /// and replayed into the Order at confirmation.
    pub order_draft: OrderDraft,
    pub order_id: Option<Uuid>,
    pub transaction_uuid: Option<String>,
    /// Raw gateway answer, archived for audit and dispute resolution.
    pub raw_response: Option<String>,
    pub gateway_order_id: Option<String>,
    pub form_token: Option<String>,
    /// Guest cart handle; only used to target cart clearing.
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Payment {
    pub fn new(
        order_draft: OrderDraft,
        amount: f64,
        currency: String,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4(),
            amount,
            currency,
            status: PaymentStatus::Pending,
            order_draft,
            order_id: None,
            transaction_uuid: None,
            raw_response: None,
            gateway_order_id: None,
            form_token: None,
            session_id,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable-after-creation order snapshot produced by reconciliation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    #[serde(rename = "_id")]
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
    pub notes: Option<String>,
    /// Short human-shareable code; the store enforces uniqueness.
    pub confirmation_code: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Order {
    /// Materialize an order from a stored draft. Line items and customer
    /// identity are copied verbatim; status, payment status and payment
    /// method are fixed by the caller.
    pub fn from_draft(
        id: Uuid,
        draft: &OrderDraft,
        payment_method: &str,
        confirmation_code: String,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id,
            user_id: draft.user_id.clone(),
            customer_name: draft.customer_name.clone(),
            customer_email: draft.customer_email.clone(),
            customer_phone: draft.customer_phone.clone(),
            items: draft.items.clone(),
            subtotal: draft.subtotal,
            discount_total: draft.discount_total.unwrap_or(0.0),
            grand_total: draft.grand_total,
            currency: draft.currency.clone().unwrap_or_else(|| "PEN".to_string()),
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            payment_method: Some(payment_method.to_string()),
            notes: draft.notes.clone(),
            confirmation_code,
            created_at: now,
            updated_at: now,
        }
    }
}

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 8;

/// Generate a confirmation code: 8 uppercase alphanumerics.
pub fn generate_confirmation_code() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_code_shape() {
        let code = generate_confirmation_code();
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn payment_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Paid).unwrap(),
            "\"PAID\""
        );
    }

    #[test]
    fn product_type_wire_format() {
        assert_eq!(serde_json::to_string(&ProductType::Tour).unwrap(), "\"Tour\"");
        assert_eq!(
            serde_json::to_string(&ProductType::Transport).unwrap(),
            "\"Transport\""
        );
    }
}
