//! Reconciliation engine properties, exercised against in-memory stores.
//!
//! The engine only sees the store traits, so these tests can drive the
//! full verify → idempotency-gate → order-creation → side-effects
//! pipeline without MongoDB, including the concurrent-delivery race.

use async_trait::async_trait;
use booking_service::config::IzipayConfig;
use booking_service::dtos::{DraftItem, OrderDraft};
use booking_service::error::AppError;
use booking_service::models::{Order, Payment, PaymentStatus, ProductType};
use booking_service::services::cart::CartStore;
use booking_service::services::catalog::ProductCatalog;
use booking_service::services::mail::{ConfirmationEmail, ConfirmationMailer};
use booking_service::services::repository::{OrderStore, PaymentStore};
use booking_service::services::verifier::NotificationVerifier;
use booking_service::services::{IpnOutcome, ReconciliationService};
use hmac::{Hmac, Mac};
use secrecy::Secret;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const PASSWORD: &str = "test_password_secret";
const HMAC_KEY: &str = "test_hmac_secret";

fn sign(answer: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(answer.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn signed_body(answer: &str, secret: &str, hash_key: &str) -> Vec<u8> {
    let hash = sign(answer, secret);
    serde_urlencoded::to_string([
        ("kr-answer", answer),
        ("kr-hash", hash.as_str()),
        ("kr-hash-key", hash_key),
    ])
    .unwrap()
    .into_bytes()
}

fn paid_answer(order_id: &str) -> String {
    format!(
        r#"{{"orderStatus":"PAID","orderDetails":{{"orderId":"{}"}},"transactions":[{{"uuid":"T1"}}]}}"#,
        order_id
    )
}

fn test_verifier() -> NotificationVerifier {
    NotificationVerifier::new(&IzipayConfig {
        username: "izi_user".to_string(),
        password: Secret::new(PASSWORD.to_string()),
        hmac_key: Secret::new(HMAC_KEY.to_string()),
        public_key: "izi_public".to_string(),
        api_base_url: "http://gateway.invalid".to_string(),
        timeout_seconds: 5,
    })
}

fn draft(user_id: Option<&str>) -> OrderDraft {
    OrderDraft {
        user_id: user_id.map(|s| s.to_string()),
        customer_name: "Maria Quispe".to_string(),
        customer_email: "maria@example.com".to_string(),
        customer_phone: None,
        items: vec![DraftItem {
            product_id: "tour-machu".to_string(),
            product_type: ProductType::Tour,
            travel_date: None,
            adults: Some(2),
            children: Some(0),
            infants: Some(0),
            unit_price: 75.0,
            total_price: 150.0,
            applied_offer_id: None,
            notes: None,
            added_at: None,
        }],
        subtotal: 150.0,
        discount_total: None,
        grand_total: 150.0,
        currency: Some("PEN".to_string()),
        status: None,
        payment_status: None,
        notes: None,
    }
}

fn pending_payment(
    gateway_order_id: &str,
    user_id: Option<&str>,
    session_id: Option<&str>,
) -> Payment {
    let mut payment = Payment::new(
        draft(user_id),
        150.0,
        "PEN".to_string(),
        session_id.map(|s| s.to_string()),
        user_id.map(|s| s.to_string()),
    );
    payment.gateway_order_id = Some(gateway_order_id.to_string());
    payment
}

// ---------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------

#[derive(Default)]
struct InMemoryPayments {
    inner: Mutex<HashMap<Uuid, Payment>>,
}

impl InMemoryPayments {
    fn seed(&self, payment: Payment) {
        self.inner.lock().unwrap().insert(payment.id, payment);
    }

    fn get(&self, id: Uuid) -> Option<Payment> {
        self.inner.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPayments {
    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn mark_paid_if_pending(
        &self,
        id: Uuid,
        order_id: Uuid,
        transaction_uuid: Option<&str>,
        raw_answer: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(&id) {
            Some(p) if p.status == PaymentStatus::Pending => {
                p.status = PaymentStatus::Paid;
                p.order_id = Some(order_id);
                p.transaction_uuid = transaction_uuid.map(|s| s.to_string());
                p.raw_response = Some(raw_answer.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
struct InMemoryOrders {
    inner: Mutex<Vec<Order>>,
}

impl InMemoryOrders {
    fn all(&self) -> Vec<Order> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrders {
    async fn insert(&self, order: &Order) -> Result<(), AppError> {
        self.inner.lock().unwrap().push(order.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingCarts {
    user_clears: Mutex<Vec<String>>,
    session_clears: Mutex<Vec<String>>,
}

#[async_trait]
impl CartStore for RecordingCarts {
    async fn clear_open_cart_by_user_id(&self, user_id: &str) -> Result<bool, AppError> {
        self.user_clears.lock().unwrap().push(user_id.to_string());
        Ok(true)
    }

    async fn clear_open_cart_by_session_id(&self, session_id: &str) -> Result<bool, AppError> {
        self.session_clears
            .lock()
            .unwrap()
            .push(session_id.to_string());
        Ok(true)
    }
}

struct StaticCatalog {
    titles: HashMap<String, String>,
}

impl StaticCatalog {
    fn empty() -> Self {
        Self {
            titles: HashMap::new(),
        }
    }

    fn with(titles: &[(&str, &str)]) -> Self {
        Self {
            titles: titles
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn product_title(
        &self,
        _product_type: ProductType,
        product_id: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self.titles.get(product_id).cloned())
    }
}

struct FailingCatalog;

#[async_trait]
impl ProductCatalog for FailingCatalog {
    async fn product_title(
        &self,
        _product_type: ProductType,
        _product_id: &str,
    ) -> Result<Option<String>, AppError> {
        Err(AppError::DatabaseError(anyhow::anyhow!(
            "catalog unavailable"
        )))
    }
}

#[derive(Default)]
struct RecordingMailer {
    registered: Mutex<Vec<ConfirmationEmail>>,
    guest: Mutex<Vec<ConfirmationEmail>>,
}

#[async_trait]
impl ConfirmationMailer for RecordingMailer {
    async fn send_payment_confirmation(&self, email: &ConfirmationEmail) -> Result<(), AppError> {
        self.registered.lock().unwrap().push(email.clone());
        Ok(())
    }

    async fn send_guest_payment_confirmation(
        &self,
        email: &ConfirmationEmail,
    ) -> Result<(), AppError> {
        self.guest.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl ConfirmationMailer for FailingMailer {
    async fn send_payment_confirmation(&self, _email: &ConfirmationEmail) -> Result<(), AppError> {
        Err(AppError::EmailError("smtp relay down".to_string()))
    }

    async fn send_guest_payment_confirmation(
        &self,
        _email: &ConfirmationEmail,
    ) -> Result<(), AppError> {
        Err(AppError::EmailError("smtp relay down".to_string()))
    }
}

struct Harness {
    payments: Arc<InMemoryPayments>,
    orders: Arc<InMemoryOrders>,
    carts: Arc<RecordingCarts>,
    mailer: Arc<RecordingMailer>,
    engine: Arc<ReconciliationService>,
}

fn harness() -> Harness {
    harness_with(Arc::new(StaticCatalog::empty()))
}

fn harness_with(catalog: Arc<dyn ProductCatalog>) -> Harness {
    let payments = Arc::new(InMemoryPayments::default());
    let orders = Arc::new(InMemoryOrders::default());
    let carts = Arc::new(RecordingCarts::default());
    let mailer = Arc::new(RecordingMailer::default());

    let engine = Arc::new(ReconciliationService::new(
        test_verifier(),
        payments.clone(),
        orders.clone(),
        carts.clone(),
        catalog,
        mailer.clone(),
    ));

    Harness {
        payments,
        orders,
        carts,
        mailer,
        engine,
    }
}

// ---------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------

#[tokio::test]
async fn paid_notification_creates_confirmed_order() {
    let h = harness();
    let payment = pending_payment("P1", None, Some("sess-1"));
    let payment_id = payment.id;
    h.payments.seed(payment);

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    let outcome = h.engine.reconcile(&body).await.unwrap();
    assert_eq!(outcome, IpnOutcome::Ok);

    let orders = h.orders.all();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.grand_total, 150.0);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_method.as_deref(), Some("IZIPAY"));
    assert!(!order.confirmation_code.is_empty());

    let payment = h.payments.get(payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.order_id, Some(order.id));
    assert_eq!(payment.transaction_uuid.as_deref(), Some("T1"));
    assert_eq!(payment.raw_response.as_deref(), Some(paid_answer("P1").as_str()));
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let h = harness();
    h.payments.seed(pending_payment("P1", None, None));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");

    assert_eq!(h.engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);
    assert_eq!(h.engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);

    assert_eq!(h.orders.all().len(), 1);
    assert_eq!(h.mailer.guest.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_deliveries_create_exactly_one_order() {
    let h = harness();
    let payment = pending_payment("P1", None, None);
    let payment_id = payment.id;
    h.payments.seed(payment);

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move { engine.reconcile(&body).await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), IpnOutcome::Ok);
    }

    let orders = h.orders.all();
    assert_eq!(orders.len(), 1);

    let payment = h.payments.get(payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.order_id, Some(orders[0].id));
}

#[tokio::test]
async fn invalid_signature_mutates_nothing() {
    let h = harness();
    let payment = pending_payment("P1", None, None);
    let payment_id = payment.id;
    h.payments.seed(payment);

    let answer = paid_answer("P1");
    let body = serde_urlencoded::to_string([
        ("kr-answer", answer.as_str()),
        ("kr-hash", "deadbeef"),
        ("kr-hash-key", "sha256_hmac"),
    ])
    .unwrap();

    let outcome = h.engine.reconcile(body.as_bytes()).await.unwrap();
    assert_eq!(outcome, IpnOutcome::Ignored);

    assert!(h.orders.all().is_empty());
    let payment = h.payments.get(payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.order_id.is_none());
}

#[tokio::test]
async fn signature_from_wrong_secret_is_ignored() {
    let h = harness();
    h.payments.seed(pending_payment("P1", None, None));

    // Signed with the password secret but claiming sha256_hmac.
    let body = signed_body(&paid_answer("P1"), PASSWORD, "sha256_hmac");

    assert_eq!(
        h.engine.reconcile(&body).await.unwrap(),
        IpnOutcome::Ignored
    );
    assert!(h.orders.all().is_empty());
}

#[tokio::test]
async fn password_selector_verifies_with_password_secret() {
    let h = harness();
    h.payments.seed(pending_payment("P1", None, None));

    let body = signed_body(&paid_answer("P1"), PASSWORD, "password");

    assert_eq!(h.engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);
    assert_eq!(h.orders.all().len(), 1);
}

#[tokio::test]
async fn unknown_correlation_is_ignored() {
    let h = harness();

    let body = signed_body(&paid_answer("no-such-payment"), HMAC_KEY, "sha256_hmac");

    assert_eq!(
        h.engine.reconcile(&body).await.unwrap(),
        IpnOutcome::Ignored
    );
    assert!(h.orders.all().is_empty());
}

#[tokio::test]
async fn non_paid_status_never_creates_an_order() {
    let h = harness();
    let payment = pending_payment("P1", None, None);
    let payment_id = payment.id;
    h.payments.seed(payment);

    let answer =
        r#"{"orderStatus":"UNPAID","orderDetails":{"orderId":"P1"},"transactions":[]}"#;
    let body = signed_body(answer, HMAC_KEY, "sha256_hmac");

    assert_eq!(
        h.engine.reconcile(&body).await.unwrap(),
        IpnOutcome::Ignored
    );
    assert!(h.orders.all().is_empty());
    assert_eq!(
        h.payments.get(payment_id).unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn empty_body_is_ignored() {
    let h = harness();
    assert_eq!(h.engine.reconcile(b"").await.unwrap(), IpnOutcome::Ignored);
}

#[tokio::test]
async fn cart_clear_targets_user_when_user_id_present() {
    let h = harness();
    // Both ids present: the user-scoped clear must win.
    h.payments
        .seed(pending_payment("P1", Some("user-7"), Some("sess-9")));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    h.engine.reconcile(&body).await.unwrap();

    assert_eq!(*h.carts.user_clears.lock().unwrap(), vec!["user-7"]);
    assert!(h.carts.session_clears.lock().unwrap().is_empty());
    // Registered-user template for an authenticated payment.
    assert_eq!(h.mailer.registered.lock().unwrap().len(), 1);
    assert!(h.mailer.guest.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cart_clear_targets_session_for_guests() {
    let h = harness();
    h.payments.seed(pending_payment("P1", None, Some("sess-9")));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    h.engine.reconcile(&body).await.unwrap();

    assert!(h.carts.user_clears.lock().unwrap().is_empty());
    assert_eq!(*h.carts.session_clears.lock().unwrap(), vec!["sess-9"]);
    assert_eq!(h.mailer.guest.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_cart_action_without_user_or_session() {
    let h = harness();
    h.payments.seed(pending_payment("P1", None, None));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    assert_eq!(h.engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);

    assert!(h.carts.user_clears.lock().unwrap().is_empty());
    assert!(h.carts.session_clears.lock().unwrap().is_empty());
}

#[tokio::test]
async fn email_uses_catalog_title_when_available() {
    let h = harness_with(Arc::new(StaticCatalog::with(&[(
        "tour-machu",
        "Machu Picchu Full Day",
    )])));
    h.payments.seed(pending_payment("P1", None, Some("sess-1")));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    h.engine.reconcile(&body).await.unwrap();

    let sent = h.mailer.guest.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].items[0].name, "Machu Picchu Full Day");
    assert_eq!(sent[0].items[0].quantity, 2);
    assert_eq!(sent[0].total, 150.0);
    assert!(!sent[0].confirmation_code.is_empty());
}

#[tokio::test]
async fn missing_product_degrades_to_placeholder() {
    let h = harness_with(Arc::new(StaticCatalog::empty()));
    h.payments.seed(pending_payment("P1", None, None));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    assert_eq!(h.engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);

    let sent = h.mailer.guest.lock().unwrap();
    assert_eq!(sent[0].items[0].name, "Tour");
}

#[tokio::test]
async fn catalog_failure_does_not_abort_reconciliation() {
    let h = harness_with(Arc::new(FailingCatalog));
    h.payments.seed(pending_payment("P1", None, None));

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    assert_eq!(h.engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);

    assert_eq!(h.orders.all().len(), 1);
    let sent = h.mailer.guest.lock().unwrap();
    assert_eq!(sent[0].items[0].name, "Tour");
}

#[tokio::test]
async fn mailer_failure_does_not_roll_back_the_order() {
    let payments = Arc::new(InMemoryPayments::default());
    let orders = Arc::new(InMemoryOrders::default());
    let carts = Arc::new(RecordingCarts::default());

    let engine = ReconciliationService::new(
        test_verifier(),
        payments.clone(),
        orders.clone(),
        carts.clone(),
        Arc::new(StaticCatalog::empty()),
        Arc::new(FailingMailer),
    );

    let payment = pending_payment("P1", Some("user-7"), None);
    let payment_id = payment.id;
    payments.seed(payment);

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    assert_eq!(engine.reconcile(&body).await.unwrap(), IpnOutcome::Ok);

    assert_eq!(orders.all().len(), 1);
    assert_eq!(payments.get(payment_id).unwrap().status, PaymentStatus::Paid);
    // Cart clearing still runs after the email failure.
    assert_eq!(*carts.user_clears.lock().unwrap(), vec!["user-7"]);
}

#[tokio::test]
async fn quantity_defaults_to_one_when_party_is_empty() {
    let h = harness();
    let mut payment = pending_payment("P1", None, None);
    payment.order_draft.items[0].adults = Some(0);
    payment.order_draft.items[0].children = None;
    payment.order_draft.items[0].infants = None;
    h.payments.seed(payment);

    let body = signed_body(&paid_answer("P1"), HMAC_KEY, "sha256_hmac");
    h.engine.reconcile(&body).await.unwrap();

    let sent = h.mailer.guest.lock().unwrap();
    assert_eq!(sent[0].items[0].quantity, 1);
}
