pub mod cart;
pub mod catalog;
pub mod izipay;
pub mod mail;
pub mod metrics;
pub mod reconcile;
pub mod repository;
pub mod verifier;

pub use cart::{CartStore, MongoCartStore};
pub use catalog::{MongoProductCatalog, ProductCatalog};
pub use izipay::IzipayClient;
pub use mail::{ConfirmationMailer, MailClient};
pub use metrics::{get_metrics, init_metrics};
pub use reconcile::{IpnOutcome, ReconciliationService};
pub use repository::{OrderRepository, OrderStore, PaymentRepository, PaymentStore};
pub use verifier::NotificationVerifier;
