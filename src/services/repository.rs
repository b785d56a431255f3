use crate::error::AppError;
use crate::models::{Order, Payment, PaymentStatus};
use async_trait::async_trait;
use mongodb::options::IndexOptions;
use mongodb::{bson, bson::doc, Collection, Database, IndexModel};
use uuid::Uuid;

/// The payment-store seam the reconciliation engine depends on.
///
/// `mark_paid_if_pending` is the atomic conditional write that makes
/// reconciliation safe under duplicate and concurrent webhook delivery:
/// it must apply for at most one caller per payment record.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError>;

    /// Promote PENDING→PAID, attaching the order reference, the first
    /// transaction uuid and the raw gateway answer in a single write
    /// conditional on the current status. Returns whether the write
    /// applied; `false` means another delivery already won.
    async fn mark_paid_if_pending(
        &self,
        id: Uuid,
        order_id: Uuid,
        transaction_uuid: Option<&str>,
        raw_answer: &str,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order. The confirmation-code uniqueness constraint
    /// is enforced here; a collision surfaces as a database error.
    async fn insert(&self, order: &Order) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PaymentRepository {
    payments: Collection<Payment>,
}

impl PaymentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            payments: db.collection("payments"),
        }
    }

    /// Initialize payment indexes. `gateway_order_id` is the hot lookup
    /// path for every webhook delivery.
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let gateway_order_index = IndexModel::builder()
            .keys(doc! { "gateway_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("gateway_order_idx".to_string())
                    .sparse(true)
                    .build(),
            )
            .build();

        let status_created_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("status_created_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([gateway_order_index, status_created_index], None)
            .await?;

        tracing::info!("Payment indexes initialized");
        Ok(())
    }

    pub async fn insert(&self, payment: &Payment) -> Result<(), AppError> {
        self.payments.insert_one(payment, None).await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.payments.find_one(filter, None).await?)
    }

    /// Attach the gateway-side ids once the charge call succeeds.
    pub async fn attach_gateway_details(
        &self,
        id: Uuid,
        gateway_order_id: &str,
        form_token: &str,
    ) -> Result<(), AppError> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! {
            "$set": {
                "gateway_order_id": gateway_order_id,
                "form_token": form_token,
                "updated_at": bson::DateTime::now(),
            }
        };
        self.payments.update_one(filter, update, None).await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let filter = doc! { "gateway_order_id": gateway_order_id };
        Ok(self.payments.find_one(filter, None).await?)
    }

    async fn mark_paid_if_pending(
        &self,
        id: Uuid,
        order_id: Uuid,
        transaction_uuid: Option<&str>,
        raw_answer: &str,
    ) -> Result<bool, AppError> {
        let filter = doc! {
            "_id": id.to_string(),
            "status": bson::to_bson(&PaymentStatus::Pending)
                .map_err(|e| AppError::DatabaseError(e.into()))?,
        };
        let update = doc! {
            "$set": {
                "status": bson::to_bson(&PaymentStatus::Paid)
                    .map_err(|e| AppError::DatabaseError(e.into()))?,
                "order_id": order_id.to_string(),
                "transaction_uuid": transaction_uuid,
                "raw_response": raw_answer,
                "updated_at": bson::DateTime::now(),
            }
        };

        let result = self.payments.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }
}

#[derive(Clone)]
pub struct OrderRepository {
    orders: Collection<Order>,
}

impl OrderRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            orders: db.collection("orders"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), AppError> {
        // Unique so a duplicate confirmation code is rejected loudly at
        // insert time rather than producing two shareable codes.
        let confirmation_code_index = IndexModel::builder()
            .keys(doc! { "confirmation_code": 1 })
            .options(
                IndexOptions::builder()
                    .name("confirmation_code_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("order_user_idx".to_string())
                    .sparse(true)
                    .build(),
            )
            .build();

        self.orders
            .create_indexes([confirmation_code_index, user_index], None)
            .await?;

        tracing::info!("Order indexes initialized");
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.orders.find_one(filter, None).await?)
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), AppError> {
        self.orders.insert_one(order, None).await?;
        Ok(())
    }
}
