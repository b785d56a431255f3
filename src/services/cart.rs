//! Cart clearing, invoked after a payment is confirmed.
//!
//! The cart collection is owned by the cart module of the wider backend;
//! this service only converts the originating open cart once its items
//! have become an order. Clearing an already-converted or missing cart is
//! a no-op, so concurrent calls are safe without locking.

use crate::error::AppError;
use async_trait::async_trait;
use mongodb::{
    bson,
    bson::{doc, Document},
    Collection, Database,
};

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Clear the open cart of an authenticated user. Returns whether a
    /// cart was actually converted.
    async fn clear_open_cart_by_user_id(&self, user_id: &str) -> Result<bool, AppError>;

    /// Clear the open cart of a guest session.
    async fn clear_open_cart_by_session_id(&self, session_id: &str) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct MongoCartStore {
    carts: Collection<Document>,
}

impl MongoCartStore {
    pub fn new(db: &Database) -> Self {
        Self {
            carts: db.collection("carts"),
        }
    }

    async fn clear(&self, filter: Document) -> Result<bool, AppError> {
        let update = doc! {
            "$set": {
                "items": [],
                "subtotal": 0.0,
                "discount_total": 0.0,
                "grand_total": 0.0,
                "status": "converted",
                "updated_at": bson::DateTime::now(),
            }
        };

        let result = self.carts.update_one(filter, update, None).await?;
        Ok(result.modified_count > 0)
    }
}

#[async_trait]
impl CartStore for MongoCartStore {
    async fn clear_open_cart_by_user_id(&self, user_id: &str) -> Result<bool, AppError> {
        self.clear(doc! {
            "user_id": user_id,
            "status": { "$in": ["open", "pending", "active"] },
        })
        .await
    }

    async fn clear_open_cart_by_session_id(&self, session_id: &str) -> Result<bool, AppError> {
        self.clear(doc! {
            "session_id": session_id,
            "status": "open",
        })
        .await
    }
}
