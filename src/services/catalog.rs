//! Product title lookup for confirmation-email display.
//!
//! Strictly best-effort: a missing product degrades to a placeholder name
//! in the caller, never to a reconciliation failure.

use crate::error::AppError;
use crate::models::ProductType;
use async_trait::async_trait;
use mongodb::{bson::doc, Collection, Database};
use serde::Deserialize;

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product_title(
        &self,
        product_type: ProductType,
        product_id: &str,
    ) -> Result<Option<String>, AppError>;
}

#[derive(Debug, Deserialize)]
struct ProductTitle {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Clone)]
pub struct MongoProductCatalog {
    tours: Collection<ProductTitle>,
    transports: Collection<ProductTitle>,
}

impl MongoProductCatalog {
    pub fn new(db: &Database) -> Self {
        Self {
            tours: db.collection("tours"),
            transports: db.collection("transports"),
        }
    }
}

#[async_trait]
impl ProductCatalog for MongoProductCatalog {
    async fn product_title(
        &self,
        product_type: ProductType,
        product_id: &str,
    ) -> Result<Option<String>, AppError> {
        let filter = doc! { "_id": product_id };
        let found = match product_type {
            ProductType::Tour => self.tours.find_one(filter, None).await?,
            ProductType::Transport => self.transports.find_one(filter, None).await?,
        };

        Ok(found.and_then(|p| p.title))
    }
}
