//! Order read access. Orders are created only by reconciliation and are
//! immutable afterwards.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{dtos::OrderResponse, error::AppError, AppState};

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .orders
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    Ok(Json(OrderResponse::from(order)))
}
