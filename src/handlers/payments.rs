//! Payment handlers: form-token issuance and the IPN webhook.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    dtos::{CreatePaymentRequest, CreatePaymentResponse, IpnResponse, PaymentResponse},
    error::AppError,
    models::Payment,
    services::{metrics::record_payment_initiated, IpnOutcome},
    AppState,
};

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Extract the user id from an optional bearer token. Authentication is
/// optional on the form-token route: an absent or invalid token means a
/// guest checkout, never an error.
fn bearer_user_id(headers: &HeaderMap, auth: &AuthConfig) -> Option<String> {
    let secret = auth.jwt_secret.as_ref()?;
    let header = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;

    let key = jsonwebtoken::DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);

    match jsonwebtoken::decode::<Claims>(token, &key, &validation) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring invalid bearer token, treating as guest");
            None
        }
    }
}

/// Request a hosted-payment form token.
///
/// Persists a PENDING payment record with the draft embedded verbatim,
/// then asks the gateway for a form token using the record's own id as
/// the correlation id. A gateway failure leaves the record PENDING and
/// surfaces to the caller; re-submitting creates a fresh record.
pub async fn create_form_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError> {
    payload.validate()?;

    let mut draft = payload.order_data;

    // A bearer token wins over the explicit field; both fall back to the
    // draft's own user id.
    let user_id = bearer_user_id(&headers, &state.config.auth)
        .or(payload.user_id)
        .or_else(|| draft.user_id.clone());
    draft.user_id = user_id.clone();

    let currency = draft.currency.clone().unwrap_or_else(|| "PEN".to_string());
    let amount = draft.grand_total;

    let payment = Payment::new(
        draft.clone(),
        amount,
        currency.clone(),
        payload.session_id,
        user_id,
    );

    tracing::info!(
        payment_id = %payment.id,
        amount = amount,
        currency = %currency,
        guest = payment.user_id.is_none(),
        "Creating payment and requesting form token"
    );

    state.payments.insert(&payment).await?;

    // The gateway wants integer minor units.
    let amount_minor = (amount * 100.0).round() as u64;

    let form_token = state
        .izipay
        .create_payment(
            amount_minor,
            &currency,
            &payment.id.to_string(),
            &draft.customer_email,
        )
        .await
        .map_err(|e| {
            tracing::error!(payment_id = %payment.id, error = %e, "Gateway charge creation failed");
            AppError::BadGateway(e.to_string())
        })?;

    state
        .payments
        .attach_gateway_details(payment.id, &payment.id.to_string(), &form_token)
        .await?;

    record_payment_initiated(&currency);

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            form_token,
            public_key: state.izipay.public_key().to_string(),
            payment_id: payment.id,
        }),
    ))
}

/// Asynchronous payment notification (IPN) webhook.
///
/// Takes the raw request bytes so signature verification sees exactly
/// what the gateway signed. Always acknowledges with 2xx: the gateway
/// retries non-2xx responses, and a malformed or unauthenticated
/// delivery must not trigger a notification storm or leak verification
/// details.
pub async fn ipn(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<IpnResponse>) {
    match state.reconciliation.reconcile(&body).await {
        Ok(IpnOutcome::Ok) => (StatusCode::OK, Json(IpnResponse::ok())),
        Ok(IpnOutcome::Ignored) => (StatusCode::OK, Json(IpnResponse::ignored())),
        Err(e) => {
            tracing::error!(error = %e, "IPN reconciliation failed");
            (StatusCode::OK, Json(IpnResponse::ignored()))
        }
    }
}

/// Payment record status lookup.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .payments
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(PaymentResponse::from(payment)))
}
