//! Izipay hosted-payment client.
//!
//! Wraps the Charge API used to obtain a form token for the embedded
//! payment form. One outbound call per form-token request, bounded
//! timeout, no automatic retry: a failure is surfaced to the caller, who
//! may re-submit (creating a fresh payment record).

use crate::config::IzipayConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct IzipayClient {
    client: Client,
    config: IzipayConfig,
}

/// Charge-creation request body. The gateway requires the amount in
/// integer minor units and uses `orderId` as its correlation key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeRequest {
    amount: u64,
    currency: String,
    order_id: String,
    customer: ChargeCustomer,
}

#[derive(Debug, Serialize)]
struct ChargeCustomer {
    email: String,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    #[serde(default)]
    answer: Option<ChargeAnswer>,
}

#[derive(Debug, Deserialize)]
struct ChargeAnswer {
    #[serde(rename = "formToken")]
    form_token: String,
}

impl IzipayClient {
    pub fn new(config: IzipayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    /// Check if gateway credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.config.username.is_empty() && !self.config.password.expose_secret().is_empty()
    }

    /// Public key handed to the client for rendering the hosted form.
    pub fn public_key(&self) -> &str {
        &self.config.public_key
    }

    /// Create a charge and return the hosted-form token.
    ///
    /// # Arguments
    /// * `amount` - Amount in integer minor units (céntimos for PEN)
    /// * `currency` - Currency code (e.g., "PEN")
    /// * `order_id` - The payment record id, used as the gateway-side
    ///   correlation id
    /// * `customer_email` - Payer email forwarded to the gateway
    pub async fn create_payment(
        &self,
        amount: u64,
        currency: &str,
        order_id: &str,
        customer_email: &str,
    ) -> Result<String> {
        if !self.is_configured() {
            return Err(anyhow!("Izipay credentials not configured"));
        }

        let request = ChargeRequest {
            amount,
            currency: currency.to_string(),
            order_id: order_id.to_string(),
            customer: ChargeCustomer {
                email: customer_email.to_string(),
            },
        };

        let url = format!("{}/V4/Charge/CreatePayment", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "Izipay CreatePayment response");

        if !status.is_success() {
            tracing::error!(status = %status, "Izipay charge creation failed");
            return Err(anyhow!("Izipay HTTP error: {}", status));
        }

        let parsed: ChargeResponse = serde_json::from_str(&body)?;

        if parsed.status != "SUCCESS" {
            tracing::error!(gateway_status = %parsed.status, "Izipay charge rejected");
            return Err(anyhow!("Izipay error: {}", parsed.status));
        }

        let form_token = parsed
            .answer
            .map(|a| a.form_token)
            .ok_or_else(|| anyhow!("Izipay answer missing formToken"))?;

        tracing::info!(
            order_id = %order_id,
            amount = amount,
            currency = %currency,
            "Izipay charge created"
        );

        Ok(form_token)
    }
}
