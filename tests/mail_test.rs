//! Confirmation-mail client against a mock mail API.

use booking_service::config::MailConfig;
use booking_service::services::mail::{ConfirmationEmail, EmailLineItem};
use booking_service::services::{ConfirmationMailer, MailClient};
use secrecy::Secret;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mail_config(api_url: &str, enabled: bool, timeout_seconds: u64) -> MailConfig {
    MailConfig {
        enabled,
        api_url: api_url.to_string(),
        api_key: Secret::new("test-key".to_string()),
        from_email: "reservas@example.com".to_string(),
        from_name: "Reservas".to_string(),
        admin_email: "admin@example.com".to_string(),
        timeout_seconds,
    }
}

fn sample_email() -> ConfirmationEmail {
    ConfirmationEmail {
        to: "maria@example.com".to_string(),
        customer_name: "Maria Quispe".to_string(),
        order_id: "ord-1".to_string(),
        confirmation_code: "AB12CD34".to_string(),
        total: 150.0,
        currency: "PEN".to_string(),
        items: vec![EmailLineItem {
            name: "Machu Picchu Full Day".to_string(),
            quantity: 2,
            date: "15-09-2026".to_string(),
            unit_price: 75.0,
            total_price: 150.0,
        }],
    }
}

#[tokio::test]
async fn sends_customer_and_admin_copies_with_api_key() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/v3/smtp/email", server.uri());

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .and(header("api-key", "test-key"))
        .and(body_partial_json(json!({
            "sender": { "email": "reservas@example.com", "name": "Reservas" }
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let client = MailClient::new(mail_config(&endpoint, true, 5)).unwrap();
    client
        .send_payment_confirmation(&sample_email())
        .await
        .unwrap();
}

#[tokio::test]
async fn disabled_client_skips_the_api() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/v3/smtp/email", server.uri());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let client = MailClient::new(mail_config(&endpoint, false, 5)).unwrap();
    client
        .send_guest_payment_confirmation(&sample_email())
        .await
        .unwrap();
}

#[tokio::test]
async fn slow_mail_api_times_out() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/v3/smtp/email", server.uri());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = MailClient::new(mail_config(&endpoint, true, 1)).unwrap();
    let result = client.send_payment_confirmation(&sample_email()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn api_error_status_is_an_error() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/v3/smtp/email", server.uri());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = MailClient::new(mail_config(&endpoint, true, 5)).unwrap();
    let result = client.send_payment_confirmation(&sample_email()).await;

    assert!(result.is_err());
}
