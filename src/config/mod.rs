use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub izipay: IzipayConfig,
    pub mail: MailConfig,
    pub auth: AuthConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

/// Izipay hosted-payment credentials.
///
/// `password` doubles as the basic-auth password for the Charge API and as
/// one of the two shared secrets the IPN may be signed with (`kr-hash-key`
/// of `password`). `hmac_key` covers the other selector (`sha256_hmac`).
#[derive(Deserialize, Clone, Debug)]
pub struct IzipayConfig {
    pub username: String,
    pub password: Secret<String>,
    pub hmac_key: Secret<String>,
    pub public_key: String,
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MailConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub admin_email: String,
    pub timeout_seconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    /// HS256 secret for the optional bearer token on the form-token route.
    /// When unset, every caller is treated as a guest.
    pub jwt_secret: Option<Secret<String>>,
}

impl Config {
    /// Load configuration from the environment, failing fast on missing
    /// gateway credentials so a misconfigured deployment never serves
    /// traffic it cannot reconcile.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BOOKING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BOOKING_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("BOOKING_DATABASE_URL").context("BOOKING_DATABASE_URL must be set")?;
        let db_name =
            env::var("BOOKING_DATABASE_NAME").unwrap_or_else(|_| "booking_db".to_string());

        let izipay = IzipayConfig {
            username: env::var("IZIPAY_USERNAME").context("IZIPAY_USERNAME must be set")?,
            password: Secret::new(
                env::var("IZIPAY_PASSWORD").context("IZIPAY_PASSWORD must be set")?,
            ),
            hmac_key: Secret::new(
                env::var("IZIPAY_HMACSHA256").context("IZIPAY_HMACSHA256 must be set")?,
            ),
            public_key: env::var("IZIPAY_PUBLIC_KEY").context("IZIPAY_PUBLIC_KEY must be set")?,
            api_base_url: env::var("IZIPAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.micuentaweb.pe/api-payment".to_string()),
            timeout_seconds: env::var("IZIPAY_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        };

        let mail_enabled = env::var("MAIL_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let mail = MailConfig {
            enabled: mail_enabled,
            api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "https://api.brevo.com/v3/smtp/email".to_string()),
            api_key: Secret::new(if mail_enabled {
                env::var("MAIL_API_KEY").context("MAIL_API_KEY must be set when MAIL_ENABLED")?
            } else {
                env::var("MAIL_API_KEY").unwrap_or_default()
            }),
            from_email: env::var("MAIL_FROM").unwrap_or_else(|_| "reservas@example.com".to_string()),
            from_name: env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "Reservas".to_string()),
            admin_email: env::var("MAIL_ADMIN_EMAIL")
                .unwrap_or_else(|_| "reservas@example.com".to_string()),
            timeout_seconds: env::var("MAIL_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        let auth = AuthConfig {
            jwt_secret: env::var("BOOKING_JWT_SECRET").ok().map(Secret::new),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            izipay,
            mail,
            auth,
            service_name: "booking-service".to_string(),
        })
    }
}
