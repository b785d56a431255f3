pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    IzipayClient, MailClient, MongoCartStore, MongoProductCatalog, NotificationVerifier,
    OrderRepository, PaymentRepository, ReconciliationService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub payments: PaymentRepository,
    pub orders: OrderRepository,
    pub izipay: IzipayClient,
    pub reconciliation: Arc<ReconciliationService>,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("booking-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let payments = PaymentRepository::new(&db);
        payments.init_indexes().await?;

        let orders = OrderRepository::new(&db);
        orders.init_indexes().await?;

        let izipay = IzipayClient::new(config.izipay.clone())?;
        if izipay.is_configured() {
            tracing::info!("Izipay client initialized");
        } else {
            tracing::warn!("Izipay credentials not configured - payments will fail");
        }

        let verifier = NotificationVerifier::new(&config.izipay);
        let carts = MongoCartStore::new(&db);
        let catalog = MongoProductCatalog::new(&db);
        let mailer = MailClient::new(config.mail.clone())?;

        let reconciliation = Arc::new(ReconciliationService::new(
            verifier,
            Arc::new(payments.clone()),
            Arc::new(orders.clone()),
            Arc::new(carts),
            Arc::new(catalog),
            Arc::new(mailer),
        ));

        let state = AppState {
            config: config.clone(),
            payments,
            orders,
            izipay,
            reconciliation,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            .route(
                "/payments/form-token",
                post(handlers::payments::create_form_token),
            )
            // Raw-body route: no JSON extractor may touch the bytes the
            // gateway signed.
            .route("/payments/ipn", post(handlers::payments::ipn))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .route("/orders/:id", get(handlers::orders::get_order))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        // Port 0 binds a random free port, used by tests.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
