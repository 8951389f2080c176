use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use edupay_api::entities::{customer, discount_code};
use edupay_api::{
    config::AppConfig,
    db,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::customers::RegisterCustomer,
    services::discounts::CreateDiscountCode,
    services::gateway::{
        GatewayRedirect, HmacOrderSigner, OrderSigner, PaymentGateway, PaymentNotification,
        RegisterOrder,
    },
    services::settlements::{CheckoutItem, StartCheckout},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// CRC key shared by the test signer and the application under test.
pub const TEST_CRC_KEY: &str = "test_crc_key_for_integration_tests";

/// Gateway stub that acknowledges every registration with a deterministic
/// token, standing in for the Przelewy24 REST endpoint.
#[derive(Debug, Clone, Default)]
pub struct StubGateway;

#[async_trait::async_trait]
impl PaymentGateway for StubGateway {
    async fn register_order(
        &self,
        order: &RegisterOrder,
    ) -> Result<GatewayRedirect, ServiceError> {
        Ok(GatewayRedirect {
            gateway_order_id: format!("stub-{}", order.session_id),
            redirect_url: format!("https://gateway.test/trnRequest/stub-{}", order.session_id),
        })
    }
}

/// Gateway stub that refuses every registration.
#[derive(Debug, Clone, Default)]
pub struct FailingGateway;

#[async_trait::async_trait]
impl PaymentGateway for FailingGateway {
    async fn register_order(
        &self,
        _order: &RegisterOrder,
    ) -> Result<GatewayRedirect, ServiceError> {
        Err(ServiceError::GatewayError(
            "registration refused by test gateway".to_string(),
        ))
    }
}

/// Helper harness for spinning up an application state backed by a fresh
/// SQLite database in a per-test temporary directory. Invoice documents land
/// in the same directory, so everything is cleaned up on drop.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    signer: Arc<dyn OrderSigner>,
    _workdir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with the acknowledging stub gateway.
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(StubGateway)).await
    }

    /// Construct a test application around a specific gateway stub.
    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let workdir = tempfile::tempdir().expect("failed to create test workdir");
        let db_path = workdir.path().join("edupay_test.db");

        // Minimal configuration suitable for tests.
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.allow_simulated_settlement = true;
        cfg.gateway_crc_key = TEST_CRC_KEY.to_string();
        cfg.invoice_document_dir = workdir
            .path()
            .join("invoices")
            .to_string_lossy()
            .into_owned();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let signer: Arc<dyn OrderSigner> =
            Arc::new(HmacOrderSigner::new(TEST_CRC_KEY.to_string()));
        let base_logger =
            edupay_api::logging::setup_logger(edupay_api::logging::LoggerConfig::default());
        let services = AppServices::with_gateway(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            &cfg,
            base_logger,
            gateway,
            signer.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", edupay_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            signer,
            _workdir: workdir,
            _event_task: event_task,
        }
    }

    /// The signer the application verifies callbacks with.
    #[allow(dead_code)]
    pub fn signer(&self) -> Arc<dyn OrderSigner> {
        self.signer.clone()
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Register a customer through the service layer.
    #[allow(dead_code)]
    pub async fn seed_customer(&self, email: &str) -> customer::Model {
        self.state
            .customer_service()
            .register(RegisterCustomer {
                email: email.to_string(),
                name: "Test Customer".to_string(),
                referral_code: None,
            })
            .await
            .expect("seed customer for tests")
    }

    /// Register a customer referred by an existing referral code.
    #[allow(dead_code)]
    pub async fn seed_referred_customer(&self, email: &str, code: &str) -> customer::Model {
        self.state
            .customer_service()
            .register(RegisterCustomer {
                email: email.to_string(),
                name: "Referred Customer".to_string(),
                referral_code: Some(code.to_string()),
            })
            .await
            .expect("seed referred customer for tests")
    }

    /// Create an active discount code valid for the next 30 days.
    #[allow(dead_code)]
    pub async fn seed_discount(
        &self,
        code: &str,
        percent: Decimal,
        max_uses: Option<i32>,
    ) -> discount_code::Model {
        self.state
            .discount_service()
            .create_code(CreateDiscountCode {
                code: code.to_string(),
                percent,
                valid_from: Some(Utc::now() - Duration::hours(1)),
                valid_to: Some(Utc::now() + Duration::days(30)),
                max_uses,
            })
            .await
            .expect("seed discount code for tests")
    }

    /// Run a checkout for the customer and settle it via simulation.
    ///
    /// Returns the transaction id and the settled payment record ids in
    /// creation order.
    #[allow(dead_code)]
    pub async fn settle_purchase(
        &self,
        customer_id: Uuid,
        amounts: &[Decimal],
    ) -> (Uuid, Vec<Uuid>) {
        let settlements = self.state.settlement_service();
        let items = amounts
            .iter()
            .enumerate()
            .map(|(idx, amount)| CheckoutItem {
                course_id: Uuid::new_v4(),
                title: format!("Seeded Course {}", idx + 1),
                amount: *amount,
            })
            .collect();

        let started = settlements
            .start_checkout(StartCheckout {
                customer_id,
                items,
                discount_code: None,
            })
            .await
            .expect("seed checkout for tests");

        settlements
            .simulate_settlement(started.transaction_id)
            .await
            .expect("seed settlement for tests");

        let details = settlements
            .get_transaction(started.transaction_id)
            .await
            .expect("seeded transaction should exist");
        let record_ids = details.records.iter().map(|r| r.id).collect();
        (started.transaction_id, record_ids)
    }

    /// Build a gateway notification for the transaction, signed with the
    /// application's CRC key. `amount_minor` is the settled total in grosz.
    #[allow(dead_code)]
    pub fn signed_notification(
        &self,
        transaction_id: Uuid,
        amount_minor: i64,
    ) -> PaymentNotification {
        let mut notification = PaymentNotification {
            merchant_id: self.state.config.gateway_merchant_id,
            pos_id: self.state.config.gateway_pos_id(),
            session_id: transaction_id.to_string(),
            amount: amount_minor,
            origin_amount: amount_minor,
            currency: self.state.config.currency.clone(),
            order_id: 3_100_000,
            method_id: 25,
            statement: format!("edupay {}", transaction_id),
            sign: String::new(),
        };
        notification.sign = self.signer.callback_digest(&notification);
        notification
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
