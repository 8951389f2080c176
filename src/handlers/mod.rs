pub mod checkout;
pub mod customers;
pub mod discounts;
pub mod invoices;
pub mod notifications;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::notifications::{DbNotificationService, NotificationService};
use crate::services::{
    customers::CustomerService,
    discounts::DiscountService,
    documents::DocumentService,
    gateway::{HmacOrderSigner, HttpPaymentGateway, OrderSigner, PaymentGateway},
    invoicing::InvoicingService,
    referrals::ReferralService,
    sequences::SequenceService,
    settlements::SettlementService,
};
use slog::Logger;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub customers: Arc<CustomerService>,
    pub discounts: Arc<DiscountService>,
    pub referrals: Arc<ReferralService>,
    pub settlements: Arc<SettlementService>,
    pub invoicing: Arc<InvoicingService>,
    pub documents: Arc<DocumentService>,
    pub notifications: Arc<dyn NotificationService>,
}

impl AppServices {
    /// Builds the service container with the HTTP gateway adapter.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        base_logger: Logger,
    ) -> Result<Self, ServiceError> {
        let signer: Arc<dyn OrderSigner> =
            Arc::new(HmacOrderSigner::new(config.gateway_crc_key.clone()));
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(HttpPaymentGateway::from_config(config, signer.clone())?);
        Ok(Self::with_gateway(
            db_pool,
            event_sender,
            config,
            base_logger,
            gateway,
            signer,
        ))
    }

    /// Builds the container around an injected gateway and signer.
    ///
    /// Tests hand in a stub gateway and a plain-text signer here; production
    /// goes through [`AppServices::new`].
    pub fn with_gateway(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        base_logger: Logger,
        gateway: Arc<dyn PaymentGateway>,
        signer: Arc<dyn OrderSigner>,
    ) -> Self {
        let notifications_logger = base_logger.new(slog::o!("component" => "notifications"));
        let notifications: Arc<dyn NotificationService> = Arc::new(DbNotificationService::new(
            db_pool.clone(),
            notifications_logger,
        ));

        let discounts = Arc::new(DiscountService::new(db_pool.clone()));
        let referrals = Arc::new(ReferralService::new(
            db_pool.clone(),
            config.referral_reward_points,
            config.referral_fee_waiver_threshold,
        ));
        let documents = Arc::new(DocumentService::from_config(config));
        let sequences = Arc::new(SequenceService::new(
            db_pool.clone(),
            config.invoice_series_prefix.clone(),
        ));

        let settlements = Arc::new(SettlementService::new(
            db_pool.clone(),
            event_sender.clone(),
            discounts.clone(),
            referrals.clone(),
            gateway,
            signer,
            notifications.clone(),
            config.currency.clone(),
            config.allow_simulated_settlement,
        ));
        let invoicing = Arc::new(InvoicingService::new(
            db_pool.clone(),
            documents.clone(),
            sequences,
            notifications.clone(),
            event_sender.clone(),
        ));
        let customers = Arc::new(CustomerService::new(
            db_pool,
            referrals.clone(),
            event_sender,
        ));

        Self {
            customers,
            discounts,
            referrals,
            settlements,
            invoicing,
            documents,
            notifications,
        }
    }
}
