use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout / settlement events
    CheckoutStarted {
        transaction_id: Uuid,
        customer_id: Uuid,
    },
    SettlementCompleted {
        transaction_id: Uuid,
        customer_id: Uuid,
        completed_at: DateTime<Utc>,
    },
    SettlementFailed {
        transaction_id: Uuid,
        reason: String,
    },

    // Discount events
    DiscountConsumed {
        code: String,
        transaction_id: Uuid,
    },

    // Referral events
    ReferralCredited {
        referrer_id: Uuid,
        referred_id: Uuid,
    },

    // Entitlement events
    EntitlementsGranted {
        customer_id: Uuid,
        transaction_id: Uuid,
        course_ids: Vec<Uuid>,
    },

    // Invoicing events
    InvoiceRequested {
        request_id: Uuid,
        customer_id: Uuid,
    },
    InvoiceProcessed {
        request_id: Uuid,
        invoice_number: String,
    },
    InvoiceRejected {
        request_id: Uuid,
        reason: Option<String>,
    },

    // Customer events
    CustomerCreated(Uuid),
}

// Function to process incoming events and distribute them to registered event handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        match event {
            Event::CheckoutStarted {
                transaction_id,
                customer_id,
            } => {
                counter!("edupay_events.checkout_started", 1);
                info!(
                    "Checkout started: transaction_id={}, customer_id={}",
                    transaction_id, customer_id
                );
            }
            Event::SettlementCompleted {
                transaction_id,
                customer_id,
                completed_at,
            } => {
                counter!("edupay_events.settlement_completed", 1);
                if let Err(e) =
                    handle_settlement_completed(transaction_id, customer_id, completed_at).await
                {
                    error!(
                        "Failed to handle settlement completed event: transaction_id={}, error={}",
                        transaction_id, e
                    );
                }
            }
            Event::SettlementFailed {
                transaction_id,
                reason,
            } => {
                counter!("edupay_events.settlement_failed", 1);
                warn!(
                    "Settlement failed: transaction_id={}, reason={}",
                    transaction_id, reason
                );
            }
            Event::DiscountConsumed {
                code,
                transaction_id,
            } => {
                counter!("edupay_events.discount_consumed", 1);
                info!(
                    "Discount consumed: code={}, transaction_id={}",
                    code, transaction_id
                );
            }
            Event::ReferralCredited {
                referrer_id,
                referred_id,
            } => {
                counter!("edupay_events.referral_credited", 1);
                info!(
                    "Referral credited: referrer_id={}, referred_id={}",
                    referrer_id, referred_id
                );
            }
            Event::EntitlementsGranted {
                customer_id,
                transaction_id,
                course_ids,
            } => {
                info!(
                    "Entitlements granted: customer_id={}, transaction_id={}, courses={}",
                    customer_id,
                    transaction_id,
                    course_ids.len()
                );
            }
            Event::InvoiceRequested {
                request_id,
                customer_id,
            } => {
                counter!("edupay_events.invoice_requested", 1);
                info!(
                    "Invoice requested: request_id={}, customer_id={}",
                    request_id, customer_id
                );
            }
            Event::InvoiceProcessed {
                request_id,
                invoice_number,
            } => {
                counter!("edupay_events.invoice_processed", 1);
                info!(
                    "Invoice processed: request_id={}, invoice_number={}",
                    request_id, invoice_number
                );
            }
            Event::InvoiceRejected { request_id, reason } => {
                counter!("edupay_events.invoice_rejected", 1);
                warn!(
                    "Invoice rejected: request_id={}, reason={:?}",
                    request_id, reason
                );
            }
            Event::CustomerCreated(customer_id) => {
                info!("Customer created: {}", customer_id);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_settlement_completed(
    transaction_id: Uuid,
    customer_id: Uuid,
    completed_at: DateTime<Utc>,
) -> Result<(), String> {
    // Downstream systems (course platform sync, mailing) hook in here.
    info!(
        "Processing settlement completed event: transaction={}, customer={}, at={}",
        transaction_id, customer_id, completed_at
    );

    Ok(())
}
