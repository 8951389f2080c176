//! Customer registration and entitlement reads.

use crate::{
    db::DbPool,
    entities::{
        customer::{self, Entity as Customer},
        entitlement::{self, Entity as Entitlement},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::referrals::ReferralService,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Input for registering a customer.
#[derive(Debug, Clone)]
pub struct RegisterCustomer {
    pub email: String,
    pub name: String,
    /// Another customer's referral code, if the sign-up was referred.
    pub referral_code: Option<String>,
}

fn generate_referral_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("REF-{}", hex[..12].to_uppercase())
}

/// Customer registry.
pub struct CustomerService {
    db: Arc<DbPool>,
    referrals: Arc<ReferralService>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(
        db: Arc<DbPool>,
        referrals: Arc<ReferralService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            referrals,
            event_sender,
        }
    }

    /// Registers a customer, linking the referrer when a code is supplied.
    ///
    /// Every customer gets a fresh referral code of their own. Referring
    /// yourself is impossible as a side effect of the duplicate email
    /// check: a code's owner is already registered under their email.
    #[instrument(skip(self, input))]
    pub async fn register(
        &self,
        input: RegisterCustomer,
    ) -> Result<customer::Model, ServiceError> {
        let email = input.email.trim().to_lowercase();
        let name = input.name.trim().to_string();

        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::ValidationError(
                "A valid email address is required".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Name must not be empty".to_string(),
            ));
        }

        let existing = Customer::find()
            .filter(customer::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Email {} is already registered",
                email
            )));
        }

        let referred_by = match &input.referral_code {
            Some(code) if !code.trim().is_empty() => {
                Some(self.referrals.resolve_code(code).await?.id)
            }
            _ => None,
        };

        let now = Utc::now();
        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            name: Set(name),
            referral_code: Set(generate_referral_code()),
            referred_by: Set(referred_by),
            referral_points: Set(0),
            referral_rewarded: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        let _ = self.event_sender.send(Event::CustomerCreated(model.id)).await;

        info!("Customer {} registered", model.id);
        Ok(model)
    }

    /// Customer by id.
    pub async fn get_customer(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    /// The customer's course grants, oldest first.
    pub async fn entitlements(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<entitlement::Model>, ServiceError> {
        let grants = Entitlement::find()
            .filter(entitlement::Column::CustomerId.eq(customer_id))
            .order_by_asc(entitlement::Column::GrantedAt)
            .all(&*self.db)
            .await?;
        Ok(grants)
    }
}
