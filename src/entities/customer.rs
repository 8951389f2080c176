use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer (payer) entity.
///
/// Carries the referral bookkeeping: each customer owns a unique referral
/// code, may have been referred by another customer, and accumulates reward
/// points. `referral_rewarded` records whether this customer's referrer has
/// already been credited for them; it flips false -> true exactly once.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    #[sea_orm(unique)]
    pub referral_code: String,
    #[sea_orm(nullable)]
    pub referred_by: Option<Uuid>,
    pub referral_points: i32,
    pub referral_rewarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
    #[sea_orm(has_many = "super::entitlement::Entity")]
    Entitlements,
    #[sea_orm(has_many = "super::invoice_request::Entity")]
    InvoiceRequests,
    #[sea_orm(has_many = "super::notification::Entity")]
    Notifications,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::entitlement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entitlements.def()
    }
}

impl Related<super::invoice_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceRequests.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
