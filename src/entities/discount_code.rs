use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Percent-off discount code.
///
/// `current_uses` only ever moves through the conditional update in the
/// discount service, so it can never pass `max_uses` even under concurrent
/// checkouts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored uppercase; lookups normalize before matching.
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub percent: Decimal,
    pub valid_from: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub valid_to: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
