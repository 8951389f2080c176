use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A checkout transaction covering one or more courses.
///
/// The transaction id doubles as the gateway session id, so callbacks can be
/// routed back without a separate lookup table. `gateway_order_id` holds the
/// token the gateway returned at registration.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    #[sea_orm(nullable)]
    pub gateway_order_id: Option<String>,
    pub status: TransactionStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub original_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub discount_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total: Decimal,
    pub currency: String,
    #[sea_orm(nullable)]
    pub discount_code_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub payment_method: Option<String>,
    /// Raw gateway payloads kept verbatim for audit; never interpreted.
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_metadata: Option<Json>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment_record::Entity")]
    PaymentRecords,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::discount_code::Entity",
        from = "Column::DiscountCodeId",
        to = "super::discount_code::Column::Id"
    )]
    DiscountCode,
}

impl Related<super::payment_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentRecords.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::discount_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountCode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Settlement state machine: `New -> Registered -> Completed`, with `Failed`
/// reachable from the two non-terminal states. `Completed` and `Failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "registered")]
    Registered,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (New, Registered) | (New, Failed) | (Registered, Completed) | (Registered, Failed)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::New => "new",
            TransactionStatus::Registered => "registered",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
