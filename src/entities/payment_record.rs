use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One settled line item: a single course inside a transaction.
///
/// `amount` is the gross list price, `discount_share` the slice of the cart
/// discount attributed to this line, `final_amount` what was actually paid
/// (`amount - discount_share`). Invoice requests reference these rows;
/// `invoiced` flips when a request covering the row is processed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub customer_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub discount_share: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub final_amount: Decimal,
    pub status: PaymentRecordStatus,
    pub invoiced: bool,
    #[sea_orm(nullable)]
    pub invoice_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction::Entity",
        from = "Column::TransactionId",
        to = "super::transaction::Column::Id"
    )]
    Transaction,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentRecordStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl std::fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Completed => "completed",
            PaymentRecordStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
