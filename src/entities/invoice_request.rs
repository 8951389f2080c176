use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer-initiated request for a VAT invoice over settled payment records.
///
/// `payment_ids` is the JSON array of payment record ids the request covers;
/// the records themselves get `invoiced` + `invoice_request_id` stamped only
/// when the request is approved. Rejection leaves them requestable again.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: InvoiceRequestStatus,
    pub buyer_name: String,
    pub buyer_address: String,
    pub buyer_postal_code: String,
    pub buyer_city: String,
    #[sea_orm(nullable)]
    pub buyer_nip: Option<String>,
    /// Company purchase; approval then requires a checksum-valid NIP.
    pub company: bool,
    #[sea_orm(column_type = "Json")]
    pub payment_ids: Json,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total: Decimal,
    #[sea_orm(nullable)]
    pub invoice_number: Option<String>,
    #[sea_orm(nullable)]
    pub document_path: Option<String>,
    #[sea_orm(nullable)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Review state machine: `Pending -> Processed | Rejected`; both outcomes
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum InvoiceRequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl InvoiceRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvoiceRequestStatus::Pending)
    }
}

impl std::fmt::Display for InvoiceRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceRequestStatus::Pending => "pending",
            InvoiceRequestStatus::Processed => "processed",
            InvoiceRequestStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}
