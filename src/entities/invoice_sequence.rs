use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Singleton allocator row behind invoice numbering (`id` is always 1).
///
/// The `(year, current_ordinal)` pair read before an allocation acts as the
/// compare-and-swap predicate: the allocating UPDATE is filtered on both, so
/// a concurrent allocation makes the write miss and the caller retries.
/// A stored year older than the requested one resets the ordinal to zero
/// before the increment (numbering restarts every January).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_sequences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub year: i32,
    pub current_ordinal: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
