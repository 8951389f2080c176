use crate::{
    common::round2,
    db::DbPool,
    entities::discount_code::{self, Entity as DiscountCode},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Per-item discount allocation for a basket.
///
/// Shares are `round2(amount * percent / 100)` for every item except the
/// last, which absorbs the rounding remainder so that the discounted line
/// amounts always add up to `round2(total * (1 - percent / 100))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountBreakdown {
    pub shares: Vec<Decimal>,
    pub original_total: Decimal,
    pub discount_total: Decimal,
    pub discounted_total: Decimal,
}

/// Allocates a percentage discount across line amounts.
pub fn allocate_shares(amounts: &[Decimal], percent: Decimal) -> DiscountBreakdown {
    let original_total: Decimal = amounts.iter().copied().sum();
    let discounted_total = round2(original_total * (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED);
    let discount_total = original_total - discounted_total;

    let mut shares = Vec::with_capacity(amounts.len());
    let mut allocated = Decimal::ZERO;
    for (idx, amount) in amounts.iter().enumerate() {
        let share = if idx + 1 == amounts.len() {
            discount_total - allocated
        } else {
            round2(*amount * percent / Decimal::ONE_HUNDRED)
        };
        allocated += share;
        shares.push(share);
    }

    DiscountBreakdown {
        shares,
        original_total,
        discount_total,
        discounted_total,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiscountCode {
    pub code: String,
    pub percent: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
}

/// Discount code management and basket preview
#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DbPool>,
}

impl DiscountService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Create a new discount code. Codes are stored uppercase.
    #[instrument(skip(self))]
    pub async fn create_code(
        &self,
        input: CreateDiscountCode,
    ) -> Result<discount_code::Model, ServiceError> {
        let code = input.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Discount code must not be empty".to_string(),
            ));
        }
        if input.percent <= Decimal::ZERO || input.percent > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "Discount percent must be in (0, 100]".to_string(),
            ));
        }
        if let Some(max_uses) = input.max_uses {
            if max_uses < 1 {
                return Err(ServiceError::ValidationError(
                    "max_uses must be at least 1".to_string(),
                ));
            }
        }
        let valid_from = input.valid_from.unwrap_or_else(Utc::now);
        if let Some(valid_to) = input.valid_to {
            if valid_to <= valid_from {
                return Err(ServiceError::ValidationError(
                    "valid_to must be after valid_from".to_string(),
                ));
            }
        }

        let model = discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            percent: Set(round2(input.percent)),
            valid_from: Set(valid_from),
            valid_to: Set(input.valid_to),
            max_uses: Set(input.max_uses),
            current_uses: Set(0),
            active: Set(true),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await?;
        info!("Created discount code {} ({}%)", code, created.percent);
        Ok(created)
    }

    /// Look up a code and check it is usable right now.
    ///
    /// Unknown codes, inactive or out-of-window codes, and exhausted codes
    /// each map to their own error so callers can report precisely.
    #[instrument(skip(self))]
    pub async fn validate_code(&self, code: &str) -> Result<discount_code::Model, ServiceError> {
        let normalized = code.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ServiceError::ValidationError(
                "Discount code must not be empty".to_string(),
            ));
        }

        let discount = DiscountCode::find()
            .filter(discount_code::Column::Code.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InvalidDiscountCode(normalized.clone()))?;

        let now = Utc::now();
        if !discount.active || now < discount.valid_from {
            return Err(ServiceError::DiscountNotActive(normalized));
        }
        if let Some(valid_to) = discount.valid_to {
            if now > valid_to {
                return Err(ServiceError::DiscountNotActive(normalized));
            }
        }
        if let Some(max_uses) = discount.max_uses {
            if discount.current_uses >= max_uses {
                warn!("Discount code {} has reached its usage cap", normalized);
                return Err(ServiceError::DiscountExhausted(normalized));
            }
        }

        Ok(discount)
    }

    /// Validate a code and compute the per-item allocation for a basket.
    pub async fn preview(
        &self,
        code: &str,
        amounts: &[Decimal],
    ) -> Result<(discount_code::Model, DiscountBreakdown), ServiceError> {
        let discount = self.validate_code(code).await?;
        let breakdown = allocate_shares(amounts, discount.percent);
        Ok((discount, breakdown))
    }

    pub async fn get(&self, id: Uuid) -> Result<discount_code::Model, ServiceError> {
        DiscountCode::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", id)))
    }

    /// Consume one use of a code inside an open transaction.
    ///
    /// The usage cap is enforced by the update predicate itself: the counter
    /// only moves when the row is still active and under its cap, so two
    /// racing settlements cannot both take the last use.
    pub async fn consume<C: ConnectionTrait>(
        &self,
        conn: &C,
        discount: &discount_code::Model,
    ) -> Result<(), ServiceError> {
        let res = DiscountCode::update_many()
            .col_expr(
                discount_code::Column::CurrentUses,
                Expr::col(discount_code::Column::CurrentUses).add(1),
            )
            .filter(discount_code::Column::Id.eq(discount.id))
            .filter(discount_code::Column::Active.eq(true))
            .filter(
                Condition::any()
                    .add(discount_code::Column::MaxUses.is_null())
                    .add(
                        Expr::col(discount_code::Column::CurrentUses)
                            .lt(Expr::col(discount_code::Column::MaxUses)),
                    ),
            )
            .exec(conn)
            .await?;

        if res.rows_affected == 0 {
            warn!("Discount code {} exhausted during settlement", discount.code);
            return Err(ServiceError::DiscountExhausted(discount.code.clone()));
        }

        Ok(())
    }
}
