use crate::{
    db::DbPool,
    entities::customer::{self, Entity as Customer},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reward balance summary for one customer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReferralSummary {
    pub customer_id: Uuid,
    pub referral_code: String,
    pub points: i32,
    pub fee_waivers_available: i32,
    pub points_to_next_waiver: i32,
    pub referred_count: u64,
}

/// Computes `(waivers, points_to_next)` for a point balance.
///
/// Exactly at a threshold boundary the next waiver still needs a full
/// threshold of points, so 3 points at threshold 3 yields one waiver and
/// another 3 points to go.
pub fn waiver_math(points: i32, threshold: i32) -> (i32, i32) {
    let threshold = threshold.max(1);
    let points = points.max(0);
    let waivers = points / threshold;
    let to_next = threshold - (points % threshold);
    (waivers, to_next)
}

/// One-time referral crediting and balance reads.
#[derive(Clone)]
pub struct ReferralService {
    db: Arc<DbPool>,
    reward_points: i32,
    waiver_threshold: i32,
}

impl ReferralService {
    pub fn new(db: Arc<DbPool>, reward_points: i32, waiver_threshold: i32) -> Self {
        Self {
            db,
            reward_points,
            waiver_threshold,
        }
    }

    /// Resolves a referral code to its owner.
    pub async fn resolve_code(&self, code: &str) -> Result<customer::Model, ServiceError> {
        let normalized = code.trim().to_uppercase();
        Customer::find()
            .filter(customer::Column::ReferralCode.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Unknown referral code {}", normalized))
            })
    }

    /// Credits the referrer after the referred customer's first completed
    /// settlement.
    ///
    /// The referred row's `referral_rewarded` flag is flipped false→true by a
    /// conditional update; only the caller whose update lands (rows_affected
    /// == 1) goes on to increment the referrer's points. Re-delivered
    /// callbacks and concurrent settlements therefore credit at most once.
    ///
    /// Returns the referrer id when a credit was granted.
    #[instrument(skip(self, conn))]
    pub async fn credit_referrer<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        let res = Customer::update_many()
            .col_expr(customer::Column::ReferralRewarded, Expr::value(true))
            .col_expr(customer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(customer::Column::Id.eq(customer_id))
            .filter(customer::Column::ReferralRewarded.eq(false))
            .filter(customer::Column::ReferredBy.is_not_null())
            .exec(conn)
            .await?;

        if res.rows_affected == 0 {
            return Ok(None);
        }

        let customer = Customer::find_by_id(customer_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", customer_id))
            })?;
        let referrer_id = customer.referred_by.ok_or_else(|| {
            ServiceError::InternalError("rewarded customer has no referrer".to_string())
        })?;

        Customer::update_many()
            .col_expr(
                customer::Column::ReferralPoints,
                Expr::col(customer::Column::ReferralPoints).add(self.reward_points),
            )
            .col_expr(customer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(customer::Column::Id.eq(referrer_id))
            .exec(conn)
            .await?;

        info!(
            "Referral credit granted: referrer={}, referred={}",
            referrer_id, customer_id
        );
        Ok(Some(referrer_id))
    }

    /// Point balance, waiver counts and referred-customer count.
    pub async fn summary(&self, customer_id: Uuid) -> Result<ReferralSummary, ServiceError> {
        let customer = Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", customer_id))
            })?;

        let referred_count = Customer::find()
            .filter(customer::Column::ReferredBy.eq(customer_id))
            .count(&*self.db)
            .await?;

        let (fee_waivers_available, points_to_next_waiver) =
            waiver_math(customer.referral_points, self.waiver_threshold);

        Ok(ReferralSummary {
            customer_id,
            referral_code: customer.referral_code,
            points: customer.referral_points,
            fee_waivers_available,
            points_to_next_waiver,
            referred_count,
        })
    }
}
