use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::PgPool;

/// Order value, in VND, that earns one loyalty point.
pub const VND_PER_POINT: i64 = 10_000;

const SILVER_THRESHOLD: i64 = 500;
const GOLD_THRESHOLD: i64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
}

impl LoyaltyTier {
    pub fn for_points(points: i64) -> Self {
        if points >= GOLD_THRESHOLD {
            LoyaltyTier::Gold
        } else if points >= SILVER_THRESHOLD {
            LoyaltyTier::Silver
        } else {
            LoyaltyTier::Bronze
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoyaltyTier::Bronze => "bronze",
            LoyaltyTier::Silver => "silver",
            LoyaltyTier::Gold => "gold",
        }
    }
}

/// Whole points earned by an order total; partial blocks are dropped.
pub fn points_for_total(total: &BigDecimal) -> i64 {
    if total <= &BigDecimal::from(0) {
        return 0;
    }
    (total / BigDecimal::from(VND_PER_POINT))
        .with_scale(0)
        .to_i64()
        .unwrap_or(0)
}

/// Credits points to a user and returns the new balance.
pub async fn award_points(pool: &PgPool, user_id: i64, points: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE users SET loyalty_points = loyalty_points + $1, updated_at = NOW()
         WHERE id = $2 RETURNING loyalty_points",
    )
    .bind(points)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn points_drop_partial_blocks() {
        assert_eq!(points_for_total(&BigDecimal::from(9_999)), 0);
        assert_eq!(points_for_total(&BigDecimal::from(10_000)), 1);
        assert_eq!(points_for_total(&BigDecimal::from(355_000)), 35);
        assert_eq!(points_for_total(&BigDecimal::from_str("29999.99").unwrap()), 2);
    }

    #[test]
    fn non_positive_totals_earn_nothing() {
        assert_eq!(points_for_total(&BigDecimal::from(0)), 0);
        assert_eq!(points_for_total(&BigDecimal::from(-50_000)), 0);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(LoyaltyTier::for_points(0), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(499), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(500), LoyaltyTier::Silver);
        assert_eq!(LoyaltyTier::for_points(2_000), LoyaltyTier::Gold);
    }
}
