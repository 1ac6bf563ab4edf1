use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::validate_week;

/// Query accepted by the weekly leaderboard route.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
pub struct LeaderboardQuery {
    /// ISO week bucket (`YYYY-Www`); defaults to the current week.
    #[validate(custom(function = "validate_week"))]
    pub week: Option<String>,
    /// Maximum number of rows, 1 to 100 (default 20).
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: u32,
    pub user_id: Uuid,
    pub display_name: Option<String>,
    pub best_score: u32,
    pub duel_count: u32,
    pub duel_wins: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardResponse {
    pub ok: bool,
    pub week: String,
    pub entries: Vec<LeaderboardEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_validation() {
        let valid = LeaderboardQuery {
            week: Some("2026-W42".into()),
            limit: Some(10),
        };
        assert!(valid.validate().is_ok());
        assert!(LeaderboardQuery::default().validate().is_ok());

        let bad_week = LeaderboardQuery {
            week: Some("week 42".into()),
            limit: None,
        };
        assert!(bad_week.validate().is_err());

        let bad_limit = LeaderboardQuery {
            week: None,
            limit: Some(0),
        };
        assert!(bad_limit.validate().is_err());
    }
}
