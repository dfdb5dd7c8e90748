//! Badge and level rules for user profiles.
//!
//! Badges are a pure function of accumulated stats. Stored badge lists are
//! only ever extended, so a badge stays even if a stat later drops.

use serde::Serialize;

use crate::games::{BoxState, PuzzleState, StoreState};

/// Lifetime points per profile level.
pub const POINTS_PER_LEVEL: i64 = 500;

/// Stats the badge rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub boxes_opened: u64,
    pub legendary_pulls: u64,
    pub store_level: u32,
    pub store_total_earned: i64,
    pub puzzle_high_score: u64,
    pub puzzle_games: u32,
    pub votes_cast: i64,
    pub polls_created: i64,
    pub lifetime_points: i64,
}

impl UserStats {
    pub fn from_games(box_state: &BoxState, store: &StoreState, puzzle: &PuzzleState) -> Self {
        Self {
            boxes_opened: box_state.total_opened,
            legendary_pulls: box_state.legendary_count,
            store_level: store.level,
            store_total_earned: store.total_earned,
            puzzle_high_score: puzzle.high_score,
            puzzle_games: puzzle.games_played,
            ..Self::default()
        }
    }
}

/// A badge definition.
pub struct BadgeRule {
    pub id: &'static str,
    pub name: &'static str,
    earned: fn(&UserStats) -> bool,
}

pub const BADGES: &[BadgeRule] = &[
    BadgeRule {
        id: "first_box",
        name: "첫 상자",
        earned: |s| s.boxes_opened >= 1,
    },
    BadgeRule {
        id: "box_collector",
        name: "상자 수집가",
        earned: |s| s.boxes_opened >= 100,
    },
    BadgeRule {
        id: "lucky_star",
        name: "행운의 별",
        earned: |s| s.legendary_pulls >= 1,
    },
    BadgeRule {
        id: "store_owner",
        name: "사장님",
        earned: |s| s.store_level >= 5,
    },
    BadgeRule {
        id: "tycoon",
        name: "재벌",
        earned: |s| s.store_total_earned >= 1_000_000,
    },
    BadgeRule {
        id: "block_starter",
        name: "블록 입문",
        earned: |s| s.puzzle_games >= 1,
    },
    BadgeRule {
        id: "block_master",
        name: "블록 마스터",
        earned: |s| s.puzzle_high_score >= 10_000,
    },
    BadgeRule {
        id: "first_vote",
        name: "첫 투표",
        earned: |s| s.votes_cast >= 1,
    },
    BadgeRule {
        id: "decision_maker",
        name: "결정 장인",
        earned: |s| s.polls_created >= 5,
    },
    BadgeRule {
        id: "point_saver",
        name: "포인트 부자",
        earned: |s| s.lifetime_points >= 5_000,
    },
];

/// Badge ids earned by `stats`, in catalog order.
pub fn earned_badges(stats: &UserStats) -> Vec<&'static str> {
    BADGES
        .iter()
        .filter(|rule| (rule.earned)(stats))
        .map(|rule| rule.id)
        .collect()
}

/// Append newly earned badges to `current`. Returns the ids that were added.
pub fn merge_badges(current: &mut Vec<String>, stats: &UserStats) -> Vec<String> {
    let mut added = Vec::new();
    for id in earned_badges(stats) {
        if !current.iter().any(|b| b == id) {
            current.push(id.to_string());
            added.push(id.to_string());
        }
    }
    added
}

pub fn level_for_points(lifetime_points: i64) -> i64 {
    1 + lifetime_points.max(0) / POINTS_PER_LEVEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_stats_no_badges() {
        assert!(earned_badges(&UserStats::default()).is_empty());
    }

    #[test]
    fn test_badges_follow_thresholds() {
        let stats = UserStats {
            boxes_opened: 100,
            legendary_pulls: 1,
            votes_cast: 1,
            ..UserStats::default()
        };
        assert_eq!(
            earned_badges(&stats),
            vec!["first_box", "box_collector", "lucky_star", "first_vote"]
        );
    }

    #[test]
    fn test_merge_is_append_only() {
        let mut badges = vec!["tycoon".to_string()];
        let stats = UserStats {
            boxes_opened: 1,
            ..UserStats::default()
        };

        let added = merge_badges(&mut badges, &stats);
        assert_eq!(added, vec!["first_box".to_string()]);
        assert_eq!(badges, vec!["tycoon".to_string(), "first_box".to_string()]);

        // Stats dropping below a threshold never removes a badge.
        let added = merge_badges(&mut badges, &UserStats::default());
        assert!(added.is_empty());
        assert_eq!(badges.len(), 2);
    }

    #[test]
    fn test_level_for_points() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(499), 1);
        assert_eq!(level_for_points(500), 2);
        assert_eq!(level_for_points(-10), 1);
    }

    #[test]
    fn test_badge_ids_unique() {
        let mut ids: Vec<_> = BADGES.iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BADGES.len());
    }
}
