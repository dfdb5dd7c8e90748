//! Game snapshot model and game API payloads.

use serde::{Deserialize, Serialize};

use crate::games::lucky_box::OpenOutcome;
use crate::games::puzzle::{self, Input, PieceKind, PuzzleGame};
use crate::games::store::{self, PurchaseReceipt, TickReport, UPGRADES};
use crate::games::{BoxState, PuzzleState, StoreState};

/// Per-user game record. Each game owns its own subtree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub user_id: String,
    #[serde(default)]
    pub box_state: BoxState,
    #[serde(default)]
    pub store_state: StoreState,
    #[serde(default)]
    pub puzzle_state: PuzzleState,
}

/// Lucky box state plus whether the free open is available.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxView {
    #[serde(flatten)]
    pub state: BoxState,
    pub free_open_available: bool,
    pub open_ten_cost: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBoxResponse {
    #[serde(flatten)]
    pub outcome: OpenOutcome,
    pub points_balance: i64,
    pub new_badges: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeView {
    pub id: String,
    pub name: String,
    pub rate_per_unit: i64,
    pub owned: u32,
    pub next_cost: i64,
}

/// Store state with derived figures for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreView {
    #[serde(flatten)]
    pub state: StoreState,
    pub revenue_per_second: i64,
    pub bonus_multiplier: i64,
    pub experience_to_next_level: i64,
    pub catalog: Vec<UpgradeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_credit: Option<i64>,
}

impl StoreView {
    pub fn new(state: StoreState, offline_credit: Option<i64>) -> Self {
        let catalog = UPGRADES
            .iter()
            .map(|u| UpgradeView {
                id: u.id.to_string(),
                name: u.name.to_string(),
                rate_per_unit: u.rate_per_unit,
                owned: state.owned(u.id),
                next_cost: store::upgrade_cost(u.base_cost, state.owned(u.id)),
            })
            .collect();

        Self {
            revenue_per_second: state.base_revenue() * state.bonus_multiplier(),
            bonus_multiplier: state.bonus_multiplier(),
            experience_to_next_level: state.experience_to_next_level(),
            catalog,
            offline_credit,
            state,
        }
    }
}

/// Request body for reporting active store play.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTickRequest {
    pub seconds: u32,
    #[serde(default)]
    pub clicks: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTickResponse {
    pub report: TickReport,
    pub store: StoreView,
    pub new_badges: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub receipt: PurchaseReceipt,
    pub store: StoreView,
}

/// Request body for starting a puzzle session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPuzzleRequest {
    /// Fixed piece sequence; random when omitted.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Request body for a batch of puzzle inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleInputRequest {
    pub inputs: Vec<Input>,
}

/// Snapshot of a running puzzle session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleView {
    pub session_id: String,
    pub rows: Vec<String>,
    pub score: u64,
    pub lines_cleared: u32,
    pub level: u32,
    pub tick_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<PieceKind>,
    pub next: PieceKind,
    pub game_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_score: Option<u64>,
}

impl PuzzleView {
    pub fn new(session_id: &str, game: &PuzzleGame) -> Self {
        Self {
            session_id: session_id.to_string(),
            rows: game.render(),
            score: game.score(),
            lines_cleared: game.lines_cleared(),
            level: game.level(),
            tick_interval_ms: puzzle::tick_interval_ms(game.level()),
            active: game.active().map(|p| p.kind),
            next: game.next(),
            game_over: game.is_over(),
            high_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub display_name: String,
    pub high_score: u64,
}
