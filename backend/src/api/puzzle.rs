//! Puzzle session and leaderboard API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{LeaderboardEntry, PuzzleInputRequest, PuzzleView, StartPuzzleRequest};
use crate::AppState;

const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;
const MAX_LEADERBOARD_LIMIT: i64 = 100;

/// Query parameters for the leaderboard.
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// POST /api/games/puzzle/sessions - Start a new game.
pub async fn start_puzzle(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Bytes,
) -> ApiResult<PuzzleView> {
    // The body is optional; an empty one starts a randomly seeded game.
    let request: StartPuzzleRequest = if body.is_empty() {
        StartPuzzleRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };
    let seed = request.seed.unwrap_or_else(rand::random);

    let view = state.puzzles.start(&user.id, seed).await;
    tracing::debug!("User {} started puzzle session {}", user.id, view.session_id);
    success(view)
}

/// GET /api/games/puzzle/sessions/:id - Current board.
pub async fn get_puzzle(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<PuzzleView> {
    success(state.puzzles.view(&id, &user.id).await?)
}

/// POST /api/games/puzzle/sessions/:id/inputs - Apply a batch of inputs.
pub async fn apply_puzzle_inputs(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<PuzzleInputRequest>,
) -> ApiResult<PuzzleView> {
    let (mut view, finished) = state.puzzles.apply(&id, &user.id, &request.inputs).await?;

    if let Some(result) = finished {
        let (puzzle, new_high) = state
            .repo
            .record_puzzle_game(&user.id, result.score, result.lines)
            .await?;
        if new_high {
            tracing::info!("User {} set a puzzle high score of {}", user.id, result.score);
        }
        state.repo.refresh_badges(&user.id).await?;
        view.high_score = Some(puzzle.high_score);
    }

    success(view)
}

/// GET /api/games/puzzle/leaderboard - Top high scores.
pub async fn puzzle_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    success(state.repo.puzzle_leaderboard(limit).await?)
}
