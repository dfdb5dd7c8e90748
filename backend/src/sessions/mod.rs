//! In-memory registry of running puzzle sessions.
//!
//! Sessions are not persisted. Only a finished game's result reaches the
//! database, through the caller.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::games::puzzle::Input;
use crate::games::PuzzleGame;
use crate::models::PuzzleView;

/// Sessions untouched for this long are dropped.
const IDLE_TIMEOUT_MINS: i64 = 30;

/// Upper bound on inputs accepted in one batch.
pub const MAX_INPUTS_PER_BATCH: usize = 500;

struct Session {
    user_id: String,
    game: PuzzleGame,
    finished: bool,
    last_active: DateTime<Utc>,
}

/// Result of a finished game, handed out exactly once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedGame {
    pub score: u64,
    pub lines: u32,
}

/// Puzzle sessions keyed by session id.
#[derive(Default)]
pub struct PuzzleSessions {
    sessions: RwLock<HashMap<String, Session>>,
}

impl PuzzleSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for `user_id`. Also prunes idle sessions.
    pub async fn start(&self, user_id: &str, seed: u64) -> PuzzleView {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let game = PuzzleGame::new(seed);
        let view = PuzzleView::new(&id, &game);

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_active < Duration::minutes(IDLE_TIMEOUT_MINS));
        if sessions.len() < before {
            tracing::debug!("Pruned {} idle puzzle sessions", before - sessions.len());
        }

        sessions.insert(
            id,
            Session {
                user_id: user_id.to_string(),
                game,
                finished: false,
                last_active: now,
            },
        );

        view
    }

    /// Current view of a session owned by `user_id`.
    pub async fn view(&self, id: &str, user_id: &str) -> Result<PuzzleView, AppError> {
        let sessions = self.sessions.read().await;
        let session = owned_session(sessions.get(id), id, user_id)?;
        Ok(PuzzleView::new(id, &session.game))
    }

    /// Apply a batch of inputs in order.
    ///
    /// Inputs after game over are ignored. The finished result is returned
    /// on the one call that first observes the game ending.
    pub async fn apply(
        &self,
        id: &str,
        user_id: &str,
        inputs: &[Input],
    ) -> Result<(PuzzleView, Option<FinishedGame>), AppError> {
        if inputs.len() > MAX_INPUTS_PER_BATCH {
            return Err(AppError::Validation(format!(
                "At most {} inputs per batch",
                MAX_INPUTS_PER_BATCH
            )));
        }

        let mut sessions = self.sessions.write().await;
        owned_session(sessions.get(id), id, user_id)?;
        let Some(session) = sessions.get_mut(id) else {
            return Err(AppError::NotFound(format!("Session {} not found", id)));
        };

        for &input in inputs {
            if session.game.is_over() {
                break;
            }
            session.game.apply(input);
        }
        session.last_active = Utc::now();

        let finished = if session.game.is_over() && !session.finished {
            session.finished = true;
            Some(FinishedGame {
                score: session.game.score(),
                lines: session.game.lines_cleared(),
            })
        } else {
            None
        };

        Ok((PuzzleView::new(id, &session.game), finished))
    }
}

fn owned_session<'a>(
    session: Option<&'a Session>,
    id: &str,
    user_id: &str,
) -> Result<&'a Session, AppError> {
    match session {
        Some(s) if s.user_id == user_id => Ok(s),
        Some(_) => Err(AppError::Forbidden(
            "Session belongs to another user".to_string(),
        )),
        None => Err(AppError::NotFound(format!("Session {} not found", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_is_owner_only() {
        let sessions = PuzzleSessions::new();
        let view = sessions.start("alice", 7).await;

        assert!(sessions.view(&view.session_id, "alice").await.is_ok());
        let err = sessions.view(&view.session_id, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = sessions.view("missing", "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_finished_game_reported_once() {
        let sessions = PuzzleSessions::new();
        let view = sessions.start("alice", 42).await;

        // Stacking hard drops in the centre tops out the board.
        let drops = vec![Input::HardDrop; 200];
        let (view, finished) = sessions
            .apply(&view.session_id, "alice", &drops)
            .await
            .unwrap();
        assert!(view.game_over);
        assert!(finished.is_some());

        let (_, again) = sessions
            .apply(&view.session_id, "alice", &[Input::Tick])
            .await
            .unwrap();
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let sessions = PuzzleSessions::new();
        let view = sessions.start("alice", 1).await;
        let inputs = vec![Input::Tick; MAX_INPUTS_PER_BATCH + 1];
        let err = sessions
            .apply(&view.session_id, "alice", &inputs)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
