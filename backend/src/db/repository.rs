//! Database repository for profiles, polls and game snapshots.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::badges::{self, UserStats};
use crate::errors::AppError;
use crate::games::lucky_box::OpenOutcome;
use crate::games::{BoxState, PuzzleState, StoreState};
use crate::models::{
    CreatePollRequest, GameSnapshot, LeaderboardEntry, Poll, PollChoice, PollOption, PollStatus,
    UpdateProfileRequest, UserProfile,
};

const PROFILE_COLUMNS: &str = "id, display_name, region, business_category, avatar_url, points, lifetime_points, badges, verified, created_at, updated_at, version";

const POLL_COLUMNS: &str = "id, author_id, question, option_a_label, option_b_label, option_a_votes, option_b_votes, deadline, status, created_at";

/// Which game subtree of `user_games` to write.
#[derive(Debug, Clone, Copy)]
enum GameColumn {
    Box,
    Store,
    Puzzle,
}

impl GameColumn {
    fn as_str(self) -> &'static str {
        match self {
            GameColumn::Box => "box_state",
            GameColumn::Store => "store_state",
            GameColumn::Puzzle => "puzzle_state",
        }
    }
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== PROFILE OPERATIONS ====================

    /// Get a profile by user ID.
    pub async fn get_profile(&self, id: &str) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    /// Get a profile, creating a default one on first access.
    pub async fn ensure_profile(&self, id: &str) -> Result<UserProfile, AppError> {
        if let Some(profile) = self.get_profile(id).await? {
            return Ok(profile);
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, display_name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(default_display_name(id))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created profile for user {}", id);

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Profile {} vanished after insert", id)))
    }

    /// Update a profile with optimistic concurrency control.
    pub async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
    ) -> Result<UserProfile, AppError> {
        let existing = self.ensure_profile(id).await?;

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;

        let display_name = request
            .display_name
            .as_ref()
            .unwrap_or(&existing.display_name);
        let region = request.region.clone().or(existing.region.clone());
        let business_category = request
            .business_category
            .clone()
            .or(existing.business_category.clone());
        let avatar_url = request.avatar_url.clone().or(existing.avatar_url.clone());

        // Use conditional UPDATE with version check to prevent race conditions
        let result = sqlx::query(
            "UPDATE users SET display_name = ?, region = ?, business_category = ?, avatar_url = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(display_name)
        .bind(&region)
        .bind(&business_category)
        .bind(&avatar_url)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            let current = self.get_profile(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|p| p.version).unwrap_or(0),
            });
        }

        Ok(UserProfile {
            display_name: display_name.clone(),
            region,
            business_category,
            avatar_url,
            updated_at: now,
            version: new_version,
            ..existing
        })
    }

    /// Set the verification flag. The business-registration check happens elsewhere.
    pub async fn set_verified(&self, id: &str, verified: bool) -> Result<UserProfile, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE users SET verified = ?, updated_at = ?, version = version + 1 WHERE id = ?",
        )
        .bind(verified as i32)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        tracing::info!("User {} verification set to {}", id, verified);

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Fail with `Forbidden` unless the user exists and is verified.
    pub async fn require_verified(&self, id: &str) -> Result<UserProfile, AppError> {
        let profile = self.ensure_profile(id).await?;
        if !profile.verified {
            return Err(AppError::Forbidden(
                "Business verification is required for this action".to_string(),
            ));
        }
        Ok(profile)
    }

    /// Recompute badges from current stats and append any new ones.
    ///
    /// Returns the badge ids added by this call.
    pub async fn refresh_badges(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let profile = self.ensure_profile(user_id).await?;
        let games = self.load_games(user_id).await?;

        let votes_cast: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM decision_poll_votes WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?
                .get("n");
        let polls_created: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM decision_polls WHERE author_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?
                .get("n");

        let stats = UserStats {
            votes_cast,
            polls_created,
            lifetime_points: profile.lifetime_points,
            ..UserStats::from_games(&games.box_state, &games.store_state, &games.puzzle_state)
        };

        // Merge against the current list under the write lock.
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET badges = badges WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let badges_json: String = sqlx::query("SELECT badges FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .get("badges");
        let mut badges = decode_badges(&badges_json)?;
        let added = badges::merge_badges(&mut badges, &stats);
        if added.is_empty() {
            return Ok(added);
        }

        sqlx::query("UPDATE users SET badges = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&badges)?)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("User {} earned badges {:?}", user_id, added);
        Ok(added)
    }

    // ==================== POLL OPERATIONS ====================

    /// List all polls, newest first.
    pub async fn list_polls(&self, viewer: Option<&str>) -> Result<Vec<Poll>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM decision_polls ORDER BY created_at DESC",
            POLL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut polls: Vec<Poll> = rows.iter().map(|row| poll_from_row(row, now)).collect();

        if let Some(user_id) = viewer {
            let votes = sqlx::query("SELECT poll_id, choice FROM decision_poll_votes WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
            for vote in votes {
                let poll_id: String = vote.get("poll_id");
                let choice: String = vote.get("choice");
                if let Some(poll) = polls.iter_mut().find(|p| p.id == poll_id) {
                    poll.my_vote = PollChoice::from_str(&choice);
                }
            }
        }

        Ok(polls)
    }

    /// Get a poll by ID, with the viewer's vote if any.
    pub async fn get_poll(&self, id: &str, viewer: Option<&str>) -> Result<Option<Poll>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM decision_polls WHERE id = ?",
            POLL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut poll = poll_from_row(&row, Utc::now());

        if let Some(user_id) = viewer {
            let choice: Option<String> = sqlx::query(
                "SELECT choice FROM decision_poll_votes WHERE poll_id = ? AND user_id = ?",
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("choice"));
            poll.my_vote = choice.as_deref().and_then(PollChoice::from_str);
        }

        Ok(Some(poll))
    }

    /// Create a new poll.
    pub async fn create_poll(
        &self,
        author_id: &str,
        request: &CreatePollRequest,
        deadline: DateTime<Utc>,
    ) -> Result<Poll, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let deadline = deadline.to_rfc3339();

        sqlx::query(
            "INSERT INTO decision_polls (id, author_id, question, option_a_label, option_b_label, option_a_votes, option_b_votes, deadline, status, created_at) VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?, ?)",
        )
        .bind(&id)
        .bind(author_id)
        .bind(request.question.trim())
        .bind(request.option_a.trim())
        .bind(request.option_b.trim())
        .bind(&deadline)
        .bind(PollStatus::Active.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Poll {
            id,
            author_id: author_id.to_string(),
            question: request.question.trim().to_string(),
            option_a: PollOption {
                label: request.option_a.trim().to_string(),
                votes: 0,
            },
            option_b: PollOption {
                label: request.option_b.trim().to_string(),
                votes: 0,
            },
            deadline,
            status: PollStatus::Active,
            created_at: now,
            my_vote: None,
        })
    }

    /// Cast or move a vote.
    ///
    /// The vote row and both counters change in one transaction, so the
    /// counters always equal the number of vote rows per option.
    pub async fn vote(
        &self,
        poll_id: &str,
        user_id: &str,
        choice: PollChoice,
    ) -> Result<Poll, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Claim the write lock before reading so concurrent votes serialize.
        let touched = sqlx::query("UPDATE decision_polls SET status = status WHERE id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Poll {} not found", poll_id)));
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM decision_polls WHERE id = ?",
            POLL_COLUMNS
        ))
        .bind(poll_id)
        .fetch_one(&mut *tx)
        .await?;
        let poll = poll_from_row(&row, now);
        if poll.status == PollStatus::Closed {
            return Err(AppError::Validation("Poll is closed".to_string()));
        }

        let previous: Option<String> = sqlx::query(
            "SELECT choice FROM decision_poll_votes WHERE poll_id = ? AND user_id = ?",
        )
        .bind(poll_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("choice"));
        let previous = previous.as_deref().and_then(PollChoice::from_str);

        match previous {
            Some(old) if old == choice => {
                tracing::debug!("User {} re-voted {} on poll {}", user_id, choice.as_str(), poll_id);
            }
            Some(old) => {
                sqlx::query(
                    "UPDATE decision_poll_votes SET choice = ?, voted_at = ? WHERE poll_id = ? AND user_id = ?",
                )
                .bind(choice.as_str())
                .bind(now.to_rfc3339())
                .bind(poll_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
                adjust_votes(&mut tx, poll_id, old, -1).await?;
                adjust_votes(&mut tx, poll_id, choice, 1).await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO decision_poll_votes (poll_id, user_id, choice, voted_at) VALUES (?, ?, ?, ?)",
                )
                .bind(poll_id)
                .bind(user_id)
                .bind(choice.as_str())
                .bind(now.to_rfc3339())
                .execute(&mut *tx)
                .await?;
                adjust_votes(&mut tx, poll_id, choice, 1).await?;
            }
        }

        tx.commit().await?;

        self.get_poll(poll_id, Some(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll {} not found", poll_id)))
    }

    /// Close a poll. Only its author may do so.
    pub async fn close_poll(&self, poll_id: &str, user_id: &str) -> Result<Poll, AppError> {
        let poll = self
            .get_poll(poll_id, Some(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll {} not found", poll_id)))?;

        if poll.author_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can close this poll".to_string(),
            ));
        }

        sqlx::query("UPDATE decision_polls SET status = ? WHERE id = ?")
            .bind(PollStatus::Closed.as_str())
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        Ok(Poll {
            status: PollStatus::Closed,
            ..poll
        })
    }

    // ==================== GAME OPERATIONS ====================

    /// Load a user's game snapshot; missing subtrees come back as defaults.
    pub async fn load_games(&self, user_id: &str) -> Result<GameSnapshot, AppError> {
        let row = sqlx::query(
            "SELECT box_state, store_state, puzzle_state FROM user_games WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(GameSnapshot {
                user_id: user_id.to_string(),
                ..GameSnapshot::default()
            });
        };

        Ok(GameSnapshot {
            user_id: user_id.to_string(),
            box_state: decode_subtree(&row.get::<String, _>("box_state"))?,
            store_state: decode_subtree(&row.get::<String, _>("store_state"))?,
            puzzle_state: decode_subtree(&row.get::<String, _>("puzzle_state"))?,
        })
    }

    /// Overwrite the store subtree. Last write wins.
    pub async fn save_store_state(&self, user_id: &str, state: &StoreState) -> Result<(), AppError> {
        self.save_subtree(user_id, GameColumn::Store, state).await
    }

    /// Record a finished puzzle game. Returns the updated state and whether
    /// the score is a new personal best.
    pub async fn record_puzzle_game(
        &self,
        user_id: &str,
        score: u64,
        lines: u32,
    ) -> Result<(PuzzleState, bool), AppError> {
        let mut puzzle = self.load_games(user_id).await?.puzzle_state;
        let new_high = puzzle.record_game(score, lines);
        self.save_subtree(user_id, GameColumn::Puzzle, &puzzle).await?;
        Ok((puzzle, new_high))
    }

    /// Open lucky boxes atomically.
    ///
    /// `open` sees the current box state and point balance and returns the
    /// outcome; the balance change and the new box state commit together.
    pub async fn open_box<F>(
        &self,
        user_id: &str,
        open: F,
    ) -> Result<(OpenOutcome, BoxState, i64), AppError>
    where
        F: FnOnce(&mut BoxState, i64) -> Result<OpenOutcome, AppError> + Send,
    {
        self.ensure_profile(user_id).await?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Claim the write lock before reading the balance.
        sqlx::query("UPDATE users SET points = points WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let balance: i64 = sqlx::query("SELECT points FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .get("points");

        let box_json: Option<String> =
            sqlx::query("SELECT box_state FROM user_games WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("box_state"));
        let mut box_state: BoxState = match box_json {
            Some(json) => decode_subtree(&json)?,
            None => BoxState::default(),
        };

        let outcome = open(&mut box_state, balance)?;
        let new_balance = balance + outcome.points_delta;

        sqlx::query(
            "UPDATE users SET points = ?, lifetime_points = lifetime_points + ?, updated_at = ? WHERE id = ?",
        )
        .bind(new_balance)
        .bind(outcome.points_won)
        .bind(&now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        upsert_subtree(&mut tx, user_id, GameColumn::Box, &box_state, &now).await?;

        tx.commit().await?;

        tracing::info!(
            "User {} opened {} box(es): spent {}, won {}",
            user_id,
            outcome.rewards.len(),
            outcome.points_spent,
            outcome.points_won
        );

        Ok((outcome, box_state, new_balance))
    }

    /// Top puzzle high scores.
    pub async fn puzzle_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let rows = sqlx::query(
            r#"SELECT g.user_id AS user_id,
                      COALESCE(u.display_name, g.user_id) AS display_name,
                      CAST(json_extract(g.puzzle_state, '$.highScore') AS INTEGER) AS high_score
               FROM user_games g
               LEFT JOIN users u ON u.id = g.user_id
               WHERE json_extract(g.puzzle_state, '$.highScore') > 0
               ORDER BY high_score DESC, g.updated_at ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| LeaderboardEntry {
                rank: i + 1,
                user_id: row.get("user_id"),
                display_name: row.get("display_name"),
                high_score: row.get::<i64, _>("high_score").max(0) as u64,
            })
            .collect())
    }

    #[cfg(test)]
    pub async fn grant_points(&self, user_id: &str, amount: i64) -> Result<(), AppError> {
        self.ensure_profile(user_id).await?;
        sqlx::query("UPDATE users SET points = points + ? WHERE id = ?")
            .bind(amount)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_subtree<T: Serialize>(
        &self,
        user_id: &str,
        column: GameColumn,
        value: &T,
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        upsert_subtree(&mut tx, user_id, column, value, &now).await?;
        tx.commit().await?;
        Ok(())
    }
}

// Helper functions for statements shared by transactions

async fn adjust_votes(
    tx: &mut Transaction<'_, Sqlite>,
    poll_id: &str,
    choice: PollChoice,
    delta: i64,
) -> Result<(), AppError> {
    let column = choice.count_column();
    sqlx::query(&format!(
        "UPDATE decision_polls SET {column} = {column} + ? WHERE id = ?"
    ))
    .bind(delta)
    .bind(poll_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_subtree<T: Serialize>(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    column: GameColumn,
    value: &T,
    now: &str,
) -> Result<(), AppError> {
    let column = column.as_str();
    let json = serde_json::to_string(value)?;
    sqlx::query(&format!(
        "INSERT INTO user_games (user_id, {column}, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET {column} = excluded.{column}, updated_at = excluded.updated_at"
    ))
    .bind(user_id)
    .bind(json)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// Helper functions for row conversion

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserProfile, AppError> {
    let verified: i32 = row.get("verified");
    let badges_str: String = row.get("badges");
    let lifetime_points: i64 = row.get("lifetime_points");
    Ok(UserProfile {
        id: row.get("id"),
        display_name: row.get("display_name"),
        region: row.get("region"),
        business_category: row.get("business_category"),
        avatar_url: row.get("avatar_url"),
        points: row.get("points"),
        lifetime_points,
        level: badges::level_for_points(lifetime_points),
        badges: decode_badges(&badges_str)?,
        verified: verified != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

fn poll_from_row(row: &sqlx::sqlite::SqliteRow, now: DateTime<Utc>) -> Poll {
    let status_str: String = row.get("status");
    let deadline: String = row.get("deadline");
    let mut status = PollStatus::from_str(&status_str).unwrap_or(PollStatus::Closed);

    // Past-deadline polls read as closed whatever the stored status says.
    let expired = DateTime::parse_from_rfc3339(&deadline)
        .map(|d| d.with_timezone(&Utc) <= now)
        .unwrap_or(true);
    if expired {
        status = PollStatus::Closed;
    }

    Poll {
        id: row.get("id"),
        author_id: row.get("author_id"),
        question: row.get("question"),
        option_a: PollOption {
            label: row.get("option_a_label"),
            votes: row.get("option_a_votes"),
        },
        option_b: PollOption {
            label: row.get("option_b_label"),
            votes: row.get("option_b_votes"),
        },
        deadline,
        status,
        created_at: row.get("created_at"),
        my_vote: None,
    }
}

fn decode_badges(json: &str) -> Result<Vec<String>, AppError> {
    serde_json::from_str(json).map_err(|e| {
        tracing::error!("Corrupt badge list: {}", e);
        AppError::Internal(format!("Corrupt badge list: {}", e))
    })
}

fn decode_subtree<T: DeserializeOwned>(json: &str) -> Result<T, AppError> {
    serde_json::from_str(json).map_err(|e| {
        tracing::error!("Corrupt game snapshot: {}", e);
        AppError::Internal(format!("Corrupt game snapshot: {}", e))
    })
}

/// Anonymous handle shown until the user picks a name.
fn default_display_name(id: &str) -> String {
    let start = id.char_indices().rev().nth(3).map(|(i, _)| i).unwrap_or(0);
    format!("익명 사장님 {}", &id[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::games::lucky_box::OPEN_TEN_COST;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .expect("Failed to init DB");
        (Repository::new(pool), temp_dir)
    }

    fn poll_request() -> CreatePollRequest {
        CreatePollRequest {
            question: "점심 메뉴 가격을 올릴까요?".to_string(),
            option_a: "올린다".to_string(),
            option_b: "유지한다".to_string(),
            deadline: String::new(),
        }
    }

    async fn vote_rows(repo: &Repository, poll_id: &str, choice: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS n FROM decision_poll_votes WHERE poll_id = ? AND choice = ?")
            .bind(poll_id)
            .bind(choice)
            .fetch_one(&repo.pool)
            .await
            .unwrap()
            .get("n")
    }

    #[tokio::test]
    async fn test_vote_counters_match_vote_rows() {
        let (repo, _dir) = repo().await;
        let poll = repo
            .create_poll("author", &poll_request(), Utc::now() + Duration::days(1))
            .await
            .unwrap();

        repo.vote(&poll.id, "u1", PollChoice::A).await.unwrap();
        repo.vote(&poll.id, "u2", PollChoice::A).await.unwrap();
        repo.vote(&poll.id, "u3", PollChoice::B).await.unwrap();
        // Move u1 to B, then repeat the same vote
        repo.vote(&poll.id, "u1", PollChoice::B).await.unwrap();
        let poll = repo.vote(&poll.id, "u1", PollChoice::B).await.unwrap();

        assert_eq!(poll.option_a.votes, 1);
        assert_eq!(poll.option_b.votes, 2);
        assert_eq!(poll.option_a.votes, vote_rows(&repo, &poll.id, "A").await);
        assert_eq!(poll.option_b.votes, vote_rows(&repo, &poll.id, "B").await);
        assert_eq!(poll.my_vote, Some(PollChoice::B));
    }

    #[tokio::test]
    async fn test_concurrent_votes_keep_counts_consistent() {
        let (repo, _dir) = repo().await;
        let poll = repo
            .create_poll("author", &poll_request(), Utc::now() + Duration::days(1))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            let poll_id = poll.id.clone();
            handles.push(tokio::spawn(async move {
                let choice = if i % 2 == 0 { PollChoice::A } else { PollChoice::B };
                repo.vote(&poll_id, &format!("user-{}", i % 10), choice).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let poll = repo.get_poll(&poll.id, None).await.unwrap().unwrap();
        assert_eq!(poll.total_votes(), 10);
        assert_eq!(poll.option_a.votes, vote_rows(&repo, &poll.id, "A").await);
        assert_eq!(poll.option_b.votes, vote_rows(&repo, &poll.id, "B").await);
    }

    #[tokio::test]
    async fn test_vote_rejected_after_deadline() {
        let (repo, _dir) = repo().await;
        let poll = repo
            .create_poll("author", &poll_request(), Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let err = repo.vote(&poll.id, "u1", PollChoice::A).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(vote_rows(&repo, &poll.id, "A").await, 0);
    }

    #[tokio::test]
    async fn test_open_ten_debits_and_credits_atomically() {
        let (repo, _dir) = repo().await;
        repo.ensure_profile("u1").await.unwrap();
        sqlx::query("UPDATE users SET points = 120 WHERE id = 'u1'")
            .execute(&repo.pool)
            .await
            .unwrap();

        let (outcome, state, balance) = repo
            .open_box("u1", |state, balance| {
                let mut rng = StdRng::seed_from_u64(8);
                Ok(state.open_ten(&mut rng, balance, Utc::now())?)
            })
            .await
            .unwrap();

        assert_eq!(balance, 120 - OPEN_TEN_COST + outcome.points_won);
        assert_eq!(state.total_opened, 10);

        let profile = repo.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.points, balance);
        assert_eq!(profile.lifetime_points, outcome.points_won);
        let games = repo.load_games("u1").await.unwrap();
        assert_eq!(games.box_state, state);
    }

    #[tokio::test]
    async fn test_failed_open_changes_nothing() {
        let (repo, _dir) = repo().await;

        let err = repo
            .open_box("u1", |state, balance| {
                let mut rng = StdRng::seed_from_u64(8);
                Ok(state.open_ten(&mut rng, balance, Utc::now())?)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientPoints { .. }));

        let games = repo.load_games("u1").await.unwrap();
        assert_eq!(games.box_state, BoxState::default());
        assert_eq!(repo.get_profile("u1").await.unwrap().unwrap().points, 0);
    }

    #[tokio::test]
    async fn test_game_subtrees_are_independent() {
        let (repo, _dir) = repo().await;
        let store = StoreState {
            currency: 77,
            ..StoreState::default()
        };
        repo.save_store_state("u1", &store).await.unwrap();
        repo.record_puzzle_game("u1", 500, 5).await.unwrap();

        let games = repo.load_games("u1").await.unwrap();
        assert_eq!(games.store_state.currency, 77);
        assert_eq!(games.puzzle_state.high_score, 500);
        assert_eq!(games.box_state, BoxState::default());
    }

    #[tokio::test]
    async fn test_badges_append_from_game_stats() {
        let (repo, _dir) = repo().await;
        repo.open_box("u1", |state, _| {
            let mut rng = StdRng::seed_from_u64(1);
            Ok(state.open_free(&mut rng, Utc::now())?)
        })
        .await
        .unwrap();

        let added = repo.refresh_badges("u1").await.unwrap();
        assert!(added.contains(&"first_box".to_string()));
        assert!(repo.refresh_badges("u1").await.unwrap().is_empty());

        let profile = repo.get_profile("u1").await.unwrap().unwrap();
        assert!(profile.badges.contains(&"first_box".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_badge_refreshes_keep_every_badge() {
        let (repo, _dir) = repo().await;
        let poll = repo
            .create_poll("author", &poll_request(), Utc::now() + Duration::days(1))
            .await
            .unwrap();
        repo.vote(&poll.id, "u1", PollChoice::A).await.unwrap();
        repo.open_box("u1", |state, _| {
            let mut rng = StdRng::seed_from_u64(3);
            Ok(state.open_free(&mut rng, Utc::now())?)
        })
        .await
        .unwrap();
        repo.record_puzzle_game("u1", 100, 1).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move { repo.refresh_badges("u1").await }));
        }
        let mut reported = Vec::new();
        for handle in handles {
            reported.extend(handle.await.unwrap().unwrap());
        }

        // Each badge is announced exactly once across all refreshes.
        reported.sort();
        let mut unique = reported.clone();
        unique.dedup();
        assert_eq!(reported, unique);

        let badges = repo.get_profile("u1").await.unwrap().unwrap().badges;
        for id in ["first_vote", "first_box", "block_starter"] {
            assert!(badges.contains(&id.to_string()), "missing {}", id);
            assert!(reported.contains(&id.to_string()));
        }
    }

    #[tokio::test]
    async fn test_corrupt_badge_list_is_an_error() {
        let (repo, _dir) = repo().await;
        repo.ensure_profile("u1").await.unwrap();
        sqlx::query("UPDATE users SET badges = 'not json' WHERE id = 'u1'")
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.get_profile("u1").await,
            Err(AppError::Internal(_))
        ));
        assert!(repo.refresh_badges("u1").await.is_err());

        let stored: String = sqlx::query("SELECT badges FROM users WHERE id = 'u1'")
            .fetch_one(&repo.pool)
            .await
            .unwrap()
            .get("badges");
        assert_eq!(stored, "not json");
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_high_score() {
        let (repo, _dir) = repo().await;
        repo.ensure_profile("alice").await.unwrap();
        repo.record_puzzle_game("alice", 300, 3).await.unwrap();
        repo.record_puzzle_game("bob", 900, 9).await.unwrap();
        repo.record_puzzle_game("carol", 0, 0).await.unwrap();

        let board = repo.puzzle_leaderboard(10).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, "bob");
        assert_eq!(board[0].high_score, 900);
        assert_eq!(board[1].rank, 2);
        assert!(board[1].display_name.starts_with("익명 사장님"));
    }
}
