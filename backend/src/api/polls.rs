//! Decision poll API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};

use super::{success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{CreatePollRequest, Poll, VoteRequest};
use crate::AppState;

const MAX_QUESTION_LEN: usize = 200;
const MAX_OPTION_LEN: usize = 50;

/// GET /api/polls - List all polls, newest first.
pub async fn list_polls(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<Poll>> {
    success(state.repo.list_polls(Some(&user.id)).await?)
}

/// GET /api/polls/:id - Get a poll with the caller's vote.
pub async fn get_poll(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Poll> {
    match state.repo.get_poll(&id, Some(&user.id)).await? {
        Some(poll) => success(poll),
        None => Err(AppError::NotFound(format!("Poll {} not found", id))),
    }
}

/// POST /api/polls - Create a new poll.
pub async fn create_poll(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreatePollRequest>,
) -> ApiResult<Poll> {
    let deadline = validate_poll(&request, Utc::now())?;
    state.repo.require_verified(&user.id).await?;

    let poll = state.repo.create_poll(&user.id, &request, deadline).await?;
    tracing::info!("User {} created poll {}", user.id, poll.id);

    state.repo.refresh_badges(&user.id).await?;
    success(poll)
}

/// POST /api/polls/:id/vote - Cast or move the caller's vote.
pub async fn vote_poll(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<Poll> {
    state.repo.require_verified(&user.id).await?;

    let poll = state.repo.vote(&id, &user.id, request.choice).await?;
    state.repo.refresh_badges(&user.id).await?;
    success(poll)
}

/// POST /api/polls/:id/close - Close a poll (author only).
pub async fn close_poll(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Poll> {
    let poll = state.repo.close_poll(&id, &user.id).await?;
    tracing::info!("User {} closed poll {}", user.id, id);
    success(poll)
}

/// Check a create request and return the parsed deadline.
fn validate_poll(request: &CreatePollRequest, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question is required".to_string()));
    }
    if question.chars().count() > MAX_QUESTION_LEN {
        return Err(AppError::Validation(format!(
            "Question is limited to {} characters",
            MAX_QUESTION_LEN
        )));
    }

    for label in [&request.option_a, &request.option_b] {
        let label = label.trim();
        if label.is_empty() {
            return Err(AppError::Validation("Both options are required".to_string()));
        }
        if label.chars().count() > MAX_OPTION_LEN {
            return Err(AppError::Validation(format!(
                "Options are limited to {} characters",
                MAX_OPTION_LEN
            )));
        }
    }

    let deadline = DateTime::parse_from_rfc3339(&request.deadline)
        .map_err(|_| AppError::Validation("Deadline must be an RFC 3339 timestamp".to_string()))?
        .with_timezone(&Utc);
    if deadline <= now {
        return Err(AppError::Validation(
            "Deadline must be in the future".to_string(),
        ));
    }

    Ok(deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(question: &str, deadline: DateTime<Utc>) -> CreatePollRequest {
        CreatePollRequest {
            question: question.to_string(),
            option_a: "네".to_string(),
            option_b: "아니오".to_string(),
            deadline: deadline.to_rfc3339(),
        }
    }

    #[test]
    fn test_valid_poll_returns_deadline() {
        let now = Utc::now();
        let deadline = now + Duration::hours(3);
        let parsed = validate_poll(&request("배달비 받을까요?", deadline), now).unwrap();
        assert_eq!(parsed.timestamp(), deadline.timestamp());
    }

    #[test]
    fn test_past_deadline_rejected() {
        let now = Utc::now();
        let err = validate_poll(&request("배달비 받을까요?", now - Duration::minutes(1)), now)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_blank_question_rejected() {
        let now = Utc::now();
        assert!(validate_poll(&request("   ", now + Duration::hours(1)), now).is_err());
    }

    #[test]
    fn test_garbage_deadline_rejected() {
        let mut req = request("배달비 받을까요?", Utc::now());
        req.deadline = "tomorrow".to_string();
        assert!(validate_poll(&req, Utc::now()).is_err());
    }
}
