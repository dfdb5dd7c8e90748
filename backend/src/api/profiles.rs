//! Profile and badge API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::auth::{Admin, CurrentUser};
use crate::badges::BADGES;
use crate::errors::AppError;
use crate::models::{BadgeInfo, SetVerificationRequest, UpdateProfileRequest, UserProfile};
use crate::AppState;

const MAX_DISPLAY_NAME_LEN: usize = 30;

/// GET /api/profile - The caller's profile, created on first access.
pub async fn get_my_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<UserProfile> {
    success(state.repo.ensure_profile(&user.id).await?)
}

/// PUT /api/profile - Update the caller's profile.
pub async fn update_my_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<UserProfile> {
    if let Some(name) = &request.display_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(
                "Display name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(AppError::Validation(format!(
                "Display name is limited to {} characters",
                MAX_DISPLAY_NAME_LEN
            )));
        }
    }

    let request = UpdateProfileRequest {
        display_name: request.display_name.map(|n| n.trim().to_string()),
        ..request
    };

    success(state.repo.update_profile(&user.id, &request).await?)
}

/// GET /api/users/:id - A member's public profile.
pub async fn get_user_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserProfile> {
    match state.repo.get_profile(&id).await? {
        Some(profile) => success(profile),
        None => Err(AppError::NotFound(format!("User {} not found", id))),
    }
}

/// PUT /api/users/:id/verification - Set the verification flag (admin only).
pub async fn set_user_verification(
    _admin: Admin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetVerificationRequest>,
) -> ApiResult<UserProfile> {
    state.repo.ensure_profile(&id).await?;
    success(state.repo.set_verified(&id, request.verified).await?)
}

/// GET /api/badges - The badge catalog.
pub async fn list_badges() -> ApiResult<Vec<BadgeInfo>> {
    success(
        BADGES
            .iter()
            .map(|b| BadgeInfo {
                id: b.id.to_string(),
                name: b.name.to_string(),
            })
            .collect(),
    )
}
