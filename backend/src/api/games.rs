//! Lucky box and store game API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{success, ApiResult};
use crate::auth::CurrentUser;
use crate::games::lucky_box::OPEN_TEN_COST;
use crate::models::{
    BoxView, OpenBoxResponse, PurchaseResponse, StoreTickRequest, StoreTickResponse, StoreView,
};
use crate::AppState;

// ==================== LUCKY BOX ====================

/// GET /api/games/box - Box state and free-open availability.
pub async fn get_box(State(state): State<AppState>, user: CurrentUser) -> ApiResult<BoxView> {
    let games = state.repo.load_games(&user.id).await?;
    let free_open_available = games.box_state.can_open_free(Utc::now());

    success(BoxView {
        state: games.box_state,
        free_open_available,
        open_ten_cost: OPEN_TEN_COST,
    })
}

/// POST /api/games/box/open - The free daily open.
pub async fn open_box(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<OpenBoxResponse> {
    let now = Utc::now();
    let (outcome, _, balance) = state
        .repo
        .open_box(&user.id, move |box_state, _| {
            Ok(box_state.open_free(&mut rand::thread_rng(), now)?)
        })
        .await?;

    let new_badges = state.repo.refresh_badges(&user.id).await?;
    success(OpenBoxResponse {
        outcome,
        points_balance: balance,
        new_badges,
    })
}

/// POST /api/games/box/open-ten - Paid ten-pull.
pub async fn open_ten_boxes(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<OpenBoxResponse> {
    let now = Utc::now();
    let (outcome, _, balance) = state
        .repo
        .open_box(&user.id, move |box_state, balance| {
            Ok(box_state.open_ten(&mut rand::thread_rng(), balance, now)?)
        })
        .await?;

    let new_badges = state.repo.refresh_badges(&user.id).await?;
    success(OpenBoxResponse {
        outcome,
        points_balance: balance,
        new_badges,
    })
}

// ==================== STORE ====================

/// GET /api/games/store - Load the store, crediting offline earnings.
pub async fn get_store(State(state): State<AppState>, user: CurrentUser) -> ApiResult<StoreView> {
    let mut store = state.repo.load_games(&user.id).await?.store_state;
    let credit = store.reconcile_offline(Utc::now());
    state.repo.save_store_state(&user.id, &store).await?;

    if credit > 0 {
        tracing::debug!("User {} earned {} while away", user.id, credit);
        state.repo.refresh_badges(&user.id).await?;
    }

    success(StoreView::new(store, Some(credit)))
}

/// POST /api/games/store/tick - Apply reported active play.
pub async fn tick_store(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<StoreTickRequest>,
) -> ApiResult<StoreTickResponse> {
    let mut store = state.repo.load_games(&user.id).await?.store_state;
    let report = store.apply_play(request.seconds, request.clicks, Utc::now())?;
    state.repo.save_store_state(&user.id, &store).await?;

    let new_badges = state.repo.refresh_badges(&user.id).await?;
    success(StoreTickResponse {
        report,
        store: StoreView::new(store, None),
        new_badges,
    })
}

/// POST /api/games/store/upgrades/:id - Buy one unit of an upgrade.
pub async fn purchase_upgrade(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(upgrade_id): Path<String>,
) -> ApiResult<PurchaseResponse> {
    let mut store = state.repo.load_games(&user.id).await?.store_state;
    let receipt = store.purchase(&upgrade_id)?;
    state.repo.save_store_state(&user.id, &store).await?;

    tracing::info!(
        "User {} bought {} for {} (now owns {})",
        user.id,
        receipt.upgrade_id,
        receipt.cost,
        receipt.owned
    );

    success(PurchaseResponse {
        receipt,
        store: StoreView::new(store, None),
    })
}
