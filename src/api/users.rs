use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentUser, ServiceCaller};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::user::{LateDaysResponse, ScoreHistoryEntry, UserRegister, UserResponse};
use crate::services::grading;
use crate::services::identity::{self, Registration};
use crate::services::submissions::aliases_for;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register))
        .route("/me", get(me))
        .route("/me/late-days", get(late_days))
        .route("/me/score-history", get(score_history))
}

async fn register(
    State(state): State<AppState>,
    _caller: ServiceCaller,
    Json(payload): Json<UserRegister>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let registration = Registration {
        tg_id: payload.tg_id,
        alias: payload.alias,
        nickname: payload.nickname,
        first_name: payload.first_name,
        last_name: payload.last_name,
    };
    let user = identity::register_user(
        state.store(),
        state.settings().review(),
        registration,
        primitive_now_utc(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from_db(user))))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn late_days(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<LateDaysResponse> {
    Json(LateDaysResponse {
        late_days: user.late_days,
        max_late: state.settings().review().max_late,
    })
}

async fn score_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ScoreHistoryEntry>>, ApiError> {
    let records = grading::score_history(state.store(), &user).await?;
    let owner_ids: Vec<String> = records.iter().map(|record| record.owner_id.clone()).collect();
    let aliases = aliases_for(state.store(), &owner_ids).await?;

    let entries = records
        .into_iter()
        .zip(aliases)
        .map(|(record, alias)| ScoreHistoryEntry::from_db(record, alias))
        .collect();
    Ok(Json(entries))
}
