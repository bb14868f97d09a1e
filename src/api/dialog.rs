use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::ServiceCaller;
use crate::core::state::AppState;
use crate::services::dialog_state::{self, DialogState};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:tg_id", get(load_state).put(save_state).delete(clear_state))
}

async fn load_state(
    State(state): State<AppState>,
    _caller: ServiceCaller,
    Path(tg_id): Path<i64>,
) -> Result<Json<DialogState>, ApiError> {
    Ok(Json(dialog_state::load(state.redis(), tg_id).await?))
}

async fn save_state(
    State(state): State<AppState>,
    _caller: ServiceCaller,
    Path(tg_id): Path<i64>,
    Json(payload): Json<DialogState>,
) -> Result<Json<DialogState>, ApiError> {
    let ttl = state.settings().dialog().ttl_seconds;
    dialog_state::save(state.redis(), tg_id, &payload, ttl).await?;
    tracing::debug!(tg_id, "Dialog state saved");
    Ok(Json(payload))
}

async fn clear_state(
    State(state): State<AppState>,
    _caller: ServiceCaller,
    Path(tg_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    dialog_state::clear(state.redis(), tg_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
