use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::TaskSlot;
use crate::schemas::submission::{
    SlotRequest, SubmissionCreate, SubmissionReceiptResponse, SubmissionResponse,
};
use crate::services::grades::{self, GradeReport};
use crate::services::submissions::{self, GraderAssignment, SubmissionCheck};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_submissions).post(create_submission))
        .route("/check", post(check_submission))
        .route("/grades", get(list_grades))
        .route("/graders", get(list_graders))
}

async fn check_submission(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<SlotRequest>,
) -> Result<Json<SubmissionCheck>, ApiError> {
    let check = submissions::check_submission(
        state.store(),
        state.settings().review(),
        &user,
        payload.slot(),
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(check))
}

async fn create_submission(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<SubmissionCreate>,
) -> Result<(StatusCode, Json<SubmissionReceiptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let slot = TaskSlot { workshop: payload.workshop, task: payload.task };
    let receipt = submissions::create_submission(
        state.store(),
        state.settings().review(),
        &user,
        slot,
        payload.document.into_ref(),
        payload.overwrite,
        primitive_now_utc(),
    )
    .await?;

    let status = if receipt.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(SubmissionReceiptResponse::from_receipt(receipt))))
}

async fn list_submissions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let items = submissions::get_by_owner(state.store(), &user).await?;
    Ok(Json(items.into_iter().map(SubmissionResponse::from_db).collect()))
}

async fn list_grades(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<GradeReport>>, ApiError> {
    let report =
        grades::grade_report(state.store(), &user, state.settings().review().n_graders).await?;
    Ok(Json(report))
}

async fn list_graders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<GraderAssignment>>, ApiError> {
    Ok(Json(submissions::get_graded_by(state.store(), &user).await?))
}
