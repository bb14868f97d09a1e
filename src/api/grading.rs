use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::grading::{DocumentQuery, ScoreCreate, ScoreResponse};
use crate::schemas::submission::DocumentPayload;
use crate::services::grading;
use crate::services::submissions::{self, OpenClaim};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/claims", get(list_claims))
        .route("/document", get(claimed_document))
        .route("/scores", post(submit_score))
}

async fn list_claims(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<OpenClaim>>, ApiError> {
    Ok(Json(submissions::get_open_claims(state.store(), &user).await?))
}

async fn claimed_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<DocumentQuery>,
) -> Result<Json<DocumentPayload>, ApiError> {
    let document =
        grading::claimed_document(state.store(), &user, &params.owner, params.slot()).await?;
    Ok(Json(DocumentPayload::from_ref(document)))
}

async fn submit_score(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ScoreCreate>,
) -> Result<Json<ScoreResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let receipt = grading::submit_score(
        state.store(),
        state.settings().review(),
        &user,
        &payload.owner,
        payload.slot(),
        &payload.score,
        primitive_now_utc(),
    )
    .await?;

    Ok(Json(ScoreResponse {
        workshop: receipt.submission.workshop_number,
        task: receipt.submission.task_number,
        scores_received: receipt.submission.scores.len(),
        status: receipt.status,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::{identity_request, read_json, register, setup_test_context, submit};

    async fn score(
        app: &axum::Router,
        grader: i64,
        owner: &str,
        value: serde_json::Value,
    ) -> axum::response::Response {
        app.clone()
            .oneshot(identity_request(
                Method::POST,
                "/api/v1/grading/scores",
                grader,
                None,
                Some(json!({ "owner": owner, "workshop": 1, "task": 1, "score": value })),
            ))
            .await
            .expect("score")
    }

    #[tokio::test]
    async fn two_scores_finalize_the_grade() {
        let ctx = setup_test_context().await;
        for (tg_id, alias) in [(1, "ann"), (2, "ben"), (3, "cat")] {
            register(&ctx.app, tg_id, alias).await;
            submit(&ctx.app, tg_id, 1, 1).await;
        }

        let response = ctx
            .app
            .clone()
            .oneshot(identity_request(Method::GET, "/api/v1/grading/claims", 2, None, None))
            .await
            .expect("claims");
        let claims = read_json(response).await;
        assert!(claims
            .as_array()
            .expect("array")
            .iter()
            .any(|claim| claim["owner_alias"] == "ann"));

        let response = ctx
            .app
            .clone()
            .oneshot(identity_request(
                Method::GET,
                "/api/v1/grading/document?owner=ann&workshop=1&task=1",
                2,
                None,
                None,
            ))
            .await
            .expect("document");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["file_id"], "file-1-1-1");

        let response = score(&ctx.app, 2, "ann", json!(8)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "incomplete");
        assert_eq!(body["needed"], 1);

        let response = score(&ctx.app, 3, "@ann", json!(10)).await;
        let body = read_json(response).await;
        assert_eq!(body["status"], "final");
        assert_eq!(body["mean"], 9.0);

        let response = ctx
            .app
            .clone()
            .oneshot(identity_request(Method::GET, "/api/v1/users/me/score-history", 2, None, None))
            .await
            .expect("history");
        let history = read_json(response).await;
        assert_eq!(history[0]["graded_user"], "ann");
        assert_eq!(history[0]["score"], 8);
    }

    #[tokio::test]
    async fn score_without_claim_is_forbidden() {
        let ctx = setup_test_context().await;
        register(&ctx.app, 1, "ann").await;
        register(&ctx.app, 2, "ben").await;
        submit(&ctx.app, 1, 1, 1).await;

        let response = score(&ctx.app, 2, "ann", json!(5)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(read_json(response).await["kind"], "NotAuthorized");
    }

    #[tokio::test]
    async fn out_of_range_score_is_unprocessable() {
        let ctx = setup_test_context().await;
        register(&ctx.app, 1, "ann").await;

        let response = score(&ctx.app, 1, "ann", json!(11)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json(response).await;
        assert_eq!(body["kind"], "InvalidScore");
        assert_eq!(body["params"]["max"], 10);
    }
}
