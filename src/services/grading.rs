use serde_json::Number;
use time::PrimitiveDateTime;

use crate::core::config::ReviewSettings;
use crate::core::metrics;
use crate::db::models::{DocumentRef, ScoreRecord, Submission, TaskSlot, User};
use crate::repositories::{ReviewStore, ScoreOutcome};
use crate::services::error::ReviewError;
use crate::services::grades::{compute_score, GradeStatus};
use crate::services::identity::{normalize_alias, UserHandle};
use crate::services::retry::retry_on_conflict;

pub(crate) const MIN_SCORE: i64 = 0;
pub(crate) const MAX_SCORE: i64 = 10;

#[derive(Debug, Clone)]
pub(crate) struct ScoreReceipt {
    pub(crate) submission: Submission,
    pub(crate) status: GradeStatus,
}

/// Accepts integers in `[0, 10]`. `8.0` counts as an integer, `8.5` does not.
pub(crate) fn validate_score(raw: &Number) -> Result<i16, ReviewError> {
    let value = if let Some(value) = raw.as_i64() {
        value
    } else {
        match raw.as_f64() {
            Some(value) if value.fract() == 0.0 && value.abs() <= 1e6 => value as i64,
            _ => return Err(ReviewError::InvalidScore(raw.to_string())),
        }
    };

    if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
        return Err(ReviewError::InvalidScore(raw.to_string()));
    }
    i16::try_from(value).map_err(|_| ReviewError::InvalidScore(raw.to_string()))
}

/// Owners are named by alias; unknown owners and missing submissions are
/// both `NotFound`.
async fn find_owned_submission(
    store: &dyn ReviewStore,
    owner_alias: &str,
    slot: TaskSlot,
) -> Result<Submission, ReviewError> {
    let alias = normalize_alias(owner_alias)?
        .ok_or_else(|| ReviewError::InvalidIdentity("owner alias is empty".to_string()))?;
    let owner = store
        .find_user(&UserHandle::ByAlias(alias))
        .await?
        .ok_or(ReviewError::NotFound("owner"))?;
    store.find_submission(&owner.id, slot).await?.ok_or(ReviewError::NotFound("submission"))
}

pub(crate) async fn submit_score(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    grader: &User,
    owner_alias: &str,
    slot: TaskSlot,
    raw_score: &Number,
    now: PrimitiveDateTime,
) -> Result<ScoreReceipt, ReviewError> {
    let score = validate_score(raw_score)?;
    let submission = find_owned_submission(store, owner_alias, slot).await?;

    let submission_id = submission.id.as_str();
    let grader_id = grader.id.as_str();
    let outcome = retry_on_conflict(settings.conflict_retries, "record_score", move || async move {
        store.record_score(submission_id, grader_id, score, now).await.map_err(ReviewError::from)
    })
    .await?;

    let ScoreOutcome::Recorded(updated) = outcome else {
        tracing::info!(
            grader_id = %grader.id,
            submission_id = %submission.id,
            "Score rejected, no claim held"
        );
        return Err(ReviewError::NotAuthorized { workshop: slot.workshop, task: slot.task });
    };

    metrics::score_recorded();
    tracing::info!(
        grader_id = %grader.id,
        submission_id = %updated.id,
        owner_id = %updated.user_id,
        workshop = slot.workshop,
        task = slot.task,
        score,
        scores = updated.scores.len(),
        "Score recorded"
    );

    let status = compute_score(&updated, settings.n_graders);
    Ok(ScoreReceipt { submission: updated, status })
}

/// Document of a submission the grader currently holds a claim on.
pub(crate) async fn claimed_document(
    store: &dyn ReviewStore,
    grader: &User,
    owner_alias: &str,
    slot: TaskSlot,
) -> Result<DocumentRef, ReviewError> {
    let submission = find_owned_submission(store, owner_alias, slot).await?;
    if !submission.is_claimed_by(&grader.id) {
        return Err(ReviewError::NotAuthorized { workshop: slot.workshop, task: slot.task });
    }
    Ok(submission.document())
}

pub(crate) async fn score_history(
    store: &dyn ReviewStore,
    grader: &User,
) -> Result<Vec<ScoreRecord>, ReviewError> {
    Ok(store.list_score_history(&grader.id).await?)
}
