use time::PrimitiveDateTime;

use crate::core::metrics;
use crate::db::models::{Submission, TaskSlot};
use crate::repositories::{LateCharge, LateDaySpend, ReviewStore};
use crate::services::error::ReviewError;
use crate::services::retry::retry_on_conflict;

/// Result of charging a submission for its late days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmissionCharge {
    /// The submission already records at least the required days.
    AlreadyPaid { charged: i32 },
    Spent { used: i32, remaining: i32 },
}

/// Atomically takes `days` from the user's pool and returns the new balance.
pub(crate) async fn spend_late_days(
    store: &dyn ReviewStore,
    user_id: &str,
    days: i32,
    conflict_retries: u32,
    now: PrimitiveDateTime,
) -> Result<i32, ReviewError> {
    if days < 0 {
        return Err(ReviewError::InvalidLateDays(days));
    }

    let outcome = retry_on_conflict(conflict_retries, "spend_late_days", move || async move {
        store.spend_late_days(user_id, days, None, now).await.map_err(ReviewError::from)
    })
    .await?;

    match outcome {
        LateDaySpend::Spent { remaining } => {
            record_spend(user_id, days, remaining);
            Ok(remaining)
        }
        LateDaySpend::Insufficient { available } => {
            Err(ReviewError::InsufficientLateDays { needed: days, available })
        }
        LateDaySpend::UnknownUser => Err(ReviewError::UserNotFound),
        LateDaySpend::ChargeMoved { .. } => Err(ReviewError::StorageConflict),
    }
}

/// Brings the submission's recorded charge up to `required` days, spending
/// only the difference. Concurrent charges of the same submission re-read the
/// recorded charge, so the user pays each day once.
pub(crate) async fn charge_submission(
    store: &dyn ReviewStore,
    submission: &Submission,
    required: i32,
    conflict_retries: u32,
    now: PrimitiveDateTime,
) -> Result<SubmissionCharge, ReviewError> {
    if required < 0 {
        return Err(ReviewError::InvalidLateDays(required));
    }

    let owner_id = submission.user_id.as_str();
    let submission_id = submission.id.as_str();
    let slot = submission.slot();
    retry_on_conflict(conflict_retries, "charge_submission", move || {
        charge_once(store, owner_id, slot, submission_id, required, now)
    })
    .await
}

async fn charge_once(
    store: &dyn ReviewStore,
    owner_id: &str,
    slot: TaskSlot,
    submission_id: &str,
    required: i32,
    now: PrimitiveDateTime,
) -> Result<SubmissionCharge, ReviewError> {
    let current = store
        .find_submission(owner_id, slot)
        .await?
        .filter(|submission| submission.id == submission_id)
        .ok_or(ReviewError::NotFound("submission"))?;

    let days = required - current.late_days_used;
    if days <= 0 {
        return Ok(SubmissionCharge::AlreadyPaid { charged: current.late_days_used });
    }

    let charge =
        LateCharge { submission_id, expected_used: current.late_days_used, total_used: required };
    match store.spend_late_days(owner_id, days, Some(charge), now).await? {
        LateDaySpend::Spent { remaining } => {
            record_spend(owner_id, days, remaining);
            Ok(SubmissionCharge::Spent { used: days, remaining })
        }
        LateDaySpend::Insufficient { available } => {
            Err(ReviewError::InsufficientLateDays { needed: days, available })
        }
        LateDaySpend::UnknownUser => Err(ReviewError::UserNotFound),
        LateDaySpend::ChargeMoved { charged } => {
            tracing::debug!(submission_id, charged, "Late-day charge moved, re-reading");
            Err(ReviewError::StorageConflict)
        }
    }
}

fn record_spend(user_id: &str, days: i32, remaining: i32) {
    if days > 0 {
        metrics::late_days_spent(days);
        tracing::info!(user_id, days, remaining, "Late days spent");
    }
}
