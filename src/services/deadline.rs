use serde::Serialize;
use time::PrimitiveDateTime;

use crate::core::config::ReviewSettings;
use crate::services::error::ReviewError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum SubmissionTiming {
    OnTime,
    Late { days: i64 },
    Rejected { days_late: i64 },
}

impl SubmissionTiming {
    /// Late days an accepted submission must pay for.
    pub(crate) fn late_days_required(self) -> i32 {
        match self {
            Self::Late { days } => i32::try_from(days).unwrap_or(i32::MAX),
            Self::OnTime | Self::Rejected { .. } => 0,
        }
    }
}

/// Whole days elapsed since the deadline decide the outcome: up to zero is on
/// time, up to `max_late` is late, anything beyond is rejected.
pub(crate) fn evaluate_submission_time(
    deadline: PrimitiveDateTime,
    now: PrimitiveDateTime,
    max_late: i64,
) -> SubmissionTiming {
    let delta = (now - deadline).whole_days();
    if delta <= 0 {
        SubmissionTiming::OnTime
    } else if delta <= max_late {
        SubmissionTiming::Late { days: delta }
    } else {
        SubmissionTiming::Rejected { days_late: delta }
    }
}

pub(crate) fn evaluate_for_workshop(
    settings: &ReviewSettings,
    workshop: i32,
    now: PrimitiveDateTime,
) -> Result<SubmissionTiming, ReviewError> {
    let deadline = settings.deadline(workshop).ok_or(ReviewError::UnknownWorkshop { workshop })?;
    Ok(evaluate_submission_time(deadline, now, settings.max_late))
}

/// Like `evaluate_for_workshop`, but a rejection becomes `DeadlinePassed`.
pub(crate) fn require_accepting(
    settings: &ReviewSettings,
    workshop: i32,
    now: PrimitiveDateTime,
) -> Result<SubmissionTiming, ReviewError> {
    match evaluate_for_workshop(settings, workshop, now)? {
        SubmissionTiming::Rejected { days_late } => Err(ReviewError::DeadlinePassed {
            workshop,
            days_late,
            max_late: settings.max_late,
        }),
        timing => Ok(timing),
    }
}
