use serde::Serialize;

use crate::db::models::{Submission, TaskSlot, User};
use crate::repositories::ReviewStore;
use crate::services::error::ReviewError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum GradeStatus {
    NotScored { needed: usize },
    Incomplete { needed: usize },
    Final { mean: f64 },
}

/// A partial set of scores is never averaged.
pub(crate) fn compute_score(submission: &Submission, n_graders: usize) -> GradeStatus {
    let scored = submission.scores.len();
    if scored == 0 {
        return GradeStatus::NotScored { needed: n_graders };
    }
    if scored < n_graders {
        return GradeStatus::Incomplete { needed: n_graders - scored };
    }

    let total: i64 = submission.scores.iter().map(|score| i64::from(*score)).sum();
    let mean = total as f64 / scored as f64;
    GradeStatus::Final { mean: (mean * 10.0).round() / 10.0 }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GradeReport {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    #[serde(flatten)]
    pub(crate) status: GradeStatus,
}

pub(crate) async fn grade_report(
    store: &dyn ReviewStore,
    owner: &User,
    n_graders: usize,
) -> Result<Vec<GradeReport>, ReviewError> {
    let submissions = store.list_by_owner(&owner.id).await?;
    Ok(submissions
        .iter()
        .map(|submission| {
            let TaskSlot { workshop, task } = submission.slot();
            GradeReport { workshop, task, status: compute_score(submission, n_graders) }
        })
        .collect())
}
