//! Grading fan-out. A new submission both takes on claims against peer
//! submissions in its slot and receives graders from those peers. Every
//! claim is a compare-and-set against the store, so concurrent submissions
//! to the same slot can never push a submission past `n_graders`.

use rand::seq::SliceRandom;
use time::PrimitiveDateTime;

use crate::core::config::ReviewSettings;
use crate::core::metrics;
use crate::db::models::Submission;
use crate::repositories::{ClaimOutcome, ReviewStore};
use crate::services::error::ReviewError;
use crate::services::retry::retry_on_conflict;

#[derive(Debug, Clone, Default)]
pub(crate) struct AssignmentOutcome {
    /// Peer submissions the submitter now holds a claim on.
    pub(crate) to_grade: Vec<Submission>,
    /// User ids that now hold a claim on the new submission.
    pub(crate) graders: Vec<String>,
    /// Users linked in both directions with the submitter by this run.
    pub(crate) reciprocal: Vec<String>,
}

/// Uniform sample without replacement. The RNG never lives across an await.
fn draw<T: Clone>(items: &[T], count: usize) -> Vec<T> {
    let mut rng = rand::thread_rng();
    items.choose_multiple(&mut rng, count).cloned().collect()
}

async fn claim(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    submission_id: &str,
    grader_id: &str,
    now: PrimitiveDateTime,
) -> Result<ClaimOutcome, ReviewError> {
    let cap = settings.n_graders;
    let outcome = retry_on_conflict(settings.conflict_retries, "try_claim", move || async move {
        store.try_claim(submission_id, grader_id, cap, now).await.map_err(ReviewError::from)
    })
    .await?;

    metrics::grading_claim(outcome.as_str());
    tracing::debug!(submission_id, grader_id, outcome = outcome.as_str(), "Claim attempt");
    Ok(outcome)
}

/// Step one: the submitter claims up to N open peer submissions. Lost races
/// trigger a refresh of the candidate pool, for at most `claim_rounds` rounds.
async fn claim_peer_submissions(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    submission: &Submission,
    now: PrimitiveDateTime,
) -> Result<Vec<Submission>, ReviewError> {
    let slot = submission.slot();
    let submitter = submission.user_id.as_str();
    let cap = settings.n_graders;
    let mut claimed: Vec<Submission> = Vec::new();

    for round in 1..=settings.claim_rounds {
        let wanted = cap.saturating_sub(claimed.len());
        if wanted == 0 {
            break;
        }

        let candidates = retry_on_conflict(settings.conflict_retries, "list_open", move || async move {
            store.list_open_for_grading(slot, submitter, cap).await.map_err(ReviewError::from)
        })
        .await?;
        let candidates: Vec<Submission> = candidates
            .into_iter()
            .filter(|candidate| claimed.iter().all(|held| held.id != candidate.id))
            .collect();
        let drawn = draw(&candidates, wanted);
        if drawn.is_empty() {
            break;
        }

        let mut lost = 0usize;
        for candidate in drawn {
            match claim(store, settings, &candidate.id, submitter, now).await? {
                ClaimOutcome::Claimed | ClaimOutcome::AlreadyHeld => claimed.push(candidate),
                ClaimOutcome::Full => lost += 1,
                ClaimOutcome::Ineligible | ClaimOutcome::Missing => {}
            }
        }

        if lost == 0 {
            break;
        }
        tracing::debug!(
            submission_id = %submission.id,
            round,
            lost,
            "Lost claim races, refreshing candidates"
        );
    }

    Ok(claimed)
}

/// Step two: peers in the slot whose own load is below N become graders of
/// the new submission, one compare-and-set per peer.
async fn reserve_graders(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    submission: &Submission,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, ReviewError> {
    let slot = submission.slot();
    let owner = submission.user_id.as_str();
    let cap = settings.n_graders;
    let mut graders: Vec<String> = submission.graders.clone();

    'rounds: for round in 1..=settings.claim_rounds {
        let wanted = cap.saturating_sub(graders.len() + submission.scores.len());
        if wanted == 0 {
            break;
        }

        let peers = retry_on_conflict(settings.conflict_retries, "list_peers", move || async move {
            store.list_slot_peers(slot, owner, cap).await.map_err(ReviewError::from)
        })
        .await?;
        let peers: Vec<String> = peers
            .into_iter()
            .filter(|peer| !graders.contains(peer) && !submission.is_scored_by(peer))
            .collect();
        let drawn = draw(&peers, wanted);
        if drawn.is_empty() {
            break;
        }

        let mut lost = 0usize;
        for peer in drawn {
            match claim(store, settings, &submission.id, &peer, now).await? {
                ClaimOutcome::Claimed | ClaimOutcome::AlreadyHeld => graders.push(peer),
                ClaimOutcome::Full => {
                    tracing::debug!(submission_id = %submission.id, round, "Submission is full");
                    break 'rounds;
                }
                ClaimOutcome::Ineligible | ClaimOutcome::Missing => lost += 1,
            }
        }

        if lost == 0 {
            break;
        }
    }

    Ok(graders)
}

/// Runs both assignment passes for a freshly stored submission. The passes
/// are independent; a pair linked in both directions is reported, not undone.
pub(crate) async fn assign_on_submission(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    submission: &Submission,
    now: PrimitiveDateTime,
) -> Result<AssignmentOutcome, ReviewError> {
    let to_grade = claim_peer_submissions(store, settings, submission, now).await?;
    let graders = reserve_graders(store, settings, submission, now).await?;

    let reciprocal: Vec<String> = to_grade
        .iter()
        .map(|peer| peer.user_id.clone())
        .filter(|owner| graders.contains(owner))
        .collect();
    if !reciprocal.is_empty() {
        tracing::warn!(
            submission_id = %submission.id,
            user_id = %submission.user_id,
            reciprocal = ?reciprocal,
            "Submitter and peers now grade each other"
        );
    }

    tracing::info!(
        submission_id = %submission.id,
        user_id = %submission.user_id,
        workshop = submission.workshop_number,
        task = submission.task_number,
        to_grade = to_grade.len(),
        graders = graders.len(),
        "Assignment completed"
    );

    Ok(AssignmentOutcome { to_grade, graders, reciprocal })
}
