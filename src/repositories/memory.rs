use std::collections::HashMap;

use async_trait::async_trait;
use time::PrimitiveDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::models::{DocumentRef, ScoreRecord, Submission, TaskSlot, User};
use crate::repositories::{
    ClaimOutcome, CreateSubmission, CreateUser, LateCharge, LateDaySpend, ReviewStore,
    ScoreOutcome, StoreError,
};
use crate::services::identity::UserHandle;

/// Process-local backend. Each operation runs inside one critical section and
/// never awaits while holding the lock.
#[derive(Default)]
pub(crate) struct MemoryReviewStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    submissions: HashMap<String, Submission>,
    slots: HashMap<(String, TaskSlot), String>,
    history: Vec<ScoreRecord>,
}

fn sorted(mut items: Vec<&Submission>) -> Vec<Submission> {
    items.sort_by(|a, b| {
        (a.workshop_number, a.task_number, a.created_at, &a.id).cmp(&(
            b.workshop_number,
            b.task_number,
            b.created_at,
            &b.id,
        ))
    });
    items.into_iter().cloned().collect()
}

impl MemoryState {
    fn in_slot(&self, slot: TaskSlot) -> impl Iterator<Item = &Submission> {
        self.submissions.values().filter(move |submission| submission.slot() == slot)
    }
}

impl MemoryReviewStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

const ALIAS_CONSTRAINT: &str = "uq_users_alias";

/// Aliases are unique ignoring ASCII case, like the `uq_users_alias` index.
fn alias_taken(users: &HashMap<String, User>, alias: &str, except_id: &str) -> bool {
    users.values().any(|user| {
        user.id != except_id
            && user.tg_username.as_deref().is_some_and(|known| known.eq_ignore_ascii_case(alias))
    })
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_user(&self, params: CreateUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| user.tg_id == params.tg_id) {
            return Err(StoreError::Duplicate("users_tg_id_key".to_string()));
        }
        if let Some(alias) = params.tg_username.as_deref() {
            if alias_taken(&state.users, alias, &params.id) {
                return Err(StoreError::Duplicate(ALIAS_CONSTRAINT.to_string()));
            }
        }

        let user = User {
            id: params.id,
            tg_id: params.tg_id,
            tg_username: params.tg_username,
            nickname: params.nickname,
            first_name: params.first_name,
            last_name: params.last_name,
            late_days: params.late_days,
            created_at: params.now,
            updated_at: params.now,
        };
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, handle: &UserHandle) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        let earliest = |user: &&User| (user.created_at, user.id.clone());

        let found = match handle {
            UserHandle::ById(tg_id) => state.users.values().find(|user| user.tg_id == *tg_id),
            UserHandle::ByAlias(alias) => state
                .users
                .values()
                .filter(|user| {
                    user.tg_username
                        .as_deref()
                        .is_some_and(|known| known.eq_ignore_ascii_case(alias))
                })
                .min_by_key(earliest),
            UserHandle::ByNickname(nickname) => state
                .users
                .values()
                .filter(|user| &user.nickname == nickname)
                .min_by_key(earliest),
        };

        Ok(found.cloned())
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn update_alias(
        &self,
        user_id: &str,
        alias: Option<&str>,
        now: PrimitiveDateTime,
    ) -> Result<Option<User>, StoreError> {
        let mut state = self.state.lock().await;
        if alias.is_some_and(|alias| alias_taken(&state.users, alias, user_id)) {
            return Err(StoreError::Duplicate(ALIAS_CONSTRAINT.to_string()));
        }
        let Some(user) = state.users.get_mut(user_id) else {
            return Ok(None);
        };

        user.tg_username = alias.map(str::to_string);
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn spend_late_days(
        &self,
        user_id: &str,
        days: i32,
        charge: Option<LateCharge<'_>>,
        now: PrimitiveDateTime,
    ) -> Result<LateDaySpend, StoreError> {
        let mut state = self.state.lock().await;
        let Some(available) = state.users.get(user_id).map(|user| user.late_days) else {
            return Ok(LateDaySpend::UnknownUser);
        };

        if let Some(charge) = charge {
            let Some(submission) = state.submissions.get(charge.submission_id) else {
                return Err(StoreError::Database(sqlx::Error::RowNotFound));
            };
            if submission.late_days_used != charge.expected_used {
                return Ok(LateDaySpend::ChargeMoved { charged: submission.late_days_used });
            }
        }

        if available < days {
            return Ok(LateDaySpend::Insufficient { available });
        }

        if let Some(charge) = charge {
            if let Some(submission) = state.submissions.get_mut(charge.submission_id) {
                submission.late_days_used = charge.total_used;
                submission.updated_at = now;
            }
        }

        let Some(user) = state.users.get_mut(user_id) else {
            return Ok(LateDaySpend::UnknownUser);
        };
        user.late_days -= days;
        user.updated_at = now;
        Ok(LateDaySpend::Spent { remaining: user.late_days })
    }

    async fn list_score_history(&self, grader_id: &str) -> Result<Vec<ScoreRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.history.iter().filter(|record| record.grader_id == grader_id).cloned().collect())
    }

    async fn find_submission(
        &self,
        owner_id: &str,
        slot: TaskSlot,
    ) -> Result<Option<Submission>, StoreError> {
        let state = self.state.lock().await;
        let found = state
            .slots
            .get(&(owner_id.to_string(), slot))
            .and_then(|id| state.submissions.get(id))
            .cloned();
        Ok(found)
    }

    async fn insert_submission(&self, params: CreateSubmission) -> Result<Submission, StoreError> {
        let mut state = self.state.lock().await;
        let key = (params.user_id.clone(), params.slot);
        if state.slots.contains_key(&key) {
            return Err(StoreError::Duplicate("uq_submissions_owner_slot".to_string()));
        }

        let submission = Submission {
            id: params.id,
            user_id: params.user_id,
            workshop_number: params.slot.workshop,
            task_number: params.slot.task,
            file_id: params.document.file_id,
            file_name: params.document.file_name,
            file_size: params.document.file_size,
            mime_type: params.document.mime_type,
            graders: Vec::new(),
            scores: Vec::new(),
            scorers: Vec::new(),
            late_days_used: 0,
            submitted_at: params.now,
            created_at: params.now,
            updated_at: params.now,
        };
        state.slots.insert(key, submission.id.clone());
        state.submissions.insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    async fn replace_document(
        &self,
        submission_id: &str,
        document: &DocumentRef,
        now: PrimitiveDateTime,
    ) -> Result<Option<Submission>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(submission) = state.submissions.get_mut(submission_id) else {
            return Ok(None);
        };

        submission.file_id = document.file_id.clone();
        submission.file_name = document.file_name.clone();
        submission.file_size = document.file_size;
        submission.mime_type = document.mime_type.clone();
        submission.submitted_at = now;
        submission.updated_at = now;
        Ok(Some(submission.clone()))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.lock().await;
        let owned =
            state.submissions.values().filter(|submission| submission.user_id == owner_id).collect();
        Ok(sorted(owned))
    }

    async fn list_claimed_by(&self, grader_id: &str) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.lock().await;
        let claimed = state
            .submissions
            .values()
            .filter(|submission| submission.is_claimed_by(grader_id))
            .collect();
        Ok(sorted(claimed))
    }

    async fn list_open_for_grading(
        &self,
        slot: TaskSlot,
        grader_id: &str,
        cap: usize,
    ) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.lock().await;
        let open = state
            .in_slot(slot)
            .filter(|submission| {
                submission.user_id != grader_id
                    && !submission.is_claimed_by(grader_id)
                    && !submission.is_scored_by(grader_id)
                    && submission.load() < cap
            })
            .collect();
        Ok(sorted(open))
    }

    async fn list_slot_peers(
        &self,
        slot: TaskSlot,
        exclude_owner: &str,
        cap: usize,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let mut peers: Vec<&Submission> =
            state.in_slot(slot).filter(|submission| submission.user_id != exclude_owner).collect();
        peers.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let owners = peers
            .into_iter()
            .filter(|peer| {
                let load = state
                    .in_slot(slot)
                    .filter(|other| {
                        other.is_claimed_by(&peer.user_id) || other.is_scored_by(&peer.user_id)
                    })
                    .count();
                load < cap
            })
            .map(|peer| peer.user_id.clone())
            .collect();
        Ok(owners)
    }

    async fn try_claim(
        &self,
        submission_id: &str,
        grader_id: &str,
        cap: usize,
        now: PrimitiveDateTime,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(submission) = state.submissions.get_mut(submission_id) else {
            return Ok(ClaimOutcome::Missing);
        };

        if submission.is_claimed_by(grader_id) {
            return Ok(ClaimOutcome::AlreadyHeld);
        }
        if submission.user_id == grader_id || submission.is_scored_by(grader_id) {
            return Ok(ClaimOutcome::Ineligible);
        }
        if submission.load() >= cap {
            return Ok(ClaimOutcome::Full);
        }

        submission.graders.push(grader_id.to_string());
        submission.updated_at = now;
        Ok(ClaimOutcome::Claimed)
    }

    async fn record_score(
        &self,
        submission_id: &str,
        grader_id: &str,
        score: i16,
        now: PrimitiveDateTime,
    ) -> Result<ScoreOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(submission) = state.submissions.get_mut(submission_id) else {
            return Ok(ScoreOutcome::NotHeld);
        };

        let Some(position) = submission.graders.iter().position(|grader| grader == grader_id)
        else {
            return Ok(ScoreOutcome::NotHeld);
        };

        submission.graders.remove(position);
        submission.scores.push(score);
        submission.scorers.push(grader_id.to_string());
        submission.updated_at = now;
        let updated = submission.clone();

        state.history.push(ScoreRecord {
            id: Uuid::new_v4().to_string(),
            grader_id: grader_id.to_string(),
            owner_id: updated.user_id.clone(),
            submission_id: updated.id.clone(),
            workshop_number: updated.workshop_number,
            task_number: updated.task_number,
            score,
            created_at: now,
        });

        Ok(ScoreOutcome::Recorded(updated))
    }
}
