pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{DocumentRef, ScoreRecord, Submission, TaskSlot, User};
use crate::services::identity::UserHandle;

pub(crate) use memory::MemoryReviewStore;
pub(crate) use postgres::PgReviewStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// Serialization failure or deadlock; safe to retry.
    #[error("concurrent write conflict")]
    Conflict,
    #[error("duplicate key violates {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => return Self::Conflict,
                Some("23505") => {
                    let constraint = db_err.constraint().unwrap_or("unique constraint");
                    return Self::Duplicate(constraint.to_string());
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}

pub(crate) struct CreateUser {
    pub(crate) id: String,
    pub(crate) tg_id: i64,
    pub(crate) tg_username: Option<String>,
    pub(crate) nickname: String,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) late_days: i32,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) struct CreateSubmission {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) slot: TaskSlot,
    pub(crate) document: DocumentRef,
    pub(crate) now: PrimitiveDateTime,
}

/// Moves a submission's recorded charge from `expected_used` to `total_used`
/// in the same atomic step as the balance decrement. The charge is a
/// compare-and-set: if the submission no longer records `expected_used`,
/// nothing is written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LateCharge<'a> {
    pub(crate) submission_id: &'a str,
    pub(crate) expected_used: i32,
    pub(crate) total_used: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LateDaySpend {
    Spent { remaining: i32 },
    Insufficient { available: i32 },
    UnknownUser,
    /// The submission's charge changed since it was read; `charged` is the
    /// current value. No balance was taken.
    ChargeMoved { charged: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClaimOutcome {
    Claimed,
    /// `graders + scores` already at the cap.
    Full,
    AlreadyHeld,
    /// Owner of the submission, or already scored it.
    Ineligible,
    Missing,
}

impl ClaimOutcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Full => "full",
            Self::AlreadyHeld => "already_held",
            Self::Ineligible => "ineligible",
            Self::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ScoreOutcome {
    Recorded(Submission),
    NotHeld,
}

/// Persistent state of the review engine. Every mutating method is a single
/// atomic step against the backend; callers never hold a lock across calls.
#[async_trait]
pub(crate) trait ReviewStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_user(&self, params: CreateUser) -> Result<User, StoreError>;

    async fn find_user(&self, handle: &UserHandle) -> Result<Option<User>, StoreError>;

    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError>;

    async fn update_alias(
        &self,
        user_id: &str,
        alias: Option<&str>,
        now: PrimitiveDateTime,
    ) -> Result<Option<User>, StoreError>;

    /// Conditional decrement: succeeds only while the balance covers `days`.
    async fn spend_late_days(
        &self,
        user_id: &str,
        days: i32,
        charge: Option<LateCharge<'_>>,
        now: PrimitiveDateTime,
    ) -> Result<LateDaySpend, StoreError>;

    async fn list_score_history(&self, grader_id: &str) -> Result<Vec<ScoreRecord>, StoreError>;

    async fn find_submission(
        &self,
        owner_id: &str,
        slot: TaskSlot,
    ) -> Result<Option<Submission>, StoreError>;

    /// Fails with `Duplicate` when the owner already has this slot.
    async fn insert_submission(&self, params: CreateSubmission) -> Result<Submission, StoreError>;

    /// Swaps the document only; claims and scores are untouched.
    async fn replace_document(
        &self,
        submission_id: &str,
        document: &DocumentRef,
        now: PrimitiveDateTime,
    ) -> Result<Option<Submission>, StoreError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Submission>, StoreError>;

    async fn list_claimed_by(&self, grader_id: &str) -> Result<Vec<Submission>, StoreError>;

    /// Peer submissions in `slot` that `grader_id` could still claim.
    async fn list_open_for_grading(
        &self,
        slot: TaskSlot,
        grader_id: &str,
        cap: usize,
    ) -> Result<Vec<Submission>, StoreError>;

    /// Owners in `slot` (other than `exclude_owner`) whose claims held plus
    /// scores given in that slot are below `cap`.
    async fn list_slot_peers(
        &self,
        slot: TaskSlot,
        exclude_owner: &str,
        cap: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Compare-and-set: adds `grader_id` to the submission's graders only if
    /// the cap still holds at write time.
    async fn try_claim(
        &self,
        submission_id: &str,
        grader_id: &str,
        cap: usize,
        now: PrimitiveDateTime,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Releases the claim, appends the score and the history row together.
    async fn record_score(
        &self,
        submission_id: &str,
        grader_id: &str,
        score: i16,
        now: PrimitiveDateTime,
    ) -> Result<ScoreOutcome, StoreError>;
}
