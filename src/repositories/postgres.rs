mod submissions;
mod users;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{DocumentRef, ScoreRecord, Submission, TaskSlot, User};
use crate::repositories::{
    ClaimOutcome, CreateSubmission, CreateUser, LateCharge, LateDaySpend, ReviewStore,
    ScoreOutcome, StoreError,
};
use crate::services::identity::UserHandle;

#[derive(Clone)]
pub(crate) struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_user(&self, params: CreateUser) -> Result<User, StoreError> {
        Ok(users::create(&self.pool, params).await?)
    }

    async fn find_user(&self, handle: &UserHandle) -> Result<Option<User>, StoreError> {
        let user = match handle {
            UserHandle::ById(tg_id) => users::find_by_tg_id(&self.pool, *tg_id).await?,
            UserHandle::ByAlias(alias) => users::find_by_alias(&self.pool, alias).await?,
            UserHandle::ByNickname(nickname) => {
                users::find_by_nickname(&self.pool, nickname).await?
            }
        };
        Ok(user)
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        Ok(users::find_by_ids(&self.pool, ids).await?)
    }

    async fn update_alias(
        &self,
        user_id: &str,
        alias: Option<&str>,
        now: PrimitiveDateTime,
    ) -> Result<Option<User>, StoreError> {
        Ok(users::update_alias(&self.pool, user_id, alias, now).await?)
    }

    async fn spend_late_days(
        &self,
        user_id: &str,
        days: i32,
        charge: Option<LateCharge<'_>>,
        now: PrimitiveDateTime,
    ) -> Result<LateDaySpend, StoreError> {
        users::spend_late_days(&self.pool, user_id, days, charge, now).await
    }

    async fn list_score_history(&self, grader_id: &str) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(users::list_score_history(&self.pool, grader_id).await?)
    }

    async fn find_submission(
        &self,
        owner_id: &str,
        slot: TaskSlot,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::find_by_owner_slot(&self.pool, owner_id, slot).await?)
    }

    async fn insert_submission(&self, params: CreateSubmission) -> Result<Submission, StoreError> {
        Ok(submissions::create(&self.pool, params).await?)
    }

    async fn replace_document(
        &self,
        submission_id: &str,
        document: &DocumentRef,
        now: PrimitiveDateTime,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::replace_document(&self.pool, submission_id, document, now).await?)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Submission>, StoreError> {
        Ok(submissions::list_by_owner(&self.pool, owner_id).await?)
    }

    async fn list_claimed_by(&self, grader_id: &str) -> Result<Vec<Submission>, StoreError> {
        Ok(submissions::list_claimed_by(&self.pool, grader_id).await?)
    }

    async fn list_open_for_grading(
        &self,
        slot: TaskSlot,
        grader_id: &str,
        cap: usize,
    ) -> Result<Vec<Submission>, StoreError> {
        Ok(submissions::list_open_for_grading(&self.pool, slot, grader_id, cap).await?)
    }

    async fn list_slot_peers(
        &self,
        slot: TaskSlot,
        exclude_owner: &str,
        cap: usize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(submissions::list_slot_peers(&self.pool, slot, exclude_owner, cap).await?)
    }

    async fn try_claim(
        &self,
        submission_id: &str,
        grader_id: &str,
        cap: usize,
        now: PrimitiveDateTime,
    ) -> Result<ClaimOutcome, StoreError> {
        Ok(submissions::try_claim(&self.pool, submission_id, grader_id, cap, now).await?)
    }

    async fn record_score(
        &self,
        submission_id: &str,
        grader_id: &str,
        score: i16,
        now: PrimitiveDateTime,
    ) -> Result<ScoreOutcome, StoreError> {
        submissions::record_score(&self.pool, submission_id, grader_id, score, now).await
    }
}
