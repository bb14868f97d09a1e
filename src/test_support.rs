use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower::ServiceExt;

use crate::api;
use crate::api::guards::{USER_ALIAS_HEADER, USER_ID_HEADER};
use crate::core::{config::Settings, redis::RedisHandle, state::AppState};
use crate::db::models::{DocumentRef, ScoreRecord, Submission, TaskSlot, User};
use crate::repositories::{
    ClaimOutcome, CreateSubmission, CreateUser, LateCharge, LateDaySpend, MemoryReviewStore,
    ReviewStore, ScoreOutcome, StoreError,
};
use crate::services::identity::UserHandle;

pub(crate) const TEST_SERVICE_TOKEN: &str = "test-service-token";
const TEST_REDIS_DB: &str = "15";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

/// Workshops 1 and 2 are open, 3 closed a day ago (one late day), 9 is long
/// past the late window.
pub(crate) fn set_test_env() {
    let closed_yesterday =
        (OffsetDateTime::now_utc() - Duration::hours(26)).format(&Rfc3339).expect("format");

    std::env::set_var("PRB_ENV", "test");
    std::env::set_var("PRB_STRICT_CONFIG", "0");
    std::env::set_var("PRB_SERVICE_TOKEN", TEST_SERVICE_TOKEN);
    std::env::set_var("PRB_STORE_BACKEND", "memory");
    std::env::set_var(
        "PRB_DEADLINES",
        format!("1=2999-01-01,2=2999-02-01,3={closed_yesterday},9=2000-01-01"),
    );
    std::env::set_var("PRB_N_GRADERS", "2");
    std::env::set_var("PRB_MAX_LATE", "3");
    std::env::set_var("PRB_DEFAULT_LATE_DAYS", "12");
    std::env::remove_var("PRB_MAX_TASK_NUMBER");
    std::env::remove_var("PRB_CLAIM_ROUNDS");
    std::env::remove_var("PRB_CONFLICT_RETRIES");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("API_V1_STR");
    std::env::set_var("REDIS_HOST", "127.0.0.1");
    std::env::set_var("REDIS_PORT", "6379");
    std::env::set_var("REDIS_DB", TEST_REDIS_DB);
    std::env::remove_var("REDIS_PASSWORD");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// In-memory store and a Redis handle that is never connected.
pub(crate) fn test_state(settings: Settings) -> AppState {
    let redis = RedisHandle::new(settings.redis().redis_url());
    AppState::new(settings, Arc::new(MemoryReviewStore::new()), redis)
}

pub(crate) fn test_app(settings: Settings) -> Router {
    api::router::router(test_state(settings))
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let state = test_state(settings);
    let app = api::router::router(state.clone());

    TestContext { state, app, _guard: guard }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    build_request(method, uri, token, &[], body)
}

/// Authorised request acting for the user with numeric id `tg_id`.
pub(crate) fn identity_request(
    method: Method,
    uri: &str,
    tg_id: i64,
    alias: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let tg_id = tg_id.to_string();
    let mut headers = vec![(USER_ID_HEADER, tg_id.as_str())];
    if let Some(alias) = alias {
        headers.push((USER_ALIAS_HEADER, alias));
    }
    build_request(method, uri, Some(TEST_SERVICE_TOKEN), &headers, body)
}

fn build_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: Response<Body>) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) fn document(file_id: &str) -> Value {
    json!({
        "file_id": file_id,
        "file_name": "solution.pdf",
        "file_size": 2048,
        "mime_type": "application/pdf",
    })
}

pub(crate) async fn register(app: &Router, tg_id: i64, alias: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/users",
            Some(TEST_SERVICE_TOKEN),
            Some(json!({ "tg_id": tg_id, "alias": alias, "nickname": alias.to_uppercase() })),
        ))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

/// Submits `file-{tg_id}-{workshop}-{task}` for the user.
pub(crate) async fn submit(app: &Router, tg_id: i64, workshop: i32, task: i32) -> Response<Body> {
    let mut payload = json!({ "workshop": workshop, "task": task });
    payload["document"] = document(&format!("file-{tg_id}-{workshop}-{task}"));
    app.clone()
        .oneshot(identity_request(Method::POST, "/api/v1/submissions", tg_id, None, Some(payload)))
        .await
        .expect("submit")
}

/// Memory store that hands control back to the scheduler before every call,
/// so concurrent service operations interleave between store steps.
pub(crate) struct YieldingStore {
    inner: MemoryReviewStore,
    stale_submission_reads: AtomicUsize,
}

impl YieldingStore {
    pub(crate) fn new() -> Self {
        Self { inner: MemoryReviewStore::new(), stale_submission_reads: AtomicUsize::new(0) }
    }

    /// The next `reads` submission lookups answer `None`, as if they ran just
    /// before a concurrent insert.
    pub(crate) fn hide_next_submission_reads(&self, reads: usize) {
        self.stale_submission_reads.store(reads, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReviewStore for YieldingStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.ping().await
    }

    async fn insert_user(&self, params: CreateUser) -> Result<User, StoreError> {
        tokio::task::yield_now().await;
        self.inner.insert_user(params).await
    }

    async fn find_user(&self, handle: &UserHandle) -> Result<Option<User>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.find_user(handle).await
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.find_users_by_ids(ids).await
    }

    async fn update_alias(
        &self,
        user_id: &str,
        alias: Option<&str>,
        now: PrimitiveDateTime,
    ) -> Result<Option<User>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.update_alias(user_id, alias, now).await
    }

    async fn spend_late_days(
        &self,
        user_id: &str,
        days: i32,
        charge: Option<LateCharge<'_>>,
        now: PrimitiveDateTime,
    ) -> Result<LateDaySpend, StoreError> {
        tokio::task::yield_now().await;
        self.inner.spend_late_days(user_id, days, charge, now).await
    }

    async fn list_score_history(&self, grader_id: &str) -> Result<Vec<ScoreRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.list_score_history(grader_id).await
    }

    async fn find_submission(
        &self,
        owner_id: &str,
        slot: TaskSlot,
    ) -> Result<Option<Submission>, StoreError> {
        tokio::task::yield_now().await;
        let stale = self
            .stale_submission_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_submission(owner_id, slot).await
    }

    async fn insert_submission(&self, params: CreateSubmission) -> Result<Submission, StoreError> {
        tokio::task::yield_now().await;
        self.inner.insert_submission(params).await
    }

    async fn replace_document(
        &self,
        submission_id: &str,
        document: &DocumentRef,
        now: PrimitiveDateTime,
    ) -> Result<Option<Submission>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.replace_document(submission_id, document, now).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Submission>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.list_by_owner(owner_id).await
    }

    async fn list_claimed_by(&self, grader_id: &str) -> Result<Vec<Submission>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.list_claimed_by(grader_id).await
    }

    async fn list_open_for_grading(
        &self,
        slot: TaskSlot,
        grader_id: &str,
        cap: usize,
    ) -> Result<Vec<Submission>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.list_open_for_grading(slot, grader_id, cap).await
    }

    async fn list_slot_peers(
        &self,
        slot: TaskSlot,
        exclude_owner: &str,
        cap: usize,
    ) -> Result<Vec<String>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.list_slot_peers(slot, exclude_owner, cap).await
    }

    async fn try_claim(
        &self,
        submission_id: &str,
        grader_id: &str,
        cap: usize,
        now: PrimitiveDateTime,
    ) -> Result<ClaimOutcome, StoreError> {
        tokio::task::yield_now().await;
        self.inner.try_claim(submission_id, grader_id, cap, now).await
    }

    async fn record_score(
        &self,
        submission_id: &str,
        grader_id: &str,
        score: i16,
        now: PrimitiveDateTime,
    ) -> Result<ScoreOutcome, StoreError> {
        tokio::task::yield_now().await;
        self.inner.record_score(submission_id, grader_id, score, now).await
    }
}
