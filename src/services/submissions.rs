use std::collections::HashMap;

use serde::Serialize;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::ReviewSettings;
use crate::core::metrics;
use crate::db::models::{DocumentRef, Submission, TaskSlot, User};
use crate::repositories::{CreateSubmission, ReviewStore, StoreError};
use crate::services::assignment::{self, AssignmentOutcome};
use crate::services::deadline::{self, SubmissionTiming};
use crate::services::error::ReviewError;
use crate::services::late_days::{self, SubmissionCharge};

/// How the late days of an accepted submission were settled. A failed spend
/// leaves the submission stored and is reported as `Unsettled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum LateDaySettlement {
    OnTime,
    Spent { used: i32, remaining: i32 },
    Unsettled { needed: i32, available: i32 },
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionReceipt {
    pub(crate) submission: Submission,
    pub(crate) created: bool,
    pub(crate) timing: SubmissionTiming,
    pub(crate) settlement: LateDaySettlement,
    pub(crate) assignment: AssignmentOutcome,
    /// Aliases of the owners the submitter must now grade.
    pub(crate) to_grade: Vec<String>,
}

/// Preflight answer for a planned upload; nothing is mutated.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubmissionCheck {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) timing: SubmissionTiming,
    pub(crate) late_days_required: i32,
    pub(crate) late_days_available: i32,
    pub(crate) already_submitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenClaim {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) owner_alias: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GraderAssignment {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) grader_alias: String,
}

pub(crate) fn validate_slot(settings: &ReviewSettings, slot: TaskSlot) -> Result<(), ReviewError> {
    if slot.workshop < 1 {
        return Err(ReviewError::UnknownWorkshop { workshop: slot.workshop });
    }
    if slot.task < 1 || slot.task > settings.max_task_number {
        return Err(ReviewError::InvalidTask { task: slot.task, max: settings.max_task_number });
    }
    Ok(())
}

/// Task `t > 1` needs the owner's submission for `t - 1` in the same workshop.
pub(crate) async fn check_task_order(
    store: &dyn ReviewStore,
    owner: &User,
    slot: TaskSlot,
) -> Result<(), ReviewError> {
    let Some(previous) = slot.previous() else {
        return Ok(());
    };

    if store.find_submission(&owner.id, previous).await?.is_none() {
        return Err(ReviewError::OutOfOrder {
            workshop: slot.workshop,
            task: slot.task,
            missing_task: previous.task,
        });
    }
    Ok(())
}

pub(crate) async fn check_submission(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    owner: &User,
    slot: TaskSlot,
    now: PrimitiveDateTime,
) -> Result<SubmissionCheck, ReviewError> {
    validate_slot(settings, slot)?;
    check_task_order(store, owner, slot).await?;
    let timing = deadline::require_accepting(settings, slot.workshop, now)?;

    let existing = store.find_submission(&owner.id, slot).await?;
    let already_charged = existing.as_ref().map_or(0, |submission| submission.late_days_used);
    let late_days_required = (timing.late_days_required() - already_charged).max(0);

    Ok(SubmissionCheck {
        workshop: slot.workshop,
        task: slot.task,
        timing,
        late_days_required,
        late_days_available: owner.late_days,
        already_submitted: existing.is_some(),
    })
}

/// Accepts a document for `(owner, slot)`.
///
/// Order: slot validation, task order, deadline, duplicate check, late-day
/// precheck, store write, late-day spend, assignment. The stored submission
/// is never rolled back; a spend that fails afterwards is reported in the
/// receipt. An overwrite replaces the document only and runs no assignment.
pub(crate) async fn create_submission(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    owner: &User,
    slot: TaskSlot,
    document: DocumentRef,
    allow_overwrite: bool,
    now: PrimitiveDateTime,
) -> Result<SubmissionReceipt, ReviewError> {
    let result =
        accept_submission(store, settings, owner, slot, document, allow_overwrite, now).await;
    match &result {
        Ok(receipt) if receipt.created => metrics::submission("created"),
        Ok(_) => metrics::submission("overwritten"),
        Err(err) => {
            metrics::submission("rejected");
            tracing::info!(
                user_id = %owner.id,
                workshop = slot.workshop,
                task = slot.task,
                kind = err.kind(),
                "Submission rejected"
            );
        }
    }
    result
}

async fn accept_submission(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    owner: &User,
    slot: TaskSlot,
    document: DocumentRef,
    allow_overwrite: bool,
    now: PrimitiveDateTime,
) -> Result<SubmissionReceipt, ReviewError> {
    validate_slot(settings, slot)?;
    check_task_order(store, owner, slot).await?;
    let timing = deadline::require_accepting(settings, slot.workshop, now)?;

    let existing = store.find_submission(&owner.id, slot).await?;
    if existing.is_some() && !allow_overwrite {
        return Err(ReviewError::AlreadyExists { entity: "submission" });
    }

    let required = timing.late_days_required();
    let already_charged = existing.as_ref().map_or(0, |submission| submission.late_days_used);
    let to_charge = (required - already_charged).max(0);
    if to_charge > owner.late_days {
        return Err(ReviewError::InsufficientLateDays {
            needed: to_charge,
            available: owner.late_days,
        });
    }

    let (mut submission, created) = match existing {
        Some(previous) => {
            (replace_submission(store, owner, &previous, &document, now).await?, false)
        }
        None => {
            let inserted = store
                .insert_submission(CreateSubmission {
                    id: Uuid::new_v4().to_string(),
                    user_id: owner.id.clone(),
                    slot,
                    document: document.clone(),
                    now,
                })
                .await;
            match inserted {
                Ok(inserted) => {
                    tracing::info!(
                        submission_id = %inserted.id,
                        user_id = %owner.id,
                        workshop = slot.workshop,
                        task = slot.task,
                        late_days = required,
                        "Submission stored"
                    );
                    (inserted, true)
                }
                // A concurrent first upload won the slot; overwrite it instead.
                Err(StoreError::Duplicate(_)) if allow_overwrite => {
                    let winner = store
                        .find_submission(&owner.id, slot)
                        .await?
                        .ok_or(ReviewError::NotFound("submission"))?;
                    (replace_submission(store, owner, &winner, &document, now).await?, false)
                }
                Err(StoreError::Duplicate(_)) => {
                    return Err(ReviewError::AlreadyExists { entity: "submission" });
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    let settlement =
        settle_late_days(store, settings, owner, &mut submission, required, now).await?;

    let assignment = if created {
        assignment::assign_on_submission(store, settings, &submission, now).await?
    } else {
        AssignmentOutcome::default()
    };

    let owner_ids: Vec<String> =
        assignment.to_grade.iter().map(|peer| peer.user_id.clone()).collect();
    let to_grade = aliases_for(store, &owner_ids).await?;

    Ok(SubmissionReceipt { submission, created, timing, settlement, assignment, to_grade })
}

async fn replace_submission(
    store: &dyn ReviewStore,
    owner: &User,
    previous: &Submission,
    document: &DocumentRef,
    now: PrimitiveDateTime,
) -> Result<Submission, ReviewError> {
    let replaced = store
        .replace_document(&previous.id, document, now)
        .await?
        .ok_or(ReviewError::NotFound("submission"))?;
    tracing::info!(
        submission_id = %replaced.id,
        user_id = %owner.id,
        workshop = replaced.workshop_number,
        task = replaced.task_number,
        "Submission document replaced"
    );
    Ok(replaced)
}

/// Charges the submission up to `required` late days and mirrors the
/// recorded charge onto `submission`.
async fn settle_late_days(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    owner: &User,
    submission: &mut Submission,
    required: i32,
    now: PrimitiveDateTime,
) -> Result<LateDaySettlement, ReviewError> {
    if required == 0 {
        return Ok(LateDaySettlement::OnTime);
    }

    let charged =
        late_days::charge_submission(store, submission, required, settings.conflict_retries, now)
            .await;

    match charged {
        Ok(SubmissionCharge::AlreadyPaid { charged }) => {
            submission.late_days_used = charged;
            Ok(LateDaySettlement::OnTime)
        }
        Ok(SubmissionCharge::Spent { used, remaining }) => {
            submission.late_days_used = required;
            Ok(LateDaySettlement::Spent { used, remaining })
        }
        Err(ReviewError::InsufficientLateDays { needed, available }) => {
            tracing::warn!(
                submission_id = %submission.id,
                user_id = %owner.id,
                needed,
                available,
                "Late days could not be settled for a stored submission"
            );
            Ok(LateDaySettlement::Unsettled { needed, available })
        }
        Err(err) => Err(err),
    }
}

/// Display aliases for `ids`, in order; unknown ids fall back to the raw id.
pub(crate) async fn aliases_for(
    store: &dyn ReviewStore,
    ids: &[String],
) -> Result<Vec<String>, ReviewError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let users = store.find_users_by_ids(ids).await?;
    let by_id: HashMap<&str, &User> = users.iter().map(|user| (user.id.as_str(), user)).collect();
    Ok(ids
        .iter()
        .map(|id| {
            by_id.get(id.as_str()).map_or_else(|| id.clone(), |user| user.display_alias().to_string())
        })
        .collect())
}

pub(crate) async fn get_by_owner(
    store: &dyn ReviewStore,
    owner: &User,
) -> Result<Vec<Submission>, ReviewError> {
    Ok(store.list_by_owner(&owner.id).await?)
}

/// What `grader` still owes: one entry per held claim.
pub(crate) async fn get_open_claims(
    store: &dyn ReviewStore,
    grader: &User,
) -> Result<Vec<OpenClaim>, ReviewError> {
    let claimed = store.list_claimed_by(&grader.id).await?;
    let owner_ids: Vec<String> = claimed.iter().map(|submission| submission.user_id.clone()).collect();
    let aliases = aliases_for(store, &owner_ids).await?;

    Ok(claimed
        .iter()
        .zip(aliases)
        .map(|(submission, owner_alias)| OpenClaim {
            workshop: submission.workshop_number,
            task: submission.task_number,
            owner_alias,
        })
        .collect())
}

/// Who currently holds a claim on each of the owner's submissions.
pub(crate) async fn get_graded_by(
    store: &dyn ReviewStore,
    owner: &User,
) -> Result<Vec<GraderAssignment>, ReviewError> {
    let submissions = store.list_by_owner(&owner.id).await?;
    let grader_ids: Vec<String> =
        submissions.iter().flat_map(|submission| submission.graders.iter().cloned()).collect();
    let aliases = aliases_for(store, &grader_ids).await?;

    let slots = submissions.iter().flat_map(|submission| {
        submission.graders.iter().map(move |_| (submission.workshop_number, submission.task_number))
    });
    Ok(slots
        .zip(aliases)
        .map(|((workshop, task), grader_alias)| GraderAssignment { workshop, task, grader_alias })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;
    use time::PrimitiveDateTime;

    use super::{
        check_submission, create_submission, get_graded_by, get_open_claims, LateDaySettlement,
    };
    use crate::db::models::{DocumentRef, TaskSlot, User};
    use crate::repositories::{MemoryReviewStore, ReviewStore};
    use crate::services::deadline::SubmissionTiming;
    use crate::services::error::ReviewError;
    use crate::services::identity::{register_user, Registration, UserHandle};
    use crate::services::test_settings;
    use crate::test_support::YieldingStore;

    const ON_TIME: PrimitiveDateTime = datetime!(2019-03-07 12:00);

    fn document(name: &str) -> DocumentRef {
        DocumentRef {
            file_id: format!("file-{name}"),
            file_name: format!("{name}.pdf"),
            file_size: 2048,
            mime_type: "application/pdf".to_string(),
        }
    }

    async fn register(store: &dyn ReviewStore, tg_id: i64, late_days: i32) -> User {
        let mut settings = test_settings(2);
        settings.default_late_days = late_days;
        register_user(
            store,
            &settings,
            Registration {
                tg_id,
                alias: Some(format!("student{tg_id}")),
                nickname: format!("Student {tg_id}"),
                first_name: None,
                last_name: None,
            },
            ON_TIME,
        )
        .await
        .expect("register")
    }

    async fn reload(store: &dyn ReviewStore, user: &User) -> User {
        store.find_user(&UserHandle::ById(user.tg_id)).await.expect("find").expect("exists")
    }

    #[tokio::test]
    async fn tasks_must_be_submitted_in_order() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 12).await;

        let err = create_submission(
            &store,
            &settings,
            &user,
            TaskSlot { workshop: 1, task: 2 },
            document("t2"),
            false,
            ON_TIME,
        )
        .await
        .expect_err("out of order");
        assert!(matches!(err, ReviewError::OutOfOrder { workshop: 1, task: 2, missing_task: 1 }));

        for task in 1..=2 {
            create_submission(
                &store,
                &settings,
                &user,
                TaskSlot { workshop: 1, task },
                document("t"),
                false,
                ON_TIME,
            )
            .await
            .expect("in order");
        }
    }

    #[tokio::test]
    async fn slot_validation_rejects_before_any_write() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 12).await;

        let err = create_submission(
            &store,
            &settings,
            &user,
            TaskSlot { workshop: 1, task: 8 },
            document("t"),
            false,
            ON_TIME,
        )
        .await
        .expect_err("task ceiling");
        assert!(matches!(err, ReviewError::InvalidTask { task: 8, max: 7 }));

        let err = create_submission(
            &store,
            &settings,
            &user,
            TaskSlot { workshop: 9, task: 1 },
            document("t"),
            false,
            ON_TIME,
        )
        .await
        .expect_err("unscheduled");
        assert!(matches!(err, ReviewError::UnknownWorkshop { workshop: 9 }));

        assert!(store.list_by_owner(&user.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn duplicate_without_overwrite_is_rejected() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        create_submission(&store, &settings, &user, slot, document("a"), false, ON_TIME)
            .await
            .expect("first");
        let err = create_submission(&store, &settings, &user, slot, document("b"), false, ON_TIME)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ReviewError::AlreadyExists { entity: "submission" }));
    }

    #[tokio::test]
    async fn late_submission_spends_days_and_deadline_scenario_holds() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 12).await;

        let receipt = create_submission(
            &store,
            &settings,
            &user,
            TaskSlot { workshop: 1, task: 1 },
            document("a"),
            false,
            datetime!(2019-03-08 0:00),
        )
        .await
        .expect("on time at deadline");
        assert_eq!(receipt.settlement, LateDaySettlement::OnTime);

        let receipt = create_submission(
            &store,
            &settings,
            &user,
            TaskSlot { workshop: 1, task: 2 },
            document("b"),
            false,
            datetime!(2019-03-10 0:00),
        )
        .await
        .expect("two days late");
        assert_eq!(receipt.timing, SubmissionTiming::Late { days: 2 });
        assert_eq!(receipt.settlement, LateDaySettlement::Spent { used: 2, remaining: 10 });
        assert_eq!(receipt.submission.late_days_used, 2);
        assert_eq!(reload(&store, &user).await.late_days, 10);

        let err = create_submission(
            &store,
            &settings,
            &user,
            TaskSlot { workshop: 1, task: 3 },
            document("c"),
            false,
            datetime!(2019-03-12 0:00),
        )
        .await
        .expect_err("four days late");
        assert!(matches!(err, ReviewError::DeadlinePassed { days_late: 4, .. }));
    }

    #[tokio::test]
    async fn insufficient_late_days_rejects_before_storing() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 1).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        let err = create_submission(
            &store,
            &settings,
            &user,
            slot,
            document("a"),
            false,
            datetime!(2019-03-10 0:00),
        )
        .await
        .expect_err("insufficient");
        assert!(matches!(err, ReviewError::InsufficientLateDays { needed: 2, available: 1 }));
        assert!(store.find_submission(&user.id, slot).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn stale_balance_leaves_submission_stored_and_unsettled() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 2).await;
        let stale = user.clone();
        crate::services::late_days::spend_late_days(&store, &user.id, 2, 3, ON_TIME)
            .await
            .expect("spend elsewhere");

        let slot = TaskSlot { workshop: 1, task: 1 };
        let receipt = create_submission(
            &store,
            &settings,
            &stale,
            slot,
            document("a"),
            false,
            datetime!(2019-03-10 0:00),
        )
        .await
        .expect("stored");
        assert_eq!(receipt.settlement, LateDaySettlement::Unsettled { needed: 2, available: 0 });
        assert!(store.find_submission(&user.id, slot).await.expect("find").is_some());
        assert_eq!(reload(&store, &user).await.late_days, 0);
    }

    #[tokio::test]
    async fn overwrite_keeps_claims_and_charges_only_the_difference() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let owner = register(&store, 1, 12).await;
        let peer = register(&store, 2, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        create_submission(&store, &settings, &owner, slot, document("a"), false, datetime!(2019-03-09 0:00))
            .await
            .expect("one day late");
        create_submission(&store, &settings, &peer, slot, document("p"), false, ON_TIME)
            .await
            .expect("peer");

        let before = store.find_submission(&owner.id, slot).await.expect("find").expect("exists");
        assert_eq!(before.late_days_used, 1);
        assert_eq!(before.graders, vec![peer.id.clone()]);

        let owner = reload(&store, &owner).await;
        let receipt = create_submission(
            &store,
            &settings,
            &owner,
            slot,
            document("a2"),
            true,
            datetime!(2019-03-11 0:00),
        )
        .await
        .expect("overwrite");
        assert!(!receipt.created);
        assert_eq!(receipt.settlement, LateDaySettlement::Spent { used: 2, remaining: 9 });
        assert!(receipt.to_grade.is_empty());
        assert_eq!(receipt.submission.file_id, "file-a2");
        assert_eq!(receipt.submission.graders, vec![peer.id.clone()]);
        assert_eq!(receipt.submission.late_days_used, 3);

        let after = store.find_submission(&owner.id, slot).await.expect("find").expect("exists");
        assert_eq!(after.late_days_used, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_overwrites_charge_late_days_once() {
        let store = Arc::new(YieldingStore::new());
        let settings = test_settings(2);
        let user = register(store.as_ref(), 1, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        create_submission(store.as_ref(), &settings, &user, slot, document("v0"), false, ON_TIME)
            .await
            .expect("on time");

        let mut handles = Vec::new();
        for version in 1..=8 {
            let store = store.clone();
            let settings = settings.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                create_submission(
                    store.as_ref(),
                    &settings,
                    &user,
                    slot,
                    document(&format!("v{version}")),
                    true,
                    datetime!(2019-03-10 12:00),
                )
                .await
            }));
        }

        let mut spent = 0;
        for handle in handles {
            let receipt = handle.await.expect("join").expect("overwrite");
            assert!(!receipt.created);
            assert_eq!(receipt.submission.late_days_used, 2);
            match receipt.settlement {
                LateDaySettlement::Spent { used, .. } => {
                    assert_eq!(used, 2);
                    spent += 1;
                }
                other => assert_eq!(other, LateDaySettlement::OnTime),
            }
        }
        assert_eq!(spent, 1);

        let stored = store.find_submission(&user.id, slot).await.expect("find").expect("exists");
        let balance = reload(store.as_ref(), &user).await.late_days;
        assert_eq!(stored.late_days_used, 2);
        assert_eq!(12 - balance, stored.late_days_used);
    }

    #[tokio::test]
    async fn overwrite_falls_back_to_replace_when_insert_loses_the_slot() {
        let store = YieldingStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        let first = create_submission(&store, &settings, &user, slot, document("a"), true, ON_TIME)
            .await
            .expect("first");
        assert!(first.created);

        store.hide_next_submission_reads(1);
        let second = create_submission(&store, &settings, &user, slot, document("b"), true, ON_TIME)
            .await
            .expect("replaced");
        assert!(!second.created);
        assert_eq!(second.submission.id, first.submission.id);
        assert_eq!(second.submission.file_id, "file-b");

        store.hide_next_submission_reads(1);
        let err = create_submission(&store, &settings, &user, slot, document("c"), false, ON_TIME)
            .await
            .expect_err("no overwrite");
        assert!(matches!(err, ReviewError::AlreadyExists { entity: "submission" }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_uploads_with_overwrite_both_succeed() {
        let store = Arc::new(YieldingStore::new());
        let settings = test_settings(2);
        let user = register(store.as_ref(), 1, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        let mut handles = Vec::new();
        for version in ["a", "b"] {
            let store = store.clone();
            let settings = settings.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                let document = document(version);
                create_submission(store.as_ref(), &settings, &user, slot, document, true, ON_TIME)
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.expect("join").expect("upload").created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.list_by_owner(&user.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn claim_views_are_symmetric() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let first = register(&store, 1, 12).await;
        let second = register(&store, 2, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        create_submission(&store, &settings, &first, slot, document("a"), false, ON_TIME)
            .await
            .expect("first");
        let receipt = create_submission(&store, &settings, &second, slot, document("b"), false, ON_TIME)
            .await
            .expect("second");
        assert_eq!(receipt.to_grade, vec!["student1".to_string()]);

        let claims = get_open_claims(&store, &second).await.expect("claims");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].owner_alias, "student1");

        let graded_by = get_graded_by(&store, &first).await.expect("graded by");
        assert_eq!(graded_by.len(), 1);
        assert_eq!(graded_by[0].grader_alias, "student2");
        assert_eq!((graded_by[0].workshop, graded_by[0].task), (1, 1));
    }

    #[tokio::test]
    async fn preflight_reports_late_days_without_writing() {
        let store = MemoryReviewStore::new();
        let settings = test_settings(2);
        let user = register(&store, 1, 12).await;
        let slot = TaskSlot { workshop: 1, task: 1 };

        let check = check_submission(&store, &settings, &user, slot, datetime!(2019-03-11 0:00))
            .await
            .expect("check");
        assert_eq!(check.late_days_required, 3);
        assert_eq!(check.late_days_available, 12);
        assert!(!check.already_submitted);
        assert!(store.find_submission(&user.id, slot).await.expect("find").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_first_submissions_keep_cap() {
        let store: Arc<dyn ReviewStore> = Arc::new(MemoryReviewStore::new());
        let settings = Arc::new(test_settings(2));
        let slot = TaskSlot { workshop: 1, task: 1 };

        let mut users = Vec::new();
        for tg_id in 1..=10 {
            users.push(register(store.as_ref(), tg_id, 12).await);
        }

        let mut handles = Vec::new();
        for user in users.clone() {
            let store = store.clone();
            let settings = settings.clone();
            handles.push(tokio::spawn(async move {
                create_submission(
                    store.as_ref(),
                    &settings,
                    &user,
                    slot,
                    document("race"),
                    false,
                    ON_TIME,
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("accepted");
        }

        for user in &users {
            let submission =
                store.find_submission(&user.id, slot).await.expect("find").expect("exists");
            assert!(submission.graders.len() <= settings.n_graders);
            assert!(!submission.is_claimed_by(&user.id));
        }
    }
}
