use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{DocumentRef, Submission, TaskSlot};
use crate::repositories::{ClaimOutcome, CreateSubmission, ScoreOutcome, StoreError};

const COLUMNS: &str = "\
    id, user_id, workshop_number, task_number, file_id, file_name, file_size, mime_type, \
    graders, scores, scorers, late_days_used, submitted_at, created_at, updated_at";

fn cap_param(cap: usize) -> i32 {
    i32::try_from(cap).unwrap_or(i32::MAX)
}

pub(crate) async fn find_by_owner_slot(
    pool: &PgPool,
    owner_id: &str,
    slot: TaskSlot,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE user_id = $1 AND workshop_number = $2 AND task_number = $3"
    ))
    .bind(owner_id)
    .bind(slot.workshop)
    .bind(slot.task)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateSubmission,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (
            id, user_id, workshop_number, task_number,
            file_id, file_name, file_size, mime_type,
            submitted_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9,$9)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.slot.workshop)
    .bind(params.slot.task)
    .bind(params.document.file_id)
    .bind(params.document.file_name)
    .bind(params.document.file_size)
    .bind(params.document.mime_type)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn replace_document(
    pool: &PgPool,
    submission_id: &str,
    document: &DocumentRef,
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET file_id = $2, file_name = $3, file_size = $4, mime_type = $5,
             submitted_at = $6, updated_at = $6
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(submission_id)
    .bind(&document.file_id)
    .bind(&document.file_name)
    .bind(document.file_size)
    .bind(&document.mime_type)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_owner(
    pool: &PgPool,
    owner_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE user_id = $1
         ORDER BY workshop_number, task_number"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_claimed_by(
    pool: &PgPool,
    grader_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE $1 = ANY(graders)
         ORDER BY workshop_number, task_number, created_at"
    ))
    .bind(grader_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_open_for_grading(
    pool: &PgPool,
    slot: TaskSlot,
    grader_id: &str,
    cap: usize,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE workshop_number = $1
           AND task_number = $2
           AND user_id <> $3
           AND NOT ($3 = ANY(graders))
           AND NOT ($3 = ANY(scorers))
           AND cardinality(graders) + cardinality(scores) < $4
         ORDER BY created_at, id"
    ))
    .bind(slot.workshop)
    .bind(slot.task)
    .bind(grader_id)
    .bind(cap_param(cap))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_slot_peers(
    pool: &PgPool,
    slot: TaskSlot,
    exclude_owner: &str,
    cap: usize,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT peer.user_id FROM submissions peer
         WHERE peer.workshop_number = $1
           AND peer.task_number = $2
           AND peer.user_id <> $3
           AND (
               SELECT COUNT(*) FROM submissions other
               WHERE other.workshop_number = $1
                 AND other.task_number = $2
                 AND (peer.user_id = ANY(other.graders) OR peer.user_id = ANY(other.scorers))
           ) < $4
         ORDER BY peer.created_at, peer.id",
    )
    .bind(slot.workshop)
    .bind(slot.task)
    .bind(exclude_owner)
    .bind(i64::from(cap_param(cap)))
    .fetch_all(pool)
    .await
}

/// The row lock taken by UPDATE makes a concurrent claim re-check the WHERE
/// clause against the committed row, so the cap cannot be overshot.
pub(crate) async fn try_claim(
    pool: &PgPool,
    submission_id: &str,
    grader_id: &str,
    cap: usize,
    now: PrimitiveDateTime,
) -> Result<ClaimOutcome, sqlx::Error> {
    let claimed: Option<String> = sqlx::query_scalar(
        "UPDATE submissions
         SET graders = array_append(graders, $2), updated_at = $4
         WHERE id = $1
           AND user_id <> $2
           AND NOT ($2 = ANY(graders))
           AND NOT ($2 = ANY(scorers))
           AND cardinality(graders) + cardinality(scores) < $3
         RETURNING id",
    )
    .bind(submission_id)
    .bind(grader_id)
    .bind(cap_param(cap))
    .bind(now)
    .fetch_optional(pool)
    .await?;

    if claimed.is_some() {
        return Ok(ClaimOutcome::Claimed);
    }

    let current = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE id = $1"
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await?;

    Ok(match current {
        None => ClaimOutcome::Missing,
        Some(row) if row.is_claimed_by(grader_id) => ClaimOutcome::AlreadyHeld,
        Some(row) if row.user_id == grader_id || row.is_scored_by(grader_id) => {
            ClaimOutcome::Ineligible
        }
        Some(_) => ClaimOutcome::Full,
    })
}

pub(crate) async fn record_score(
    pool: &PgPool,
    submission_id: &str,
    grader_id: &str,
    score: i16,
    now: PrimitiveDateTime,
) -> Result<ScoreOutcome, StoreError> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET graders = array_remove(graders, $2),
             scores = array_append(scores, $3),
             scorers = array_append(scorers, $2),
             updated_at = $4
         WHERE id = $1 AND $2 = ANY(graders)
         RETURNING {COLUMNS}"
    ))
    .bind(submission_id)
    .bind(grader_id)
    .bind(score)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(submission) = updated else {
        tx.rollback().await?;
        return Ok(ScoreOutcome::NotHeld);
    };

    sqlx::query(
        "INSERT INTO score_history (
            id, grader_id, owner_id, submission_id,
            workshop_number, task_number, score, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(grader_id)
    .bind(&submission.user_id)
    .bind(&submission.id)
    .bind(submission.workshop_number)
    .bind(submission.task_number)
    .bind(score)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ScoreOutcome::Recorded(submission))
}
