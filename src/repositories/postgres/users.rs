use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{ScoreRecord, User};
use crate::repositories::{CreateUser, LateCharge, LateDaySpend, StoreError};

const COLUMNS: &str = "\
    id, tg_id, tg_username, nickname, first_name, last_name, late_days, created_at, updated_at";

const HISTORY_COLUMNS: &str = "\
    id, grader_id, owner_id, submission_id, workshop_number, task_number, score, created_at";

pub(crate) async fn create(pool: &PgPool, params: CreateUser) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (
            id, tg_id, tg_username, nickname, first_name, last_name,
            late_days, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.tg_id)
    .bind(params.tg_username)
    .bind(params.nickname)
    .bind(params.first_name)
    .bind(params.last_name)
    .bind(params.late_days)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_tg_id(pool: &PgPool, tg_id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE tg_id = $1"))
        .bind(tg_id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_alias(pool: &PgPool, alias: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users
         WHERE LOWER(tg_username) = LOWER($1)
         ORDER BY created_at, id
         LIMIT 1"
    ))
    .bind(alias)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_nickname(
    pool: &PgPool,
    nickname: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users
         WHERE nickname = $1
         ORDER BY created_at, id
         LIMIT 1"
    ))
    .bind(nickname)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<User>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) async fn update_alias(
    pool: &PgPool,
    user_id: &str,
    alias: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET tg_username = $2, updated_at = $3
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(user_id)
    .bind(alias)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn spend_late_days(
    pool: &PgPool,
    user_id: &str,
    days: i32,
    charge: Option<LateCharge<'_>>,
    now: PrimitiveDateTime,
) -> Result<LateDaySpend, StoreError> {
    let mut tx = pool.begin().await?;

    if let Some(charge) = charge {
        let moved = sqlx::query(
            "UPDATE submissions SET late_days_used = $3, updated_at = $4
             WHERE id = $1 AND late_days_used = $2",
        )
        .bind(charge.submission_id)
        .bind(charge.expected_used)
        .bind(charge.total_used)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            let charged: i32 =
                sqlx::query_scalar("SELECT late_days_used FROM submissions WHERE id = $1")
                    .bind(charge.submission_id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(LateDaySpend::ChargeMoved { charged });
        }
    }

    let remaining: Option<i32> = sqlx::query_scalar(
        "UPDATE users SET late_days = late_days - $2, updated_at = $3
         WHERE id = $1 AND late_days >= $2
         RETURNING late_days",
    )
    .bind(user_id)
    .bind(days)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(remaining) = remaining else {
        let available: Option<i32> = sqlx::query_scalar("SELECT late_days FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.rollback().await?;
        return Ok(match available {
            Some(available) => LateDaySpend::Insufficient { available },
            None => LateDaySpend::UnknownUser,
        });
    };

    tx.commit().await?;
    Ok(LateDaySpend::Spent { remaining })
}

pub(crate) async fn list_score_history(
    pool: &PgPool,
    grader_id: &str,
) -> Result<Vec<ScoreRecord>, sqlx::Error> {
    sqlx::query_as::<_, ScoreRecord>(&format!(
        "SELECT {HISTORY_COLUMNS} FROM score_history
         WHERE grader_id = $1
         ORDER BY created_at, id"
    ))
    .bind(grader_id)
    .fetch_all(pool)
    .await
}
