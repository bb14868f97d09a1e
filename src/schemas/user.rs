use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{ScoreRecord, User};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserRegister {
    #[serde(alias = "tgId")]
    #[validate(range(min = 1, message = "tg_id must be positive"))]
    pub(crate) tg_id: i64,
    #[serde(default)]
    #[serde(alias = "tgUsername", alias = "username")]
    #[validate(length(max = 65, message = "alias is too long"))]
    pub(crate) alias: Option<String>,
    #[validate(length(min = 1, max = 128, message = "nickname must be 1-128 characters"))]
    pub(crate) nickname: String,
    #[serde(default)]
    #[serde(alias = "firstName")]
    pub(crate) first_name: Option<String>,
    #[serde(default)]
    #[serde(alias = "lastName")]
    pub(crate) last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) tg_id: i64,
    pub(crate) alias: Option<String>,
    pub(crate) nickname: String,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) late_days: i32,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: User) -> Self {
        Self {
            id: user.id,
            tg_id: user.tg_id,
            alias: user.tg_username,
            nickname: user.nickname,
            first_name: user.first_name,
            last_name: user.last_name,
            late_days: user.late_days,
            created_at: format_primitive(user.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LateDaysResponse {
    pub(crate) late_days: i32,
    pub(crate) max_late: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreHistoryEntry {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) score: i16,
    pub(crate) graded_user: String,
    pub(crate) created_at: String,
}

impl ScoreHistoryEntry {
    pub(crate) fn from_db(record: ScoreRecord, graded_user: String) -> Self {
        Self {
            workshop: record.workshop_number,
            task: record.task_number,
            score: record.score,
            graded_user,
            created_at: format_primitive(record.created_at),
        }
    }
}
