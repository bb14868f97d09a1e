use serde_json::{json, Value};
use thiserror::Error;

use crate::repositories::StoreError;

/// Every condition the engine reports. The caller words the message; the
/// engine only supplies `kind()` and `params()`.
#[derive(Debug, Error)]
pub(crate) enum ReviewError {
    #[error("user not found")]
    UserNotFound,
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("{entity} already exists")]
    AlreadyExists { entity: &'static str },
    #[error("task {task} of workshop {workshop} requires task {missing_task} first")]
    OutOfOrder { workshop: i32, task: i32, missing_task: i32 },
    #[error("deadline for workshop {workshop} passed {days_late} days ago")]
    DeadlinePassed { workshop: i32, days_late: i64, max_late: i64 },
    #[error("{needed} late days needed, {available} available")]
    InsufficientLateDays { needed: i32, available: i32 },
    #[error("not grading workshop {workshop} task {task} of this user")]
    NotAuthorized { workshop: i32, task: i32 },
    #[error("invalid score: {0}")]
    InvalidScore(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("workshop {workshop} is not scheduled")]
    UnknownWorkshop { workshop: i32 },
    #[error("task {task} is outside 1..={max}")]
    InvalidTask { task: i32, max: i32 },
    #[error("late days must be non-negative, got {0}")]
    InvalidLateDays(i32),
    #[error("concurrent update conflict")]
    StorageConflict,
    #[error("gave up after {attempts} conflicting attempts")]
    Transient { attempts: u32 },
    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl ReviewError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::UserNotFound => "UserNotFound",
            Self::InvalidIdentity(_) => "InvalidIdentity",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::OutOfOrder { .. } => "OutOfOrder",
            Self::DeadlinePassed { .. } => "DeadlinePassed",
            Self::InsufficientLateDays { .. } => "InsufficientLateDays",
            Self::NotAuthorized { .. } => "NotAuthorized",
            Self::InvalidScore(_) => "InvalidScore",
            Self::NotFound(_) => "NotFound",
            Self::UnknownWorkshop { .. } => "UnknownWorkshop",
            Self::InvalidTask { .. } => "InvalidTask",
            Self::InvalidLateDays(_) => "InvalidLateDays",
            Self::StorageConflict => "StorageConflict",
            Self::Transient { .. } => "Transient",
            Self::Storage(_) => "Storage",
        }
    }

    pub(crate) fn params(&self) -> Value {
        match self {
            Self::UserNotFound | Self::StorageConflict | Self::Storage(_) => json!({}),
            Self::InvalidIdentity(reason) => json!({ "reason": reason }),
            Self::AlreadyExists { entity } => json!({ "entity": entity }),
            Self::OutOfOrder { workshop, task, missing_task } => {
                json!({ "workshop": workshop, "task": task, "missing_task": missing_task })
            }
            Self::DeadlinePassed { workshop, days_late, max_late } => {
                json!({ "workshop": workshop, "days_late": days_late, "max_late": max_late })
            }
            Self::InsufficientLateDays { needed, available } => {
                json!({ "needed": needed, "available": available })
            }
            Self::NotAuthorized { workshop, task } => json!({ "workshop": workshop, "task": task }),
            Self::InvalidScore(value) => json!({ "value": value, "min": 0, "max": 10 }),
            Self::NotFound(entity) => json!({ "entity": entity }),
            Self::UnknownWorkshop { workshop } => json!({ "workshop": workshop }),
            Self::InvalidTask { task, max } => json!({ "task": task, "max": max }),
            Self::InvalidLateDays(days) => json!({ "days": days }),
            Self::Transient { attempts } => json!({ "attempts": attempts }),
        }
    }
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::StorageConflict,
            StoreError::Duplicate(constraint) if constraint.contains("submission") => {
                Self::AlreadyExists { entity: "submission" }
            }
            StoreError::Duplicate(constraint) if constraint.contains("alias") => {
                Self::AlreadyExists { entity: "alias" }
            }
            StoreError::Duplicate(_) => Self::AlreadyExists { entity: "user" },
            other => Self::Storage(other),
        }
    }
}
