use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::TaskSlot;
use crate::services::grades::GradeStatus;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScoreCreate {
    #[validate(length(min = 1, message = "owner must not be empty"))]
    pub(crate) owner: String,
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) score: serde_json::Number,
}

impl ScoreCreate {
    pub(crate) fn slot(&self) -> TaskSlot {
        TaskSlot { workshop: self.workshop, task: self.task }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreResponse {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) scores_received: usize,
    #[serde(flatten)]
    pub(crate) status: GradeStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentQuery {
    pub(crate) owner: String,
    pub(crate) workshop: i32,
    pub(crate) task: i32,
}

impl DocumentQuery {
    pub(crate) fn slot(&self) -> TaskSlot {
        TaskSlot { workshop: self.workshop, task: self.task }
    }
}
