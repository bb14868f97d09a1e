use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) tg_id: i64,
    pub(crate) tg_username: Option<String>,
    pub(crate) nickname: String,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) late_days: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl User {
    /// Name shown to peers: the chat alias when known, the nickname otherwise.
    pub(crate) fn display_alias(&self) -> &str {
        self.tg_username.as_deref().unwrap_or(&self.nickname)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) workshop_number: i32,
    pub(crate) task_number: i32,
    pub(crate) file_id: String,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) mime_type: String,
    pub(crate) graders: Vec<String>,
    pub(crate) scores: Vec<i16>,
    pub(crate) scorers: Vec<String>,
    pub(crate) late_days_used: i32,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Submission {
    pub(crate) fn slot(&self) -> TaskSlot {
        TaskSlot { workshop: self.workshop_number, task: self.task_number }
    }

    pub(crate) fn document(&self) -> DocumentRef {
        DocumentRef {
            file_id: self.file_id.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Open claims plus scores already given; capped at N.
    pub(crate) fn load(&self) -> usize {
        self.graders.len() + self.scores.len()
    }

    pub(crate) fn is_claimed_by(&self, user_id: &str) -> bool {
        self.graders.iter().any(|grader| grader == user_id)
    }

    pub(crate) fn is_scored_by(&self, user_id: &str) -> bool {
        self.scorers.iter().any(|scorer| scorer == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ScoreRecord {
    pub(crate) id: String,
    pub(crate) grader_id: String,
    pub(crate) owner_id: String,
    pub(crate) submission_id: String,
    pub(crate) workshop_number: i32,
    pub(crate) task_number: i32,
    pub(crate) score: i16,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Opaque handle of an uploaded document. Bytes never pass through here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DocumentRef {
    pub(crate) file_id: String,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct TaskSlot {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
}

impl TaskSlot {
    pub(crate) fn previous(self) -> Option<TaskSlot> {
        (self.task > 1).then(|| TaskSlot { workshop: self.workshop, task: self.task - 1 })
    }
}
