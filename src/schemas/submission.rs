use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{DocumentRef, Submission, TaskSlot};
use crate::services::deadline::SubmissionTiming;
use crate::services::submissions::{LateDaySettlement, SubmissionReceipt};

#[derive(Debug, Deserialize)]
pub(crate) struct SlotRequest {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
}

impl SlotRequest {
    pub(crate) fn slot(&self) -> TaskSlot {
        TaskSlot { workshop: self.workshop, task: self.task }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub(crate) struct DocumentPayload {
    #[serde(alias = "fileId")]
    #[validate(length(min = 1, message = "file_id must not be empty"))]
    pub(crate) file_id: String,
    #[serde(alias = "fileName")]
    #[validate(length(min = 1, max = 255, message = "file_name must be 1-255 characters"))]
    pub(crate) file_name: String,
    #[serde(alias = "fileSize")]
    #[validate(range(min = 0, message = "file_size must be non-negative"))]
    pub(crate) file_size: i64,
    #[serde(alias = "mimeType")]
    #[validate(length(min = 1, message = "mime_type must not be empty"))]
    pub(crate) mime_type: String,
}

impl DocumentPayload {
    pub(crate) fn into_ref(self) -> DocumentRef {
        DocumentRef {
            file_id: self.file_id,
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
        }
    }

    pub(crate) fn from_ref(document: DocumentRef) -> Self {
        Self {
            file_id: document.file_id,
            file_name: document.file_name,
            file_size: document.file_size,
            mime_type: document.mime_type,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmissionCreate {
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    #[validate(nested)]
    pub(crate) document: DocumentPayload,
    #[serde(default)]
    pub(crate) overwrite: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) workshop: i32,
    pub(crate) task: i32,
    pub(crate) document: DocumentPayload,
    pub(crate) graders_assigned: usize,
    pub(crate) scores_received: usize,
    pub(crate) late_days_used: i32,
    pub(crate) submitted_at: String,
}

impl SubmissionResponse {
    pub(crate) fn from_db(submission: Submission) -> Self {
        Self {
            id: submission.id.clone(),
            workshop: submission.workshop_number,
            task: submission.task_number,
            document: DocumentPayload::from_ref(submission.document()),
            graders_assigned: submission.graders.len(),
            scores_received: submission.scores.len(),
            late_days_used: submission.late_days_used,
            submitted_at: format_primitive(submission.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionReceiptResponse {
    pub(crate) submission: SubmissionResponse,
    pub(crate) created: bool,
    pub(crate) timing: SubmissionTiming,
    pub(crate) late_days: LateDaySettlement,
    pub(crate) to_grade: Vec<String>,
}

impl SubmissionReceiptResponse {
    pub(crate) fn from_receipt(receipt: SubmissionReceipt) -> Self {
        Self {
            submission: SubmissionResponse::from_db(receipt.submission),
            created: receipt.created,
            timing: receipt.timing,
            late_days: receipt.settlement,
            to_grade: receipt.to_grade,
        }
    }
}
