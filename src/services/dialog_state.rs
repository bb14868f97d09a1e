use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::redis::RedisHandle;

/// Per-user conversation state owned by the front-end. The engine never
/// reads it; it is stored here so the front-end can stay stateless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DialogState {
    #[serde(default)]
    pub(crate) action: Option<DialogAction>,
    #[serde(default)]
    pub(crate) workshop: Option<i32>,
    #[serde(default)]
    pub(crate) task: Option<i32>,
    #[serde(default)]
    pub(crate) late_days: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DialogAction {
    Registration,
    SendingTask,
}

#[derive(Debug, Error)]
pub(crate) enum DialogStoreError {
    #[error("dialog state store is unavailable")]
    Unavailable,
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("stored dialog state is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

fn key(tg_id: i64) -> String {
    format!("prb:dialog:{tg_id}")
}

/// A missing key reads as the empty state.
pub(crate) async fn load(redis: &RedisHandle, tg_id: i64) -> Result<DialogState, DialogStoreError> {
    let raw = redis.get(&key(tg_id)).await?.ok_or(DialogStoreError::Unavailable)?;
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(DialogState::default()),
    }
}

/// Last write wins.
pub(crate) async fn save(
    redis: &RedisHandle,
    tg_id: i64,
    state: &DialogState,
    ttl_seconds: u64,
) -> Result<(), DialogStoreError> {
    let payload = serde_json::to_string(state)?;
    if !redis.set_ex(&key(tg_id), &payload, ttl_seconds).await? {
        return Err(DialogStoreError::Unavailable);
    }
    Ok(())
}

pub(crate) async fn clear(redis: &RedisHandle, tg_id: i64) -> Result<(), DialogStoreError> {
    if !redis.delete(&key(tg_id)).await? {
        return Err(DialogStoreError::Unavailable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{clear, load, save, DialogAction, DialogState, DialogStoreError};
    use crate::core::redis::RedisHandle;

    #[test]
    fn state_round_trips_with_missing_fields() {
        let state: DialogState =
            serde_json::from_str(r#"{"action":"sending_task","workshop":2}"#).expect("parse");
        assert_eq!(state.action, Some(DialogAction::SendingTask));
        assert_eq!(state.workshop, Some(2));
        assert_eq!(state.task, None);
    }

    #[tokio::test]
    async fn disconnected_store_reports_unavailable() {
        let redis = RedisHandle::new("redis://127.0.0.1:6379/15".to_string());

        assert!(matches!(load(&redis, 1).await, Err(DialogStoreError::Unavailable)));
        assert!(matches!(
            save(&redis, 1, &DialogState::default(), 60).await,
            Err(DialogStoreError::Unavailable)
        ));
        assert!(matches!(clear(&redis, 1).await, Err(DialogStoreError::Unavailable)));
    }
}
