use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::ReviewSettings;
use crate::db::models::User;
use crate::repositories::{CreateUser, ReviewStore, StoreError};
use crate::services::error::ReviewError;

/// One way of naming a user. The numeric id is authoritative once known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UserHandle {
    ById(i64),
    ByAlias(String),
    ByNickname(String),
}

/// Identity tuple delivered with each request by the transport layer.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdentityInput {
    pub(crate) tg_id: Option<i64>,
    pub(crate) alias: Option<String>,
    pub(crate) nickname: Option<String>,
}

impl IdentityInput {
    /// Precedence: numeric id, then alias, then nickname.
    pub(crate) fn handle(&self) -> Result<UserHandle, ReviewError> {
        if let Some(tg_id) = self.tg_id {
            if tg_id <= 0 {
                return Err(ReviewError::InvalidIdentity(format!("non-positive id {tg_id}")));
            }
            return Ok(UserHandle::ById(tg_id));
        }

        if let Some(alias) = self.alias.as_deref().map(normalize_alias).transpose()?.flatten() {
            return Ok(UserHandle::ByAlias(alias));
        }

        if let Some(nickname) = self.nickname.as_deref().and_then(normalize_nickname) {
            return Ok(UserHandle::ByNickname(nickname));
        }

        Err(ReviewError::InvalidIdentity("no id, alias or nickname supplied".to_string()))
    }
}

/// Trims and strips a leading `@`. Empty input is `None`; anything other than
/// ASCII letters, digits and `_` is rejected.
pub(crate) fn normalize_alias(raw: &str) -> Result<Option<String>, ReviewError> {
    let alias = raw.trim().trim_start_matches('@');
    if alias.is_empty() {
        return Ok(None);
    }

    if alias.len() > 64 || !alias.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(ReviewError::InvalidIdentity(format!("malformed alias {raw:?}")));
    }

    Ok(Some(alias.to_string()))
}

fn normalize_nickname(raw: &str) -> Option<String> {
    let nickname = raw.trim();
    (!nickname.is_empty()).then(|| nickname.to_string())
}

pub(crate) async fn find_user(
    store: &dyn ReviewStore,
    handle: &UserHandle,
) -> Result<User, ReviewError> {
    store.find_user(handle).await?.ok_or(ReviewError::UserNotFound)
}

/// Resolves the caller. When found by numeric id and the transport reports a
/// different alias, the stored alias is refreshed unless another user holds it.
pub(crate) async fn resolve_user(
    store: &dyn ReviewStore,
    input: &IdentityInput,
    now: PrimitiveDateTime,
) -> Result<User, ReviewError> {
    let handle = input.handle()?;
    let user = find_user(store, &handle).await?;

    if !matches!(handle, UserHandle::ById(_)) {
        return Ok(user);
    }

    let reported = match input.alias.as_deref() {
        Some(raw) => normalize_alias(raw)?,
        None => return Ok(user),
    };
    let Some(alias) = reported.filter(|alias| user.tg_username.as_ref() != Some(alias)) else {
        return Ok(user);
    };
    if let Some(holder) = store.find_user(&UserHandle::ByAlias(alias.clone())).await? {
        if holder.id != user.id {
            warn_alias_held(&user, &alias, &holder.id);
            return Ok(user);
        }
    }

    tracing::info!(
        user_id = %user.id,
        old_alias = user.tg_username.as_deref().unwrap_or("-"),
        new_alias = %alias,
        "Refreshing user alias"
    );
    match store.update_alias(&user.id, Some(&alias), now).await {
        Ok(refreshed) => refreshed.ok_or(ReviewError::UserNotFound),
        // Taken between the lookup and the write.
        Err(StoreError::Duplicate(_)) => {
            warn_alias_held(&user, &alias, "-");
            Ok(user)
        }
        Err(err) => Err(err.into()),
    }
}

fn warn_alias_held(user: &User, alias: &str, holder_id: &str) {
    tracing::warn!(
        user_id = %user.id,
        alias,
        holder_id,
        "Reported alias belongs to another user, keeping the stored one"
    );
}

#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) tg_id: i64,
    pub(crate) alias: Option<String>,
    pub(crate) nickname: String,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
}

pub(crate) async fn register_user(
    store: &dyn ReviewStore,
    settings: &ReviewSettings,
    registration: Registration,
    now: PrimitiveDateTime,
) -> Result<User, ReviewError> {
    if registration.tg_id <= 0 {
        return Err(ReviewError::InvalidIdentity(format!(
            "non-positive id {}",
            registration.tg_id
        )));
    }
    let alias = registration
        .alias
        .as_deref()
        .map(normalize_alias)
        .transpose()?
        .flatten()
        .ok_or_else(|| ReviewError::InvalidIdentity("an alias is required".to_string()))?;
    let nickname = normalize_nickname(&registration.nickname)
        .ok_or_else(|| ReviewError::InvalidIdentity("a nickname is required".to_string()))?;

    if store.find_user(&UserHandle::ById(registration.tg_id)).await?.is_some() {
        return Err(ReviewError::AlreadyExists { entity: "user" });
    }
    if store.find_user(&UserHandle::ByAlias(alias.clone())).await?.is_some() {
        return Err(ReviewError::AlreadyExists { entity: "alias" });
    }

    let created = store
        .insert_user(CreateUser {
            id: Uuid::new_v4().to_string(),
            tg_id: registration.tg_id,
            tg_username: Some(alias),
            nickname,
            first_name: registration.first_name,
            last_name: registration.last_name,
            late_days: settings.default_late_days,
            now,
        })
        .await;

    match created {
        Ok(user) => {
            tracing::info!(user_id = %user.id, tg_id = user.tg_id, "User registered");
            Ok(user)
        }
        Err(err) => Err(err.into()),
    }
}
