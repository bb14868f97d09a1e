mod parsing;
mod settings;
mod types;

pub(crate) use types::{ReviewSettings, Settings, StoreBackend};
