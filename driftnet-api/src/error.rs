use thiserror::Error;

use crate::command::StartError;
use crate::config::ConfigError;

/// Failure communicating with, or reported by, a [`crate::Handle`]'s engine
/// task.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    #[error("engine task is no longer running")]
    EngineGone,
    #[error("engine dropped the reply channel without answering")]
    NoReply,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Start(#[from] StartError),
}
