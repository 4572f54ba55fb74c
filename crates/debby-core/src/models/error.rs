use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::{ManagerAction, ManagerId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreErrorKind {
    ConfigNotFound,
    ConfigMalformed,
    NoRequirements,
    LockNotFound,
    LockMalformed,
    ToolInvocationFailed,
    VersionNotFound,
    InvalidInput,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub manager: Option<ManagerId>,
    pub action: Option<ManagerAction>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            manager: None,
            action: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_manager(
        manager: ManagerId,
        action: ManagerAction,
        kind: CoreErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            manager: Some(manager),
            action: Some(action),
            kind,
            message: message.into(),
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.manager {
            Some(manager) => write!(f, "[{}] {:?}: {}", manager.as_str(), self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for CoreError {}
