use crate::core::{Extra, Result, Target, TargetKey};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Add,
    Remove,
}

impl IntentKind {
    pub fn opposite(self) -> Self {
        match self {
            IntentKind::Add => IntentKind::Remove,
            IntentKind::Remove => IntentKind::Add,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Add => write!(f, "add"),
            IntentKind::Remove => write!(f, "remove"),
        }
    }
}

/// One pending membership change against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    key: TargetKey,
    pub target: Target,
    pub kind: IntentKind,
    #[serde(default)]
    pub extra: Extra,
}

impl Intent {
    /// Builds an intent, rejecting targets without a complete identity.
    pub fn new(target: Target, kind: IntentKind, extra: Extra) -> Result<Self> {
        let key = target.key()?;
        Ok(Self {
            key,
            target,
            kind,
            extra,
        })
    }

    pub fn add(target: Target) -> Result<Self> {
        Self::new(target, IntentKind::Add, Extra::new())
    }

    pub fn remove(target: Target) -> Result<Self> {
        Self::new(target, IntentKind::Remove, Extra::new())
    }

    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn matches(&self, key: &TargetKey, kind: IntentKind) -> bool {
        self.kind == kind && &self.key == key
    }
}
