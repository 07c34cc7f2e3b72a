use super::{Intent, IntentKind};
use crate::core::{Extra, Result, Target, TargetKey};
use tracing::debug;

/// Result of recording an intent into a [`ChangeLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    /// The intent was appended to the end of the log.
    Appended,
    /// An opposite pending intent was found and removed; nothing was appended.
    Cancelled(Intent),
    /// The same kind was already pending for this target, or the target is
    /// already a member. Absorbed silently.
    Duplicate,
}

/// Ordered sequence of pending intents, at most one per target identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    intents: Vec<Intent>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Intent> {
        self.intents.iter()
    }

    /// Kind of the intent currently pending for `key`, if any.
    pub fn pending_kind(&self, key: &TargetKey) -> Option<IntentKind> {
        self.intents
            .iter()
            .find(|intent| intent.key() == key)
            .map(|intent| intent.kind)
    }

    pub fn record(
        &mut self,
        target: Target,
        kind: IntentKind,
        extra: Extra,
    ) -> Result<IntentOutcome> {
        record_intent(self, target, kind, extra)
    }

    /// Takes every pending intent, leaving an empty log behind.
    pub fn take(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.intents)
    }

    pub fn clear(&mut self) {
        self.intents.clear();
    }
}

impl IntoIterator for ChangeLog {
    type Item = Intent;
    type IntoIter = std::vec::IntoIter<Intent>;

    fn into_iter(self) -> Self::IntoIter {
        self.intents.into_iter()
    }
}

/// Position of the intent for `key` with the given `kind`.
pub fn find_intent(log: &ChangeLog, key: &TargetKey, kind: IntentKind) -> Option<usize> {
    log.intents.iter().position(|intent| intent.matches(key, kind))
}

/// Inserts an intent, cancelling an opposite pending intent for the same target.
///
/// On a validation error the log is left untouched.
pub fn record_intent(
    log: &mut ChangeLog,
    target: Target,
    kind: IntentKind,
    extra: Extra,
) -> Result<IntentOutcome> {
    let intent = Intent::new(target, kind, extra)?;

    if let Some(index) = find_intent(log, intent.key(), kind.opposite()) {
        let cancelled = log.intents.remove(index);
        debug!(endpoint = %intent.key(), kind = %kind, "cancelled opposite pending intent");
        return Ok(IntentOutcome::Cancelled(cancelled));
    }

    if find_intent(log, intent.key(), kind).is_some() {
        debug!(endpoint = %intent.key(), kind = %kind, "duplicate intent absorbed");
        return Ok(IntentOutcome::Duplicate);
    }

    log.intents.push(intent);
    Ok(IntentOutcome::Appended)
}
