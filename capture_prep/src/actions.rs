//! Readiness actions tracked during a preparation pass

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Generic gating conditions checked before any frame-specific step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Filter,
    Rotator,
    Temperature,
    GuiderDrift,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Filter,
        ActionKind::Rotator,
        ActionKind::Temperature,
        ActionKind::GuiderDrift,
    ];

    fn slot(self) -> usize {
        match self {
            ActionKind::Filter => 0,
            ActionKind::Rotator => 1,
            ActionKind::Temperature => 2,
            ActionKind::GuiderDrift => 3,
        }
    }
}

/// Fixed map from every [`ActionKind`] to a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionMap<T>([T; 4]);

impl<T: Copy> ActionMap<T> {
    pub fn filled(value: T) -> Self {
        Self([value; 4])
    }

    pub fn fill(&mut self, value: T) {
        self.0 = [value; 4];
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, T)> + '_ {
        ActionKind::ALL.iter().map(move |&kind| (kind, self[kind]))
    }
}

impl<T> Index<ActionKind> for ActionMap<T> {
    type Output = T;

    fn index(&self, kind: ActionKind) -> &T {
        &self.0[kind.slot()]
    }
}

impl<T> IndexMut<ActionKind> for ActionMap<T> {
    fn index_mut(&mut self, kind: ActionKind) -> &mut T {
        &mut self.0[kind.slot()]
    }
}

/// Per-pass readiness of each action, plus the one-shot "ignore next
/// observation" markers set when a command has just been issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReadinessTable {
    ready: ActionMap<bool>,
    ignore_next: ActionMap<bool>,
}

impl Default for ActionReadinessTable {
    fn default() -> Self {
        Self {
            ready: ActionMap::filled(true),
            ignore_next: ActionMap::filled(false),
        }
    }
}

impl ActionReadinessTable {
    /// Mark every action ready and drop pending ignore markers
    pub fn reset(&mut self) {
        self.ready.fill(true);
        self.ignore_next.fill(false);
    }

    pub fn is_ready(&self, kind: ActionKind) -> bool {
        self.ready[kind]
    }

    pub fn set_ready(&mut self, kind: ActionKind, ready: bool) {
        self.ready[kind] = ready;
    }

    /// True iff every action is ready
    pub fn all_ready(&self) -> bool {
        self.ready.iter().all(|(_, ready)| ready)
    }

    /// Actions still outstanding
    pub fn pending(&self) -> Vec<ActionKind> {
        self.ready
            .iter()
            .filter(|(_, ready)| !ready)
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Skip exactly one upcoming observation for this action
    pub fn ignore_next(&mut self, kind: ActionKind) {
        self.ignore_next[kind] = true;
    }

    /// Consume the ignore marker, returning whether the observation must be skipped
    pub fn take_ignore(&mut self, kind: ActionKind) -> bool {
        std::mem::replace(&mut self.ignore_next[kind], false)
    }
}
