//! Per-conversation session state.
//!
//! A [`Session`] owns everything one conversation mutates: its bounded
//! history and its single staged draft. Sessions never share state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::history::TurnHistory;
use crate::tools::args::StageArgs;

/// A drafted item awaiting commit.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntity {
    /// Descriptive fields as staged.
    pub draft: StageArgs,
    /// When the draft was staged.
    pub staged_at: DateTime<Utc>,
}

impl StagedEntity {
    /// Stage `draft` now.
    pub fn new(draft: StageArgs) -> Self {
        Self {
            draft,
            staged_at: Utc::now(),
        }
    }

    /// Flat field map for persistence.
    pub fn fields(&self) -> BTreeMap<String, String> {
        self.draft.to_fields()
    }

    /// Draft display name.
    pub fn name(&self) -> &str {
        &self.draft.name
    }
}

/// Holds at most one [`StagedEntity`].
#[derive(Debug, Clone, Default)]
pub struct StagedSlot(Option<StagedEntity>);

impl StagedSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `entity`, returning the draft it replaced.
    pub fn stage(&mut self, entity: StagedEntity) -> Option<StagedEntity> {
        self.0.replace(entity)
    }

    /// The current draft.
    pub fn get(&self) -> Option<&StagedEntity> {
        self.0.as_ref()
    }

    /// Remove and return the current draft.
    pub fn take(&mut self) -> Option<StagedEntity> {
        self.0.take()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// One conversation.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier.
    pub id: Uuid,
    /// Bounded dialogue history.
    pub history: TurnHistory,
    /// Draft awaiting commit.
    pub staged: StagedSlot,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a fresh id.
    pub fn new(window: usize) -> Self {
        Self::with_id(Uuid::new_v4(), window)
    }

    /// Create a session with a known id.
    pub fn with_id(id: Uuid, window: usize) -> Self {
        Self {
            id,
            history: TurnHistory::new(window),
            staged: StagedSlot::new(),
            created_at: Utc::now(),
        }
    }
}
