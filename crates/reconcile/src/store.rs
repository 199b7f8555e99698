//! Finding store trait and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use patrol_core::{Finding, Scope};

use crate::error::StoreError;

/// Durable finding persistence, keyed by scope.
///
/// `save` replaces the full set for a scope atomically — the reconciler never
/// issues partial writes, so readers always observe a coherent set.
#[async_trait]
pub trait FindingStore: Send + Sync {
    /// Load the prior finding set for a scope (empty on first scan).
    async fn load_prior(&self, scope: &Scope) -> Result<Vec<Finding>, StoreError>;

    /// Replace the finding set for a scope.
    async fn save(&self, scope: &Scope, findings: Vec<Finding>) -> Result<(), StoreError>;
}

/// In-memory store used by tests and the scan-worker fixture mode.
///
/// Saves can be toggled to fail, to exercise the job-level StoreError path.
#[derive(Default)]
pub struct MemoryFindingStore {
    findings: RwLock<HashMap<Scope, Vec<Finding>>>,
    fail_saves: AtomicBool,
}

impl MemoryFindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with `StoreError::Write`.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl FindingStore for MemoryFindingStore {
    async fn load_prior(&self, scope: &Scope) -> Result<Vec<Finding>, StoreError> {
        Ok(self
            .findings
            .read()
            .map_err(|e| StoreError::Read(e.to_string()))?
            .get(scope)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, scope: &Scope, findings: Vec<Finding>) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StoreError::Write("scripted save failure".to_string()));
        }
        self.findings
            .write()
            .map_err(|e| StoreError::Write(e.to_string()))?
            .insert(scope.clone(), findings);
        Ok(())
    }
}
