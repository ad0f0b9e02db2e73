//! Domain stores.
//!
//! Each store owns one slice of client state behind a synchronous lock,
//! hydrates it from the backend and applies the results of its actions.
//! Locks are never held across an await.

pub mod agent;
pub mod assistant;
pub mod auth;
pub mod execution;
pub mod knowledge;
pub mod multi_agent;
pub mod recorder;
pub mod system;
pub mod tools;
pub mod voice;
pub mod workflow;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::Identified;

pub use agent::{AgentState, AgentStore};
pub use assistant::{AssistantState, AssistantStore};
pub use auth::AuthStore;
pub use execution::{ExecutionState, ExecutionStore, MAX_RUNS};
pub use knowledge::{KnowledgeState, KnowledgeStore};
pub use multi_agent::{MultiAgentState, MultiAgentStore};
pub use recorder::{RecorderState, RecorderStore};
pub use system::{SystemState, SystemStore};
pub use tools::{ToolState, ToolStore};
pub use voice::{VoiceState, VoiceStore};
pub use workflow::{WorkflowState, WorkflowStore};

/// State slices that carry a `loading` flag.
pub trait Loadable {
    fn loading_mut(&mut self) -> &mut bool;
}

/// Lock around a store's state slice.
#[derive(Debug, Default)]
pub struct StoreCell<S> {
    inner: RwLock<S>,
}

impl<S> StoreCell<S> {
    pub fn new(state: S) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, S> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.write())
    }
}

impl<S: Clone> StoreCell<S> {
    /// Copy of the current state.
    pub fn snapshot(&self) -> S {
        self.read().clone()
    }
}

impl<S: Loadable> StoreCell<S> {
    /// Set `loading` until the returned guard is dropped.
    pub fn begin_loading(&self) -> LoadingGuard<'_, S> {
        *self.write().loading_mut() = true;
        LoadingGuard { cell: self }
    }
}

/// Clears the `loading` flag on drop, including when a hydrate is cancelled.
pub struct LoadingGuard<'a, S: Loadable> {
    cell: &'a StoreCell<S>,
}

impl<S: Loadable> Drop for LoadingGuard<'_, S> {
    fn drop(&mut self) {
        *self.cell.write().loading_mut() = false;
    }
}

/// Replace the record with the same id. Returns whether one was found.
pub fn replace_by_id<T: Identified>(items: &mut [T], item: T) -> bool {
    match items.iter_mut().find(|existing| existing.id() == item.id()) {
        Some(slot) => {
            *slot = item;
            true
        }
        None => false,
    }
}

/// Insert at the front, dropping any older record with the same id.
pub fn prepend<T: Identified>(items: &mut Vec<T>, item: T) {
    items.retain(|existing| existing.id() != item.id());
    items.insert(0, item);
}

/// Insert at the back, dropping any older record with the same id.
pub fn append<T: Identified>(items: &mut Vec<T>, item: T) {
    items.retain(|existing| existing.id() != item.id());
    items.push(item);
}

/// Replace in place when present, otherwise append.
pub fn upsert<T: Identified>(items: &mut Vec<T>, item: T) {
    if let Some(slot) = items.iter_mut().find(|existing| existing.id() == item.id()) {
        *slot = item;
    } else {
        items.push(item);
    }
}
