//! Per-model lifecycle hooks and registration options.

use crate::Record;
use std::fmt;
use std::sync::Arc;

/// Runs before a write and may change the record that gets stored.
pub type BeforeHook = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// Runs after a write with the stored record.
pub type AfterHook = Arc<dyn Fn(&Record) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Create,
    Update,
    /// Both `Create` and `Update`
    Save,
}

impl HookEvent {
    fn covers(self, event: HookEvent) -> bool {
        self == event || self == HookEvent::Save
    }
}

#[derive(Clone, Default)]
pub struct ModelHooks {
    before: Vec<(HookEvent, BeforeHook)>,
    after: Vec<(HookEvent, AfterHook)>,
}

impl ModelHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F>(mut self, event: HookEvent, hook: F) -> Self
    where
        F: Fn(&mut Record) + Send + Sync + 'static,
    {
        self.before.push((event, Arc::new(hook)));
        self
    }

    pub fn after<F>(mut self, event: HookEvent, hook: F) -> Self
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        self.after.push((event, Arc::new(hook)));
        self
    }

    /// Runs the `before` hooks registered for `event`, in registration order.
    pub fn run_before(&self, event: HookEvent, record: &mut Record) {
        for (registered, hook) in &self.before {
            if registered.covers(event) {
                hook(record);
            }
        }
    }

    pub fn run_after(&self, event: HookEvent, record: &Record) {
        for (registered, hook) in &self.after {
            if registered.covers(event) {
                hook(record);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

impl fmt::Debug for ModelHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// Options given when a model is defined.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    /// Maintain `createdAt`/`updatedAt` on every write
    pub timestamps: bool,
    pub hooks: ModelHooks,
}

impl ModelOptions {
    pub fn with_timestamps() -> Self {
        Self {
            timestamps: true,
            ..Self::default()
        }
    }
}
