//! Service directory and scoped dependency overlay
//!
//! The process-wide [`ServiceRegistry`] maps well-known keys to shared
//! collaborators (model client, tool manager, configuration, permission
//! gate, event bus, current agent). A [`ScopedServices`] layer rebinds a
//! single key for the lifetime of one delegation without mutating the
//! shared directory; layers chain, so arbitrarily nested delegations each
//! see their own "current agent" while all other lookups read through.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Well-known service keys
pub mod keys {
    /// The delegate agent currently executing (rebound per delegation)
    pub const CURRENT_AGENT: &str = "current-agent";
    /// Shared [`crate::llm::ModelClient`] bound to the default model
    pub const MODEL_CLIENT: &str = "model-client";
    /// Shared [`crate::tool::ToolManager`]
    pub const TOOL_MANAGER: &str = "tool-manager";
    /// Shared [`crate::config::Config`]
    pub const CONFIG: &str = "config";
    /// Shared [`crate::permission::PermissionGate`]
    pub const PERMISSION_GATE: &str = "permission-gate";
    /// Shared [`crate::events::EventBus`]
    pub const EVENT_BUS: &str = "event-bus";
}

type BoxedService = Arc<dyn Any + Send + Sync>;

/// Read access to the service directory.
///
/// Implemented by both the shared registry and scoped overlays, so callers
/// resolve collaborators the same way regardless of nesting.
pub trait ServiceLookup: Send + Sync {
    /// Look up the raw boxed value for a key.
    fn get_raw(&self, key: &str) -> Option<BoxedService>;
}

impl dyn ServiceLookup {
    /// Typed lookup. `T` is the stored value type, typically an `Arc`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.get_raw(key).and_then(|v| v.downcast_ref::<T>().cloned())
    }

    /// Typed lookup that treats absence as a fatal configuration error.
    pub fn require<T: Clone + 'static>(&self, key: &str) -> Result<T> {
        self.get::<T>(key)
            .ok_or_else(|| Error::Config(format!("Required service not registered: {}", key)))
    }
}

/// Process-wide service directory.
///
/// Explicitly constructed and injected (no language-level globals); interior
/// locking makes registration safe from any task.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<HashMap<String, BoxedService>>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under a key, replacing any previous binding.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T) {
        let mut inner = self.inner.write().expect("service registry lock poisoned");
        inner.insert(key.to_string(), Arc::new(value));
    }

    /// Remove a binding. Returns whether a binding existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write().expect("service registry lock poisoned");
        inner.remove(key).is_some()
    }

    /// All registered keys, for operator introspection.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().expect("service registry lock poisoned");
        inner.keys().cloned().collect()
    }
}

impl ServiceLookup for ServiceRegistry {
    fn get_raw(&self, key: &str) -> Option<BoxedService> {
        let inner = self.inner.read().expect("service registry lock poisoned");
        inner.get(key).cloned()
    }
}

/// One immutable overlay layer rebinding a single key.
///
/// Lookups for the rebound key return the overlay's value; everything else
/// falls through to the parent. Overlays for concurrent delegations are
/// independent objects, so they never interfere.
pub struct ScopedServices {
    key: String,
    value: BoxedService,
    parent: Arc<dyn ServiceLookup>,
}

impl ScopedServices {
    /// Create an overlay over `parent` rebinding `key` to `value`.
    pub fn rebind<T: Clone + Send + Sync + 'static>(
        parent: Arc<dyn ServiceLookup>,
        key: &str,
        value: T,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            value: Arc::new(value),
            parent,
        })
    }
}

impl ServiceLookup for ScopedServices {
    fn get_raw(&self, key: &str) -> Option<BoxedService> {
        if key == self.key {
            Some(self.value.clone())
        } else {
            self.parent.get_raw(key)
        }
    }
}
