//! Engine context
//!
//! Explicit bundle of the services the scene graph depends on: configuration,
//! the component factory table, the deferred GPU task queue, the resource
//! provider and the identity of the update thread. Each scene receives an
//! `Arc<EngineContext>`, so independent graphs (tests, tools) can coexist.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::render::{GpuTaskQueue, ResourceCache, ResourceProvider};
use crate::scene::{ComponentKind, ComponentRegistry};

/// Services shared by every scene
pub struct EngineContext {
    config: EngineConfig,
    registry: ComponentRegistry,
    gpu: Arc<GpuTaskQueue>,
    resources: Arc<dyn ResourceProvider>,
    update_thread: RwLock<Option<ThreadId>>,
}

impl EngineContext {
    /// Start building a context
    pub fn builder() -> EngineContextBuilder {
        EngineContextBuilder::new()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Component factory table
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Deferred GPU task queue
    pub fn gpu(&self) -> &Arc<GpuTaskQueue> {
        &self.gpu
    }

    /// Resource provider
    pub fn resources(&self) -> &dyn ResourceProvider {
        self.resources.as_ref()
    }

    /// Record the calling thread as the update thread
    ///
    /// Called by the scheduler when the update thread starts.
    pub fn bind_update_thread(&self) {
        let current = thread::current().id();
        let previous = self.update_thread.write().replace(current);
        if previous.is_some_and(|id| id != current) {
            log::warn!("Update thread rebound to {:?}", current);
        } else {
            log::debug!("Update thread bound to {:?}", current);
        }
    }

    /// Whether the caller is the update thread
    pub fn is_update_thread(&self) -> bool {
        *self.update_thread.read() == Some(thread::current().id())
    }

    /// Check thread affinity of a structural operation; logs on violation
    pub fn check_update_thread(&self, operation: &str) -> bool {
        if self.is_update_thread() {
            return true;
        }
        match *self.update_thread.read() {
            Some(_) => log::error!(
                "{} called from {:?}, which is not the update thread; ignored",
                operation,
                thread::current().id()
            ),
            None => log::error!("{} called before an update thread was bound; ignored", operation),
        }
        false
    }
}

/// Builder for [`EngineContext`]
pub struct EngineContextBuilder {
    config: EngineConfig,
    registry: ComponentRegistry,
    gpu: Option<Arc<GpuTaskQueue>>,
    resources: Option<Arc<dyn ResourceProvider>>,
}

impl EngineContextBuilder {
    /// Defaults: default config, built-in components, fresh queue, empty resource cache
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: ComponentRegistry::with_builtin(),
            gpu: None,
            resources: None,
        }
    }

    /// Builder pattern: set configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder pattern: replace the component registry
    pub fn with_registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builder pattern: register one more component type
    pub fn register<T: ComponentKind>(mut self) -> Self {
        self.registry.register::<T>();
        self
    }

    /// Builder pattern: share an existing task queue
    pub fn with_task_queue(mut self, queue: Arc<GpuTaskQueue>) -> Self {
        self.gpu = Some(queue);
        self
    }

    /// Builder pattern: set the resource provider
    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Build the context
    pub fn build(self) -> Arc<EngineContext> {
        Arc::new(EngineContext {
            config: self.config,
            registry: self.registry,
            gpu: self.gpu.unwrap_or_else(GpuTaskQueue::new),
            resources: self.resources.unwrap_or_else(|| Arc::new(ResourceCache::new())),
            update_thread: RwLock::new(None),
        })
    }
}

impl Default for EngineContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_thread_affinity() {
        let context = EngineContext::builder().build();
        assert!(!context.check_update_thread("test"));

        context.bind_update_thread();
        assert!(context.check_update_thread("test"));

        let other = Arc::clone(&context);
        let from_other = std::thread::spawn(move || other.check_update_thread("test")).join().unwrap();
        assert!(!from_other);
    }
}
