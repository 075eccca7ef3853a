//! Shared extensions
//!
//! Named services and data that case bodies can look up at run time, such as
//! a mock server or a fixture directory. A registry lives for exactly one run:
//! the runner tears it down when the run ends, and every lookup after that
//! fails. Worker processes build their own registry.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;
use tracing::{debug, info};

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn() -> Shared + Send + Sync>;

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("extension \"{0}\" is not installed")]
    NotFound(String),

    #[error("extension \"{0}\" has a different type")]
    TypeMismatch(String),

    #[error("extensions were torn down at the end of the run")]
    TornDown,
}

enum Entry {
    Data(Shared),
    Extension {
        factory: Factory,
        singleton: bool,
        instance: OnceLock<Shared>,
    },
}

impl Entry {
    fn resolve(&self) -> Shared {
        match self {
            Entry::Data(value) => value.clone(),
            Entry::Extension {
                factory,
                singleton: true,
                instance,
            } => instance.get_or_init(|| factory()).clone(),
            Entry::Extension { factory, .. } => factory(),
        }
    }
}

/// Run-scoped registry of named shared services
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    torn_down: AtomicBool,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a ready-made value under `name`
    pub fn shared_data<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) {
        self.insert(name.into(), Entry::Data(Arc::new(value)));
    }

    /// Share a service built by `factory`.
    ///
    /// A singleton is built on first lookup and reused; otherwise every lookup
    /// gets a fresh instance.
    pub fn shared_extension<T, F>(&self, name: impl Into<String>, factory: F, singleton: bool)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Shared);
        self.insert(
            name.into(),
            Entry::Extension {
                factory,
                singleton,
                instance: OnceLock::new(),
            },
        );
    }

    fn insert(&self, name: String, entry: Entry) {
        debug!("Installing extension {}", name);
        self.torn_down.store(false, Ordering::Release);
        self.write_entries().insert(name, entry);
    }

    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ExtensionError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(ExtensionError::TornDown);
        }

        let value = {
            let entries = self.read_entries();
            let entry = entries
                .get(name)
                .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;
            entry.resolve()
        };

        value
            .downcast::<T>()
            .map_err(|_| ExtensionError::TypeMismatch(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_entries().contains_key(name)
    }

    /// Installed names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_entries().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names from `required` that are not installed
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        let entries = self.read_entries();
        required
            .iter()
            .filter(|name| !entries.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Drop every extension; later lookups fail with [`ExtensionError::TornDown`]
    pub fn teardown(&self) {
        let count = {
            let mut entries = self.write_entries();
            let count = entries.len();
            entries.clear();
            count
        };
        self.torn_down.store(true, Ordering::Release);

        if count > 0 {
            info!("Tore down {} extensions", count);
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.names())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct MockServer {
        port: u16,
    }

    #[test]
    fn test_shared_data() {
        let registry = ExtensionRegistry::new();
        registry.shared_data("fixtures", vec![1, 2, 3]);

        let data = registry.get::<Vec<i32>>("fixtures").unwrap();
        assert_eq!(*data, vec![1, 2, 3]);
        assert!(registry.contains("fixtures"));
    }

    #[test]
    fn test_non_singleton_builds_per_lookup() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let registry = ExtensionRegistry::new();
        registry.shared_extension(
            "server",
            move || MockServer {
                port: 8000 + counter.fetch_add(1, Ordering::SeqCst) as u16,
            },
            false,
        );

        let a = registry.get::<MockServer>("server").unwrap();
        let b = registry.get::<MockServer>("server").unwrap();
        assert_ne!(a.port, b.port);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_is_built_once() {
        let registry = ExtensionRegistry::new();
        registry.shared_extension("server", || MockServer { port: 8080 }, true);

        let a = registry.get::<MockServer>("server").unwrap();
        let b = registry.get::<MockServer>("server").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_lookup_errors() {
        let registry = ExtensionRegistry::new();
        registry.shared_data("answer", 42u32);

        assert!(matches!(
            registry.get::<u32>("question"),
            Err(ExtensionError::NotFound(_))
        ));
        assert!(matches!(
            registry.get::<String>("answer"),
            Err(ExtensionError::TypeMismatch(_))
        ));

        registry.teardown();
        assert!(matches!(
            registry.get::<u32>("answer"),
            Err(ExtensionError::TornDown)
        ));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_missing_requirements() {
        let registry = ExtensionRegistry::new();
        registry.shared_data("db", ());
        let required = vec!["db".to_string(), "mock_server".to_string()];
        assert_eq!(registry.missing(&required), vec!["mock_server"]);
    }
}
