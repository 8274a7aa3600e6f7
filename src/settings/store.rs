use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::settings::error::StoreError;

pub type StoreMap = Map<String, Value>;

/// Keys touched by one write, delivered to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub type ChangeListener = Box<dyn Fn(&StorageChange)>;

/// Key-value settings persistence with change notification.
///
/// The store is shared by several components on one thread, so every
/// operation takes `&self`. Listeners run synchronously after each write and
/// must not subscribe or unsubscribe from inside the callback.
pub trait SettingsStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError>;
    fn set(&self, items: StoreMap) -> Result<(), StoreError>;
    fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

// ============================================================================
// Change notification plumbing
// ============================================================================

#[derive(Default)]
struct ChangeNotifier {
    listeners: RefCell<Vec<(SubscriptionId, ChangeListener)>>,
    next_id: Cell<u64>,
}

impl ChangeNotifier {
    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    fn notify(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let change = StorageChange { keys };
        for (_, listener) in self.listeners.borrow().iter() {
            listener(&change);
        }
    }
}

fn select(all: &StoreMap, keys: &[&str]) -> StoreMap {
    keys.iter()
        .filter_map(|k| all.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store; the default for tests and embedded hosts.
#[derive(Default)]
pub struct MemoryStore {
    data: RefCell<StoreMap>,
    notifier: ChangeNotifier,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: StoreMap) -> Self {
        MemoryStore {
            data: RefCell::new(values),
            notifier: ChangeNotifier::default(),
        }
    }

    pub fn snapshot(&self) -> StoreMap {
        self.data.borrow().clone()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        Ok(select(&self.data.borrow(), keys))
    }

    fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let keys: Vec<String> = items.keys().cloned().collect();
        self.data.borrow_mut().extend(items);
        self.notifier.notify(keys);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let removed: Vec<String> = {
            let mut data = self.data.borrow_mut();
            keys.iter()
                .filter(|k| data.remove(**k).is_some())
                .map(|k| k.to_string())
                .collect()
        };
        self.notifier.notify(removed);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Settings persisted as one JSON object on disk.
///
/// Every read goes to the file, so writes from another process are picked
/// up; notifications only cover writes made through this instance.
pub struct FileStore {
    path: PathBuf,
    notifier: ChangeNotifier,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            notifier: ChangeNotifier::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreMap, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreMap::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(StoreMap::new());
        }

        let value: Value = serde_json::from_str(&content).map_err(|e| StoreError::Json {
            context: self.path.display().to_string(),
            source: e,
        })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Malformed(format!(
                "expected an object in {}, found {}",
                self.path.display(),
                type_name(&other)
            ))),
        }
    }

    fn save(&self, data: &StoreMap) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(data).map_err(|e| StoreError::Json {
            context: "serialize settings".into(),
            source: e,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, json).map_err(|e| StoreError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;
        debug!(path = %self.path.display(), "settings written");
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        Ok(select(&self.load()?, keys))
    }

    fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let mut data = self.load()?;
        let keys: Vec<String> = items.keys().cloned().collect();
        data.extend(items);
        self.save(&data)?;
        self.notifier.notify(keys);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut data = self.load()?;
        let removed: Vec<String> = keys
            .iter()
            .filter(|k| data.remove(**k).is_some())
            .map(|k| k.to_string())
            .collect();
        if !removed.is_empty() {
            self.save(&data)?;
        }
        self.notifier.notify(removed);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
