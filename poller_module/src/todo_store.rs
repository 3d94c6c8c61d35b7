//! In-process todo collection with a write-through JSON snapshot.
//!
//! Every mutation rewrites the full snapshot (temp file + atomic rename),
//! so a crash loses at most the in-flight call.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub use extract_module::Priority;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("todo not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    /// Unique, immutable once assigned.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Origin tag, e.g. a mailbox identifier or "manual".
    pub source: String,
    /// Immutable once assigned.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoCreate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: Option<bool>,
}

pub struct TodoStore {
    path: PathBuf,
    todos: Mutex<HashMap<String, Todo>>,
}

impl TodoStore {
    /// Open the store, reloading a previous snapshot when one exists. A
    /// corrupt snapshot is kept on disk and the store starts empty rather
    /// than refusing to boot.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let todos = if path.exists() {
            match fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|raw| serde_json::from_str::<HashMap<String, Todo>>(&raw).map_err(StoreError::from))
            {
                Ok(todos) => {
                    info!("loaded {} todos from {}", todos.len(), path.display());
                    todos
                }
                Err(err) => {
                    warn!("could not load snapshot {}: {}", path.display(), err);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            todos: Mutex::new(todos),
        })
    }

    pub fn create(&self, fields: TodoCreate) -> Result<Todo, StoreError> {
        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            title: fields.title,
            description: fields.description,
            completed: false,
            priority: fields.priority,
            due_date: fields.due_date,
            source: fields.source,
            created_at: Utc::now(),
        };

        let mut todos = self.lock();
        todos.insert(todo.id.clone(), todo.clone());
        self.persist(&todos)?;
        Ok(todo)
    }

    pub fn get(&self, id: &str) -> Result<Todo, StoreError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// All todos in insertion order (creation time, id as tiebreak).
    pub fn list(&self) -> Vec<Todo> {
        let mut todos: Vec<Todo> = self.lock().values().cloned().collect();
        todos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        todos
    }

    pub fn update(&self, id: &str, fields: TodoUpdate) -> Result<Todo, StoreError> {
        let mut todos = self.lock();
        let todo = todos
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(title) = fields.title {
            todo.title = title;
        }
        if let Some(description) = fields.description {
            todo.description = Some(description);
        }
        if let Some(priority) = fields.priority {
            todo.priority = priority;
        }
        if let Some(due_date) = fields.due_date {
            todo.due_date = Some(due_date);
        }
        if let Some(completed) = fields.completed {
            todo.completed = completed;
        }

        let updated = todo.clone();
        self.persist(&todos)?;
        Ok(updated)
    }

    pub fn toggle_complete(&self, id: &str) -> Result<Todo, StoreError> {
        let mut todos = self.lock();
        let todo = todos
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        todo.completed = !todo.completed;

        let toggled = todo.clone();
        self.persist(&todos)?;
        Ok(toggled)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut todos = self.lock();
        if todos.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.persist(&todos)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Todo>> {
        self.todos.lock().expect("todo store lock poisoned")
    }

    /// Write the full collection to a temp file, then rename over the
    /// snapshot so readers never observe a partial write.
    fn persist(&self, todos: &HashMap<String, Todo>) -> Result<(), StoreError> {
        let payload = serde_json::to_string_pretty(todos)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> TodoStore {
        TodoStore::load(temp.path().join("todos.json")).expect("load")
    }

    fn create_fields(title: &str) -> TodoCreate {
        TodoCreate {
            title: title.to_string(),
            description: None,
            priority: Priority::default(),
            due_date: None,
            source: "manual".to_string(),
        }
    }

    #[test]
    fn create_assigns_unique_immutable_ids() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        let a = store.create(create_fields("a")).expect("create");
        let b = store.create(create_fields("b")).expect("create");
        assert_ne!(a.id, b.id);
        assert!(!a.completed);
        assert_eq!(a.priority, Priority::Medium);
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        match store.update("missing", TodoUpdate::default()) {
            Err(StoreError::NotFound(id)) => assert_eq!(id, "missing"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn toggle_flips_completion() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        let todo = store.create(create_fields("t")).expect("create");
        assert!(store.toggle_complete(&todo.id).expect("toggle").completed);
        assert!(!store.toggle_complete(&todo.id).expect("toggle").completed);
    }

    #[test]
    fn snapshot_round_trips_all_records() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("todos.json");

        let original: Vec<Todo> = {
            let store = TodoStore::load(&path).expect("load");
            let mut created = Vec::new();
            for i in 0..5 {
                let mut fields = create_fields(&format!("todo {i}"));
                fields.priority = Priority::High;
                fields.due_date = NaiveDate::from_ymd_opt(2026, 9, 1);
                fields.source = "mailbox".to_string();
                created.push(store.create(fields).expect("create"));
            }
            store
                .update(
                    &created[0].id,
                    TodoUpdate {
                        completed: Some(true),
                        ..TodoUpdate::default()
                    },
                )
                .expect("update");
            store.list()
        };

        let reloaded = TodoStore::load(&path).expect("reload");
        let todos = reloaded.list();
        assert_eq!(todos.len(), original.len());
        for (before, after) in original.iter().zip(todos.iter()) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.title, after.title);
            assert_eq!(before.completed, after.completed);
            assert_eq!(before.priority, after.priority);
            assert_eq!(before.due_date, after.due_date);
            assert_eq!(before.source, after.source);
            assert_eq!(before.created_at, after.created_at);
        }
    }

    #[test]
    fn delete_removes_and_persists() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("todos.json");
        let store = TodoStore::load(&path).expect("load");
        let todo = store.create(create_fields("bye")).expect("create");
        store.delete(&todo.id).expect("delete");
        assert!(matches!(store.get(&todo.id), Err(StoreError::NotFound(_))));

        let reloaded = TodoStore::load(&path).expect("reload");
        assert!(reloaded.is_empty());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("todos.json");
        fs::write(&path, "{ not json").expect("write");
        let store = TodoStore::load(&path).expect("load");
        assert!(store.is_empty());
    }
}
