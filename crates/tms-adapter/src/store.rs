use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::entities::{ClassContainer, FixtureResult, RunContainer, TestResult};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entity not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("entity {id} is not a {expected}")]
    WrongKind { id: String, expected: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tagged union over everything the store can hold.
#[derive(Clone, Debug)]
pub enum Entity {
    Run(RunContainer),
    Class(ClassContainer),
    Test(TestResult),
    Fixture(FixtureResult),
}

impl Entity {
    fn kind(&self) -> &'static str {
        match self {
            Entity::Run(_) => "run container",
            Entity::Class(_) => "class container",
            Entity::Test(_) => "test result",
            Entity::Fixture(_) => "fixture result",
        }
    }
}

#[derive(Default)]
struct StoreState {
    entities: HashMap<String, Entity>,
    attachments: HashMap<String, Vec<String>>,
}

/// Single source of truth for all in-flight execution entities, keyed by id.
///
/// Every operation takes the one coarse lock; the lock is held only for the
/// mutation itself, never across a remote call. Cloning the store clones the
/// handle, not the state.
#[derive(Clone, Default)]
pub struct EntityStore {
    inner: Arc<Mutex<StoreState>>,
}

macro_rules! typed_accessors {
    ($get:ident, $update:ident, $variant:ident, $type:ty, $resource:expr) => {
        pub fn $get(&self, id: &str) -> StoreResult<$type> {
            let state = self.lock();
            match state.entities.get(id) {
                Some(Entity::$variant(entity)) => Ok(entity.clone()),
                Some(other) => Err(StoreError::WrongKind {
                    id: id.to_string(),
                    expected: other.kind(),
                }),
                None => Err(StoreError::NotFound {
                    resource: $resource,
                    id: id.to_string(),
                }),
            }
        }

        /// Fetch, apply, and store back in one lock scope.
        pub fn $update(&self, id: &str, apply: impl FnOnce(&mut $type)) -> StoreResult<()> {
            let mut state = self.lock();
            match state.entities.get_mut(id) {
                Some(Entity::$variant(entity)) => {
                    apply(entity);
                    Ok(())
                }
                Some(other) => Err(StoreError::WrongKind {
                    id: id.to_string(),
                    expected: other.kind(),
                }),
                None => Err(StoreError::NotFound {
                    resource: $resource,
                    id: id.to_string(),
                }),
            }
        }
    };
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.inner.lock().expect("entity store mutex poisoned")
    }

    pub fn put(&self, id: impl Into<String>, entity: Entity) {
        self.lock().entities.insert(id.into(), entity);
    }

    pub fn remove(&self, id: &str) {
        let mut state = self.lock();
        state.entities.remove(id);
        state.attachments.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().entities.contains_key(id)
    }

    typed_accessors!(run, update_run, Run, RunContainer, "run container");
    typed_accessors!(class, update_class, Class, ClassContainer, "class container");
    typed_accessors!(test, update_test, Test, TestResult, "test result");
    typed_accessors!(fixture, update_fixture, Fixture, FixtureResult, "fixture result");

    /// Attachment ids recorded for `id`. Empty when none were recorded.
    pub fn attachments_list(&self, id: &str) -> Vec<String> {
        self.lock().attachments.get(id).cloned().unwrap_or_default()
    }

    /// Atomic read-then-append, so concurrent uploads never lose ids.
    pub fn append_attachments(&self, id: &str, new_ids: Vec<String>) {
        self.lock()
            .attachments
            .entry(id.to_string())
            .or_default()
            .extend(new_ids);
    }
}
