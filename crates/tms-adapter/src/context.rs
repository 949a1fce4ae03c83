use crate::entities::EntityId;

/// Stack of the entity ids currently open on one execution worker
/// (fixture inside test inside …).
///
/// Each worker owns exactly one context and threads it through its manager
/// calls, so no synchronization and no reliance on OS thread identity is
/// needed; the value stays correct under cooperative schedulers too.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    stack: Vec<EntityId>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, id: impl Into<EntityId>) {
        self.stack.push(id.into());
    }

    pub fn stop(&mut self) -> Option<EntityId> {
        self.stack.pop()
    }

    /// Empties the stack. Called at test and fixture boundaries so nothing
    /// leaks into the next invocation on this worker.
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn current(&self) -> Option<&EntityId> {
        self.stack.last()
    }

    pub fn root(&self) -> Option<&EntityId> {
        self.stack.first()
    }

    pub fn parent(&self) -> Option<&EntityId> {
        self.stack.len().checked_sub(2).map(|index| &self.stack[index])
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
