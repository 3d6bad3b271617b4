//! In-memory task and transcript storage.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::protocol::Task;

/// Process-lifetime store for tasks and per-context conversation
/// transcripts.
///
/// Tasks are the A2A-visible records returned by `tasks/get`; transcripts are
/// the model-facing message history keyed by `contextId`, which is what makes
/// follow-up messages in the same context a continued conversation.
#[derive(Default)]
pub struct TaskStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    transcripts: HashMap<String, Vec<runtime::Message>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        self.inner.write().await.tasks.insert(task.id.clone(), task);
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    /// Apply `f` to a stored task, returning the updated copy.
    pub async fn update(&self, id: &str, f: impl FnOnce(&mut Task)) -> Option<Task> {
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(id)?;
        f(task);
        Some(task.clone())
    }

    /// The model-facing transcript for a context (empty if none yet).
    pub async fn transcript(&self, context_id: &str) -> Vec<runtime::Message> {
        self.inner
            .read()
            .await
            .transcripts
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_transcript(&self, context_id: &str, transcript: Vec<runtime::Message>) {
        self.inner
            .write()
            .await
            .transcripts
            .insert(context_id.to_string(), transcript);
    }
}
