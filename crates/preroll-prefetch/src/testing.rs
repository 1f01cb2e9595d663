//! Scripted loader for exercising the scheduler without a network.
//!
//! Every `load` parks until the test resolves it with
//! [`ScriptedLoader::succeed`] or [`ScriptedLoader::fail`], so transfer
//! completion order is fully controlled by the test.
//!
//! # Feature Gate
//!
//! Available when the `testing` feature is enabled, or when running tests.
//!
//! ```toml
//! [dev-dependencies]
//! preroll-prefetch = { version = "...", features = ["testing"] }
//! ```

use preroll_network::{LoadRequest, MediaLoader, NetworkError, Progress, ResourceHandle, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Resource produced by [`ScriptedLoader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedResource {
    pub item_id: String,
    pub source: String,
    /// 1 for the first load of this item, 2 for the next, ...
    pub attempt: usize,
}

#[derive(Default)]
struct Script {
    pending: HashMap<String, oneshot::Sender<Result<()>>>,
    requests: Vec<LoadRequest>,
    released: Vec<ScriptedResource>,
}

/// Loader whose transfers finish only when the test says so
#[derive(Clone, Default)]
pub struct ScriptedLoader {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Complete the running load of `item_id`; false if none is waiting
    pub fn succeed(&self, item_id: &str) -> bool {
        self.resolve(item_id, Ok(()))
    }

    /// Fail the running load of `item_id` with a transient error
    pub fn fail(&self, item_id: &str) -> bool {
        self.resolve(
            item_id,
            Err(NetworkError::Connection(format!("scripted failure for {item_id}"))),
        )
    }

    fn resolve(&self, item_id: &str, outcome: Result<()>) -> bool {
        let sender = self.script().pending.remove(item_id);
        match sender {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Loads still waiting on the test
    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .script()
            .pending
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Every load request seen, in call order
    pub fn requests(&self) -> Vec<LoadRequest> {
        self.script().requests.clone()
    }

    /// How many times `item_id` was loaded
    pub fn calls(&self, item_id: &str) -> usize {
        self.script()
            .requests
            .iter()
            .filter(|r| r.item_id == item_id)
            .count()
    }

    /// Resources handed back through `release`
    pub fn released(&self) -> Vec<ScriptedResource> {
        self.script().released.clone()
    }
}

#[async_trait::async_trait]
impl MediaLoader for ScriptedLoader {
    type Resource = ScriptedResource;

    async fn load(&self, request: LoadRequest, progress: Progress) -> Result<ScriptedResource> {
        let (tx, rx) = oneshot::channel();
        let attempt = {
            let mut script = self.script();
            script.requests.push(request.clone());
            script.pending.insert(request.item_id.clone(), tx);
            script
                .requests
                .iter()
                .filter(|r| r.item_id == request.item_id)
                .count()
        };

        // Sender dropped without an answer: treat as cancelled
        rx.await.map_err(|_| NetworkError::Cancelled)??;

        progress.advance(1024);
        Ok(ScriptedResource {
            item_id: request.item_id,
            source: request.source,
            attempt,
        })
    }

    fn release(&self, resource: ResourceHandle<ScriptedResource>) {
        let resource = ScriptedResource::clone(&resource);
        self.script().released.push(resource);
    }
}
