// src/app.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::ChatBackend;
use crate::catalog::ToolCatalog;
use crate::config::Config;
use crate::session::RequestId;
use crate::state::{Action, ChatState, Effect};

/// Background tasks (request + thinking ticker) keyed by the request they serve.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<RequestId, Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn register(&mut self, request_id: RequestId, handle: JoinHandle<()>) {
        self.tasks.entry(request_id).or_default().push(handle);
    }

    /// Aborts every task for `request_id`. Unknown ids are a no-op.
    pub fn cancel(&mut self, request_id: RequestId) {
        if let Some(handles) = self.tasks.remove(&request_id) {
            for handle in handles {
                handle.abort();
            }
            log::debug!("Cancelled tasks for {}", request_id);
        }
    }

    #[cfg(test)]
    pub fn is_tracking(&self, request_id: RequestId) -> bool {
        self.tasks.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        for handle in self.tasks.values().flatten() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone)]
struct ThinkingPlan {
    enabled: bool,
    delay: Duration,
    steps: Vec<String>,
}

/// Owns the chat state and turns reducer effects into spawned tasks whose
/// results come back as actions on an internal channel.
pub struct App<B: ChatBackend> {
    pub state: ChatState,
    backend: Arc<B>,
    thinking: ThinkingPlan,
    tasks: TaskRegistry,
    tx: mpsc::UnboundedSender<Action>,
    rx: mpsc::UnboundedReceiver<Action>,
}

impl<B: ChatBackend> App<B> {
    pub fn new(config: &Config, backend: B) -> Self {
        let thinking = ThinkingPlan {
            enabled: config.thinking_enabled(),
            delay: config.thinking_delay(),
            steps: config.thinking_steps(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        App {
            state: ChatState::new(ToolCatalog::default(), thinking.enabled),
            backend: Arc::new(backend),
            thinking,
            tasks: TaskRegistry::default(),
            tx,
            rx,
        }
    }

    /// Requests with live background tasks.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_busy(&self) -> bool {
        self.state.pending_request().is_some()
    }

    pub fn dispatch(&mut self, action: Action) {
        let settled = match &action {
            Action::ChatSucceeded { request_id, .. } | Action::ChatFailed { request_id, .. } => Some(*request_id),
            _ => None,
        };
        let effects = self.state.apply(action);
        if let Some(request_id) = settled {
            self.tasks.cancel(request_id);
        }
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::SendChat { request_id, request } => {
                log::info!("Sending chat request {} ({} preferred links)", request_id, request.preferred_links.len());
                let backend = Arc::clone(&self.backend);
                let tx = self.tx.clone();
                let handle = tokio::spawn(async move {
                    let action = match backend.send_chat(request).await {
                        Ok(response) => Action::ChatSucceeded { request_id, response },
                        Err(e) => Action::ChatFailed { request_id, error: e.to_string() },
                    };
                    if tx.send(action).is_err() {
                        log::debug!("App gone before {} settled", request_id);
                    }
                });
                self.tasks.register(request_id, handle);

                if self.thinking.enabled && !self.thinking.steps.is_empty() {
                    let ticker = spawn_thinking(request_id, self.thinking.clone(), self.tx.clone());
                    self.tasks.register(request_id, ticker);
                }
            }
            Effect::Cancel(request_id) => self.tasks.cancel(request_id),
        }
    }

    /// Applies every completion already queued. Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(action) = self.rx.try_recv() {
            self.dispatch(action);
            applied += 1;
        }
        applied
    }

    /// Waits for the next queued completion and applies it.
    pub async fn next_event(&mut self) -> bool {
        match self.rx.recv().await {
            Some(action) => {
                self.dispatch(action);
                true
            }
            None => false,
        }
    }

    /// Processes completions until no request is pending.
    pub async fn settle(&mut self) {
        while self.is_busy() {
            if !self.next_event().await {
                break;
            }
        }
    }
}

fn spawn_thinking(request_id: RequestId, plan: ThinkingPlan, tx: mpsc::UnboundedSender<Action>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for step in plan.steps {
            tokio::time::sleep(plan.delay).await;
            if tx.send(Action::ThinkingStep { request_id, step }).is_err() {
                break;
            }
        }
    })
}
