//! Hook dispatcher: a single FIFO queue drained by one background task.
//!
//! - Events are dispatched strictly in enqueue order; event N+1 starts only
//!   after every handler of event N has settled.
//! - Handlers for the same event run concurrently, each in its own task
//!   with its own timeout, so a failing, hanging, or panicking handler
//!   never affects the others or the queue.
//! - Failures are logged and recorded to the error log; callers are never
//!   blocked by handler execution.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use billhub_core::error::{AppError, ErrorKind};
use billhub_core::result::AppResult;

use super::definitions::{DispatchReport, HandlerFailure, HookPayload};
use crate::api::services::PluginServices;
use crate::table::PluginTable;

/// Default execution window for one handler invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

enum Queued {
    Event {
        payload: HookPayload,
        done: oneshot::Sender<DispatchReport>,
    },
    Barrier(oneshot::Sender<()>),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Queued>,
    draining: bool,
}

struct DispatchInner {
    table: Arc<PluginTable>,
    services: PluginServices,
    handler_timeout: Duration,
    queue: Mutex<QueueState>,
}

/// Dispatches hook events to the handlers of enabled plugins.
#[derive(Clone)]
pub struct HookDispatcher {
    inner: Arc<DispatchInner>,
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("handler_timeout", &self.inner.handler_timeout)
            .finish()
    }
}

/// Handle to the eventual outcome of one enqueued hook event.
///
/// Dropping the ticket does not cancel the dispatch.
#[derive(Debug)]
pub struct HookTicket {
    event_id: Uuid,
    rx: oneshot::Receiver<DispatchReport>,
}

impl HookTicket {
    /// ID of the enqueued event.
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Wait until every handler for the event has settled.
    pub async fn wait(self) -> AppResult<DispatchReport> {
        self.rx
            .await
            .map_err(|_| AppError::internal("Hook dispatch task ended before reporting"))
    }
}

impl HookDispatcher {
    pub(crate) fn new(
        table: Arc<PluginTable>,
        services: PluginServices,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                table,
                services,
                handler_timeout,
                queue: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Enqueue a hook event and return immediately.
    pub async fn execute_hook(&self, hook: &str, data: Value) -> HookTicket {
        self.enqueue(HookPayload::new(hook, data)).await
    }

    /// Enqueue a prepared payload and return immediately.
    pub async fn enqueue(&self, payload: HookPayload) -> HookTicket {
        let (done, rx) = oneshot::channel();
        let event_id = payload.id;
        debug!(hook = %payload.hook, event_id = %event_id, "Hook enqueued");
        self.push(Queued::Event { payload, done }).await;
        HookTicket { event_id, rx }
    }

    /// Wait until every event enqueued before this call has been dispatched.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.push(Queued::Barrier(tx)).await;
        let _ = rx.await;
    }

    /// Number of events waiting to be dispatched.
    pub async fn pending(&self) -> usize {
        self.inner
            .queue
            .lock()
            .await
            .pending
            .iter()
            .filter(|q| matches!(q, Queued::Event { .. }))
            .count()
    }

    async fn push(&self, item: Queued) {
        let mut queue = self.inner.queue.lock().await;
        queue.pending.push_back(item);
        if !queue.draining {
            queue.draining = true;
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.drain().await });
        }
    }
}

impl DispatchInner {
    async fn drain(self: Arc<Self>) {
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                match queue.pending.pop_front() {
                    Some(item) => item,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            match next {
                Queued::Barrier(tx) => {
                    let _ = tx.send(());
                }
                Queued::Event { payload, done } => {
                    let report = self.dispatch(payload).await;
                    let _ = done.send(report);
                }
            }
        }
    }

    async fn dispatch(&self, payload: HookPayload) -> DispatchReport {
        let targets = self.table.hook_targets(&payload.hook).await;
        let mut report = DispatchReport {
            hook: payload.hook.clone(),
            event_id: payload.id,
            invoked: Vec::with_capacity(targets.len()),
            failures: Vec::new(),
        };

        if targets.is_empty() {
            debug!(hook = %payload.hook, "No handlers for hook");
            return report;
        }

        debug!(
            hook = %payload.hook,
            handler_count = targets.len(),
            "Dispatching hook"
        );

        let payload = Arc::new(payload);
        let window = self.handler_timeout;
        let runs = targets.into_iter().map(|target| {
            let ctx = self
                .services
                .context_for(&target.plugin_id, target.schema.clone());
            let payload = payload.clone();
            let handler = target.handler;
            let hook = payload.hook.clone();
            let task = tokio::spawn(async move {
                match tokio::time::timeout(window, handler.handle(&ctx, &payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::timeout(format!(
                        "Handler for '{}' timed out after {:?}",
                        hook, window
                    ))),
                }
            });
            async move { (target.plugin_id, task.await) }
        });

        for (plugin_id, outcome) in join_all(runs).await {
            report.invoked.push(plugin_id.clone());
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(join_err) => AppError::plugin_runtime(format!(
                    "Handler for '{}' panicked: {}",
                    payload.hook, join_err
                )),
            };

            warn!(
                hook = %payload.hook,
                plugin_id = %plugin_id,
                error = %error,
                "Hook handler failed"
            );
            self.services
                .record_error(&plugin_id, &format!("hook:{}", payload.hook), &error)
                .await;
            report.failures.push(HandlerFailure {
                plugin_id,
                timed_out: error.kind == ErrorKind::Timeout,
                message: error.message,
            });
        }

        report
    }
}
