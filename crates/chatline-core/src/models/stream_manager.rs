use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::task::AbortHandle;
use tracing::debug;

/// How a request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Cancelled,
    Error(String),
}

/// Handed to the task running a request so it can tell whether it still owns
/// its placeholder.
#[derive(Clone, Debug)]
pub struct RequestTicket {
    pub request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

impl RequestTicket {
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Acquire)
    }
}

/// Per-conversation request state.
///
/// Does NOT hold response text; the placeholder message in the conversation
/// is the only place fragments accumulate.
#[derive(Debug)]
pub struct StreamState {
    pub request_id: u64,
    pub message_id: String,
    pub model_id: String,
    pub started_at: Instant,
    cancel_flag: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl StreamState {
    fn cancel(&mut self) {
        self.cancel_flag.store(true, Ordering::Release);
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

/// Tracks the one outstanding request each conversation may have.
///
/// Every registration gets a fresh `request_id`; only the registered request
/// may finish its placeholder, so work arriving after a cancellation is
/// recognisably stale.
#[derive(Debug, Default)]
pub struct StreamManager {
    streams: HashMap<String, StreamState>,
    next_request_id: u64,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            next_request_id: 0,
        }
    }

    /// Register a request for a conversation.
    /// Returns `None` if that conversation already has one outstanding.
    pub fn register_stream(
        &mut self,
        conv_id: &str,
        message_id: &str,
        model_id: &str,
    ) -> Option<RequestTicket> {
        if self.streams.contains_key(conv_id) {
            return None;
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let cancel_flag = Arc::new(AtomicBool::new(false));

        self.streams.insert(
            conv_id.to_string(),
            StreamState {
                request_id,
                message_id: message_id.to_string(),
                model_id: model_id.to_string(),
                started_at: Instant::now(),
                cancel_flag: cancel_flag.clone(),
                abort: None,
            },
        );
        debug!(conv_id = %conv_id, request_id, "Registered stream");

        Some(RequestTicket {
            request_id,
            cancel_flag,
        })
    }

    /// Attach the task's abort handle once it has been spawned.
    /// If the request was already stopped the task is aborted right away.
    pub fn attach_task(&mut self, conv_id: &str, request_id: u64, abort: AbortHandle) {
        match self.streams.get_mut(conv_id) {
            Some(state) if state.request_id == request_id => state.abort = Some(abort),
            _ => abort.abort(),
        }
    }

    /// Whether `request_id` is still the registered request of `conv_id`
    pub fn is_current(&self, conv_id: &str, request_id: u64) -> bool {
        self.streams
            .get(conv_id)
            .is_some_and(|s| s.request_id == request_id)
    }

    pub fn get(&self, conv_id: &str) -> Option<&StreamState> {
        self.streams.get(conv_id)
    }

    /// Remove a request that ran to an end on its own.
    /// Returns `None` when the request is no longer current.
    pub fn finish_stream(&mut self, conv_id: &str, request_id: u64) -> Option<StreamState> {
        if !self.is_current(conv_id, request_id) {
            return None;
        }
        let state = self.streams.remove(conv_id);
        if let Some(state) = &state {
            debug!(
                conv_id = %conv_id,
                request_id,
                elapsed_ms = state.started_at.elapsed().as_millis() as u64,
                "Stream finished"
            );
        }
        state
    }

    /// Signal cancellation to the in-flight request and forget it
    pub fn stop_stream(&mut self, conv_id: &str) -> Option<StreamState> {
        let mut state = self.streams.remove(conv_id)?;
        state.cancel();
        debug!(conv_id = %conv_id, request_id = state.request_id, "Stream stopped");
        Some(state)
    }

    /// Stop all active streams (shutdown)
    pub fn stop_all(&mut self) -> Vec<(String, StreamState)> {
        let mut stopped: Vec<(String, StreamState)> = self.streams.drain().collect();
        for (_, state) in stopped.iter_mut() {
            state.cancel();
        }
        stopped
    }

    /// Check if a conversation has an outstanding request
    pub fn is_streaming(&self, conv_id: &str) -> bool {
        self.streams.contains_key(conv_id)
    }

    pub fn active_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stream_manager_is_empty() {
        let mgr = StreamManager::new();
        assert_eq!(mgr.active_count(), 0);
        assert!(!mgr.is_streaming("test"));
    }

    #[test]
    fn test_register_rejects_second_request_for_same_conversation() {
        let mut mgr = StreamManager::new();
        let ticket = mgr.register_stream("conv-1", "msg-1", "model").unwrap();
        assert!(mgr.register_stream("conv-1", "msg-2", "model").is_none());
        assert!(mgr.is_current("conv-1", ticket.request_id));
        assert_eq!(mgr.get("conv-1").unwrap().message_id, "msg-1");

        assert!(mgr.register_stream("conv-2", "msg-3", "model").is_some());
        assert_eq!(mgr.active_count(), 2);
    }

    #[test]
    fn test_stop_sets_cancel_flag_and_makes_request_stale() {
        let mut mgr = StreamManager::new();
        let ticket = mgr.register_stream("conv-1", "msg-1", "model").unwrap();

        let stopped = mgr.stop_stream("conv-1").unwrap();
        assert_eq!(stopped.request_id, ticket.request_id);
        assert!(ticket.is_cancelled());
        assert!(!mgr.is_current("conv-1", ticket.request_id));
        assert!(mgr.finish_stream("conv-1", ticket.request_id).is_none());
        assert!(mgr.stop_stream("conv-1").is_none());
    }

    #[test]
    fn test_request_ids_are_not_reused() {
        let mut mgr = StreamManager::new();
        let first = mgr.register_stream("conv-1", "msg-1", "model").unwrap();
        mgr.stop_stream("conv-1");
        let second = mgr.register_stream("conv-1", "msg-2", "model").unwrap();

        assert_ne!(first.request_id, second.request_id);
        assert!(mgr.finish_stream("conv-1", first.request_id).is_none());
        assert!(mgr.finish_stream("conv-1", second.request_id).is_some());
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn test_stop_all_cancels_everything() {
        let mut mgr = StreamManager::new();
        let a = mgr.register_stream("a", "m1", "model").unwrap();
        let b = mgr.register_stream("b", "m2", "model").unwrap();

        let stopped = mgr.stop_all();
        assert_eq!(stopped.len(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_task_after_stop_aborts_immediately() {
        let mut mgr = StreamManager::new();
        let ticket = mgr.register_stream("conv-1", "msg-1", "model").unwrap();
        mgr.stop_stream("conv-1");

        let handle = tokio::spawn(std::future::pending::<()>());
        mgr.attach_task("conv-1", ticket.request_id, handle.abort_handle());
        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
