use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::models::{
    Attachment, ChatEvent, Conversation, ConversationSummary, ConversationsStore, Message,
    MessagePatch, MessageStatus, ModelBinding, ModelCatalog, ModelChange, ModelInfo,
    RequestTicket, StreamManager, StreamStatus,
};
use crate::repositories::{ConversationRepository, RegistrySnapshot};
use crate::services::{
    BackendError, BackendResponse, ChatRequest, ModelBackend, PersistenceCoordinator, derive_title,
};
use crate::settings::ChatSettings;

const EVENT_CAPACITY: usize = 256;
const CANCELLED_REASON: &str = "cancelled";
const INTERRUPTED_REASON: &str = "interrupted";
const PANICKED_REASON: &str = "backend panicked";
/// Minimum spacing of snapshots taken while an answer streams in
const STREAMING_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Everything guarded by the controller lock
struct ChatState {
    store: ConversationsStore,
    streams: StreamManager,
    /// Final-status listeners keyed by request id
    waiters: HashMap<u64, oneshot::Sender<StreamStatus>>,
}

struct ChatInner {
    state: Mutex<ChatState>,
    catalog: ModelCatalog,
    binding: ModelBinding,
    settings: ChatSettings,
    backend: Arc<dyn ModelBackend>,
    persistence: PersistenceCoordinator,
    events: broadcast::Sender<ChatEvent>,
}

enum FragmentOutcome {
    /// Applied and a snapshot was scheduled
    Persisted,
    Applied,
    /// The request was cancelled or replaced
    Stale,
}

/// Returned by send and regenerate: identifies the placeholder being filled
/// and resolves to how the request ended.
#[derive(Debug)]
pub struct RequestHandle {
    pub conversation_id: String,
    pub message_id: String,
    outcome: oneshot::Receiver<StreamStatus>,
}

impl RequestHandle {
    /// Wait for the request to reach a terminal state
    pub async fn wait(self) -> StreamStatus {
        self.outcome.await.unwrap_or(StreamStatus::Cancelled)
    }
}

/// Owns the conversation registry and drives requests against the backend.
///
/// Cheap to clone; all clones share one state. Every mutation happens under a
/// single lock, so readers never see a half-applied change, and each one
/// schedules a snapshot write.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<ChatInner>,
}

impl ChatController {
    /// Build a controller around an existing registry.
    /// Must be called inside a tokio runtime.
    pub fn new(
        mut store: ConversationsStore,
        repository: Arc<dyn ConversationRepository>,
        backend: Arc<dyn ModelBackend>,
        catalog: ModelCatalog,
        settings: ChatSettings,
    ) -> Self {
        let catalog = if catalog.is_empty() {
            warn!("Model catalog is empty, using built-in models");
            ModelCatalog::builtin()
        } else {
            catalog
        };

        let model_id = settings
            .default_model_id
            .as_deref()
            .filter(|id| {
                let known = catalog.contains(id);
                if !known {
                    warn!(model_id = %id, "Configured default model is not in the catalog");
                }
                known
            })
            .map(str::to_string)
            .or_else(|| catalog.default_model().map(|m| m.id.clone()))
            .unwrap_or_default();

        if store.is_empty() {
            info!("No conversations, creating initial conversation");
            store.create_conversation();
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let controller = Self {
            inner: Arc::new(ChatInner {
                state: Mutex::new(ChatState {
                    store,
                    streams: StreamManager::new(),
                    waiters: HashMap::new(),
                }),
                catalog,
                binding: ModelBinding::new(model_id),
                settings,
                backend,
                persistence: PersistenceCoordinator::new(repository),
                events,
            }),
        };

        let state = controller.inner.state.lock();
        controller.commit(&state);
        drop(state);

        controller
    }

    /// Rehydrate from the repository's last snapshot.
    ///
    /// Answers left in flight by an earlier process are marked failed. A
    /// missing or unreadable snapshot starts an empty registry.
    pub async fn load(
        repository: Arc<dyn ConversationRepository>,
        backend: Arc<dyn ModelBackend>,
        catalog: ModelCatalog,
        settings: ChatSettings,
    ) -> Self {
        info!(path = %repository.storage_path(), "Starting conversation load");

        let store = match repository.load().await {
            Ok(Some(snapshot)) => restore_store(snapshot),
            Ok(None) => {
                info!("No saved conversations");
                ConversationsStore::new()
            }
            Err(e) => {
                warn!(error = ?e, "Failed to load conversations, starting empty");
                ConversationsStore::new()
            }
        };

        Self::new(store, repository, backend, catalog, settings)
    }

    // ---- reads ----

    /// Summaries in listing order
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        let state = self.inner.state.lock();
        state
            .store
            .list_all()
            .iter()
            .map(|c| ConversationSummary {
                id: c.id().to_string(),
                title: c.title().to_string(),
                updated_at: c.updated_at(),
                message_count: c.message_count(),
                is_streaming: state.streams.is_streaming(c.id()),
            })
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.inner.state.lock().store.get_conversation(id).cloned()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.inner.state.lock().store.active_id().map(str::to_string)
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.inner.state.lock().store.active_conversation().cloned()
    }

    pub fn active_messages(&self) -> Vec<Message> {
        self.inner
            .state
            .lock()
            .store
            .active_conversation()
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    /// Whether the active conversation is waiting for an answer
    pub fn is_loading(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .store
            .active_id()
            .is_some_and(|id| state.streams.is_streaming(id))
    }

    pub fn is_conversation_loading(&self, id: &str) -> bool {
        self.inner.state.lock().streams.is_streaming(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.inner.catalog
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.inner.settings
    }

    pub fn current_model_id(&self) -> String {
        self.inner.binding.current()
    }

    pub fn current_model(&self) -> Option<ModelInfo> {
        self.inner
            .catalog
            .get_model(&self.inner.binding.current())
            .cloned()
    }

    /// Whether the bound model accepts attachments
    pub fn supports_attachments(&self) -> bool {
        self.inner
            .catalog
            .supports_attachments(&self.inner.binding.current())
    }

    /// Observe the bound model id
    pub fn watch_model(&self) -> watch::Receiver<String> {
        self.inner.binding.subscribe()
    }

    // ---- registry intents ----

    /// Create an empty conversation and make it active
    pub fn create_new_conversation(&self) -> String {
        info!("Creating new conversation");
        let mut state = self.inner.state.lock();
        self.cancel_outgoing(&mut state);

        let id = state.store.create_conversation();
        self.emit(ChatEvent::ConversationCreated {
            conversation_id: id.clone(),
        });
        self.emit(ChatEvent::ConversationSelected {
            conversation_id: id.clone(),
        });
        self.commit(&state);
        id
    }

    /// Make `id` active. Unknown ids are ignored and return `false`.
    pub fn select_conversation(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        if !state.store.contains(id) {
            debug!(conv_id = %id, "Ignoring selection of unknown conversation");
            return false;
        }
        if state.store.active_id() == Some(id) {
            return true;
        }

        self.cancel_outgoing(&mut state);
        state.store.set_active(id);
        debug!(conv_id = %id, "Selected conversation");
        self.emit(ChatEvent::ConversationSelected {
            conversation_id: id.to_string(),
        });
        self.commit(&state);
        true
    }

    /// Rename a conversation; blank titles are rejected
    pub fn edit_conversation_title(&self, id: &str, title: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(conv) = state.store.get_conversation_mut(id) else {
            return false;
        };
        if !conv.set_title(title) {
            debug!(conv_id = %id, "Rejected blank title");
            return false;
        }

        let title = conv.title().to_string();
        self.emit(ChatEvent::TitleChanged {
            conversation_id: id.to_string(),
            title,
        });
        self.commit(&state);
        true
    }

    /// Delete a conversation, cancelling its request first
    pub fn delete_conversation(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        if !state.store.contains(id) {
            return false;
        }

        self.cancel_locked(&mut state, id);

        let was_active = state.store.active_id() == Some(id);
        let was_last = state.store.count() == 1;
        state.store.delete_conversation(id);
        info!(conv_id = %id, "Deleted conversation");

        self.emit(ChatEvent::ConversationDeleted {
            conversation_id: id.to_string(),
        });
        if let Some(active) = state.store.active_id().map(str::to_string) {
            if was_last {
                self.emit(ChatEvent::ConversationCreated {
                    conversation_id: active.clone(),
                });
            }
            if was_active {
                self.emit(ChatEvent::ConversationSelected {
                    conversation_id: active,
                });
            }
        }
        self.commit(&state);
        true
    }

    // ---- model binding ----

    /// Bind a different model. Returns `Ok(false)` if it was already bound.
    ///
    /// A real change starts a fresh conversation; existing ones are untouched.
    pub fn select_model(&self, model_id: &str) -> ChatResult<bool> {
        if !self.inner.catalog.contains(model_id) {
            return Err(ChatError::UnknownModel(model_id.to_string()));
        }

        let Some(change) = self.inner.binding.set(model_id) else {
            return Ok(false);
        };
        self.emit(ChatEvent::ModelChanged {
            model_id: change.current.clone(),
        });
        self.on_model_changed(&change);
        Ok(true)
    }

    fn on_model_changed(&self, change: &ModelChange) {
        debug!(previous = %change.previous, current = %change.current, "Model changed");
        self.create_new_conversation();
    }

    // ---- requests ----

    /// Send a user message in the active conversation
    pub fn send_message(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
        model_id: &str,
    ) -> ChatResult<RequestHandle> {
        let text = text.into();
        debug!(attachment_count = attachments.len(), model_id = %model_id, "send_message called");

        if text.trim().is_empty() && attachments.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.inner.catalog.contains(model_id) {
            return Err(ChatError::UnknownModel(model_id.to_string()));
        }

        let mut state = self.inner.state.lock();
        let active = state.store.active_id().map(str::to_string);
        let conv_id = match active {
            Some(id) => id,
            None => {
                let id = state.store.create_conversation();
                self.emit(ChatEvent::ConversationCreated {
                    conversation_id: id.clone(),
                });
                id
            }
        };

        self.check_can_start(&state, &conv_id)?;

        let Some(conv) = state.store.get_conversation_mut(&conv_id) else {
            return Err(ChatError::ConversationNotFound(conv_id));
        };
        conv.append_user_message(text, attachments);
        let message_id = conv.append_placeholder_assistant_message(model_id);
        self.emit(ChatEvent::MessagesChanged {
            conversation_id: conv_id.clone(),
        });

        self.start_request(&mut state, conv_id, message_id, model_id)
    }

    /// Replace an assistant answer in the active conversation with a new one.
    ///
    /// The answer and everything after it is dropped, then the preceding user
    /// message is sent again.
    pub fn regenerate_message(&self, message_id: &str, model_id: &str) -> ChatResult<RequestHandle> {
        if !self.inner.catalog.contains(model_id) {
            return Err(ChatError::UnknownModel(model_id.to_string()));
        }

        let mut state = self.inner.state.lock();
        let Some(conv) = state.store.active_conversation() else {
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        };
        let conv_id = conv.id().to_string();

        let message = conv
            .message(message_id)
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;
        if !message.is_assistant() {
            return Err(ChatError::NotAnAssistantMessage(message_id.to_string()));
        }
        let user_id = conv
            .preceding_user_message(message_id)
            .map(|m| m.id.clone())
            .ok_or_else(|| ChatError::NoPrecedingUserMessage(message_id.to_string()))?;

        self.check_can_start(&state, &conv_id)?;

        let Some(conv) = state.store.get_conversation_mut(&conv_id) else {
            return Err(ChatError::ConversationNotFound(conv_id));
        };
        let removed = conv.truncate_after(&user_id);
        let placeholder_id = conv.append_placeholder_assistant_message(model_id);
        debug!(conv_id = %conv_id, removed = removed.len(), "Regenerating answer");
        self.emit(ChatEvent::MessagesChanged {
            conversation_id: conv_id.clone(),
        });

        self.start_request(&mut state, conv_id, placeholder_id, model_id)
    }

    /// Cancel the outstanding request of a conversation, if any
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        self.cancel_locked(&mut state, conversation_id)
    }

    pub fn cancel_active(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(id) = state.store.active_id().map(str::to_string) else {
            return false;
        };
        self.cancel_locked(&mut state, &id)
    }

    /// Cancel every request and wait for the last snapshot to be written
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            let stopped = state.streams.stop_all();
            if !stopped.is_empty() {
                info!(count = stopped.len(), "Cancelling requests on shutdown");
            }
            for (conv_id, stream) in stopped {
                self.settle(
                    &mut state,
                    &conv_id,
                    stream.request_id,
                    &stream.message_id,
                    MessagePatch::new().failed(CANCELLED_REASON),
                    StreamStatus::Cancelled,
                );
            }
            self.commit(&state);
        }
        self.flush().await;
    }

    /// Wait until the latest state has been handed to the repository
    pub async fn flush(&self) {
        self.inner.persistence.flush().await;
    }

    // ---- internals ----

    fn check_can_start(&self, state: &ChatState, conv_id: &str) -> ChatResult<()> {
        if state.streams.is_streaming(conv_id) {
            debug!(conv_id = %conv_id, "Rejecting request, conversation is busy");
            self.emit(ChatEvent::Busy {
                conversation_id: conv_id.to_string(),
            });
            return Err(ChatError::Busy(conv_id.to_string()));
        }
        match self.inner.settings.max_concurrent_requests {
            Some(limit) if state.streams.active_count() >= limit => {
                debug!(limit, "Rejecting request, too many in flight");
                Err(ChatError::RequestLimit(limit))
            }
            _ => Ok(()),
        }
    }

    /// Register the request for `message_id` and spawn the task serving it
    fn start_request(
        &self,
        state: &mut ChatState,
        conv_id: String,
        message_id: String,
        model_id: &str,
    ) -> ChatResult<RequestHandle> {
        let ticket = state
            .streams
            .register_stream(&conv_id, &message_id, model_id)
            .ok_or_else(|| ChatError::Busy(conv_id.clone()))?;

        let history = state
            .store
            .get_conversation(&conv_id)
            .map(|c| c.messages())
            .unwrap_or_default();
        let request = ChatRequest::from_history(
            model_id,
            history,
            self.inner.catalog.supports_attachments(model_id),
        );

        let (outcome_tx, outcome) = oneshot::channel();
        state.waiters.insert(ticket.request_id, outcome_tx);

        self.emit(ChatEvent::StreamStarted {
            conversation_id: conv_id.clone(),
            message_id: message_id.clone(),
        });
        self.commit(state);

        let request_id = ticket.request_id;
        let controller = self.clone();
        let task = tokio::spawn({
            let conv_id = conv_id.clone();
            let message_id = message_id.clone();
            async move {
                let run = AssertUnwindSafe(controller.run_request(
                    conv_id.clone(),
                    message_id.clone(),
                    ticket,
                    request,
                ))
                .catch_unwind();
                if run.await.is_err() {
                    error!(conv_id = %conv_id, request_id, "Backend panicked while serving request");
                    controller.complete_request(
                        &conv_id,
                        &message_id,
                        request_id,
                        Err(BackendError::Backend(PANICKED_REASON.to_string())),
                    );
                }
            }
        });
        state
            .streams
            .attach_task(&conv_id, request_id, task.abort_handle());

        debug!(conv_id = %conv_id, request_id, model_id = %model_id, "Request started");
        Ok(RequestHandle {
            conversation_id: conv_id,
            message_id,
            outcome,
        })
    }

    async fn run_request(
        &self,
        conv_id: String,
        message_id: String,
        ticket: RequestTicket,
        request: ChatRequest,
    ) {
        let response = self.inner.backend.invoke(request).await;
        if ticket.is_cancelled() {
            return;
        }

        let outcome = match response {
            Ok(BackendResponse::Complete(text)) => Ok(Some(text)),
            Ok(BackendResponse::Stream(mut fragments)) => {
                let mut outcome = Ok(None);
                let mut last_snapshot: Option<Instant> = None;
                while let Some(item) = fragments.next().await {
                    if ticket.is_cancelled() {
                        return;
                    }
                    match item {
                        Ok(fragment) => {
                            let persist = last_snapshot
                                .is_none_or(|at| at.elapsed() >= STREAMING_SNAPSHOT_INTERVAL);
                            match self.append_fragment(&conv_id, &message_id, ticket.request_id, fragment, persist) {
                                FragmentOutcome::Stale => return,
                                FragmentOutcome::Persisted => last_snapshot = Some(Instant::now()),
                                FragmentOutcome::Applied => {}
                            }
                        }
                        Err(e) => {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
                outcome
            }
            Err(e) => Err(e),
        };

        self.complete_request(&conv_id, &message_id, ticket.request_id, outcome);
    }

    /// Append one streamed fragment. A snapshot is scheduled when `persist`
    /// is set or the placeholder leaves `Pending`; the final state is always
    /// written by `complete_request`.
    fn append_fragment(
        &self,
        conv_id: &str,
        message_id: &str,
        request_id: u64,
        fragment: String,
        persist: bool,
    ) -> FragmentOutcome {
        let mut state = self.inner.state.lock();
        if !state.streams.is_current(conv_id, request_id) {
            return FragmentOutcome::Stale;
        }
        if fragment.is_empty() {
            return FragmentOutcome::Applied;
        }

        let Some(conv) = state.store.get_conversation_mut(conv_id) else {
            return FragmentOutcome::Stale;
        };
        let first = conv
            .message(message_id)
            .is_some_and(|m| m.status == MessageStatus::Pending);
        conv.update_message(
            message_id,
            MessagePatch::new()
                .append_content(fragment.clone())
                .status(MessageStatus::Streaming),
        );
        self.emit(ChatEvent::TextChunk {
            conversation_id: conv_id.to_string(),
            message_id: message_id.to_string(),
            text: fragment,
        });
        if persist || first {
            self.commit(&state);
            FragmentOutcome::Persisted
        } else {
            FragmentOutcome::Applied
        }
    }

    /// Fold a backend result into the placeholder, unless the request was
    /// cancelled in the meantime.
    fn complete_request(
        &self,
        conv_id: &str,
        message_id: &str,
        request_id: u64,
        outcome: Result<Option<String>, BackendError>,
    ) {
        let mut state = self.inner.state.lock();
        let Some(stream) = state.streams.finish_stream(conv_id, request_id) else {
            debug!(conv_id = %conv_id, request_id, "Discarding result of stale request");
            return;
        };

        let (patch, status) = match outcome {
            Ok(text) => {
                let mut patch = MessagePatch::new()
                    .status(MessageStatus::Complete)
                    .model_id(stream.model_id.clone());
                if let Some(text) = text {
                    patch = patch.replace_content(text);
                }
                (patch, StreamStatus::Completed)
            }
            Err(BackendError::Cancelled) => (
                MessagePatch::new().failed(CANCELLED_REASON),
                StreamStatus::Cancelled,
            ),
            Err(e) => {
                warn!(conv_id = %conv_id, error = %e, "Request failed");
                let reason = e.to_string();
                (MessagePatch::new().failed(reason.clone()), StreamStatus::Error(reason))
            }
        };

        let completed = status == StreamStatus::Completed;
        self.settle(&mut state, conv_id, request_id, message_id, patch, status);
        if completed {
            self.maybe_derive_title(&mut state, conv_id);
        }
        self.commit(&state);
    }

    /// Apply the terminal state of a request that has already left the
    /// stream manager, and tell whoever is waiting on it.
    fn settle(
        &self,
        state: &mut ChatState,
        conv_id: &str,
        request_id: u64,
        message_id: &str,
        patch: MessagePatch,
        status: StreamStatus,
    ) {
        if let Some(conv) = state.store.get_conversation_mut(conv_id) {
            conv.update_message(message_id, patch);
        }
        debug!(conv_id = %conv_id, request_id, status = ?status, "Request settled");

        self.emit(ChatEvent::StreamEnded {
            conversation_id: conv_id.to_string(),
            message_id: message_id.to_string(),
            status: status.clone(),
        });
        if let Some(waiter) = state.waiters.remove(&request_id) {
            let _ = waiter.send(status);
        }
    }

    fn cancel_locked(&self, state: &mut ChatState, conv_id: &str) -> bool {
        let Some(stream) = state.streams.stop_stream(conv_id) else {
            return false;
        };
        info!(conv_id = %conv_id, request_id = stream.request_id, "Cancelled request");
        self.settle(
            state,
            conv_id,
            stream.request_id,
            &stream.message_id,
            MessagePatch::new().failed(CANCELLED_REASON),
            StreamStatus::Cancelled,
        );
        self.commit(state);
        true
    }

    /// Cancel the active conversation's request before the selection moves
    fn cancel_outgoing(&self, state: &mut ChatState) {
        if !self.inner.settings.cancel_on_switch {
            return;
        }
        if let Some(id) = state.store.active_id().map(str::to_string) {
            self.cancel_locked(state, &id);
        }
    }

    fn maybe_derive_title(&self, state: &mut ChatState, conv_id: &str) {
        if !self.inner.settings.auto_title {
            return;
        }
        let Some(conv) = state.store.get_conversation_mut(conv_id) else {
            return;
        };
        if !conv.has_default_title() || conv.completed_answer_count() != 1 {
            return;
        }

        let Some(title) = conv.first_user_text().and_then(derive_title) else {
            return;
        };
        if conv.set_title(&title) {
            self.emit(ChatEvent::TitleChanged {
                conversation_id: conv_id.to_string(),
                title,
            });
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn commit(&self, state: &ChatState) {
        let snapshot = RegistrySnapshot::new(
            state.store.active_id().map(str::to_string),
            state.store.list_all().iter().map(Conversation::to_data).collect(),
        );
        self.inner.persistence.schedule(snapshot);
    }
}

fn restore_store(snapshot: RegistrySnapshot) -> ConversationsStore {
    let mut interrupted = 0;
    let conversations: Vec<Conversation> = snapshot
        .conversations
        .into_iter()
        .map(|data| {
            let mut conv = Conversation::from_data(data);
            interrupted += conv.fail_in_flight(INTERRUPTED_REASON);
            conv
        })
        .collect();

    info!(
        count = conversations.len(),
        interrupted,
        "Restored conversations"
    );
    ConversationsStore::from_parts(conversations, snapshot.active_conversation_id)
}
