use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::repositories::BoxFuture;
use crate::services::{BackendError, BackendResponse, ChatRequest, ModelBackend};

/// One canned backend reply
pub enum ScriptedReply {
    /// Whole answer in one piece
    Text(String),
    /// Answer streamed fragment by fragment
    Fragments(Vec<String>),
    /// The call itself fails
    Fail(BackendError),
    /// Some fragments, then a stream error
    FailMidStream(Vec<String>, BackendError),
    /// Whole answer, held back until the test releases the gate
    Gated(String, oneshot::Receiver<()>),
    /// Never answers
    Hang,
    /// The call panics
    Panic,
    /// Some fragments, then the stream panics
    PanicMidStream(Vec<String>),
}

#[derive(Default)]
struct ScriptState {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<ChatRequest>,
}

/// Backend that plays queued replies and records every request.
/// With an empty queue it echoes the last user message.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        self.state.lock().replies.push_back(reply);
        self
    }

    pub fn push_text(&self, text: &str) -> &Self {
        self.push(ScriptedReply::Text(text.to_string()))
    }

    pub fn push_fragments(&self, fragments: &[&str]) -> &Self {
        self.push(ScriptedReply::Fragments(
            fragments.iter().map(|f| f.to_string()).collect(),
        ))
    }

    /// Queue a held-back answer; sending on the returned gate releases it
    pub fn push_gated(&self, text: &str) -> oneshot::Sender<()> {
        let (gate, release) = oneshot::channel();
        self.push(ScriptedReply::Gated(text.to_string(), release));
        gate
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }
}

impl ModelBackend for ScriptedBackend {
    fn invoke(&self, request: ChatRequest) -> BoxFuture<'static, Result<BackendResponse, BackendError>> {
        let reply = {
            let mut state = self.state.lock();
            let echo = request
                .last_user_message()
                .map(|m| format!("echo: {}", m.content))
                .unwrap_or_default();
            state.requests.push(request);
            state
                .replies
                .pop_front()
                .unwrap_or(ScriptedReply::Text(echo))
        };

        Box::pin(async move {
            match reply {
                ScriptedReply::Text(text) => Ok(BackendResponse::Complete(text)),
                ScriptedReply::Fragments(fragments) => Ok(BackendResponse::Stream(
                    futures::stream::iter(fragments.into_iter().map(Ok)).boxed(),
                )),
                ScriptedReply::Fail(error) => Err(error),
                ScriptedReply::FailMidStream(fragments, error) => {
                    let stream = async_stream::stream! {
                        for fragment in fragments {
                            yield Ok(fragment);
                        }
                        yield Err(error);
                    };
                    Ok(BackendResponse::Stream(stream.boxed()))
                }
                ScriptedReply::Gated(text, release) => {
                    let _ = release.await;
                    Ok(BackendResponse::Complete(text))
                }
                ScriptedReply::Hang => std::future::pending().await,
                ScriptedReply::Panic => panic!("scripted backend panic"),
                ScriptedReply::PanicMidStream(fragments) => {
                    let stream = async_stream::stream! {
                        for fragment in fragments {
                            yield Ok(fragment);
                        }
                        panic!("scripted stream panic");
                    };
                    Ok(BackendResponse::Stream(stream.boxed()))
                }
            }
        })
    }
}
