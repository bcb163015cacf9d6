use std::time::Duration;

use chatline_core::repositories::BoxFuture;
use chatline_core::services::{BackendError, BackendResponse, ChatRequest, ModelBackend};
use futures::StreamExt;

/// Offline backend that streams the user's words back.
/// Lets the CLI run end to end without network access.
pub struct EchoBackend {
    delay: Duration,
}

impl EchoBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    fn reply_for(request: &ChatRequest) -> String {
        let Some(last) = request.last_user_message() else {
            return "Nothing to answer.".to_string();
        };

        let mut reply = format!("[{}] You said: {}", request.model_id, last.content.trim());
        if !last.attachments.is_empty() {
            reply.push_str(&format!(" (with {} image(s))", last.attachments.len()));
        }
        reply
    }
}

impl ModelBackend for EchoBackend {
    fn invoke(&self, request: ChatRequest) -> BoxFuture<'static, Result<BackendResponse, BackendError>> {
        let reply = Self::reply_for(&request);
        let delay = self.delay;

        Box::pin(async move {
            let words: Vec<String> = reply
                .split_inclusive(' ')
                .map(str::to_string)
                .collect();
            let stream = async_stream::stream! {
                for word in words {
                    tokio::time::sleep(delay).await;
                    yield Ok(word);
                }
            };
            Ok(BackendResponse::Stream(stream.boxed()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::models::{Attachment, MessageRole};
    use chatline_core::services::RequestMessage;

    fn request(content: &str, attachments: Vec<Attachment>) -> ChatRequest {
        ChatRequest {
            model_id: "local/echo".to_string(),
            messages: vec![RequestMessage {
                role: MessageRole::User,
                content: content.to_string(),
                attachments,
            }],
        }
    }

    #[tokio::test]
    async fn test_streams_reply_word_by_word() {
        let backend = EchoBackend::new(Duration::ZERO);
        let Ok(BackendResponse::Stream(stream)) = backend.invoke(request("hi there", Vec::new())).await else {
            panic!("expected a stream");
        };

        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), "[local/echo] You said: hi there");
    }

    #[test]
    fn test_mentions_attachments() {
        let reply = EchoBackend::reply_for(&request("look", vec![Attachment::new("image/png", "AA==")]));
        assert!(reply.ends_with("(with 1 image(s))"));
    }
}
