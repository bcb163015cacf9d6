use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};
use chatline_core::models::{Attachment, ChatEvent, ErrorLevel, ErrorStore, StreamStatus};
use chatline_core::ChatController;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::debug;

use crate::commands::{Command, HELP, image_mime_type};

/// Read commands from stdin until EOF or `/quit`
pub async fn run(controller: ChatController, errors: ErrorStore) -> Result<()> {
    let printer = tokio::spawn(print_events(controller.clone(), controller.subscribe()));

    println!(
        "chatline ({}), {} conversation(s). Type /help for commands.",
        controller.current_model_id(),
        controller.conversations().len()
    );

    let mut repl = Repl {
        controller: controller.clone(),
        errors,
        pending_attachments: Vec::new(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => repl.handle(command).await,
            Err(usage) => println!("{usage}"),
        }
    }

    controller.shutdown().await;
    printer.abort();
    Ok(())
}

struct Repl {
    controller: ChatController,
    errors: ErrorStore,
    pending_attachments: Vec<Attachment>,
}

impl Repl {
    async fn handle(&mut self, command: Command) {
        debug!(command = ?command, "Handling command");
        match command {
            Command::Send(text) => self.send(text),
            Command::New => {
                self.controller.create_new_conversation();
                println!("Started a new conversation.");
            }
            Command::List => self.list(),
            Command::Select(target) => match self.resolve(&target) {
                Some(id) if self.controller.select_conversation(&id) => self.print_history(),
                _ => println!("No conversation matches '{target}'."),
            },
            Command::Title(title) => {
                let renamed = self
                    .controller
                    .active_conversation_id()
                    .is_some_and(|id| self.controller.edit_conversation_title(&id, &title));
                if !renamed {
                    println!("Title not changed.");
                }
            }
            Command::Delete(target) => {
                let id = match &target {
                    Some(target) => self.resolve(target),
                    None => self.controller.active_conversation_id(),
                };
                match id {
                    Some(id) if self.controller.delete_conversation(&id) => println!("Deleted."),
                    _ => println!("Nothing to delete."),
                }
            }
            Command::Model(None) => match self.controller.current_model() {
                Some(model) => println!("{} ({})", model.name, model.id),
                None => println!("{}", self.controller.current_model_id()),
            },
            Command::Model(Some(id)) => match self.controller.select_model(&id) {
                Ok(true) => println!("Switched to {id}; started a new conversation."),
                Ok(false) => println!("Already using {id}."),
                Err(e) => println!("{e}"),
            },
            Command::Models => self.list_models(),
            Command::History => self.print_history(),
            Command::Regenerate => self.regenerate(),
            Command::Cancel => {
                if !self.controller.cancel_active() {
                    println!("Nothing to cancel.");
                }
            }
            Command::Attach(path) => self.attach(&path).await,
            Command::Errors => self.print_errors(),
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    fn send(&mut self, text: String) {
        let attachments = std::mem::take(&mut self.pending_attachments);
        let model_id = self.controller.current_model_id();
        if let Err(e) = self
            .controller
            .send_message(text, attachments.clone(), &model_id)
        {
            self.pending_attachments = attachments;
            println!("{e}");
        }
    }

    fn regenerate(&self) {
        let last_answer = self
            .controller
            .active_messages()
            .into_iter()
            .rev()
            .find(|m| m.is_assistant());
        let Some(answer) = last_answer else {
            println!("No answer to regenerate.");
            return;
        };
        let model_id = self.controller.current_model_id();
        if let Err(e) = self.controller.regenerate_message(&answer.id, &model_id) {
            println!("{e}");
        }
    }

    async fn attach(&mut self, path: &str) {
        let Some(mime_type) = image_mime_type(path) else {
            println!("Only png, jpeg, gif and webp images can be attached.");
            return;
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                self.pending_attachments
                    .push(Attachment::from_bytes(mime_type, &bytes));
                if !self.controller.supports_attachments() {
                    println!("Note: the current model does not accept images; it will only see the text.");
                }
                println!("Attached {path} ({} pending).", self.pending_attachments.len());
            }
            Err(e) => println!("Could not read {path}: {e}"),
        }
    }

    /// Resolve a 1-based list number or an id prefix
    fn resolve(&self, target: &str) -> Option<String> {
        let conversations = self.controller.conversations();
        if let Ok(n) = target.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| conversations.get(i))
                .map(|c| c.id.clone());
        }
        conversations
            .into_iter()
            .find(|c| c.id.starts_with(target))
            .map(|c| c.id)
    }

    fn list(&self) {
        let active = self.controller.active_conversation_id();
        for (i, conv) in self.controller.conversations().iter().enumerate() {
            let marker = if active.as_deref() == Some(conv.id.as_str()) { "*" } else { " " };
            let busy = if conv.is_streaming { " (answering)" } else { "" };
            println!(
                "{marker} {:>2}. {} [{} messages, {}]{busy}  {}",
                i + 1,
                conv.title,
                conv.message_count,
                conv.updated_at.format("%Y-%m-%d %H:%M"),
                short_id(&conv.id),
            );
        }
    }

    fn list_models(&self) {
        let current = self.controller.current_model_id();
        for group in self.controller.catalog().models_by_provider() {
            println!("{}:", group.display_name);
            for model in group.models {
                let marker = if model.id == current { "*" } else { " " };
                let vision = if model.multimodal { " [images]" } else { "" };
                println!("  {marker} {} ({}){vision}", model.name, model.id);
            }
        }
    }

    fn print_history(&self) {
        let Some(conv) = self.controller.active_conversation() else {
            return;
        };
        println!("== {} ==", conv.title());
        for message in conv.messages() {
            let who = if message.is_user() { "you" } else { "assistant" };
            let images = if message.attachments.is_empty() {
                String::new()
            } else {
                format!(" [{} image(s)]", message.attachments.len())
            };
            match &message.error {
                Some(reason) => println!("{who}: {}{images} [error: {reason}]", message.content),
                None => println!("{who}: {}{images}", message.content),
            }
        }
    }

    fn print_errors(&self) {
        let entries = self.errors.get_all_entries();
        if entries.is_empty() {
            println!("No warnings or errors.");
            return;
        }
        for entry in entries {
            let level = match entry.level {
                ErrorLevel::Error => "ERROR",
                ErrorLevel::Warning => "WARN",
            };
            println!(
                "{} {level} {}: {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.target,
                entry.message
            );
        }
    }
}

/// Print streamed answers for the active conversation as they arrive
async fn print_events(controller: ChatController, mut events: broadcast::Receiver<ChatEvent>) {
    let mut streamed: HashSet<String> = HashSet::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let is_active = |conv_id: &str| controller.active_conversation_id().as_deref() == Some(conv_id);
        match event {
            ChatEvent::TextChunk {
                conversation_id,
                message_id,
                text,
            } if is_active(&conversation_id) => {
                streamed.insert(message_id);
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            ChatEvent::StreamEnded {
                conversation_id,
                message_id,
                status,
            } if is_active(&conversation_id) => {
                let was_streamed = streamed.remove(&message_id);
                match status {
                    StreamStatus::Completed if !was_streamed => {
                        let content = controller
                            .conversation(&conversation_id)
                            .and_then(|c| c.message(&message_id).map(|m| m.content.clone()))
                            .unwrap_or_default();
                        println!("{content}");
                    }
                    StreamStatus::Completed => println!(),
                    StreamStatus::Cancelled => println!(" [cancelled]"),
                    StreamStatus::Error(reason) => println!(" [error: {reason}]"),
                }
            }
            ChatEvent::TitleChanged { title, .. } => println!("(title: {title})"),
            ChatEvent::Busy { .. } => {
                println!("Still waiting for the previous answer; /cancel stops it.")
            }
            _ => {}
        }
    }
}

/// First eight characters of an id, for listings
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_counts_characters() {
        assert_eq!(short_id("3f2a9c1e-77b0-4d2e"), "3f2a9c1e");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("ünïcødé-ïd"), "ünïcødé-");
    }
}
