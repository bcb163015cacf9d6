use tokio::sync::watch;

/// A change of the bound model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelChange {
    pub previous: String,
    pub current: String,
}

/// The model new sends are addressed to.
///
/// Observers can watch the selection through [`ModelBinding::subscribe`];
/// the chat controller reacts to every [`ModelChange`] itself.
pub struct ModelBinding {
    sender: watch::Sender<String>,
}

impl ModelBinding {
    pub fn new(model_id: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(model_id.into());
        Self { sender }
    }

    pub fn current(&self) -> String {
        self.sender.borrow().clone()
    }

    /// Rebind to `model_id`. Returns the change, or `None` if it was already bound.
    pub fn set(&self, model_id: &str) -> Option<ModelChange> {
        let mut previous = None;
        self.sender.send_if_modified(|current| {
            if current == model_id {
                return false;
            }
            previous = Some(std::mem::replace(current, model_id.to_string()));
            true
        });
        previous.map(|previous| ModelChange {
            previous,
            current: model_id.to_string(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change_once() {
        let binding = ModelBinding::new("a");
        let change = binding.set("b").unwrap();
        assert_eq!(change.previous, "a");
        assert_eq!(change.current, "b");
        assert!(binding.set("b").is_none());
        assert_eq!(binding.current(), "b");
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let binding = ModelBinding::new("a");
        let mut rx = binding.subscribe();
        binding.set("a");
        assert!(!rx.has_changed().unwrap());

        binding.set("c");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), "c");
    }
}
