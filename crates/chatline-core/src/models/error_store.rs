use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorLevel {
    Warning,
    Error,
}

#[derive(Clone, Debug)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub level: ErrorLevel,
    pub message: String,
    pub target: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub fields: HashMap<String, String>,
}

/// Bounded log of warnings and errors, oldest evicted first.
/// Cloning shares the same underlying log.
#[derive(Clone)]
pub struct ErrorStore {
    entries: Arc<Mutex<VecDeque<ErrorEntry>>>,
    max_entries: usize,
}

impl ErrorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            max_entries,
        }
    }

    pub fn add_entry(&self, entry: ErrorEntry) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub fn get_all_entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        self.count(ErrorLevel::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(ErrorLevel::Warning)
    }

    fn count(&self, level: ErrorLevel) -> usize {
        self.entries.lock().iter().filter(|e| e.level == level).count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ErrorStore {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: ErrorLevel, message: &str) -> ErrorEntry {
        ErrorEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            target: "test".to_string(),
            file: None,
            line: None,
            fields: HashMap::new(),
        }
    }

    #[test]
    fn test_evicts_oldest_beyond_capacity() {
        let store = ErrorStore::new(2);
        store.add_entry(entry(ErrorLevel::Warning, "one"));
        store.add_entry(entry(ErrorLevel::Error, "two"));
        store.add_entry(entry(ErrorLevel::Error, "three"));

        let messages: Vec<String> = store
            .get_all_entries()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(store.error_count(), 2);
        assert_eq!(store.warning_count(), 0);
    }

    #[test]
    fn test_clones_share_entries() {
        let store = ErrorStore::new(10);
        let handle = store.clone();
        handle.add_entry(entry(ErrorLevel::Warning, "shared"));
        assert_eq!(store.warning_count(), 1);
        store.clear();
        assert!(handle.get_all_entries().is_empty());
    }
}
