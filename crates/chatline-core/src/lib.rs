pub mod controllers;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use controllers::{ChatController, RequestHandle};
pub use error::{ChatError, ChatResult};
