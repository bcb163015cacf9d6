pub mod error_collector_layer;
pub mod llm_service;
pub mod persistence_service;
pub mod title_generator;

pub use error_collector_layer::ErrorCollectorLayer;
pub use llm_service::{BackendError, BackendResponse, ChatRequest, FragmentStream, ModelBackend, RequestMessage};
pub use persistence_service::PersistenceCoordinator;
pub use title_generator::{clean_title, derive_title};
