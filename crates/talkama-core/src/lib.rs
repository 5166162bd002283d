pub mod ai;
pub mod attachment;
pub mod config;
pub mod directory;
pub mod error;
pub mod pipeline;
pub mod state;

// Re-export main types for convenience
pub use ai::{InferenceBackend, ModelInfo, OllamaClient};
pub use attachment::{parse_drop_payload, AttachmentLoader, Base64Blob, DroppedItem, FileDialog};
pub use config::Config;
pub use directory::{normalize_host, HostDirectory, DEFAULT_HOST};
pub use error::{AttachmentError, BackendError, DirectoryError};
pub use pipeline::{ChatSession, DisplayState, InferenceRequest, SessionEvent, ERROR_PREFIX};
pub use state::{ChatMessage, ChatRole, ConversationLog, PendingRequest};
