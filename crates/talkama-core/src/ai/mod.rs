pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attachment::Base64Blob;
use crate::error::{BackendError, DirectoryError};

/// A model advertised by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

/// Transport seam between the core and an inference server.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn send_inference_request(
        &self,
        host: &str,
        model: &str,
        prompt: &str,
        images: &[Base64Blob],
    ) -> Result<String, BackendError>;

    async fn list_models(&self, host: &str) -> Result<Vec<ModelInfo>, DirectoryError>;
}
