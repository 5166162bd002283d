//! Host and model selection
//!
//! Owns the current host, the selected model and the last known model list. The
//! pipeline only reads `current_host`/`current_model` when it composes a request.

use std::collections::BTreeSet;

use tracing::{info, warn};
use url::Url;

use crate::ai::{InferenceBackend, ModelInfo};
use crate::error::DirectoryError;

pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Normalize a user-typed host address into `scheme://host[:port][/path]` with no
/// trailing slash. A missing scheme defaults to `http://`.
pub fn normalize_host(input: &str) -> Result<String, DirectoryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DirectoryError::InvalidHost(input.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|_| DirectoryError::InvalidHost(input.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(DirectoryError::InvalidHost(input.to_string()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[derive(Debug, Clone, Default)]
pub struct HostDirectory {
    host: Option<String>,
    selected_model: Option<String>,
    available_models: BTreeSet<String>,
}

impl HostDirectory {
    pub fn new(host: Option<String>, selected_model: Option<String>) -> Self {
        let host = host.and_then(|h| match normalize_host(&h) {
            Ok(normalized) => Some(normalized),
            Err(e) => {
                warn!(host = %h, "ignoring configured host: {}", e);
                None
            }
        });

        Self {
            host,
            selected_model: selected_model.filter(|m| !m.trim().is_empty()),
            available_models: BTreeSet::new(),
        }
    }

    pub fn current_host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn current_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    pub fn available_models(&self) -> &BTreeSet<String> {
        &self.available_models
    }

    /// Query the models on `host`, or on the current host when `None`.
    ///
    /// An explicit host is adopted as the current host once it answers.
    pub async fn refresh_models<B>(
        &mut self,
        backend: &B,
        host: Option<&str>,
    ) -> Result<&BTreeSet<String>, DirectoryError>
    where
        B: InferenceBackend + ?Sized,
    {
        let host = self.refresh_target(host)?;
        let models = backend.list_models(&host).await?;
        Ok(self.apply_models(host, models))
    }

    /// The normalized host a refresh should query. Lets a caller run the listing
    /// elsewhere and hand the answer back through [`HostDirectory::apply_models`].
    pub fn refresh_target(&self, host: Option<&str>) -> Result<String, DirectoryError> {
        match host {
            Some(h) => normalize_host(h),
            None => self.host.clone().ok_or(DirectoryError::NoHost),
        }
    }

    /// Adopt `host` together with the models it listed.
    pub fn apply_models(&mut self, host: String, models: Vec<ModelInfo>) -> &BTreeSet<String> {
        info!(%host, count = models.len(), "models listed");
        self.available_models = models.into_iter().map(|m| m.name).collect();
        self.host = Some(host);
        &self.available_models
    }

    pub fn set_selected_model(&mut self, model: &str) -> Result<(), DirectoryError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(DirectoryError::EmptyModel);
        }

        if !self.available_models.is_empty() && !self.available_models.contains(model) {
            warn!(model, "selected model is not in the host's list");
        }

        info!(model, "model selected");
        self.selected_model = Some(model.to_string());
        Ok(())
    }
}
