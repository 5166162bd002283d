//! Inference request pipeline
//!
//! [`ChatSession`] is the explicit state object `{log, pending}`. A submission is
//! split in two halves so a display layer can run the network call wherever it
//! likes: [`ChatSession::begin_submit`] records the user turn, claims the single
//! in-flight slot and returns the request to dispatch; [`ChatSession::resolve`]
//! appends the outcome and frees the slot. [`ChatSession::submit`] chains both for
//! callers that can simply await.
//!
//! There is no timeout in here. A hung backend keeps the slot claimed until the
//! call returns; use [`InferenceRequest::dispatch_with_timeout`] to bound it.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::InferenceBackend;
use crate::attachment::Base64Blob;
use crate::error::BackendError;
use crate::state::{ChatMessage, ConversationLog, PendingRequest};

/// Prefix of the transcript entry that reports a failed request.
pub const ERROR_PREFIX: &str = "Erro: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    MessageAppended(usize),
    InFlightChanged(bool),
    DraftChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Loading,
}

/// Everything needed for one backend call, captured at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub host: Option<String>,
    pub model: Option<String>,
    pub prompt: String,
    /// At most one image today; kept as a list to match the wire format.
    pub images: Vec<Base64Blob>,
}

impl InferenceRequest {
    pub async fn dispatch<B>(&self, backend: &B) -> Result<String, BackendError>
    where
        B: InferenceBackend + ?Sized,
    {
        let model = self.model.as_deref().ok_or(BackendError::NoModelSelected)?;
        let host = self.host.as_deref().ok_or(BackendError::NoHost)?;

        debug!(host, model, images = self.images.len(), "dispatching inference request");
        backend
            .send_inference_request(host, model, &self.prompt, &self.images)
            .await
    }

    pub async fn dispatch_with_timeout<B>(
        &self,
        backend: &B,
        timeout: Option<Duration>,
    ) -> Result<String, BackendError>
    where
        B: InferenceBackend + ?Sized,
    {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.dispatch(backend))
                .await
                .unwrap_or(Err(BackendError::TimedOut(limit))),
            None => self.dispatch(backend).await,
        }
    }
}

type Observer = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// One chat session: the transcript plus the pending request state.
#[derive(Default)]
pub struct ChatSession {
    log: ConversationLog,
    pending: PendingRequest,
    observers: Vec<Observer>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn pending(&self) -> &PendingRequest {
        &self.pending
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.in_flight
    }

    pub fn display_state(&self) -> DisplayState {
        if self.pending.in_flight {
            DisplayState::Loading
        } else {
            DisplayState::Idle
        }
    }

    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self, event: SessionEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    pub fn draft_text(&self) -> &str {
        &self.pending.draft_text
    }

    pub fn set_draft_text(&mut self, text: impl Into<String>) {
        self.pending.draft_text = text.into();
        self.notify(SessionEvent::DraftChanged);
    }

    /// Edit the draft in place (cursor-based input surfaces).
    pub fn edit_draft<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut String),
    {
        edit(&mut self.pending.draft_text);
        self.notify(SessionEvent::DraftChanged);
    }

    pub fn draft_image(&self) -> Option<&Base64Blob> {
        self.pending.draft_image.as_ref()
    }

    /// Replaces any image already attached.
    pub fn attach_image(&mut self, image: Base64Blob) {
        self.pending.draft_image = Some(image);
        self.notify(SessionEvent::DraftChanged);
    }

    /// Discard the pending image. Idempotent.
    pub fn clear_image(&mut self) {
        if self.pending.draft_image.take().is_some() {
            self.notify(SessionEvent::DraftChanged);
        }
    }

    fn append(&mut self, message: ChatMessage) {
        let index = self.log.append(message);
        self.notify(SessionEvent::MessageAppended(index));
    }

    /// Accept the draft for sending.
    ///
    /// Returns `None` without touching any state when the draft is blank or a
    /// request is already in flight. Otherwise the user turn is appended, the
    /// in-flight slot is claimed and the draft is cleared before anything awaits.
    pub fn begin_submit(&mut self, host: Option<&str>, model: Option<&str>) -> Option<InferenceRequest> {
        if self.pending.in_flight {
            debug!("submission rejected: a request is already in flight");
            return None;
        }
        if self.pending.is_blank() {
            return None;
        }

        let prompt = std::mem::take(&mut self.pending.draft_text);
        let image = self.pending.draft_image.take();

        self.append(ChatMessage::user(prompt.clone(), image.clone()));
        self.pending.in_flight = true;
        self.notify(SessionEvent::InFlightChanged(true));
        self.notify(SessionEvent::DraftChanged);

        Some(InferenceRequest {
            host: host.map(str::to_string),
            model: model.map(str::to_string),
            prompt,
            images: image.into_iter().collect(),
        })
    }

    /// Record the outcome of the in-flight request and free the slot.
    ///
    /// Returns `false` and changes nothing if no request is in flight.
    pub fn resolve(&mut self, outcome: Result<String, BackendError>) -> bool {
        if !self.pending.in_flight {
            warn!("resolution received with no request in flight");
            return false;
        }

        let message = match outcome {
            Ok(text) => {
                info!(chars = text.len(), "inference request completed");
                ChatMessage::assistant(text)
            }
            Err(e) => {
                warn!("inference request failed: {}", e);
                ChatMessage::assistant(format!("{}{}", ERROR_PREFIX, e))
            }
        };

        self.append(message);
        self.pending.in_flight = false;
        self.notify(SessionEvent::InFlightChanged(false));
        true
    }

    /// Submit and await the outcome in one step. Returns whether the draft was accepted.
    pub async fn submit<B>(&mut self, backend: &B, host: Option<&str>, model: Option<&str>) -> bool
    where
        B: InferenceBackend + ?Sized,
    {
        let Some(request) = self.begin_submit(host, model) else {
            return false;
        };

        let outcome = request.dispatch(backend).await;
        self.resolve(outcome)
    }
}
