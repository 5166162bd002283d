use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ratatui::widgets::ListState;
use talkama_core::{
    parse_drop_payload, AttachmentLoader, BackendError, ChatSession, Config, DirectoryError,
    DroppedItem, FileDialog, HostDirectory, InferenceBackend, ModelInfo, OllamaClient,
    SessionEvent,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Upper bound on a model listing; an unresponsive host must not pin the status line.
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

type RefreshResult = Result<(String, Vec<ModelInfo>), DirectoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Models,
    Host,
}

impl Screen {
    pub fn all() -> [Screen; 3] {
        [Screen::Chat, Screen::Models, Screen::Host]
    }

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Chat => "Chat",
            Screen::Models => "Models",
            Screen::Host => "Host",
        }
    }

    pub fn next(&self) -> Screen {
        match self {
            Screen::Chat => Screen::Models,
            Screen::Models => Screen::Host,
            Screen::Host => Screen::Chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// The typed path from the attach prompt, offered to the loader as a file dialog.
struct PromptedPath(Option<PathBuf>);

#[async_trait]
impl FileDialog for PromptedPath {
    async fn select_file(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// Expand a leading `~` and drop surrounding quotes from a typed path.
fn resolve_typed_path(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim().trim_matches(|c| c == '\'' || c == '"');
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Some(home.join(rest));
        }
    }
    Some(PathBuf::from(trimmed))
}

/// True when pasted text is a file drop rather than typed text.
fn looks_like_drop(items: &[DroppedItem]) -> bool {
    match items.first() {
        Some(DroppedItem::DataUrl(_)) => true,
        Some(DroppedItem::Path(path)) => path.is_file(),
        None => false,
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Chat state
    pub session: ChatSession,
    pub draft_cursor: usize, // cursor position in the draft, in chars
    pub query_task: Option<JoinHandle<Result<String, BackendError>>>,
    pub request_timeout: Option<Duration>,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub follow_tail: Arc<AtomicBool>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Attach prompt state
    pub show_attach_prompt: bool,
    pub attach_input: String,
    pub attachments: AttachmentLoader,

    // Model picker state
    pub model_state: ListState,

    // Host form state
    pub host_input: String,
    pub refresh_task: Option<JoinHandle<RefreshResult>>,
    pub save_refreshed_host: bool, // only hosts confirmed in the form are persisted
    pub list_timeout: Duration,

    // Transient status line (configuration errors, confirmations)
    pub status: Option<String>,

    // Data
    pub directory: HostDirectory,
    pub backend: Arc<dyn InferenceBackend>,
    pub config_path: Option<PathBuf>, // where choices are saved; `None` keeps them in memory
}

impl App {
    pub fn new(config: &Config) -> Self {
        let mut app = Self::with_backend(config, Arc::new(OllamaClient::new()));
        app.config_path = Config::config_path()
            .map_err(|e| warn!("choices will not be saved: {}", e))
            .ok();
        app
    }

    pub fn with_backend(config: &Config, backend: Arc<dyn InferenceBackend>) -> Self {
        let directory = HostDirectory::new(config.host.clone(), config.default_model.clone());
        let host_input = directory.current_host().unwrap_or_default().to_string();

        let mut session = ChatSession::new();
        let follow_tail = Arc::new(AtomicBool::new(true));
        let follow = Arc::clone(&follow_tail);
        session.subscribe(move |event| {
            if matches!(event, SessionEvent::MessageAppended(_) | SessionEvent::InFlightChanged(_)) {
                follow.store(true, Ordering::Relaxed);
            }
        });

        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,

            session,
            draft_cursor: 0,
            query_task: None,
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
            chat_scroll: 0,
            chat_height: 0,
            follow_tail,
            animation_frame: 0,

            show_attach_prompt: false,
            attach_input: String::new(),
            attachments: AttachmentLoader::new(),

            model_state: ListState::default(),

            host_input,
            refresh_task: None,
            save_refreshed_host: false,
            list_timeout: LIST_TIMEOUT,

            status: None,

            directory,
            backend,
            config_path: None,
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn switch_screen(&mut self, screen: Screen) {
        self.screen = screen;
        self.input_mode = match screen {
            Screen::Chat | Screen::Host => InputMode::Editing,
            Screen::Models => InputMode::Normal,
        };
        if screen == Screen::Models {
            self.sync_model_selection();
        }
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// Hand the draft to the pipeline and run the backend call in the background.
    pub fn submit_draft(&mut self) {
        let Some(request) = self
            .session
            .begin_submit(self.directory.current_host(), self.directory.current_model())
        else {
            return;
        };

        self.draft_cursor = 0;
        let backend = Arc::clone(&self.backend);
        let timeout = self.request_timeout;
        self.query_task = Some(tokio::spawn(async move {
            request.dispatch_with_timeout(backend.as_ref(), timeout).await
        }));
    }

    /// Resolve the in-flight request once its task has finished.
    pub async fn poll_query_task(&mut self) {
        let finished = self.query_task.as_ref().is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }

        if let Some(task) = self.query_task.take() {
            let outcome = task.await.unwrap_or_else(|e| {
                error!("request task failed: {}", e);
                Err(BackendError::Transport(e.to_string()))
            });
            self.session.resolve(outcome);
        }
    }

    /// Load the path typed in the attach prompt. An empty prompt counts as cancel.
    pub async fn confirm_attach_prompt(&mut self) {
        self.show_attach_prompt = false;
        let dialog = PromptedPath(resolve_typed_path(&self.attach_input));
        self.attach_input.clear();

        match self.attachments.pick_file(&dialog).await {
            Ok(Some(image)) => {
                self.set_status(format!("Image attached ({} KB)", image.decoded_len().div_ceil(1024)));
                self.session.attach_image(image);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("attach failed: {}", e);
                self.set_status(format!("Error loading image: {}", e));
            }
        }
    }

    /// Treat pasted text as a file drop when it names a file or carries a data URL.
    /// Returns `false` when the text should be handled as ordinary input.
    pub async fn handle_drop(&mut self, payload: &str) -> bool {
        let items = parse_drop_payload(payload);
        if !looks_like_drop(&items) {
            return false;
        }

        match self.attachments.from_drop(&items).await {
            Ok(Some(image)) => {
                let note = if items.len() > 1 { " (extra files ignored)" } else { "" };
                self.set_status(format!(
                    "Image attached ({} KB){}",
                    image.decoded_len().div_ceil(1024),
                    note
                ));
                self.session.attach_image(image);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("drop failed: {}", e);
                self.set_status(format!("Error loading image: {}", e));
            }
        }
        true
    }

    pub fn insert_draft_text(&mut self, text: &str) {
        let cursor = self.draft_cursor;
        self.session.edit_draft(|draft| {
            let byte_pos = char_to_byte_index(draft, cursor);
            draft.insert_str(byte_pos, text);
        });
        self.draft_cursor += text.chars().count();
    }

    pub fn delete_draft_char_before_cursor(&mut self) {
        if self.draft_cursor == 0 {
            return;
        }
        self.draft_cursor -= 1;
        let cursor = self.draft_cursor;
        self.session.edit_draft(|draft| {
            let byte_pos = char_to_byte_index(draft, cursor);
            draft.remove(byte_pos);
        });
    }

    pub fn delete_draft_char_at_cursor(&mut self) {
        let cursor = self.draft_cursor;
        if cursor < self.session.draft_text().chars().count() {
            self.session.edit_draft(|draft| {
                let byte_pos = char_to_byte_index(draft, cursor);
                draft.remove(byte_pos);
            });
        }
    }

    pub fn move_draft_cursor(&mut self, delta: isize) {
        let char_count = self.session.draft_text().chars().count();
        self.draft_cursor = self.draft_cursor.saturating_add_signed(delta).min(char_count);
    }

    pub fn tick_animation(&mut self) {
        if self.session.is_in_flight() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat(&mut self, delta: i16) {
        self.follow_tail.store(false, Ordering::Relaxed);
        self.chat_scroll = self.chat_scroll.saturating_add_signed(delta);
    }

    // ------------------------------------------------------------------
    // Host and models
    // ------------------------------------------------------------------

    /// Start listing the host's models in the background. An explicit host comes
    /// from the Host form and is saved once it answers.
    pub fn refresh_models(&mut self, host: Option<String>) {
        let target = match self.directory.refresh_target(host.as_deref()) {
            Ok(target) => target,
            Err(e) => {
                warn!("model listing not started: {}", e);
                self.set_status(format!("Error fetching models: {}", e));
                return;
            }
        };

        if let Some(previous) = self.refresh_task.take() {
            previous.abort();
        }

        self.save_refreshed_host = host.is_some();
        self.set_status(format!("Checking {}...", target));

        let backend = Arc::clone(&self.backend);
        let limit = self.list_timeout;
        self.refresh_task = Some(tokio::spawn(async move {
            let listed = tokio::time::timeout(limit, backend.list_models(&target)).await;
            match listed {
                Ok(result) => result.map(|models| (target, models)),
                Err(_) => Err(DirectoryError::HostUnreachable {
                    detail: format!("no response after {:?}", limit),
                    host: target,
                }),
            }
        }));
    }

    /// Apply the model listing once its task has finished. Failures go to the
    /// status line, never the transcript.
    pub async fn poll_refresh_task(&mut self) {
        let finished = self.refresh_task.as_ref().is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.refresh_task.take() else {
            return;
        };

        let outcome = task.await.unwrap_or_else(|e| {
            error!("refresh task failed: {}", e);
            Err(DirectoryError::UnexpectedResponse(e.to_string()))
        });

        match outcome {
            Ok((host, models)) => {
                let count = self.directory.apply_models(host.clone(), models).len();
                self.host_input = host.clone();
                self.sync_model_selection();
                if self.directory.current_model().is_none() {
                    self.set_status(format!("Host valid! {} models available. Choose one in Models.", count));
                } else {
                    self.set_status(format!("Host valid! {} models available", count));
                }
                if self.save_refreshed_host {
                    if let Some(path) = &self.config_path {
                        if let Err(e) = Config::save_host_to(path, &host) {
                            warn!("could not save host: {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                warn!("model listing failed: {}", e);
                self.set_status(format!("Error fetching models: {}", e));
            }
        }
    }

    pub fn test_host_input(&self) -> Option<String> {
        let host = self.host_input.trim();
        (!host.is_empty()).then(|| host.to_string())
    }

    fn sync_model_selection(&mut self) {
        let models = self.directory.available_models();
        let idx = self
            .directory
            .current_model()
            .and_then(|current| models.iter().position(|m| m == current))
            .or(if models.is_empty() { None } else { Some(0) });
        self.model_state.select(idx);
    }

    pub fn model_nav(&mut self, delta: isize) {
        let count = self.directory.available_models().len();
        if count == 0 {
            return;
        }
        let current = self.model_state.selected().unwrap_or(0);
        let next = current.saturating_add_signed(delta).min(count - 1);
        self.model_state.select(Some(next));
    }

    /// Select the highlighted model. Persisting it is best effort.
    pub fn choose_highlighted_model(&mut self) {
        let Some(model) = self
            .model_state
            .selected()
            .and_then(|idx| self.directory.available_models().iter().nth(idx).cloned())
        else {
            return;
        };

        match self.directory.set_selected_model(&model) {
            Ok(()) => {
                info!(%model, "model chosen");
                self.set_status(format!("Model set to: {}", model));
                let Some(path) = &self.config_path else {
                    return;
                };
                if let Err(e) = Config::save_default_model_to(path, &model) {
                    warn!("could not save model: {}", e);
                    self.set_status(format!("Model set to: {} (not saved: {})", model, e));
                }
            }
            Err(e) => self.set_status(format!("Error setting model: {}", e)),
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
