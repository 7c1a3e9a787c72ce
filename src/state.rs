// src/state.rs
//! Chat view state as a reducer: [`ChatState::apply`] takes an [`Action`],
//! mutates state synchronously and returns the [`Effect`]s the runtime has to
//! carry out. Nothing in here performs I/O.

use reqwest::Url;
use uuid::Uuid;

use crate::api::{ChatRequest, ChatResponse};
use crate::catalog::ToolCatalog;
use crate::session::{Message, RequestId, Source, SourceUrl, Tool};
use crate::upload::{validate_type, Attachment, FileUpload, PatientSample, UploadError};

pub const APOLOGY: &str = "Sorry, I couldn't reach the medical assistant. Please try again.";
pub const NO_DESCRIPTION: &str = "No description";
const CITED_BY_ASSISTANT: &str = "Cited by the assistant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropPayload {
    /// A file dropped from the OS.
    File(FileUpload),
    /// An in-app patient sample, still in its raw JSON transfer form.
    Structured(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetInput(String),
    /// Submit the current input buffer.
    Submit,
    SubmitText(String),
    ThinkingStep { request_id: RequestId, step: String },
    ChatSucceeded { request_id: RequestId, response: ChatResponse },
    ChatFailed { request_id: RequestId, error: String },
    SelectTool(Tool),
    ClearTool,
    UploadFile(FileUpload),
    /// A file could not be read before it reached the reducer.
    UploadFailed(String),
    DragEnter,
    DragLeave,
    Drop(DropPayload),
    ClearPreview,
    RunAnalysis,
    AddSource { url: String, description: Option<String> },
    RemoveSource(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendChat { request_id: RequestId, request: ChatRequest },
    Cancel(RequestId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    id: RequestId,
    analysis: bool,
}

#[derive(Debug, Clone)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub input: String,
    pub selected_tool: Option<Tool>,
    pub attachment: Option<Attachment>,
    pub upload_error: Option<String>,
    pub is_dragging: bool,
    pub is_uploading: bool,
    pub sources: Vec<SourceUrl>,
    pub conversation_id: Option<String>,
    pending: Option<Pending>,
    next_request: u64,
    catalog: ToolCatalog,
    thinking_enabled: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new(ToolCatalog::default(), true)
    }
}

impl ChatState {
    pub fn new(catalog: ToolCatalog, thinking_enabled: bool) -> Self {
        Self {
            messages: Vec::new(),
            input: String::new(),
            selected_tool: None,
            attachment: None,
            upload_error: None,
            is_dragging: false,
            is_uploading: false,
            sources: Vec::new(),
            conversation_id: None,
            pending: None,
            next_request: 0,
            catalog,
            thinking_enabled,
        }
    }

    /// Image preview for the staged attachment, if it is an image.
    pub fn preview(&self) -> Option<&str> {
        self.attachment.as_ref().filter(|a| a.is_image()).map(|a| a.data.as_str())
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending.map(|p| p.id)
    }

    /// Tools offered by the most recent assistant reply that offered any.
    pub fn latest_tools(&self) -> Option<&[Tool]> {
        self.messages.iter().rev().find_map(|m| m.tools.as_deref())
    }

    pub fn preferred_links(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.url.clone()).collect()
    }

    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::SetInput(text) => {
                self.input = text;
                Vec::new()
            }
            Action::Submit => {
                let text = std::mem::take(&mut self.input);
                self.submit(text)
            }
            Action::SubmitText(text) => self.submit(text),
            Action::ThinkingStep { request_id, step } => {
                match self.messages.iter_mut().find(|m| m.is_placeholder_for(request_id)) {
                    Some(message) => {
                        if let Some(thinking) = message.thinking.as_mut() {
                            thinking.steps.push(step);
                        }
                    }
                    None => log::debug!("Dropping thinking step for settled request {}", request_id),
                }
                Vec::new()
            }
            Action::ChatSucceeded { request_id, response } => {
                self.chat_succeeded(request_id, response);
                Vec::new()
            }
            Action::ChatFailed { request_id, error } => {
                let Some(pending) = self.settle(request_id) else {
                    return Vec::new();
                };
                log::error!("Chat request {} failed: {}", request_id, error);
                if pending.analysis {
                    self.is_uploading = false;
                }
                self.messages.push(Message::assistant(APOLOGY));
                Vec::new()
            }
            Action::SelectTool(tool) => {
                log::info!("Selected tool '{}' ({})", tool.name, tool.input_type);
                self.selected_tool = Some(tool);
                self.attachment = None;
                self.upload_error = None;
                Vec::new()
            }
            Action::ClearTool => {
                self.selected_tool = None;
                self.attachment = None;
                self.upload_error = None;
                self.is_dragging = false;
                Vec::new()
            }
            Action::UploadFile(file) => {
                self.accept_file(&file);
                Vec::new()
            }
            Action::UploadFailed(error) => {
                self.attachment = None;
                self.upload_error = Some(error);
                Vec::new()
            }
            Action::DragEnter => {
                self.is_dragging = true;
                Vec::new()
            }
            Action::DragLeave => {
                self.is_dragging = false;
                Vec::new()
            }
            Action::Drop(payload) => {
                self.is_dragging = false;
                match payload {
                    DropPayload::File(file) => self.accept_file(&file),
                    DropPayload::Structured(raw) => self.accept_sample(&raw),
                }
                Vec::new()
            }
            Action::ClearPreview => {
                self.attachment = None;
                Vec::new()
            }
            Action::RunAnalysis => self.run_analysis(),
            Action::AddSource { url, description } => {
                self.add_source(&url, description.as_deref());
                Vec::new()
            }
            Action::RemoveSource(id) => {
                self.sources.retain(|s| s.id != id);
                Vec::new()
            }
        }
    }

    fn submit(&mut self, text: String) -> Vec<Effect> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.messages.push(Message::user(text.clone()));
        self.begin_request(text, None, false)
    }

    fn run_analysis(&mut self) -> Vec<Effect> {
        let (Some(tool), Some(attachment)) = (self.selected_tool.as_ref(), self.attachment.as_ref()) else {
            log::debug!("Run analysis ignored: nothing staged");
            return Vec::new();
        };
        let text = format!("Run {} on {}", tool.name, attachment.name);
        let image = attachment.data.clone();
        self.messages.push(Message::user(text.clone()));
        let effects = self.begin_request(text, Some(image), true);
        self.is_uploading = true;
        effects
    }

    fn begin_request(&mut self, message: String, image: Option<String>, analysis: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(old) = self.pending.take() {
            log::info!("Request {} superseded", old.id);
            self.remove_placeholder(old.id);
            self.is_uploading = false;
            effects.push(Effect::Cancel(old.id));
        }

        self.next_request += 1;
        let request_id = RequestId(self.next_request);
        if self.thinking_enabled {
            self.messages.push(Message::thinking(request_id));
        }
        self.pending = Some(Pending { id: request_id, analysis });

        effects.push(Effect::SendChat {
            request_id,
            request: ChatRequest {
                message,
                image,
                conversation_id: self.conversation_id.clone(),
                preferred_links: self.preferred_links(),
            },
        });
        effects
    }

    /// Clears the pending slot if it belongs to `request_id`. Stale ids return `None`.
    fn settle(&mut self, request_id: RequestId) -> Option<Pending> {
        match self.pending {
            Some(p) if p.id == request_id => {
                self.pending = None;
                self.remove_placeholder(request_id);
                Some(p)
            }
            _ => {
                log::debug!("Ignoring completion for stale request {}", request_id);
                None
            }
        }
    }

    fn remove_placeholder(&mut self, request_id: RequestId) {
        self.messages.retain(|m| !m.is_placeholder_for(request_id));
    }

    fn chat_succeeded(&mut self, request_id: RequestId, response: ChatResponse) {
        let Some(pending) = self.settle(request_id) else {
            return;
        };
        log::debug!(
            "Reply for {} (suggested_tool={:?}, trigger_agent={}, {} sources)",
            request_id,
            response.suggested_tool,
            response.trigger_agent,
            response.sources.as_ref().map_or(0, Vec::len)
        );
        if pending.analysis {
            self.is_uploading = false;
            self.attachment = None;
        }

        let mut reply = Message::assistant(response.response);
        reply.tools = self.catalog.suggest(response.suggested_tool.as_deref());
        reply.sources = response
            .sources
            .filter(|urls| !urls.is_empty())
            .map(|urls| urls.iter().map(|u| self.cite(u)).collect());
        self.messages.push(reply);
        self.conversation_id = Some(response.conversation_id);
    }

    fn cite(&self, url: &str) -> Source {
        let host = host_of(url);
        let info = host
            .as_deref()
            .and_then(|h| self.sources.iter().find(|s| host_of(&s.url).as_deref() == Some(h)))
            .map(|s| s.description.clone())
            .unwrap_or_else(|| CITED_BY_ASSISTANT.to_string());
        Source { title: host.unwrap_or_else(|| url.to_string()), url: url.to_string(), info }
    }

    fn accept_file(&mut self, file: &FileUpload) {
        self.upload_error = None;
        self.attachment = None;
        match validate_type(self.selected_tool.as_ref(), &file.mime) {
            Ok(()) => {
                log::info!("Staged {} ({}, {} bytes)", file.name, file.mime, file.bytes.len());
                self.attachment = Some(Attachment::from(file));
            }
            Err(e) => self.reject(e),
        }
    }

    fn accept_sample(&mut self, raw: &str) {
        self.upload_error = None;
        self.attachment = None;
        let staged = PatientSample::parse(raw).and_then(|sample| {
            validate_type(self.selected_tool.as_ref(), &sample.file_type)?;
            Ok(sample)
        });
        match staged {
            Ok(sample) => {
                log::info!("Staged patient sample {} ({})", sample.id, sample.file_type);
                self.attachment = Some(Attachment::from(sample));
            }
            Err(e) => self.reject(e),
        }
    }

    fn reject(&mut self, error: UploadError) {
        log::warn!("Upload rejected: {}", error);
        self.upload_error = Some(error.to_string());
    }

    fn add_source(&mut self, url: &str, description: Option<&str>) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        let description = description.map(str::trim).filter(|d| !d.is_empty()).unwrap_or(NO_DESCRIPTION);
        self.sources.push(SourceUrl { id: Uuid::new_v4(), url: url.to_string(), description: description.to_string() });
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}
