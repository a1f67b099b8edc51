use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ConfigError, ConfigStore, FieldValue, Settings};
use crate::labels::Labels;
use crate::logging::Transcript;
use crate::pipeline::extension_of;

/// Document suffixes accepted by the file picker (matched case-insensitively).
pub const SUPPORTED_FORMATS: [&str; 5] = [".pdf", ".docx", ".doc", ".md", ".html"];

/// Inputs every action receives besides its text: a settings snapshot taken at activation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub settings: Settings,
    /// File stem of the selected document; empty until step one has been activated.
    pub document_title: String,
}

/// Text-to-text work bound to a step.
pub type StepAction =
    Arc<dyn Fn(TaskContext, String) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Wrap an async function as a [`StepAction`].
pub fn step_action<F, Fut>(f: F) -> StepAction
where
    F: Fn(TaskContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(move |ctx, input| f(ctx, input).boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Int,
    FileOpen,
    FileSave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRequest {
    /// A settings field; its kind follows the current value's type.
    Setting(&'static str),
    FileOpen,
    FileSave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelField {
    pub name: &'static str,
    pub label: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperBounds {
    pub step: i64,
    pub min: i64,
    pub max: i64,
}

impl Default for StepperBounds {
    fn default() -> Self {
        Self {
            step: 64,
            min: 0,
            max: 8192,
        }
    }
}

impl StepperBounds {
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    pub fn step_by(&self, value: i64, direction: i64) -> i64 {
        self.clamp(value.saturating_add(self.step.saturating_mul(direction)))
    }
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_FORMATS.contains(&extension_of(path).as_str())
}

pub struct StepPanel {
    title: String,
    fields: Vec<PanelField>,
    action: Option<StepAction>,
    start_message: Option<String>,
    bounds: StepperBounds,
    next_enabled: bool,
    picker_enabled: bool,
}

impl StepPanel {
    /// Bind `fields` against `settings`. Unknown setting names are rejected here, not at use.
    pub fn new(
        title: impl Into<String>,
        settings: &Settings,
        labels: &Labels,
        fields: &[FieldRequest],
        action: Option<StepAction>,
        bounds: StepperBounds,
    ) -> Result<Self, ConfigError> {
        let mut bound = Vec::with_capacity(fields.len());
        for request in fields {
            let field = match *request {
                FieldRequest::FileOpen => PanelField {
                    name: "file",
                    label: labels.field("file"),
                    kind: FieldKind::FileOpen,
                },
                FieldRequest::FileSave => PanelField {
                    name: "save",
                    label: labels.field("save"),
                    kind: FieldKind::FileSave,
                },
                FieldRequest::Setting(name) => {
                    let kind = match settings.get(name) {
                        Some(FieldValue::Bool(_)) => FieldKind::Bool,
                        Some(FieldValue::Int(_)) => FieldKind::Int,
                        Some(FieldValue::Text(_)) => FieldKind::Text,
                        None => return Err(ConfigError::UnknownField(name.to_string())),
                    };
                    PanelField {
                        name,
                        label: labels.field(name),
                        kind,
                    }
                }
            };
            bound.push(field);
        }

        let mut panel = Self {
            title: title.into(),
            fields: bound,
            action,
            start_message: None,
            bounds,
            next_enabled: false,
            picker_enabled: false,
        };
        panel.reset();
        Ok(panel)
    }

    pub fn with_start_message(mut self, message: impl Into<String>) -> Self {
        self.start_message = Some(message.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fields(&self) -> &[PanelField] {
        &self.fields
    }

    pub fn start_message(&self) -> Option<&str> {
        self.start_message.as_deref()
    }

    pub fn bounds(&self) -> StepperBounds {
        self.bounds
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn next_enabled(&self) -> bool {
        self.next_enabled
    }

    pub fn picker_enabled(&self) -> bool {
        self.picker_enabled
    }

    pub fn has_kind(&self, kind: FieldKind) -> bool {
        self.fields.iter().any(|field| field.kind == kind)
    }

    /// Initial gating: "next" waits for a document when the panel has a file picker.
    pub fn reset(&mut self) {
        self.next_enabled = self.action.is_some() && !self.has_kind(FieldKind::FileOpen);
        self.picker_enabled = true;
    }

    /// Disable the controls and hand out the action, or `None` if "next" is not enabled.
    pub fn begin(&mut self) -> Option<StepAction> {
        if !self.next_enabled {
            return None;
        }
        let action = self.action.clone()?;
        self.next_enabled = false;
        self.picker_enabled = false;
        Some(action)
    }

    /// Re-arm after a failed run so the user can retry.
    pub fn fail(&mut self) {
        self.next_enabled = self.action.is_some();
        self.picker_enabled = true;
    }

    /// Validate and persist an edit of one of this panel's settings fields.
    ///
    /// Integers are clamped to the stepper bounds. Returns the value actually stored.
    pub fn set_field(
        &self,
        store: &mut ConfigStore,
        name: &str,
        value: FieldValue,
    ) -> Result<FieldValue, ConfigError> {
        let field = self
            .fields
            .iter()
            .find(|field| field.name == name)
            .filter(|field| !matches!(field.kind, FieldKind::FileOpen | FieldKind::FileSave))
            .ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
        let value = match value {
            FieldValue::Int(n) if field.kind == FieldKind::Int => FieldValue::Int(self.bounds.clamp(n)),
            other => other,
        };
        store.update(field.name, value.clone())?;
        Ok(value)
    }

    /// Handle a document chosen in the file picker.
    ///
    /// An unsupported suffix is reported and changes nothing. Otherwise the path is made absolute,
    /// its parent directory is remembered in `file_path`, "next" is enabled and the absolute path
    /// is returned for the preview.
    pub fn select_file(
        &mut self,
        store: &mut ConfigStore,
        transcript: &Transcript,
        labels: &Labels,
        path: &Path,
    ) -> Option<PathBuf> {
        if !self.has_kind(FieldKind::FileOpen) || !self.picker_enabled {
            tracing::debug!(panel = %self.title, "File selection ignored");
            return None;
        }
        if !is_supported(path) {
            transcript.warn(labels.format_unsupported(&extension_of(path)));
            return None;
        }
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if let Some(dir) = path.parent() {
            let dir = FieldValue::Text(dir.display().to_string());
            if let Err(err) = store.update("file_path", dir) {
                tracing::warn!(error = %err, "Failed to remember document directory");
            }
        }
        self.next_enabled = self.action.is_some();
        transcript.info(labels.document_selected(&path.display().to_string()));
        Some(path)
    }

    /// Handle a confirmed save dialog: remember the target as the new default and return it.
    pub fn confirm_save(&mut self, store: &mut ConfigStore, path: &Path) -> Option<PathBuf> {
        if !self.has_kind(FieldKind::FileSave) || !self.picker_enabled {
            tracing::debug!(panel = %self.title, "Save ignored");
            return None;
        }
        let target = FieldValue::Text(path.display().to_string());
        if let Err(err) = store.update("save_path", target) {
            tracing::warn!(error = %err, "Failed to remember save path");
        }
        Some(path.to_path_buf())
    }
}
