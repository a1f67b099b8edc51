//! Wizard state machine.
//!
//! Owns the step index, the shared preview text and the settings store. The terminal UI and the
//! text mode both drive it through [`UiCommand`]s and read it back as [`WizardView`] snapshots.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::panel::{FieldKind, StepPanel, StepperBounds, TaskContext};
use super::runner::{Mailbox, TaskEvent, TaskRunner};
use crate::config::{ConfigError, ConfigStore, FieldValue, Settings};
use crate::labels::Labels;
use crate::logging::Transcript;

/// Commands emitted by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    SetField { name: String, value: FieldValue },
    SelectFile(PathBuf),
    SaveTo(PathBuf),
    EditPreview(String),
    Next,
    Back,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub name: &'static str,
    pub label: String,
    pub kind: FieldKind,
    /// Current settings value; `None` for the file and save pickers.
    pub value: Option<FieldValue>,
}

/// Snapshot of everything a presentation layer draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardView {
    pub index: usize,
    pub step_count: usize,
    pub done: bool,
    pub title: String,
    pub fields: Vec<FieldView>,
    pub next_enabled: bool,
    pub picker_enabled: bool,
    pub has_next: bool,
    pub busy: bool,
    pub preview: String,
    /// Bumped whenever the controller replaces the preview (not on user edits).
    pub preview_revision: u64,
    pub file_path: String,
    pub save_path: String,
    pub bounds: StepperBounds,
}

pub struct WizardController {
    steps: Vec<StepPanel>,
    index: usize,
    store: ConfigStore,
    transcript: Transcript,
    runner: TaskRunner,
    labels: Labels,
    preview: String,
    preview_revision: u64,
    document_title: String,
    /// Bumped by `back()`; results of runs started under an older value are dropped.
    generation: u64,
}

impl WizardController {
    /// Build a controller positioned on the first step. The mailbox must be fed back through
    /// [`WizardController::handle_event`].
    pub fn new(
        steps: Vec<StepPanel>,
        store: ConfigStore,
        transcript: Transcript,
        labels: Labels,
    ) -> (Self, Mailbox) {
        let (runner, mailbox) = TaskRunner::new();
        let controller = Self {
            steps,
            index: 0,
            store,
            transcript,
            runner,
            labels,
            preview: String::new(),
            preview_revision: 0,
            document_title: String::new(),
            generation: 0,
        };
        (controller, mailbox)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of positions including the final "done" page.
    pub fn step_count(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn is_done(&self) -> bool {
        self.index == self.steps.len()
    }

    pub fn is_busy(&self) -> bool {
        self.runner.is_busy()
    }

    pub fn current(&self) -> Option<&StepPanel> {
        self.steps.get(self.index)
    }

    pub fn step(&self, index: usize) -> Option<&StepPanel> {
        self.steps.get(index)
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn document_title(&self) -> &str {
        &self.document_title
    }

    /// Replace the preview with user-edited text. The next activation reads it as input.
    pub fn edit_preview(&mut self, text: impl Into<String>) {
        self.preview = text.into();
    }

    fn replace_preview(&mut self, text: String) {
        self.preview = text;
        self.preview_revision += 1;
    }

    /// Persist an edit of a field owned by the current step.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<FieldValue, ConfigError> {
        let Some(panel) = self.steps.get(self.index) else {
            return Err(ConfigError::UnknownField(name.to_string()));
        };
        panel.set_field(&mut self.store, name, value)
    }

    /// Offer a document to the current step. Returns true if it was accepted.
    pub fn select_file(&mut self, path: &Path) -> bool {
        let Some(panel) = self.steps.get_mut(self.index) else {
            return false;
        };
        match panel.select_file(&mut self.store, &self.transcript, &self.labels, path) {
            Some(selected) => {
                self.replace_preview(selected.display().to_string());
                true
            }
            None => false,
        }
    }

    /// Write the preview to `path` and finish the wizard. Returns true if it was saved.
    pub async fn save_to(&mut self, path: &Path) -> bool {
        let Some(panel) = self.steps.get_mut(self.index) else {
            return false;
        };
        let Some(target) = panel.confirm_save(&mut self.store, path) else {
            return false;
        };
        if let Err(err) = tokio::fs::write(&target, self.preview.as_bytes()).await {
            self.transcript.error(format!(
                "Failed to save file {}: {err}",
                target.display()
            ));
            return false;
        }
        self.transcript
            .info(self.labels.file_saved(&target.display().to_string()));
        self.advance();
        true
    }

    /// Activate the current step. A disabled step makes this a no-op.
    pub fn next(&mut self) -> bool {
        if let Some(running) = self.runner.outstanding() {
            tracing::debug!(running, "Activation ignored while a task is running");
            self.transcript.warn(format!(
                "Wait for '{}' to finish",
                self.steps
                    .get(running)
                    .map(StepPanel::title)
                    .unwrap_or_default()
            ));
            return false;
        }
        let index = self.index;
        let Some(panel) = self.steps.get_mut(index) else {
            return false;
        };
        let Some(action) = panel.begin() else {
            tracing::debug!(step = index, "Activation ignored, step is not enabled");
            return false;
        };
        if let Some(message) = panel.start_message() {
            self.transcript.info(message);
        }
        if index == 0 {
            self.document_title = Path::new(self.preview.trim())
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        let ctx = TaskContext {
            settings: self.store.snapshot(),
            document_title: self.document_title.clone(),
        };
        let input = self.preview.clone();
        if let Err(err) = self.runner.run(index, self.generation, action, ctx, input) {
            self.transcript.error(err.to_string());
            self.steps[index].fail();
            return false;
        }
        true
    }

    /// Return to the first step and re-arm every panel. Settings and preview are kept.
    pub fn back(&mut self) {
        self.index = 0;
        self.generation += 1;
        for panel in &mut self.steps {
            panel.reset();
        }
    }

    fn advance(&mut self) {
        assert!(
            self.index < self.steps.len(),
            "advance past the final step (index {})",
            self.index
        );
        self.index += 1;
    }

    /// Apply one mailbox event.
    pub fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Result {
                step,
                generation,
                outcome,
            } => {
                let title = self
                    .steps
                    .get(step)
                    .map(|panel| panel.title().to_string())
                    .unwrap_or_default();
                if generation != self.generation || step != self.index {
                    tracing::info!(
                        step,
                        generation,
                        current = self.index,
                        "Discarding stale task result"
                    );
                    self.transcript
                        .warn(format!("Discarded the result of '{title}'"));
                    return;
                }
                match outcome {
                    Ok(text) => {
                        self.replace_preview(text);
                        self.advance();
                    }
                    Err(err) => {
                        self.transcript.error(format!("{title} failed: {err}"));
                        self.steps[step].fail();
                    }
                }
            }
            TaskEvent::Finished { step, .. } => self.runner.finished(step),
        }
    }

    /// Process mailbox events until no task is outstanding.
    pub async fn run_until_idle(&mut self, mailbox: &mut Mailbox) {
        while self.is_busy() {
            match mailbox.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    /// Apply one UI command (everything except `Quit`).
    pub async fn handle_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::SetField { name, value } => {
                if let Err(err) = self.set_field(&name, value) {
                    tracing::warn!(field = %name, error = %err, "Rejected field edit");
                    self.transcript.warn(err.to_string());
                }
            }
            UiCommand::SelectFile(path) => {
                self.select_file(&path);
            }
            UiCommand::SaveTo(path) => {
                self.save_to(&path).await;
            }
            UiCommand::EditPreview(text) => self.edit_preview(text),
            UiCommand::Next => {
                self.next();
            }
            UiCommand::Back => self.back(),
            UiCommand::Quit => {}
        }
    }

    pub fn view(&self) -> WizardView {
        let settings = self.store.settings();
        let (title, fields, next_enabled, picker_enabled, has_next, bounds) =
            match self.current() {
                Some(panel) => (
                    panel.title().to_string(),
                    panel
                        .fields()
                        .iter()
                        .map(|field| FieldView {
                            name: field.name,
                            label: field.label.clone(),
                            kind: field.kind,
                            value: settings.get(field.name),
                        })
                        .collect(),
                    panel.next_enabled(),
                    panel.picker_enabled(),
                    panel.has_action(),
                    panel.bounds(),
                ),
                None => (
                    self.labels.done.to_string(),
                    Vec::new(),
                    false,
                    false,
                    false,
                    StepperBounds::default(),
                ),
            };
        WizardView {
            index: self.index,
            step_count: self.step_count(),
            done: self.is_done(),
            title,
            fields,
            next_enabled,
            picker_enabled,
            has_next,
            busy: self.is_busy(),
            preview: self.preview.clone(),
            preview_revision: self.preview_revision,
            file_path: settings.file_path.clone(),
            save_path: settings.save_path.clone(),
            bounds,
        }
    }
}

/// Drive `controller` from UI commands and task events, publishing a view after each input.
///
/// Returns when the UI sends `Quit` or hangs up. A task still running at that point is left to
/// finish on its own; its result is dropped.
pub async fn run_controller(
    mut controller: WizardController,
    mut mailbox: Mailbox,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
    view_tx: UnboundedSender<WizardView>,
) -> Result<()> {
    let _ = view_tx.send(controller.view());
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Quit) | None => break,
                    Some(cmd) => controller.handle_command(cmd).await,
                }
            }
            Some(event) = mailbox.recv() => controller.handle_event(event),
        }
        if view_tx.send(controller.view()).is_err() {
            break;
        }
    }
    if controller.is_busy() {
        tracing::info!("Quitting with a task still running");
    }
    Ok(())
}
