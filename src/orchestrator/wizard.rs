use super::controller::WizardController;
use super::panel::{FieldRequest, StepPanel, StepperBounds};
use super::runner::Mailbox;
use crate::config::{ConfigError, ConfigStore, Settings};
use crate::labels::Labels;
use crate::logging::Transcript;
use crate::pipeline::{convert_action, split_action, upload_action, Collaborators};

use super::panel::FieldRequest::{FileOpen, FileSave, Setting};

const CONVERT_FIELDS: &[FieldRequest] = &[
    FileOpen,
    Setting("languages"),
    Setting("force_ocr"),
    Setting("converter_command"),
    Setting("use_llm"),
    Setting("llm_base_url"),
    Setting("llm_api_key"),
    Setting("llm_model"),
];

const SPLIT_FIELDS: &[FieldRequest] = &[
    Setting("chunk_size"),
    Setting("embed_metadata"),
    Setting("include_title"),
];

const SAVE_FIELDS: &[FieldRequest] = &[
    FileSave,
    Setting("qdrant_url"),
    Setting("qdrant_key"),
    Setting("sparse_model"),
    Setting("dense_model"),
    Setting("dense_dimension"),
    Setting("chunks_collection"),
    Setting("docs_collection"),
];

/// Build the step panels in wizard order.
pub fn build_steps(
    settings: &Settings,
    labels: &Labels,
    collaborators: &Collaborators,
    bounds: StepperBounds,
) -> Result<Vec<StepPanel>, ConfigError> {
    let convert = StepPanel::new(
        labels.convert_step,
        settings,
        labels,
        CONVERT_FIELDS,
        Some(convert_action(collaborators.converter.clone())),
        bounds,
    )?
    .with_start_message(labels.preprocessing);

    let split = StepPanel::new(
        labels.split_step,
        settings,
        labels,
        SPLIT_FIELDS,
        Some(split_action(collaborators.splitter.clone())),
        bounds,
    )?
    .with_start_message(labels.splitting);

    let save = StepPanel::new(
        labels.save_step,
        settings,
        labels,
        SAVE_FIELDS,
        Some(upload_action(collaborators.uploader.clone())),
        bounds,
    )?
    .with_start_message(labels.uploading);

    Ok(vec![convert, split, save])
}

/// Assemble the full wizard around `store`.
pub fn build_wizard(
    store: ConfigStore,
    transcript: Transcript,
    labels: Labels,
    collaborators: &Collaborators,
    bounds: StepperBounds,
) -> Result<(WizardController, Mailbox), ConfigError> {
    let steps = build_steps(store.settings(), &labels, collaborators, bounds)?;
    Ok(WizardController::new(steps, store, transcript, labels))
}
