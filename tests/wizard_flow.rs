use async_trait::async_trait;
use raggen_tui::config::{ConfigStore, FieldValue, Settings};
use raggen_tui::labels::Labels;
use raggen_tui::logging::Transcript;
use raggen_tui::model::{decode_records, ChunkRecord, MetaValue};
use raggen_tui::orchestrator::{build_wizard, Mailbox, StepperBounds, TaskEvent, WizardController};
use raggen_tui::pipeline::{
    Collaborators, Converter, MarkdownSplitter, PipelineError, UploadSummary, Uploader,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

const MARKDOWN: &str = "# Report\n\nFirst paragraph.\n\nSecond paragraph.\n";

/// Returns fixed Markdown, failing the first `failures` calls.
#[derive(Default)]
struct StubConverter {
    calls: AtomicUsize,
    failures: usize,
}

#[async_trait]
impl Converter for StubConverter {
    async fn convert(&self, _path: &Path, _settings: &Settings) -> Result<String, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PipelineError::Llm("converter exploded".into()));
        }
        Ok(MARKDOWN.to_string())
    }

    async fn preprocess(
        &self,
        markdown: &str,
        _settings: &Settings,
    ) -> Result<String, PipelineError> {
        Ok(markdown.to_string())
    }
}

#[derive(Default)]
struct RecordingUploader {
    uploads: Mutex<Vec<Vec<ChunkRecord>>>,
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(
        &self,
        records: Vec<ChunkRecord>,
        _settings: &Settings,
    ) -> Result<UploadSummary, PipelineError> {
        let chunks = records.len();
        self.uploads.lock().unwrap().push(records);
        Ok(UploadSummary {
            chunks,
            documents: 1,
        })
    }
}

struct Harness {
    dir: TempDir,
    controller: WizardController,
    mailbox: Mailbox,
    transcript: Transcript,
    converter: Arc<StubConverter>,
    uploader: Arc<RecordingUploader>,
}

fn harness(converter: StubConverter) -> Harness {
    let dir = tempdir().unwrap();
    let transcript = Transcript::new();
    let store = ConfigStore::open(dir.path().join("settings.json"));
    let converter = Arc::new(converter);
    let uploader = Arc::new(RecordingUploader::default());
    let collaborators = Collaborators {
        converter: converter.clone(),
        splitter: Arc::new(MarkdownSplitter),
        uploader: uploader.clone(),
    };
    let (controller, mailbox) = build_wizard(
        store,
        transcript.clone(),
        Labels::default(),
        &collaborators,
        StepperBounds::default(),
    )
    .unwrap();
    Harness {
        dir,
        controller,
        mailbox,
        transcript,
        converter,
        uploader,
    }
}

impl Harness {
    fn document(&self) -> std::path::PathBuf {
        self.dir.path().join("docs").join("report.md")
    }

    async fn step(&mut self) {
        assert!(self.controller.next());
        self.controller.run_until_idle(&mut self.mailbox).await;
    }

    /// Select a document and run conversion and splitting.
    async fn reach_save_step(&mut self) {
        let doc = self.document();
        assert!(self.controller.select_file(&doc));
        self.step().await;
        self.step().await;
        assert_eq!(self.controller.index(), 2);
    }
}

#[tokio::test]
async fn unsupported_format_changes_nothing() {
    let mut h = harness(StubConverter::default());
    let before = h.controller.settings().file_path.clone();

    assert!(!h.controller.select_file(Path::new("/tmp/report.txt")));

    assert_eq!(h.controller.index(), 0);
    assert!(!h.controller.current().unwrap().next_enabled());
    assert_eq!(h.controller.settings().file_path, before);
    assert!(h.transcript.contains("Format '.txt' is not supported"));
    assert!(!h.controller.next());
    assert!(!h.controller.is_busy());
}

#[tokio::test]
async fn supported_format_enables_next_and_remembers_directory() {
    let mut h = harness(StubConverter::default());
    let doc = h.dir.path().join("inbox").join("Manual.PDF");

    assert!(h.controller.select_file(&doc));

    assert!(h.controller.current().unwrap().next_enabled());
    assert_eq!(
        h.controller.settings().file_path,
        doc.parent().unwrap().display().to_string()
    );
    assert_eq!(h.controller.preview(), doc.display().to_string());

    // The choice is persisted, not only held in memory.
    let reopened = ConfigStore::open(h.dir.path().join("settings.json"));
    assert_eq!(reopened.settings().file_path, h.controller.settings().file_path);
}

#[tokio::test]
async fn result_precedes_finished_and_moves_one_step() {
    let mut h = harness(StubConverter::default());
    let doc = h.document();
    h.controller.select_file(&doc);
    assert!(h.controller.next());

    let first = h.mailbox.recv().await.unwrap();
    assert!(matches!(first, TaskEvent::Result { step: 0, outcome: Ok(_), .. }));
    h.controller.handle_event(first);
    assert_eq!(h.controller.index(), 1);
    assert!(h.controller.is_busy());

    let second = h.mailbox.recv().await.unwrap();
    assert_eq!(
        second,
        TaskEvent::Finished {
            step: 0,
            generation: 0
        }
    );
    h.controller.handle_event(second);
    assert_eq!(h.controller.index(), 1);
    assert!(!h.controller.is_busy());
    assert_eq!(h.controller.preview(), MARKDOWN);
}

#[tokio::test]
async fn second_activation_is_a_no_op() {
    let mut h = harness(StubConverter::default());
    let doc = h.document();
    h.controller.select_file(&doc);

    assert!(h.controller.next());
    assert!(!h.controller.next());
    h.controller.run_until_idle(&mut h.mailbox).await;

    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.index(), 1);
}

#[tokio::test]
async fn split_output_is_chunk_json_with_title() {
    let mut h = harness(StubConverter::default());
    h.reach_save_step().await;

    let records = decode_records(h.controller.preview()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].document, "First paragraph.\n\nSecond paragraph.");
    assert_eq!(records[0].title(), Some("report"));
    assert_eq!(
        records[0].metadata.get("section"),
        Some(&MetaValue::Text("Report".into()))
    );
    assert_eq!(
        records[0].metadata.get("length"),
        Some(&MetaValue::Int(records[0].document.chars().count() as i64))
    );
}

#[tokio::test]
async fn edited_preview_is_fed_forward() {
    let mut h = harness(StubConverter::default());
    let doc = h.document();
    h.controller.select_file(&doc);
    h.step().await;

    h.controller
        .edit_preview("# Corrected\n\nHand-fixed OCR output.");
    h.step().await;

    let records = decode_records(h.controller.preview()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].document, "Hand-fixed OCR output.");
    assert_eq!(
        records[0].metadata.get("section"),
        Some(&MetaValue::Text("Corrected".into()))
    );
}

#[tokio::test]
async fn chunk_size_edit_applies_to_next_split() {
    let mut h = harness(StubConverter::default());
    let doc = h.document();
    h.controller.select_file(&doc);
    h.step().await;

    let stored = h
        .controller
        .set_field("chunk_size", FieldValue::Int(20))
        .unwrap();
    assert_eq!(stored, FieldValue::Int(20));
    h.step().await;

    let records = decode_records(h.controller.preview()).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.document.chars().count() <= 20));
}

#[tokio::test]
async fn failed_step_stays_and_can_be_retried() {
    let mut h = harness(StubConverter {
        failures: 1,
        ..StubConverter::default()
    });
    let doc = h.document();
    h.controller.select_file(&doc);

    h.step().await;
    assert_eq!(h.controller.index(), 0);
    assert!(h.transcript.contains("Step 1. Conversion failed"));
    assert!(h.transcript.contains("converter exploded"));
    assert!(h.controller.current().unwrap().next_enabled());
    assert_eq!(h.controller.preview(), doc.display().to_string());

    h.step().await;
    assert_eq!(h.controller.index(), 1);
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn back_resets_gating_and_keeps_preview() {
    let mut h = harness(StubConverter::default());
    h.reach_save_step().await;
    let preview = h.controller.preview().to_string();

    h.controller.back();

    assert_eq!(h.controller.index(), 0);
    assert!(!h.controller.step(0).unwrap().next_enabled());
    assert!(h.controller.step(0).unwrap().picker_enabled());
    assert!(h.controller.step(1).unwrap().next_enabled());
    assert_eq!(h.controller.preview(), preview);
}

#[tokio::test]
async fn stale_result_is_discarded_after_back() {
    let mut h = harness(StubConverter::default());
    let doc = h.document();
    h.controller.select_file(&doc);
    h.step().await;
    let converted = h.controller.preview().to_string();

    assert!(h.controller.next());
    h.controller.back();
    h.controller.run_until_idle(&mut h.mailbox).await;

    assert_eq!(h.controller.index(), 0);
    assert_eq!(h.controller.preview(), converted);
    assert!(h.transcript.contains("Discarded the result of 'Step 2. Processing'"));
    assert!(!h.controller.is_busy());
}

#[tokio::test]
async fn conversion_abandoned_by_back_does_not_advance() {
    let mut h = harness(StubConverter::default());
    let old = h.dir.path().join("docs").join("old.md");
    let new = h.dir.path().join("docs").join("new.md");
    assert!(h.controller.select_file(&old));
    assert!(h.controller.next());

    h.controller.back();
    assert!(h.controller.select_file(&new));
    h.controller.run_until_idle(&mut h.mailbox).await;

    assert_eq!(h.controller.index(), 0);
    assert_eq!(h.controller.preview(), new.display().to_string());
    assert!(h.controller.current().unwrap().next_enabled());
    assert!(h.transcript.contains("Discarded the result of 'Step 1. Conversion'"));

    h.step().await;
    assert_eq!(h.controller.index(), 1);
    assert_eq!(h.controller.document_title(), "new");
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn save_writes_preview_and_finishes() {
    let mut h = harness(StubConverter::default());
    h.reach_save_step().await;
    let target = h.dir.path().join("out").join("chunks.json");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();

    assert!(h.controller.save_to(&target).await);

    assert!(h.controller.is_done());
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        h.controller.preview()
    );
    assert_eq!(
        h.controller.settings().save_path,
        target.display().to_string()
    );
    assert!(h.transcript.contains("File saved to:"));
    assert!(h.uploader.uploads.lock().unwrap().is_empty());
    assert!(!h.controller.next());
}

#[tokio::test]
async fn upload_sends_records_and_keeps_preview() {
    let mut h = harness(StubConverter::default());
    h.reach_save_step().await;
    let preview = h.controller.preview().to_string();

    h.step().await;

    assert!(h.controller.is_done());
    assert_eq!(h.controller.preview(), preview);
    let uploads = h.uploader.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0], decode_records(&preview).unwrap());
}

#[tokio::test]
async fn second_pass_after_done() {
    let mut h = harness(StubConverter::default());
    h.reach_save_step().await;
    h.step().await;
    assert!(h.controller.is_done());

    h.controller.back();
    h.reach_save_step().await;
    h.step().await;

    assert!(h.controller.is_done());
    assert_eq!(h.uploader.uploads.lock().unwrap().len(), 2);
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 2);
}
