use crate::config::{default_config_path, ConfigStore};
use crate::labels::Labels;
use crate::logging::{default_log_path, init_tracing, Level, Transcript, TranscriptLine};
use crate::orchestrator::{build_wizard, Mailbox, StepperBounds, WizardController};
use crate::pipeline::Collaborators;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "raggen-tui",
    version,
    about = "Convert documents to Markdown, split them into chunks and upload them to Qdrant"
)]
pub struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Document to preselect (.pdf, .docx, .doc, .md, .html)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Diagnostic log file (defaults to the per-user cache directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Run convert and split without the terminal UI, printing chunk JSON to stdout
    #[arg(long)]
    pub text: bool,

    /// With --text: write the chunk JSON to this file instead of stdout
    #[arg(long, conflicts_with = "upload")]
    pub save: Option<PathBuf>,

    /// With --text: upload the chunks to Qdrant instead of printing them
    #[arg(long)]
    pub upload: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if (args.save.is_some() || args.upload) && !args.text {
        bail!("--save and --upload can only be used with --text");
    }
    if args.text && args.file.is_none() {
        bail!("--text requires --file");
    }

    let log_file = args.log_file.clone().unwrap_or_else(default_log_path);
    init_tracing(&log_file, args.text);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting");

    let transcript = Transcript::new();
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let store = ConfigStore::open(config_path).with_transcript(transcript.clone());
    let collaborators = Collaborators::local(transcript.clone())?;
    let (controller, mailbox) = build_wizard(
        store,
        transcript.clone(),
        Labels::default(),
        &collaborators,
        StepperBounds::default(),
    )
    .context("failed to assemble the wizard")?;

    if args.text {
        return run_text(args, controller, mailbox).await;
    }

    #[cfg(feature = "tui")]
    {
        let mut controller = controller;
        if let Some(file) = &args.file {
            controller.select_file(file);
        }
        crate::tui::run(controller, mailbox).await
    }
    #[cfg(not(feature = "tui"))]
    {
        drop((controller, mailbox));
        bail!("built without terminal UI support; use --text")
    }
}

/// Drive the wizard without a terminal UI: convert, split, then print, save or upload.
async fn run_text(args: Cli, mut controller: WizardController, mut mailbox: Mailbox) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();

    // Transcript lines go to stderr as they are written.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<TranscriptLine>();
    controller.transcript().subscribe(line_tx);
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            let text = match line.level {
                Level::Info => line.text,
                Level::Warn => format!("warning: {}", line.text),
                Level::Error => format!("error: {}", line.text),
            };
            let _ = forward_tx.send(OutputLine::Stderr(text));
        }
    });

    let res = tokio::select! {
        res = drive_text(&args, &mut controller, &mut mailbox) => res,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };
    if res.is_ok() && args.save.is_none() && !args.upload {
        let _ = out_tx.send(OutputLine::Stdout(controller.preview().to_string()));
    }

    controller.transcript().unsubscribe();
    let _ = forwarder.await;
    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn drive_text(
    args: &Cli,
    controller: &mut WizardController,
    mailbox: &mut Mailbox,
) -> Result<()> {
    let Some(file) = args.file.as_deref() else {
        bail!("--text requires --file");
    };
    if !controller.select_file(file) {
        bail!("cannot use {}", file.display());
    }

    // Convert and split.
    for _ in 0..2 {
        run_current_step(controller, mailbox).await?;
    }

    if let Some(path) = &args.save {
        if !controller.save_to(path).await {
            bail!("failed to save chunks to {}", path.display());
        }
    } else if args.upload {
        run_current_step(controller, mailbox).await?;
    }
    Ok(())
}

async fn run_current_step(controller: &mut WizardController, mailbox: &mut Mailbox) -> Result<()> {
    let index = controller.index();
    let title = controller
        .current()
        .map(|panel| panel.title().to_string())
        .unwrap_or_default();
    if !controller.next() {
        bail!("'{title}' could not be started");
    }
    controller.run_until_idle(mailbox).await;
    if controller.index() != index + 1 {
        bail!("'{title}' did not complete");
    }
    Ok(())
}
