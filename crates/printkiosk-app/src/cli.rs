// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command line surface of the kiosk runner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use printkiosk_core::config::KioskConfig;
use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{
    ColorMode, DocumentType, InputFile, JobId, JobStatus, PageRange, PrintOptions,
};
use printkiosk_pipeline::{Orchestrator, StatusEvent, Subscription};

use crate::data_dir;

/// How long the event stream may stay quiet before the job record is read.
const STATUS_POLL: Duration = Duration::from_millis(250);

/// Headless print kiosk: normalise documents to one PDF and print it.
#[derive(Debug, Parser)]
#[command(name = "printkiosk", version)]
pub struct Cli {
    /// Configuration file (JSON). Defaults to kiosk.json in the data directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print one or more documents as a single job.
    Submit {
        /// PDF, DOCX, JPEG or PNG files, printed in the order given.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, default_value_t = 1)]
        copies: u32,

        #[arg(long, value_enum, default_value_t = Color::Bw)]
        color: Color,

        /// Page selection such as "1-5,8".
        #[arg(long)]
        pages: Option<String>,
    },
    /// List the printers jobs can be sent to.
    Printers,
    /// Show the current status of a job recorded in the job database.
    Status {
        job_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Color {
    Color,
    Bw,
}

impl From<Color> for ColorMode {
    fn from(value: Color) -> Self {
        match value {
            Color::Color => ColorMode::Color,
            Color::Bw => ColorMode::Bw,
        }
    }
}

/// Run a parsed command. Returns whether it succeeded.
pub async fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    let orchestrator = Orchestrator::from_config(config).await?;

    match cli.command {
        Commands::Printers => {
            for printer in orchestrator.list_printers().await? {
                println!("{printer}");
            }
            Ok(true)
        }
        Commands::Status { job_id } => {
            let id = JobId::parse(&job_id)?;
            let job = orchestrator.status(&id).await?;
            println!("{}", StatusEvent::current(&job).to_json()?);
            Ok(job.status != JobStatus::Failed)
        }
        Commands::Submit {
            files,
            copies,
            color,
            pages,
        } => {
            let options = PrintOptions {
                copies,
                color_mode: color.into(),
                page_range: pages.as_deref().map(PageRange::parse).transpose()?,
            };
            let inputs = files
                .iter()
                .map(|path| input_from_path(path))
                .collect::<Result<Vec<_>>>()?;

            if orchestrator.backend().is_simulated() {
                warn!("no print spooler in use; dispatch will be simulated");
            }

            // Subscribe first so no event of this job is missed.
            let mut events = orchestrator.subscribe();
            let id = orchestrator.submit(inputs, options).await?;
            info!(job_id = %id, "job submitted");

            let status = follow(&orchestrator, &mut events, id, |event| {
                println!("{}", event.to_json()?);
                Ok(())
            })
            .await?;
            Ok(status == JobStatus::Completed)
        }
    }
}

/// Report a job's events until it is terminal and return its final status.
///
/// Events an observer queue had to drop are not replayed, so when the
/// queue goes quiet the job record is consulted instead; a terminal status
/// found there is reported as the closing event.
pub async fn follow<F>(
    orchestrator: &Orchestrator,
    events: &mut Subscription,
    id: JobId,
    mut report: F,
) -> Result<JobStatus>
where
    F: FnMut(&StatusEvent) -> Result<()>,
{
    loop {
        match tokio::time::timeout(STATUS_POLL, events.recv()).await {
            Ok(Some(event)) => {
                if event.job_id != id {
                    continue;
                }
                report(&event)?;
                if event.status.is_terminal() {
                    return Ok(event.status);
                }
            }
            Ok(None) | Err(_) => {
                let job = orchestrator.status(&id).await?;
                if job.status.is_terminal() {
                    report(&StatusEvent::current(&job))?;
                    return Ok(job.status);
                }
            }
        }
    }
}

/// Load the explicit config file, or the data directory's one. With no
/// file anywhere, defaults are used with directories under the data dir.
pub fn load_config(explicit: Option<&Path>) -> Result<KioskConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(KioskError::Config(format!("{} does not exist", path.display())));
        }
        return KioskConfig::load(path);
    }

    let dir = data_dir::data_dir()?;
    let path = data_dir::default_config_path(&dir);
    if path.exists() {
        KioskConfig::load(&path)
    } else {
        Ok(KioskConfig::default().rooted_at(&dir))
    }
}

/// Describe a local file as a job input, taking its type from the extension.
pub fn input_from_path(path: &Path) -> Result<InputFile> {
    let document_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentType::from_extension)
        .ok_or_else(|| KioskError::UnsupportedFormat(path.display().to_string()))?;
    let size = std::fs::metadata(path)?.len();
    Ok(InputFile::new(path, document_type.mime_type(), size))
}
