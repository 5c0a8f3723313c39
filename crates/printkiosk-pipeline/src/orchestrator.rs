// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator — drives each job from intake to a terminal status.
//
//   validate → queued → converting → convert × N → merge (N > 1)
//            → printing → dispatch → completed
//
// Any error stops the job and records it as failed. Intermediate PDFs are
// held by scratch guards, so they disappear on every exit path; the final
// artifact is retained.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use printkiosk_core::config::KioskConfig;
use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{InputFile, Job, JobId, JobStatus, PrintOptions};
use printkiosk_document::{Conversion, FormatConverter, PdfMerger};
use printkiosk_print::{DispatchRequest, JobHandle, PlatformBackend, PrintBackend};

use crate::broadcast::{StatusBroadcaster, Subscription};
use crate::directory::PrinterDirectory;
use crate::intake;
use crate::scratch::ScratchFile;
use crate::state::JobStateMachine;
use crate::store::{JobStore, MemoryJobStore, SqliteJobStore};

/// One converted input waiting to become (part of) the artifact.
struct Prepared {
    pdf_path: PathBuf,
    /// Present when the converter created `pdf_path`.
    scratch: Option<ScratchFile>,
    degraded: bool,
}

impl From<Conversion> for Prepared {
    fn from(conversion: Conversion) -> Self {
        let scratch = conversion
            .created
            .then(|| ScratchFile::new(&conversion.pdf_path));
        Self {
            pdf_path: conversion.pdf_path,
            scratch,
            degraded: conversion.degraded,
        }
    }
}

struct Inner<B> {
    config: KioskConfig,
    converter: FormatConverter,
    merger: PdfMerger,
    backend: B,
    machine: JobStateMachine,
    directory: Option<Arc<dyn PrinterDirectory>>,
}

/// Top-level coordinator. Cheap to clone; clones share all state.
pub struct Orchestrator<B = PlatformBackend> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Orchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Orchestrator<PlatformBackend> {
    /// Probe the host and build every collaborator from configuration.
    pub async fn from_config(config: KioskConfig) -> Result<Self> {
        let converter = FormatConverter::probe(&config.conversion).await;
        let backend = PlatformBackend::detect(&config.print);
        let store: Arc<dyn JobStore> = match &config.storage.database_path {
            Some(path) => Arc::new(SqliteJobStore::open(path)?),
            None => Arc::new(MemoryJobStore::new()),
        };
        let broadcaster = StatusBroadcaster::new(config.broadcast.subscriber_capacity);
        Ok(Self::new(config, converter, backend, store, broadcaster, None))
    }
}

impl<B: PrintBackend + 'static> Orchestrator<B> {
    pub fn new(
        config: KioskConfig,
        converter: FormatConverter,
        backend: B,
        store: Arc<dyn JobStore>,
        broadcaster: StatusBroadcaster,
        directory: Option<Arc<dyn PrinterDirectory>>,
    ) -> Self {
        info!(
            backend = backend.name(),
            renderer = ?converter.tier(),
            synchronous = config.print.synchronous_dispatch,
            "orchestrator ready"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                converter,
                merger: PdfMerger::new(),
                backend,
                machine: JobStateMachine::new(store, broadcaster),
                directory,
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.machine.broadcaster().subscribe()
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        self.inner.machine.broadcaster()
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Accept a submission and start its pipeline.
    ///
    /// Structurally invalid submissions (no inputs, bad print options) are
    /// refused without creating a job. Otherwise the job is created as
    /// `uploaded` and its id returned: after the job is terminal when
    /// dispatch is synchronous, straight away when it is not. The pipeline
    /// runs on its own task either way, so a caller that goes away does not
    /// strand the job.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub async fn submit(&self, inputs: Vec<InputFile>, options: PrintOptions) -> Result<JobId> {
        let job = Job::new(inputs, options)?;
        let snapshot = job.clone();
        let id = self.inner.machine.create(job)?;

        let this = self.clone();
        let task = tokio::spawn(async move { this.run(snapshot).await });

        if self.inner.config.print.synchronous_dispatch {
            if let Err(e) = task.await {
                error!(job_id = %id, error = %e, "pipeline task aborted");
            }
        }
        Ok(id)
    }

    /// Current state of a job.
    pub async fn status(&self, id: &JobId) -> Result<Job> {
        self.inner.machine.snapshot(id).await
    }

    /// Printers jobs can be sent to: the directory's list when one is
    /// configured, otherwise whatever the backend reports.
    pub async fn list_printers(&self) -> Result<Vec<String>> {
        match &self.inner.directory {
            Some(directory) => directory.printers().await,
            None => self.inner.backend.list_printers().await,
        }
    }

    async fn run(&self, job: Job) {
        let id = job.id;
        match self.process(&job).await {
            Ok(handle) => info!(job_id = %id, printer = %handle, "job completed"),
            Err(e) => {
                error!(job_id = %id, kind = e.kind(), error = %e, "job failed");
                if let Err(fail_err) = self.inner.machine.fail(&id, e.job_detail()).await {
                    error!(job_id = %id, error = %fail_err, "could not record job failure");
                }
            }
        }
    }

    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn process(&self, job: &Job) -> Result<JobHandle> {
        let id = job.id;
        let machine = &self.inner.machine;

        self.validate(&job.inputs).await?;
        machine.advance(&id, JobStatus::Queued).await?;

        machine.advance(&id, JobStatus::Converting).await?;
        let prepared = self.convert_all(&job.inputs).await?;
        let artifact = self.assemble(&id, prepared).await?;

        machine.start_printing(&id, artifact.clone()).await?;
        let handle = self.dispatch(&job.options, &artifact).await.inspect_err(|_| {
            warn!(job_id = %id, artifact = %artifact.display(), "dispatch failed; artifact retained");
        })?;

        machine.advance(&id, JobStatus::Completed).await?;
        Ok(handle)
    }

    async fn validate(&self, inputs: &[InputFile]) -> Result<()> {
        let inputs = inputs.to_vec();
        let limit = self.inner.config.intake.max_file_size_bytes;
        tokio::task::spawn_blocking(move || intake::validate_inputs(&inputs, limit))
            .await
            .map_err(|e| KioskError::Validation(format!("validation task failed: {e}")))?
    }

    /// Convert every input, keeping input order. Created files are guarded
    /// as soon as they exist.
    async fn convert_all(&self, inputs: &[InputFile]) -> Result<Vec<Prepared>> {
        let converter = &self.inner.converter;

        if !self.inner.config.conversion.parallel || inputs.len() < 2 {
            let mut prepared = Vec::with_capacity(inputs.len());
            for input in inputs {
                let conversion = converter.convert(&input.path, &input.declared_mime).await?;
                prepared.push(Prepared::from(conversion));
            }
            return Ok(prepared);
        }

        let mut tasks = JoinSet::new();
        for (index, input) in inputs.iter().cloned().enumerate() {
            let converter = converter.clone();
            tasks.spawn(async move {
                let result = converter
                    .convert(&input.path, &input.declared_mime)
                    .await
                    .map(Prepared::from);
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<Prepared>>> = (0..inputs.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) =
                joined.map_err(|e| KioskError::Conversion(format!("conversion task failed: {e}")))?;
            slots[index] = Some(result);
        }

        // First error in input order wins; everything else is dropped
        // (and so cleaned up) with `slots`.
        let mut prepared = Vec::with_capacity(slots.len());
        for slot in slots {
            let result = slot
                .ok_or_else(|| KioskError::Conversion("conversion result missing".into()))?;
            prepared.push(result?);
        }
        Ok(prepared)
    }

    /// Produce the single artifact to print.
    async fn assemble(&self, id: &JobId, prepared: Vec<Prepared>) -> Result<PathBuf> {
        let degraded = prepared.iter().filter(|p| p.degraded).count();
        if degraded > 0 {
            warn!(job_id = %id, degraded, "some inputs were rendered text-only");
        }

        let artifact_dir = &self.inner.config.storage.artifact_dir;
        tokio::fs::create_dir_all(artifact_dir).await?;
        let target = artifact_dir.join(format!("{id}.pdf"));

        let mut prepared = prepared;
        if prepared.len() == 1 {
            let Some(only) = prepared.pop() else {
                return Err(KioskError::Merge("nothing to print".into()));
            };
            return match only.scratch {
                Some(scratch) => {
                    promote(scratch, &target).await?;
                    Ok(target)
                }
                None => Ok(only.pdf_path),
            };
        }

        let paths: Vec<PathBuf> = prepared.iter().map(|p| p.pdf_path.clone()).collect();
        let merger = self.inner.merger;
        let output = target.clone();
        let timeout = self.inner.config.conversion.timeout();

        let mut merge = tokio::task::spawn_blocking(move || merger.merge(&paths, &output));
        let merged = match tokio::time::timeout(timeout, &mut merge).await {
            Ok(joined) => {
                joined.map_err(|e| KioskError::Merge(format!("merge task failed: {e}")))??
            }
            Err(_) => {
                discard_late_merge(*id, merge);
                return Err(KioskError::Merge(format!(
                    "merge timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        // Intermediates go as soon as the merge has succeeded.
        drop(prepared);
        info!(job_id = %id, artifact = %merged.display(), "inputs merged");
        Ok(merged)
    }

    async fn dispatch(&self, options: &PrintOptions, artifact: &Path) -> Result<JobHandle> {
        let printer = self.target_printer().await?;
        let request = DispatchRequest::new(artifact, printer, options);
        let timeout = self.inner.config.print.dispatch_timeout();

        tokio::time::timeout(timeout, self.inner.backend.print_file(&request))
            .await
            .map_err(|_| {
                KioskError::PrintDispatch(format!(
                    "no answer from {} backend after {}s",
                    self.inner.backend.name(),
                    timeout.as_secs()
                ))
            })?
    }

    /// Configured printer, else the directory's first entry, else `None`
    /// for the OS default.
    async fn target_printer(&self) -> Result<Option<String>> {
        if let Some(name) = &self.inner.config.print.printer_name {
            return Ok(Some(name.clone()));
        }
        match &self.inner.directory {
            Some(directory) => Ok(directory.printers().await?.into_iter().next()),
            None => Ok(None),
        }
    }
}

/// A blocking merge cannot be interrupted. Once an abandoned one finishes,
/// remove whatever it wrote so a failed job leaves no artifact behind.
fn discard_late_merge(id: JobId, merge: tokio::task::JoinHandle<Result<PathBuf>>) {
    tokio::spawn(async move {
        if let Ok(Ok(late)) = merge.await {
            match tokio::fs::remove_file(&late).await {
                Ok(()) => warn!(job_id = %id, path = %late.display(), "removed artifact of timed-out merge"),
                Err(e) => error!(job_id = %id, path = %late.display(), error = %e, "cannot remove artifact of timed-out merge"),
            }
        }
    });
}

/// Move a scratch PDF to its final location. If the rename crosses file
/// systems the file is copied and the scratch copy removed.
async fn promote(scratch: ScratchFile, target: &Path) -> Result<()> {
    match tokio::fs::rename(scratch.path(), target).await {
        Ok(()) => {
            scratch.keep();
        }
        Err(_) => {
            tokio::fs::copy(scratch.path(), target).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::directory::StaticDirectory;
    use printkiosk_core::types::DocumentType;
    use printkiosk_core::PaperSize;
    use printkiosk_document::{PdfReader, PdfWriter, WordRenderer};
    use printkiosk_print::SimulatedBackend;

    const WAIT: Duration = Duration::from_secs(20);

    #[derive(Clone, Default)]
    struct RecordingBackend {
        requests: Arc<Mutex<Vec<DispatchRequest>>>,
        failure: Option<fn() -> KioskError>,
    }

    impl RecordingBackend {
        fn rejecting() -> Self {
            Self {
                failure: Some(|| KioskError::PrintDispatch("spooler rejected the job".into())),
                ..Self::default()
            }
        }

        fn without_printer() -> Self {
            Self {
                failure: Some(|| KioskError::NoPrinterAvailable),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<DispatchRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl PrintBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn list_printers(&self) -> Result<Vec<String>> {
            Ok(vec!["Recorder".into()])
        }

        async fn print_file(&self, request: &DispatchRequest) -> Result<JobHandle> {
            self.requests.lock().expect("lock").push(request.clone());
            if let Some(failure) = self.failure {
                return Err(failure());
            }
            Ok(JobHandle {
                printer: request.printer.clone().unwrap_or_else(|| "Recorder".into()),
                spool_id: Some("Recorder-1".into()),
                simulated: false,
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config: KioskConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let config = KioskConfig::default().rooted_at(dir.path());
            Self { dir, config }
        }

        fn orchestrator<B: PrintBackend + 'static>(&self, backend: B) -> Orchestrator<B> {
            self.orchestrator_with(backend, None)
        }

        fn orchestrator_with<B: PrintBackend + 'static>(
            &self,
            backend: B,
            directory: Option<Arc<dyn PrinterDirectory>>,
        ) -> Orchestrator<B> {
            let converter = FormatConverter::new(&self.config.conversion, WordRenderer::TextOnly);
            Orchestrator::new(
                self.config.clone(),
                converter,
                backend,
                Arc::new(MemoryJobStore::new()),
                StatusBroadcaster::new(16),
                directory,
            )
        }

        fn upload(&self, name: &str, bytes: &[u8], mime: &str) -> InputFile {
            let uploads = self.dir.path().join("uploads");
            std::fs::create_dir_all(&uploads).expect("uploads dir");
            let path = uploads.join(name);
            std::fs::write(&path, bytes).expect("write upload");
            InputFile::new(path, mime, bytes.len() as u64)
        }

        fn pdf(&self, name: &str, text: &str) -> InputFile {
            let bytes = PdfWriter::new(PaperSize::A4)
                .create_from_text(text)
                .expect("pdf");
            self.upload(name, &bytes, "application/pdf")
        }

        fn png(&self, name: &str) -> InputFile {
            let image = image::RgbaImage::from_pixel(30, 20, image::Rgba([0, 128, 0, 200]));
            let mut bytes = Vec::new();
            image
                .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
                .expect("encode png");
            self.upload(name, &bytes, "image/png")
        }

        fn docx(&self, name: &str, document_xml: &str) -> InputFile {
            let mut bytes = Vec::new();
            {
                let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut bytes));
                zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                    .expect("start");
                zip.write_all(document_xml.as_bytes()).expect("write");
                zip.finish().expect("finish");
            }
            self.upload(name, &bytes, DocumentType::DOCX_MIME)
        }

        fn scratch_entries(&self) -> usize {
            match std::fs::read_dir(&self.config.conversion.scratch_dir) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            }
        }

        fn artifact_entries(&self) -> usize {
            match std::fs::read_dir(&self.config.storage.artifact_dir) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            }
        }
    }

    fn drain(sub: &mut Subscription) -> Vec<JobStatus> {
        let mut seen = Vec::new();
        while let Some(event) = sub.try_recv() {
            seen.push(event.status);
        }
        seen
    }

    const FORWARD: [JobStatus; 5] = [
        JobStatus::Uploaded,
        JobStatus::Queued,
        JobStatus::Converting,
        JobStatus::Printing,
        JobStatus::Completed,
    ];

    #[tokio::test]
    async fn single_pdf_completes_with_all_timestamps_in_order() {
        let fx = Fixture::new();
        let backend = RecordingBackend::default();
        let orchestrator = fx.orchestrator(backend.clone());
        let input = fx.pdf("letter.pdf", "Dear customer");

        let id = orchestrator
            .submit(vec![input.clone()], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.history(), FORWARD.to_vec());
        assert!(
            job.timestamps
                .windows(2)
                .all(|pair| pair[0].entered_at <= pair[1].entered_at)
        );
        // A lone PDF is printed as uploaded.
        assert_eq!(job.artifact_path.as_deref(), Some(input.path.as_path()));
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(fx.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn corrupt_docx_fails_with_conversion_error_before_printing() {
        let fx = Fixture::new();
        let backend = RecordingBackend::default();
        let orchestrator = fx.orchestrator(backend.clone());
        let input = fx.docx(
            "broken.docx",
            "<w:document><w:body><w:p><w:t>unterminated</w:body></w:document>",
        );

        let id = orchestrator
            .submit(vec![input], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(!job.history().contains(&JobStatus::Printing));
        let detail = job.error_detail.expect("detail");
        assert!(detail.starts_with("ConversionError"), "{detail}");
        assert!(backend.requests().is_empty());
        assert_eq!(fx.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn three_observers_each_see_five_events_for_two_input_job() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(RecordingBackend::default());
        let mut observers = [
            orchestrator.subscribe(),
            orchestrator.subscribe(),
            orchestrator.subscribe(),
        ];

        let id = orchestrator
            .submit(
                vec![fx.pdf("cover.pdf", "Cover"), fx.png("photo.png")],
                PrintOptions::default(),
            )
            .await
            .expect("submit");

        for observer in observers.iter_mut() {
            let mut events = Vec::new();
            while let Some(event) = observer.try_recv() {
                assert_eq!(event.job_id, id);
                events.push(event.status);
            }
            assert_eq!(events, FORWARD.to_vec());
        }

        let job = orchestrator.status(&id).await.expect("status");
        let artifact = job.artifact_path.expect("artifact");
        assert!(artifact.starts_with(&fx.config.storage.artifact_dir));
        assert_eq!(PdfReader::open(&artifact).expect("artifact pdf").page_count(), 2);
        assert_eq!(fx.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn dropping_an_observer_mid_job_leaves_others_untouched() {
        let mut fx = Fixture::new();
        fx.config.print.synchronous_dispatch = false;
        let orchestrator = fx.orchestrator(SimulatedBackend::new(Duration::from_millis(100)));

        let mut stays = orchestrator.subscribe();
        let leaves = orchestrator.subscribe();

        let id = orchestrator
            .submit(vec![fx.pdf("a.pdf", "A")], PrintOptions::default())
            .await
            .expect("submit");

        let mut seen = Vec::new();
        let mut leaves = Some(leaves);
        tokio::time::timeout(WAIT, async {
            while let Some(event) = stays.recv().await {
                seen.push(event.status);
                if event.status == JobStatus::Printing {
                    leaves.take();
                }
                if event.status.is_terminal() {
                    break;
                }
            }
        })
        .await
        .expect("job finished in time");

        assert_eq!(seen, FORWARD.to_vec());
        assert_eq!(orchestrator.broadcaster().subscriber_count(), 1);
        assert_eq!(
            orchestrator.status(&id).await.expect("status").status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn merge_failure_cleans_intermediates_and_leaves_no_artifact() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(RecordingBackend::default());
        let truncated = fx.upload("truncated.pdf", b"%PDF-1.4\n1 0 obj\n<<", "application/pdf");

        let id = orchestrator
            .submit(vec![fx.png("photo.png"), truncated], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_detail.expect("detail").starts_with("MergeError"));
        assert_eq!(job.artifact_path, None);
        assert_eq!(fx.scratch_entries(), 0);
        assert_eq!(fx.artifact_entries(), 0);
    }

    #[tokio::test]
    async fn mismatched_content_fails_validation_before_queueing() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(RecordingBackend::default());
        let mut sub = orchestrator.subscribe();
        let mut disguised = fx.png("really-a-png.pdf");
        disguised.declared_mime = "application/pdf".into();

        let id = orchestrator
            .submit(vec![disguised], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.history(), vec![JobStatus::Uploaded, JobStatus::Failed]);
        assert!(job.error_detail.expect("detail").starts_with("ValidationError"));
        assert_eq!(drain(&mut sub), vec![JobStatus::Uploaded, JobStatus::Failed]);
    }

    #[tokio::test]
    async fn oversized_input_fails_validation() {
        let mut fx = Fixture::new();
        fx.config.intake.max_file_size_bytes = 16;
        let orchestrator = fx.orchestrator(RecordingBackend::default());

        let id = orchestrator
            .submit(vec![fx.pdf("big.pdf", "more than sixteen bytes")], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");
        assert!(job.error_detail.expect("detail").starts_with("ValidationError"));
    }

    #[tokio::test]
    async fn structurally_invalid_submission_creates_no_job() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(RecordingBackend::default());
        let mut sub = orchestrator.subscribe();

        let empty = orchestrator.submit(Vec::new(), PrintOptions::default()).await;
        assert!(matches!(empty, Err(KioskError::Validation(_))));

        let too_many = PrintOptions {
            copies: 101,
            ..PrintOptions::default()
        };
        let result = orchestrator.submit(vec![fx.pdf("a.pdf", "A")], too_many).await;
        assert!(matches!(result, Err(KioskError::Validation(_))));
        assert!(drain(&mut sub).is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_keeps_artifact_file_but_not_path() {
        let fx = Fixture::new();
        let backend = RecordingBackend::rejecting();
        let orchestrator = fx.orchestrator(backend.clone());

        let id = orchestrator
            .submit(
                vec![fx.pdf("a.pdf", "A"), fx.pdf("b.pdf", "B")],
                PrintOptions::default(),
            )
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.history().contains(&JobStatus::Printing));
        assert!(job.error_detail.expect("detail").starts_with("PrintDispatchError"));
        assert_eq!(job.artifact_path, None);
        assert!(fx.config.storage.artifact_dir.join(format!("{id}.pdf")).exists());
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn no_printer_available_fails_after_printing() {
        let fx = Fixture::new();
        let backend = RecordingBackend::without_printer();
        let orchestrator = fx.orchestrator(backend.clone());
        let mut sub = orchestrator.subscribe();

        let id = orchestrator
            .submit(vec![fx.pdf("a.pdf", "A")], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.history(),
            vec![
                JobStatus::Uploaded,
                JobStatus::Queued,
                JobStatus::Converting,
                JobStatus::Printing,
                JobStatus::Failed,
            ]
        );
        let detail = job.error_detail.expect("detail");
        assert!(detail.starts_with("NoPrinterAvailable"), "{detail}");
        assert_eq!(drain(&mut sub).last(), Some(&JobStatus::Failed));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn single_image_is_promoted_into_artifact_dir() {
        let fx = Fixture::new();
        let backend = RecordingBackend::default();
        let orchestrator = fx.orchestrator(backend.clone());

        let id = orchestrator
            .submit(vec![fx.png("photo.png")], PrintOptions::default())
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Completed);
        let expected = fx.config.storage.artifact_dir.join(format!("{id}.pdf"));
        assert_eq!(job.artifact_path.as_deref(), Some(expected.as_path()));
        assert_eq!(PdfReader::open(&expected).expect("artifact pdf").page_count(), 1);
        assert_eq!(backend.requests()[0].path, expected);
        assert_eq!(fx.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn timed_out_merge_leaves_no_artifact_behind() {
        let mut fx = Fixture::new();
        fx.config.conversion.timeout_secs = 0;
        let backend = RecordingBackend::default();
        let orchestrator = fx.orchestrator(backend.clone());
        let long_text = "A line of filler text for a long document.\n".repeat(20_000);

        let id = orchestrator
            .submit(
                vec![fx.pdf("a.pdf", &long_text), fx.pdf("b.pdf", &long_text)],
                PrintOptions::default(),
            )
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");

        assert_eq!(job.status, JobStatus::Failed);
        let detail = job.error_detail.expect("detail");
        assert!(detail.starts_with("MergeError"), "{detail}");
        assert!(detail.contains("timed out"), "{detail}");
        assert_eq!(job.artifact_path, None);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn late_merge_output_is_removed() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("late.pdf");
        let finished = Arc::new(AtomicBool::new(false));
        let (release, gate) = std::sync::mpsc::channel::<()>();

        let merge = {
            let target = target.clone();
            let finished = finished.clone();
            tokio::task::spawn_blocking(move || -> Result<PathBuf> {
                gate.recv().map_err(|e| KioskError::Merge(e.to_string()))?;
                std::fs::write(&target, b"%PDF-1.4\n%%EOF\n")?;
                finished.store(true, Ordering::SeqCst);
                Ok(target)
            })
        };
        discard_late_merge(JobId::new(), merge);
        release.send(()).expect("release merge");

        tokio::time::timeout(WAIT, async {
            while !finished.load(Ordering::SeqCst) || target.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("late artifact removed");
    }

    #[tokio::test]
    async fn parallel_conversion_keeps_input_order() {
        let mut fx = Fixture::new();
        fx.config.conversion.parallel = true;
        let orchestrator = fx.orchestrator(RecordingBackend::default());
        let first = fx.pdf("first.pdf", "first");
        let last = fx.pdf("last.pdf", "last");

        let id = orchestrator
            .submit(
                vec![first.clone(), fx.png("middle.png"), last.clone()],
                PrintOptions::default(),
            )
            .await
            .expect("submit");
        let job = orchestrator.status(&id).await.expect("status");
        let merged = PdfReader::open(job.artifact_path.expect("artifact")).expect("open");

        assert_eq!(merged.page_count(), 3);
        let first_page = PdfReader::open(&first.path).expect("first").page_content(1).expect("p");
        let last_page = PdfReader::open(&last.path).expect("last").page_content(1).expect("p");
        assert_eq!(merged.page_content(1).expect("p1"), first_page);
        assert_eq!(merged.page_content(3).expect("p3"), last_page);
        assert_eq!(fx.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn detached_submission_returns_before_completion() {
        let mut fx = Fixture::new();
        fx.config.print.synchronous_dispatch = false;
        let orchestrator = fx.orchestrator(SimulatedBackend::new(Duration::from_millis(200)));
        let mut sub = orchestrator.subscribe();

        let id = orchestrator
            .submit(vec![fx.pdf("a.pdf", "A")], PrintOptions::default())
            .await
            .expect("submit");
        assert!(!orchestrator.status(&id).await.expect("status").status.is_terminal());

        tokio::time::timeout(WAIT, async {
            while let Some(event) = sub.recv().await {
                if event.status.is_terminal() {
                    break;
                }
            }
        })
        .await
        .expect("job finished in time");
        assert_eq!(
            orchestrator.status(&id).await.expect("status").status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn printer_comes_from_config_then_directory() {
        let mut fx = Fixture::new();
        let backend = RecordingBackend::default();
        let directory: Arc<dyn PrinterDirectory> = Arc::new(StaticDirectory::new(["Lobby", "Back"]));
        let orchestrator = fx.orchestrator_with(backend.clone(), Some(directory.clone()));

        orchestrator
            .submit(vec![fx.pdf("a.pdf", "A")], PrintOptions::default())
            .await
            .expect("submit");
        assert_eq!(backend.requests()[0].printer.as_deref(), Some("Lobby"));
        assert_eq!(
            orchestrator.list_printers().await.expect("printers"),
            vec!["Lobby".to_string(), "Back".to_string()]
        );

        fx.config.print.printer_name = Some("Front_Desk".into());
        let pinned_backend = RecordingBackend::default();
        let pinned = fx.orchestrator_with(pinned_backend.clone(), Some(directory));
        pinned
            .submit(vec![fx.pdf("b.pdf", "B")], PrintOptions::default())
            .await
            .expect("submit");
        assert_eq!(pinned_backend.requests()[0].printer.as_deref(), Some("Front_Desk"));
    }

    #[tokio::test]
    async fn print_options_reach_the_backend() {
        let fx = Fixture::new();
        let backend = RecordingBackend::default();
        let orchestrator = fx.orchestrator(backend.clone());
        let options = PrintOptions {
            copies: 4,
            color_mode: printkiosk_core::types::ColorMode::Color,
            page_range: Some(printkiosk_core::types::PageRange::parse("1").expect("range")),
        };

        orchestrator
            .submit(vec![fx.pdf("a.pdf", "A")], options.clone())
            .await
            .expect("submit");
        let request = &backend.requests()[0];
        assert_eq!(request.copies, 4);
        assert_eq!(request.color_mode, options.color_mode);
        assert_eq!(request.page_range, options.page_range);
    }

    #[tokio::test]
    async fn concurrent_jobs_all_complete() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(RecordingBackend::default());

        let mut tasks = JoinSet::new();
        for i in 0..5 {
            let orchestrator = orchestrator.clone();
            let inputs = vec![fx.pdf(&format!("p{i}.pdf"), "page"), fx.png(&format!("i{i}.png"))];
            tasks.spawn(async move { orchestrator.submit(inputs, PrintOptions::default()).await });
        }

        let mut ids = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            ids.push(joined.expect("join").expect("submit"));
        }
        for id in ids {
            assert_eq!(
                orchestrator.status(&id).await.expect("status").status,
                JobStatus::Completed
            );
        }
        assert_eq!(fx.artifact_entries(), 5);
        assert_eq!(fx.scratch_entries(), 0);
    }
}
