//! Single in-flight job supervisor.
//!
//! The supervisor owns one job slot behind a mutex. Admission (busy check,
//! request validation, output directory creation, emitting `started`) happens
//! entirely under that lock, so two concurrent `start` calls can never both
//! succeed. The job itself runs on a Tokio task that streams ffmpeg's stderr
//! through the [`ProgressParser`] and publishes events on the [`EventBus`].
//!
//! Phase transitions:
//!
//! ```text
//! Idle --start--> Running --exit 0-------------------> Idle  (completed)
//!                 Running --exit != 0 / I/O error----> Idle  (error)
//!                 Running --stop--> Completing --exit-> Idle  (stopped)
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use parking_lot::Mutex;
use rf_av::progress::is_progress_line;
use rf_av::{build_args, FfprobeProber, ProgressParser, StreamExit, ToolCommand, ToolRegistry, FFMPEG};
use rf_core::config::{Config, JobsConfig};
use rf_core::events::{EventBus, JobEvent};
use rf_core::{
    Error, JobId, JobOutcome, JobRequest, JobState, MediaInfo, Result, SupervisorStatus,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the job supervisor. Cheap to clone; all clones share one slot.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    tools: ToolRegistry,
    prober: FfprobeProber,
    bus: Arc<EventBus>,
    config: JobsConfig,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    state: JobState,
    job_id: Option<JobId>,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    last_outcome: Option<JobOutcome>,
}

impl JobSupervisor {
    pub fn new(config: &Config, tools: ToolRegistry, bus: Arc<EventBus>) -> Self {
        let prober = FfprobeProber::from_registry(&tools, &config.probe);
        Self {
            inner: Arc::new(Inner {
                tools,
                prober,
                bus,
                config: config.jobs.clone(),
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// The bus this supervisor publishes on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    /// Admit and launch a job. Must be called from within a Tokio runtime.
    ///
    /// On success the `started` event has already been published and exactly
    /// one terminal event will follow. Rejections publish nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if a job is running or stopping.
    /// - [`Error::InvalidRequest`] if the request is ill-formed.
    /// - [`Error::NotFound`] if an input does not exist.
    /// - [`Error::Tool`] if ffmpeg is not available.
    /// - [`Error::Io`] if the output directory cannot be created.
    pub fn start(&self, mut request: JobRequest) -> Result<JobId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("no async runtime: {e}")))?;

        if request.options.quality.is_none() {
            request.options.quality = Some(self.inner.config.default_quality);
        }

        let mut slot = self.inner.slot.lock();
        if slot.state != JobState::Idle {
            return Err(Error::Busy);
        }

        let args = build_args(&request)?;
        if let Some(missing) = request.inputs.iter().find(|p| !p.exists()) {
            return Err(Error::not_found("input", missing.display()));
        }
        let ffmpeg = self.inner.tools.require(FFMPEG)?.path.clone();
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let job_id = JobId::new();
        let cancel = CancellationToken::new();
        let mut cmd = ToolCommand::new(ffmpeg);
        cmd.args(args);

        tracing::info!(
            job_id = %job_id,
            operation = %request.operation,
            output = %request.output.display(),
            "Starting job"
        );
        self.inner.bus.broadcast(
            job_id,
            JobEvent::Started {
                command: cmd.command_line(),
            },
        );

        slot.state = JobState::Running;
        slot.job_id = Some(job_id);
        slot.cancel = Some(cancel.clone());
        let work = run_engine(
            Arc::clone(&self.inner.bus),
            self.inner.config.stderr_tail_lines,
            job_id,
            cmd,
            request.output,
            cancel,
        );
        slot.handle = Some(runtime.spawn(supervise(Arc::clone(&self.inner), job_id, work)));

        Ok(job_id)
    }

    /// Stop the running job and wait until the slot is idle again.
    ///
    /// A no-op when nothing is running (including while another `stop` is
    /// already in progress).
    pub async fn stop(&self) {
        let handle = {
            let mut slot = self.inner.slot.lock();
            if slot.state != JobState::Running {
                tracing::debug!("Stop requested with no running job");
                return;
            }
            slot.state = JobState::Completing;
            if let Some(cancel) = &slot.cancel {
                cancel.cancel();
            }
            slot.handle.take()
        };

        let Some(handle) = handle else {
            return;
        };
        if let Err(e) = handle.await {
            tracing::error!("Job worker failed: {e}");
            let mut slot = self.inner.slot.lock();
            if let Some(job_id) = slot.job_id.take() {
                self.inner.bus.broadcast(
                    job_id,
                    JobEvent::Error {
                        message: format!("job worker failed: {e}"),
                    },
                );
            }
            slot.state = JobState::Idle;
            slot.cancel = None;
            slot.last_outcome = Some(JobOutcome::Failed);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.slot.lock().state != JobState::Idle
    }

    pub fn status(&self) -> SupervisorStatus {
        let slot = self.inner.slot.lock();
        SupervisorStatus {
            state: slot.state,
            job_id: slot.job_id,
            last_outcome: slot.last_outcome,
        }
    }

    /// Inspect a media file. Independent of the job slot.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        self.inner.prober.inspect(path).await
    }
}

/// Drive `work` on its own task and publish its terminal event.
///
/// A panic inside `work` still ends the job with an `error` event and frees
/// the slot.
async fn supervise<F>(inner: Arc<Inner>, job_id: JobId, work: F)
where
    F: Future<Output = (JobEvent, JobOutcome)> + Send + 'static,
{
    let (payload, outcome) = match tokio::spawn(work).await {
        Ok(ended) => ended,
        Err(e) => (
            JobEvent::Error {
                message: Error::Internal(format!("job worker failed: {e}")).to_string(),
            },
            JobOutcome::Failed,
        ),
    };
    finish(&inner, job_id, payload, outcome);
}

/// Run ffmpeg to completion, streaming progress onto `bus`.
async fn run_engine(
    bus: Arc<EventBus>,
    tail_len: usize,
    job_id: JobId,
    cmd: ToolCommand,
    output: PathBuf,
    cancel: CancellationToken,
) -> (JobEvent, JobOutcome) {
    let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_len);
    let mut parser = ProgressParser::new();

    let result = cmd
        .execute_with_stderr_callback(
            |line| {
                if is_progress_line(line) {
                    if let Some(snapshot) = parser.feed_line(line) {
                        tracing::trace!(job_id = %job_id, percent = snapshot.percent, "Progress");
                        bus.broadcast(job_id, JobEvent::Progress(snapshot));
                    }
                    return;
                }

                parser.feed_line(line);
                let line = line.trim();
                if tail_len > 0 && !line.is_empty() {
                    if tail.len() == tail_len {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }
            },
            Some(cancel),
        )
        .await;

    match result {
        Ok(StreamExit::Cancelled) => (JobEvent::Stopped, JobOutcome::Stopped),
        Ok(StreamExit::Exited(status)) if status.success() => (
            JobEvent::Completed {
                output_path: output,
            },
            JobOutcome::Completed,
        ),
        Ok(StreamExit::Exited(status)) => (
            JobEvent::Error {
                message: Error::engine(failure_reason(&tail, status)).to_string(),
            },
            JobOutcome::Failed,
        ),
        Err(e) => (
            JobEvent::Error {
                message: e.to_string(),
            },
            JobOutcome::Failed,
        ),
    }
}

/// Publish the terminal event and free the slot.
fn finish(inner: &Inner, job_id: JobId, payload: JobEvent, outcome: JobOutcome) {
    let mut slot = inner.slot.lock();

    // A stop request always ends in `stopped`, even if the process beat the
    // kill signal.
    let (payload, outcome) = if slot.state == JobState::Completing {
        (JobEvent::Stopped, JobOutcome::Stopped)
    } else {
        (payload, outcome)
    };

    match &payload {
        JobEvent::Error { message } => {
            tracing::error!(job_id = %job_id, error = %message, "Job failed")
        }
        other => tracing::info!(job_id = %job_id, "Job {}", other.name()),
    }

    inner.bus.broadcast(job_id, payload);
    slot.state = JobState::Idle;
    slot.job_id = None;
    slot.cancel = None;
    slot.handle = None;
    slot.last_outcome = Some(outcome);
}

fn failure_reason(tail: &VecDeque<String>, status: ExitStatus) -> String {
    if tail.is_empty() {
        return format!("ffmpeg exited with {status}");
    }
    tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}
