//! JSON-lines bridge between the job supervisor and an out-of-process
//! observer.
//!
//! Each input line is a request:
//!
//! ```json
//! {"id": 1, "method": "start", "params": {"operation": "convert", "input": "a.mov", "output": "a.mp4"}}
//! ```
//!
//! and gets exactly one response line, `{"id":1,"ok":true,"result":...}` or
//! `{"id":1,"ok":false,"error":{"kind":"busy","message":"..."}}`. Job events
//! are pushed unsolicited as `{"event":{...}}`. All output goes through a
//! single writer task, so lines never interleave.
//!
//! Events reach the bridge over the bus's broadcast channel, which holds
//! `events.capacity` entries. An observer that falls further behind than
//! that loses the oldest events and is sent `{"lagged":N}` in their place;
//! `recent_events` can be used to catch up.

use std::path::PathBuf;

use rf_core::events::Event;
use rf_core::{Error, JobRequest, Result};
use rf_jobs::JobSupervisor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Output lines buffered before request handlers wait on the writer.
const OUTPUT_BUFFER: usize = 256;

/// Default number of events returned by `recent_events`.
const DEFAULT_RECENT_EVENTS: usize = 100;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct EventFrame<'a> {
    event: &'a Event,
}

#[derive(Debug, Serialize)]
struct LagFrame {
    lagged: u64,
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecentParams {
    limit: Option<usize>,
}

impl Response {
    fn from_result(id: Value, result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                id,
                ok: false,
                result: None,
                error: Some(ErrorBody {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Serve requests from `input` until it closes, writing responses and events
/// to `output`.
///
/// When the input closes, a running job is stopped (its observer is gone),
/// in-flight requests are answered, and pending events are flushed before
/// returning. A failing `output` is not an error: lines are dropped.
pub async fn serve<R, W>(supervisor: JobSupervisor, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<String>(OUTPUT_BUFFER);
    let writer = tokio::spawn(write_lines(output, out_rx));

    let shutdown = CancellationToken::new();
    let forwarder = tokio::spawn(forward_events(
        supervisor.bus().subscribe(),
        out_tx.clone(),
        shutdown.clone(),
    ));

    let mut in_flight = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        reap_finished(&mut in_flight);
        let supervisor = supervisor.clone();
        let out_tx = out_tx.clone();
        in_flight.spawn(async move {
            let response = handle_line(&supervisor, &line).await;
            send_line(&out_tx, &response).await;
        });
    }

    tracing::info!("Observer input closed; shutting down bridge");
    while in_flight.join_next().await.is_some() {}
    supervisor.stop().await;

    shutdown.cancel();
    if let Err(e) = forwarder.await {
        tracing::warn!("Event forwarder failed: {e}");
    }
    drop(out_tx);
    if let Err(e) = writer.await {
        tracing::warn!("Bridge writer failed: {e}");
    }
    Ok(())
}

async fn handle_line(supervisor: &JobSupervisor, line: &str) -> Response {
    let raw: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Response::from_result(
                Value::Null,
                Err(Error::invalid(format!("malformed request: {e}"))),
            )
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: Request = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            return Response::from_result(id, Err(Error::invalid(format!("malformed request: {e}"))))
        }
    };

    tracing::debug!(method = %request.method, "Bridge request");
    let result = dispatch(supervisor, &request.method, request.params).await;
    if let Err(e) = &result {
        if e.is_rejection() {
            tracing::debug!(method = %request.method, "Request rejected: {e}");
        } else {
            tracing::warn!(method = %request.method, "Request failed: {e}");
        }
    }
    Response::from_result(request.id, result)
}

/// Drop handler tasks that have already answered.
fn reap_finished(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(e) = joined {
            tracing::warn!("Bridge request task failed: {e}");
        }
    }
}

async fn dispatch(supervisor: &JobSupervisor, method: &str, params: Value) -> Result<Value> {
    match method {
        "probe" => {
            let ProbeParams { path } = parse_params(params)?;
            to_json(&supervisor.probe(&path).await?)
        }
        "start" => {
            let request: JobRequest = parse_params(params)?;
            let job_id = supervisor.start(request)?;
            Ok(serde_json::json!({ "job_id": job_id }))
        }
        "stop" => {
            supervisor.stop().await;
            Ok(Value::Bool(true))
        }
        "is_busy" => Ok(Value::Bool(supervisor.is_busy())),
        "status" => to_json(&supervisor.status()),
        "host_status" => {
            let tools = supervisor.tools().clone();
            let status = tokio::task::spawn_blocking(move || crate::host::host_status(&tools))
                .await
                .map_err(|e| Error::Internal(format!("host status task failed: {e}")))?;
            to_json(&status)
        }
        "recent_events" => {
            let params: RecentParams = if params.is_null() {
                RecentParams::default()
            } else {
                parse_params(params)?
            };
            let limit = params.limit.unwrap_or(DEFAULT_RECENT_EVENTS);
            to_json(&supervisor.bus().recent_events(limit))
        }
        other => Err(Error::invalid(format!("unknown method '{other}'"))),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::invalid(format!("invalid params: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("serialization failed: {e}")))
}

async fn forward_events(
    mut events: broadcast::Receiver<Event>,
    out_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => send_line(&out_tx, &EventFrame { event: &event }).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Observer lagged; {n} events dropped");
                    send_line(&out_tx, &LagFrame { lagged: n }).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.cancelled() => {
                while let Ok(event) = events.try_recv() {
                    send_line(&out_tx, &EventFrame { event: &event }).await;
                }
                break;
            }
        }
    }
}

async fn send_line<T: Serialize>(out_tx: &mpsc::Sender<String>, value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => {
            if out_tx.send(line).await.is_err() {
                tracing::trace!("Bridge output closed; dropping line");
            }
        }
        Err(e) => tracing::error!("Failed to serialize bridge output: {e}"),
    }
}

async fn write_lines<W: AsyncWrite + Unpin>(mut output: W, mut lines: mpsc::Receiver<String>) {
    let mut healthy = true;
    while let Some(mut line) = lines.recv().await {
        if !healthy {
            continue;
        }
        line.push('\n');
        let written = match output.write_all(line.as_bytes()).await {
            Ok(()) => output.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!("Observer output failed ({e}); dropping further output");
            healthy = false;
        }
    }
}
