//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which owns a temp directory holding a fake
//! `ffmpeg` shell script and an input file, plus a [`JobSupervisor`] wired to
//! them. [`TestHarness::with_bridge`] additionally runs the JSON-lines bridge
//! over an in-memory duplex pipe.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reelforge::bridge;
use rf_av::{ToolRegistry, FFMPEG};
use rf_core::config::Config;
use rf_core::events::EventBus;
use rf_jobs::JobSupervisor;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

/// Fake engine that reports three progress blocks and creates its output.
pub const CONVERTS: &str = r#"
echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s" >&2
for t in 2 5 8; do
  printf 'out_time=00:00:0%s.000000\ntotal_size=2097152\nspeed=1.5x\nprogress=continue\n' "$t" >&2
done
printf 'out_time=00:00:10.000000\nprogress=end\n' >&2
for last; do :; done
touch "$last"
"#;

/// Fake engine that reports once and then runs until killed.
pub const HANGS: &str = r#"
echo "  Duration: 00:01:00.00, start: 0.000000" >&2
printf 'out_time=00:00:01.000000\nprogress=continue\n' >&2
exec sleep 30
"#;

/// Fake engine that fails like ffmpeg does on a corrupt input.
pub const FAILS: &str = r#"
echo "in.mov: Invalid data found when processing input" >&2
exit 1
"#;

/// Write an executable `#!/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let script = dir.join(name);
    std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod script");
    script
}

pub struct TestHarness {
    pub dir: TempDir,
    pub ffmpeg: PathBuf,
    pub supervisor: JobSupervisor,
}

impl TestHarness {
    /// Create a harness whose ffmpeg runs `script`.
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ffmpeg = write_script(dir.path(), "ffmpeg", script);
        std::fs::write(dir.path().join("in.mov"), b"not really a movie")
            .expect("failed to write input");

        let tools = ToolRegistry::default().with_tool(FFMPEG, &ffmpeg);
        let supervisor =
            JobSupervisor::new(&Config::default(), tools, Arc::new(EventBus::default()));
        Self {
            dir,
            ffmpeg,
            supervisor,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Start the bridge on an in-memory pipe.
    pub fn with_bridge(script: &str) -> (Self, BridgeClient) {
        let harness = Self::new(script);
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);

        let supervisor = harness.supervisor.clone();
        let task = tokio::spawn(async move {
            bridge::serve(supervisor, BufReader::new(server_read), server_write)
                .await
                .expect("bridge failed");
        });

        let client = BridgeClient {
            writer: Some(client_write),
            lines: BufReader::new(client_read).lines(),
            task: Some(task),
        };
        (harness, client)
    }
}

/// Observer side of an in-memory bridge.
pub struct BridgeClient {
    writer: Option<WriteHalf<DuplexStream>>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    task: Option<JoinHandle<()>>,
}

impl BridgeClient {
    pub async fn send(&mut self, request: Value) {
        let writer = self.writer.as_mut().expect("input already closed");
        let mut line = request.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await.expect("write failed");
    }

    pub async fn send_raw(&mut self, line: &str) {
        let writer = self.writer.as_mut().expect("input already closed");
        writer.write_all(line.as_bytes()).await.expect("write failed");
        writer.write_all(b"\n").await.expect("write failed");
    }

    /// Next output line as JSON.
    pub async fn next(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await
            .expect("timed out waiting for bridge output")
            .expect("bridge read failed")
            .expect("bridge output closed");
        serde_json::from_str(&line).expect("bridge wrote invalid JSON")
    }

    /// Read lines until one matches, returning everything read.
    pub async fn until(&mut self, mut pred: impl FnMut(&Value) -> bool) -> Vec<Value> {
        let mut seen = Vec::new();
        loop {
            let v = self.next().await;
            let done = pred(&v);
            seen.push(v);
            if done {
                return seen;
            }
        }
    }

    /// Read until the response for `id` arrives and return it.
    pub async fn response(&mut self, id: u64) -> Value {
        let seen = self.until(|v| v["id"] == id).await;
        seen.into_iter().last().expect("no response")
    }

    /// Close the bridge input and wait for `serve` to return, collecting
    /// whatever it writes on the way out.
    pub async fn close(mut self) -> Vec<Value> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.ok();
        }
        let task = self.task.take().expect("bridge already closed");
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("bridge did not shut down")
            .expect("bridge task panicked");

        let mut rest = Vec::new();
        while let Ok(Some(line)) = self.lines.next_line().await {
            rest.push(serde_json::from_str(&line).expect("bridge wrote invalid JSON"));
        }
        rest
    }
}

/// The `payload.type` of an event frame, if `v` is one.
pub fn event_type(v: &Value) -> Option<&str> {
    v.get("event")?.get("payload")?.get("type")?.as_str()
}
