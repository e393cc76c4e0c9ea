//! Host-status queries answered next to the job API.

use rf_av::{ToolInfo, ToolRegistry};
use serde::{Deserialize, Serialize};

/// Static facts about the running process plus engine availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStatus {
    pub app: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    /// Logical CPUs available to the process, if known.
    pub cpus: Option<usize>,
    pub tools: Vec<ToolInfo>,
}

impl HostStatus {
    /// Whether both ffmpeg and ffprobe were found.
    pub fn engine_ready(&self) -> bool {
        self.tools.iter().all(|t| t.available)
    }
}

/// Collect host status. Runs `-version` on each tool, so call it off the
/// async executor.
pub fn host_status(tools: &ToolRegistry) -> HostStatus {
    HostStatus {
        app: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: std::thread::available_parallelism().ok().map(|n| n.get()),
        tools: tools.check_all(),
    }
}
