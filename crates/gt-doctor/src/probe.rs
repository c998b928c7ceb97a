use crate::config::DoctorConfig;
use gt_core::Version;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Classification of one version probe. Each variant calls for a different
/// remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    NotFound,
    ExecFailed(String),
    Unknown(String),
    Ok(Version),
    TooOld { found: Version, minimum: Version },
}

/// Locates an external binary and checks its reported version.
#[derive(Debug, Clone)]
pub struct ToolProbe {
    pub binary: String,
    pub version_args: Vec<String>,
    pub minimum: Version,
    pub timeout: Duration,
}

impl Default for ToolProbe {
    fn default() -> Self {
        Self {
            binary: "dolt".to_string(),
            version_args: vec!["version".to_string()],
            minimum: Version::new(1, 82, 4),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ToolProbe {
    pub fn from_config(config: &DoctorConfig) -> Self {
        Self {
            binary: config.dolt_binary.clone(),
            minimum: config.min_dolt_version(),
            timeout: config.probe_timeout(),
            ..Self::default()
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.binary).ok()
    }

    /// Blocking entry point; drives the async probe on a private runtime.
    pub fn probe(&self) -> ProbeOutcome {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => return ProbeOutcome::ExecFailed(format!("runtime: {err}")),
        };
        runtime.block_on(self.probe_async())
    }

    pub async fn probe_async(&self) -> ProbeOutcome {
        let Some(path) = self.locate() else {
            return ProbeOutcome::NotFound;
        };
        debug!(event = "tool_probe", binary = %path.display());
        let mut command = Command::new(&path);
        command
            .args(&self.version_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return ProbeOutcome::ExecFailed(err.to_string()),
            Err(_) => {
                return ProbeOutcome::ExecFailed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs_f64()
                ))
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return ProbeOutcome::ExecFailed(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            });
        }
        self.classify(&stdout)
    }

    pub fn classify(&self, stdout: &str) -> ProbeOutcome {
        match Version::find_in(stdout) {
            Some(found) if found.at_least(&self.minimum) => ProbeOutcome::Ok(found),
            Some(found) => ProbeOutcome::TooOld {
                found,
                minimum: self.minimum,
            },
            None => ProbeOutcome::Unknown(stdout.lines().next().unwrap_or_default().trim().to_string()),
        }
    }
}
