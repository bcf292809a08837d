// Engine configuration with environment-variable overrides.
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Knobs for the execution engine. `Default` gives the production settings;
/// `from_env` lets a deployment override them without a config file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter used to run the per-attempt harness.
    pub interpreter: PathBuf,
    /// Extra wait beyond `timeout_seconds` before the supervisor force-kills.
    pub grace_period: Duration,
    /// Address-space/data-segment cap for the isolation process.
    /// `None` leaves the platform defaults in place.
    pub max_memory_bytes: Option<u64>,
    /// Cap on captured child stdout; excess is drained and discarded.
    pub max_output_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            grace_period: Duration::from_secs(1),
            max_memory_bytes: None,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl EngineConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// Reads `GAUNTLET_INTERPRETER`, `GAUNTLET_GRACE_SECONDS`,
    /// `GAUNTLET_MAX_MEMORY_MB` and `GAUNTLET_MAX_OUTPUT_BYTES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interpreter: std::env::var("GAUNTLET_INTERPRETER")
                .map(PathBuf::from)
                .unwrap_or(defaults.interpreter),
            grace_period: std::env::var("GAUNTLET_GRACE_SECONDS")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.grace_period),
            max_memory_bytes: std::env::var("GAUNTLET_MAX_MEMORY_MB")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .or(defaults.max_memory_bytes),
            max_output_bytes: std::env::var("GAUNTLET_MAX_OUTPUT_BYTES")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.max_output_bytes),
        }
    }

    /// Check that the configured interpreter can actually be launched.
    pub fn interpreter_available(&self) -> bool {
        Command::new(&self.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.interpreter, PathBuf::from("python3"));
        assert_eq!(config.grace_period, Duration::from_secs(1));
        assert!(config.max_memory_bytes.is_none());
        assert!(config.max_output_bytes > 0);
    }

    #[test]
    fn missing_interpreter_is_reported_unavailable() {
        let config = EngineConfig {
            interpreter: PathBuf::from("/nonexistent/interpreter-for-tests"),
            ..EngineConfig::default()
        };
        assert!(!config.interpreter_available());
    }
}
