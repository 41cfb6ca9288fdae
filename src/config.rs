//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::session::SessionSettings;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Records the default input device as webm/opus on stdout
const DEFAULT_RECORDER: &[&str] = &[
    "ffmpeg",
    "-hide_banner",
    "-loglevel",
    "error",
    "-f",
    "pulse",
    "-i",
    "default",
    "-c:a",
    "libopus",
    "-f",
    "webm",
    "-",
];

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the translation service
    pub server_url: String,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Persisted history and preferences
    pub store_path: PathBuf,

    /// Recorder command line, program first
    pub recorder: Vec<String>,

    pub session: SessionSettings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("SYLHETI_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("sylheti-session")
            }
        };

        let server_url = lookup("SYLHETI_SERVER_URL")
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut session = SessionSettings::default();
        if let Some(secs) = lookup("SYLHETI_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("invalid SYLHETI_REQUEST_TIMEOUT_SECS: {secs:?}"))?;
            session.request_timeout = Duration::from_secs(secs);
        }

        let recorder = match lookup("SYLHETI_RECORDER") {
            Some(command) => command.split_whitespace().map(str::to_string).collect(),
            None => DEFAULT_RECORDER.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            server_url,
            socket_path: data_dir.join("session.sock"),
            store_path: data_dir.join("state.json"),
            data_dir,
            recorder,
            session,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}
