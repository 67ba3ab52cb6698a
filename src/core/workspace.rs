//! Per-run workspace on disk.
//!
//! Every run gets its own directory under `{home}/runs/{run_id}/` so
//! crashed or concurrent runs never clobber each other's files. An
//! exclusive lock on `{home}/run.lock` keeps two runs from processing
//! the same window at once.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use fs2::FileExt;
use tracing::warn;
use uuid::Uuid;

/// Filesystem layout for one pipeline run.
pub struct RunWorkspace {
    /// Unique id of this run
    pub run_id: String,
    /// Root directory: `{home}/runs/{run_id}`
    pub root: PathBuf,
    recordings_dir: PathBuf,
    transcripts_dir: PathBuf,
    error_log: PathBuf,
    /// Exclusive run lock, released on drop
    _lock: File,
}

impl RunWorkspace {
    /// Create the workspace and take the run lock.
    ///
    /// Fails fast when another run already holds the lock.
    pub fn create(home: &Path) -> Result<Self> {
        std::fs::create_dir_all(home)
            .with_context(|| format!("Failed to create state directory: {}", home.display()))?;

        let lock_path = home.join("run.lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        lock.try_lock_exclusive().with_context(|| {
            format!(
                "Another run is already in progress (lock held on {})",
                lock_path.display()
            )
        })?;

        let run_id = Uuid::new_v4().to_string();
        let root = home.join("runs").join(&run_id);
        let recordings_dir = root.join("recordings");
        let transcripts_dir = root.join("transcripts");
        for dir in [&recordings_dir, &transcripts_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        Ok(Self {
            run_id,
            error_log: root.join("error.log"),
            root,
            recordings_dir,
            transcripts_dir,
            _lock: lock,
        })
    }

    /// Path for the nth downloaded recording (1-indexed).
    pub fn recording_path(&self, index: usize) -> PathBuf {
        self.recordings_dir.join(format!("recording_{}.mp3", index))
    }

    /// Path for a ticket's transcript file.
    pub fn transcript_path(&self, ticket_id: u64) -> PathBuf {
        self.transcripts_dir
            .join(format!("transcription_{}.txt", ticket_id))
    }

    /// Append a line to the run's error log.
    ///
    /// Logging must never bring down the run; failures here surface
    /// as warnings and are otherwise swallowed.
    pub fn log_error(&self, ticket_id: Option<u64>, message: &str) {
        if let Err(e) = self.append_error_line(ticket_id, message) {
            warn!(error = %e, "Failed to write error log");
        }
    }

    fn append_error_line(&self, ticket_id: Option<u64>, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error_log)
            .with_context(|| format!("Failed to open error log: {}", self.error_log.display()))?;

        // Acquire exclusive lock
        file.lock_exclusive()
            .context("Failed to acquire file lock on error.log")?;

        let scope = match ticket_id {
            Some(id) => format!("ticket {}", id),
            None => "run".to_string(),
        };
        writeln!(
            file,
            "{} [{}] {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            scope,
            message
        )?;
        file.flush()?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// Delete downloaded recordings, keeping transcripts and the log.
    pub fn remove_recordings(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.recordings_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove {}", self.recordings_dir.display()))
            }
        }
    }
}
