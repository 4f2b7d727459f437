use super::types::RecordedEvent;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Appends recorded events to a JSONL file from a background task, so the
/// request path never blocks on disk I/O.
pub struct RecordingLogger {
    sender: mpsc::UnboundedSender<RecordedEvent>,
}

impl RecordingLogger {
    pub fn new(log_file_path: PathBuf) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = writer_task(log_file_path, receiver).await {
                error!("Recording writer task failed: {}", e);
            }
        });

        Ok(Self { sender })
    }

    pub fn record(&self, event: RecordedEvent) {
        if self.sender.send(event).is_err() {
            error!("Failed to queue recorded event: receiver dropped");
        }
    }

    /// Get a clone of the logger for use in middleware
    pub fn clone_for_middleware(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

async fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create recording log directory")?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .context("Failed to open recording log file")
}

async fn writer_task(
    log_file_path: PathBuf,
    mut receiver: mpsc::UnboundedReceiver<RecordedEvent>,
) -> Result<()> {
    let mut file = open_log_file(&log_file_path).await?;

    info!("Recording events to: {}", log_file_path.display());

    while let Some(event) = receiver.recv().await {
        if let Err(e) = write_event(&mut file, &event).await {
            error!("Failed to write recorded event: {}", e);
        }
    }

    info!("Recording writer task shutting down");

    Ok(())
}

/// One event per line, flushed immediately.
async fn write_event(file: &mut File, event: &RecordedEvent) -> Result<()> {
    let mut line = serde_json::to_vec(event).context("Failed to serialize event")?;
    line.push(b'\n');
    file.write_all(&line)
        .await
        .context("Failed to append to recording log")?;
    file.flush()
        .await
        .context("Failed to flush recording log")?;
    Ok(())
}
