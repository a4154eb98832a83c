use crate::error::{OverseerError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read the last `lines` lines of a log file.
///
/// A missing file reads as empty. `lines == 0` returns the whole file.
pub async fn read_last_lines(file_path: &Path, lines: usize) -> Result<Vec<String>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(file_path)
        .await
        .map_err(|e| OverseerError::LogFileError(format!("Failed to open log file: {}", e)))?;

    // Service output is arbitrary bytes; invalid UTF-8 is replaced, not fatal
    let mut all_lines = Vec::new();
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| OverseerError::LogError(format!("Failed to read log line: {}", e)))?;
        if read == 0 {
            break;
        }
        all_lines.push(decode_line(&buf));
    }

    if lines > 0 && all_lines.len() > lines {
        all_lines.drain(..all_lines.len() - lines);
    }

    Ok(all_lines)
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Live tail of a log file, starting at its current end
pub struct LogStream {
    receiver: mpsc::Receiver<String>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl LogStream {
    pub async fn follow(path: PathBuf) -> Result<Self> {
        let start = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(OverseerError::LogFileError(format!(
                    "Failed to stat log file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let (tx, rx) = mpsc::channel(100);
        let task_handle = tokio::spawn(async move {
            let mut tailer = LogTailer::new(path, start);
            loop {
                match tailer.read_next().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => sleep(FOLLOW_POLL_INTERVAL).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "log follow interrupted");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            receiver: rx,
            _task_handle: task_handle,
        })
    }

    /// Next complete line, or `None` once the tail has ended
    pub async fn next(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

struct LogTailer {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    position: u64,
    /// Bytes of a line whose newline has not been written yet
    pending: Vec<u8>,
}

impl LogTailer {
    fn new(path: PathBuf, position: u64) -> Self {
        Self {
            path,
            reader: None,
            position,
            pending: Vec::new(),
        }
    }

    async fn read_next(&mut self) -> Result<Option<String>> {
        // Truncated underneath us (logs cleared): start over from the top
        if let Ok(metadata) = tokio::fs::metadata(&self.path).await {
            if metadata.len() < self.position {
                self.position = 0;
                self.pending.clear();
                self.reader = None;
            }
        }

        if self.reader.is_none() {
            if !self.path.exists() {
                return Ok(None);
            }

            let file = File::open(&self.path).await.map_err(|e| {
                OverseerError::LogFileError(format!("Failed to open log file: {}", e))
            })?;
            let mut reader = BufReader::new(file);
            reader
                .seek(std::io::SeekFrom::Start(self.position))
                .await
                .map_err(|e| OverseerError::LogError(format!("Failed to seek in log file: {}", e)))?;
            self.reader = Some(reader);
        }

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        // Bytes accumulate until a newline, so a character split across
        // writes is only decoded once complete
        let read = reader
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(|e| OverseerError::LogError(format!("Failed to read log line: {}", e)))?;
        if read == 0 {
            return Ok(None);
        }
        self.position += read as u64;

        if self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }

        let line = decode_line(&self.pending);
        self.pending.clear();
        Ok(Some(line))
    }
}
