//! Channel-backed async logger.
//!
//! Menu programs talk to the operator on stdout; the logger keeps a parallel
//! timestamped record on disk for post-mortems. A background task drains an
//! mpsc channel and writes to the log file, so callers never block on I/O.

use crate::err::Result;
use crate::global_var::{DEBUG_MODE, LOGGER_CELL};
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Cloning creates another sender handle onto the same log file.
#[derive(Clone, Debug)]
pub struct AsyncLogger {
    tx: mpsc::Sender<LogRecord>,
}

impl AsyncLogger {
    fn log<S: Into<String>>(&self, level: LogLevel, msg: S) {
        if let Err(err) = self.tx.try_send(LogRecord::new(level, msg.into())) {
            eprintln!("Failed to send log message: {}", err);
        }
    }

    /// Request the logger task to flush and shut down.
    pub async fn shutdown(&self) {
        // Ignore send error (e.g., task already closed)
        let _ = self.tx.send(LogRecord::Shutdown).await;
    }

    pub fn trace<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Trace, msg);
    }
    pub fn debug<S: Into<String>>(&self, msg: S) {
        if *DEBUG_MODE {
            self.log(LogLevel::Debug, msg);
        }
    }
    pub fn info<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Info, msg);
    }
    pub fn warn<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Warn, msg);
    }
    pub fn error<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Error, msg);
    }
}

#[derive(Debug)]
enum LogRecord {
    Message {
        level: LogLevel,
        msg: String,
        ts_millis: i64,
    },
    Shutdown,
}

impl LogRecord {
    fn new(level: LogLevel, msg: String) -> Self {
        Self::Message {
            level,
            msg,
            ts_millis: Utc::now().timestamp_millis(),
        }
    }

    fn format_line(&self) -> Option<String> {
        match self {
            LogRecord::Message {
                level,
                msg,
                ts_millis,
            } => {
                let dt = DateTime::from_timestamp_millis(*ts_millis).unwrap_or_else(Utc::now);
                let ts = dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
                Some(format!("{} [{}] {}\n", ts, level, msg))
            }
            LogRecord::Shutdown => None,
        }
    }
}

/// Open (or create) the log file and start the writer task. Dropping the last
/// logger handle closes the channel and lets the task drain and exit.
pub async fn init_file_logger<P: AsRef<Path>>(path: P) -> Result<(AsyncLogger, JoinHandle<()>)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .await?;

    let (tx, mut rx) = mpsc::channel::<LogRecord>(1024);
    let writer = Mutex::new(BufWriter::new(file));

    let task = tokio::spawn(async move {
        while let Some(rec) = rx.recv().await {
            match rec.format_line() {
                Some(line) => {
                    let mut w = writer.lock().await;
                    let _ = w.write_all(line.as_bytes()).await;
                    let _ = w.flush().await;
                }
                None => break,
            }
        }
        let mut w = writer.lock().await;
        let _ = w.flush().await;
    });

    Ok((AsyncLogger { tx }, task))
}

pub struct Logger;

impl Deref for Logger {
    type Target = AsyncLogger;
    fn deref(&self) -> &Self::Target {
        if let Some(l) = LOGGER_CELL.get() {
            return l;
        }
        #[cfg(test)]
        {
            // Lazily install a no-op fallback so unit tests can call
            // LOGGER.*() without initializing the real logger.
            let _ = LOGGER_CELL.set(test_fallback_logger());
            return LOGGER_CELL
                .get()
                .expect("LOGGER_CELL should be set by test fallback");
        }
        #[cfg(not(test))]
        LOGGER_CELL.get().expect("LOGGER_CELL should be set")
    }
}

#[cfg(test)]
fn test_fallback_logger() -> AsyncLogger {
    // Leak the receiver to keep the channel alive without a runtime.
    let (tx, rx) = mpsc::channel::<LogRecord>(1024);
    let _ = Box::leak(Box::new(rx));
    AsyncLogger { tx }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, LogRecord, init_file_logger};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_path(name: &str) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let mut p = std::env::temp_dir();
        p.push(format!("{}_{}_{}.log", name, std::process::id(), millis));
        p
    }

    struct TempFileGuard(PathBuf);
    impl TempFileGuard {
        fn new<P: AsRef<Path>>(path: P) -> Self {
            Self(path.as_ref().to_path_buf())
        }
    }
    impl Drop for TempFileGuard {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    #[tokio::test]
    async fn file_logger_writes_levelled_lines() {
        let path = unique_temp_path("doc_sync_logger_lines");
        let _guard = TempFileGuard::new(&path);
        let (logger, task) = init_file_logger(&path).await.expect("init logger");

        logger.info("coordinator up");
        logger.warn("semaphore slow");
        logger.error("document gone");

        drop(logger);
        task.await.expect("logger task join");

        let content = fs::read_to_string(&path).expect("read log file");
        assert!(content.contains("[INFO ] coordinator up"), "{}", content);
        assert!(content.contains("[WARN ] semaphore slow"), "{}", content);
        assert!(content.contains("[ERROR] document gone"), "{}", content);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn format_line_is_rfc3339_stamped() {
        let rec = LogRecord::Message {
            level: LogLevel::Info,
            msg: "xyz".into(),
            ts_millis: 0,
        };
        let line = rec.format_line().expect("message formats");
        assert!(line.starts_with("1970-01-01T00:00:00.000Z"));
        assert!(line.contains("[INFO ] xyz"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn shutdown_record_formats_to_none() {
        assert!(LogRecord::Shutdown.format_line().is_none());
    }
}
