//! Append-only snapshot history with LIFO pop-and-restore.
//!
//! Records are framed as
//!
//! ```text
//! <start timestamp="YYYY-MM-DD HH:MM:SS">
//! <document bytes>
//! </end>
//! <blank line>
//! ```
//!
//! Push always writes a separator newline before `</end>` and pop strips
//! exactly one trailing newline from the captured content, so a pop restores
//! the pushed bytes whether or not the document ended in a newline.
//!
//! Mutations serialize on an exclusive advisory lock on the history file;
//! callers invoke push/pop only while they hold no document lock.

use crate::err::{CoordError, CoordErrorKind, Result};
use chrono::Local;
use fs2::FileExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::time::sleep;

const START_TAG: &[u8] = b"<start";
const END_TAG: &[u8] = b"</end>";

const LOCK_RETRIES: usize = 10;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

pub struct HistoryLog {
    history_path: PathBuf,
    document_path: PathBuf,
}

// The cause goes into the detail as well, so menu-level reports stay one line.
#[track_caller]
fn io_failed(context: &str, e: std::io::Error) -> crate::err::Error {
    let detail = format!("{}: {}", context, e);
    CoordError::with_source(CoordErrorKind::IoFailed, detail, e).into()
}

// First offset at or after `from` where `tag` begins a line.
fn find_line_start(bytes: &[u8], tag: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while pos + tag.len() <= bytes.len() {
        if (pos == 0 || bytes[pos - 1] == b'\n') && bytes[pos..].starts_with(tag) {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

fn last_line_start(bytes: &[u8], tag: &[u8]) -> Option<usize> {
    let mut last = None;
    let mut from = 0;
    while let Some(pos) = find_line_start(bytes, tag, from) {
        last = Some(pos);
        from = pos + 1;
    }
    last
}

impl HistoryLog {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(history_path: P, document_path: Q) -> Self {
        Self {
            history_path: history_path.as_ref().to_path_buf(),
            document_path: document_path.as_ref().to_path_buf(),
        }
    }

    /// Acquire the exclusive history lock, retrying briefly so concurrent
    /// pushes from two menus do not interleave frames.
    async fn lock_exclusive(&self, file: &std::fs::File) -> Result<()> {
        for _ in 0..LOCK_RETRIES {
            match FileExt::try_lock_exclusive(file) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    sleep(LOCK_RETRY_SLEEP).await;
                }
                Err(e) => return Err(io_failed("locking history file", e)),
            }
        }
        Err(io_failed(
            "locking history file",
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "lock held too long"),
        ))
    }

    /// Capture the document as it is right now into a new tail record.
    pub async fn push(&self) -> Result<()> {
        let doc = tokio::fs::read(&self.document_path)
            .await
            .map_err(|e| io_failed("reading document for push", e))?;

        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut frame = Vec::with_capacity(doc.len() + 64);
        frame.extend_from_slice(format!("<start timestamp=\"{}\">\n", ts).as_bytes());
        frame.extend_from_slice(&doc);
        frame.push(b'\n');
        frame.extend_from_slice(b"</end>\n\n");

        let file = std::fs::OpenOptions::new()
            .append(true)
            .read(true)
            .create(true)
            .open(&self.history_path)
            .map_err(|e| io_failed("opening history file", e))?;
        self.lock_exclusive(&file).await?;

        // Sync I/O on a locked std::fs::File; keep it off the runtime threads.
        tokio::task::spawn_blocking(move || -> Result<()> {
            use std::io::Write;
            let mut file = file;
            file.write_all(&frame)
                .map_err(|e| io_failed("appending history frame", e))?;
            file.flush().map_err(|e| io_failed("flushing history", e))?;
            Ok(())
        })
        .await
        .map_err(|e| -> crate::err::Error {
            CoordError::with_source(CoordErrorKind::IoFailed, "history writer task failed", e)
                .into()
        })??;
        Ok(())
    }

    /// Restore the most recent record into the document and drop it from the
    /// history.
    pub async fn pop(&self) -> Result<()> {
        let mut file = match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.history_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoordError::boxed(
                    CoordErrorKind::HistoryEmpty,
                    "no history file",
                ));
            }
            Err(e) => return Err(io_failed("opening history file", e)),
        };
        self.lock_exclusive(&file).await?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| io_failed("reading history file", e))?;

        let start_pos = last_line_start(&bytes, START_TAG).ok_or_else(|| {
            CoordError::boxed(CoordErrorKind::HistoryEmpty, "no snapshot records")
        })?;
        let header_end = bytes[start_pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| start_pos + i + 1)
            .ok_or_else(|| {
                CoordError::boxed(CoordErrorKind::HistoryCorrupt, "unterminated <start> line")
            })?;
        let end_pos = find_line_start(&bytes, END_TAG, header_end).ok_or_else(|| {
            CoordError::boxed(CoordErrorKind::HistoryCorrupt, "record without </end>")
        })?;

        let mut content = &bytes[header_end..end_pos];
        if let Some((&b'\n', rest)) = content.split_last() {
            content = rest;
        }

        tokio::fs::write(&self.document_path, content)
            .await
            .map_err(|e| io_failed("restoring document", e))?;

        // Rewrite the history without the tail record, via temp + rename so
        // a crash mid-write cannot lose the earlier records.
        let tmp_path = self
            .history_path
            .with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp_path, &bytes[..start_pos])
            .map_err(|e| io_failed("writing trimmed history", e))?;
        std::fs::rename(&tmp_path, &self.history_path)
            .map_err(|e| io_failed("replacing history file", e))?;
        Ok(())
    }

    /// Stream the history file unchanged; returns the bytes written. A
    /// missing file streams nothing.
    pub async fn list<W: AsyncWrite + Unpin>(&self, out: &mut W) -> Result<u64> {
        let mut file = match tokio::fs::File::open(&self.history_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_failed("opening history file", e)),
        };
        let copied = tokio::io::copy(&mut file, out)
            .await
            .map_err(|e| io_failed("streaming history", e))?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::error_kind;
    use std::fs;

    struct TempDirGuard(PathBuf);
    impl TempDirGuard {
        fn new(prefix: &str) -> Self {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let mut p = std::env::temp_dir();
            p.push(format!("{}_{}_{}", prefix, std::process::id(), nanos));
            fs::create_dir_all(&p).unwrap();
            TempDirGuard(p)
        }
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn setup(tmp: &TempDirGuard) -> (HistoryLog, PathBuf) {
        let doc = tmp.path().join("doc.txt");
        let hist = tmp.path().join("history.txt");
        (HistoryLog::new(&hist, &doc), doc)
    }

    #[tokio::test]
    async fn push_then_pop_round_trips_with_trailing_newline() {
        let tmp = TempDirGuard::new("hist_rt_nl");
        let (log, doc) = setup(&tmp);
        fs::write(&doc, "hello\n").unwrap();
        log.push().await.unwrap();
        fs::write(&doc, "changed\n").unwrap();
        log.pop().await.unwrap();
        assert_eq!(fs::read(&doc).unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn push_then_pop_round_trips_without_trailing_newline() {
        let tmp = TempDirGuard::new("hist_rt_raw");
        let (log, doc) = setup(&tmp);
        fs::write(&doc, "A").unwrap();
        log.push().await.unwrap();
        fs::write(&doc, "B").unwrap();
        log.pop().await.unwrap();
        assert_eq!(fs::read(&doc).unwrap(), b"A");
    }

    #[tokio::test]
    async fn stacked_pops_walk_back_through_states() {
        // Document goes A -> B -> C with a push before each change.
        let tmp = TempDirGuard::new("hist_stack");
        let (log, doc) = setup(&tmp);
        let hist = tmp.path().join("history.txt");

        fs::write(&doc, "A").unwrap();
        log.push().await.unwrap();
        fs::write(&doc, "B").unwrap();
        log.push().await.unwrap();
        fs::write(&doc, "C").unwrap();

        let two_records = fs::read(&hist).unwrap();

        log.pop().await.unwrap();
        assert_eq!(fs::read(&doc).unwrap(), b"B");
        // The first record is untouched by the pop.
        let one_record = fs::read(&hist).unwrap();
        assert!(two_records.starts_with(&one_record));
        assert_eq!(one_record.iter().filter(|&&b| b == b'<').count(), 2);

        log.pop().await.unwrap();
        assert_eq!(fs::read(&doc).unwrap(), b"A");
        assert!(fs::read(&hist).unwrap().is_empty());

        let err = log.pop().await.expect_err("empty history");
        assert_eq!(error_kind(&err), Some(CoordErrorKind::HistoryEmpty));
        assert_eq!(fs::read(&doc).unwrap(), b"A");
    }

    #[tokio::test]
    async fn pop_without_history_file_reports_empty() {
        let tmp = TempDirGuard::new("hist_missing");
        let (log, doc) = setup(&tmp);
        fs::write(&doc, "data").unwrap();
        let err = log.pop().await.expect_err("no file");
        assert_eq!(error_kind(&err), Some(CoordErrorKind::HistoryEmpty));
        assert_eq!(fs::read(&doc).unwrap(), b"data");
    }

    #[tokio::test]
    async fn truncated_record_reports_corrupt_and_leaves_document() {
        let tmp = TempDirGuard::new("hist_corrupt");
        let (log, doc) = setup(&tmp);
        let hist = tmp.path().join("history.txt");
        fs::write(&doc, "live").unwrap();
        fs::write(&hist, "<start timestamp=\"2026-01-01 00:00:00\">\npartial\n").unwrap();

        let err = log.pop().await.expect_err("corrupt");
        assert_eq!(error_kind(&err), Some(CoordErrorKind::HistoryCorrupt));
        assert_eq!(fs::read(&doc).unwrap(), b"live");
    }

    #[tokio::test]
    async fn list_streams_file_unchanged() {
        let tmp = TempDirGuard::new("hist_list");
        let (log, doc) = setup(&tmp);
        let hist = tmp.path().join("history.txt");

        let mut out = Vec::new();
        assert_eq!(log.list(&mut out).await.unwrap(), 0);

        fs::write(&doc, "snapshot me\n").unwrap();
        log.push().await.unwrap();

        let mut out = Vec::new();
        let n = log.list(&mut out).await.unwrap();
        assert_eq!(out, fs::read(&hist).unwrap());
        assert_eq!(n as usize, out.len());
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("<start timestamp=\""));
        assert!(text.contains("snapshot me"));
        assert!(text.ends_with("</end>\n\n"));
    }

    #[test]
    fn line_start_scanning_ignores_mid_line_tags() {
        let bytes = b"x<start\n<start a\nbody </end>\n</end>\n";
        // "<start" at offset 1 is mid-line; offset 8 begins a line.
        assert_eq!(last_line_start(bytes, START_TAG), Some(8));
        // "</end>" inside the body line does not count.
        assert_eq!(find_line_start(bytes, END_TAG, 17), Some(29));
    }
}
