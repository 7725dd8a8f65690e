use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Byte offset of the first unread byte of a log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCursor {
    offset: u64,
}

impl LogCursor {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn advance(&mut self, bytes: usize) {
        self.offset += bytes as u64;
    }
}

/// Reads only what was appended to a log file since the previous read.
pub struct LogReader {
    path: PathBuf,
    cursor: LogCursor,
}

impl LogReader {
    /// A reader starting at the beginning of `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!("LogReader: {}", path.display());
        Self {
            path,
            cursor: LogCursor::default(),
        }
    }

    pub fn cursor(&self) -> LogCursor {
        self.cursor
    }

    /// Newly appended text, or `None` when nothing new is available.
    ///
    /// A file that does not exist yet counts as empty. An incomplete UTF-8
    /// sequence at the end is left unread until the rest of it arrives.
    pub async fn read_new(&mut self) -> std::io::Result<Option<String>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if file.metadata().await?.len() < self.cursor.offset {
            // Truncated underneath us; start over.
            self.cursor = LogCursor::default();
        }
        file.seek(SeekFrom::Start(self.cursor.offset)).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;

        let complete = complete_utf8_prefix(&bytes);
        if complete == 0 {
            return Ok(None);
        }
        self.cursor.advance(complete);
        Ok(Some(String::from_utf8_lossy(&bytes[..complete]).into_owned()))
    }
}

/// Length of `bytes` without a trailing, still incomplete UTF-8 sequence.
fn complete_utf8_prefix(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        // `error_len() == None` means the input ended mid-sequence.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => bytes.len(),
    }
}
