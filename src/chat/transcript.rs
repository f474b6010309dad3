use crate::Result;
use std::path::PathBuf;

/// Everything said in the room, replayed to newcomers and mirrored to disk.
#[derive(Debug, Default)]
pub struct Transcript {
    buffer: String,
    lines: u64,
    path: Option<PathBuf>,
}

impl Transcript {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Appends one line, adding the newline if missing, and returns its
    /// 1-based line number.
    pub fn append(&mut self, line: &str) -> u64 {
        self.buffer.push_str(line);
        if !line.ends_with('\n') {
            self.buffer.push('\n');
        }
        self.lines += 1;
        self.lines
    }

    /// Overwrites the backing file with the whole buffer.
    pub async fn flush(&self) -> Result<()> {
        if let Some(path) = &self.path {
            tokio::fs::write(path, self.buffer.as_bytes()).await?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> String {
        self.buffer.clone()
    }

    pub fn len(&self) -> u64 {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }
}
