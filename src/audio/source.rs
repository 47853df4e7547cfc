use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Default upload chunk size in bytes
pub const DEFAULT_VOICE_CHUNK_SIZE: usize = 1024;

/// Recorded voice handed to the session, one chunk at a time
#[async_trait::async_trait]
pub trait VoiceSource: Send {
    /// Next chunk, or `None` once the recording is exhausted
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    fn name(&self) -> String;
}

/// Reads a recording file sequentially
pub struct FileVoiceSource {
    path: PathBuf,
    file: File,
    chunk_size: usize,
}

impl FileVoiceSource {
    pub async fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open voice file: {:?}", path))?;

        Ok(Self {
            path,
            file,
            chunk_size: chunk_size.max(1),
        })
    }
}

#[async_trait::async_trait]
impl VoiceSource for FileVoiceSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;

        // Fill the chunk completely unless the file ends
        while filled < chunk.len() {
            let n = self
                .file
                .read(&mut chunk[filled..])
                .await
                .with_context(|| format!("Failed to read voice file: {:?}", self.path))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        chunk.truncate(filled);
        Ok(Some(chunk))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Serves an in-memory recording
pub struct MemoryVoiceSource {
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
}

impl MemoryVoiceSource {
    pub fn new(data: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            position: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait::async_trait]
impl VoiceSource for MemoryVoiceSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }
        let end = (self.position + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }

    fn name(&self) -> String {
        format!("memory ({} bytes)", self.data.len())
    }
}
