use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Incremental SHA-256 over a byte stream, finalized as lowercase hex.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    len: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hex-encoded SHA-256 of an in-memory buffer.
pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Copies `reader` into `writer`, hashing every byte on the way.
///
/// Returns the hex digest and the number of bytes copied. The writer is
/// flushed before returning.
pub async fn hash_and_copy<R, W>(reader: &mut R, writer: &mut W) -> Result<(String, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let n = reader
            .read(&mut buffer)
            .await
            .context("Failed to read source stream")?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        writer
            .write_all(&buffer[..n])
            .await
            .context("Failed to write destination")?;
    }

    writer.flush().await.context("Failed to flush destination")?;
    let size = hasher.len();
    Ok((hasher.finalize(), size))
}
