use std::fmt;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Response;
use tokio::io::AsyncWriteExt;

use crate::error::{NetError, Result};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A successful upstream response whose body has not been read yet
pub struct Upstream {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl Upstream {
    pub(crate) fn from_response(response: Response) -> Self {
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Self {
            status: response.status().as_u16(),
            content_type,
            content_length,
            body: response.bytes_stream().map_err(NetError::from).boxed(),
        }
    }

    /// Buffer the whole body in memory
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        while let Some(chunk) = self.body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    /// Stream the body into `path`, returning the number of bytes written
    pub async fn save_to(mut self, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| NetError::Io(format!("Failed to create {}: {}", path.display(), e)))?;

        let mut written = 0u64;
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| NetError::Io(format!("Failed to write chunk: {}", e)))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| NetError::Io(format!("Failed to flush {}: {}", path.display(), e)))?;

        Ok(written)
    }
}

impl fmt::Debug for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upstream")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
