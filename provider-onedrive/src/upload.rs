//! # Resumable Uploads
//!
//! Large files go up as byte-range PUTs against an upload session URL.
//! [`UploadChunkRequest`] sends one range; [`ChunkedUploadProvider`] walks
//! the session's `nextExpectedRanges` until the service returns the item.
//!
//! Chunks must be multiples of 320 KiB (except the last one), which
//! [`ChunkedUploadProvider::new`] enforces for the configured chunk size.

use crate::client::OneDriveClient;
use crate::error::{OneDriveError, Result};
use crate::models::{Item, UploadChunkResult, UploadSession};
use crate::request::decode_json;
use bridge_traits::{HttpMethod, HttpRequest};
use bytes::Bytes;
use core_runtime::config::validate_chunk_size;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// PUT of bytes `[range_begin, range_end]` of a `total_length`-byte file.
#[derive(Clone)]
pub struct UploadChunkRequest {
    client: OneDriveClient,
    session_url: String,
    range_begin: u64,
    range_end: u64,
    total_length: u64,
}

impl UploadChunkRequest {
    pub fn new(
        client: OneDriveClient,
        session_url: impl Into<String>,
        range_begin: u64,
        range_end: u64,
        total_length: u64,
    ) -> Self {
        Self {
            client,
            session_url: session_url.into(),
            range_begin,
            range_end,
            total_length,
        }
    }

    pub fn range_begin(&self) -> u64 {
        self.range_begin
    }

    pub fn range_end(&self) -> u64 {
        self.range_end
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of bytes this chunk carries.
    pub fn range_length(&self) -> u64 {
        self.range_end - self.range_begin + 1
    }

    fn validate(&self) -> Result<()> {
        if self.session_url.is_empty() {
            return Err(OneDriveError::invalid_request(
                "Upload session URL is required to upload a chunk.",
            ));
        }
        if self.range_begin > self.range_end || self.range_end >= self.total_length {
            return Err(OneDriveError::invalid_request(format!(
                "Invalid chunk range {}-{} for a {}-byte upload.",
                self.range_begin, self.range_end, self.total_length
            )));
        }
        Ok(())
    }

    /// Reads exactly [`range_length`](Self::range_length) bytes from
    /// `stream` and PUTs them.
    ///
    /// # Errors
    ///
    /// `generalException` when the stream ends early.
    pub async fn put_stream<R>(
        &self,
        stream: &mut R,
        cancellation: Option<&CancellationToken>,
    ) -> Result<UploadChunkResult>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.validate()?;
        let length = usize::try_from(self.range_length()).map_err(|_| {
            OneDriveError::invalid_request("Chunk is too large for this platform.")
        })?;

        let mut buffer = vec![0u8; length];
        stream.read_exact(&mut buffer).await.map_err(|e| {
            OneDriveError::general(format!(
                "Stream ended before {} bytes could be read for range {}-{}: {}",
                length, self.range_begin, self.range_end, e
            ))
        })?;

        self.put(Bytes::from(buffer), cancellation).await
    }

    /// PUTs `content`, which must be exactly the chunk's length.
    #[instrument(
        skip(self, content, cancellation),
        fields(begin = self.range_begin, end = self.range_end, total = self.total_length)
    )]
    pub async fn put(
        &self,
        content: Bytes,
        cancellation: Option<&CancellationToken>,
    ) -> Result<UploadChunkResult> {
        self.validate()?;
        if content.len() as u64 != self.range_length() {
            return Err(OneDriveError::invalid_request(format!(
                "Chunk content is {} bytes but the range needs {}.",
                content.len(),
                self.range_length()
            )));
        }

        let request = HttpRequest::new(HttpMethod::Put, self.session_url.clone())
            .header(
                "Content-Range",
                format!(
                    "bytes {}-{}/{}",
                    self.range_begin, self.range_end, self.total_length
                ),
            )
            .header("Content-Length", content.len().to_string())
            .body(content);

        let response = self.client.send_authenticated(request, cancellation).await?;

        // 200/201 normally carry the item; a session body means more ranges remain
        if response.status == 200 || response.status == 201 {
            if let Ok(item) = decode_json::<Item>(&response) {
                if !item.id.is_empty() {
                    info!(item_id = %item.id, "Upload completed");
                    return Ok(UploadChunkResult {
                        item_response: Some(item),
                        upload_session: None,
                    });
                }
            }
        }

        let session: UploadSession = decode_json(&response)?;
        debug!(next = ?session.next_expected_ranges, "Chunk accepted");
        Ok(UploadChunkResult {
            item_response: None,
            upload_session: Some(session),
        })
    }
}

/// Drives a whole upload session from a seekable stream.
pub struct ChunkedUploadProvider<R> {
    client: OneDriveClient,
    session: UploadSession,
    upload_url: String,
    stream: R,
    total_length: u64,
    max_chunk_size: u64,
}

impl<R> ChunkedUploadProvider<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// # Arguments
    ///
    /// * `client` - Authenticated client
    /// * `session` - Session from `createUploadSession`
    /// * `stream` - Source; seeked to each chunk's offset
    /// * `total_length` - Size of the file in bytes
    /// * `max_chunk_size` - Defaults to the configured upload chunk size
    ///
    /// # Errors
    ///
    /// `invalidRequest` when the session has no upload URL or the chunk size
    /// is not a positive multiple of 320 KiB.
    pub fn new(
        client: OneDriveClient,
        session: UploadSession,
        stream: R,
        total_length: u64,
        max_chunk_size: Option<usize>,
    ) -> Result<Self> {
        let max_chunk_size = max_chunk_size.unwrap_or(client.config().upload_chunk_size);
        validate_chunk_size(max_chunk_size)
            .map_err(|e| OneDriveError::invalid_request(e.to_string()))?;

        let upload_url = session
            .upload_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                OneDriveError::invalid_request("Upload session does not have an upload URL.")
            })?;

        Ok(Self {
            client,
            session,
            upload_url,
            stream,
            total_length,
            max_chunk_size: max_chunk_size as u64,
        })
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn max_chunk_size(&self) -> u64 {
        self.max_chunk_size
    }

    /// Splits every expected range into chunk requests of at most
    /// `max_chunk_size` bytes.
    pub fn get_upload_chunk_requests(&self) -> Result<Vec<UploadChunkRequest>> {
        let mut requests = Vec::new();
        for range in &self.session.next_expected_ranges {
            let (begin, end) = parse_range(range, self.total_length)?;
            let mut chunk_begin = begin;
            while chunk_begin <= end {
                let chunk_end = end.min(chunk_begin + self.max_chunk_size - 1);
                requests.push(UploadChunkRequest::new(
                    self.client.clone(),
                    self.upload_url.clone(),
                    chunk_begin,
                    chunk_end,
                    self.total_length,
                ));
                chunk_begin = chunk_end + 1;
            }
        }
        Ok(requests)
    }

    /// Uploads the remaining ranges in order and returns the created item.
    ///
    /// # Errors
    ///
    /// - Any chunk failure, unchanged; nothing is retried
    /// - `generalException` when the session stops advancing or runs out of
    ///   ranges without returning an item
    #[instrument(skip(self, cancellation), fields(total = self.total_length))]
    pub async fn upload(&mut self, cancellation: Option<&CancellationToken>) -> Result<Item> {
        let mut last_begin: Option<u64> = None;

        loop {
            let Some(request) = self.get_upload_chunk_requests()?.into_iter().next() else {
                return Err(OneDriveError::general(
                    "Upload session has no remaining ranges but no item was returned.",
                ));
            };

            if last_begin == Some(request.range_begin()) {
                warn!(begin = request.range_begin(), "Upload session did not advance");
                return Err(OneDriveError::general(format!(
                    "Upload session did not advance past byte {}.",
                    request.range_begin()
                )));
            }
            last_begin = Some(request.range_begin());

            self.stream
                .seek(SeekFrom::Start(request.range_begin()))
                .await
                .map_err(|e| OneDriveError::general(format!("Failed to seek upload stream: {}", e)))?;

            let result = request.put_stream(&mut self.stream, cancellation).await?;
            if let Some(item) = result.item_response {
                return Ok(item);
            }
            if let Some(session) = result.upload_session {
                self.apply_session(session);
            }
        }
    }

    /// Refreshes the session from the service, e.g. before resuming.
    pub async fn get_session_status(&mut self) -> Result<&UploadSession> {
        let request = HttpRequest::new(HttpMethod::Get, self.upload_url.clone());
        let response = self.client.send_authenticated(request, None).await?;
        let session: UploadSession = decode_json(&response)?;
        self.apply_session(session);
        Ok(&self.session)
    }

    /// Abandons the session. The service discards uploaded bytes.
    pub async fn delete_session(&self) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Delete, self.upload_url.clone());
        self.client.send_authenticated(request, None).await?;
        info!("Upload session deleted");
        Ok(())
    }

    fn apply_session(&mut self, mut session: UploadSession) {
        match session.upload_url.as_deref() {
            Some(url) if !url.is_empty() => self.upload_url = url.to_string(),
            _ => session.upload_url = Some(self.upload_url.clone()),
        }
        self.session = session;
    }
}

/// Parses `"start-end"` or open-ended `"start-"`.
fn parse_range(range: &str, total_length: u64) -> Result<(u64, u64)> {
    let invalid = || OneDriveError::general(format!("Invalid expected range '{}'.", range));

    let (begin, end) = range.split_once('-').ok_or_else(invalid)?;
    let begin: u64 = begin.trim().parse().map_err(|_| invalid())?;
    let end: u64 = match end.trim() {
        "" => total_length.checked_sub(1).ok_or_else(invalid)?,
        end => end.parse().map_err(|_| invalid())?,
    };

    if begin > end || end >= total_length {
        return Err(invalid());
    }
    Ok((begin, end))
}
