//! Streaming multipart upload writer.
//!
//! Lifecycle:
//!
//! ```text
//! fresh ──write──▶ preparing ──POST ?uploads──▶ open
//! open  ──write*──▶ open       (buffered; cut a part whenever buf >= PART_SIZE)
//! open  ──close──▶ draining ──complete──▶ closed
//! open  ──abort / fatal part error──▶ draining ──abort──▶ closed
//! ```
//!
//! Each cut part carries its expected MD5; an uploader task PUTs it and
//! verifies the server-reported ETag, retrying on any failure. Once the
//! retries are exhausted the writer latches the error: every later `write`
//! returns it, and `close` drains the remaining workers and aborts the
//! upload on the server.
//!
//! The part channel is bounded at [`CONCURRENT_UPLOADS`]; once that many
//! parts are in flight the cutter blocks, which is the intended
//! backpressure on the producer.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use md5::{Digest, Md5};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{VfsError, VfsResult};

use super::types::{dequote_etag, CompleteMultipartUpload, CompletedPart, InitiateMultipartUploadResult};
use super::{protocol_error, S3Inner};

/// Fixed size of every part except the last
pub const PART_SIZE: usize = 8 * 1024 * 1024;
/// Part-number ceiling imposed by the S3 protocol
pub const MAX_PARTS: i32 = 10_000;
/// Largest object a multipart upload can produce
pub const MAX_OBJECT_SIZE: u64 = PART_SIZE as u64 * MAX_PARTS as u64;
/// Upper bound on parts in flight; also the part-channel capacity
pub const CONCURRENT_UPLOADS: usize = 5;
/// Retries per part after the initial attempt
pub const RETRIES: u32 = 2;

pub(crate) struct MultipartWriter {
    inner: Arc<S3Inner>,
    key: String,
    buf: Vec<u8>,
    part_number: i32,
    /// Completion manifest in cut order, i.e. ascending part number
    manifest: Vec<CompletedPart>,
    upload_id: String,
    prepared: bool,
    closed: bool,
    tx: Option<mpsc::Sender<PartJob>>,
    scheduler: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

struct PartJob {
    number: i32,
    expected_etag: String,
    body: Bytes,
}

/// State shared with the uploader tasks
struct Shared {
    /// First fatal error, latched
    fatal: Mutex<Option<VfsError>>,
}

impl Shared {
    fn latch(&self, err: VfsError) {
        let mut fatal = self.fatal.lock().unwrap();
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    fn get(&self) -> Option<VfsError> {
        self.fatal.lock().unwrap().clone()
    }
}

impl MultipartWriter {
    pub(crate) fn new(inner: Arc<S3Inner>, key: impl Into<String>) -> Self {
        Self {
            inner,
            key: key.into(),
            buf: Vec::new(),
            part_number: 0,
            manifest: Vec::new(),
            upload_id: String::new(),
            prepared: false,
            closed: false,
            tx: None,
            scheduler: None,
            shared: Arc::new(Shared {
                fatal: Mutex::new(None),
            }),
        }
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        if self.closed {
            return Err(VfsError::Io("write on closed upload".into()));
        }
        if let Some(err) = self.shared.get() {
            return Err(err);
        }
        if !self.prepared {
            self.prepare().await?;
        }
        self.buf.extend_from_slice(data);
        while self.buf.len() >= PART_SIZE {
            self.cut_part(PART_SIZE).await?;
        }
        Ok(data.len())
    }

    /// Finish the upload, completing it on the server. Idempotent.
    pub(crate) async fn close(&mut self) -> VfsResult<()> {
        self.finish(false).await
    }

    /// Abandon the upload, deleting it on the server. Idempotent.
    pub(crate) async fn abort(&mut self) -> VfsResult<()> {
        self.finish(true).await
    }

    /// Create the multipart upload and start the scheduler. Runs once, on
    /// the first write; a failure is fatal for the writer.
    async fn prepare(&mut self) -> VfsResult<()> {
        match self.try_prepare().await {
            Ok(upload_id) => {
                self.upload_id = upload_id;
                self.prepared = true;
                let (tx, rx) = mpsc::channel(CONCURRENT_UPLOADS);
                self.tx = Some(tx);
                self.scheduler = Some(tokio::spawn(schedule(
                    self.inner.clone(),
                    self.key.clone(),
                    self.upload_id.clone(),
                    rx,
                    self.shared.clone(),
                )));
                Ok(())
            }
            Err(err) => {
                self.shared.latch(err.clone());
                Err(err)
            }
        }
    }

    async fn try_prepare(&self) -> VfsResult<String> {
        let mut url = self.inner.url(&self.key);
        url.set_query(Some("uploads"));
        let mut req = reqwest::Request::new(Method::POST, url);
        let content_type = mime_guess::from_path(&self.key).first_or_octet_stream();
        req.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type.as_ref())
                .expect("mime types are valid header values"),
        );

        let resp = self.inner.send(req).await?;
        if resp.status().as_u16() != 200 {
            return Err(protocol_error(resp, "could not create multipart upload").await);
        }
        let body = resp
            .text()
            .await
            .map_err(|e| VfsError::Transport(e.to_string()))?;
        let result: InitiateMultipartUploadResult = quick_xml::de::from_str(&body).map_err(|e| {
            VfsError::protocol(
                200,
                format!("malformed initiate response: {e}"),
                body.chars().take(512).collect::<String>(),
            )
        })?;
        Ok(result.upload_id)
    }

    /// Slice exactly `len` bytes off the front of the buffer, leaving the
    /// remainder in a fresh allocation, and hand the part to the workers.
    /// Blocks once `CONCURRENT_UPLOADS` parts are in flight.
    async fn cut_part(&mut self, len: usize) -> VfsResult<()> {
        if self.part_number >= MAX_PARTS {
            let err = VfsError::TooLarge {
                max_parts: MAX_PARTS,
                part_size: PART_SIZE,
            };
            self.shared.latch(err.clone());
            return Err(err);
        }

        let rest = self.buf.split_off(len);
        let chunk = std::mem::replace(&mut self.buf, rest);

        self.part_number += 1;
        let expected_etag = hex::encode(Md5::digest(&chunk));
        self.manifest.push(CompletedPart {
            part_number: self.part_number,
            etag: expected_etag.clone(),
        });

        let job = PartJob {
            number: self.part_number,
            expected_etag,
            body: Bytes::from(chunk),
        };
        let tx = self.tx.as_ref().ok_or(VfsError::Aborted)?;
        if tx.send(job).await.is_err() {
            let err = VfsError::Io("upload workers stopped unexpectedly".into());
            self.shared.latch(err.clone());
            return Err(err);
        }
        Ok(())
    }

    async fn finish(&mut self, abort: bool) -> VfsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.prepared {
            // nothing exists on the server; surface a latched prepare failure
            return match self.shared.get() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        // flush the residual bytes as a final, possibly short, part; a
        // failure here is latched and handled after the drain
        if !abort && self.shared.get().is_none() && !self.buf.is_empty() {
            let len = self.buf.len();
            let _ = self.cut_part(len).await;
        }

        // close the channel and wait for every in-flight part
        self.tx = None;
        if let Some(scheduler) = self.scheduler.take() {
            if let Err(err) = scheduler.await {
                tracing::error!(error = %err, "upload scheduler task failed");
            }
        }

        let fatal = self.shared.get();
        if abort || fatal.is_some() {
            let abort_result = self.abort_upload().await;
            if let Some(err) = fatal {
                if let Err(abort_err) = abort_result {
                    tracing::warn!(error = %abort_err, "could not abort failed upload");
                }
                return Err(err);
            }
            return abort_result;
        }
        self.complete_upload().await
    }

    /// `POST {url}?uploadId=U` with the ordered part manifest
    async fn complete_upload(&self) -> VfsResult<()> {
        let doc = CompleteMultipartUpload {
            parts: self.manifest.clone(),
        };
        let xml = quick_xml::se::to_string(&doc)
            .map_err(|e| VfsError::Io(format!("could not encode completion body: {e}")))?;

        let mut url = self.inner.url(&self.key);
        url.query_pairs_mut().append_pair("uploadId", &self.upload_id);
        let mut req = reqwest::Request::new(Method::POST, url);
        *req.body_mut() = Some(reqwest::Body::from(xml));

        let resp = self.inner.send(req).await?;
        if resp.status().as_u16() != 200 {
            return Err(protocol_error(resp, "could not complete multipart upload").await);
        }
        Ok(())
    }

    /// `DELETE {url}?uploadId=U`; only 204 counts as success
    async fn abort_upload(&self) -> VfsResult<()> {
        let mut url = self.inner.url(&self.key);
        url.query_pairs_mut().append_pair("uploadId", &self.upload_id);
        let req = reqwest::Request::new(Method::DELETE, url);

        let resp = self.inner.send(req).await?;
        if resp.status().as_u16() != 204 {
            return Err(protocol_error(resp, "could not abort multipart upload").await);
        }
        Ok(())
    }
}

/// Scheduler: pull parts off the bounded channel and upload each in its own
/// task, capping the number in flight. Runs until the channel closes and
/// every spawned upload has finished.
async fn schedule(
    inner: Arc<S3Inner>,
    key: String,
    upload_id: String,
    mut rx: mpsc::Receiver<PartJob>,
    shared: Arc<Shared>,
) {
    let mut in_flight = JoinSet::new();
    while let Some(job) = rx.recv().await {
        while in_flight.len() >= CONCURRENT_UPLOADS {
            in_flight.join_next().await;
        }
        // after a fatal error, drain the queue without uploading
        if shared.get().is_some() {
            continue;
        }
        let inner = inner.clone();
        let key = key.clone();
        let upload_id = upload_id.clone();
        let shared = shared.clone();
        in_flight.spawn(async move {
            if let Err(err) = upload_part_with_retry(&inner, &key, &upload_id, &job).await {
                shared.latch(err);
            }
        });
    }
    while in_flight.join_next().await.is_some() {}
}

async fn upload_part_with_retry(
    inner: &Arc<S3Inner>,
    key: &str,
    upload_id: &str,
    job: &PartJob,
) -> VfsResult<()> {
    let mut attempt = 0;
    loop {
        match upload_part(inner, key, upload_id, job).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < RETRIES => {
                attempt += 1;
                tracing::warn!(
                    part = job.number,
                    attempt,
                    error = %err,
                    "retrying part upload"
                );
            }
            Err(err) => {
                tracing::error!(part = job.number, error = %err, "part upload failed");
                return Err(err);
            }
        }
    }
}

/// `PUT {url}?partNumber=N&uploadId=U`, verifying the returned ETag against
/// the locally computed MD5.
async fn upload_part(
    inner: &Arc<S3Inner>,
    key: &str,
    upload_id: &str,
    job: &PartJob,
) -> VfsResult<()> {
    let mut url = inner.url(key);
    url.query_pairs_mut()
        .append_pair("partNumber", &job.number.to_string())
        .append_pair("uploadId", upload_id);
    let mut req = reqwest::Request::new(Method::PUT, url);
    *req.body_mut() = Some(reqwest::Body::from(job.body.clone()));

    let resp = inner.send(req).await?;
    if resp.status().as_u16() != 200 {
        return Err(protocol_error(resp, format!("could not upload part {}", job.number)).await);
    }

    let etag = resp
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(dequote_etag)
        .unwrap_or_default();
    if etag != job.expected_etag {
        return Err(VfsError::Checksum {
            expected: job.expected_etag.clone(),
            actual: etag,
        });
    }
    Ok(())
}
