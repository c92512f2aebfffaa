//! S3-compatible object store backend.
//!
//! Speaks plain HTTP/1.1 with path-style addressing
//! (`{scheme}://{host}/{bucket}/{key}`) and AWS REST v2 request signing.
//! Directories are synthetic: they exist only as listing prefixes, so
//! `read_dir` is a delimiter listing and `stat` of a prefix reports a
//! zero-sized directory.
//!
//! Reads fetch whole objects lazily on first use; writes stream through a
//! concurrent multipart upload (see [`writer`]).

mod config;
mod etag;
mod file;
mod reader;
mod signer;
mod types;
mod writer;

pub use config::S3Config;
pub use etag::compute_etag;
pub use file::S3File;
pub use types::ObjectStat;
pub use writer::{CONCURRENT_UPLOADS, MAX_OBJECT_SIZE, MAX_PARTS, PART_SIZE, RETRIES};

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{CONTENT_LENGTH, DATE, ETAG};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{VfsError, VfsResult};
use crate::fs::{File, Filesystem};
use crate::types::{FileInfo, OpenFlags};
use types::{dequote_etag, ListBucketResult};

/// Filesystem over an S3-compatible object store
pub struct S3Fs {
    inner: Arc<S3Inner>,
}

pub(crate) struct S3Inner {
    pub(crate) config: S3Config,
    base: Url,
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl S3Fs {
    /// Create a filesystem for `config` with a fresh HTTP client
    pub fn new(config: S3Config) -> VfsResult<Self> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a filesystem whose outstanding requests abort when `cancel`
    /// fires; cancelled operations fail with [`VfsError::Aborted`] and
    /// in-flight uploads route through their abort path.
    pub fn with_cancellation(config: S3Config, cancel: CancellationToken) -> VfsResult<Self> {
        let base = Url::parse(&format!("{}://{}/", config.scheme, config.host))
            .map_err(|e| VfsError::Io(format!("invalid endpoint {}: {e}", config.host)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| VfsError::Transport(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(S3Inner {
                config,
                base,
                client,
                cancel,
            }),
        })
    }

    /// Open a concrete handle for `key`
    ///
    /// Unlike the trait-object form returned by `open_file`, the concrete
    /// [`S3File`] exposes [`S3File::abort`] for cancelling an upload.
    pub fn open(&self, key: &str) -> S3File {
        S3File::new(self.inner.clone(), key)
    }

    /// Fetch the bucket lifecycle configuration document
    pub async fn lifecycle(&self) -> VfsResult<String> {
        let mut url = self.inner.bucket_url();
        url.set_query(Some("lifecycle"));
        let resp = self.inner.send(reqwest::Request::new(Method::GET, url)).await?;
        if !resp.status().is_success() {
            return Err(protocol_error(resp, "could not fetch lifecycle configuration").await);
        }
        resp.text()
            .await
            .map_err(|e| VfsError::Transport(e.to_string()))
    }
}

impl S3Inner {
    /// Path-style object URL; the key is trimmed of any leading `/`
    pub(crate) fn url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!(
            "/{}/{}",
            self.config.bucket,
            key.trim_start_matches('/')
        ));
        url
    }

    pub(crate) fn bucket_url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("/{}/", self.config.bucket));
        url
    }

    /// Sign and execute `req`, racing it against the cancellation token
    pub(crate) async fn send(&self, mut req: reqwest::Request) -> VfsResult<reqwest::Response> {
        signer::sign_request(
            &mut req,
            &self.config.bucket,
            &self.config.access_key,
            &self.config.secret_key,
        );
        tokio::select! {
            _ = self.cancel.cancelled() => Err(VfsError::Aborted),
            result = self.client.execute(req) => {
                result.map_err(|e| VfsError::Transport(e.to_string()))
            }
        }
    }

    /// `HEAD {url}` and convert the response headers into a [`FileInfo`]
    pub(crate) async fn head(&self, key: &str) -> VfsResult<FileInfo> {
        let resp = self
            .send(reqwest::Request::new(Method::HEAD, self.url(key)))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(VfsError::not_found(key));
        }
        if !resp.status().is_success() {
            return Err(protocol_error(resp, "object metadata request failed").await);
        }

        let headers = resp.headers();
        // a missing Content-Length marks a synthetic directory
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        let is_dir = size.is_none() || size < Some(0);
        let size = size.unwrap_or(0).max(0) as u64;

        let last_modified = headers
            .get(DATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let modified = DateTime::parse_from_rfc2822(&last_modified)
            .ok()
            .map(SystemTime::from);

        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(dequote_etag)
            .filter(|e| e.len() > 8)
            .unwrap_or_default();
        let storage_class = headers
            .get("x-amz-storage-class")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut info = if is_dir {
            FileInfo::directory(base_name(key))
        } else {
            FileInfo::file(base_name(key), size)
        };
        if let Some(modified) = modified {
            info = info.with_modified(modified);
        }
        Ok(info.with_sys(Arc::new(ObjectStat {
            key: key.to_string(),
            last_modified,
            etag,
            storage_class,
            ..ObjectStat::default()
        })))
    }
}

/// Base name of a key or path, ignoring any trailing `/`
fn base_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Build a [`VfsError::Protocol`] from an unexpected response, keeping a
/// body excerpt for diagnostics.
pub(crate) async fn protocol_error(resp: reqwest::Response, message: impl Into<String>) -> VfsError {
    let status = resp.status().as_u16();
    let body: String = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(512)
        .collect();
    VfsError::protocol(status, message, body)
}

#[async_trait]
impl Filesystem for S3Fs {
    fn path_separator(&self) -> u8 {
        b'/'
    }

    async fn open_file(
        &self,
        path: &str,
        _flags: OpenFlags,
        _mode: u32,
    ) -> VfsResult<Box<dyn File>> {
        Ok(Box::new(self.open(path)))
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let resp = self
            .inner
            .send(reqwest::Request::new(Method::DELETE, self.inner.url(path)))
            .await?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(VfsError::not_found(path)),
            _ => Err(protocol_error(resp, "could not remove object").await),
        }
    }

    async fn rename(&self, _from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("s3", "rename"))
    }

    async fn mkdir(&self, _path: &str, _mode: u32) -> VfsResult<()> {
        Err(VfsError::not_supported("s3", "mkdir"))
    }

    async fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        self.inner.head(path).await
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileInfo> {
        self.inner.head(path).await
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<FileInfo>> {
        // normalized prefix: no leading /, trailing / when non-empty
        let mut prefix = path.trim_start_matches('/').to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        let mut infos = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut url = self.inner.bucket_url();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("delimiter", "/");
                query.append_pair("list-type", "2");
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
                if !prefix.is_empty() {
                    query.append_pair("prefix", &prefix);
                }
            }

            let resp = self.inner.send(reqwest::Request::new(Method::GET, url)).await?;
            if !resp.status().is_success() {
                return Err(protocol_error(resp, "object listing failed").await);
            }
            let body = resp
                .text()
                .await
                .map_err(|e| VfsError::Transport(e.to_string()))?;
            let result: ListBucketResult = quick_xml::de::from_str(&body).map_err(|e| {
                VfsError::protocol(
                    200,
                    format!("malformed list response: {e}"),
                    body.chars().take(512).collect::<String>(),
                )
            })?;

            for entry in result.contents {
                let etag = dequote_etag(&entry.etag);
                let (name, is_dir) = if entry.size == 0 && entry.key.ends_with('/') {
                    (entry.key.trim_end_matches('/'), true)
                } else {
                    (entry.key.as_str(), false)
                };
                let modified = match DateTime::parse_from_rfc3339(&entry.last_modified) {
                    Ok(t) => Some(SystemTime::from(t)),
                    Err(err) => {
                        if !entry.last_modified.is_empty() {
                            tracing::warn!(
                                time = %entry.last_modified,
                                error = %err,
                                "cannot parse listing timestamp"
                            );
                        }
                        None
                    }
                };

                let mut info = if is_dir {
                    FileInfo::directory(base_name(name))
                } else {
                    FileInfo::file(base_name(name), entry.size)
                };
                if let Some(modified) = modified {
                    info = info.with_modified(modified);
                }
                let (owner_id, owner_name) = entry
                    .owner
                    .map(|o| (o.id, o.display_name))
                    .unwrap_or_default();
                infos.push(info.with_sys(Arc::new(ObjectStat {
                    key: entry.key.clone(),
                    last_modified: entry.last_modified,
                    etag,
                    storage_class: entry.storage_class,
                    owner_id,
                    owner_name,
                })));
            }
            for dir in result.common_prefixes {
                infos.push(FileInfo::directory(base_name(
                    dir.prefix.trim_end_matches('/'),
                )));
            }

            match (result.is_truncated, result.next_continuation_token) {
                (true, Some(token)) if !token.is_empty() => continuation = Some(token),
                _ => break,
            }
        }
        Ok(infos)
    }
}
