//! Lazy single-shot object reader.
//!
//! The first `read` issues one signed GET and buffers the whole body;
//! subsequent reads drain the buffer. A failed fetch is sticky: every later
//! read returns the same error, and the fetch is never reattempted on the
//! same handle.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Method, StatusCode};

use crate::error::{VfsError, VfsResult};

use super::{protocol_error, S3Inner};

pub(crate) struct ObjectReader {
    inner: Arc<S3Inner>,
    key: String,
    state: State,
}

enum State {
    Idle,
    Ready { data: Bytes, pos: usize },
    Failed(VfsError),
}

impl ObjectReader {
    pub(crate) fn new(inner: Arc<S3Inner>, key: impl Into<String>) -> Self {
        Self {
            inner,
            key: key.into(),
            state: State::Idle,
        }
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if matches!(self.state, State::Idle) {
            self.state = match self.fetch().await {
                Ok(data) => State::Ready { data, pos: 0 },
                Err(err) => State::Failed(err),
            };
        }
        match &mut self.state {
            State::Ready { data, pos } => {
                let n = buf.len().min(data.len() - *pos);
                buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                *pos += n;
                Ok(n)
            }
            State::Failed(err) => Err(err.clone()),
            State::Idle => Ok(0),
        }
    }

    async fn fetch(&self) -> VfsResult<Bytes> {
        let req = reqwest::Request::new(Method::GET, self.inner.url(&self.key));
        let resp = self.inner.send(req).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(VfsError::not_found(&self.key));
        }
        if !resp.status().is_success() {
            return Err(protocol_error(resp, "object fetch failed").await);
        }
        resp.bytes()
            .await
            .map_err(|e| VfsError::Transport(e.to_string()))
    }
}
