//! Configuration for the S3 filesystem.

use serde::{Deserialize, Serialize};

/// Connection settings for an S3-compatible endpoint
///
/// Addressing is always path-style: `{scheme}://{host}/{bucket}/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket all operations address
    pub bucket: String,

    /// Access key for request signing
    pub access_key: String,

    /// Secret key for request signing
    pub secret_key: String,

    /// Host (and optional port) of the endpoint, e.g. `127.0.0.1:9000`
    pub host: String,

    /// URL scheme, `http` or `https`
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_scheme() -> String {
    "https".to_string()
}

impl S3Config {
    pub fn new(
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            host: host.into(),
            scheme: default_scheme(),
        }
    }

    /// Builder pattern: set the URL scheme
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}
