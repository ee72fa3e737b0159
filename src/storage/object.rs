//! Object storage for published bundles
//!
//! [`ObjectStore`] is the seam the publisher uploads through: bucket CORS
//! configuration, upload-by-key with content-type/encoding metadata, and the
//! public URL base that uploaded keys are appended to.
//!
//! [`S3ObjectStore`] talks to any S3-compatible endpoint through
//! `aws-sdk-s3` with path-style addressing, signing every request with the
//! configured access key or, when none is set, the default AWS credential
//! chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CorsConfiguration, CorsRule as S3CorsRule};
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use crate::utils::error::PublishError;

/// One bucket CORS rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub max_age_seconds: u32,
}

impl CorsRule {
    /// GET and PUT from any origin
    pub fn permissive() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["PUT".to_string(), "GET".to_string()],
            max_age_seconds: 200,
        }
    }

    fn to_s3(&self) -> Result<S3CorsRule, PublishError> {
        S3CorsRule::builder()
            .set_allowed_origins(Some(self.allowed_origins.clone()))
            .set_allowed_methods(Some(self.allowed_methods.clone()))
            .max_age_seconds(i32::try_from(self.max_age_seconds).unwrap_or(i32::MAX))
            .build()
            .map_err(|e| PublishError::Setup(format!("invalid CORS rule: {e}")))
    }
}

/// Metadata attached to an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: String,
    pub content_encoding: String,
}

impl ObjectMeta {
    /// Metadata bundles are published with
    pub fn bundle() -> Self {
        Self {
            content_type: "text/html".to_string(),
            content_encoding: "utf-8".to_string(),
        }
    }
}

/// Remote bucket the publisher writes to
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Replace the bucket's CORS rules
    async fn set_cors(&self, rules: &[CorsRule]) -> Result<(), PublishError>;

    /// Upload `body` under `key`
    async fn put_object(&self, key: &str, body: Bytes, meta: &ObjectMeta)
        -> Result<(), PublishError>;

    /// Base URL an uploaded key is appended to
    fn public_url_base(&self) -> &str;

    /// Public URL of `key`
    fn public_url(&self, key: &str) -> String {
        public_object_url(self.public_url_base(), key)
    }
}

/// Thread-safe shared object store
pub type SharedObjectStore = Arc<dyn ObjectStore>;

/// Append `key` to `base` as one percent-encoded path segment.
///
/// A base that is not an absolute URL is joined as plain text.
pub fn public_object_url(base: &str, key: &str) -> String {
    let Ok(mut url) = Url::parse(base) else {
        return format!("{base}{key}");
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().push(key);
        }
        Err(()) => return format!("{base}{key}"),
    }
    url.to_string()
}

/// Configuration for [`S3ObjectStore`]
#[derive(Debug, Clone)]
pub struct S3ObjectStoreConfig {
    /// Endpoint URL, e.g. `https://oss.example.com`
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Public base URL for uploaded keys
    pub public_url: String,
    /// Static access key; the default credential chain is used when unset
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per operation, including the first
    pub max_attempts: u32,
}

/// S3-compatible object store
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3ObjectStore {
    /// Build a client for the configured endpoint and bucket
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Setup`] if the endpoint is not a URL or only
    /// one half of the static key pair is set.
    pub async fn connect(config: S3ObjectStoreConfig) -> Result<Self, PublishError> {
        Url::parse(&config.endpoint).map_err(|e| {
            PublishError::Setup(format!("invalid endpoint {:?}: {e}", config.endpoint))
        })?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.as_str())
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts.max(1)))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_secs))
                    .build(),
            );

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                loader = loader.credentials_provider(Credentials::new(
                    key_id.as_str(),
                    secret.as_str(),
                    None,
                    None,
                    "rotor-config",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(PublishError::Setup(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ))
            }
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        tracing::debug!(endpoint = %config.endpoint, bucket = %config.bucket, "object store client ready");

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket,
            public_url: config.public_url,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Map an SDK failure onto [`PublishError`], keeping the HTTP status when
/// the store answered at all
fn sdk_error<E>(key: &str, err: SdkError<E>) -> PublishError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err.raw_response().map(|resp| resp.status().as_u16()) {
        Some(status) => PublishError::Rejected {
            key: key.to_string(),
            status,
        },
        None => PublishError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn set_cors(&self, rules: &[CorsRule]) -> Result<(), PublishError> {
        let rules = rules
            .iter()
            .map(CorsRule::to_s3)
            .collect::<Result<Vec<_>, _>>()?;
        let count = rules.len();
        let cors = CorsConfiguration::builder()
            .set_cors_rules(Some(rules))
            .build()
            .map_err(|e| PublishError::Setup(format!("invalid CORS configuration: {e}")))?;

        self.client
            .put_bucket_cors()
            .bucket(&self.bucket)
            .cors_configuration(cors)
            .send()
            .await
            .map_err(|e| sdk_error("?cors", e))?;

        tracing::info!(bucket = %self.bucket, rules = count, "bucket CORS applied");
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        meta: &ObjectMeta,
    ) -> Result<(), PublishError> {
        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&meta.content_type)
            .content_encoding(&meta.content_encoding)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error(key, e))?;

        tracing::debug!(bucket = %self.bucket, key, size, "object uploaded");
        Ok(())
    }

    fn public_url_base(&self) -> &str {
        &self.public_url
    }
}
