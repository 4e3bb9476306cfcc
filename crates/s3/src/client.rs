//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from bp-core.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_smithy_types::error::display::DisplayErrorContext;
use jiff::Timestamp;

use bp_core::{
    Error, ListOptions, ListPage, ObjectDescriptor, ObjectPayload, ObjectStore, Profile, Result,
};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    profile: String,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Create a new S3 client from a profile
    pub async fn new(profile: &Profile) -> Result<Self> {
        let endpoint = profile.endpoint_url()?;
        let retry = profile.retry_config();
        let timeout = profile.timeout_config();

        let credentials = aws_credential_types::Credentials::new(
            profile.access_key.clone(),
            profile.secret_key.clone(),
            None, // session token
            None, // expiry
            "bp-static-credentials",
        );

        let retry_config = aws_config::retry::RetryConfig::standard()
            .with_max_attempts(retry.max_attempts.max(1))
            .with_initial_backoff(Duration::from_millis(retry.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(retry.max_backoff_ms));

        let timeout_config = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(timeout.connect_ms))
            .read_timeout(Duration::from_millis(timeout.read_ms))
            .build();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(profile.region.clone()))
            .endpoint_url(&endpoint)
            .retry_config(retry_config)
            .timeout_config(timeout_config)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(profile.path_style)
            .build();

        tracing::debug!(profile = %profile.name, %endpoint, region = %profile.region, "S3 client configured");

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            profile: profile.name.clone(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

/// Map an SDK failure onto the engine's error kinds
fn sdk_error<E>(err: SdkError<E, HttpResponse>, target: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            return Error::StoreUnavailable(format!("{target}: {}", DisplayErrorContext(&err)));
        }
        SdkError::ConstructionFailure(_) => {
            return Error::General(format!("{target}: {}", DisplayErrorContext(&err)));
        }
        _ => {}
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    classify(
        err.code(),
        status,
        target,
        &DisplayErrorContext(&err).to_string(),
    )
}

/// Classify a service response by error code, then by HTTP status
fn classify(code: Option<&str>, status: Option<u16>, target: &str, detail: &str) -> Error {
    match code {
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => {
            return Error::NotFound(target.to_string());
        }
        Some(
            "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "Forbidden"
            | "ExpiredToken",
        ) => return Error::Auth(format!("{target}: {detail}")),
        Some("BucketAlreadyExists" | "BucketAlreadyOwnedByYou") => {
            return Error::Conflict(format!("bucket '{target}' already exists"));
        }
        _ => {}
    }

    match status {
        Some(404) => Error::NotFound(target.to_string()),
        Some(401 | 403) => Error::Auth(format!("{target}: {detail}")),
        Some(409) => Error::Conflict(format!("{target}: {detail}")),
        Some(500..=599) => Error::StoreUnavailable(format!("{target}: {detail}")),
        _ => Error::General(format!("{target}: {detail}")),
    }
}

fn strip_etag(etag: Option<&str>) -> String {
    etag.unwrap_or_default().trim_matches('"').to_string()
}

fn timestamp(value: Option<&DateTime>) -> Option<Timestamp> {
    value.and_then(|t| Timestamp::new(t.secs(), t.subsec_nanos() as i32).ok())
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error(e, &self.profile))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ListPage> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(options.prefix)
            .set_max_keys(options.max_keys)
            .set_continuation_token(options.continuation_token)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket))?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectDescriptor {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    etag: strip_etag(object.e_tag()),
                    last_modified: timestamp(object.last_modified()),
                })
            })
            .collect();

        Ok(ListPage {
            objects,
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectPayload> {
        let target = format!("{bucket}/{key}");
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(e, &target))?;

        let content_type = response
            .content_type()
            .unwrap_or(bp_core::traits::DEFAULT_CONTENT_TYPE)
            .to_string();
        let metadata: BTreeMap<String, String> = response
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let etag = strip_etag(response.e_tag());

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("{target}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(ObjectPayload {
            data,
            content_type,
            metadata,
            etag,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String> {
        let metadata: HashMap<String, String> = metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata((!metadata.is_empty()).then_some(metadata))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_error(e, &format!("{bucket}/{key}")))?;

        Ok(strip_etag(response.e_tag()))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(e, &format!("{bucket}/{key}")))?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.inner.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => match sdk_error(e, &format!("{bucket}/{key}")) {
                Error::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.inner.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => match sdk_error(e, bucket) {
                Error::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket))?;
        tracing::info!(bucket, "bucket created");
        Ok(())
    }
}
