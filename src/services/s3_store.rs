use crate::services::blob_store::{
    BlobStore, Operation, PresignRequest, StorageError, StorageResult, StoredObject,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// S3 backend. Signed URLs are SigV4 presigned requests minted locally by the
/// SDK; only listing goes over the network.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    /// Build a client from the ambient AWS credential chain.
    ///
    /// `endpoint_url` targets S3-compatible providers (e.g. MinIO at
    /// "http://localhost:9000"); path-style addressing is used in that case.
    pub async fn new(region: String, endpoint_url: Option<String>) -> Self {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()))
                .or_default_provider();

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            region,
        }
    }

    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<StoredObject>> {
        let start = Instant::now();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| {
                tracing::error!(
                    error = %DisplayErrorContext(&err),
                    bucket = %bucket,
                    region = %self.region,
                    "S3 list failed"
                );
                let no_such_bucket = matches!(
                    &err,
                    SdkError::ServiceError(service) if service.err().is_no_such_bucket()
                );
                if no_such_bucket {
                    StorageError::BucketNotFound(bucket.to_string())
                } else {
                    StorageError::Backend(DisplayErrorContext(&err).to_string())
                }
            })?;

            for item in page.contents() {
                let Some(key) = item.key() else {
                    tracing::warn!(bucket = %bucket, "Skipping listing entry without a key");
                    continue;
                };
                let last_modified = item
                    .last_modified()
                    .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                objects.push(StoredObject {
                    key: key.to_string(),
                    size: item.size().unwrap_or_default(),
                    last_modified,
                });
            }
        }

        tracing::info!(
            bucket = %bucket,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );

        Ok(objects)
    }

    async fn presign(&self, bucket: &str, request: &PresignRequest) -> StorageResult<String> {
        if request.key.is_empty() {
            return Err(StorageError::InvalidObjectKey(request.key.clone()));
        }

        let presigning_config = PresigningConfig::expires_in(request.expires_in)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let fail = |message: String| {
            tracing::error!(
                error = %message,
                bucket = %bucket,
                key = %request.key,
                operation = request.operation.as_str(),
                "S3 presign failed"
            );
            StorageError::Presign(message)
        };

        let presigned = match request.operation {
            Operation::Put => self
                .client
                .put_object()
                .bucket(bucket)
                .key(&request.key)
                .set_content_type(request.content_type.clone())
                .presigned(presigning_config)
                .await
                .map_err(|err| fail(DisplayErrorContext(&err).to_string()))?,
            Operation::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(&request.key)
                .set_response_content_disposition(request.inline.then(|| "inline".to_string()))
                .set_response_content_type(request.content_type.clone())
                .presigned(presigning_config)
                .await
                .map_err(|err| fail(DisplayErrorContext(&err).to_string()))?,
        };

        tracing::debug!(
            bucket = %bucket,
            key = %request.key,
            operation = request.operation.as_str(),
            expires_in_secs = request.expires_in.as_secs(),
            "Generated signed URL"
        );

        Ok(presigned.uri().to_string())
    }

    /// `HeadBucket` on the configured bucket; needs only bucket-scoped access.
    async fn ping(&self, bucket: &str) -> StorageResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service))
                if service.err().is_not_found() || service.raw().status().as_u16() == 404 =>
            {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Backend(DisplayErrorContext(&err).to_string())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
