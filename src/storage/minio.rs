use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{
    config::Credentials,
    primitives::ByteStream,
    types::{BucketCannedAcl, ObjectCannedAcl},
    Client, Config,
};
use bytes::Bytes;

use super::blob::BlobStorage;
use crate::{
    config::MinioConfig,
    error::{StoreError, StoreResult},
};

/// [`BlobStorage`] backed by one bucket of a MinIO/S3 endpoint.
#[derive(Clone)]
pub struct MinioBlobStorage {
    client: Client,
    config: MinioConfig,
    bucket: String,
}

impl MinioBlobStorage {
    pub fn new(config: &MinioConfig) -> Self {
        let creds = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "minio",
        );

        let s3_config = Config::builder()
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(creds)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            config: config.clone(),
            bucket: config.profile_pics_bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn ensure_bucket(&self) -> StoreResult<()> {
        let result = self.client.head_bucket().bucket(&self.bucket).send().await;

        if result.is_err() {
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .acl(BucketCannedAcl::PublicRead)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create bucket: {}", e))?;
            tracing::info!("Created bucket: {}", self.bucket);
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStorage for MinioBlobStorage {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StoreResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to upload file: {}", e)))?;

        Ok(self.public_url(path))
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to delete file: {}", e)))?;

        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        match &self.config.public_url {
            Some(public_url) => format!("{}/{}/{}", public_url, self.bucket, path),
            None => format!("{}/{}/{}", self.config.endpoint, self.bucket, path),
        }
    }
}
