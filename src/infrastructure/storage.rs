use crate::config::IngestConfig;
use crate::services::storage::S3DurableStore;
use anyhow::{Context, Result};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use std::env;
use std::sync::Arc;
use tracing::info;

/// Path-style S3 client with static credentials, suitable for MinIO and AWS alike.
pub async fn build_client(
    endpoint_url: &str,
    region: String,
    access_key: String,
    secret_key: String,
) -> Client {
    let aws_config = aws_config::from_env()
        .endpoint_url(endpoint_url)
        .region(Region::new(region))
        .credentials_provider(Credentials::new(access_key, secret_key, None, None, "static"))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();
    Client::from_conf(s3_config)
}

pub async fn setup_storage(config: &IngestConfig) -> Result<Arc<S3DurableStore>> {
    let endpoint_url = env::var("S3_ENDPOINT").context("S3_ENDPOINT must be set")?;
    let access_key = env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY must be set")?;
    let secret_key = env::var("S3_SECRET_KEY").context("S3_SECRET_KEY must be set")?;
    let bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;
    let region = env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());

    info!("☁️  S3 Storage: {} (Bucket: {}, Region: {})", endpoint_url, bucket, region);

    let client = build_client(&endpoint_url, region, access_key, secret_key).await;

    if client.head_bucket().bucket(&bucket).send().await.is_err() {
        info!("🪣 Bucket {} not found, creating it", bucket);
        client
            .create_bucket()
            .bucket(&bucket)
            .send()
            .await
            .with_context(|| format!("Failed to create bucket {}", bucket))?;
    }

    Ok(Arc::new(S3DurableStore::new(
        client,
        bucket,
        config.environment.clone(),
        config.upload_part_size,
    )))
}
