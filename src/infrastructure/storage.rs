use crate::config::StorageConfig;
use crate::services::storage::S3ObjectSource;
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_source(config: &StorageConfig) -> Arc<S3ObjectSource> {
    info!(
        "☁️  Remote storage: {} (Container: {}, Prefix: {})",
        config.endpoint, config.container, config.prefix
    );

    let aws_config = aws_config::from_env()
        .endpoint_url(&config.endpoint)
        .region(Region::new(config.region.clone()))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Read-only tool: report a missing container but never create one
    match s3_client.head_bucket().bucket(&config.container).send().await {
        Ok(_) => info!("✅ Container '{}' is reachable", config.container),
        Err(e) => tracing::warn!(
            "⚠️  Container '{}' not reachable yet ({}); listing will report the failure",
            config.container,
            e
        ),
    }

    Arc::new(S3ObjectSource::new(s3_client, config.container.clone()))
}
