use crate::models::RemoteObject;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Read-only access to the remote object store
#[async_trait]
pub trait RemoteObjectSource: Send + Sync {
    /// Lazily enumerates objects under `prefix` in listing order. The stream
    /// is finite and cannot be restarted; an `Err` item ends the listing.
    fn list_under_prefix<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<RemoteObject>>;

    /// Writes the full object body to `local_path`, creating parent
    /// directories when absent. A failed download leaves no file behind.
    async fn download_to(&self, object: &RemoteObject, local_path: &Path) -> Result<()>;
}

pub struct S3ObjectSource {
    client: Client,
    bucket: String,
}

impl S3ObjectSource {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn write_body(&self, key: &str, local_path: &Path) -> Result<u64> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    anyhow!("object not found: {}/{}", self.bucket, key)
                } else {
                    anyhow!(service_error)
                }
            })?;

        let mut body = res.body;
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl RemoteObjectSource for S3ObjectSource {
    fn list_under_prefix<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<RemoteObject>> {
        Box::pin(async_stream::stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                let res = match self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                {
                    Ok(res) => res,
                    Err(e) => {
                        yield Err(anyhow!(
                            "list_objects_v2 failed for {}/{}: {}",
                            self.bucket,
                            prefix,
                            e.into_service_error()
                        ));
                        return;
                    }
                };

                for object in res.contents.unwrap_or_default() {
                    if let Some(key) = object.key {
                        yield Ok(RemoteObject::new(key).with_size(object.size));
                    }
                }

                if res.is_truncated.unwrap_or(false) {
                    continuation_token = res.next_continuation_token;
                } else {
                    break;
                }
            }
        })
    }

    async fn download_to(&self, object: &RemoteObject, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Bytes land in a sibling file first so a failed download never
        // touches a copy retained by an earlier run
        let partial = partial_path(local_path);
        match self.write_body(&object.key, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, local_path).await?;
                tracing::debug!("Wrote {} bytes for {} to {:?}", bytes, object.key, local_path);
                Ok(())
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&partial).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            "Failed to remove partial download {:?}: {}",
                            partial,
                            remove_err
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

/// `<dir>/a.png` -> `<dir>/a.png.part`
pub fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    local_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    fn unreachable_source() -> S3ObjectSource {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url("http://127.0.0.1:1")
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("minioadmin", "minioadmin", None, None, "static"))
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        S3ObjectSource::new(Client::from_conf(config), "data-upload".to_string())
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/stage/1/a.png")),
            PathBuf::from("/tmp/stage/1/a.png.part")
        );
    }

    #[tokio::test]
    async fn test_failed_download_keeps_retained_file() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("1").join("a.png");
        std::fs::create_dir_all(local_path.parent().unwrap()).unwrap();
        std::fs::write(&local_path, b"kept after a failed push").unwrap();

        let source = unreachable_source();
        let object = RemoteObject::new("p/1/a.png");
        assert!(source.download_to(&object, &local_path).await.is_err());

        assert_eq!(std::fs::read(&local_path).unwrap(), b"kept after a failed push");
        assert!(!partial_path(&local_path).exists());
    }

    #[tokio::test]
    async fn test_failed_listing_yields_error() {
        use futures::StreamExt;

        let source = unreachable_source();
        let mut objects = source.list_under_prefix("p/");
        assert!(objects.next().await.unwrap().is_err());
        assert!(objects.next().await.is_none());
    }
}
