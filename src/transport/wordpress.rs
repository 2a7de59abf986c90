//! WordPress media library transport over the REST API.

use async_trait::async_trait;
use reqwest::multipart;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{BlobTransport, TransportError, TransportResult};

pub struct WordPressTransport {
    api_url: String,
    username: String,
    app_password: String,
    client: reqwest::Client,
}

impl WordPressTransport {
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        app_password: impl Into<String>,
    ) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            api_url: api_url.into(),
            username: username.into(),
            app_password: app_password.into(),
            client,
        })
    }

    fn public_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.api_url, file_name)
    }
}

#[async_trait]
impl BlobTransport for WordPressTransport {
    async fn download(&self, url: &str, dest: &Path) -> TransportResult {
        debug!(%url, dest = %dest.display(), "downloading asset");

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::DownloadFailed {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    async fn upload(&self, path: &Path) -> TransportResult<String> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        debug!(path = %path.display(), %file_name, "uploading to media library");

        let bytes = tokio::fs::read(path).await?;
        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name.clone()));

        let response = self
            .client
            .post(format!("{}/media", self.api_url))
            .basic_auth(&self.username, Some(&self.app_password))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(self.public_url(&file_name))
    }
}
