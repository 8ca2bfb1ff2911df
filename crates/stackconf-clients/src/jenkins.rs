//! Jenkins job creation client.

use reqwest::Client;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::ClientError;

pub struct JenkinsClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl JenkinsClient {
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, ClientError> {
        let base = Url::parse(host)
            .map_err(|e| ClientError::InvalidInput(format!("bad Jenkins host '{}': {}", host, e)))?;

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn create_item_url(&self, name: &str) -> String {
        format!("{}/createItem?name={}", self.base_url, urlencoding::encode(name))
    }

    /// Create a job from its XML definition.
    pub async fn create_item(&self, name: &str, config_xml: String) -> Result<(), ClientError> {
        if name.is_empty() {
            return Err(ClientError::InvalidInput("job name is empty".to_string()));
        }

        let response = self
            .client
            .post(self.create_item_url(name))
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/xml")
            .body(config_xml)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!(job = %name, "Jenkins job created");
        Ok(())
    }
}
