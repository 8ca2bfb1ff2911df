//! Foreman API client.
//!
//! Talks to `<host>/api/` with basic auth. Records are exchanged as raw JSON;
//! the pipeline only relies on `id`, `name` and `title`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use stackconf_core::inventory::Inventory;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::ClientError;

/// Page size for substring searches.
const SEARCH_PAGE_SIZE: &str = "1000";

/// Foreman inventory client.
pub struct ForemanClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl ForemanClient {
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, ClientError> {
        let base = Url::parse(host)
            .map_err(|e| ClientError::InvalidInput(format!("bad Foreman host '{}': {}", host, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Field the collection is searched by; nested collections use `title`.
    fn search_field(collection: &str) -> &'static str {
        match collection {
            "hostgroups" | "locations" | "organizations" => "title",
            _ => "name",
        }
    }
}

/// Pick the record whose name or title equals `name`.
pub(crate) fn exact_match(results: &[Value], name: &str) -> Option<Value> {
    results
        .iter()
        .find(|r| {
            r.get("name").and_then(Value::as_str) == Some(name)
                || r.get("title").and_then(Value::as_str) == Some(name)
        })
        .cloned()
}

fn results_of(body: &Value) -> Result<Vec<Value>, ClientError> {
    body.get("results")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ClientError::Parse("response has no results collection".to_string()))
}

/// Whether `subtotal` reports more matches than collected so far.
fn has_more_pages(body: &Value, collected: usize, fetched: usize) -> bool {
    let Some(subtotal) = body.get("subtotal").and_then(Value::as_u64) else {
        return false;
    };
    fetched > 0 && (collected as u64) < subtotal
}

#[async_trait]
impl Inventory for ForemanClient {
    async fn search(&self, collection: &str, name: &str) -> stackconf_core::Result<Option<Value>> {
        let query = format!("{}=\"{}\"", Self::search_field(collection), name);
        debug!(collection = %collection, query = %query, "Foreman search");
        let body = self
            .send(self.client.get(self.url(collection)).query(&[("search", query)]))
            .await?;
        Ok(exact_match(&results_of(&body)?, name))
    }

    async fn search_any(&self, collection: &str, term: &str) -> stackconf_core::Result<Vec<Value>> {
        debug!(collection = %collection, term = %term, "Foreman substring search");
        let mut records = Vec::new();
        let mut page: u32 = 1;
        loop {
            let page_param = page.to_string();
            let body = self
                .send(self.client.get(self.url(collection)).query(&[
                    ("search", term),
                    ("per_page", SEARCH_PAGE_SIZE),
                    ("page", page_param.as_str()),
                ]))
                .await?;
            let results = results_of(&body)?;
            let fetched = results.len();
            records.extend(results);
            if !has_more_pages(&body, records.len(), fetched) {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn post(&self, collection: &str, body: &Value) -> stackconf_core::Result<Value> {
        Ok(self
            .send(self.client.post(self.url(collection)).json(body))
            .await?)
    }

    async fn put(&self, path: &str, body: &Value) -> stackconf_core::Result<Value> {
        Ok(self.send(self.client.put(self.url(path)).json(body)).await?)
    }

    async fn delete(&self, path: &str) -> stackconf_core::Result<Value> {
        Ok(self.send(self.client.delete(self.url(path))).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_building() {
        let client = ForemanClient::new("https://foreman.example.com/", "api", "pw").unwrap();
        assert_eq!(client.url("hosts/12"), "https://foreman.example.com/api/hosts/12");
        assert_eq!(client.url("/domains"), "https://foreman.example.com/api/domains");
    }

    #[test]
    fn test_invalid_host_rejected() {
        assert!(matches!(
            ForemanClient::new("not a url", "api", "pw"),
            Err(ClientError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_exact_match_by_name_or_title() {
        let results = vec![
            json!({"id": 1, "name": "web", "title": "acme/web"}),
            json!({"id": 2, "name": "web1.example.com"}),
        ];
        assert_eq!(exact_match(&results, "acme/web").unwrap()["id"], 1);
        assert_eq!(exact_match(&results, "web1.example.com").unwrap()["id"], 2);
        assert!(exact_match(&results, "web1").is_none());
    }

    #[test]
    fn test_results_collection_required() {
        assert!(results_of(&json!({"results": []})).unwrap().is_empty());
        assert!(matches!(
            results_of(&json!({"error": "x"})),
            Err(ClientError::Parse(_))
        ));
    }

    #[test]
    fn test_has_more_pages() {
        let body = json!({"subtotal": 2500, "results": []});
        assert!(has_more_pages(&body, 1000, 1000));
        assert!(has_more_pages(&body, 2000, 1000));
        assert!(!has_more_pages(&body, 2500, 500));
        // An empty page ends paging even when the count disagrees
        assert!(!has_more_pages(&body, 2000, 0));
        assert!(!has_more_pages(&json!({"results": []}), 1000, 1000));
    }

    #[test]
    fn test_search_field() {
        assert_eq!(ForemanClient::search_field("hostgroups"), "title");
        assert_eq!(ForemanClient::search_field("hosts"), "name");
    }
}
