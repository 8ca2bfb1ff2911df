//! Metadata sources: Facter facts and OpenStack instance metadata.

use crate::file::{env_overrides, load_config_file};
use crate::metadata::{FACTS_KEY, INSTANCE_META_KEY};
use crate::{ConfigError, ConfigResult, HostMetadata, Settings};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Timeout for the instance metadata request.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `facter -j` and parse its JSON output.
pub async fn load_facts(facter_bin: &str) -> ConfigResult<Value> {
    let output = Command::new(facter_bin)
        .arg("-j")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(ConfigError::Source {
            source_name: FACTS_KEY.to_string(),
            message: format!("facter exited with {}: {}", output.status, stderr.trim()),
        });
    }

    let facts: Value = serde_json::from_slice(&output.stdout)?;
    if let Some(version) = facts.get("facterversion").and_then(Value::as_str) {
        debug!(facter_version = %version, "Facts loaded");
    }
    Ok(facts)
}

/// Fetch instance metadata JSON from the cloud metadata endpoint.
pub async fn fetch_instance_metadata(url: &str) -> ConfigResult<Value> {
    let source_error = |message: String| ConfigError::Source {
        source_name: INSTANCE_META_KEY.to_string(),
        message,
    };

    let client = reqwest::Client::builder()
        .timeout(METADATA_TIMEOUT)
        .build()
        .map_err(|e| source_error(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| source_error(e.to_string()))?;

    if !response.status().is_success() {
        return Err(source_error(format!("{} returned {}", url, response.status())));
    }

    response
        .json()
        .await
        .map_err(|e| source_error(e.to_string()))
}

/// Build the merged host metadata for one command invocation.
///
/// Source failures are logged and the remaining sources still load.
pub async fn load_metadata(config_path: Option<&Path>) -> ConfigResult<HostMetadata> {
    let (file_tree, used) = load_config_file(config_path)?;
    if let Some(path) = used {
        debug!(path = %path.display(), "Using config file");
    }

    let mut metadata = HostMetadata::from_value(file_tree);
    for (path, value) in env_overrides(std::env::vars()) {
        metadata.set_path(&path, value);
    }

    // Sources are selected by the static configuration alone
    let base = Settings::from_metadata(&metadata)?;

    if base.stackconf.source_enabled(FACTS_KEY) {
        debug!("Facter enabled: starting");
        match load_facts("facter").await {
            Ok(facts) => metadata.merge_source(FACTS_KEY, facts),
            Err(e) => warn!(error = %e, "Facter failed, continuing without facts"),
        }
    }

    if base.stackconf.source_enabled(INSTANCE_META_KEY) {
        debug!(url = %base.stackconf.metadata_url, "Fetching instance metadata");
        match fetch_instance_metadata(&base.stackconf.metadata_url).await {
            Ok(meta) => {
                metadata.merge_source(INSTANCE_META_KEY, meta);
                metadata.apply_instance_overrides();
            }
            Err(e) => warn!(error = %e, "Instance metadata unavailable, continuing without it"),
        }
    }

    metadata.apply_stackenv();
    info!("Host metadata loaded");
    Ok(metadata)
}
