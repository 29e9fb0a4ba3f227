// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Kit registry: the logical set of kits and where it comes from.
//!
//! Kits materialise from three sources: the YAML kit file (applied once at
//! startup, never overwriting admin edits, never resurrecting tombstoned
//! kits), the admin CRUD endpoints, and auto-registration from the bus.
//! Readers get a copy-on-update snapshot; every mutation path reloads the
//! snapshot from the store afterwards.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use skywarden::records::{KitSource, KitUpsert};
use skywarden_store::{Kit, Repository, Writer};

use crate::error::{IngestError, Result};

/// One entry of the YAML kit list file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KitFileEntry {
    pub kit_id: Option<String>,
    pub api_url: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Parse the kit list file.
pub fn load_kit_file(path: &str) -> Result<Vec<KitFileEntry>> {
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::KitFileIo {
        path: path.to_string(),
        source,
    })?;
    parse_kit_file(path, &content)
}

fn parse_kit_file(path: &str, content: &str) -> Result<Vec<KitFileEntry>> {
    serde_yaml::from_str(content).map_err(|source| IngestError::KitFileParse {
        path: path.to_string(),
        source,
    })
}

/// Normalise a kit API URL: strip trailing slashes, default the scheme.
pub fn normalize_api_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Derive a kit id from its API URL when the kit did not tell us one.
pub fn generate_kit_id(api_url: &str) -> String {
    let without_scheme = api_url
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let host = without_scheme
        .split(['/', ':'])
        .next()
        .filter(|h| !h.is_empty())
        .unwrap_or("unknown");
    format!("kit-{}", host.replace('.', "-"))
}

/// Result of a connection probe against a kit URL.
#[derive(Debug, Clone, Serialize)]
pub struct KitTestResult {
    pub success: bool,
    pub kit_id: Option<String>,
    pub message: String,
    pub response_time_ms: Option<f64>,
}

/// Issue a single bounded probe against `{api_url}/status` and report
/// reachability, the kit's self-identified id, and latency.
pub async fn probe_kit(client: &reqwest::Client, api_url: &str) -> KitTestResult {
    let api_url = normalize_api_url(api_url);
    let started = Instant::now();

    match client.get(format!("{api_url}/status")).send().await {
        Ok(response) => {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            if response.status().is_success() {
                let kit_id = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| skywarden::normalize::str_field(&body, &["kit_id", "uid"]));
                KitTestResult {
                    success: true,
                    kit_id,
                    message: "Successfully connected to kit".to_string(),
                    response_time_ms: Some((elapsed_ms * 100.0).round() / 100.0),
                }
            } else {
                KitTestResult {
                    success: false,
                    kit_id: None,
                    message: format!("Kit returned HTTP {}", response.status().as_u16()),
                    response_time_ms: Some((elapsed_ms * 100.0).round() / 100.0),
                }
            }
        }
        Err(err) if err.is_timeout() => KitTestResult {
            success: false,
            kit_id: None,
            message: "Connection timed out".to_string(),
            response_time_ms: None,
        },
        Err(err) => KitTestResult {
            success: false,
            kit_id: None,
            message: format!("Connection refused or unreachable: {err}"),
            response_time_ms: None,
        },
    }
}

/// The in-memory kit view.
///
/// Readers clone an `Arc` snapshot and never block writers; the single
/// mutator path swaps the snapshot after reloading from the store.
#[derive(Debug)]
pub struct Registry {
    repo: Repository,
    snapshot: RwLock<Arc<Vec<Kit>>>,
}

impl Registry {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current snapshot; cheap to call from any task.
    pub fn kits(&self) -> Arc<Vec<Kit>> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    /// Reload the snapshot from the store.
    pub async fn refresh(&self) -> Result<()> {
        let kits = self.repo.list_kits().await?;
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = Arc::new(kits);
        }
        Ok(())
    }

    /// Apply the YAML kit list: adds missing kits only. Entries without a
    /// kit id get one derived from their URL; entries without a URL are
    /// registered as bus-only kits.
    pub async fn apply_kit_file(&self, writer: &Writer, entries: &[KitFileEntry]) -> Result<usize> {
        let mut added = 0;
        for entry in entries {
            let api_url = entry.api_url.as_deref().map(normalize_api_url);
            let kit_id = match (&entry.kit_id, &api_url) {
                (Some(id), _) => id.clone(),
                (None, Some(url)) => generate_kit_id(url),
                (None, None) => {
                    tracing::warn!("kit file entry with neither kit_id nor api_url skipped");
                    continue;
                }
            };

            let source = if api_url.is_some() {
                KitSource::Http
            } else {
                KitSource::Mqtt
            };

            let upsert = KitUpsert {
                kit_id,
                name: entry.name.clone(),
                location: entry.location.clone(),
                api_url,
                source,
                enabled: Some(entry.enabled),
            };
            if writer.register_config_kit(&upsert).await? {
                added += 1;
            }
        }
        self.refresh().await?;
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kit_file() {
        let yaml = r#"
- kit_id: kit-roof
  api_url: http://192.168.1.100:8088
  name: Roof kit
  location: HQ roof
- api_url: 192.168.1.101:8088
- kit_id: kit-mobile
  enabled: false
"#;
        let entries = parse_kit_file("kits.yaml", yaml).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kit_id.as_deref(), Some("kit-roof"));
        assert!(entries[0].enabled);
        assert!(entries[1].kit_id.is_none());
        assert!(!entries[2].enabled);
        assert!(entries[2].api_url.is_none());
    }

    #[test]
    fn test_parse_kit_file_rejects_garbage() {
        assert!(parse_kit_file("kits.yaml", "just a string").is_err());
        assert!(parse_kit_file("kits.yaml", "kit_id: [unclosed").is_err());
    }

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(
            normalize_api_url("http://192.168.1.100:8088/"),
            "http://192.168.1.100:8088"
        );
        assert_eq!(
            normalize_api_url("192.168.1.100:8088"),
            "http://192.168.1.100:8088"
        );
        assert_eq!(
            normalize_api_url("https://kit.example.com"),
            "https://kit.example.com"
        );
    }

    #[test]
    fn test_generate_kit_id() {
        assert_eq!(
            generate_kit_id("http://192.168.1.100:8088"),
            "kit-192-168-1-100"
        );
        assert_eq!(
            generate_kit_id("https://kit.example.com/api"),
            "kit-kit-example-com"
        );
    }
}
