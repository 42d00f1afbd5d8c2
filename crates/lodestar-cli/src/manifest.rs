//! Batch manifest loading.
//!
//! A manifest is a JSON file describing one deployment batch: the items,
//! the execution mode, and optional network defaults. Command-line flags
//! override anything the manifest sets.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use lodestar_core::{BatchDeploymentItem, BatchMode, BatchRequest};

/// On-disk description of a deployment batch.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchManifest {
    /// Batch identifier; generated when absent.
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Execution mode; defaults to sequential.
    #[serde(default)]
    pub mode: Option<BatchMode>,
    /// Concurrency cap for parallel mode.
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Default target network for this batch.
    #[serde(default)]
    pub network: Option<String>,
    /// Default source account for this batch.
    #[serde(default)]
    pub source_account: Option<String>,
    /// Optional RPC endpoint override.
    #[serde(default)]
    pub rpc_url: Option<String>,
    pub items: Vec<BatchDeploymentItem>,
}

impl BatchManifest {
    /// Load and parse a manifest, resolving relative item paths against the
    /// manifest's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest: BatchManifest = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        if let Some(base) = path.parent() {
            manifest.resolve_paths(base);
        }
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for item in &mut self.items {
            if let Some(dir) = item.source_dir.take() {
                item.source_dir = Some(if dir.is_relative() { base.join(dir) } else { dir });
            }
            if let Some(wasm) = item.wasm_path.take() {
                item.wasm_path = Some(if wasm.is_relative() {
                    base.join(wasm)
                } else {
                    wasm
                });
            }
        }
    }

    /// Turn the manifest into a runnable request, applying command-line
    /// overrides where given.
    pub fn into_request(
        self,
        mode_override: Option<BatchMode>,
        concurrency_override: Option<usize>,
    ) -> BatchRequest {
        let mut request = BatchRequest::new(
            mode_override
                .or(self.mode)
                .unwrap_or(BatchMode::Sequential),
            self.items,
        );
        if let Some(batch_id) = self.batch_id {
            request.batch_id = batch_id;
        }
        request.concurrency = concurrency_override.or(self.concurrency);
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("batch.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"{
                "mode": "parallel",
                "concurrency": 2,
                "network": "testnet",
                "items": [
                    {"id": "token", "name": "Token", "source_dir": "contracts/token"},
                    {"id": "nft", "name": "NFT", "wasm_path": "/prebuilt/nft.wasm"}
                ]
            }"#,
        );

        let manifest = BatchManifest::load(&path).unwrap();
        assert_eq!(manifest.mode, Some(BatchMode::Parallel));
        assert_eq!(manifest.concurrency, Some(2));
        assert_eq!(
            manifest.items[0].source_dir.as_deref(),
            Some(dir.path().join("contracts/token").as_path())
        );
        // Absolute paths pass through untouched.
        assert_eq!(
            manifest.items[1].wasm_path.as_deref(),
            Some(Path::new("/prebuilt/nft.wasm"))
        );
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = BatchManifest::load(Path::new("/nonexistent/batch.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read manifest"));
    }

    #[test]
    fn test_load_malformed_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), "{not json");
        let err = BatchManifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse manifest"));
    }

    #[test]
    fn test_into_request_applies_overrides() {
        let manifest = BatchManifest {
            batch_id: Some("release-7".to_string()),
            mode: Some(BatchMode::Sequential),
            concurrency: Some(2),
            network: None,
            source_account: None,
            rpc_url: None,
            items: Vec::new(),
        };

        let request = manifest.into_request(Some(BatchMode::Parallel), Some(8));
        assert_eq!(request.batch_id, "release-7");
        assert_eq!(request.mode, BatchMode::Parallel);
        assert_eq!(request.concurrency, Some(8));
    }

    #[test]
    fn test_into_request_defaults_to_sequential() {
        let manifest = BatchManifest {
            batch_id: None,
            mode: None,
            concurrency: None,
            network: None,
            source_account: None,
            rpc_url: None,
            items: Vec::new(),
        };

        let request = manifest.into_request(None, None);
        assert_eq!(request.mode, BatchMode::Sequential);
        assert!(request.batch_id.starts_with("batch-"));
    }
}
