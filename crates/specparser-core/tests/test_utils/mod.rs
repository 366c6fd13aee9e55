//! Test utilities for specparser integration tests

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

// External imports (alphabetized)
use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;

/// Path of a fixture document shipped with the tests
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Creates a temporary directory for test outputs
pub fn create_temp_dir() -> anyhow::Result<(TempDir, PathBuf)> {
    let temp_dir = tempfile::tempdir()?;
    let temp_path = temp_dir.path().to_path_buf();
    Ok((temp_dir, temp_path))
}

/// Writes a minimal Teams app manifest and returns its path
pub async fn create_app_manifest(dir: &Path, extra: JsonValue) -> anyhow::Result<PathBuf> {
    let mut manifest = json!({
        "manifestVersion": "1.17",
        "id": "00000000-0000-0000-0000-000000000000",
        "name": {"short": "petstore", "full": "Petstore"}
    });
    if let (Some(target), Some(source)) = (manifest.as_object_mut(), extra.as_object()) {
        target.extend(source.clone());
    }
    let path = dir.join("appPackage").join("manifest.json");
    tokio::fs::create_dir_all(dir.join("appPackage")).await?;
    tokio::fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;
    Ok(path)
}

/// Reads a JSON file
pub async fn read_json(path: &Path) -> anyhow::Result<JsonValue> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Names of the files directly inside a directory, sorted
pub fn file_names(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
