use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;

/// Layers are merged in this order, each overriding the last: global
/// (operator-wide defaults), project (this deployment's config file),
/// managed (pushed by a fleet manager, if any), env (process environment),
/// runtime (in-memory patches applied via the admin API), cli (flags passed
/// at launch). Only `project` and `runtime` are mutable after startup.
#[derive(Debug, Clone, Default)]
struct ConfigLayers {
    global: Value,
    project: Value,
    managed: Value,
    env: Value,
    runtime: Value,
    cli: Value,
}

#[derive(Clone)]
pub struct ConfigStore {
    project_path: PathBuf,
    global_path: PathBuf,
    layers: Arc<RwLock<ConfigLayers>>,
}

impl ConfigStore {
    pub async fn new(
        project_path: impl AsRef<Path>,
        global_path: impl AsRef<Path>,
        cli_overrides: Option<Value>,
    ) -> anyhow::Result<Self> {
        let project_path = project_path.as_ref().to_path_buf();
        let global_path = global_path.as_ref().to_path_buf();
        if let Some(parent) = project_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let project = read_json_file(&project_path).await.unwrap_or_else(empty_object);
        let global = read_json_file(&global_path).await.unwrap_or_else(empty_object);

        let layers = ConfigLayers {
            global,
            project,
            managed: empty_object(),
            env: env_layer(),
            runtime: empty_object(),
            cli: cli_overrides.unwrap_or_else(empty_object),
        };

        let store = Self {
            project_path,
            global_path,
            layers: Arc::new(RwLock::new(layers)),
        };
        store.save_project().await?;
        Ok(store)
    }

    pub async fn get_effective_value(&self) -> Value {
        let layers = self.layers.read().await.clone();
        let mut merged = empty_object();
        deep_merge(&mut merged, &layers.global);
        deep_merge(&mut merged, &layers.project);
        deep_merge(&mut merged, &layers.managed);
        deep_merge(&mut merged, &layers.env);
        deep_merge(&mut merged, &layers.runtime);
        deep_merge(&mut merged, &layers.cli);
        merged
    }

    /// A single effective key, e.g. `providers.openai.apiKey` — returns
    /// `None` if any path segment is absent.
    pub async fn get_path(&self, dotted_path: &str) -> Option<Value> {
        let merged = self.get_effective_value().await;
        let mut cursor = &merged;
        for segment in dotted_path.split('.') {
            cursor = cursor.get(segment)?;
        }
        Some(cursor.clone())
    }

    pub async fn patch_project(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.project, &patch);
        }
        self.save_project().await?;
        Ok(self.get_effective_value().await)
    }

    /// Runtime patches are the admin API's lever on top of whatever is on
    /// disk; they never persist, so a restart reverts to the file layers.
    pub async fn patch_runtime(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.runtime, &patch);
        }
        Ok(self.get_effective_value().await)
    }

    async fn save_project(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.project.clone();
        write_json_file(&self.project_path, &snapshot).await
    }

    #[allow(dead_code)]
    async fn save_global(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.global.clone();
        write_json_file(&self.global_path, &snapshot).await
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

async fn read_json_file(path: &Path) -> anyhow::Result<Value> {
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

async fn write_json_file(path: &Path, value: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).await?;
    Ok(())
}

/// Pulls a small fixed set of `THIRD_EYE_*` environment variables into the
/// env layer. Provider API keys live here rather than in the project file so
/// they never get written to disk by `patch_project`.
fn env_layer() -> Value {
    let mut root = Map::new();
    if let Ok(secret) = std::env::var("THIRD_EYE_SERVER_SECRET") {
        root.insert("serverSecret".to_string(), Value::String(secret));
    }
    if let Ok(addr) = std::env::var("THIRD_EYE_BIND_ADDR") {
        root.insert("bindAddr".to_string(), Value::String(addr));
    }
    Value::Object(root)
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile_shim::TempDir;

    mod tempfile_shim {
        use std::path::PathBuf;

        /// Minimal throwaway-directory helper so this crate doesn't need a
        /// `tempfile` dev-dependency just for two tests.
        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new() -> Self {
                let dir = std::env::temp_dir().join(format!(
                    "teye-core-config-test-{}",
                    uuid::Uuid::new_v4()
                ));
                std::fs::create_dir_all(&dir).unwrap();
                Self(dir)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn runtime_patch_overrides_project_without_persisting() {
        let dir = TempDir::new();
        let project_path = dir.path().join("project.json");
        let global_path = dir.path().join("global.json");
        let store = ConfigStore::new(&project_path, &global_path, None)
            .await
            .unwrap();
        store
            .patch_project(json!({"providers": {"openai": {"defaultModel": "gpt-4"}}}))
            .await
            .unwrap();
        store
            .patch_runtime(json!({"providers": {"openai": {"defaultModel": "gpt-4-turbo"}}}))
            .await
            .unwrap();

        let effective = store.get_path("providers.openai.defaultModel").await;
        assert_eq!(effective, Some(json!("gpt-4-turbo")));

        let on_disk: Value = serde_json::from_str(
            &tokio::fs::read_to_string(&project_path).await.unwrap(),
        )
        .unwrap();
        assert_eq!(
            on_disk["providers"]["openai"]["defaultModel"],
            json!("gpt-4")
        );
    }

    #[tokio::test]
    async fn missing_path_segment_returns_none() {
        let dir = TempDir::new();
        let store = ConfigStore::new(
            dir.path().join("project.json"),
            dir.path().join("global.json"),
            None,
        )
        .await
        .unwrap();
        assert_eq!(store.get_path("providers.missing.key").await, None);
    }
}
