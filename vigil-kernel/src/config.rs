use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use vigil_core::RegistryConfig;

pub const CONFIG_ENV: &str = "VIGIL_KERNEL_CONFIG";
pub const API_KEY_ENV: &str = "VIGIL_API_KEY";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub registry: RegistryConfig,
    pub store: StoreConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConf {
    /// Fichier JSON des ressources ; absent = stockage mémoire uniquement
    pub path: Option<PathBuf>,
    pub flush_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String, // ex: "0.0.0.0:8080"
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("./data/resources.json")),
            flush_interval_secs: 10,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl StoreConf {
    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(&path).await
}

/// Fichier absent, vide ou invalide : config par défaut (jamais fatal)
pub async fn load_config_from(path: impl AsRef<Path>) -> KernelConfig {
    let path = path.as_ref();
    if !path.exists() {
        warn!(path = %path.display(), "[kernel] pas de fichier de config, usage config par défaut");
        return KernelConfig::default();
    }

    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    let cfg: KernelConfig = match serde_yaml::from_str(&txt) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("[kernel] config invalide: {e}");
            return KernelConfig::default();
        }
    };
    if let Err(e) = cfg.registry.validate() {
        warn!("[kernel] config registre rejetée: {e}");
        return KernelConfig { registry: RegistryConfig::default(), ..cfg };
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let cfg = load_config_from("/definitely/not/here.yaml").await;
        assert_eq!(cfg, KernelConfig::default());
    }

    #[tokio::test]
    async fn partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "registry:\n  stale_after_secs: 120\nhttp:\n  bind: 127.0.0.1:9090\n").unwrap();

        let cfg = load_config_from(&path).await;
        assert_eq!(cfg.registry.stale_after_secs, 120);
        assert_eq!(cfg.registry.sweep_interval_secs, 60);
        assert_eq!(cfg.http.bind, "127.0.0.1:9090");
        assert_eq!(cfg.store, StoreConf::default());
    }

    #[tokio::test]
    async fn invalid_registry_section_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "registry:\n  stale_after_secs: 0\nstore:\n  path: null\n").unwrap();

        let cfg = load_config_from(&path).await;
        assert_eq!(cfg.registry, RegistryConfig::default());
        assert_eq!(cfg.store.path, None);
    }

    #[tokio::test]
    async fn garbage_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "registry: [unclosed").unwrap();
        assert_eq!(load_config_from(&path).await, KernelConfig::default());
    }
}
