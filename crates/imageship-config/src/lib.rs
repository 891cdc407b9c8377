//! imageship の公開先設定
//!
//! レジストリのホスト・名前空間と、ビルド対象プラットフォームの一覧を保持します。
//! 設定ファイルが無い場合は組み込みのデフォルト値を使用します。

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// デフォルトのレジストリホスト
pub const DEFAULT_REGISTRY_HOST: &str = "sjc.vultrcr.com";

/// デフォルトの名前空間
pub const DEFAULT_NAMESPACE: &str = "oosa";

/// デフォルトのプラットフォーム（この順序でビルドされる）
pub const DEFAULT_PLATFORMS: [&str; 2] = ["linux/amd64", "linux/arm64"];

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_ENV: &str = "IMAGESHIP_CONFIG";

const CANDIDATES: [&str; 2] = ["imageship.yaml", ".imageship.yaml"];

/// 公開先レジストリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTarget {
    pub host: String,
    pub namespace: String,
}

impl Default for RegistryTarget {
    fn default() -> Self {
        Self {
            host: DEFAULT_REGISTRY_HOST.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RegistryTarget {
    /// リポジトリパス `<host>/<namespace>/<image>`
    pub fn repository(&self, image: &str) -> String {
        format!("{}/{}/{}", self.host, self.namespace, image)
    }

    /// タグ付きイメージ参照 `<host>/<namespace>/<image>:<tag>`
    pub fn image_ref(&self, image: &str, tag: &str) -> String {
        format!("{}:{}", self.repository(image), tag)
    }
}

/// 公開設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub registry: RegistryTarget,
    pub platforms: Vec<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            registry: RegistryTarget::default(),
            platforms: DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl PublishConfig {
    /// 設定ファイルを探して読み込む。見つからなければデフォルト値
    pub fn load() -> Result<Self> {
        match find_config_file()? {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::debug!("No imageship config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// 指定したファイルから読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.host.trim().is_empty() {
            return Err(ConfigError::Invalid("registry.host が空です".to_string()));
        }
        if self.registry.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "registry.namespace が空です".to_string(),
            ));
        }
        if self.platforms.is_empty() {
            return Err(ConfigError::Invalid(
                "platforms には1つ以上のプラットフォームが必要です".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for platform in &self.platforms {
            let segments: Vec<&str> = platform.split('/').collect();
            if !(2..=3).contains(&segments.len()) || segments.iter().any(|s| s.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "プラットフォームの形式が不正です（os/arch[/variant]）: {}",
                    platform
                )));
            }
            if !seen.insert(platform.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "プラットフォームが重複しています: {}",
                    platform
                )));
            }
        }

        Ok(())
    }
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 IMAGESHIP_CONFIG (直接パス指定、存在しなければエラー)
/// 2. カレントディレクトリ: imageship.yaml, .imageship.yaml
/// 3. ~/.config/imageship/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::Invalid(format!(
            "{} で指定されたファイルが存在しません: {}",
            CONFIG_ENV,
            path.display()
        )));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("imageship").join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
