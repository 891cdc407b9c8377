//! ビルド対象プラットフォーム

use crate::error::{BuildError, BuildResult};
use imageship_config::PublishConfig;
use std::fmt;
use std::str::FromStr;

/// `os/arch[/variant]` 形式のプラットフォーム
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub variant: Option<String>,
}

impl Platform {
    pub fn linux(arch: &str) -> Self {
        Self {
            os: "linux".to_string(),
            arch: arch.to_string(),
            variant: None,
        }
    }

    /// プラットフォーム別イメージのタグ接尾辞
    ///
    /// - `linux/amd64` -> `amd64`
    /// - `linux/arm/v7` -> `arm-v7`
    pub fn tag_suffix(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}-{}", self.arch, variant),
            None => self.arch.clone(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}/{}", self.os, self.arch, variant),
            None => write!(f, "{}/{}", self.os, self.arch),
        }
    }
}

impl FromStr for Platform {
    type Err = BuildError;

    fn from_str(s: &str) -> BuildResult<Self> {
        let valid_segment =
            |seg: &str| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        let parts: Vec<&str> = s.trim().split('/').collect();
        if !(2..=3).contains(&parts.len()) || !parts.iter().all(|p| valid_segment(p)) {
            return Err(BuildError::InvalidPlatform(s.to_string()));
        }

        Ok(Self {
            os: parts[0].to_string(),
            arch: parts[1].to_string(),
            variant: parts.get(2).map(|v| v.to_string()),
        })
    }
}

/// ビルドするプラットフォームの一覧（順序はマニフェスト内の順序になる）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMatrix {
    platforms: Vec<Platform>,
}

impl Default for PlatformMatrix {
    fn default() -> Self {
        Self {
            platforms: vec![
                Platform::linux("amd64"), // x86_64
                Platform::linux("arm64"), // aarch64
            ],
        }
    }
}

impl PlatformMatrix {
    pub fn new(platforms: Vec<Platform>) -> BuildResult<Self> {
        if platforms.is_empty() {
            return Err(BuildError::InvalidConfig(
                "at least one platform is required".to_string(),
            ));
        }
        for (i, platform) in platforms.iter().enumerate() {
            if platforms[..i].contains(platform) {
                return Err(BuildError::InvalidConfig(format!(
                    "duplicate platform: {}",
                    platform
                )));
            }
        }
        Ok(Self { platforms })
    }

    pub fn from_config(config: &PublishConfig) -> BuildResult<Self> {
        let platforms = config
            .platforms
            .iter()
            .map(|p| p.parse())
            .collect::<BuildResult<Vec<Platform>>>()?;
        Self::new(platforms)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    /// 最も長いタグ接尾辞の文字数
    pub fn max_suffix_len(&self) -> usize {
        self.platforms
            .iter()
            .map(|p| p.tag_suffix().len())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matrix() {
        let matrix = PlatformMatrix::default();
        let names: Vec<String> = matrix.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["linux/amd64", "linux/arm64"]);
    }

    #[test]
    fn test_parse_platform() {
        let p: Platform = "linux/arm/v7".parse().unwrap();
        assert_eq!(p.os, "linux");
        assert_eq!(p.arch, "arm");
        assert_eq!(p.variant.as_deref(), Some("v7"));
        assert_eq!(p.to_string(), "linux/arm/v7");
        assert_eq!(p.tag_suffix(), "arm-v7");

        let p: Platform = "linux/amd64".parse().unwrap();
        assert_eq!(p.tag_suffix(), "amd64");
    }

    #[test]
    fn test_parse_invalid_platform() {
        assert!("amd64".parse::<Platform>().is_err());
        assert!("linux/".parse::<Platform>().is_err());
        assert!("linux/arm/v7/extra".parse::<Platform>().is_err());
        assert!("linux/amd 64".parse::<Platform>().is_err());
    }

    #[test]
    fn test_matrix_from_default_config() {
        let matrix = PlatformMatrix::from_config(&PublishConfig::default()).unwrap();
        assert_eq!(matrix, PlatformMatrix::default());
    }

    #[test]
    fn test_matrix_rejects_duplicates_and_empty() {
        assert!(PlatformMatrix::new(vec![]).is_err());
        assert!(
            PlatformMatrix::new(vec![Platform::linux("amd64"), Platform::linux("amd64")]).is_err()
        );
    }
}
