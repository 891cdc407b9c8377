//! 公開リクエストとタグ集合

use crate::auth::RegistryCredentials;
use crate::error::{BuildError, BuildResult};
use crate::platform::PlatformMatrix;
use crate::resolver::{BuildResolver, ResolvedBuild};
use std::path::PathBuf;

/// 常に公開されるローリングタグ
pub const LATEST_TAG: &str = "latest";

/// Docker タグの最大長
pub const MAX_TAG_LEN: usize = 128;

/// 1回の公開に必要な入力
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub source: PathBuf,
    pub image_name: String,
    pub dockerfile: String,
    /// None はデフォルトのタグ付け（latest のみ）
    pub tag: Option<String>,
    pub credentials: RegistryCredentials,
}

impl BuildRequest {
    /// 空文字のタグは未指定として扱う
    pub fn new(
        source: impl Into<PathBuf>,
        image_name: impl Into<String>,
        dockerfile: impl Into<String>,
        tag: Option<&str>,
        credentials: RegistryCredentials,
    ) -> Self {
        Self {
            source: source.into(),
            image_name: image_name.into(),
            dockerfile: dockerfile.into(),
            tag: tag
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            credentials,
        }
    }

    pub fn tag_set(&self) -> TagSet {
        TagSet::from_tag(self.tag.as_deref())
    }

    /// イメージ名・タグ・Dockerfile の位置を検証し、ビルド入力を解決する
    ///
    /// プラットフォーム別タグ `<tag>-<suffix>` も 128 文字に収まる必要がある
    pub fn validate(&self, platforms: &PlatformMatrix) -> BuildResult<ResolvedBuild> {
        validate_image_name(&self.image_name)?;

        let max_len = MAX_TAG_LEN.saturating_sub(platforms.max_suffix_len() + 1);
        for tag in self.tag_set().iter() {
            validate_tag(tag)?;
            if tag.len() > max_len {
                return Err(BuildError::InvalidTag {
                    tag: format!(
                        "Tag too long for per-platform tags ({} characters, max {})",
                        tag.len(),
                        max_len
                    ),
                });
            }
        }

        BuildResolver::new(&self.source).resolve(&self.dockerfile)
    }
}

/// 公開するタグの並び
///
/// 指定タグがあれば `[tag, latest]`、無ければ `[latest]`。
/// `latest` を明示した場合も2回公開する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(str::trim) {
            Some(tag) if !tag.is_empty() => {
                Self(vec![tag.to_string(), LATEST_TAG.to_string()])
            }
            _ => Self(vec![LATEST_TAG.to_string()]),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// リポジトリ名の検証
///
/// 小文字英数字と `.` `_` `-` からなるコンポーネントを `/` で連結したもの
pub fn validate_image_name(name: &str) -> BuildResult<()> {
    if name.is_empty() {
        return Err(BuildError::InvalidImageName("(empty)".to_string()));
    }

    for component in name.split('/') {
        let valid = !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
            && component
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(BuildError::InvalidImageName(name.to_string()));
        }
    }

    Ok(())
}

/// タグの検証
///
/// Docker タグの制約:
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > MAX_TAG_LEN {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max {})", tag.len(), MAX_TAG_LEN),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return Err(BuildError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}
