use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Dockerfile is outside the build context: {0}")]
    DockerfileOutsideContext(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Invalid image name: {0}")]
    InvalidImageName(String),

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("Build of tag '{tag}' for {platform} failed: {source}")]
    PlatformBuild {
        tag: String,
        platform: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("Authentication to {registry} failed: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Publishing {reference} failed: {source}")]
    Publish {
        reference: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 公開処理のどの段階で失敗したか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Build,
    Authenticate,
    Publish,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStage::Build => write!(f, "build"),
            PublishStage::Authenticate => write!(f, "authenticate"),
            PublishStage::Publish => write!(f, "publish"),
        }
    }
}

impl BuildError {
    /// 失敗した段階。リクエスト検証エラーなど段階に属さないものは None
    pub fn stage(&self) -> Option<PublishStage> {
        match self {
            BuildError::PlatformBuild { .. } | BuildError::BuildFailed(_) => {
                Some(PublishStage::Build)
            }
            BuildError::AuthFailed { .. } => Some(PublishStage::Authenticate),
            BuildError::Publish { .. } | BuildError::PushFailed { .. } => {
                Some(PublishStage::Publish)
            }
            _ => None,
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. --dockerfile はソースディレクトリからの相対パスで指定してください\n\
                     2. ファイル名の大文字・小文字を確認してください",
                    path.display()
                )
            }
            BuildError::DockerfileOutsideContext(path) => {
                format!(
                    "Dockerfileはソースディレクトリの内側に置く必要があります: {}",
                    path.display()
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ソースディレクトリが見つかりません: {}\n\
                     \n\
                     パスを確認してください。",
                    path.display()
                )
            }
            BuildError::PlatformBuild {
                tag,
                platform,
                source,
            } => {
                format!(
                    "{} 向けのビルドに失敗しました (tag: {}): {}\n\
                     \n\
                     Dockerfileの内容と、クロスビルド環境 (binfmt/QEMU) を確認してください。",
                    platform, tag, source
                )
            }
            BuildError::AuthFailed { registry, message } => {
                format!(
                    "レジストリ {} への認証に失敗しました: {}\n\
                     \n\
                     ユーザー名とパスワード（トークン）を確認してください。",
                    registry, message
                )
            }
            BuildError::Publish { reference, source } => {
                format!(
                    "{} の公開に失敗しました: {}\n\
                     \n\
                     レジストリへの接続と容量制限を確認してください。",
                    reference, source
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
pub type Result<T> = BuildResult<T>;

/// 公開処理の失敗
///
/// 失敗前に公開済みになった参照を `published` に保持する。
/// 後続のタグは試行されない。
#[derive(Debug)]
pub struct PublishFailure {
    pub published: Vec<String>,
    pub error: BuildError,
}

impl PublishFailure {
    pub fn new(published: Vec<String>, error: BuildError) -> Self {
        Self { published, error }
    }

    pub fn stage(&self) -> Option<PublishStage> {
        self.error.stage()
    }
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for PublishFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl From<BuildError> for PublishFailure {
    fn from(error: BuildError) -> Self {
        Self::new(Vec::new(), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_classification() {
        let build = BuildError::PlatformBuild {
            tag: "2.0".to_string(),
            platform: "linux/arm64".to_string(),
            source: Box::new(BuildError::BuildFailed("exec format error".to_string())),
        };
        assert_eq!(build.stage(), Some(PublishStage::Build));

        let auth = BuildError::AuthFailed {
            registry: "sjc.vultrcr.com".to_string(),
            message: "unauthorized".to_string(),
        };
        assert_eq!(auth.stage(), Some(PublishStage::Authenticate));

        let publish = BuildError::Publish {
            reference: "sjc.vultrcr.com/oosa/widget:2.0".to_string(),
            source: Box::new(BuildError::PushFailed {
                message: "quota exceeded".to_string(),
            }),
        };
        assert_eq!(publish.stage(), Some(PublishStage::Publish));

        assert_eq!(
            BuildError::InvalidImageName(String::new()).stage(),
            None
        );
    }

    #[test]
    fn test_platform_build_message_names_tag_and_platform() {
        let err = BuildError::PlatformBuild {
            tag: "v1.2.3".to_string(),
            platform: "linux/amd64".to_string(),
            source: Box::new(BuildError::BuildFailed("no such file".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("v1.2.3"));
        assert!(msg.contains("linux/amd64"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_publish_failure_displays_inner_error() {
        let failure = PublishFailure::new(
            vec!["sjc.vultrcr.com/oosa/widget:2.0".to_string()],
            BuildError::Publish {
                reference: "sjc.vultrcr.com/oosa/widget:latest".to_string(),
                source: Box::new(BuildError::PushFailed {
                    message: "denied".to_string(),
                }),
            },
        );

        assert_eq!(failure.to_string(), failure.error.to_string());
        assert_eq!(failure.stage(), Some(PublishStage::Publish));
        assert!(std::error::Error::source(&failure).is_some());
    }
}
