//! レジストリ認証情報
//!
//! 呼び出し側から渡されたユーザー名と秘密値を保持します。
//! 認証情報はその場で使うだけで、利用者の Docker 設定には保存しません。

use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tempfile::TempDir;

/// ログや Debug 出力に現れない秘密値
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 値そのものを取り出す。レジストリへ渡す直前にだけ使う
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// プッシュ可能なレジストリセッション用の認証情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub secret: Secret,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Bollard の DockerCredentials に変換
    pub fn to_docker_credentials(&self, registry: &str) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.secret.expose().to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 一時 DOCKER_CONFIG に書く config.json
#[derive(Serialize)]
struct DockerConfigFile<'a> {
    auths: HashMap<&'a str, AuthEntry>,
}

#[derive(Serialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: String,
}

/// 1回の公開だけで使う Docker 設定ディレクトリ
///
/// docker CLI は `DOCKER_CONFIG` をこのディレクトリに向けて実行する。
/// ドロップ時にディレクトリごと削除されるので、ログイン情報は残らない。
pub struct DockerConfigDir {
    dir: TempDir,
}

impl DockerConfigDir {
    /// レジストリの認証エントリを書き込んだ設定ディレクトリを作成
    ///
    /// auths が空の config.json だと docker CLI は OS の credential helper を
    /// 既定のストアとして使うため、最初からエントリを入れておく
    pub fn create(registry: &str, credentials: &RegistryCredentials) -> BuildResult<Self> {
        let dir = tempfile::Builder::new().prefix("imageship-docker-").tempdir()?;

        let auth = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            credentials.username,
            credentials.secret.expose()
        ));
        let config = DockerConfigFile {
            auths: HashMap::from([(registry, AuthEntry { auth })]),
        };
        let body = serde_json::to_vec(&config).map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to write docker config: {}", e),
        })?;

        let path = dir.path().join("config.json");
        std::fs::write(&path, body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!("Created isolated docker config at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl fmt::Debug for DockerConfigDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerConfigDir")
            .field("path", &self.dir.path())
            .finish()
    }
}

/// イメージ参照からレジストリホストを抽出
///
/// - `sjc.vultrcr.com/oosa/app:tag` -> `sjc.vultrcr.com`
/// - `localhost:5000/app` -> `localhost:5000`
/// - `myuser/app:tag` -> `docker.io`
pub fn extract_registry(image: &str) -> String {
    if let Some((first, _)) = image.split_once('/')
        && (first.contains('.') || first.contains(':') || first == "localhost")
    {
        return first.to_string();
    }

    "docker.io".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_secret_is_not_printed() {
        let creds = RegistryCredentials::new("ci-bot", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ci-bot"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(creds.secret.expose(), "hunter2");
    }

    #[test]
    fn test_to_docker_credentials() {
        let creds = RegistryCredentials::new("ci-bot", "hunter2");
        let docker = creds.to_docker_credentials("sjc.vultrcr.com");
        assert_eq!(docker.username.as_deref(), Some("ci-bot"));
        assert_eq!(docker.password.as_deref(), Some("hunter2"));
        assert_eq!(docker.serveraddress.as_deref(), Some("sjc.vultrcr.com"));
    }

    #[test]
    fn test_extract_registry() {
        assert_eq!(
            extract_registry("sjc.vultrcr.com/oosa/widget:2.0"),
            "sjc.vultrcr.com"
        );
        assert_eq!(extract_registry("localhost:5000/app"), "localhost:5000");
        assert_eq!(extract_registry("localhost/app"), "localhost");
        assert_eq!(extract_registry("myuser/app:latest"), "docker.io");
        assert_eq!(extract_registry("alpine:latest"), "docker.io");
    }

    #[test]
    fn test_docker_config_dir_contains_only_target_registry() {
        let creds = RegistryCredentials::new("ci-bot", "s3cret");
        let config = DockerConfigDir::create("sjc.vultrcr.com", &creds).unwrap();

        let body = fs::read_to_string(config.path().join("config.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let auths = json["auths"].as_object().unwrap();
        assert_eq!(auths.len(), 1);

        let encoded = auths["sjc.vultrcr.com"]["auth"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, b"ci-bot:s3cret");
        assert!(json.get("credsStore").is_none());
    }

    #[test]
    fn test_docker_config_dir_removed_on_drop() {
        let creds = RegistryCredentials::new("ci-bot", "s3cret");
        let config = DockerConfigDir::create("sjc.vultrcr.com", &creds).unwrap();
        let path = config.path().to_path_buf();
        assert!(path.join("config.json").exists());

        drop(config);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_docker_config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let creds = RegistryCredentials::new("ci-bot", "s3cret");
        let config = DockerConfigDir::create("sjc.vultrcr.com", &creds).unwrap();
        let mode = fs::metadata(config.path().join("config.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_docker_config_dir_debug_hides_secret() {
        let creds = RegistryCredentials::new("ci-bot", "s3cret");
        let config = DockerConfigDir::create("sjc.vultrcr.com", &creds).unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
