//! コンテナエンジンとの境界
//!
//! 公開処理はこのトレイトだけに依存します。実際のビルドやレジストリ操作は
//! `DockerEngine`（ローカルの Docker デーモン + buildx）が担当します。

use crate::auth::{DockerConfigDir, RegistryCredentials, extract_registry};
use crate::builder::ImageBuilder;
use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use crate::platform::Platform;
use crate::progress::BuildProgress;
use crate::pusher::ImagePusher;
use bollard::Docker;
use imageship_config::RegistryTarget;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// 1プラットフォーム分のビルド要求
#[derive(Debug, Clone)]
pub struct PlatformBuild<'a> {
    pub context: &'a Path,
    /// コンテキスト内の相対パス
    pub dockerfile: &'a str,
    pub platform: &'a Platform,
    /// 公開タグ
    pub tag: &'a str,
    /// プラットフォーム別イメージの参照 `<repo>:<tag>-<suffix>`
    pub reference: String,
}

/// マニフェストリストに含めるプラットフォーム別イメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformArtifact {
    pub platform: Platform,
    pub reference: String,
}

/// ビルドと公開を実行するエンジン
#[allow(async_fn_in_trait)]
pub trait ImageEngine {
    /// 指定プラットフォーム向けにビルドする
    async fn build(&self, build: &PlatformBuild<'_>) -> BuildResult<PlatformArtifact>;

    /// レジストリにログインする
    async fn authenticate(
        &self,
        registry: &RegistryTarget,
        credentials: &RegistryCredentials,
    ) -> BuildResult<()>;

    /// プラットフォーム別イメージを1つのマニフェストとして `target` に公開し、正規の参照を返す
    async fn publish(
        &self,
        target: &str,
        variants: &[PlatformArtifact],
        credentials: &RegistryCredentials,
    ) -> BuildResult<String>;
}

/// ローカル Docker デーモンを使うエンジン
///
/// `authenticate` で作った一時 DOCKER_CONFIG は次の `publish` が終わると削除される
pub struct DockerEngine {
    builder: ImageBuilder,
    pusher: ImagePusher,
    docker_cli: String,
    session: Mutex<Option<DockerConfigDir>>,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self::with_cli(docker, "docker")
    }

    pub fn with_cli(docker: Docker, docker_cli: &str) -> Self {
        Self {
            builder: ImageBuilder::new(docker.clone()),
            pusher: ImagePusher::with_cli(docker, docker_cli),
            docker_cli: docker_cli.to_string(),
            session: Mutex::new(None),
        }
    }

    fn take_session(&self) -> Option<DockerConfigDir> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl ImageEngine for DockerEngine {
    async fn build(&self, build: &PlatformBuild<'_>) -> BuildResult<PlatformArtifact> {
        let platform = build.platform.to_string();
        let progress = BuildProgress::new(&build.reference, &platform);

        let context = build.context.to_path_buf();
        progress.set_message(&format!("Packing context {}...", context.display()));
        let context_data =
            tokio::task::spawn_blocking(move || ContextBuilder::create_context(&context))
                .await
                .map_err(|e| BuildError::BuildFailed(format!("context task failed: {}", e)))??;

        progress.set_message(&format!("Building {} ({})...", build.reference, platform));
        let result = self
            .builder
            .build_image(
                context_data,
                &build.reference,
                build.dockerfile,
                build.platform,
            )
            .await;

        match result {
            Ok(()) => {
                progress.finish_success(&platform);
                Ok(PlatformArtifact {
                    platform: build.platform.clone(),
                    reference: build.reference.clone(),
                })
            }
            Err(e) => {
                progress.finish_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn authenticate(
        &self,
        registry: &RegistryTarget,
        credentials: &RegistryCredentials,
    ) -> BuildResult<()> {
        if credentials.username.is_empty() || credentials.secret.is_empty() {
            return Err(BuildError::AuthFailed {
                registry: registry.host.clone(),
                message: "username and password are required".to_string(),
            });
        }

        tracing::info!("Logging in to {} as {}", registry.host, credentials.username);

        let config = DockerConfigDir::create(&registry.host, credentials)?;

        let mut child = Command::new(&self.docker_cli)
            .args([
                "login",
                registry.host.as_str(),
                "--username",
                credentials.username.as_str(),
                "--password-stdin",
            ])
            .env("DOCKER_CONFIG", config.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::AuthFailed {
                registry: registry.host.clone(),
                message: format!("Failed to run docker login: {}", e),
            })?;

        // パスワードは stdin 経由でのみ渡す
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(credentials.secret.expose().as_bytes()).await
        {
            // login が先に終了した場合。原因は stderr に出ている
            tracing::debug!("docker login closed stdin early: {}", e);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BuildError::AuthFailed {
                registry: registry.host.clone(),
                message: format!("docker login did not finish: {}", e),
            })?;
        if !output.status.success() {
            return Err(BuildError::AuthFailed {
                registry: registry.host.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
        Ok(())
    }

    async fn publish(
        &self,
        target: &str,
        variants: &[PlatformArtifact],
        credentials: &RegistryCredentials,
    ) -> BuildResult<String> {
        let Some(config) = self.take_session() else {
            return Err(BuildError::AuthFailed {
                registry: extract_registry(target),
                message: "publish called before authenticate".to_string(),
            });
        };

        let mut pushed = Vec::with_capacity(variants.len());
        for variant in variants {
            pushed.push(self.pusher.push(&variant.reference, credentials).await?);
        }

        self.pusher
            .create_manifest_list(target, &pushed, config.path())
            .await?;

        match self.pusher.manifest_digest(target, config.path()).await? {
            Some(digest) => Ok(format!("{}@{}", target, digest)),
            None => Ok(target.to_string()),
        }
    }
}
