//! イメージプッシュとマニフェストリスト作成
//!
//! プラットフォーム別イメージを Engine API でプッシュし、
//! `docker buildx imagetools` で1つのマニフェストリストにまとめます。

use crate::auth::{RegistryCredentials, extract_registry};
use crate::error::{BuildError, BuildResult};
use bollard::Docker;
use bollard::models::PushImageInfo;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

/// imagetools inspect の `{{json .Manifest}}` 出力
#[derive(Debug, Deserialize)]
struct ManifestDescriptor {
    digest: Option<String>,
}

pub struct ImagePusher {
    docker: Docker,
    docker_cli: String,
}

impl ImagePusher {
    /// docker CLI のパスを指定して作成
    pub fn with_cli(docker: Docker, docker_cli: impl Into<String>) -> Self {
        Self {
            docker,
            docker_cli: docker_cli.into(),
        }
    }

    /// タグ付きイメージをレジストリにプッシュ
    ///
    /// 成功時はプッシュした参照を返す
    pub async fn push(
        &self,
        image_ref: &str,
        credentials: &RegistryCredentials,
    ) -> BuildResult<String> {
        let (image, tag) = split_image_tag(image_ref);
        let registry = extract_registry(image_ref);

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag: tag.clone() };

        tracing::info!("Pushing {}", image_ref);

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(
            &image,
            Some(options),
            Some(credentials.to_docker_credentials(&registry)),
        );

        let mut last_status = String::new();
        let mut error_message: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        error_message = Some(err);
                    } else {
                        handle_progress(&info, &mut last_status);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(err) = error_message {
            return Err(BuildError::PushFailed { message: err });
        }

        Ok(format!("{}:{}", image, tag))
    }

    /// プッシュ済みのプラットフォーム別イメージからマニフェストリストを作成
    ///
    /// 既存タグは上書きされる。`docker_config` はログイン済みの DOCKER_CONFIG
    pub async fn create_manifest_list(
        &self,
        target: &str,
        variants: &[String],
        docker_config: &Path,
    ) -> BuildResult<()> {
        if variants.is_empty() {
            return Err(BuildError::InvalidConfig(format!(
                "no platform variants for {}",
                target
            )));
        }

        tracing::info!(
            "Creating manifest list {} from {} variants",
            target,
            variants.len()
        );

        let output = Command::new(&self.docker_cli)
            .args(["buildx", "imagetools", "create", "--tag", target])
            .args(variants)
            .env("DOCKER_CONFIG", docker_config)
            .output()
            .await
            .map_err(|e| BuildError::CommandFailed(format!(
                "docker buildx imagetools create の実行に失敗しました: {}",
                e
            )))?;

        if !output.status.success() {
            return Err(BuildError::PushFailed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    /// マニフェストリストのダイジェストを取得
    ///
    /// 取得できない場合は None（公開自体は成功している）
    pub async fn manifest_digest(
        &self,
        target: &str,
        docker_config: &Path,
    ) -> BuildResult<Option<String>> {
        let output = Command::new(&self.docker_cli)
            .args([
                "buildx",
                "imagetools",
                "inspect",
                target,
                "--format",
                "{{json .Manifest}}",
            ])
            .env("DOCKER_CONFIG", docker_config)
            .output()
            .await
            .map_err(|e| BuildError::CommandFailed(format!(
                "docker buildx imagetools inspect の実行に失敗しました: {}",
                e
            )))?;

        if !output.status.success() {
            tracing::warn!(
                "Could not inspect {}: {}",
                target,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        Ok(parse_manifest_digest(&output.stdout))
    }
}

fn parse_manifest_digest(stdout: &[u8]) -> Option<String> {
    serde_json::from_slice::<ManifestDescriptor>(stdout)
        .map_err(|e| tracing::debug!("Unexpected imagetools output: {}", e))
        .ok()
        .and_then(|m| m.digest)
        .filter(|d| d.contains(':'))
}

/// プッシュ進捗をログに流す
fn handle_progress(info: &PushImageInfo, last_status: &mut String) {
    if let Some(status) = &info.status {
        match status.as_str() {
            // 準備中はノイズになるので出さない
            "Preparing" | "Waiting" | "Pushing" => {}
            _ => {
                if status != last_status {
                    tracing::debug!(target: "imageship::push", "{}", status);
                    *last_status = status.clone();
                }
            }
        }
    }
}

/// イメージ名とタグを分離
///
/// - `sjc.vultrcr.com/oosa/app:v1.0` -> `("sjc.vultrcr.com/oosa/app", "v1.0")`
/// - `sjc.vultrcr.com/oosa/app` -> `("sjc.vultrcr.com/oosa/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // ポート番号（localhost:5000/app）はタグではない
        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}
