use crate::error::{BuildError, Result};
use crate::platform::Platform;
use bollard::Docker;
use bollard::image::BuildImageOptions;
use futures_util::stream::StreamExt;

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// プラットフォームを指定してイメージをビルド
    ///
    /// `dockerfile` はコンテキスト内の相対パス。
    pub async fn build_image(
        &self,
        context_data: Vec<u8>,
        image_ref: &str,
        dockerfile: &str,
        platform: &Platform,
    ) -> Result<()> {
        tracing::info!("Building image: {} ({})", image_ref, platform);

        let platform_name = platform.to_string();
        #[allow(deprecated)]
        let options = BuildImageOptions {
            dockerfile,
            t: image_ref,
            platform: platform_name.as_str(),
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            pull: true,    // ベースイメージを常にpull
            ..Default::default()
        };

        tracing::debug!("Build options: {:?}", options);

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => Self::handle_build_output(output)?,
                Err(e) => return Err(BuildError::DockerConnection(e)),
            }
        }

        tracing::info!("Successfully built: {}", image_ref);
        Ok(())
    }

    /// ビルド出力の処理
    ///
    /// stdout は公開結果の出力に使うので、ビルドログは tracing に流す
    fn handle_build_output(output: bollard::models::BuildInfo) -> Result<()> {
        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!(target: "imageship::build", "{}", line);
            }
        }

        if let Some(status) = output.status {
            tracing::debug!(target: "imageship::build", "{}", status);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_output_error() {
        let output = bollard::models::BuildInfo {
            error: Some("failed to solve: dockerfile parse error".to_string()),
            ..Default::default()
        };
        let result = ImageBuilder::handle_build_output(output);
        assert!(matches!(result, Err(BuildError::BuildFailed(msg)) if msg.contains("parse error")));
    }

    #[test]
    fn test_build_output_error_detail() {
        let output = bollard::models::BuildInfo {
            error_detail: Some(bollard::models::ErrorDetail {
                message: None,
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = ImageBuilder::handle_build_output(output);
        assert!(matches!(result, Err(BuildError::BuildFailed(msg)) if msg == "Unknown build error"));
    }

    #[test]
    fn test_build_output_stream_ok() {
        let output = bollard::models::BuildInfo {
            stream: Some("Step 1/2 : FROM alpine\n".to_string()),
            ..Default::default()
        };
        assert!(ImageBuilder::handle_build_output(output).is_ok());
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_simple_image() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let builder = ImageBuilder::new(docker);

        use crate::context::ContextBuilder;
        use std::fs;
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("Dockerfile"),
            "FROM alpine:latest\nCMD echo 'test'",
        )
        .unwrap();

        let context_data = ContextBuilder::create_context(temp_dir.path()).unwrap();

        let result = builder
            .build_image(
                context_data,
                "imageship-test:latest-amd64",
                "Dockerfile",
                &Platform::linux("amd64"),
            )
            .await;

        assert!(result.is_ok());
        let inspect = builder
            .docker
            .inspect_image("imageship-test:latest-amd64")
            .await
            .unwrap();
        assert_eq!(inspect.architecture.as_deref(), Some("amd64"));

        builder
            .docker
            .remove_image(
                "imageship-test:latest-amd64",
                None::<bollard::query_parameters::RemoveImageOptions>,
                None,
            )
            .await
            .ok();
    }
}
