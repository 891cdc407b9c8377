//! alpine コンテナで簡単なコマンドを実行する補助操作
//!
//! 呼び出し規約の例として用意している `container-echo` と `grep-dir` の実装です。

use crate::error::{BuildError, BuildResult};
use bollard::Docker;
use bollard::container::Config;
use bollard::models::HostConfig;
use futures_util::StreamExt;
use std::path::Path;

/// 補助操作で使うベースイメージ
pub const BASE_IMAGE: &str = "alpine:latest";

/// 作成したコンテナへの参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub image: String,
    pub exit_code: i64,
}

pub struct ContainerRunner {
    docker: Docker,
}

impl ContainerRunner {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// `echo <arg>` を実行したコンテナを返す
    ///
    /// コンテナは削除せずに残す（ハンドルから参照できるように）
    pub async fn container_echo(&self, arg: &str) -> BuildResult<ContainerHandle> {
        self.ensure_base_image().await?;

        let config = Config {
            image: Some(BASE_IMAGE.to_string()),
            cmd: Some(vec!["echo".to_string(), arg.to_string()]),
            ..Default::default()
        };

        let id = self.create_and_start(config).await?;
        let exit_code = self.wait(&id).await?;
        tracing::debug!("echo container {} exited with {}", id, exit_code);

        Ok(ContainerHandle {
            id,
            image: BASE_IMAGE.to_string(),
            exit_code,
        })
    }

    /// ディレクトリを /mnt にマウントし `grep -R <pattern> .` の標準出力を返す
    ///
    /// grep が非0で終了した場合（一致なしを含む）はエラー
    pub async fn grep_dir(&self, dir: &Path, pattern: &str) -> BuildResult<String> {
        if !dir.is_dir() {
            return Err(BuildError::ContextNotFound(dir.to_path_buf()));
        }
        let host_path = dir.canonicalize()?;

        self.ensure_base_image().await?;

        let config = Config {
            image: Some(BASE_IMAGE.to_string()),
            cmd: Some(grep_command(pattern)),
            working_dir: Some("/mnt".to_string()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:/mnt:ro", host_path.display())]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let id = self.create_and_start(config).await?;
        let result = self.collect_output(&id).await;
        self.remove(&id).await;

        result
    }

    async fn collect_output(&self, id: &str) -> BuildResult<String> {
        let exit_code = self.wait(id).await?;

        let options = bollard::query_parameters::LogsOptions {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut logs = self.docker.logs(id, Some(options));
        while let Some(log) = logs.next().await {
            match log? {
                bollard::container::LogOutput::StdOut { message } => {
                    stdout.extend_from_slice(&message)
                }
                bollard::container::LogOutput::StdErr { message } => {
                    stderr.extend_from_slice(&message)
                }
                _ => {}
            }
        }

        if exit_code != 0 {
            return Err(BuildError::CommandFailed(format!(
                "grep exited with status {}: {}",
                exit_code,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn create_and_start(&self, config: Config<String>) -> BuildResult<String> {
        let response = self
            .docker
            .create_container(
                None::<bollard::query_parameters::CreateContainerOptions>,
                config,
            )
            .await?;

        if let Err(e) = self
            .docker
            .start_container(
                &response.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
        {
            self.remove(&response.id).await;
            return Err(e.into());
        }

        Ok(response.id)
    }

    /// コンテナを強制削除する。失敗は警告ログのみ
    async fn remove(&self, id: &str) {
        let options = bollard::query_parameters::RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            tracing::warn!("Failed to remove container {}: {}", id, e);
        }
    }

    /// コンテナの終了を待って終了コードを返す
    async fn wait(&self, id: &str) -> BuildResult<i64> {
        let mut stream = self
            .docker
            .wait_container(id, None::<bollard::query_parameters::WaitContainerOptions>);

        let mut exit_code = 0;
        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => exit_code = response.status_code,
                // 非0終了は bollard ではエラーとして届く
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    exit_code = code
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(exit_code)
    }

    async fn ensure_base_image(&self) -> BuildResult<()> {
        match self.docker.inspect_image(BASE_IMAGE).await {
            Ok(_) => return Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Pulling {}", BASE_IMAGE);

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: "alpine",
            tag: "latest",
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(info) = stream.next().await {
            if let Some(status) = info?.status {
                tracing::debug!("{}", status);
            }
        }

        Ok(())
    }
}

fn grep_command(pattern: &str) -> Vec<String> {
    // パターンがオプションとして解釈されないように -e で渡す
    vec![
        "grep".to_string(),
        "-R".to_string(),
        "-e".to_string(),
        pattern.to_string(),
        ".".to_string(),
    ]
}
