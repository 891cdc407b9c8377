use colored::Colorize;

/// Docker接続を初期化（エラーハンドリング付き）
pub async fn init_docker_with_error_handling() -> anyhow::Result<bollard::Docker> {
    let result = match bollard::Docker::connect_with_local_defaults() {
        Ok(docker) => docker.ping().await.map(|_| docker),
        Err(e) => Err(e),
    };

    result.map_err(|e| {
        eprintln!();
        eprintln!("{}", "✗ Docker接続エラー".red().bold());
        eprintln!();
        eprintln!("{}", "原因:".yellow());
        eprintln!("  {}", e);
        eprintln!();
        eprintln!("{}", "解決方法:".yellow());
        eprintln!("  • Dockerが起動しているか確認してください");
        eprintln!("  • DOCKER_HOST が正しいソケットを指しているか確認してください");
        eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
        anyhow::anyhow!("Docker接続に失敗しました")
    })
}

/// docker buildx が使えるか確認
///
/// マニフェストリストの作成に `docker buildx imagetools` を使うため
pub async fn ensure_buildx() -> anyhow::Result<()> {
    let output = tokio::process::Command::new("docker")
        .args(["buildx", "version"])
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            tracing::debug!(
                "buildx: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Ok(())
        }
        _ => {
            eprintln!("{}", "✗ docker buildx が見つかりません".red().bold());
            eprintln!("  • Docker Desktop / OrbStack、または docker-buildx-plugin をインストールしてください");
            Err(anyhow::anyhow!("docker buildx が利用できません"))
        }
    }
}
