use crate::docker;
use colored::Colorize;
use imageship_build::ContainerRunner;
use std::path::Path;

/// container-echo コマンドを処理
pub async fn handle_echo(arg: &str) -> anyhow::Result<()> {
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let runner = ContainerRunner::new(docker_conn);

    let handle = runner.container_echo(arg).await.map_err(|e| {
        eprintln!("  {} {}", "✗".red().bold(), e.user_message());
        anyhow::anyhow!("コンテナの実行に失敗しました")
    })?;

    eprintln!(
        "  {} {} (exit {})",
        "✓".green(),
        handle.image.cyan(),
        handle.exit_code
    );
    println!("{}", handle.id);
    Ok(())
}

/// grep-dir コマンドを処理
pub async fn handle_grep(directory: &Path, pattern: &str) -> anyhow::Result<()> {
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let runner = ContainerRunner::new(docker_conn);

    let output = runner.grep_dir(directory, pattern).await.map_err(|e| {
        eprintln!("  {} {}", "✗".red().bold(), e.user_message());
        anyhow::anyhow!("grep に失敗しました")
    })?;

    print!("{}", output);
    Ok(())
}
