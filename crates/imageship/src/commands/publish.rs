use crate::docker;
use colored::Colorize;
use imageship_build::{BuildRequest, DockerEngine, ImagePublisher, RegistryCredentials};
use imageship_config::PublishConfig;
use std::io::Read;
use std::path::PathBuf;

/// パスワードを渡す環境変数
pub const PASSWORD_ENV: &str = "IMAGESHIP_REGISTRY_PASSWORD";

pub struct PublishArgs {
    pub source: PathBuf,
    pub image: String,
    pub dockerfile: String,
    pub tag: String,
    pub username: Option<String>,
    pub password_stdin: bool,
}

/// publish コマンドを処理
///
/// 公開した参照は1行ずつ stdout に出力する。進捗やエラーは stderr。
pub async fn handle(args: PublishArgs) -> anyhow::Result<()> {
    let config = PublishConfig::load()?;

    let password = if args.password_stdin {
        Some(read_password_stdin()?)
    } else {
        std::env::var(PASSWORD_ENV).ok()
    };
    let credentials = resolve_credentials(args.username, password)?;

    eprintln!("{}", "イメージをビルドして公開します...".green());
    eprintln!(
        "リポジトリ: {}",
        config.registry.repository(&args.image).cyan()
    );
    eprintln!("プラットフォーム: {}", config.platforms.join(", ").cyan());

    let docker_conn = docker::init_docker_with_error_handling().await?;
    docker::ensure_buildx().await?;

    let publisher = ImagePublisher::from_config(DockerEngine::new(docker_conn), &config)?;
    let request = BuildRequest::new(
        args.source,
        args.image,
        args.dockerfile,
        Some(args.tag.as_str()),
        credentials,
    );

    match publisher.publish(&request).await {
        Ok(refs) => {
            for reference in &refs {
                println!("{}", reference);
            }
            eprintln!();
            eprintln!(
                "{}",
                format!("✓ {} 個のタグを公開しました", refs.len())
                    .green()
                    .bold()
            );
            Ok(())
        }
        Err(failure) => {
            eprintln!();
            eprintln!("{} {}", "✗".red().bold(), failure.error.user_message());

            if !failure.published.is_empty() {
                eprintln!();
                eprintln!("{}", "失敗前に公開済みのタグ:".yellow());
                for reference in &failure.published {
                    eprintln!("  • {}", reference);
                }
            }

            let stage = failure
                .stage()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "validate".to_string());
            Err(anyhow::anyhow!("公開に失敗しました ({})", stage))
        }
    }
}

/// 認証情報を決定する
///
/// ユーザー名とパスワードは両方とも呼び出し側が指定する。
/// Docker の保存済みログインは使わない
pub fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
) -> anyhow::Result<RegistryCredentials> {
    let username = username.filter(|u| !u.is_empty()).ok_or_else(|| {
        anyhow::anyhow!("ユーザー名が指定されていません（--username または IMAGESHIP_REGISTRY_USER）")
    })?;
    let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
        anyhow::anyhow!(
            "{} のパスワードが指定されていません（--password-stdin または {}）",
            username,
            PASSWORD_ENV
        )
    })?;

    Ok(RegistryCredentials::new(username, password))
}

fn read_password_stdin() -> anyhow::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    let password = buf.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("標準入力からパスワードを読み込めませんでした");
    }
    Ok(password)
}
