mod commands;
mod docker;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imageship")]
#[command(
    about = "マルチプラットフォームのコンテナイメージをビルドしてレジストリに公開する",
    long_about = None
)]
struct Cli {
    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// linux/amd64 と linux/arm64 向けにビルドし、1つのマニフェストとして公開
    Publish {
        /// ソースディレクトリ（ビルドコンテキスト）
        source: PathBuf,
        /// イメージ名（<host>/<namespace>/<image> の <image> 部分）
        #[arg(short, long)]
        image: String,
        /// ソースディレクトリからの Dockerfile の相対パス
        #[arg(short = 'f', long, default_value = "Dockerfile")]
        dockerfile: String,
        /// バージョンタグ（省略時は latest のみ公開）
        #[arg(short, long, default_value = "")]
        tag: String,
        /// レジストリのユーザー名
        #[arg(short, long, env = "IMAGESHIP_REGISTRY_USER")]
        username: Option<String>,
        /// パスワードを標準入力から読み込む
        #[arg(long)]
        password_stdin: bool,
    },
    /// alpine コンテナで echo を実行し、そのコンテナを返す
    #[command(name = "container-echo")]
    ContainerEcho {
        /// echo する文字列
        string_arg: String,
    },
    /// ディレクトリをコンテナにマウントして grep -R を実行
    #[command(name = "grep-dir")]
    GrepDir {
        /// 検索対象のディレクトリ
        directory: PathBuf,
        /// 検索パターン
        pattern: String,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout は公開結果に使うので、ログは stderr に出力
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if cli.verbose {
        filter = filter.add_directive(tracing::Level::DEBUG.into());
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Publish {
            source,
            image,
            dockerfile,
            tag,
            username,
            password_stdin,
        } => {
            commands::publish::handle(commands::publish::PublishArgs {
                source,
                image,
                dockerfile,
                tag,
                username,
                password_stdin,
            })
            .await?;
        }
        Commands::ContainerEcho { string_arg } => {
            commands::container::handle_echo(&string_arg).await?;
        }
        Commands::GrepDir { directory, pattern } => {
            commands::container::handle_grep(&directory, &pattern).await?;
        }
        Commands::Version => {
            println!("imageship {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
