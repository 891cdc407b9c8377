//! imageship のビルド・公開機能
//!
//! ソースディレクトリから複数プラットフォーム向けのイメージをビルドし、
//! 1つのマルチプラットフォームマニフェストとしてレジストリに公開します。
//! 既定の公開先は `sjc.vultrcr.com/oosa/<image>:<tag>` で、
//! 指定タグに加えて `latest` も更新されます。

pub mod auth;
pub mod builder;
pub mod container;
pub mod context;
pub mod engine;
pub mod error;
pub mod platform;
pub mod progress;
pub mod publisher;
pub mod pusher;
pub mod request;
pub mod resolver;

pub use auth::{DockerConfigDir, RegistryCredentials, Secret};
pub use builder::ImageBuilder;
pub use container::{ContainerHandle, ContainerRunner};
pub use context::ContextBuilder;
pub use engine::{DockerEngine, ImageEngine, PlatformArtifact, PlatformBuild};
pub use error::{BuildError, BuildResult, PublishFailure, PublishStage};
pub use platform::{Platform, PlatformMatrix};
pub use progress::BuildProgress;
pub use publisher::ImagePublisher;
pub use pusher::{ImagePusher, split_image_tag};
pub use request::{BuildRequest, LATEST_TAG, TagSet};
pub use resolver::{BuildResolver, ResolvedBuild};
