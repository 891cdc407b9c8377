//! マルチプラットフォームイメージの公開
//!
//! タグごとに全プラットフォームをビルドし、認証してから1つのマニフェストとして公開します。
//! どこかで失敗した時点で残りのタグは試行しません（リトライなし）。

use crate::engine::{ImageEngine, PlatformArtifact, PlatformBuild};
use crate::error::{BuildError, PublishFailure};
use crate::platform::PlatformMatrix;
use crate::request::BuildRequest;
use imageship_config::{PublishConfig, RegistryTarget};

pub struct ImagePublisher<E> {
    engine: E,
    registry: RegistryTarget,
    platforms: PlatformMatrix,
}

impl<E: ImageEngine> ImagePublisher<E> {
    /// デフォルトの公開先（sjc.vultrcr.com/oosa）と linux/amd64, linux/arm64 で作成
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            registry: RegistryTarget::default(),
            platforms: PlatformMatrix::default(),
        }
    }

    pub fn from_config(engine: E, config: &PublishConfig) -> Result<Self, BuildError> {
        Ok(Self {
            engine,
            registry: config.registry.clone(),
            platforms: PlatformMatrix::from_config(config)?,
        })
    }

    pub fn with_platforms(mut self, platforms: PlatformMatrix) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn registry(&self) -> &RegistryTarget {
        &self.registry
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// イメージをビルドして公開し、タグ順に参照を返す
    ///
    /// 失敗時の `PublishFailure::published` には、失敗より前に公開済みになった参照が入る
    pub async fn publish(&self, request: &BuildRequest) -> Result<Vec<String>, PublishFailure> {
        let resolved = request.validate(&self.platforms)?;
        let tags = request.tag_set();

        tracing::info!(
            "Publishing {} with tags [{}] for {} platforms",
            self.registry.repository(&request.image_name),
            tags.as_slice().join(", "),
            self.platforms.len()
        );

        let mut refs = Vec::with_capacity(tags.len());
        for tag in tags.iter() {
            let target = self.registry.image_ref(&request.image_name, tag);

            let mut variants: Vec<PlatformArtifact> = Vec::with_capacity(self.platforms.len());
            for platform in self.platforms.iter() {
                let build = PlatformBuild {
                    context: &resolved.context,
                    dockerfile: &resolved.dockerfile,
                    platform,
                    tag,
                    reference: format!("{}-{}", target, platform.tag_suffix()),
                };

                let artifact = self.engine.build(&build).await.map_err(|e| {
                    PublishFailure::new(
                        refs.clone(),
                        BuildError::PlatformBuild {
                            tag: tag.to_string(),
                            platform: platform.to_string(),
                            source: Box::new(e),
                        },
                    )
                })?;
                variants.push(artifact);
            }

            self.engine
                .authenticate(&self.registry, &request.credentials)
                .await
                .map_err(|e| {
                    let error = match e {
                        BuildError::AuthFailed { .. } => e,
                        other => BuildError::AuthFailed {
                            registry: self.registry.host.clone(),
                            message: other.to_string(),
                        },
                    };
                    PublishFailure::new(refs.clone(), error)
                })?;

            let reference = self
                .engine
                .publish(&target, &variants, &request.credentials)
                .await
                .map_err(|e| {
                    PublishFailure::new(
                        refs.clone(),
                        BuildError::Publish {
                            reference: target.clone(),
                            source: Box::new(e),
                        },
                    )
                })?;

            tracing::info!("Published {}", reference);
            refs.push(reference);
        }

        Ok(refs)
    }
}
