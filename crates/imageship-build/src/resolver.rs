use crate::error::{BuildError, Result};
use std::path::{Component, Path, PathBuf};

/// ソースディレクトリと、その内側にある Dockerfile を解決する
pub struct BuildResolver {
    source: PathBuf,
}

/// 解決済みのビルド入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBuild {
    /// 正規化済みのビルドコンテキスト
    pub context: PathBuf,
    /// コンテキストからの相対パス（`/` 区切り）
    pub dockerfile: String,
}

impl BuildResolver {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn resolve(&self, dockerfile: &str) -> Result<ResolvedBuild> {
        let context = self.resolve_context()?;
        let dockerfile = self.resolve_dockerfile(&context, dockerfile)?;
        Ok(ResolvedBuild {
            context,
            dockerfile,
        })
    }

    /// ビルドコンテキストのパスを解決
    pub fn resolve_context(&self) -> Result<PathBuf> {
        if !self.source.exists() {
            return Err(BuildError::ContextNotFound(self.source.clone()));
        }

        if !self.source.is_dir() {
            return Err(BuildError::InvalidConfig(format!(
                "Build context is not a directory: {}",
                self.source.display()
            )));
        }

        Ok(self.source.canonicalize()?)
    }

    /// Dockerfile をコンテキスト内の相対パスとして解決
    ///
    /// 絶対パスや `..` でコンテキスト外に出るパスは拒否する。
    /// シンボリックリンク経由で外に出る場合も正規化後に検出する。
    pub fn resolve_dockerfile(&self, context: &Path, dockerfile: &str) -> Result<String> {
        let relative = Path::new(dockerfile);

        if dockerfile.trim().is_empty() {
            return Err(BuildError::InvalidConfig(
                "dockerfile path is empty".to_string(),
            ));
        }

        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(BuildError::DockerfileOutsideContext(relative.to_path_buf()));
        }

        let path = context.join(relative);
        if !path.is_file() {
            return Err(BuildError::DockerfileNotFound(path));
        }

        let canonical = path.canonicalize()?;
        let inside = canonical
            .strip_prefix(context)
            .map_err(|_| BuildError::DockerfileOutsideContext(relative.to_path_buf()))?;

        let normalized: Vec<String> = inside
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        tracing::debug!(
            "Resolved Dockerfile '{}' in {}",
            normalized.join("/"),
            context.display()
        );
        Ok(normalized.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_root_dockerfile() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();

        let resolved = BuildResolver::new(temp_dir.path()).resolve("Dockerfile").unwrap();
        assert_eq!(resolved.dockerfile, "Dockerfile");
        assert_eq!(resolved.context, temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_nested_dockerfile() {
        let temp_dir = tempdir().unwrap();
        let nested = temp_dir.path().join("apps").join("auth");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Dockerfile.prod"), "FROM alpine").unwrap();

        let resolved = BuildResolver::new(temp_dir.path())
            .resolve("./apps/auth/Dockerfile.prod")
            .unwrap();
        assert_eq!(resolved.dockerfile, "apps/auth/Dockerfile.prod");
    }

    #[test]
    fn test_missing_dockerfile() {
        let temp_dir = tempdir().unwrap();
        let result = BuildResolver::new(temp_dir.path()).resolve("Dockerfile");
        assert!(matches!(result, Err(BuildError::DockerfileNotFound(_))));
    }

    #[test]
    fn test_dockerfile_outside_context() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();

        let resolver = BuildResolver::new(&source);
        assert!(matches!(
            resolver.resolve("../Dockerfile"),
            Err(BuildError::DockerfileOutsideContext(_))
        ));

        let absolute = temp_dir.path().join("Dockerfile");
        assert!(matches!(
            resolver.resolve(absolute.to_str().unwrap()),
            Err(BuildError::DockerfileOutsideContext(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("Dockerfile"), source.join("Dockerfile"))
            .unwrap();

        let result = BuildResolver::new(&source).resolve("Dockerfile");
        assert!(matches!(result, Err(BuildError::DockerfileOutsideContext(_))));
    }

    #[test]
    fn test_missing_context() {
        let temp_dir = tempdir().unwrap();
        let result = BuildResolver::new(temp_dir.path().join("nope")).resolve("Dockerfile");
        assert!(matches!(result, Err(BuildError::ContextNotFound(_))));
    }

    #[test]
    fn test_context_is_file() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let result = BuildResolver::new(file).resolve_context();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }
}
