use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use tar::Builder;

/// 常にコンテキストから除外するエントリ
const ALWAYS_EXCLUDED: [&str; 1] = [".git"];

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    ///
    /// `.dockerignore` の各行はコンテキストからの相対パスとして扱う
    /// （パターン展開はしない）。一致したファイルとディレクトリ配下は除外される。
    pub fn create_context(context_path: &Path) -> BuildResult<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        let ignored = Self::read_dockerignore(context_path)?;

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);

            Self::append_dir(&mut tar, context_path, Path::new(""), &ignored)?;

            tar.into_inner()
                .and_then(|encoder| encoder.finish())
                .map_err(BuildError::Io)?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn append_dir<W: std::io::Write>(
        tar: &mut Builder<W>,
        root: &Path,
        relative: &Path,
        ignored: &[PathBuf],
    ) -> BuildResult<()> {
        let mut entries = std::fs::read_dir(root.join(relative))?
            .collect::<std::io::Result<Vec<_>>>()?;
        // アーカイブの内容を実行ごとに安定させる
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let name = relative.join(entry.file_name());
            if Self::is_excluded(&name, ignored) {
                tracing::debug!("Excluded from context: {}", name.display());
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                tar.append_dir(&name, entry.path())?;
                Self::append_dir(tar, root, &name, ignored)?;
            } else {
                tar.append_path_with_name(entry.path(), &name)?;
            }
        }

        Ok(())
    }

    fn is_excluded(name: &Path, ignored: &[PathBuf]) -> bool {
        ALWAYS_EXCLUDED.iter().any(|e| name == Path::new(e))
            || ignored.iter().any(|pattern| name.starts_with(pattern))
    }

    fn read_dockerignore(context_path: &Path) -> BuildResult<Vec<PathBuf>> {
        let path = context_path.join(".dockerignore");
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| PathBuf::from(line.trim_start_matches("./").trim_end_matches('/')))
            .filter(|p| !p.as_os_str().is_empty())
            .collect())
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 .dockerignoreファイルで不要なファイルを除外することを推奨します。",
                size / 1024 / 1024
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    fn entry_names(archive: Vec<u8>) -> HashSet<String> {
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        let mut tar = tar::Archive::new(decoder);
        tar.entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_create_context() {
        let temp_dir = tempdir().unwrap();

        fs::write(temp_dir.path().join("file1.txt"), "content1").unwrap();
        let subdir = temp_dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("file2.txt"), "content2").unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine\nRUN echo test").unwrap();

        let archive = ContextBuilder::create_context(temp_dir.path()).unwrap();
        assert!(!archive.is_empty());

        // tarアーカイブとして展開できるか確認
        let extract_dir = tempdir().unwrap();
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        tar::Archive::new(decoder).unpack(extract_dir.path()).unwrap();

        assert!(extract_dir.path().join("Dockerfile").exists());
        assert!(extract_dir.path().join("subdir").join("file2.txt").exists());
    }

    #[test]
    fn test_git_and_dockerignore_excluded() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".git").join("HEAD"), "ref").unwrap();
        fs::create_dir(temp_dir.path().join("node_modules")).unwrap();
        fs::write(temp_dir.path().join("node_modules").join("x.js"), "x").unwrap();
        fs::write(temp_dir.path().join("secret.env"), "TOKEN=1").unwrap();
        fs::write(
            temp_dir.path().join(".dockerignore"),
            "# deps\nnode_modules/\n./secret.env\n",
        )
        .unwrap();

        let names = entry_names(ContextBuilder::create_context(temp_dir.path()).unwrap());
        assert!(names.contains("Dockerfile"));
        assert!(names.contains(".dockerignore"));
        assert!(!names.iter().any(|n| n.starts_with(".git/") || n == ".git"));
        assert!(!names.iter().any(|n| n.starts_with("node_modules")));
        assert!(!names.contains("secret.env"));
    }

    #[test]
    fn test_create_context_only_dockerfile() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();

        let names = entry_names(ContextBuilder::create_context(temp_dir.path()).unwrap());
        assert_eq!(names.len(), 1);
    }
}
