//! Image resolution for references that are not embedded in the input.
//!
//! LaTeX sources refer to images by path. The encoder asks an
//! [`ImageResolver`] supplied by the caller for the bytes, so relative paths
//! resolve against the input document's directory rather than the process
//! working directory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Extensions tried when a reference has none (`\includegraphics{plot}`).
const CANDIDATE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "pdf"];

/// Source of image bytes by reference string.
pub trait ImageResolver: Send + Sync {
    /// Return the bytes for `reference`, or `None` if it cannot be found.
    fn resolve(&self, reference: &str) -> Option<Vec<u8>>;
}

impl<F> ImageResolver for F
where
    F: Fn(&str) -> Option<Vec<u8>> + Send + Sync,
{
    fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        self(reference)
    }
}

/// Resolver that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl ImageResolver for NullResolver {
    fn resolve(&self, _reference: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Resolver reading files relative to a base directory.
///
/// References that are absolute or climb out with `..` are not read.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    base: PathBuf,
}

impl DirectoryResolver {
    /// Create a resolver rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create a resolver rooted at the directory containing `file`.
    pub fn for_file(file: impl AsRef<Path>) -> Self {
        let base = file
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(base)
    }

    /// Base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn candidates(&self, reference: &str) -> Vec<PathBuf> {
        let relative = Path::new(reference);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            log::debug!("image reference `{}` leaves the base directory", reference);
            return Vec::new();
        }
        let path = self.base.join(relative);
        let mut candidates = vec![path.clone()];
        if path.extension().is_none() {
            candidates.extend(
                CANDIDATE_EXTENSIONS
                    .iter()
                    .map(|ext| path.with_extension(ext)),
            );
        }
        candidates
    }
}

impl ImageResolver for DirectoryResolver {
    fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        if reference.contains("://") {
            return None;
        }
        self.candidates(reference)
            .into_iter()
            .filter(|p| p.is_file())
            .find_map(|p| match std::fs::read(&p) {
                Ok(data) => Some(data),
                Err(e) => {
                    log::debug!("failed to read image {}: {}", p.display(), e);
                    None
                }
            })
    }
}

/// Resolver backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image.
    pub fn with_image(mut self, reference: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(reference, data);
        self
    }

    /// Add an image in place.
    pub fn insert(&mut self, reference: impl Into<String>, data: Vec<u8>) {
        self.images.insert(reference.into(), data);
    }
}

impl ImageResolver for MemoryResolver {
    fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        self.images.get(reference).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_directory_resolver() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("figs")).unwrap();
        fs::write(dir.path().join("figs/plot.png"), b"png-bytes").unwrap();

        let resolver = DirectoryResolver::new(dir.path());
        assert_eq!(resolver.resolve("figs/plot.png"), Some(b"png-bytes".to_vec()));
        assert_eq!(resolver.resolve("figs/plot"), Some(b"png-bytes".to_vec()));
        assert_eq!(resolver.resolve("figs/missing.png"), None);
        assert_eq!(resolver.resolve("https://example.com/a.png"), None);
    }

    #[test]
    fn test_directory_resolver_stays_in_base() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("paper");
        fs::create_dir_all(base.join("figs")).unwrap();
        fs::write(base.join("figs/plot.png"), b"png-bytes").unwrap();
        fs::write(dir.path().join("secret.png"), b"secret").unwrap();

        let resolver = DirectoryResolver::new(&base);
        assert_eq!(resolver.resolve("./figs/plot.png"), Some(b"png-bytes".to_vec()));
        assert_eq!(resolver.resolve("../secret.png"), None);
        assert_eq!(resolver.resolve("figs/../../secret"), None);
        let absolute = dir.path().join("secret.png");
        assert_eq!(resolver.resolve(&absolute.to_string_lossy()), None);
    }

    #[test]
    fn test_for_file_uses_parent() {
        let resolver = DirectoryResolver::for_file("/papers/draft/main.tex");
        assert_eq!(resolver.base(), Path::new("/papers/draft"));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |reference: &str| (reference == "a").then(|| vec![7]);
        assert_eq!(ImageResolver::resolve(&resolver, "a"), Some(vec![7]));
        assert_eq!(ImageResolver::resolve(&resolver, "b"), None);
    }
}
