//! Layer inclusion policies.

use std::collections::HashSet;

use async_trait::async_trait;
use boxtar_core::error::Result;

use crate::descriptor::LayerDescriptor;

/// Decides, per layer, whether it goes into the archive.
#[async_trait]
pub trait LayerFilter: Send + Sync {
    async fn should_include(&self, layer: &LayerDescriptor) -> Result<bool>;
}

/// Includes every layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeAll;

#[async_trait]
impl LayerFilter for IncludeAll {
    async fn should_include(&self, _layer: &LayerDescriptor) -> Result<bool> {
        Ok(true)
    }
}

/// Skips foreign / non-distributable layers unless explicitly enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonDistributableFilter {
    include_non_distributable: bool,
}

impl NonDistributableFilter {
    pub fn new(include_non_distributable: bool) -> Self {
        Self {
            include_non_distributable,
        }
    }
}

#[async_trait]
impl LayerFilter for NonDistributableFilter {
    async fn should_include(&self, layer: &LayerDescriptor) -> Result<bool> {
        if self.include_non_distributable || layer.is_distributable() {
            return Ok(true);
        }

        tracing::debug!(
            digest = %layer.digest,
            media_type = %layer.media_type,
            "Skipping non-distributable layer"
        );
        Ok(false)
    }
}

/// Skips layers whose digest is already present at the target.
#[derive(Debug, Default, Clone)]
pub struct SkipDigests {
    digests: HashSet<String>,
}

impl SkipDigests {
    pub fn new<I, S>(digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            digests: digests.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl LayerFilter for SkipDigests {
    async fn should_include(&self, layer: &LayerDescriptor) -> Result<bool> {
        Ok(!self.digests.contains(&layer.digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign_layer() -> LayerDescriptor {
        LayerDescriptor {
            media_type: "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip".to_string(),
            ..LayerDescriptor::new("sha256:ff", 10)
        }
    }

    #[tokio::test]
    async fn test_include_all() {
        assert!(IncludeAll
            .should_include(&foreign_layer())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_non_distributable_skipped_by_default() {
        let filter = NonDistributableFilter::default();
        assert!(!filter.should_include(&foreign_layer()).await.unwrap());
        assert!(filter
            .should_include(&LayerDescriptor::new("sha256:aa", 1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_non_distributable_included_when_enabled() {
        let filter = NonDistributableFilter::new(true);
        assert!(filter.should_include(&foreign_layer()).await.unwrap());
    }

    #[tokio::test]
    async fn test_skip_digests() {
        let filter = SkipDigests::new(["sha256:aa"]);
        assert!(!filter
            .should_include(&LayerDescriptor::new("sha256:aa", 1))
            .await
            .unwrap());
        assert!(filter
            .should_include(&LayerDescriptor::new("sha256:bb", 1))
            .await
            .unwrap());
    }
}
