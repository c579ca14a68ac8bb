//! Direct URL resolver - passthrough for plain URLs.
//!
//! The [`DirectResolver`] is the simplest resolver implementation. It claims
//! every URL and returns it unchanged, serving as the lowest-priority
//! fallback so plain download links always work.

use async_trait::async_trait;

use super::{ResolveError, Resolver};

/// A resolver that passes URLs through unchanged.
///
/// This is the fallback resolver registered last. It serves as:
/// - A reference implementation for future resolver authors
/// - A guarantee that plain URLs always resolve
/// - A test vehicle for the registry and resolution loop
#[derive(Debug)]
pub struct DirectResolver;

impl DirectResolver {
    /// Creates a new `DirectResolver`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for DirectResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn can_handle(&self, _url: &str) -> bool {
        true
    }

    #[tracing::instrument(skip(self), fields(resolver = "direct"))]
    async fn resolve(&self, url: &str) -> Result<String, ResolveError> {
        Ok(url.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_resolver_name() {
        assert_eq!(DirectResolver::new().name(), "direct");
    }

    #[test]
    fn test_direct_resolver_claims_everything() {
        let resolver = DirectResolver::new();
        assert!(resolver.can_handle("https://example.com/file.pdf"));
        assert!(resolver.can_handle("https://nepis.epa.gov/Exe/ZyNET.exe/X.TXT"));
    }

    #[tokio::test]
    async fn test_direct_resolver_preserves_url() {
        let resolver = DirectResolver::new();
        let resolved = resolver
            .resolve("https://example.com/paper.pdf")
            .await
            .unwrap();
        assert_eq!(resolved, "https://example.com/paper.pdf");
    }
}
