//! Download-task classification and indirect-URL resolution.
//!
//! Some catalog links do not point at the file itself: the indirect document
//! host serves an intermediate "popup" page whose markup carries the real
//! asset URL. This module provides an extensible resolver system so the
//! download engine never branches on host names — a task's URL is offered to
//! a priority-ordered registry and the first resolver that claims it either
//! produces a directly fetchable URL or fails closed.
//!
//! # Architecture
//!
//! - [`Resolver`] - async trait individual resolvers implement
//! - [`ResolverRegistry`] - ordered collection with the resolution entry point
//! - [`NepisResolver`] - indirect host: popup fetch + asset-link extraction
//! - [`DirectResolver`] - fallback passthrough for plain URLs
//!
//! New indirect hosts are added as new [`Resolver`] implementations
//! registered ahead of the fallback.

mod direct;
pub mod nepis;

pub use direct::DirectResolver;
pub use nepis::NepisResolver;

use async_trait::async_trait;
use tracing::debug;

use thiserror::Error;

/// Errors terminating a resolution attempt.
///
/// Every variant is terminal for the task within the run; the engine records
/// the task as unresolved and moves on. Nothing here aborts the batch.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The popup page could not be fetched.
    #[error("failed to fetch popup page for {url}: {reason}")]
    PopupFetch {
        /// The task URL being resolved.
        url: String,
        /// Description of the fetch failure.
        reason: String,
    },

    /// The page says the document must be obtained through a contact channel.
    #[error("document requires contact-based retrieval ({marker}): {url}")]
    ContactOnly {
        /// The task URL being resolved.
        url: String,
        /// The marker phrase that was detected.
        marker: String,
    },

    /// The popup page yielded no asset link.
    #[error("no asset link found in popup page: {url}")]
    NoAssetLink {
        /// The task URL being resolved.
        url: String,
    },

    /// No registered resolver claimed the URL.
    #[error("no resolver can handle {url}")]
    NoHandler {
        /// The unclaimed URL.
        url: String,
    },
}

impl ResolveError {
    /// Creates a popup-fetch error.
    pub fn popup_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PopupFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a contact-only error.
    pub fn contact_only(url: impl Into<String>, marker: impl Into<String>) -> Self {
        Self::ContactOnly {
            url: url.into(),
            marker: marker.into(),
        }
    }

    /// Creates a no-asset-link error.
    pub fn no_asset_link(url: impl Into<String>) -> Self {
        Self::NoAssetLink { url: url.into() }
    }

    /// Short machine-readable label for report artifacts.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PopupFetch { .. } => "popup-fetch-failed",
            Self::ContactOnly { .. } => "contact-only",
            Self::NoAssetLink { .. } => "no-asset-link",
            Self::NoHandler { .. } => "no-handler",
        }
    }
}

/// Trait that all resolvers implement.
///
/// Resolvers turn a task URL into a directly fetchable URL. Each resolver
/// declares which URLs it handles; registration order is priority order.
///
/// # Object Safety
///
/// Uses `async_trait` to support dynamic dispatch via `Box<dyn Resolver>`.
/// Rust 2024 native async traits are not object-safe, so `async_trait` is
/// required for the registry pattern.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// The resolver's name (e.g. "nepis", "direct").
    fn name(&self) -> &str;

    /// Returns true if this resolver handles the given URL.
    fn can_handle(&self, url: &str) -> bool;

    /// Attempts to produce a directly fetchable URL.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the URL cannot be resolved; the failure
    /// is terminal for the task within the run.
    async fn resolve(&self, url: &str) -> Result<String, ResolveError>;
}

/// Ordered collection of resolvers with the resolution entry point.
///
/// Resolvers are consulted in registration order; specialized host resolvers
/// are registered before the direct fallback.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &names)
            .finish()
    }
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Registers a resolver at the end of the priority order.
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    /// The name of the resolver that would handle the URL, if any.
    #[must_use]
    pub fn handler_for(&self, url: &str) -> Option<&str> {
        self.resolvers
            .iter()
            .find(|r| r.can_handle(url))
            .map(|r| r.name())
    }

    /// Resolves a task URL through the first resolver that claims it.
    ///
    /// # Errors
    ///
    /// Returns the claiming resolver's [`ResolveError`], or
    /// [`ResolveError::NoHandler`] when nothing claims the URL.
    pub async fn resolve_url(&self, url: &str) -> Result<String, ResolveError> {
        for resolver in &self.resolvers {
            if resolver.can_handle(url) {
                debug!(resolver = resolver.name(), url = %url, "resolving task URL");
                return resolver.resolve(url).await;
            }
        }
        Err(ResolveError::NoHandler {
            url: url.to_string(),
        })
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the registry used by CLI execution flows: the indirect host
/// resolver first, then the direct fallback.
#[must_use]
pub fn build_default_registry(
    client: crate::download::HttpClient,
    rate_limiter: std::sync::Arc<crate::download::RateLimiter>,
) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    registry.register(Box::new(NepisResolver::new(client, rate_limiter)));
    registry.register(Box::new(DirectResolver::new()));
    registry
}
