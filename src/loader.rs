//! Resource loading contract for speculative fetches
//!
//! The scheduler only sees [`ResourceLoader`]; tests drive a controllable
//! mock, production uses the reqwest-backed [`HttpResourceLoader`] which
//! warms HTTP caches the way a browser `<link rel="preload">` would.

use crate::error::PreloadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of resource being preloaded; each kind has its own completion signal
/// and timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Image asset
    Image,
    /// CSS stylesheet
    Stylesheet,
    /// Script bundle
    Script,
    /// Web font
    Font,
    /// Lightweight existence probe for a navigable route
    Route,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::Font => "font",
            Self::Route => "route",
        };
        f.write_str(name)
    }
}

/// Successful load details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Whether the resource was answered by an intermediate cache
    pub from_cache: bool,
}

/// Abstract resource fetcher. The scheduler enforces timeouts; loaders
/// should not set their own deadlines.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Fetch one resource to warm caches. The body is discarded.
    async fn load(&self, url: &str, resource_type: ResourceType) -> Result<LoadOutcome, PreloadError>;
}

/// reqwest-backed [`ResourceLoader`].
///
/// Assets are fetched with GET; routes use a HEAD existence probe. A
/// response is considered cache-served when the CDN says so via an `x-cache`
/// hit marker.
#[derive(Debug, Clone)]
pub struct HttpResourceLoader {
    client: reqwest::Client,
}

impl HttpResourceLoader {
    /// Build a loader with a default client
    pub fn new() -> Result<Self, PreloadError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PreloadError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Build a loader around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceLoader for HttpResourceLoader {
    async fn load(&self, url: &str, resource_type: ResourceType) -> Result<LoadOutcome, PreloadError> {
        let request = match resource_type {
            ResourceType::Route => self.client.head(url),
            _ => self.client.get(url),
        };

        let response = request.send().await.map_err(PreloadError::from)?;
        let status = response.status();

        // Redirects were already followed; 3xx here means a redirect loop or
        // a disabled policy, treat it as a failed probe like 4xx/5xx.
        if !status.is_success() {
            return Err(PreloadError::Probe {
                status: status.as_u16(),
            });
        }

        let from_cache = response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("hit"));

        // Drain the body so the bytes actually travel into the HTTP cache
        if resource_type != ResourceType::Route {
            let _ = response.bytes().await.map_err(PreloadError::from)?;
        }

        Ok(LoadOutcome { from_cache })
    }
}
