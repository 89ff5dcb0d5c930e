//! Latest-build lookup against the upstream download links API

use crate::error::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_LINKS_ENDPOINT: &str =
    "https://net-secondary.web.minecraft-services.net/api/v1.0/download/links";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"bedrock-server-([0-9.]+)\.zip").expect("Invalid version pattern")
});

/// Server platform; selects the upstream link and the fallback URL template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// `downloadType` value in the links API
    pub fn link_type(&self) -> &'static str {
        match self {
            Platform::Windows => "serverBedrockWindows",
            Platform::Linux => "serverBedrockLinux",
        }
    }

    fn bin_dir(&self) -> &'static str {
        match self {
            Platform::Windows => "bin-win",
            Platform::Linux => "bin-linux",
        }
    }

    /// Download URL derived from the version alone
    pub fn download_url(&self, version: &str) -> String {
        format!(
            "https://www.minecraft.net/bedrockdedicatedserver/{}/bedrock-server-{}.zip",
            self.bin_dir(),
            version
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub download_url: String,
    /// False when the fallback version was used
    pub from_upstream: bool,
}

#[derive(Debug, Deserialize)]
struct LinksResponse {
    result: Option<LinksResult>,
}

#[derive(Debug, Deserialize)]
struct LinksResult {
    #[serde(default)]
    links: Vec<DownloadLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadLink {
    download_type: Option<String>,
    download_url: Option<String>,
}

/// Extract the build number from an archive URL
pub fn version_from_url(url: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct VersionResolver {
    client: reqwest::Client,
    endpoint: String,
    platform: Platform,
}

impl VersionResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DEFAULT_LINKS_ENDPOINT.to_string(),
            platform: Platform::current(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Latest upstream version, or `fallback` with the template URL if the
    /// lookup fails for any reason
    pub async fn resolve(&self, fallback: &str) -> ResolvedVersion {
        info!("[VERSION] Checking {} for the latest build", self.endpoint);

        match self.fetch_latest().await {
            Ok((version, download_url)) => {
                info!("[VERSION] Latest version from upstream: {}", version);
                ResolvedVersion {
                    version,
                    download_url,
                    from_upstream: true,
                }
            }
            Err(e) => {
                warn!(
                    "[VERSION] Could not fetch latest version: {}. Using configured version {}",
                    e, fallback
                );
                ResolvedVersion {
                    version: fallback.to_string(),
                    download_url: self.platform.download_url(fallback),
                    from_upstream: false,
                }
            }
        }
    }

    async fn fetch_latest(&self) -> AppResult<(String, String)> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "Links API returned status {}",
                response.status()
            )));
        }

        let body: LinksResponse = response
            .json()
            .await
            .map_err(|e| AppError::Network(format!("Invalid links response: {}", e)))?;

        let url = body
            .result
            .map(|r| r.links)
            .unwrap_or_default()
            .into_iter()
            .find(|link| link.download_type.as_deref() == Some(self.platform.link_type()))
            .and_then(|link| link.download_url)
            .ok_or_else(|| {
                AppError::Network(format!("No {} link published", self.platform.link_type()))
            })?;

        let version = version_from_url(&url)
            .ok_or_else(|| AppError::Network(format!("No version in download URL {}", url)))?;

        Ok((version, url))
    }
}
