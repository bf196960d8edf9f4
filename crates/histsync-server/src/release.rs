//! Release resolver.
//!
//! Tracks the newest release whose artifacts are all published. A tag can
//! appear on the upstream feed minutes before its binaries finish
//! uploading, so a fresh tag is only advertised once every artifact URL
//! answers; otherwise the resolver walks back through predecessor tags.

use std::time::Duration;

use histsync_shared::constants::{MAX_VERSION_DECREMENTS, UNKNOWN_VERSION};
use histsync_shared::UpdateInfo;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ReleaseError;

const RATE_LIMIT_MARKER: &str = "API rate limit exceeded for ";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ReleaseInfo {
    name: String,
}

/// Result of one [`ReleaseResolver::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The feed rate-limited us; the current version was kept.
    RateLimited,
    /// The advertised version is now this tag.
    Resolved(String),
}

pub struct ReleaseResolver {
    client: reqwest::Client,
    feed_url: String,
    download_base: String,
    /// Only written by `refresh`, read by every download request.
    current: RwLock<String>,
}

impl ReleaseResolver {
    pub fn new(
        feed_url: impl Into<String>,
        download_base: impl Into<String>,
        initial_version: impl Into<String>,
    ) -> Result<Self, ReleaseError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("histsync-server/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            feed_url: feed_url.into(),
            download_base: download_base.into(),
            current: RwLock::new(initial_version.into()),
        })
    }

    pub async fn current_version(&self) -> String {
        self.current.read().await.clone()
    }

    /// Download manifest for the currently advertised version.
    pub async fn update_info(&self) -> UpdateInfo {
        UpdateInfo::for_version(&self.download_base, &self.current_version().await)
    }

    /// Fetch the latest tag and advertise its newest fully published
    /// predecessor (or the tag itself).
    pub async fn refresh(&self) -> Result<RefreshOutcome, ReleaseError> {
        let Some(latest) = self.latest_tag().await? else {
            info!("Release feed rate limited, keeping current version");
            return Ok(RefreshOutcome::RateLimited);
        };

        let version = self.decrement_version_if_invalid(&latest).await;
        let mut current = self.current.write().await;
        if *current != version {
            info!(previous = %current, version = %version, "Advertised release changed");
        }
        *current = version.clone();

        Ok(RefreshOutcome::Resolved(version))
    }

    /// `Ok(None)` when the feed rate limited the request.
    async fn latest_tag(&self) -> Result<Option<String>, ReleaseError> {
        let resp = self.client.get(&self.feed_url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status == StatusCode::FORBIDDEN && body.contains(RATE_LIMIT_MARKER) {
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(ReleaseError::FeedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let info: ReleaseInfo = serde_json::from_str(&body)?;
        Ok(Some(info.name))
    }

    /// Walk back from `initial` until a version with every artifact
    /// published is found, trying at most [`MAX_VERSION_DECREMENTS`] tags.
    /// Falls back to `initial` when none qualifies.
    pub async fn decrement_version_if_invalid(&self, initial: &str) -> String {
        let mut version = initial.to_string();

        for _ in 0..MAX_VERSION_DECREMENTS {
            let update_info = UpdateInfo::for_version(&self.download_base, &version);
            match self.validate(&update_info).await {
                Ok(()) => {
                    debug!(version = %version, "Found a valid release");
                    return version;
                }
                Err(e) => {
                    warn!(version = %version, error = %e, "Release is not fully published");
                }
            }

            version = match decrement_version(&version) {
                Ok(previous) => previous,
                Err(e) => {
                    warn!(initial, error = %e, "Cannot decrement release version");
                    return initial.to_string();
                }
            };
        }

        warn!(
            initial,
            last_checked = %version,
            "No fully published release within the decrement bound"
        );
        initial.to_string()
    }

    /// Probe every artifact URL. A transport error or a 404 invalidates the
    /// release.
    async fn validate(&self, update_info: &UpdateInfo) -> Result<(), ReleaseError> {
        for url in update_info.urls() {
            let resp = self.client.head(url).send().await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Err(ReleaseError::MissingArtifact(url.to_string()));
            }
        }
        Ok(())
    }
}

/// `v0.50` -> `v0.49`. Tags must look like `<prefix>.<number>`.
pub fn decrement_version(version: &str) -> Result<String, ReleaseError> {
    if version == UNKNOWN_VERSION {
        return Err(ReleaseError::InvalidVersion(format!(
            "cannot decrement {UNKNOWN_VERSION}"
        )));
    }

    let parts: Vec<&str> = version.split('.').collect();
    let [prefix, number] = parts.as_slice() else {
        return Err(ReleaseError::InvalidVersion(version.to_string()));
    };
    let number: u64 = number
        .parse()
        .map_err(|_| ReleaseError::InvalidVersion(version.to_string()))?;
    if number == 0 {
        return Err(ReleaseError::InvalidVersion(format!(
            "{version} has no predecessor"
        )));
    }

    Ok(format!("{prefix}.{}", number - 1))
}
