use serde::{Deserialize, Serialize};

use crate::constants::APP_NAME;

/// Per-platform download manifest for one release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateInfo {
    #[serde(rename = "linux_amd_64_url")]
    pub linux_amd64_url: String,
    #[serde(rename = "linux_amd_64_attestation_url")]
    pub linux_amd64_attestation_url: String,
    #[serde(rename = "darwin_amd_64_url")]
    pub darwin_amd64_url: String,
    #[serde(rename = "darwin_amd_64_unsigned_url")]
    pub darwin_amd64_unsigned_url: String,
    #[serde(rename = "darwin_amd_64_attestation_url")]
    pub darwin_amd64_attestation_url: String,
    #[serde(rename = "darwin_arm_64_url")]
    pub darwin_arm64_url: String,
    #[serde(rename = "darwin_arm_64_unsigned_url")]
    pub darwin_arm64_unsigned_url: String,
    #[serde(rename = "darwin_arm_64_attestation_url")]
    pub darwin_arm64_attestation_url: String,
    pub version: String,
}

impl UpdateInfo {
    /// Build the manifest for `version`, with artifacts laid out as
    /// `<download_base>/<version>/histsync-<platform>[suffix]`.
    pub fn for_version(download_base: &str, version: &str) -> Self {
        let base = download_base.trim_end_matches('/');
        let artifact = |platform: &str, suffix: &str| {
            format!("{base}/{version}/{APP_NAME}-{platform}{suffix}")
        };

        Self {
            linux_amd64_url: artifact("linux-amd64", ""),
            linux_amd64_attestation_url: artifact("linux-amd64", ".intoto.jsonl"),
            darwin_amd64_url: artifact("darwin-amd64", ""),
            darwin_amd64_unsigned_url: artifact("darwin-amd64", "-unsigned"),
            darwin_amd64_attestation_url: artifact("darwin-amd64", ".intoto.jsonl"),
            darwin_arm64_url: artifact("darwin-arm64", ""),
            darwin_arm64_unsigned_url: artifact("darwin-arm64", "-unsigned"),
            darwin_arm64_attestation_url: artifact("darwin-arm64", ".intoto.jsonl"),
            version: version.to_string(),
        }
    }

    /// Every artifact URL, in the order they should be validated.
    pub fn urls(&self) -> [&str; 8] {
        [
            &self.linux_amd64_url,
            &self.linux_amd64_attestation_url,
            &self.darwin_amd64_url,
            &self.darwin_amd64_unsigned_url,
            &self.darwin_amd64_attestation_url,
            &self.darwin_arm64_url,
            &self.darwin_arm64_unsigned_url,
            &self.darwin_arm64_attestation_url,
        ]
    }
}
