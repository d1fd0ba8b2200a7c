//! Record of what an upload run actually published.
//!
//! The uploader leaves a manifest next to the images; the catalog writer only registers the files
//! it lists as uploaded, under the URL it lists.
use crate::naming::PublishedUrl;
use crate::upload::UploadOutcome;
use crate::{err, Error};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// File name of the manifest inside the uploaded directory. Hidden, so directory listings skip it.
pub const MANIFEST_FILE: &str = ".upload-manifest.json";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadManifest {
    pub entries: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Local file name
    pub file_name: String,
    pub destination_name: String,
    /// Set when the upload succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<PublishedUrl>,
    /// Set when the upload failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadManifest {
    pub fn from_outcomes(outcomes: &[UploadOutcome]) -> Self {
        let entries = outcomes
            .iter()
            .map(|outcome| {
                let (url, error) = match &outcome.result {
                    Ok(url) => (Some(url.clone()), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                ManifestEntry {
                    file_name: outcome.source.file_name(),
                    destination_name: outcome.source.destination_name().to_string(),
                    url,
                    error,
                }
            })
            .collect();
        Self { entries }
    }

    /// URL `file_name` was published under, if its upload succeeded.
    pub fn url_for(&self, file_name: &str) -> Option<&PublishedUrl> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.file_name == file_name)
            .and_then(|entry| entry.url.as_ref())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|entry| entry.url.is_none())
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Write the manifest into `dir`, replacing an earlier one.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf, Error> {
        let path = Self::path(dir);
        let json = serde_json::to_vec_pretty(self).with_context(|| err::Manifest {
            path: path.display().to_string(),
        })?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| err::Io {
                description: path.display().to_string(),
            })?;
        Ok(path)
    }

    /// The manifest in `dir`, or `None` when nothing was uploaded from it yet.
    pub async fn read(dir: &Path) -> Result<Option<Self>, Error> {
        let path = Self::path(dir);
        let json = match tokio::fs::read(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| err::Io {
                    description: path.display().to_string(),
                })
            }
        };
        serde_json::from_slice(&json)
            .map(Some)
            .with_context(|| err::Manifest {
                path: path.display().to_string(),
            })
    }
}
