//! Naming contract shared by the uploader and the catalog writer.
//!
//! The catalog never asks the object store where a file ended up: it rebuilds the public URL
//! from the same convention the uploader used. Both sides therefore go through
//! [`PublishConvention`].
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConvention {
    pub bucket: String,
    pub region: String,
    /// Domain suffix of the public endpoint, after `s3.<region>.`
    pub domain: String,
    /// "Directory" all objects are stored under. May be empty.
    pub key_prefix: String,
    /// Prepended to the local file name to form the destination name.
    pub name_prefix: String,
}

impl Default for PublishConvention {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "cn-north-1".to_string(),
            domain: "amazonaws.com.cn".to_string(),
            key_prefix: String::new(),
            name_prefix: String::new(),
        }
    }
}

impl PublishConvention {
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key_prefix: K) -> Self {
        Self {
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            ..Default::default()
        }
    }

    /// Name under `key_prefix` that the local file `file_name` is published as.
    pub fn destination_name(&self, file_name: &str) -> String {
        format!("{}{}", self.name_prefix, file_name)
    }

    pub fn object_key(&self, destination_name: &str) -> String {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            destination_name.to_string()
        } else {
            format!("{}/{}", prefix, destination_name)
        }
    }

    pub fn public_url(&self, destination_name: &str) -> PublishedUrl {
        PublishedUrl(format!(
            "https://{}.s3.{}.{}/{}",
            self.bucket,
            self.region,
            self.domain,
            self.object_key(destination_name)
        ))
    }

    /// Public URL of a local file uploaded under this convention.
    pub fn url_for_file(&self, file_name: &str) -> PublishedUrl {
        self.public_url(&self.destination_name(file_name))
    }
}

/// Public URL of an uploaded object. Built by [`PublishConvention`], or read back from an
/// [`UploadManifest`](crate::manifest::UploadManifest) the uploader wrote.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedUrl(String);

impl PublishedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PublishedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PublishedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
