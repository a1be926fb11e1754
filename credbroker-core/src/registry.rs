//! Privileged registry classification.
//!
//! A [`RegistrySet`] decides whether a server URL handed to the helper
//! belongs to Google Container Registry / Artifact Registry and should be
//! answered with an OAuth access token instead of stored credentials.
//!
//! Callers pass either a bare host (`gcr.io`) or a full URL
//! (`https://us.gcr.io/v2/`). Both forms are matched: the authority of the
//! parsed URL (host, plus port when it is not the scheme default) and the raw
//! input string are each compared exactly against the set.

use std::collections::BTreeSet;
use url::{ParseError, Url};

/// Container Registry hosts.
pub const GCR_REGISTRIES: &[&str] = &[
    "gcr.io",
    "us.gcr.io",
    "eu.gcr.io",
    "asia.gcr.io",
    "staging-k8s.gcr.io",
    "marketplace.gcr.io",
];

/// Artifact Registry locations served at `{location}-docker.pkg.dev`.
pub const ARTIFACT_REGISTRY_LOCATIONS: &[&str] = &[
    "asia",
    "asia-east1",
    "asia-east2",
    "asia-northeast1",
    "asia-northeast2",
    "asia-northeast3",
    "asia-south1",
    "asia-southeast1",
    "asia-southeast2",
    "australia-southeast1",
    "europe",
    "europe-north1",
    "europe-west1",
    "europe-west2",
    "europe-west3",
    "europe-west4",
    "europe-west6",
    "northamerica-northeast1",
    "southamerica-east1",
    "us",
    "us-central1",
    "us-east1",
    "us-east4",
    "us-west1",
    "us-west2",
    "us-west3",
    "us-west4",
];

/// Immutable set of privileged registry hostnames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySet {
    hosts: BTreeSet<String>,
}

impl RegistrySet {
    /// Create a set from explicit hostnames.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in Container Registry and Artifact Registry hosts.
    pub fn gcr_defaults() -> Self {
        let artifact_registry = ARTIFACT_REGISTRY_LOCATIONS
            .iter()
            .map(|location| format!("{}-docker.pkg.dev", location));

        Self::new(
            GCR_REGISTRIES
                .iter()
                .map(|host| host.to_string())
                .chain(artifact_registry),
        )
    }

    /// Return a copy with additional hosts.
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    /// Whether `server_url` names a privileged registry.
    ///
    /// Input without a scheme has no host component and is matched on the
    /// raw string only. Any other unparseable input is never privileged.
    ///
    /// URLs are compared by their normalized authority: hosts are
    /// lowercased and a port equal to the scheme default is dropped. So
    /// `https://GCR.IO` and `https://gcr.io:443` are privileged, which a
    /// comparison against the literal `host[:port]` of the URL would reject.
    pub fn is_privileged(&self, server_url: &str) -> bool {
        match Url::parse(server_url) {
            Ok(url) => {
                authority(&url).is_some_and(|a| self.hosts.contains(&a))
                    || self.hosts.contains(server_url)
            }
            Err(ParseError::RelativeUrlWithoutBase) => self.hosts.contains(server_url),
            Err(e) => {
                tracing::debug!("Unparseable server URL {:?}: {}", server_url, e);
                false
            }
        }
    }

    /// Iterate over the hosts in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Number of hosts in the set.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the set holds no hosts.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl Default for RegistrySet {
    fn default() -> Self {
        Self::gcr_defaults()
    }
}

/// `host[:port]`, with the port only when it differs from the scheme default.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
