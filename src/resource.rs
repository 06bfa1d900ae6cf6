use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use kube::api::ApiResource;

/// A namespaced resource type exposed under `/{path_prefix}/{namespace}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResource {
    pub path_prefix: String,
    /// API group, empty for the core group.
    pub group: String,
    pub version: String,
    /// Plural resource name as used in API paths, e.g. `httproutes`.
    pub plural: String,
    pub kind: String,
}

impl ServedResource {
    pub fn new(path_prefix: &str, group: &str, version: &str, plural: &str, kind: &str) -> Self {
        Self {
            path_prefix: path_prefix.to_string(),
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Gateway API `HTTPRoute`, served under `/httproute`.
    pub fn http_route() -> Self {
        Self::new("httproute", "gateway.networking.k8s.io", "v1", "httproutes", "HTTPRoute")
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Dynamic type information for `Api<DynamicObject>`.
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

impl fmt::Display for ServedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.plural)?;
        if !self.group.is_empty() {
            write!(f, ".{}", self.group)?;
        }
        write!(f, "/{}", self.version)
    }
}

/// Parses `prefix=group/version/plural/Kind`. The group may be empty for
/// core resources, e.g. `cm=/v1/configmaps/ConfigMap`.
impl FromStr for ServedResource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((prefix, gvr)) = s.split_once('=') else {
            bail!("expected prefix=group/version/plural/Kind");
        };

        let prefix = prefix.trim().trim_matches('/');
        if prefix.is_empty() || prefix.contains('/') {
            bail!("prefix must be a single non-empty path segment");
        }

        let parts: Vec<&str> = gvr.trim().split('/').collect();
        let [group, version, plural, kind] = parts.as_slice() else {
            bail!("expected group/version/plural/Kind, got '{}'", gvr.trim());
        };
        if version.is_empty() || plural.is_empty() || kind.is_empty() {
            bail!("version, plural and Kind must not be empty");
        }

        Ok(Self::new(prefix, group, version, plural, kind))
    }
}
