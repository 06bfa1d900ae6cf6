use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::resource::ServedResource;

/// Fallback API server address when neither an override nor in-cluster
/// service variables are set.
pub const LOCAL_API_SERVER: &str = "https://127.0.0.1:6443";

/// URL prefixes owned by the proxy itself.
const RESERVED_PREFIXES: &[&str] = &["health", "swagger-ui", "api-docs"];

#[derive(Debug, Clone)]
pub struct Config {
    pub service_host: String,
    pub service_port: u16,
    pub api_server_override: Option<String>,
    pub in_cluster_host: Option<String>,
    pub in_cluster_port: Option<String>,
    pub kubeconfig_path: PathBuf,
    pub insecure_skip_tls_verify: bool,
    pub resources: Vec<ServedResource>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let service_host = var("SERVICE_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let service_port = var("SERVICE_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("SERVICE_PORT must be a valid port number (0-65535)")?;

        let api_server_override = var("KUBERNETES_API_SERVER");
        let in_cluster_host = var("KUBERNETES_SERVICE_HOST");
        let in_cluster_port = var("KUBERNETES_SERVICE_PORT");

        // Without HOME this is `/.kube/config`; the in-cluster and token
        // providers are consulted before it anyway.
        let kubeconfig_path = match var("KUBECONFIG") {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(format!("{}/.kube/config", var("HOME").unwrap_or_default())),
        };

        let insecure_skip_tls_verify = match var("KUBERNETES_INSECURE_SKIP_TLS_VERIFY") {
            Some(raw) => parse_bool(&raw)
                .context("KUBERNETES_INSECURE_SKIP_TLS_VERIFY must be true or false")?,
            None => false,
        };

        let resources = match var("PROXY_RESOURCES") {
            Some(raw) => parse_resources(&raw)?,
            None => vec![ServedResource::http_route()],
        };

        Ok(Config {
            service_host,
            service_port,
            api_server_override,
            in_cluster_host,
            in_cluster_port,
            kubeconfig_path,
            insecure_skip_tls_verify,
            resources,
        })
    }

    /// Address used for clients authenticated with a caller's bearer token.
    ///
    /// Priority: explicit override, then in-cluster service variables (both
    /// must be set), then [`LOCAL_API_SERVER`].
    pub fn api_server(&self) -> String {
        if let Some(api_server) = &self.api_server_override {
            return api_server.clone();
        }
        match (&self.in_cluster_host, &self.in_cluster_port) {
            (Some(host), Some(port)) if host.contains(':') => format!("https://[{host}]:{port}"),
            (Some(host), Some(port)) => format!("https://{host}:{port}"),
            _ => LOCAL_API_SERVER.to_string(),
        }
    }

    pub fn log_startup(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Listening on: {}:{}", self.service_host, self.service_port);
        tracing::info!("  API server for token clients: {}", self.api_server());
        tracing::info!("  Fallback kubeconfig: {}", self.kubeconfig_path.display());
        if self.insecure_skip_tls_verify {
            tracing::warn!("  TLS verification disabled for token clients");
        }
        for resource in &self.resources {
            tracing::info!("  Serving /{}/{{namespace}}/{{name}} -> {}", resource.path_prefix, resource);
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("invalid boolean '{}'", other),
    }
}

fn parse_resources(raw: &str) -> Result<Vec<ServedResource>> {
    let mut seen = HashSet::new();
    let mut resources = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let resource: ServedResource = entry
            .parse()
            .with_context(|| format!("invalid PROXY_RESOURCES entry '{}'", entry))?;

        if RESERVED_PREFIXES.contains(&resource.path_prefix.as_str()) {
            bail!("PROXY_RESOURCES prefix '{}' is reserved", resource.path_prefix);
        }
        if !seen.insert(resource.path_prefix.clone()) {
            bail!("PROXY_RESOURCES prefix '{}' is listed twice", resource.path_prefix);
        }
        resources.push(resource);
    }

    if resources.is_empty() {
        bail!("PROXY_RESOURCES must name at least one resource");
    }
    Ok(resources)
}
