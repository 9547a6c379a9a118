//! Registry wire client.
//!
//! One round trip: POST the root project's direct dependency set to
//! `/api/find_dependencies` and parse the returned flattened package graph
//! (version pins, content hashes, id-indexed adjacency lists).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::{Dependencies, Dependency, ProjectFlags, Proxy};
use crate::path::ProjectPath;
use crate::version::Version;

pub const DEFAULT_DATA_DIR: &str = "data";

/// Shared HTTP client for registry calls and archive downloads.
pub fn http_client(proxy: &Proxy) -> Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(concat!("cppan/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(300));

    if !proxy.host.is_empty() {
        let mut p = reqwest::Proxy::all(&proxy.host)
            .map_err(|e| Error::Registry(format!("invalid proxy '{}': {}", proxy.host, e)))?;
        if !proxy.user.is_empty() {
            let (user, password) = proxy
                .user
                .split_once(':')
                .unwrap_or((proxy.user.as_str(), ""));
            p = p.basic_auth(user, password);
        }
        builder = builder.proxy(p);
    }

    builder
        .build()
        .map_err(|e| Error::Registry(format!("cannot build HTTP client: {}", e)))
}

#[derive(Debug, Deserialize)]
struct WirePackage {
    id: i64,
    version: String,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    md5: String,
    #[serde(default)]
    dependencies: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    api: Option<i64>,
    error: Option<String>,
    data_dir: Option<String>,
    #[serde(default)]
    packages: BTreeMap<String, WirePackage>,
}

/// The flattened graph returned by the registry.
#[derive(Debug, Default)]
pub struct DependencyTree {
    /// URL-path base for archive downloads.
    pub data_dir: String,
    pub packages: Dependencies,
}

pub struct RegistryClient {
    host: String,
    client: reqwest::blocking::Client,
}

impl RegistryClient {
    pub fn new(host: &str, proxy: &Proxy) -> Result<Self> {
        Ok(RegistryClient {
            host: host.trim_end_matches('/').to_string(),
            client: http_client(proxy)?,
        })
    }

    /// Resolve the given `package → version` set against the registry.
    pub fn find_dependencies(&self, deps: &BTreeMap<String, String>) -> Result<DependencyTree> {
        let mut body = serde_json::Map::new();
        for (package, version) in deps {
            body.insert(package.clone(), json!({ "version": version }));
        }

        let url = format!("{}/api/find_dependencies", self.host);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::Value::Object(body))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Http {
                url: url.clone(),
                source: e,
            })?;

        let wire: WireResponse = response
            .json()
            .map_err(|e| Error::Registry(format!("invalid response from '{}': {}", url, e)))?;
        build_tree(wire)
    }
}

/// Materialize the wire document: nodes first, then adjacency by id
/// lookup into sibling entries. Adjacency entries carry version and flags
/// only; the cycle-safe ownership lives in the flat `packages` map.
fn build_tree(wire: WireResponse) -> Result<DependencyTree> {
    if let Some(message) = wire.error {
        return Err(Error::Registry(message));
    }
    match wire.api {
        None => {
            return Err(Error::Registry(
                "api version is missing in the response".to_string(),
            ))
        }
        Some(1) => {}
        Some(v) => return Err(Error::Registry(format!("bad api version {}", v))),
    }

    let mut by_id: BTreeMap<i64, String> = BTreeMap::new();
    let mut packages = Dependencies::new();
    for (name, p) in &wire.packages {
        let dep = Dependency {
            package: ProjectPath::parse(name)?,
            version: Version::parse(&p.version)?,
            flags: ProjectFlags::from_bits(p.flags),
            md5: p.md5.clone(),
            ..Dependency::default()
        };
        by_id.insert(p.id, name.clone());
        packages.insert(name.clone(), dep);
    }

    let mut adjacency: Vec<(String, Dependencies)> = Vec::new();
    for (name, p) in &wire.packages {
        let mut adj = Dependencies::new();
        for id in &p.dependencies {
            let target = by_id.get(id).ok_or_else(|| {
                Error::Registry(format!(
                    "unknown package id {} in dependencies of '{}'",
                    id, name
                ))
            })?;
            let node = &packages[target];
            adj.insert(
                target.clone(),
                Dependency {
                    package: node.package.clone(),
                    version: node.version.clone(),
                    flags: node.flags,
                    ..Dependency::default()
                },
            );
        }
        adjacency.push((name.clone(), adj));
    }
    for (name, adj) in adjacency {
        if let Some(dep) = packages.get_mut(&name) {
            dep.dependencies = adj;
        }
    }

    Ok(DependencyTree {
        data_dir: wire.data_dir.unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        packages,
    })
}
