//! Dependency resolution.
//!
//! One registry round trip resolves the declared direct dependencies into
//! a flattened package graph; every returned package is then materialized
//! through the cache and its target file emitted. Direct packages are
//! rebound onto the declaration that requested them so pinned versions
//! flow back into the manifest model.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use crate::cache::PackageCache;
use crate::error::{Error, Result};
use crate::generate::{print_package_config_file, CMAKE_CONFIG_FILENAME};
use crate::manifest::{Config, Dependency, PackagesDirType, ProjectFlags};
use crate::registry::RegistryClient;

/// Resolve, fetch, and emit every dependency of `config`'s projects.
///
/// Fills `config.packages` and `config.indirect_dependencies`, back-writes
/// pinned versions into the projects' declared dependencies, and writes a
/// target file into each cached version directory. A manifest with no
/// absolute dependencies skips the registry entirely.
pub fn download_dependencies(config: &mut Config) -> Result<()> {
    let mut request: BTreeMap<String, String> = BTreeMap::new();
    for project in &config.projects {
        for dep in project.dependencies.values() {
            if dep.package.is_relative() {
                continue;
            }
            request.insert(dep.package.to_string(), dep.version.to_string());
        }
    }
    if request.is_empty() {
        return Ok(());
    }

    info!("requesting dependency list");
    let client = RegistryClient::new(&config.host, &config.proxy)?;
    let tree = client.find_dependencies(&request)?;
    let cache = PackageCache::new(&config.host, &tree.data_dir, &config.proxy)?;

    // Every package is materialized before any emission begins.
    let default_dir_type = config.packages_dir_type;
    let mut materialized: Vec<(String, Dependency)> = Vec::new();
    for (name, dep) in &tree.packages {
        let mut dep = dep.clone();

        // Indirect packages always cache under the config storage dir;
        // per-dependency roots apply to direct dependencies only.
        let dir = if dep.flags.contains(ProjectFlags::DIRECT) {
            rebind_direct(config, name, &dep, default_dir_type)?
        } else {
            config.storage_dir.join(dep.package.to_fs_path())
        };

        dep.package_dir = cache.materialize(&dep, &dir)?;
        materialized.push((name.clone(), dep));
    }

    for (name, dep) in materialized {
        let mut dep_config = Config::new()?;
        dep_config.load_manifest(&dep.package_dir)?;

        let out = dep.package_dir.join(CMAKE_CONFIG_FILENAME);
        let pi = print_package_config_file(&dep_config, &dep, config, &out)?;

        if dep.flags.contains(ProjectFlags::DIRECT) {
            config.packages.insert(name, pi);
        } else {
            config.indirect_dependencies.insert(name, dep);
        }
    }
    Ok(())
}

/// Match a direct package from the registry back onto the declaration
/// that requested it: exact package match first, then a literal prefix
/// match on dotted segments. The pinned version is written onto every
/// matching declaration; the first match selects the cache root.
fn rebind_direct(
    config: &mut Config,
    name: &str,
    dep: &Dependency,
    default_dir_type: PackagesDirType,
) -> Result<PathBuf> {
    let mut dir: Option<PathBuf> = None;
    for project in &mut config.projects {
        if let Some(declared) = project.dependencies.get_mut(name) {
            declared.version = dep.version.clone();
            if dir.is_none() {
                let root = Config::packages_dir(declared.package_dir_type(default_dir_type))?;
                dir = Some(root.join(dep.package.to_fs_path()));
            }
        } else {
            for declared in project.dependencies.values_mut() {
                if dep.package.starts_with(&declared.package) {
                    declared.version = dep.version.clone();
                    if dir.is_none() {
                        let root =
                            Config::packages_dir(declared.package_dir_type(default_dir_type))?;
                        dir = Some(root.join(dep.package.to_fs_path()));
                    }
                    break;
                }
            }
        }
    }
    dir.ok_or_else(|| Error::Internal(format!("cannot match received dependency '{}'", name)))
}
