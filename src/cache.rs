//! Content-addressed package cache.
//!
//! Cached packages live under `<root>/<package-as-path>/<version>/` with a
//! sibling `archive.md5` integrity witness. An entry is reused when the
//! witness matches the registry digest and the version directory exists;
//! otherwise the archive is downloaded, verified, and unpacked atomically
//! (a failed unpack leaves no partial version directory behind).

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use md5::{Digest, Md5};
use tracing::info;

use crate::error::{Error, Result};
use crate::manifest::{Dependency, Proxy};
use crate::registry::http_client;

const MD5_FILENAME: &str = "archive.md5";

pub struct PackageCache {
    host: String,
    data_dir: String,
    client: reqwest::blocking::Client,
}

impl PackageCache {
    pub fn new(host: &str, data_dir: &str, proxy: &Proxy) -> Result<Self> {
        Ok(PackageCache {
            host: host.trim_end_matches('/').to_string(),
            data_dir: data_dir.to_string(),
            client: http_client(proxy)?,
        })
    }

    /// Ensure `<dir>/<version>` holds the verified contents of `dep` and
    /// return that version directory.
    pub fn materialize(&self, dep: &Dependency, dir: &Path) -> Result<PathBuf> {
        let version_dir = dir.join(dep.version.to_string());
        let md5_file = dir.join(MD5_FILENAME);

        let witness = fs::read_to_string(&md5_file)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if !dep.md5.is_empty() && witness == dep.md5 && version_dir.exists() {
            return Ok(version_dir);
        }

        if version_dir.exists() {
            fs::remove_dir_all(&version_dir).map_err(|e| Error::io("remove", &version_dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| Error::io("create", dir, e))?;

        let url = format!(
            "{}/{}/{}/{}.tar.gz",
            self.host,
            self.data_dir,
            dep.package.slash_path(),
            dep.version
        );
        let archive = dir.join(format!("{}.tar.gz", dep.version));

        info!("downloading {}-{}", dep.package, dep.version);
        let downloaded_md5 = self.download(&url, &archive)?;
        if downloaded_md5 != dep.md5 {
            let _ = fs::remove_file(&archive);
            return Err(Error::Md5Mismatch {
                package: dep.package.to_string(),
            });
        }

        fs::write(&md5_file, &dep.md5).map_err(|e| Error::io("write", &md5_file, e))?;

        info!("unpacking {}", archive.display());
        if let Err(e) = unpack_archive(&archive, &version_dir) {
            let _ = fs::remove_dir_all(&version_dir);
            let _ = fs::remove_file(&archive);
            return Err(e);
        }
        fs::remove_file(&archive).map_err(|e| Error::io("remove", &archive, e))?;

        Ok(version_dir)
    }

    /// Download `url` to `dest`, streaming through an MD5 accumulator.
    /// A partial file is removed on any failure.
    fn download(&self, url: &str, dest: &Path) -> Result<String> {
        let result = self.download_inner(url, dest);
        if result.is_err() {
            let _ = fs::remove_file(dest);
        }
        result
    }

    fn download_inner(&self, url: &str, dest: &Path) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Http {
                url: url.to_string(),
                source: e,
            })?;

        let mut file = fs::File::create(dest).map_err(|e| Error::io("create", dest, e))?;
        let mut hasher = Md5::new();
        let mut reader = response;
        let mut buf = [0u8; 8192];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| Error::io("download to", dest, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .map_err(|e| Error::io("write", dest, e))?;
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Unpack a gzip tar archive into `dest`. Entries whose paths would escape
/// the destination are skipped.
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive).map_err(|e| Error::io("open", archive, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    fs::create_dir_all(dest).map_err(|e| Error::io("create", dest, e))?;

    let entries = tar.entries().map_err(|e| Error::Archive {
        path: archive.to_path_buf(),
        message: e.to_string(),
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Archive {
            path: archive.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry
            .path()
            .map_err(|e| Error::Archive {
                path: archive.to_path_buf(),
                message: e.to_string(),
            })?
            .into_owned();
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
        {
            continue;
        }

        let out = dest.join(&path);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&out).map_err(|e| Error::io("create", &out, e))?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io("create", parent, e))?;
            }
            let mut file = fs::File::create(&out).map_err(|e| Error::io("create", &out, e))?;
            std::io::copy(&mut entry, &mut file).map_err(|e| Error::Archive {
                path: archive.to_path_buf(),
                message: e.to_string(),
            })?;
        }
    }
    Ok(())
}
