//! Dotted hierarchical package identifiers.
//!
//! A `ProjectPath` is an ordered sequence of name segments, written
//! `org.boost.algorithm`. A path is absolute when its first segment is one
//! of the registry owner namespaces; anything else is relative and must be
//! resolved against the manifest's `root_project`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Registry owner namespaces. A path starting with one of these is absolute.
const OWNERS: [&str; 3] = ["com", "org", "pvt"];

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectPath {
    segments: Vec<String>,
}

impl ProjectPath {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(ProjectPath::default());
        }
        let mut segments = Vec::new();
        for seg in s.split('.') {
            if seg.is_empty() {
                return Err(Error::Manifest(format!("empty segment in package name '{}'", s)));
            }
            if !seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::Manifest(format!(
                    "invalid character in package name '{}' (segment '{}')",
                    s, seg
                )));
            }
            segments.push(seg.to_string());
        }
        Ok(ProjectPath { segments })
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.segments
            .first()
            .is_some_and(|s| OWNERS.contains(&s.as_str()))
    }

    pub fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    /// Resolve against `root`: relative paths are prefixed, absolute paths
    /// are returned unchanged (re-resolution is idempotent).
    pub fn resolve(&self, root: &ProjectPath) -> ProjectPath {
        if self.is_absolute() {
            return self.clone();
        }
        let mut segments = root.segments.clone();
        segments.extend(self.segments.iter().cloned());
        ProjectPath { segments }
    }

    /// Filesystem rendering: one directory per segment.
    pub fn to_fs_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// URL-path rendering with `/` separators.
    pub fn slash_path(&self) -> String {
        self.segments.join("/")
    }

    /// True when `self` starts with every segment of `prefix`.
    pub fn starts_with(&self, prefix: &ProjectPath) -> bool {
        !prefix.is_empty()
            && self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl std::str::FromStr for ProjectPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ProjectPath::parse(s)
    }
}

impl TryFrom<String> for ProjectPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        ProjectPath::parse(&s)
    }
}

impl From<ProjectPath> for String {
    fn from(p: ProjectPath) -> Self {
        p.to_string()
    }
}
