//! Package versions.
//!
//! A version is either three components `major.minor.patch` where `-1`
//! stands for "any", or a branch name. `1.2` parses as `{1, 2, -1}` and
//! renders back as `1.2`; `*` is the all-any version.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ANY: i64 = -1;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    pub branch: Option<String>,
}

impl Default for Version {
    fn default() -> Self {
        Version {
            major: ANY,
            minor: ANY,
            patch: ANY,
            branch: None,
        }
    }
}

impl Version {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Version::default());
        }

        if s.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            let mut v = Version::default();
            let parts: Vec<&str> = s.split('.').collect();
            if parts.len() > 3 {
                return Err(Error::Manifest(format!("invalid version '{}'", s)));
            }
            let nums = [&mut v.major, &mut v.minor, &mut v.patch];
            for (slot, part) in nums.into_iter().zip(&parts) {
                *slot = part
                    .parse::<i64>()
                    .map_err(|_| Error::Manifest(format!("invalid version '{}'", s)))?;
                if *slot < 0 {
                    return Err(Error::Manifest(format!("invalid version '{}'", s)));
                }
            }
            return Ok(v);
        }

        // Branch names look like identifiers.
        if s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Ok(Version {
                branch: Some(s.to_string()),
                ..Version::default()
            });
        }

        Err(Error::Manifest(format!("invalid version '{}'", s)))
    }

    pub fn is_branch(&self) -> bool {
        self.branch.is_some()
    }

    /// `"*"` when every component is any, otherwise the dotted form
    /// truncated at the first any component. Branches render as the branch
    /// name.
    pub fn to_any_version(&self) -> String {
        if let Some(ref b) = self.branch {
            return b.clone();
        }
        if self.major == ANY {
            return "*".to_string();
        }
        let mut s = self.major.to_string();
        if self.minor != ANY {
            s.push_str(&format!(".{}", self.minor));
            if self.patch != ANY {
                s.push_str(&format!(".{}", self.patch));
            }
        }
        s
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_any_version())
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert!(!v.is_branch());

        let v = Version::parse("1.2").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, ANY));

        let v = Version::parse("1").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, ANY, ANY));

        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("1.x.3").is_err());
    }

    #[test]
    fn test_parse_wildcard_and_branch() {
        assert!(!Version::parse("*").unwrap().is_branch());
        assert_eq!(Version::parse("*").unwrap(), Version::default());

        let v = Version::parse("master").unwrap();
        assert!(v.is_branch());
        assert_eq!(v.to_string(), "master");
    }

    #[test]
    fn test_any_version_rendering() {
        // "*" iff all components are any; otherwise a prefix of the dotted
        // form with one element per non-any component.
        assert_eq!(Version::default().to_any_version(), "*");
        assert_eq!(Version::parse("1.2.3").unwrap().to_any_version(), "1.2.3");
        assert_eq!(Version::parse("1.2").unwrap().to_any_version(), "1.2");
        assert_eq!(Version::parse("1").unwrap().to_any_version(), "1");

        let mut v = Version::parse("1.2.3").unwrap();
        v.patch = ANY;
        assert_eq!(v.to_any_version(), "1.2");
        v.minor = ANY;
        assert_eq!(v.to_any_version(), "1");
    }
}
