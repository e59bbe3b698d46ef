use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Entity UUID as used in every detail route
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EntityUuid(String);

impl FromStr for EntityUuid {
    type Err = anyhow::Error;

    /// Accepts hyphenated, case-insensitive UUIDs; stored lowercase
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref UUID_RE: Regex = Regex::new(
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
            )
            .unwrap();
        }
        if UUID_RE.is_match(s) {
            Ok(EntityUuid(s.to_lowercase()))
        } else {
            Err(anyhow!("not a UUID: {}", s))
        }
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// List ordering: a field name, descending when prefixed with `-`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Ordering {
    pub field: String,
    pub descending: bool,
}

impl FromStr for Ordering {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref ORDERING_RE: Regex = Regex::new(r"^(-)?([a-z][a-z0-9_]*)$").unwrap();
        }
        if let Some(caps) = ORDERING_RE.captures(s) {
            Ok(Ordering {
                field: caps[2].to_string(),
                descending: caps.get(1).is_some(),
            })
        } else {
            Err(anyhow!("not a field to order by: {}", s))
        }
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            write!(f, "{}", self.field)
        }
    }
}

/// API path relative to the base URL, normalized to the trailing-slash form the API expects
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ApiPath(String);

impl FromStr for ApiPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref PATH_RE: Regex =
                Regex::new(r"^[A-Za-z0-9_\-]+(/[A-Za-z0-9_\-]+)*$").unwrap();
        }
        let trimmed = s.trim_matches('/');
        if PATH_RE.is_match(trimmed) {
            Ok(ApiPath(format!("{}/", trimmed)))
        } else {
            Err(anyhow!("not an API path: {}", s))
        }
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ApiPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[test]
fn test_entity_uuid() {
    assert_eq!(
        EntityUuid::from_str("5B0E8F0A-2a53-4a7e-9d6f-1c2b3a4d5e6f")
            .unwrap()
            .to_string(),
        "5b0e8f0a-2a53-4a7e-9d6f-1c2b3a4d5e6f"
    );
    assert!(EntityUuid::from_str("5b0e8f0a2a534a7e9d6f1c2b3a4d5e6f").is_err());
    assert!(EntityUuid::from_str("../etc/passwd").is_err());
    assert!(EntityUuid::from_str("").is_err());
}

#[test]
fn test_ordering() {
    assert_eq!(
        Ordering::from_str("-epss").unwrap(),
        Ordering {
            field: "epss".to_string(),
            descending: true
        }
    );
    assert_eq!(Ordering::from_str("created_at").unwrap().to_string(), "created_at");
    assert_eq!(Ordering::from_str("-updated_at").unwrap().to_string(), "-updated_at");
    assert!(Ordering::from_str("--epss").is_err());
    assert!(Ordering::from_str("name desc").is_err());
    assert!(Ordering::from_str("").is_err());
}

#[test]
fn test_api_path() {
    assert_eq!(ApiPath::from_str("images").unwrap().to_string(), "images/");
    assert_eq!(
        ApiPath::from_str("/repository-tags/abc/rescan-images/")
            .unwrap()
            .to_string(),
        "repository-tags/abc/rescan-images/"
    );
    assert!(ApiPath::from_str("images/../auth").is_err());
    assert!(ApiPath::from_str("images?page=2").is_err());
    assert!(ApiPath::from_str("/").is_err());
}
