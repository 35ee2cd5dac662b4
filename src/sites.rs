//! Per-site profiles.
//!
//! Each property site is described by one plain record. The front end reads
//! the public part through `GET /v1/sites/{slug}`; the backend keeps the
//! notification address to itself.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::validate::slugify;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SiteProfile {
    pub slug: String,
    pub property_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub form_url: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub turnstile_site_key: Option<String>,
    #[serde(default)]
    pub booking_api_url: Option<String>,
    #[serde(default, skip_serializing)]
    #[schema(skip)]
    pub notify_email: Vec<String>,
    #[serde(default)]
    pub featured_images: BTreeMap<String, String>,
    #[serde(default)]
    pub carousels: BTreeMap<String, Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum SiteDirectoryError {
    #[error("reading {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parsing site profiles: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("site profile with empty slug")]
    EmptySlug,
    #[error("duplicate site profile '{0}'")]
    Duplicate(String),
}

#[derive(Debug, Clone, Default)]
pub struct SiteDirectory {
    profiles: HashMap<String, SiteProfile>,
}

impl SiteDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: Vec<SiteProfile>) -> Result<Self, SiteDirectoryError> {
        let mut map = HashMap::with_capacity(profiles.len());
        for mut p in profiles {
            p.slug = slugify(&p.slug);
            if p.slug.is_empty() {
                return Err(SiteDirectoryError::EmptySlug);
            }
            if map.contains_key(&p.slug) {
                return Err(SiteDirectoryError::Duplicate(p.slug));
            }
            map.insert(p.slug.clone(), p);
        }
        Ok(Self { profiles: map })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SiteDirectoryError> {
        Self::from_profiles(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self, SiteDirectoryError> {
        let bytes = std::fs::read(path).map_err(|source| SiteDirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let dir = Self::from_json(&bytes)?;
        log::info!("loaded {} site profiles from '{}'", dir.len(), path.display());
        Ok(dir)
    }

    pub fn get(&self, slug: &str) -> Option<&SiteProfile> {
        self.profiles.get(&slugify(slug))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn has_notify_addresses(&self) -> bool {
        self.profiles.values().any(|p| !p.notify_email.is_empty())
    }
}
