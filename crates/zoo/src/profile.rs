//! Hardware profiles and the registry that holds them.

use crate::error::{Result, ZooError};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One hardware/backend pair with its predictor zoo location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub name: String,

    /// Accepts YAML numbers (`1.0`) as well as strings.
    #[serde(deserialize_with = "version_string")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Kernel predictors that must be present for the cache to be complete.
    #[serde(rename = "kernel_predictors", default)]
    pub required_kernel_ids: Vec<String>,

    /// Archive holding the `<name>/` predictor folder.
    #[serde(rename = "download")]
    pub download_url: String,

    /// Overrides `<root>/<name>`. The last path component should still be
    /// the hardware name, since archives are extracted into its parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,
}

impl HardwareProfile {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        required_kernel_ids: Vec<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            category: None,
            package: None,
            required_kernel_ids,
            download_url: download_url.into(),
            local_dir: None,
        }
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    pub fn directory(&self, root: &Path) -> PathBuf {
        self.local_dir
            .clone()
            .unwrap_or_else(|| root.join(&self.name))
    }

    pub fn fusion_rule_file_name(&self) -> String {
        format!("rule_{}.json", self.name)
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text,
        Repr::Int(value) => value.to_string(),
        // Debug keeps the trailing `.0` that Display drops.
        Repr::Float(value) => format!("{value:?}"),
    })
}

/// Explicit registry of hardware profiles; constructed once and passed around.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HardwareRegistry {
    profiles: Vec<HardwareProfile>,
}

impl HardwareRegistry {
    pub fn from_profiles(profiles: Vec<HardwareProfile>) -> Result<Self> {
        {
            let mut seen = HashSet::new();
            for profile in &profiles {
                if !seen.insert((profile.name.as_str(), profile.version.as_str())) {
                    return Err(ZooError::Registry(format!(
                        "duplicate hardware profile {profile}"
                    )));
                }
            }
        }
        Ok(Self { profiles })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let profiles: Vec<HardwareProfile> =
            serde_yaml::from_str(yaml).map_err(|err| ZooError::Registry(err.to_string()))?;
        Self::from_profiles(profiles)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| ZooError::io(path, err))?;
        Self::from_yaml_str(&content)
    }

    pub fn profiles(&self) -> &[HardwareProfile] {
        &self.profiles
    }

    pub fn iter(&self) -> impl Iterator<Item = &HardwareProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Look up a profile by name; without a version the latest one wins.
    pub fn find(&self, name: &str, version: Option<&str>) -> Result<&HardwareProfile> {
        let mut candidates = self.profiles.iter().filter(|p| p.name == name);
        let found = match version {
            Some(version) => candidates.find(|p| p.version == version),
            None => candidates.max_by(|a, b| compare_versions(&a.version, &b.version)),
        };
        found.ok_or_else(|| ZooError::UnknownHardware {
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}
