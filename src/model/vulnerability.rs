use super::{Layer, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A vulnerability matched against an installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DetectedVulnerability {
    #[serde(rename = "VulnerabilityID")]
    pub vulnerability_id: String,
    pub pkg_name: String,
    pub installed_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fixed_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub severity_source: String,
    #[serde(rename = "PrimaryURL", skip_serializing_if = "String::is_empty")]
    pub primary_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub severity: Severity,
    #[serde(rename = "CweIDs", skip_serializing_if = "Vec::is_empty")]
    pub cwe_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl DetectedVulnerability {
    pub fn new(
        id: impl Into<String>,
        pkg_name: impl Into<String>,
        installed_version: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            vulnerability_id: id.into(),
            pkg_name: pkg_name.into(),
            installed_version: installed_version.into(),
            severity,
            ..Self::default()
        }
    }

    pub fn with_fixed_version(mut self, version: impl Into<String>) -> Self {
        self.fixed_version = version.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
