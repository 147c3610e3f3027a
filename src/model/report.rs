use super::{DetectedVulnerability, Package, Severity};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Complete scan output for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Report {
    #[serde(rename = "ArtifactID", skip_serializing_if = "String::is_empty")]
    pub artifact_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repo_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repo_digests: Vec<String>,
    #[serde(skip_serializing_if = "Results::is_empty")]
    pub results: Results,
}

impl Report {
    pub fn new(artifact_id: impl Into<String>, results: Vec<ScanResult>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            results: Results(results),
            ..Self::default()
        }
    }
}

/// Findings for a single scanned target, such as a lock file or an OS layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ScanResult {
    pub target: String,
    #[serde(rename = "Type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<DetectedVulnerability>,
}

impl ScanResult {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_packages(mut self, packages: Vec<Package>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_vulnerabilities(mut self, vulnerabilities: Vec<DetectedVulnerability>) -> Self {
        self.vulnerabilities = vulnerabilities;
        self
    }

    /// Vulnerabilities whose severity is in `severities`, in their original order.
    ///
    /// An empty `severities` slice keeps everything.
    pub fn filtered_vulnerabilities<'a>(
        &'a self,
        severities: &'a [Severity],
    ) -> impl Iterator<Item = &'a DetectedVulnerability> + 'a {
        self.vulnerabilities
            .iter()
            .filter(move |v| severities.is_empty() || severities.contains(&v.severity))
    }
}

/// Ordered list of per-target results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Results(pub Vec<ScanResult>);

impl Results {
    /// Returns true if any target has at least one vulnerability.
    ///
    /// Callers use this to pick a non-zero exit status.
    pub fn failed(&self) -> bool {
        self.0.iter().any(|r| !r.vulnerabilities.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Results {
    type Target = [ScanResult];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ScanResult>> for Results {
    fn from(results: Vec<ScanResult>) -> Self {
        Results(results)
    }
}

impl<'a> IntoIterator for &'a Results {
    type Item = &'a ScanResult;
    type IntoIter = std::slice::Iter<'a, ScanResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
