//! Analyzer types, analyzer statuses, and the static tables that relate them
//! to CI report types and project security settings.
//!
//! Every mapping here is a `match` over a closed enum, so adding an analyzer
//! type without wiring it into each table is a compile error.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Stored status values (`analyzer_project_statuses.status`).
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_NOT_CONFIGURED: &str = "not_configured";

/// All valid analyzer status strings.
pub const VALID_STATUSES: &[&str] = &[STATUS_SUCCESS, STATUS_FAILED, STATUS_NOT_CONFIGURED];

/// Build name prefix of the IaC scanner, which reports through `sast`.
pub const IAC_SAST_JOB_PREFIX: &str = "kics-iac-sast";

/// Build name prefix of the advanced SAST scanner, which reports through `sast`.
pub const ADVANCED_SAST_JOB_PREFIX: &str = "gitlab-advanced-sast";

// ---------------------------------------------------------------------------
// AnalyzerType
// ---------------------------------------------------------------------------

/// How the status of an analyzer type is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    /// Derived from completed CI builds.
    Pipeline,
    /// Derived from a boolean project security setting.
    Setting,
    /// Rolled up from a pipeline-based and a setting-based child.
    Aggregated,
}

/// A category of security scanner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerType {
    Sast,
    SastAdvanced,
    SastIac,
    Dast,
    DependencyScanning,
    CoverageFuzzing,
    ApiFuzzing,
    ClusterImageScanning,
    ContainerScanningPipelineBased,
    SecretDetectionPipelineBased,
    ContainerScanningForRegistry,
    SecretDetectionSecretPushProtection,
    ContainerScanning,
    SecretDetection,
}

impl AnalyzerType {
    /// Every analyzer type, in declaration order.
    pub const ALL: [AnalyzerType; 14] = [
        Self::Sast,
        Self::SastAdvanced,
        Self::SastIac,
        Self::Dast,
        Self::DependencyScanning,
        Self::CoverageFuzzing,
        Self::ApiFuzzing,
        Self::ClusterImageScanning,
        Self::ContainerScanningPipelineBased,
        Self::SecretDetectionPipelineBased,
        Self::ContainerScanningForRegistry,
        Self::SecretDetectionSecretPushProtection,
        Self::ContainerScanning,
        Self::SecretDetection,
    ];

    /// The composite types, each rolled up from its children.
    pub const AGGREGATED: [AnalyzerType; 2] = [Self::ContainerScanning, Self::SecretDetection];

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sast => "sast",
            Self::SastAdvanced => "sast_advanced",
            Self::SastIac => "sast_iac",
            Self::Dast => "dast",
            Self::DependencyScanning => "dependency_scanning",
            Self::CoverageFuzzing => "coverage_fuzzing",
            Self::ApiFuzzing => "api_fuzzing",
            Self::ClusterImageScanning => "cluster_image_scanning",
            Self::ContainerScanningPipelineBased => "container_scanning_pipeline_based",
            Self::SecretDetectionPipelineBased => "secret_detection_pipeline_based",
            Self::ContainerScanningForRegistry => "container_scanning_for_registry",
            Self::SecretDetectionSecretPushProtection => "secret_detection_secret_push_protection",
            Self::ContainerScanning => "container_scanning",
            Self::SecretDetection => "secret_detection",
        }
    }

    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid analyzer type '{s}'"))
    }

    pub fn kind(&self) -> AnalyzerKind {
        match self {
            Self::ContainerScanningForRegistry | Self::SecretDetectionSecretPushProtection => {
                AnalyzerKind::Setting
            }
            Self::ContainerScanning | Self::SecretDetection => AnalyzerKind::Aggregated,
            _ => AnalyzerKind::Pipeline,
        }
    }

    pub fn is_pipeline_based(&self) -> bool {
        self.kind() == AnalyzerKind::Pipeline
    }

    /// The children an aggregated type is rolled up from. Empty for
    /// non-aggregated types.
    pub fn aggregated_children(&self) -> &'static [AnalyzerType] {
        match self {
            Self::ContainerScanning => &[
                Self::ContainerScanningPipelineBased,
                Self::ContainerScanningForRegistry,
            ],
            Self::SecretDetection => &[
                Self::SecretDetectionPipelineBased,
                Self::SecretDetectionSecretPushProtection,
            ],
            _ => &[],
        }
    }

    /// The aggregated type this type rolls up into, if any.
    pub fn aggregated_parent(&self) -> Option<AnalyzerType> {
        Self::AGGREGATED
            .into_iter()
            .find(|parent| parent.aggregated_children().contains(self))
    }

    /// The settings-backed source for a settings category.
    ///
    /// Settings categories are named after their aggregated parent
    /// (`secret_detection`, `container_scanning`); the setting-based child
    /// type itself is accepted too. Any other type has no setting source.
    pub fn setting_source(&self) -> Option<SettingSource> {
        match self {
            Self::SecretDetection | Self::SecretDetectionSecretPushProtection => {
                Some(SettingSource {
                    analyzer_type: Self::SecretDetectionSecretPushProtection,
                    field: SecuritySettingField::SecretPushProtectionEnabled,
                })
            }
            Self::ContainerScanning | Self::ContainerScanningForRegistry => Some(SettingSource {
                analyzer_type: Self::ContainerScanningForRegistry,
                field: SecuritySettingField::ContainerScanningForRegistryEnabled,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalyzerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AnalyzerStatus
// ---------------------------------------------------------------------------

/// The status of one analyzer type for one project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerStatus {
    Success,
    Failed,
    NotConfigured,
}

impl AnalyzerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => STATUS_SUCCESS,
            Self::Failed => STATUS_FAILED,
            Self::NotConfigured => STATUS_NOT_CONFIGURED,
        }
    }

    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            STATUS_SUCCESS => Ok(Self::Success),
            STATUS_FAILED => Ok(Self::Failed),
            STATUS_NOT_CONFIGURED => Ok(Self::NotConfigured),
            _ => Err(format!(
                "Invalid analyzer status '{s}'. Must be one of: {}",
                VALID_STATUSES.join(", ")
            )),
        }
    }

    /// Precedence when several sources report on the same analyzer type:
    /// `failed` > `success` > `not_configured`.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Failed => 2,
            Self::Success => 1,
            Self::NotConfigured => 0,
        }
    }

    /// Whether `self` strictly outranks `other`.
    pub fn outranks(&self, other: AnalyzerStatus) -> bool {
        self.priority() > other.priority()
    }

    /// Only `success` and `failed` are tracked by namespace counters.
    pub fn is_counted(&self) -> bool {
        !matches!(self, Self::NotConfigured)
    }
}

impl std::fmt::Display for AnalyzerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CI builds
// ---------------------------------------------------------------------------

/// Status of a CI build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
}

impl BuildStatus {
    /// `success` maps to success, `failed`/`canceled`/`skipped` to failed,
    /// everything else to not configured.
    pub fn analyzer_status(&self) -> AnalyzerStatus {
        match self {
            Self::Success => AnalyzerStatus::Success,
            Self::Failed | Self::Canceled | Self::Skipped => AnalyzerStatus::Failed,
            _ => AnalyzerStatus::NotConfigured,
        }
    }
}

/// A report artifact type declared by a CI build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Sast,
    Dast,
    DependencyScanning,
    ContainerScanning,
    SecretDetection,
    CoverageFuzzing,
    ApiFuzzing,
    ClusterImageScanning,
    /// Any non-security report (junit, coverage, ...).
    #[serde(other)]
    Other,
}

impl ReportType {
    /// The analyzer type a build reporting `self` contributes to.
    ///
    /// `sast` reports are reclassified by build name: the IaC and advanced
    /// SAST scanners publish through the `sast` report but are tracked as
    /// their own analyzer types.
    pub fn analyzer_type(&self, build_name: &str) -> Option<AnalyzerType> {
        match self {
            Self::Sast if build_name.starts_with(IAC_SAST_JOB_PREFIX) => {
                Some(AnalyzerType::SastIac)
            }
            Self::Sast if build_name.starts_with(ADVANCED_SAST_JOB_PREFIX) => {
                Some(AnalyzerType::SastAdvanced)
            }
            Self::Sast => Some(AnalyzerType::Sast),
            Self::Dast => Some(AnalyzerType::Dast),
            Self::DependencyScanning => Some(AnalyzerType::DependencyScanning),
            Self::ContainerScanning => Some(AnalyzerType::ContainerScanningPipelineBased),
            Self::SecretDetection => Some(AnalyzerType::SecretDetectionPipelineBased),
            Self::CoverageFuzzing => Some(AnalyzerType::CoverageFuzzing),
            Self::ApiFuzzing => Some(AnalyzerType::ApiFuzzing),
            Self::ClusterImageScanning => Some(AnalyzerType::ClusterImageScanning),
            Self::Other => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Security settings
// ---------------------------------------------------------------------------

/// Boolean columns of `project_security_settings` that drive setting-based
/// analyzer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecuritySettingField {
    SecretPushProtectionEnabled,
    ContainerScanningForRegistryEnabled,
}

impl SecuritySettingField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::SecretPushProtectionEnabled => "secret_push_protection_enabled",
            Self::ContainerScanningForRegistryEnabled => "container_scanning_for_registry_enabled",
        }
    }
}

/// A setting-based analyzer type together with the field it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingSource {
    pub analyzer_type: AnalyzerType,
    pub field: SecuritySettingField,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
