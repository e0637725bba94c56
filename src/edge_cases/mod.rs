//! Rule-based detectors for structural risks in a credit transfer
//!
//! Every detector is independently callable and treats missing optional
//! metadata as "not applicable" rather than an error.

pub mod combination;
pub mod composite;
pub mod context;
pub mod credit_hours;
pub mod depth_breadth;
pub mod outdated;
pub mod prerequisites;
pub mod version;

pub use combination::{CombinationCoverage, UnitCoverage, UnitOverlap};
pub use composite::{CompositeSkills, SkillDecomposition};
pub use context::ContextImbalance;
pub use credit_hours::{CreditHours, HoursVerdict};
pub use depth_breadth::{BreadthVerdict, DepthBreadth};
pub use outdated::{CurrencyIssue, OutdatedContent};
pub use prerequisites::PrerequisiteChain;
pub use version::{VersionMismatch, VersionMismatches};

use crate::config::EdgeCaseConfig;
use crate::processing::skill::{CourseProfile, SkillSet, UnitProfile};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Effort tier for bringing outdated material up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateEffort {
    #[default]
    Low,
    Medium,
    High,
}

impl UpdateEffort {
    pub fn severity(self) -> f32 {
        match self {
            UpdateEffort::Low => 0.33,
            UpdateEffort::Medium => 0.66,
            UpdateEffort::High => 1.0,
        }
    }
}

impl fmt::Display for UpdateEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateEffort::Low => "low",
            UpdateEffort::Medium => "medium",
            UpdateEffort::High => "high",
        };
        write!(f, "{}", label)
    }
}

/// Result of one detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCaseFinding<D> {
    /// Whether the detector found something worth acting on
    pub applicable: bool,
    /// Impact in [0, 1]
    pub severity: f32,
    pub remediation: Vec<String>,
    pub details: D,
}

impl<D: Default> EdgeCaseFinding<D> {
    pub fn not_applicable() -> Self {
        Self {
            applicable: false,
            severity: 0.0,
            remediation: Vec::new(),
            details: D::default(),
        }
    }
}

impl<D> EdgeCaseFinding<D> {
    pub fn new(applicable: bool, severity: f32, remediation: Vec<String>, details: D) -> Self {
        Self {
            applicable,
            severity: severity.clamp(0.0, 1.0),
            remediation,
            details,
        }
    }
}

/// Inputs the scorer reads from the findings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PenaltySignals {
    pub context_imbalance: f32,
    pub currency_issues: bool,
    pub missing_prerequisites: bool,
}

/// All findings for one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCaseReport {
    pub context_imbalance: EdgeCaseFinding<ContextImbalance>,
    pub outdated_content: EdgeCaseFinding<OutdatedContent>,
    pub depth_breadth: EdgeCaseFinding<DepthBreadth>,
    pub composite_skills: EdgeCaseFinding<CompositeSkills>,
    pub prerequisite_chain: EdgeCaseFinding<PrerequisiteChain>,
    pub credit_hours: EdgeCaseFinding<CreditHours>,
    pub version_mismatch: EdgeCaseFinding<VersionMismatches>,
    /// Present only when several source units are combined
    pub combination: Option<EdgeCaseFinding<CombinationCoverage>>,
}

impl EdgeCaseReport {
    pub fn penalty_signals(&self) -> PenaltySignals {
        PenaltySignals {
            context_imbalance: self.context_imbalance.details.imbalance_score,
            currency_issues: !self.outdated_content.details.currency_issues.is_empty(),
            missing_prerequisites: !self
                .prerequisite_chain
                .details
                .missing_prerequisites
                .is_empty(),
        }
    }

    /// Names of the detectors that flagged something
    pub fn flagged(&self) -> Vec<&'static str> {
        let mut flagged = Vec::new();
        if self.context_imbalance.applicable {
            flagged.push("context_imbalance");
        }
        if self.outdated_content.applicable {
            flagged.push("outdated_content");
        }
        if self.depth_breadth.applicable {
            flagged.push("depth_breadth");
        }
        if self.composite_skills.applicable {
            flagged.push("composite_skills");
        }
        if self.prerequisite_chain.applicable {
            flagged.push("prerequisite_chain");
        }
        if self.credit_hours.applicable {
            flagged.push("credit_hours");
        }
        if self.version_mismatch.applicable {
            flagged.push("version_mismatch");
        }
        if self.combination.as_ref().is_some_and(|c| c.applicable) {
            flagged.push("combination");
        }
        flagged
    }
}

/// Runs every detector over the source units and the target course
pub struct EdgeCaseDetector {
    config: EdgeCaseConfig,
}

impl EdgeCaseDetector {
    pub fn new(config: EdgeCaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeCaseConfig {
        &self.config
    }

    pub fn detect_all(&self, units: &[UnitProfile], course: &CourseProfile) -> EdgeCaseReport {
        let source = SkillSet::merged(
            units.iter().map(|u| u.code.as_str()).collect::<Vec<_>>().join("+"),
            units.iter().map(|u| &u.skills),
        );
        let target = &course.skills;

        let report = EdgeCaseReport {
            context_imbalance: context::detect(&source, target, self.config.context_gap_threshold),
            outdated_content: outdated::detect(units),
            depth_breadth: depth_breadth::detect(&source, target, &self.config),
            composite_skills: composite::detect(
                &source,
                target,
                self.config.granularity_ratio,
                self.config.lexical_similarity_threshold,
            ),
            prerequisite_chain: prerequisites::detect(units, course),
            credit_hours: credit_hours::detect(units, course, &self.config),
            version_mismatch: version::detect(&source, target),
            combination: (units.len() > 1).then(|| combination::detect(units, course, &self.config)),
        };

        debug!(
            "Edge case detection for {} -> {}: {:?}",
            source.code,
            course.code,
            report.flagged()
        );
        report
    }
}
