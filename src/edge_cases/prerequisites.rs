//! Coverage of the course's declared prerequisites by the source units

use super::EdgeCaseFinding;
use crate::processing::skill::{CourseProfile, UnitProfile};
use crate::processing::text::SkillTextProcessor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strsim::jaro_winkler;

/// Skill names this close to a prerequisite count as covering it
const FUZZY_THRESHOLD: f64 = 0.92;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrerequisiteChain {
    pub missing_prerequisites: Vec<String>,
    /// Prerequisite -> code of the first unit covering it
    pub covered_by: BTreeMap<String, String>,
    pub dependency_gaps: Vec<String>,
}

fn unit_covers(unit: &UnitProfile, prerequisite: &str) -> bool {
    let text = SkillTextProcessor::shared();
    let needle = prerequisite.trim().to_lowercase();

    text.contains_phrase(&unit.name, &needle)
        || unit
            .description
            .as_deref()
            .is_some_and(|d| text.contains_phrase(d, &needle))
        || unit.skills.iter().any(|s| {
            let name = s.name.to_lowercase();
            name.contains(&needle) || jaro_winkler(&name, &needle) >= FUZZY_THRESHOLD
        })
}

pub fn detect(units: &[UnitProfile], course: &CourseProfile) -> EdgeCaseFinding<PrerequisiteChain> {
    let prerequisites: Vec<&String> = course
        .prerequisites
        .iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
    if prerequisites.is_empty() {
        return EdgeCaseFinding::not_applicable();
    }

    let mut details = PrerequisiteChain::default();
    for prerequisite in &prerequisites {
        match units.iter().find(|u| unit_covers(u, prerequisite)) {
            Some(unit) => {
                details
                    .covered_by
                    .insert(prerequisite.to_string(), unit.code.clone());
            }
            None => {
                details.missing_prerequisites.push(prerequisite.to_string());
                details
                    .dependency_gaps
                    .push(format!("Prerequisite '{}' not covered", prerequisite));
            }
        }
    }

    let remediation = if details.missing_prerequisites.is_empty() {
        Vec::new()
    } else {
        vec![
            "1. Complete bridging modules for prerequisites".to_string(),
            "2. Review VET unit content".to_string(),
            "3. Proceed with credit transfer assessment".to_string(),
        ]
    };

    let severity = details.missing_prerequisites.len() as f32 / prerequisites.len() as f32;
    EdgeCaseFinding::new(
        !details.missing_prerequisites.is_empty(),
        severity,
        remediation,
        details,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::{Side, Skill, SkillSet};

    fn unit() -> UnitProfile {
        UnitProfile {
            code: "ICTPRG302".to_string(),
            name: "Apply introductory programming techniques".to_string(),
            description: Some("Covers variables, control flow and basic algorithms".to_string()),
            nominal_hours: Some(80),
            prerequisites: Vec::new(),
            skills: SkillSet::new(
                "ICTPRG302",
                vec![Skill::new("Object oriented programing", Side::Source, "ICTPRG302")],
            ),
        }
    }

    fn course(prerequisites: &[&str]) -> CourseProfile {
        CourseProfile {
            code: "COMP2000".to_string(),
            name: "Data structures".to_string(),
            description: None,
            credit_points: Some(6),
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            skills: SkillSet::default(),
        }
    }

    #[test]
    fn test_prerequisites_covered_by_text_and_skills() {
        let finding = detect(
            &[unit()],
            &course(&["Basic algorithms", "Object oriented programming"]),
        );
        assert!(!finding.applicable);
        assert_eq!(finding.details.covered_by.len(), 2);
        assert_eq!(finding.severity, 0.0);
    }

    #[test]
    fn test_missing_prerequisite_is_listed() {
        let finding = detect(&[unit()], &course(&["Discrete mathematics", "control flow"]));
        assert!(finding.applicable);
        assert_eq!(finding.details.missing_prerequisites, vec!["Discrete mathematics"]);
        assert!((finding.severity - 0.5).abs() < 1e-6);
        assert_eq!(finding.remediation.len(), 3);
    }

    #[test]
    fn test_no_prerequisites_is_not_applicable() {
        let finding = detect(&[unit()], &course(&[]));
        assert!(!finding.applicable);
        assert!(finding.details.missing_prerequisites.is_empty());
    }
}
