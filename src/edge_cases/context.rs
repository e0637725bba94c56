//! Theoretical / practical balance between the two sides

use super::EdgeCaseFinding;
use crate::processing::skill::{SkillContext, SkillSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextImbalance {
    pub source_distribution: BTreeMap<SkillContext, f32>,
    pub target_distribution: BTreeMap<SkillContext, f32>,
    /// Mean of the practical and theoretical share differences
    pub imbalance_score: f32,
    pub bridging_requirements: Vec<String>,
}

pub fn detect(
    source: &SkillSet,
    target: &SkillSet,
    gap_threshold: f32,
) -> EdgeCaseFinding<ContextImbalance> {
    if source.is_empty() || target.is_empty() {
        return EdgeCaseFinding::not_applicable();
    }

    let source_ratios = source.context_ratios();
    let target_ratios = target.context_ratios();
    let share = |ratios: &[f32; 3], context: SkillContext| {
        SkillContext::ALL
            .iter()
            .position(|c| *c == context)
            .map(|i| ratios[i])
            .unwrap_or(0.0)
    };

    let practical_diff = (share(&source_ratios, SkillContext::Practical)
        - share(&target_ratios, SkillContext::Practical))
    .abs();
    let theoretical_diff = (share(&source_ratios, SkillContext::Theoretical)
        - share(&target_ratios, SkillContext::Theoretical))
    .abs();
    let imbalance_score = (practical_diff + theoretical_diff) / 2.0;

    let mut bridging_requirements = Vec::new();
    let mut remediation = Vec::new();

    let theory_gap = share(&target_ratios, SkillContext::Theoretical)
        - share(&source_ratios, SkillContext::Theoretical);
    if theory_gap > gap_threshold {
        bridging_requirements.push(format!(
            "Additional theoretical foundation required ({:.1}% gap)",
            theory_gap * 100.0
        ));
        remediation.push("Theory bridging module".to_string());
        remediation.push("Academic writing workshop".to_string());
    }

    let practice_gap = share(&target_ratios, SkillContext::Practical)
        - share(&source_ratios, SkillContext::Practical);
    if practice_gap > gap_threshold {
        bridging_requirements.push(format!(
            "Additional practical experience required ({:.1}% gap)",
            practice_gap * 100.0
        ));
        remediation.push("Laboratory skills workshop".to_string());
        remediation.push("Industry placement".to_string());
    }

    let distribution = |ratios: &[f32; 3]| {
        SkillContext::ALL
            .iter()
            .zip(ratios.iter())
            .map(|(c, r)| (*c, *r))
            .collect::<BTreeMap<_, _>>()
    };

    EdgeCaseFinding::new(
        !bridging_requirements.is_empty(),
        imbalance_score,
        remediation,
        ContextImbalance {
            source_distribution: distribution(&source_ratios),
            target_distribution: distribution(&target_ratios),
            imbalance_score,
            bridging_requirements,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::{Side, Skill};

    fn set(side: Side, contexts: &[SkillContext]) -> SkillSet {
        SkillSet::new(
            "X",
            contexts
                .iter()
                .enumerate()
                .map(|(i, c)| Skill::new(format!("s{}", i), side, "X").with_context(*c))
                .collect(),
        )
    }

    #[test]
    fn test_practical_unit_against_theoretical_course() {
        let source = set(Side::Source, &[SkillContext::Practical; 4]);
        let target = set(Side::Target, &[SkillContext::Theoretical; 4]);
        let finding = detect(&source, &target, 0.3);

        assert!(finding.applicable);
        assert!((finding.details.imbalance_score - 1.0).abs() < 1e-6);
        assert!(finding
            .remediation
            .contains(&"Theory bridging module".to_string()));
        assert_eq!(finding.details.bridging_requirements.len(), 1);
    }

    #[test]
    fn test_balanced_sides_are_not_flagged() {
        let contexts = [SkillContext::Practical, SkillContext::Theoretical];
        let finding = detect(&set(Side::Source, &contexts), &set(Side::Target, &contexts), 0.3);
        assert!(!finding.applicable);
        assert_eq!(finding.details.imbalance_score, 0.0);
    }

    #[test]
    fn test_empty_side_is_not_applicable() {
        let finding = detect(&SkillSet::default(), &set(Side::Target, &[SkillContext::Hybrid]), 0.3);
        assert!(!finding.applicable);
    }
}
