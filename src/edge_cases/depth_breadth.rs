//! Proficiency depth against topic breadth between the two sides

use super::EdgeCaseFinding;
use crate::config::EdgeCaseConfig;
use crate::processing::skill::SkillSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreadthVerdict {
    Insufficient,
    #[default]
    Comparable,
    Broader,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthBreadth {
    pub source_depth_avg: f32,
    pub target_depth_avg: f32,
    /// Share of skills at each level
    pub source_depth_distribution: BTreeMap<u8, f32>,
    pub target_depth_distribution: BTreeMap<u8, f32>,
    /// Source skill count over target skill count
    pub breadth_ratio: f32,
    pub breadth: BreadthVerdict,
    pub depth_adequate: bool,
    pub focus_areas: Vec<String>,
}

fn distribution(set: &SkillSet) -> BTreeMap<u8, f32> {
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for skill in set.iter() {
        *counts.entry(skill.level.value()).or_default() += 1;
    }
    let total = set.len().max(1) as f32;
    counts
        .into_iter()
        .map(|(level, count)| (level, count as f32 / total))
        .collect()
}

pub fn detect(
    source: &SkillSet,
    target: &SkillSet,
    config: &EdgeCaseConfig,
) -> EdgeCaseFinding<DepthBreadth> {
    let (source_depth_avg, target_depth_avg) = match (source.mean_level(), target.mean_level()) {
        (Some(s), Some(t)) => (s, t),
        _ => return EdgeCaseFinding::not_applicable(),
    };

    let breadth_ratio = source.len() as f32 / target.len() as f32;
    let depth_adequate = source_depth_avg >= target_depth_avg * config.depth_adequacy_ratio;

    let mut remediation = Vec::new();
    let mut focus_areas = Vec::new();
    let mut severity: f32 = 0.0;

    if !depth_adequate {
        remediation.push(format!(
            "Enhance cognitive depth (gap: {:.1} levels)",
            target_depth_avg - source_depth_avg
        ));
        focus_areas.push("Critical analysis and evaluation skills".to_string());
        focus_areas.push("Research methodology".to_string());
        severity = severity.max(1.0 - source_depth_avg / target_depth_avg);
    }

    let breadth = if breadth_ratio < config.insufficient_breadth_ratio {
        remediation.push("Insufficient breadth - additional topics need coverage".to_string());
        focus_areas.push("Broaden skill coverage".to_string());
        severity = severity.max(1.0 - breadth_ratio);
        BreadthVerdict::Insufficient
    } else if breadth_ratio > config.broad_breadth_ratio {
        remediation.push(
            "VET covers broader scope - can focus on depth for uni requirements".to_string(),
        );
        focus_areas.push("Deepen understanding of core concepts".to_string());
        BreadthVerdict::Broader
    } else {
        BreadthVerdict::Comparable
    };

    EdgeCaseFinding::new(
        !depth_adequate || breadth != BreadthVerdict::Comparable,
        severity,
        remediation,
        DepthBreadth {
            source_depth_avg,
            target_depth_avg,
            source_depth_distribution: distribution(source),
            target_depth_distribution: distribution(target),
            breadth_ratio,
            breadth,
            depth_adequate,
            focus_areas,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::{Side, Skill};

    fn set(side: Side, levels: &[i64]) -> SkillSet {
        SkillSet::new(
            "X",
            levels
                .iter()
                .enumerate()
                .map(|(i, level)| Skill::new(format!("skill {}", i), side, "X").with_level(*level))
                .collect(),
        )
    }

    #[test]
    fn test_breadth_boundaries() {
        let config = EdgeCaseConfig::default();
        let target = set(Side::Target, &[4; 10]);

        let at_lower = detect(&set(Side::Source, &[4; 7]), &target, &config);
        assert_eq!(at_lower.details.breadth, BreadthVerdict::Comparable);
        assert!(!at_lower.applicable);

        let below = detect(&set(Side::Source, &[4; 6]), &target, &config);
        assert_eq!(below.details.breadth, BreadthVerdict::Insufficient);
        assert!(below.applicable);
        assert!((below.severity - 0.4).abs() < 1e-6);

        let at_upper = detect(&set(Side::Source, &[4; 15]), &target, &config);
        assert_eq!(at_upper.details.breadth, BreadthVerdict::Comparable);

        let above = detect(&set(Side::Source, &[4; 16]), &target, &config);
        assert_eq!(above.details.breadth, BreadthVerdict::Broader);
        assert!(above.applicable);
        assert_eq!(above.severity, 0.0);
    }

    #[test]
    fn test_depth_adequacy_boundary() {
        let config = EdgeCaseConfig::default();
        let target = set(Side::Target, &[5, 5]);

        let at_boundary = detect(&set(Side::Source, &[4, 4]), &target, &config);
        assert!(at_boundary.details.depth_adequate);

        let below = detect(&set(Side::Source, &[4, 3]), &target, &config);
        assert!(!below.details.depth_adequate);
        assert!(below.applicable);
        assert!(below.remediation[0].contains("gap: 1.5"));
        assert!((below.severity - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_distribution_shares() {
        let config = EdgeCaseConfig::default();
        let finding = detect(
            &set(Side::Source, &[2, 2, 3, 5]),
            &set(Side::Target, &[4, 4, 4]),
            &config,
        );
        let dist = &finding.details.source_depth_distribution;
        assert_eq!(dist.get(&2), Some(&0.5));
        assert_eq!(dist.get(&3), Some(&0.25));
        assert_eq!(finding.details.target_depth_distribution.get(&4), Some(&1.0));
    }

    #[test]
    fn test_empty_side_is_not_applicable() {
        let config = EdgeCaseConfig::default();
        let finding = detect(&SkillSet::default(), &set(Side::Target, &[4]), &config);
        assert!(!finding.applicable);
    }
}
