//! Composite skill detection and granularity comparison

use super::EdgeCaseFinding;
use crate::processing::skill::SkillSet;
use crate::processing::text::SkillTextProcessor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const COMPOSITE_INDICATORS: [&str; 7] = [
    "management",
    "development",
    "analysis",
    "design",
    "maintenance",
    "administration",
    "engineering",
];

/// Longest name (in words) still treated as a broad composite
const MAX_COMPOSITE_WORDS: usize = 3;

const DECOMPOSITIONS: [(&str, [&str; 4]); 5] = [
    ("project management", ["planning", "execution", "monitoring", "closure"]),
    ("software development", ["design", "coding", "testing", "deployment"]),
    ("data analysis", ["collection", "processing", "visualization", "interpretation"]),
    ("system administration", ["configuration", "monitoring", "maintenance", "security"]),
    ("web development", ["frontend", "backend", "database", "deployment"]),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillDecomposition {
    pub skill: String,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeSkills {
    pub composite_skills: Vec<SkillDecomposition>,
    /// Share of target skills only reachable through decomposed components
    pub coverage_improvement: f32,
    pub source_avg_words: f32,
    pub target_avg_words: f32,
    pub granularity_mismatch: bool,
}

/// Split a broad skill into finer components, keeping any qualifier
pub fn decompose(name: &str) -> Vec<String> {
    let lowered = name.to_lowercase();
    for (composite, components) in DECOMPOSITIONS {
        if lowered.contains(composite) {
            let qualifier = lowered.replace(composite, "");
            let qualifier = qualifier.trim();
            return components
                .iter()
                .map(|c| {
                    if qualifier.is_empty() {
                        c.to_string()
                    } else {
                        format!("{} {}", c, qualifier)
                    }
                })
                .collect();
        }
    }
    vec![name.to_string()]
}

pub fn is_composite(name: &str) -> bool {
    let text = SkillTextProcessor::shared();
    let words = text.words(name);
    words.len() <= MAX_COMPOSITE_WORDS
        && words
            .iter()
            .any(|w| COMPOSITE_INDICATORS.contains(&w.as_str()))
}

pub fn detect(
    source: &SkillSet,
    target: &SkillSet,
    granularity_ratio: f32,
    lexical_threshold: f32,
) -> EdgeCaseFinding<CompositeSkills> {
    if source.is_empty() || target.is_empty() {
        return EdgeCaseFinding::not_applicable();
    }
    let text = SkillTextProcessor::shared();

    let composite_skills: Vec<SkillDecomposition> = source
        .iter()
        .filter(|s| is_composite(&s.name))
        .map(|s| SkillDecomposition {
            skill: s.name.clone(),
            components: decompose(&s.name),
        })
        .collect();

    let covered_directly: BTreeSet<usize> = target
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            source
                .iter()
                .any(|s| text.lexically_matches(&s.name, &t.name, lexical_threshold))
        })
        .map(|(i, _)| i)
        .collect();
    let newly_covered = target
        .iter()
        .enumerate()
        .filter(|(i, _)| !covered_directly.contains(i))
        .filter(|(_, t)| {
            composite_skills.iter().any(|d| {
                d.components
                    .iter()
                    .any(|c| text.lexically_matches(c, &t.name, lexical_threshold))
            })
        })
        .count();
    let coverage_improvement = newly_covered as f32 / target.len() as f32;

    let avg_words = |set: &SkillSet| {
        set.iter().map(|s| text.word_count(&s.name)).sum::<usize>() as f32 / set.len() as f32
    };
    let source_avg_words = avg_words(source);
    let target_avg_words = avg_words(target);
    let granularity_mismatch = source_avg_words > 0.0 && target_avg_words > 0.0 && {
        let ratio = source_avg_words / target_avg_words;
        ratio > granularity_ratio || ratio < 1.0 / granularity_ratio
    };

    let mut remediation = Vec::new();
    if coverage_improvement > 0.0 {
        remediation.push(format!(
            "Map decomposed components of {} composite skill(s) individually ({:.0}% more target coverage)",
            composite_skills.len(),
            coverage_improvement * 100.0
        ));
    }
    if granularity_mismatch {
        remediation.push(
            "Normalise skill granularity before mapping (average skill name lengths differ)"
                .to_string(),
        );
    }

    let severity = coverage_improvement.max(if granularity_mismatch { 0.5 } else { 0.0 });
    EdgeCaseFinding::new(
        coverage_improvement > 0.0 || granularity_mismatch,
        severity,
        remediation,
        CompositeSkills {
            composite_skills,
            coverage_improvement,
            source_avg_words,
            target_avg_words,
            granularity_mismatch,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::{Side, Skill};

    fn set(side: Side, names: &[&str]) -> SkillSet {
        SkillSet::new("X", names.iter().map(|n| Skill::new(*n, side, "X")).collect())
    }

    #[test]
    fn test_decompose_keeps_qualifier() {
        assert_eq!(
            decompose("Agile project management"),
            vec![
                "planning agile",
                "execution agile",
                "monitoring agile",
                "closure agile"
            ]
        );
        assert_eq!(decompose("Welding"), vec!["Welding"]);
    }

    #[test]
    fn test_composite_detection_limits_word_count() {
        assert!(is_composite("Project management"));
        assert!(!is_composite("Management of large distributed engineering teams"));
        assert!(!is_composite("Customer service"));
    }

    #[test]
    fn test_decomposition_improves_coverage() {
        let source = set(Side::Source, &["Software development"]);
        let target = set(Side::Target, &["Unit testing", "Coding", "Ethics"]);
        let finding = detect(&source, &target, 1.5, 0.7);

        assert!(finding.applicable);
        assert_eq!(finding.details.composite_skills.len(), 1);
        // "coding" and "testing" are reachable only through the components
        assert!((finding.details.coverage_improvement - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_granularity_mismatch() {
        let source = set(Side::Source, &["Configure small office network routers safely"]);
        let target = set(Side::Target, &["Networking"]);
        let finding = detect(&source, &target, 1.5, 0.7);
        assert!(finding.details.granularity_mismatch);
        assert!(finding.applicable);
    }
}
