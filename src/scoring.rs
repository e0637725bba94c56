//! Unified alignment scoring
//!
//! Five weighted components give a base score; triggered penalties then scale
//! it down multiplicatively so the result never goes negative.

use crate::config::ScoringConfig;
use crate::edge_cases::PenaltySignals;
use crate::matching::Match;
use crate::processing::levels::LevelCompatibility;
use crate::processing::skill::{SkillContext, SkillSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Similarity bands for coverage: (minimum similarity, weight)
const COVERAGE_BANDS: [(f32, f32); 4] = [(0.90, 1.0), (0.75, 0.85), (0.60, 0.60), (0.45, 0.30)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    ContextImbalance,
    OutdatedContent,
    MissingPrerequisites,
    MajorLevelGap,
    MinorLevelGap,
    ExcessiveSizeMismatch,
}

impl Penalty {
    pub fn key(self) -> &'static str {
        match self {
            Penalty::ContextImbalance => "context_imbalance",
            Penalty::OutdatedContent => "outdated_content",
            Penalty::MissingPrerequisites => "missing_prerequisites",
            Penalty::MajorLevelGap => "major_level_gap",
            Penalty::MinorLevelGap => "minor_level_gap",
            Penalty::ExcessiveSizeMismatch => "excessive_size_mismatch",
        }
    }
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One value per scoring component
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub coverage: f32,
    pub quality: f32,
    pub level: f32,
    pub context: f32,
    pub confidence: f32,
}

impl Components {
    pub fn sum(&self) -> f32 {
        self.coverage + self.quality + self.level + self.context + self.confidence
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentScore {
    /// Raw component scores, each in [0, 1]
    pub components: Components,
    /// Components multiplied by their weights
    pub weighted: Components,
    pub base_score: f32,
    pub penalties: BTreeMap<Penalty, f32>,
    pub total_penalty: f32,
    pub final_score: f32,
}

impl AlignmentScore {
    pub fn has_penalty(&self, penalty: Penalty) -> bool {
        self.penalties.contains_key(&penalty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditRecommendation {
    Full,
    Conditional,
    Partial,
    None,
}

impl CreditRecommendation {
    pub fn from_score(final_score: f32, missing_prerequisites: bool) -> Self {
        if final_score >= 0.8 && !missing_prerequisites {
            CreditRecommendation::Full
        } else if final_score >= 0.7 {
            CreditRecommendation::Conditional
        } else if final_score >= 0.5 {
            CreditRecommendation::Partial
        } else {
            CreditRecommendation::None
        }
    }
}

impl fmt::Display for CreditRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CreditRecommendation::Full => "full",
            CreditRecommendation::Conditional => "conditional",
            CreditRecommendation::Partial => "partial",
            CreditRecommendation::None => "none",
        };
        write!(f, "{}", label)
    }
}

pub struct UnifiedScorer {
    config: ScoringConfig,
    levels: LevelCompatibility,
}

impl UnifiedScorer {
    pub fn new(config: ScoringConfig, levels: LevelCompatibility) -> Self {
        Self { config, levels }
    }

    pub fn score(
        &self,
        matches: &[Match],
        source: &SkillSet,
        target: &SkillSet,
        signals: Option<&PenaltySignals>,
    ) -> AlignmentScore {
        let components = Components {
            coverage: coverage(matches, target),
            quality: quality(matches),
            level: self.level_alignment(source, target),
            context: context_alignment(source, target),
            confidence: matched_confidence(matches),
        };

        let weights = &self.config.weights;
        let weighted = Components {
            coverage: components.coverage * weights.coverage,
            quality: components.quality * weights.quality,
            level: components.level * weights.level,
            context: components.context * weights.context,
            confidence: components.confidence * weights.confidence,
        };
        let base_score = weighted.sum().clamp(0.0, 1.0);

        let penalties = self.penalties(source, target, signals);
        let total_penalty: f32 = penalties.values().sum();
        let final_score = (base_score * (1.0 - total_penalty)).clamp(0.0, 1.0);

        AlignmentScore {
            components,
            weighted,
            base_score,
            penalties,
            total_penalty,
            final_score,
        }
    }

    /// Matrix lookup for the rounded mean levels of each side
    pub fn level_alignment(&self, source: &SkillSet, target: &SkillSet) -> f32 {
        match (source.mean_level(), target.mean_level()) {
            (Some(s), Some(t)) => self.levels.for_means(s, t),
            _ => 0.0,
        }
    }

    pub fn penalties(
        &self,
        source: &SkillSet,
        target: &SkillSet,
        signals: Option<&PenaltySignals>,
    ) -> BTreeMap<Penalty, f32> {
        let magnitudes = &self.config.penalties;
        let mut penalties = BTreeMap::new();

        if let Some(signals) = signals {
            if signals.context_imbalance >= self.config.context_imbalance_trigger {
                penalties.insert(Penalty::ContextImbalance, magnitudes.context_imbalance);
            }
            if signals.currency_issues {
                penalties.insert(Penalty::OutdatedContent, magnitudes.outdated_content);
            }
            if signals.missing_prerequisites {
                penalties.insert(Penalty::MissingPrerequisites, magnitudes.missing_prerequisites);
            }
        }

        if let (Some(s), Some(t)) = (source.mean_level(), target.mean_level()) {
            let gap = (t - s).abs();
            if gap >= self.config.major_level_gap {
                penalties.insert(Penalty::MajorLevelGap, magnitudes.major_level_gap);
            } else if gap >= self.config.minor_level_gap {
                penalties.insert(Penalty::MinorLevelGap, magnitudes.minor_level_gap);
            }
        }

        let size_ratio = source.len() as f32 / target.len().max(1) as f32;
        if size_ratio > self.config.max_size_ratio || size_ratio < self.config.min_size_ratio {
            penalties.insert(
                Penalty::ExcessiveSizeMismatch,
                magnitudes.excessive_size_mismatch,
            );
        }

        penalties
    }
}

pub fn coverage_weight(similarity: f32) -> f32 {
    COVERAGE_BANDS
        .iter()
        .find(|(min, _)| similarity >= *min)
        .map(|(_, weight)| *weight)
        .unwrap_or(0.0)
}

/// Mean over target skills of the best band weight among matches containing them
fn coverage(matches: &[Match], target: &SkillSet) -> f32 {
    if target.is_empty() {
        return 0.0;
    }
    let mut best = vec![0.0f32; target.len()];
    for m in matches {
        let weight = coverage_weight(m.semantic_similarity);
        for &idx in &m.target_indices {
            if let Some(slot) = best.get_mut(idx) {
                *slot = slot.max(weight);
            }
        }
    }
    best.iter().sum::<f32>() / target.len() as f32
}

fn quality(matches: &[Match]) -> f32 {
    if matches.is_empty() {
        return 0.0;
    }
    matches
        .iter()
        .map(|m| 0.7 * m.semantic_similarity + 0.3 * m.level_alignment)
        .sum::<f32>()
        / matches.len() as f32
}

/// Mean over the three contexts of 1 - |source share - target share|
fn context_alignment(source: &SkillSet, target: &SkillSet) -> f32 {
    if source.is_empty() || target.is_empty() {
        return 0.0;
    }
    let s = source.context_ratios();
    let t = target.context_ratios();
    (0..SkillContext::ALL.len())
        .map(|i| 1.0 - (s[i] - t[i]).abs())
        .sum::<f32>()
        / SkillContext::ALL.len() as f32
}

/// Mean extraction confidence over the distinct skills that appear in a match
fn matched_confidence(matches: &[Match]) -> f32 {
    let mut source_seen = BTreeSet::new();
    let mut target_seen = BTreeSet::new();
    let mut total = 0.0f32;
    let mut count = 0usize;

    for m in matches {
        for (idx, skill) in m.source_indices.iter().zip(&m.source_skills) {
            if source_seen.insert(*idx) {
                total += skill.confidence;
                count += 1;
            }
        }
        for (idx, skill) in m.target_indices.iter().zip(&m.target_skills) {
            if target_seen.insert(*idx) {
                total += skill.confidence;
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        total / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatchQuality, MatchType};
    use crate::processing::skill::{Side, Skill};

    fn scorer() -> UnifiedScorer {
        UnifiedScorer::new(ScoringConfig::default(), LevelCompatibility::new())
    }

    fn set(side: Side, levels: &[i64]) -> SkillSet {
        SkillSet::new(
            "X",
            levels
                .iter()
                .enumerate()
                .map(|(i, l)| Skill::new(format!("skill {}", i), side, "X").with_level(*l))
                .collect(),
        )
    }

    fn one_to_one(source: &SkillSet, target: &SkillSet, i: usize, sim: f32) -> Match {
        Match {
            source_indices: vec![i],
            target_indices: vec![i],
            source_skills: vec![source.skills[i].clone()],
            target_skills: vec![target.skills[i].clone()],
            semantic_similarity: sim,
            level_alignment: 1.0,
            combined_score: 0.7 * sim + 0.3,
            match_type: MatchType::OneToOne,
            confidence: 1.0,
            quality: MatchQuality::from_score(0.7 * sim + 0.3),
            cluster_id: i,
            level_gap: 0.0,
            split: None,
        }
    }

    #[test]
    fn test_perfect_alignment_scores_one() {
        let source = set(Side::Source, &[3, 3, 3]);
        let target = set(Side::Target, &[3, 3, 3]);
        let matches: Vec<Match> = (0..3).map(|i| one_to_one(&source, &target, i, 1.0)).collect();

        let score = scorer().score(&matches, &source, &target, None);
        assert!((score.final_score - 1.0).abs() < 1e-5);
        assert!(score.penalties.is_empty());
        assert!((score.weighted.coverage - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_bands() {
        assert_eq!(coverage_weight(0.95), 1.0);
        assert_eq!(coverage_weight(0.8), 0.85);
        assert_eq!(coverage_weight(0.6), 0.6);
        assert_eq!(coverage_weight(0.5), 0.3);
        assert_eq!(coverage_weight(0.2), 0.0);
    }

    #[test]
    fn test_unmatched_targets_lower_coverage() {
        let source = set(Side::Source, &[3, 3]);
        let target = set(Side::Target, &[3, 3]);
        let matches = vec![one_to_one(&source, &target, 0, 0.8)];
        let score = scorer().score(&matches, &source, &target, None);
        assert!((score.components.coverage - 0.425).abs() < 1e-6);
    }

    #[test]
    fn test_missing_prerequisites_reduce_final_score() {
        let source = set(Side::Source, &[3]);
        let target = set(Side::Target, &[3]);
        let matches = vec![one_to_one(&source, &target, 0, 1.0)];
        let signals = PenaltySignals {
            missing_prerequisites: true,
            ..Default::default()
        };
        let score = scorer().score(&matches, &source, &target, Some(&signals));
        assert!(score.has_penalty(Penalty::MissingPrerequisites));
        assert!(score.final_score < score.base_score);
        assert!((score.final_score - score.base_score * 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_level_gap_penalties() {
        let major = scorer().penalties(&set(Side::Source, &[2]), &set(Side::Target, &[6]), None);
        assert_eq!(major.get(&Penalty::MajorLevelGap), Some(&0.20));
        assert!(!major.contains_key(&Penalty::MinorLevelGap));

        let minor = scorer().penalties(&set(Side::Source, &[3]), &set(Side::Target, &[4]), None);
        assert_eq!(minor.get(&Penalty::MinorLevelGap), Some(&0.05));
    }

    #[test]
    fn test_size_mismatch_penalty() {
        let penalties = scorer().penalties(
            &set(Side::Source, &[3, 3, 3, 3, 3, 3]),
            &set(Side::Target, &[3, 3]),
            None,
        );
        assert!(penalties.contains_key(&Penalty::ExcessiveSizeMismatch));
    }

    #[test]
    fn test_penalties_cannot_push_score_negative() {
        let source = set(Side::Source, &[1]);
        let target = set(Side::Target, &[7, 7, 7]);
        let signals = PenaltySignals {
            context_imbalance: 0.9,
            currency_issues: true,
            missing_prerequisites: true,
        };
        let score = scorer().score(&[], &source, &target, Some(&signals));
        // Every penalty fires: 0.15 + 0.25 + 0.30 + 0.20 + 0.10
        assert_eq!(score.penalties.len(), 5);
        assert!(score.total_penalty >= 0.99);
        assert!(score.final_score >= 0.0 && score.final_score < 1e-5);
    }

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(CreditRecommendation::from_score(0.85, false), CreditRecommendation::Full);
        assert_eq!(
            CreditRecommendation::from_score(0.85, true),
            CreditRecommendation::Conditional
        );
        assert_eq!(CreditRecommendation::from_score(0.6, false), CreditRecommendation::Partial);
        assert_eq!(CreditRecommendation::from_score(0.1, false), CreditRecommendation::None);
    }
}
