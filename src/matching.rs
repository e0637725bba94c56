//! Level-aware refinement of semantic clusters into scored matches

use crate::clustering::{Cluster, ClusterMember, PointSimilarity};
use crate::config::MatchingConfig;
use crate::processing::embeddings::SimilarityCache;
use crate::processing::levels::LevelCompatibility;
use crate::processing::skill::{Side, Skill, SkillLevel, SkillSet};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchQuality {
    Excellent,
    Good,
    Moderate,
    Weak,
    Poor,
}

/// Levels a split match was restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSplit {
    pub source_level: u8,
    pub target_level: u8,
}

/// Scored association between source and target skills. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub source_indices: Vec<usize>,
    pub target_indices: Vec<usize>,
    pub source_skills: Vec<Skill>,
    pub target_skills: Vec<Skill>,
    pub semantic_similarity: f32,
    pub level_alignment: f32,
    pub combined_score: f32,
    pub match_type: MatchType,
    pub confidence: f32,
    pub quality: MatchQuality,
    pub cluster_id: usize,
    /// Mean target level minus mean source level
    pub level_gap: f32,
    pub split: Option<LevelSplit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub total_matches: usize,
    pub source_coverage: f32,
    pub target_coverage: f32,
    pub avg_semantic_similarity: f32,
    pub avg_level_alignment: f32,
    pub avg_combined_score: f32,
    pub avg_confidence: f32,
    pub quality_distribution: BTreeMap<MatchQuality, usize>,
    pub match_types: BTreeMap<MatchType, usize>,
    pub level_compatible_matches: usize,
    pub level_gap_matches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingResult {
    pub matches: Vec<Match>,
    pub statistics: MatchStatistics,
    pub unmapped_source: Vec<String>,
    pub unmapped_target: Vec<String>,
}

impl MatchType {
    pub fn from_counts(sources: usize, targets: usize) -> Self {
        match (sources, targets) {
            (1, 1) => MatchType::OneToOne,
            (s, 1) if s > 1 => MatchType::ManyToOne,
            (1, t) if t > 1 => MatchType::OneToMany,
            _ => MatchType::ManyToMany,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchType::OneToOne => "one-to-one",
            MatchType::ManyToOne => "many-to-one",
            MatchType::OneToMany => "one-to-many",
            MatchType::ManyToMany => "many-to-many",
        };
        write!(f, "{}", label)
    }
}

impl MatchQuality {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.85 {
            MatchQuality::Excellent
        } else if score >= 0.70 {
            MatchQuality::Good
        } else if score >= 0.55 {
            MatchQuality::Moderate
        } else if score >= 0.40 {
            MatchQuality::Weak
        } else {
            MatchQuality::Poor
        }
    }
}

impl Match {
    pub fn size(&self) -> usize {
        self.source_indices.len() + self.target_indices.len()
    }
}

/// Turns clusters into matches, splitting clusters whose levels disagree
pub struct LevelAwareMatcher {
    config: MatchingConfig,
    levels: LevelCompatibility,
}

impl LevelAwareMatcher {
    pub fn new(config: MatchingConfig, levels: LevelCompatibility) -> Self {
        Self { config, levels }
    }

    /// Refine clusters into matches sorted by combined score, with statistics
    pub fn match_clusters(
        &self,
        clusters: &[Cluster],
        similarity: Option<&PointSimilarity>,
        source: &SkillSet,
        target: &SkillSet,
        cache: Option<&SimilarityCache>,
    ) -> MatchingResult {
        let mut matches = self.refine(clusters, similarity, source, target, cache);
        matches.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let statistics = self.statistics(&matches, source, target);
        let (unmapped_source, unmapped_target) = unmapped(&matches, source, target);
        MatchingResult {
            matches,
            statistics,
            unmapped_source,
            unmapped_target,
        }
    }

    /// One match per cluster when its levels align, otherwise one per compatible level pair
    pub fn refine(
        &self,
        clusters: &[Cluster],
        similarity: Option<&PointSimilarity>,
        source: &SkillSet,
        target: &SkillSet,
        cache: Option<&SimilarityCache>,
    ) -> Vec<Match> {
        let mut matches = Vec::new();

        for cluster in clusters {
            let sources = cluster.members_on(Side::Source);
            let targets = cluster.members_on(Side::Target);
            if sources.is_empty() || targets.is_empty() {
                continue;
            }

            let source_levels: Vec<SkillLevel> =
                sources.iter().map(|m| source.skills[m.index].level).collect();
            let target_levels: Vec<SkillLevel> =
                targets.iter().map(|m| target.skills[m.index].level).collect();
            let alignment = self.level_alignment(&source_levels, &target_levels);

            if alignment >= self.config.accept_level_alignment {
                matches.push(self.build_match(
                    cluster.id,
                    &sources,
                    &targets,
                    cluster.cross_similarity,
                    alignment,
                    None,
                    source,
                    target,
                ));
                continue;
            }

            debug!(
                "Splitting cluster {} by level (alignment {:.3})",
                cluster.id, alignment
            );
            let by_source_level = group_by_level(&sources, source);
            let by_target_level = group_by_level(&targets, target);
            for (source_level, source_group) in &by_source_level {
                for (target_level, target_group) in &by_target_level {
                    let compatibility = self.levels.get(*source_level, *target_level);
                    if compatibility < self.config.split_level_compatibility {
                        continue;
                    }
                    let semantic = match similarity {
                        Some(sim) => sim.mean_cross(
                            &points(source_group),
                            &points(target_group),
                            cache,
                        ),
                        None => cluster.cross_similarity,
                    };
                    matches.push(self.build_match(
                        cluster.id,
                        source_group,
                        target_group,
                        semantic,
                        compatibility,
                        Some(LevelSplit {
                            source_level: source_level.value(),
                            target_level: target_level.value(),
                        }),
                        source,
                        target,
                    ));
                }
            }
        }

        matches
    }

    /// Proportion-weighted compatibility between two level populations
    pub fn level_alignment(&self, source: &[SkillLevel], target: &[SkillLevel]) -> f32 {
        let source_dist = distribution(source);
        let target_dist = distribution(target);

        let mut total = 0.0f32;
        let mut weight = 0.0f32;
        for (s, p) in &source_dist {
            for (t, q) in &target_dist {
                let w = p * q;
                total += self.levels.get(*s, *t) * w;
                weight += w;
            }
        }
        if weight > 0.0 {
            total / weight
        } else {
            0.0
        }
    }

    pub fn combined_score(&self, semantic: f32, level: f32) -> f32 {
        (1.0 - self.config.level_weight) * semantic + self.config.level_weight * level
    }

    /// Quality-weighted confidence, shrinking slowly as the match grows
    pub fn match_confidence(semantic: f32, level: f32, size: usize) -> f32 {
        let base = semantic * 0.6 + level * 0.4;
        let size_factor = 1.0 / (1.0 + (size.max(1) as f32).ln());
        (base * (0.7 + 0.3 * size_factor)).clamp(0.0, 1.0)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_match(
        &self,
        cluster_id: usize,
        sources: &[ClusterMember],
        targets: &[ClusterMember],
        semantic: f32,
        alignment: f32,
        split: Option<LevelSplit>,
        source: &SkillSet,
        target: &SkillSet,
    ) -> Match {
        let semantic = semantic.clamp(0.0, 1.0);
        let source_skills: Vec<Skill> = sources
            .iter()
            .map(|m| source.skills[m.index].clone())
            .collect();
        let target_skills: Vec<Skill> = targets
            .iter()
            .map(|m| target.skills[m.index].clone())
            .collect();
        let combined = self.combined_score(semantic, alignment);

        Match {
            source_indices: sources.iter().map(|m| m.index).collect(),
            target_indices: targets.iter().map(|m| m.index).collect(),
            level_gap: mean_level(&target_skills) - mean_level(&source_skills),
            source_skills,
            target_skills,
            semantic_similarity: semantic,
            level_alignment: alignment,
            combined_score: combined,
            match_type: MatchType::from_counts(sources.len(), targets.len()),
            confidence: Self::match_confidence(semantic, alignment, sources.len() + targets.len()),
            quality: MatchQuality::from_score(combined),
            cluster_id,
            split,
        }
    }

    pub fn statistics(&self, matches: &[Match], source: &SkillSet, target: &SkillSet) -> MatchStatistics {
        if matches.is_empty() {
            return MatchStatistics::default();
        }

        let count = matches.len() as f32;
        let mean = |f: fn(&Match) -> f32| matches.iter().map(f).sum::<f32>() / count;

        let matched_source: BTreeSet<usize> = matches
            .iter()
            .flat_map(|m| m.source_indices.iter().copied())
            .collect();
        let matched_target: BTreeSet<usize> = matches
            .iter()
            .flat_map(|m| m.target_indices.iter().copied())
            .collect();

        let mut quality_distribution = BTreeMap::new();
        let mut match_types = BTreeMap::new();
        for m in matches {
            *quality_distribution.entry(m.quality).or_insert(0) += 1;
            *match_types.entry(m.match_type).or_insert(0) += 1;
        }

        let threshold = self.config.accept_level_alignment;
        MatchStatistics {
            total_matches: matches.len(),
            source_coverage: ratio(matched_source.len(), source.len()),
            target_coverage: ratio(matched_target.len(), target.len()),
            avg_semantic_similarity: mean(|m| m.semantic_similarity),
            avg_level_alignment: mean(|m| m.level_alignment),
            avg_combined_score: mean(|m| m.combined_score),
            avg_confidence: mean(|m| m.confidence),
            quality_distribution,
            match_types,
            level_compatible_matches: matches
                .iter()
                .filter(|m| m.level_alignment >= threshold)
                .count(),
            level_gap_matches: matches
                .iter()
                .filter(|m| m.level_alignment < threshold)
                .count(),
        }
    }
}

fn group_by_level(
    members: &[ClusterMember],
    set: &SkillSet,
) -> BTreeMap<SkillLevel, Vec<ClusterMember>> {
    let mut groups: BTreeMap<SkillLevel, Vec<ClusterMember>> = BTreeMap::new();
    for member in members {
        groups
            .entry(set.skills[member.index].level)
            .or_default()
            .push(*member);
    }
    groups
}

fn points(members: &[ClusterMember]) -> Vec<usize> {
    members.iter().map(|m| m.point).collect()
}

fn distribution(levels: &[SkillLevel]) -> BTreeMap<SkillLevel, f32> {
    let mut counts: BTreeMap<SkillLevel, f32> = BTreeMap::new();
    for level in levels {
        *counts.entry(*level).or_insert(0.0) += 1.0;
    }
    let total = levels.len().max(1) as f32;
    counts.values_mut().for_each(|c| *c /= total);
    counts
}

fn mean_level(skills: &[Skill]) -> f32 {
    if skills.is_empty() {
        return 0.0;
    }
    skills.iter().map(|s| s.level.value() as f32).sum::<f32>() / skills.len() as f32
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

fn unmapped(matches: &[Match], source: &SkillSet, target: &SkillSet) -> (Vec<String>, Vec<String>) {
    let matched_source: BTreeSet<usize> = matches
        .iter()
        .flat_map(|m| m.source_indices.iter().copied())
        .collect();
    let matched_target: BTreeSet<usize> = matches
        .iter()
        .flat_map(|m| m.target_indices.iter().copied())
        .collect();

    let names = |set: &SkillSet, matched: &BTreeSet<usize>| {
        set.iter()
            .enumerate()
            .filter(|(i, _)| !matched.contains(i))
            .map(|(_, s)| s.name.clone())
            .collect::<Vec<_>>()
    };
    (names(source, &matched_source), names(target, &matched_target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::Skill;

    fn matcher() -> LevelAwareMatcher {
        LevelAwareMatcher::new(MatchingConfig::default(), LevelCompatibility::new())
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

    fn cluster(sources: usize, targets: usize, cross: f32) -> Cluster {
        let mut members: Vec<ClusterMember> = (0..sources)
            .map(|i| ClusterMember {
                side: Side::Source,
                index: i,
                point: i,
            })
            .collect();
        members.extend((0..targets).map(|i| ClusterMember {
            side: Side::Target,
            index: i,
            point: sources + i,
        }));
        Cluster {
            id: 0,
            members,
            mean_similarity: cross,
            cross_similarity: cross,
        }
    }

    #[test]
    fn test_aligned_cluster_becomes_one_match() {
        let source = set(Side::Source, &[3, 3]);
        let target = set(Side::Target, &[4]);
        let result = matcher().match_clusters(&[cluster(2, 1, 0.9)], None, &source, &target, None);

        assert_eq!(result.matches.len(), 1);
        let m = &result.matches[0];
        assert_eq!(m.match_type, MatchType::ManyToOne);
        assert!((m.level_alignment - 0.8).abs() < 1e-6);
        assert!((m.combined_score - (0.7 * 0.9 + 0.3 * 0.8)).abs() < 1e-6);
        assert!(m.split.is_none());
        assert!((m.level_gap - 1.0).abs() < 1e-6);
        assert_eq!(result.statistics.target_coverage, 1.0);
    }

    #[test]
    fn test_misaligned_cluster_is_split_by_level() {
        // Source levels 1 and 6, target level 7: alignment (0.0 + 0.8) / 2 = 0.4 < 0.5
        let source = set(Side::Source, &[1, 6]);
        let target = set(Side::Target, &[7]);
        let result = matcher().match_clusters(&[cluster(2, 1, 0.8)], None, &source, &target, None);

        assert_eq!(result.matches.len(), 1);
        let m = &result.matches[0];
        assert_eq!(
            m.split,
            Some(LevelSplit {
                source_level: 6,
                target_level: 7
            })
        );
        assert_eq!(m.source_indices, vec![1]);
        assert_eq!(m.match_type, MatchType::OneToOne);
        assert_eq!(result.unmapped_source, vec!["skill 0".to_string()]);
    }

    #[test]
    fn test_incompatible_levels_produce_no_match() {
        let source = set(Side::Source, &[1]);
        let target = set(Side::Target, &[7]);
        let result = matcher().match_clusters(&[cluster(1, 1, 0.95)], None, &source, &target, None);
        assert!(result.matches.is_empty());
        assert_eq!(result.statistics, MatchStatistics::default());
    }

    #[test]
    fn test_match_confidence_and_quality_bands() {
        let c = LevelAwareMatcher::match_confidence(1.0, 1.0, 1);
        assert!((c - 1.0).abs() < 1e-6);
        assert!(LevelAwareMatcher::match_confidence(1.0, 1.0, 10) < c);
        assert_eq!(MatchQuality::from_score(0.86), MatchQuality::Excellent);
        assert_eq!(MatchQuality::from_score(0.7), MatchQuality::Good);
        assert_eq!(MatchQuality::from_score(0.39), MatchQuality::Poor);
    }

    #[test]
    fn test_match_type_from_counts() {
        assert_eq!(MatchType::from_counts(1, 3), MatchType::OneToMany);
        assert_eq!(MatchType::from_counts(2, 2), MatchType::ManyToMany);
    }
}
