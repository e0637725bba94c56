//! Coverage when several source units are combined against one course

use super::EdgeCaseFinding;
use crate::config::EdgeCaseConfig;
use crate::processing::skill::{CourseProfile, Skill, UnitProfile};
use crate::processing::text::SkillTextProcessor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Each additional unit in the greedy pass counts for a little less
const DIMINISHING_RETURN: f32 = 0.2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitCoverage {
    pub unit: String,
    pub coverage: f32,
    pub skill_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitOverlap {
    pub first: String,
    pub second: String,
    pub shared_skills: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinationCoverage {
    pub coverage_by_unit: Vec<UnitCoverage>,
    pub pairwise_overlap: Vec<UnitOverlap>,
    /// 1 - unique / total skill names across units
    pub overlap_ratio: f32,
    /// Greedy smallest set reaching the coverage threshold
    pub minimum_combination: Vec<String>,
    /// Exhaustive best combination up to the size limit
    pub best_combination: Vec<String>,
    pub best_combination_coverage: f32,
    pub total_coverage: f32,
    pub recommendation: String,
}

/// Share of target skills lexically covered by any source skill
pub fn lexical_coverage<'a, S, T>(source: S, target: T, threshold: f32) -> f32
where
    S: IntoIterator<Item = &'a Skill> + Clone,
    T: IntoIterator<Item = &'a Skill>,
{
    let text = SkillTextProcessor::shared();
    let mut total = 0usize;
    let mut covered = 0usize;
    for target_skill in target {
        total += 1;
        if source
            .clone()
            .into_iter()
            .any(|s| text.lexically_matches(&s.name, &target_skill.name, threshold))
        {
            covered += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        covered as f32 / total as f32
    }
}

/// Greedy pick by individual coverage with diminishing returns
pub fn minimum_combination(coverage_by_unit: &[UnitCoverage], threshold: f32) -> Vec<String> {
    let mut ranked: Vec<&UnitCoverage> = coverage_by_unit.iter().collect();
    ranked.sort_by(|a, b| {
        b.coverage
            .partial_cmp(&a.coverage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut combination = Vec::new();
    let mut cumulative = 0.0f32;
    for unit in ranked {
        combination.push(unit.unit.clone());
        cumulative += unit.coverage * (1.0 - cumulative * DIMINISHING_RETURN);
        if cumulative >= threshold {
            break;
        }
    }
    combination
}

/// Every combination of up to `max_size` units; ties keep the smaller, earlier one
pub fn best_combination(
    units: &[UnitProfile],
    course: &CourseProfile,
    max_size: usize,
    lexical_threshold: f32,
) -> (Vec<String>, f32) {
    let mut best: (Vec<String>, f32) = (Vec::new(), -1.0);
    for size in 1..=max_size.min(units.len()) {
        for combo in index_combinations(units.len(), size) {
            let skills: Vec<&Skill> = combo.iter().flat_map(|&i| units[i].skills.iter()).collect();
            let coverage = lexical_coverage(
                skills.iter().copied(),
                course.skills.iter(),
                lexical_threshold,
            );
            if coverage > best.1 {
                best = (combo.iter().map(|&i| units[i].code.clone()).collect(), coverage);
            }
        }
    }
    (best.0, best.1.max(0.0))
}

fn index_combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn walk(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            walk(i + 1, n, k, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    if k > 0 && k <= n {
        walk(0, n, k, &mut Vec::with_capacity(k), &mut out);
    }
    out
}

fn overlap(units: &[UnitProfile]) -> (f32, Vec<UnitOverlap>) {
    let names: Vec<BTreeSet<String>> = units
        .iter()
        .map(|u| u.skills.iter().map(|s| s.name.to_lowercase()).collect())
        .collect();

    let total: usize = names.iter().map(|n| n.len()).sum();
    let unique: BTreeSet<&String> = names.iter().flatten().collect();
    let ratio = if total > 0 {
        1.0 - unique.len() as f32 / total as f32
    } else {
        0.0
    };

    let mut pairs = Vec::new();
    for i in 0..units.len() {
        for j in i + 1..units.len() {
            pairs.push(UnitOverlap {
                first: units[i].code.clone(),
                second: units[j].code.clone(),
                shared_skills: names[i].intersection(&names[j]).count(),
            });
        }
    }
    (ratio, pairs)
}

pub fn detect(
    units: &[UnitProfile],
    course: &CourseProfile,
    config: &EdgeCaseConfig,
) -> EdgeCaseFinding<CombinationCoverage> {
    if units.len() < 2 || course.skills.is_empty() {
        return EdgeCaseFinding::not_applicable();
    }
    let threshold = config.lexical_similarity_threshold;

    let coverage_by_unit: Vec<UnitCoverage> = units
        .iter()
        .map(|u| UnitCoverage {
            unit: u.code.clone(),
            coverage: lexical_coverage(u.skills.iter(), course.skills.iter(), threshold),
            skill_count: u.skills.len(),
        })
        .collect();
    let (overlap_ratio, pairwise_overlap) = overlap(units);
    let minimum_combination =
        minimum_combination(&coverage_by_unit, config.combination_coverage_threshold);
    let (best_combination, best_combination_coverage) =
        best_combination(units, course, config.max_combination_size, threshold);
    let total_coverage = lexical_coverage(
        units.iter().flat_map(|u| u.skills.iter()),
        course.skills.iter(),
        threshold,
    );

    let recommendation = if overlap_ratio > 0.5 {
        "High overlap between units - consider streamlining".to_string()
    } else if total_coverage < config.combination_coverage_threshold {
        "Insufficient coverage even with all units".to_string()
    } else {
        format!("Use combination: {}", best_combination.join(", "))
    };

    EdgeCaseFinding::new(
        true,
        1.0 - total_coverage,
        vec![recommendation.clone()],
        CombinationCoverage {
            coverage_by_unit,
            pairwise_overlap,
            overlap_ratio,
            minimum_combination,
            best_combination,
            best_combination_coverage,
            total_coverage,
            recommendation,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::{Side, SkillSet};

    fn unit(code: &str, names: &[&str]) -> UnitProfile {
        UnitProfile {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            nominal_hours: None,
            prerequisites: Vec::new(),
            skills: SkillSet::new(
                code,
                names.iter().map(|n| Skill::new(*n, Side::Source, code)).collect(),
            ),
        }
    }

    fn course(names: &[&str]) -> CourseProfile {
        CourseProfile {
            code: "C".to_string(),
            name: "Course".to_string(),
            description: None,
            credit_points: None,
            prerequisites: Vec::new(),
            skills: SkillSet::new(
                "C",
                names.iter().map(|n| Skill::new(*n, Side::Target, "C")).collect(),
            ),
        }
    }

    #[test]
    fn test_index_combinations() {
        assert_eq!(index_combinations(4, 2).len(), 6);
        assert_eq!(index_combinations(3, 3), vec![vec![0, 1, 2]]);
        assert!(index_combinations(2, 3).is_empty());
    }

    #[test]
    fn test_combination_search() {
        let units = vec![
            unit("A", &["network security", "firewalls"]),
            unit("B", &["routing"]),
            unit("C", &["spreadsheets"]),
        ];
        let course = course(&["network security", "firewalls", "routing", "switching"]);
        let finding = detect(&units, &course, &EdgeCaseConfig::default());

        assert!(finding.applicable);
        assert_eq!(finding.details.best_combination, vec!["A", "B"]);
        assert!((finding.details.best_combination_coverage - 0.75).abs() < 1e-6);
        assert!((finding.details.total_coverage - 0.75).abs() < 1e-6);
        // A alone reaches 0.5, B then adds 0.25 * (1 - 0.1)
        assert_eq!(finding.details.minimum_combination, vec!["A", "B"]);
        assert_eq!(finding.details.pairwise_overlap.len(), 3);
        assert_eq!(finding.details.overlap_ratio, 0.0);
    }

    #[test]
    fn test_greedy_stops_at_threshold() {
        let coverage = vec![
            UnitCoverage {
                unit: "A".to_string(),
                coverage: 0.8,
                skill_count: 3,
            },
            UnitCoverage {
                unit: "B".to_string(),
                coverage: 0.5,
                skill_count: 2,
            },
        ];
        assert_eq!(minimum_combination(&coverage, 0.7), vec!["A"]);
    }

    #[test]
    fn test_single_unit_is_not_applicable() {
        let finding = detect(&[unit("A", &["x"])], &course(&["x"]), &EdgeCaseConfig::default());
        assert!(!finding.applicable);
    }
}
