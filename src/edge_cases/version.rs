//! Technology version differences between matched skill names

use super::{EdgeCaseFinding, UpdateEffort};
use crate::processing::skill::SkillSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

struct TechnologyPattern {
    technology: &'static str,
    pattern: Regex,
    /// Share of the core skill that survives a version change
    preservation: f32,
}

static PATTERNS: Lazy<Vec<TechnologyPattern>> = Lazy::new(|| {
    [
        ("python", r"python\s*(\d+(?:\.\d+)?)", 0.85),
        ("java", r"java\s*(?:se\s*)?(\d+)", 0.9),
        ("javascript", r"(?:javascript|js)\s*(?:es)?(\d+)?", 0.8),
        ("react", r"react(?:\.?js)?\s*(?:v)?(\d+(?:\.\d+)?)", 0.7),
        ("angular", r"angular(?:js)?\s*(?:v)?(\d+)?", 0.5),
        (".net", r"\.net\s*(?:core\s*)?(?:framework\s*)?(\d+(?:\.\d+)?)", 0.8),
    ]
    .into_iter()
    .map(|(technology, pattern, preservation)| TechnologyPattern {
        technology,
        pattern: Regex::new(pattern).expect("valid version pattern"),
        preservation,
    })
    .collect()
});

/// Known upgrade paths by major version
const KNOWN_DIFFICULTIES: [(&str, &str, &str, UpdateEffort); 5] = [
    ("python", "2", "3", UpdateEffort::Medium),
    ("python", "3", "3", UpdateEffort::Low),
    ("java", "8", "11", UpdateEffort::Low),
    ("java", "8", "17", UpdateEffort::Medium),
    ("java", "6", "11", UpdateEffort::High),
];

static MAJOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)").expect("valid major pattern"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMismatch {
    pub technology: String,
    pub source_version: String,
    pub target_version: String,
    pub preservation_rate: f32,
    pub update_difficulty: UpdateEffort,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMismatches {
    pub mismatches: Vec<VersionMismatch>,
    /// Lowest preservation rate seen per technology
    pub core_skill_preserved: BTreeMap<String, f32>,
}

/// Upgrade difficulty from one version string to another
pub fn update_difficulty(technology: &str, from: &str, to: &str) -> UpdateEffort {
    let major = |v: &str| MAJOR.captures(v).map(|c| c[1].to_string());
    let (Some(from_major), Some(to_major)) = (major(from), major(to)) else {
        return UpdateEffort::Medium;
    };

    if let Some((_, _, _, effort)) = KNOWN_DIFFICULTIES
        .iter()
        .find(|(t, f, n, _)| *t == technology && *f == from_major && *n == to_major)
    {
        return *effort;
    }

    match (from_major.parse::<i64>(), to_major.parse::<i64>()) {
        (Ok(from), Ok(to)) => match to - from {
            d if d <= 1 => UpdateEffort::Low,
            d if d <= 3 => UpdateEffort::Medium,
            _ => UpdateEffort::High,
        },
        _ => UpdateEffort::Medium,
    }
}

fn version_of(pattern: &TechnologyPattern, name: &str) -> Option<Option<String>> {
    if !name.contains(pattern.technology) {
        return None;
    }
    pattern
        .pattern
        .captures(name)
        .map(|c| c.get(1).map(|m| m.as_str().to_string()))
}

pub fn detect(source: &SkillSet, target: &SkillSet) -> EdgeCaseFinding<VersionMismatches> {
    let mut details = VersionMismatches::default();
    let mut remediation = Vec::new();

    for source_skill in source.iter() {
        let source_name = source_skill.name.to_lowercase();
        for pattern in PATTERNS.iter() {
            let Some(source_version) = version_of(pattern, &source_name) else {
                continue;
            };
            let source_version = source_version.unwrap_or_else(|| "unspecified".to_string());

            for target_skill in target.iter() {
                let target_name = target_skill.name.to_lowercase();
                let Some(target_version) = version_of(pattern, &target_name) else {
                    continue;
                };
                let target_version = target_version.unwrap_or_else(|| "latest".to_string());
                if source_version == target_version {
                    continue;
                }

                let difficulty =
                    update_difficulty(pattern.technology, &source_version, &target_version);
                remediation.push(format!(
                    "Update {} from {} to {}",
                    pattern.technology, source_version, target_version
                ));
                details
                    .core_skill_preserved
                    .entry(pattern.technology.to_string())
                    .and_modify(|p: &mut f32| *p = p.min(pattern.preservation))
                    .or_insert(pattern.preservation);
                details.mismatches.push(VersionMismatch {
                    technology: pattern.technology.to_string(),
                    source_version: source_version.clone(),
                    target_version,
                    preservation_rate: pattern.preservation,
                    update_difficulty: difficulty,
                });
            }
        }
    }

    let severity = details
        .mismatches
        .iter()
        .map(|m| 1.0 - m.preservation_rate)
        .fold(0.0f32, f32::max);
    EdgeCaseFinding::new(!details.mismatches.is_empty(), severity, remediation, details)
}
