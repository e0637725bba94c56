//! Scan of source unit text for deprecated technologies and methodologies

use super::{EdgeCaseFinding, UpdateEffort};
use crate::processing::skill::UnitProfile;
use aho_corasick::{AhoCorasick, MatchKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

struct DeprecatedTechnology {
    pattern: Regex,
    old: &'static str,
    replacement: &'static str,
    effort: UpdateEffort,
}

static TECHNOLOGIES: Lazy<Vec<DeprecatedTechnology>> = Lazy::new(|| {
    [
        (r"python\s*2\.?\d*", "Python 2.x", "Python 3.x", UpdateEffort::Medium),
        (r"java\s*[678]\b", "Java 6/7/8", "Java 11+", UpdateEffort::Low),
        (r"angular\s*js", "AngularJS", "Angular 2+", UpdateEffort::High),
        (r"\bflash\b", "Flash", "HTML5/Canvas", UpdateEffort::High),
        (r"vb6|visual\s*basic\s*6", "Visual Basic 6", "Modern .NET", UpdateEffort::High),
        (r"php\s*[45]\b", "PHP 4/5", "PHP 8+", UpdateEffort::Medium),
        (r"mysql\s*[45]\b", "MySQL 4/5", "MySQL 8+", UpdateEffort::Low),
        (r"windows\s*xp|windows\s*7", "Legacy Windows", "Windows 10/11", UpdateEffort::Medium),
    ]
    .into_iter()
    .map(|(pattern, old, replacement, effort)| DeprecatedTechnology {
        pattern: Regex::new(pattern).expect("valid technology pattern"),
        old,
        replacement,
        effort,
    })
    .collect()
});

const METHODOLOGIES: [(&str, &str); 3] = [
    ("waterfall", "Agile/Scrum methodologies"),
    ("big data hadoop only", "Modern data platforms (Spark, Cloud)"),
    ("on-premise only", "Cloud and hybrid architectures"),
];

static METHODOLOGY_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(METHODOLOGIES.iter().map(|(old, _)| *old))
        .expect("valid methodology patterns")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyIssue {
    pub unit: String,
    pub old_technology: String,
    pub recommended: String,
    pub update_effort: UpdateEffort,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutdatedContent {
    pub currency_issues: Vec<CurrencyIssue>,
    /// Deprecated methodologies; reported but not counted as currency issues
    pub modernisation_requirements: Vec<String>,
    pub estimated_update_effort: UpdateEffort,
}

pub fn detect(units: &[UnitProfile]) -> EdgeCaseFinding<OutdatedContent> {
    let mut details = OutdatedContent::default();
    let mut remediation = Vec::new();

    for unit in units {
        let text = unit.full_text().to_lowercase();
        if text.is_empty() {
            continue;
        }

        for technology in TECHNOLOGIES.iter() {
            if technology.pattern.is_match(&text) {
                details.currency_issues.push(CurrencyIssue {
                    unit: unit.code.clone(),
                    old_technology: technology.old.to_string(),
                    recommended: technology.replacement.to_string(),
                    update_effort: technology.effort,
                });
                remediation.push(format!(
                    "Update from {} to {}",
                    technology.old, technology.replacement
                ));
            }
        }

        let found: BTreeSet<usize> = METHODOLOGY_MATCHER
            .find_iter(&text)
            .map(|m| m.pattern().as_usize())
            .collect();
        for idx in found {
            let (old, modern) = METHODOLOGIES[idx];
            if !text.contains(&modern.to_lowercase()) {
                details
                    .modernisation_requirements
                    .push(format!("Modernize from {} to {}", old, modern));
            }
        }
    }

    details.estimated_update_effort = details
        .currency_issues
        .iter()
        .map(|i| i.update_effort)
        .max()
        .unwrap_or_default();
    remediation.extend(details.modernisation_requirements.iter().cloned());

    let severity = if details.currency_issues.is_empty() {
        0.0
    } else {
        details.estimated_update_effort.severity()
    };
    EdgeCaseFinding::new(
        !details.currency_issues.is_empty(),
        severity,
        remediation,
        details,
    )
}
