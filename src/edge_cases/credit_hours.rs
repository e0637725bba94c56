//! Nominal hours against the course's estimated study load

use super::EdgeCaseFinding;
use crate::config::EdgeCaseConfig;
use crate::processing::skill::{CourseProfile, UnitProfile};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HoursVerdict {
    Insufficient,
    #[default]
    Acceptable,
    Exceeds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditHours {
    pub source_hours: u64,
    pub credit_points: u32,
    pub estimated_target_hours: f32,
    pub hour_ratio: f32,
    pub verdict: HoursVerdict,
}

pub fn detect(
    units: &[UnitProfile],
    course: &CourseProfile,
    config: &EdgeCaseConfig,
) -> EdgeCaseFinding<CreditHours> {
    let credit_points = match course.credit_points {
        Some(points) if points > 0 => points,
        _ => return EdgeCaseFinding::not_applicable(),
    };
    let hours: Vec<u64> = units
        .iter()
        .filter_map(|u| u.nominal_hours.map(u64::from))
        .collect();
    if hours.is_empty() {
        return EdgeCaseFinding::not_applicable();
    }

    let source_hours: u64 = hours.iter().sum();
    let estimated_target_hours = credit_points as f32 * config.hours_per_credit_point;
    let hour_ratio = if estimated_target_hours > 0.0 {
        source_hours as f32 / estimated_target_hours
    } else {
        0.0
    };

    let (verdict, remediation) = if hour_ratio < config.insufficient_hours_ratio {
        (
            HoursVerdict::Insufficient,
            vec!["VET hours insufficient - additional study required".to_string()],
        )
    } else if hour_ratio > config.excessive_hours_ratio {
        (
            HoursVerdict::Exceeds,
            vec!["VET hours exceed requirements - consider additional credit".to_string()],
        )
    } else {
        (HoursVerdict::Acceptable, Vec::new())
    };

    // Surplus hours are reported with zero severity
    let severity = match verdict {
        HoursVerdict::Insufficient => 1.0 - hour_ratio,
        _ => 0.0,
    };
    EdgeCaseFinding::new(
        verdict != HoursVerdict::Acceptable,
        severity,
        remediation,
        CreditHours {
            source_hours,
            credit_points,
            estimated_target_hours,
            hour_ratio,
            verdict,
        },
    )
}
