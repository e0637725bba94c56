//! Skill records, skill sets and the unit/course profiles they belong to

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Lowest SFIA-style proficiency level
pub const MIN_LEVEL: u8 = 1;
/// Highest SFIA-style proficiency level
pub const MAX_LEVEL: u8 = 7;
/// Level used when an extracted value cannot be interpreted
pub const NEUTRAL_LEVEL: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SkillCategory {
    #[default]
    Technical,
    Cognitive,
    Interpersonal,
    DomainKnowledge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkillContext {
    Theoretical,
    Practical,
    #[default]
    Hybrid,
}

/// Which side of the comparison a skill belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Vocational unit
    Source,
    /// University course
    Target,
}

/// SFIA-style proficiency level, always within 1..=7
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkillLevel(u8);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub side: Side,
    /// Unit or course code
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub category: SkillCategory,
    #[serde(default)]
    pub level: SkillLevel,
    #[serde(default)]
    pub context: SkillContext,
    #[serde(default = "default_confidence", deserialize_with = "deserialize_confidence")]
    pub confidence: f32,
    #[serde(default, deserialize_with = "deserialize_keywords")]
    pub keywords: BTreeSet<String>,
    pub origin: Origin,
}

/// Ordered collection of skills for one unit or one course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SkillSet {
    pub code: String,
    pub skills: Vec<Skill>,
}

/// Vocational unit with the optional metadata some edge-case detectors need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitProfile {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nominal_hours: Option<u32>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub skills: SkillSet,
}

/// University course with the optional metadata some edge-case detectors need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProfile {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub credit_points: Option<u32>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub skills: SkillSet,
}

fn default_confidence() -> f32 {
    1.0
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(match parsed {
        Some(value) => clamp_confidence(value as f32),
        None => {
            warn!("Unreadable confidence {}, defaulting to 1.0", raw);
            default_confidence()
        }
    })
}

fn deserialize_keywords<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        _ => BTreeSet::new(),
    })
}

/// String form of a loosely typed enum field; anything else maps to the neutral value
fn lenient_text<'de, D>(deserializer: D, field: &str) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::String(s) => Some(s),
        other => {
            warn!("Unreadable skill {} {}, using the default", field, other);
            None
        }
    })
}

/// Clamp an extracted confidence into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        warn!("Confidence is NaN, clamping to 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        warn!("Confidence {} outside [0, 1], clamping", value);
    }
    value.clamp(0.0, 1.0)
}

impl SkillLevel {
    /// Build a level, clamping out-of-range values to the nearest bound.
    pub fn new(value: i64) -> Self {
        if !(MIN_LEVEL as i64..=MAX_LEVEL as i64).contains(&value) {
            warn!("Skill level {} outside [1, 7], clamping", value);
        }
        Self(value.clamp(MIN_LEVEL as i64, MAX_LEVEL as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Zero-based index into the compatibility matrix
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Lenient parse of numbers or SFIA level names; unknown text maps to the neutral level.
    pub fn parse_lenient(text: &str) -> Self {
        let lowered = text.trim().to_lowercase();
        if let Ok(number) = lowered.parse::<f64>() {
            return Self::new(number.round() as i64);
        }
        let level = match lowered.as_str() {
            "follow" | "novice" => 1,
            "assist" | "beginner" | "advanced beginner" => 2,
            "apply" | "competent" => 3,
            "enable" | "proficient" => 4,
            "ensure" | "advise" | "ensure/advise" | "ensure, advise" | "expert" => 5,
            "initiate" | "influence" | "initiate/influence" | "initiate, influence" => 6,
            "set strategy" | "inspire" | "mobilise" | "mobilize" => 7,
            other => {
                warn!("Unknown skill level '{}', defaulting to {}", other, NEUTRAL_LEVEL);
                NEUTRAL_LEVEL
            }
        };
        Self(level)
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Follow",
            2 => "Assist",
            3 => "Apply",
            4 => "Enable",
            5 => "Ensure/Advise",
            6 => "Initiate/Influence",
            _ => "Set Strategy",
        }
    }
}

impl Default for SkillLevel {
    fn default() -> Self {
        Self(NEUTRAL_LEVEL)
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

impl Serialize for SkillLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for SkillLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(match raw {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => SkillLevel::new(v),
                None => SkillLevel::new(n.as_f64().map(|f| f.round() as i64).unwrap_or(4)),
            },
            serde_json::Value::String(s) => SkillLevel::parse_lenient(&s),
            _ => SkillLevel::default(),
        })
    }
}

impl SkillCategory {
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "technical" => SkillCategory::Technical,
            "cognitive" => SkillCategory::Cognitive,
            "interpersonal" | "professional" | "soft" => SkillCategory::Interpersonal,
            "domain-knowledge" | "domain" | "foundational" | "knowledge" => {
                SkillCategory::DomainKnowledge
            }
            other => {
                warn!("Unknown skill category '{}', defaulting to technical", other);
                SkillCategory::Technical
            }
        }
    }
}

impl<'de> Deserialize<'de> for SkillCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(lenient_text(deserializer, "category")?
            .map(|raw| SkillCategory::parse_lenient(&raw))
            .unwrap_or_default())
    }
}

impl SkillContext {
    pub const ALL: [SkillContext; 3] = [
        SkillContext::Theoretical,
        SkillContext::Practical,
        SkillContext::Hybrid,
    ];

    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "theoretical" | "theory" => SkillContext::Theoretical,
            "practical" | "applied" => SkillContext::Practical,
            "hybrid" | "mixed" => SkillContext::Hybrid,
            other => {
                warn!("Unknown skill context '{}', defaulting to hybrid", other);
                SkillContext::Hybrid
            }
        }
    }
}

impl<'de> Deserialize<'de> for SkillContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(lenient_text(deserializer, "context")?
            .map(|raw| SkillContext::parse_lenient(&raw))
            .unwrap_or_default())
    }
}

impl fmt::Display for SkillContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillContext::Theoretical => write!(f, "theoretical"),
            SkillContext::Practical => write!(f, "practical"),
            SkillContext::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

impl Skill {
    pub fn new(name: impl Into<String>, side: Side, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: SkillCategory::default(),
            level: SkillLevel::default(),
            context: SkillContext::default(),
            confidence: 1.0,
            keywords: BTreeSet::new(),
            origin: Origin {
                side,
                code: code.into(),
            },
        }
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.level = SkillLevel::new(level);
        self
    }

    pub fn with_context(mut self, context: SkillContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_category(mut self, category: SkillCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn side(&self) -> Side {
        self.origin.side
    }
}

impl SkillSet {
    pub fn new(code: impl Into<String>, skills: Vec<Skill>) -> Self {
        Self {
            code: code.into(),
            skills,
        }
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Skill> {
        self.skills.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.skills.iter().map(|s| s.name.clone()).collect()
    }

    /// Mean proficiency level, `None` for an empty set
    pub fn mean_level(&self) -> Option<f32> {
        if self.skills.is_empty() {
            return None;
        }
        let total: u32 = self.skills.iter().map(|s| s.level.value() as u32).sum();
        Some(total as f32 / self.skills.len() as f32)
    }

    /// Share of skills in each context, in `SkillContext::ALL` order
    pub fn context_ratios(&self) -> [f32; 3] {
        let mut counts = [0usize; 3];
        for skill in &self.skills {
            let idx = SkillContext::ALL
                .iter()
                .position(|c| *c == skill.context)
                .unwrap_or(2);
            counts[idx] += 1;
        }
        let total = self.skills.len().max(1) as f32;
        [
            counts[0] as f32 / total,
            counts[1] as f32 / total,
            counts[2] as f32 / total,
        ]
    }

    /// Concatenate several skill sets, keeping each skill's own origin
    pub fn merged<'a, I>(code: impl Into<String>, sets: I) -> Self
    where
        I: IntoIterator<Item = &'a SkillSet>,
    {
        let skills = sets
            .into_iter()
            .flat_map(|set| set.skills.iter().cloned())
            .collect();
        Self::new(code, skills)
    }
}

impl UnitProfile {
    /// Name and description joined for text scans
    pub fn full_text(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        if let Some(description) = &self.description {
            parts.push(description.as_str());
        }
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_clamping() {
        assert_eq!(SkillLevel::new(0).value(), 1);
        assert_eq!(SkillLevel::new(12).value(), 7);
        assert_eq!(SkillLevel::new(5).value(), 5);
    }

    #[test]
    fn test_level_lenient_parse() {
        assert_eq!(SkillLevel::parse_lenient("Set Strategy").value(), 7);
        assert_eq!(SkillLevel::parse_lenient("apply").value(), 3);
        assert_eq!(SkillLevel::parse_lenient("3.6").value(), 4);
        assert_eq!(SkillLevel::parse_lenient("wizard").value(), NEUTRAL_LEVEL);
    }

    #[test]
    fn test_malformed_record_is_clamped_not_rejected() {
        let json = r#"{
            "name": "Network troubleshooting",
            "category": "mystery",
            "level": 11,
            "context": "somewhere",
            "confidence": 1.7,
            "origin": {"side": "source", "code": "ICTNWK401"}
        }"#;
        let skill: Skill = serde_json::from_str(json).unwrap();
        assert_eq!(skill.level.value(), 7);
        assert_eq!(skill.category, SkillCategory::Technical);
        assert_eq!(skill.context, SkillContext::Hybrid);
        assert!((skill.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_null_and_mistyped_fields_fall_back() {
        let json = r#"{"code": "ICT1", "skills": [
            {"name": "Cabling", "category": null, "context": null, "confidence": "0.8",
             "keywords": null, "origin": {"side": "source"}},
            {"name": "Routing", "category": 3, "context": ["lab"], "confidence": null,
             "origin": {"side": "source"}},
            {"name": "Switching", "confidence": "high", "keywords": "vlan, trunk",
             "origin": {"side": "source"}}
        ]}"#;
        let set: SkillSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 3);

        let cabling = &set.skills[0];
        assert_eq!(cabling.category, SkillCategory::Technical);
        assert_eq!(cabling.context, SkillContext::Hybrid);
        assert!((cabling.confidence - 0.8).abs() < 1e-6);
        assert!(cabling.keywords.is_empty());

        let routing = &set.skills[1];
        assert_eq!(routing.category, SkillCategory::Technical);
        assert_eq!(routing.context, SkillContext::Hybrid);
        assert_eq!(routing.confidence, 1.0);

        let switching = &set.skills[2];
        assert_eq!(switching.confidence, 1.0);
        assert!(switching.keywords.contains("trunk"));
    }

    #[test]
    fn test_level_names_in_records() {
        let json = r#"{"name": "Budgeting", "level": "assist", "context": "practical",
                       "confidence": -0.2, "origin": {"side": "target"}}"#;
        let skill: Skill = serde_json::from_str(json).unwrap();
        assert_eq!(skill.level.value(), 2);
        assert_eq!(skill.context, SkillContext::Practical);
        assert_eq!(skill.confidence, 0.0);
        assert_eq!(skill.side(), Side::Target);
    }

    #[test]
    fn test_context_ratios() {
        let set = SkillSet::new(
            "U1",
            vec![
                Skill::new("a", Side::Source, "U1").with_context(SkillContext::Practical),
                Skill::new("b", Side::Source, "U1").with_context(SkillContext::Practical),
                Skill::new("c", Side::Source, "U1").with_context(SkillContext::Theoretical),
                Skill::new("d", Side::Source, "U1").with_context(SkillContext::Hybrid),
            ],
        );
        let ratios = set.context_ratios();
        assert!((ratios[0] - 0.25).abs() < 1e-6);
        assert!((ratios[1] - 0.5).abs() < 1e-6);
        assert!((ratios[2] - 0.25).abs() < 1e-6);
        assert!((set.mean_level().unwrap() - 4.0).abs() < 1e-6);
    }
}
