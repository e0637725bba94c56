//! Alignment engine: clustering search, level-aware matching, edge case
//! detection and scoring for one source/target comparison

use crate::clustering::{
    collect_points, ClusterOutcome, ClusteringSearch, SearchBudget, SearchReport, SkillPoint,
};
use crate::config::Config;
use crate::edge_cases::{EdgeCaseDetector, EdgeCaseReport};
use crate::ensemble::ConsensusReconciler;
use crate::error::{CreditAlignerError, Result};
use crate::matching::{LevelAwareMatcher, MatchingResult};
use crate::processing::embeddings::{
    EmbeddingBackend, EmbeddingRegistry, RepresentationMatrix, SimilarityCache,
};
use crate::processing::levels::LevelCompatibility;
use crate::processing::skill::{CourseProfile, SkillSet, UnitProfile};
use crate::scoring::{AlignmentScore, CreditRecommendation, UnifiedScorer};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the clustering step went
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSummary {
    pub insufficient_data: bool,
    pub valid_points: usize,
    pub clusters: usize,
    pub report: Option<SearchReport>,
}

/// Everything a reporting layer needs, without recomputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub source_code: String,
    pub target_code: String,
    pub score: AlignmentScore,
    pub recommendation: CreditRecommendation,
    pub matching: MatchingResult,
    pub edge_cases: EdgeCaseReport,
    pub clustering: ClusteringSummary,
    pub generated_at: DateTime<Utc>,
}

impl AlignmentResult {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct AlignmentEngine {
    config: Config,
    representations: Vec<(String, EmbeddingBackend)>,
    search: ClusteringSearch,
    matcher: LevelAwareMatcher,
    scorer: UnifiedScorer,
    detector: EdgeCaseDetector,
    cache: Option<Arc<SimilarityCache>>,
    budget: SearchBudget,
}

impl AlignmentEngine {
    /// Validates the configuration and resolves every grid identifier up front
    pub fn new(config: Config, registry: &EmbeddingRegistry) -> Result<Self> {
        config.validate()?;
        let representations = registry.resolve(&config.clustering.embeddings)?;
        let search = ClusteringSearch::new(&config.clustering)?;
        let levels = LevelCompatibility::new();

        info!(
            "Alignment engine ready: embeddings [{}], algorithms [{}]",
            config.clustering.embeddings.join(", "),
            search
                .algorithms()
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            matcher: LevelAwareMatcher::new(config.matching.clone(), levels.clone()),
            scorer: UnifiedScorer::new(config.scoring.clone(), levels),
            detector: EdgeCaseDetector::new(config.edge_cases.clone()),
            representations,
            search,
            cache: None,
            budget: SearchBudget::unlimited(),
            config,
        })
    }

    /// Engine with the built-in embedders for `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let registry = EmbeddingRegistry::from_config(&config.embedding)?;
        Self::new(config, &registry)
    }

    pub fn with_cache(mut self, cache: Arc<SimilarityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reconciler sharing the engine's first embedding representation
    pub fn consensus_reconciler(&self) -> ConsensusReconciler {
        ConsensusReconciler::from_config(
            &self.config.ensemble,
            self.representations.first().map(|(_, b)| b.clone()),
        )
    }

    /// Align two bare skill sets; metadata-driven detectors report not applicable
    pub fn align(&self, source: &SkillSet, target: &SkillSet) -> Result<AlignmentResult> {
        let unit = UnitProfile {
            code: source.code.clone(),
            name: String::new(),
            description: None,
            nominal_hours: None,
            prerequisites: Vec::new(),
            skills: source.clone(),
        };
        let course = CourseProfile {
            code: target.code.clone(),
            name: String::new(),
            description: None,
            credit_points: None,
            prerequisites: Vec::new(),
            skills: target.clone(),
        };
        self.align_units(&[unit], &course)
    }

    /// Align one or more source units, taken together, against a course
    pub fn align_units(&self, units: &[UnitProfile], course: &CourseProfile) -> Result<AlignmentResult> {
        let (source, target) = Self::sides(units, course)?;
        let points = collect_points(&source, target);

        let representations = if points.len() >= self.config.clustering.min_valid_skills {
            self.embed(&points)?
        } else {
            Vec::new()
        };
        self.finish(units, course, &source, &points, &representations)
    }

    /// Align with embeddings computed by the caller.
    ///
    /// Each matrix has one row per skill, source skills first then target skills.
    pub fn align_with_embeddings(
        &self,
        units: &[UnitProfile],
        course: &CourseProfile,
        representations: &[RepresentationMatrix],
    ) -> Result<AlignmentResult> {
        let (source, target) = Self::sides(units, course)?;
        let points = collect_points(&source, target);
        let expected = source.len() + target.len();

        let mut selected = Vec::with_capacity(representations.len());
        for representation in representations {
            if representation.len() != expected {
                return Err(CreditAlignerError::InvalidInput(format!(
                    "Representation '{}' has {} rows, expected {}",
                    representation.name,
                    representation.len(),
                    expected
                )));
            }
            let rows = points.iter().map(|p| representation.row(p.position)).collect();
            selected.push(RepresentationMatrix::from_rows(representation.name.clone(), rows)?);
        }
        self.finish(units, course, &source, &points, &selected)
    }

    fn sides<'a>(units: &[UnitProfile], course: &'a CourseProfile) -> Result<(SkillSet, &'a SkillSet)> {
        if units.is_empty() {
            return Err(CreditAlignerError::InvalidInput(
                "At least one source unit is required".to_string(),
            ));
        }
        let source = if units.len() == 1 {
            units[0].skills.clone()
        } else {
            SkillSet::merged(
                units.iter().map(|u| u.code.as_str()).collect::<Vec<_>>().join("+"),
                units.iter().map(|u| &u.skills),
            )
        };
        if source.is_empty() {
            return Err(CreditAlignerError::InvalidInput(format!(
                "Source skill set '{}' is empty",
                source.code
            )));
        }
        if course.skills.is_empty() {
            return Err(CreditAlignerError::InvalidInput(format!(
                "Target skill set '{}' is empty",
                course.code
            )));
        }
        Ok((source, &course.skills))
    }

    /// One matrix per configured representation; a failing embedder is skipped
    fn embed(&self, points: &[SkillPoint]) -> Result<Vec<RepresentationMatrix>> {
        let names: Vec<String> = points.iter().map(|p| p.name.clone()).collect();
        let mut matrices = Vec::with_capacity(self.representations.len());
        let mut last_error = None;

        for (name, backend) in &self.representations {
            match backend
                .embed(&names)
                .and_then(|rows| RepresentationMatrix::from_rows(name.clone(), rows))
            {
                Ok(matrix) => matrices.push(matrix),
                Err(e) => {
                    warn!("Embedding representation '{}' failed: {}", name, e);
                    last_error = Some(e);
                }
            }
        }

        match (matrices.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(matrices),
        }
    }

    fn finish(
        &self,
        units: &[UnitProfile],
        course: &CourseProfile,
        source: &SkillSet,
        points: &[SkillPoint],
        representations: &[RepresentationMatrix],
    ) -> Result<AlignmentResult> {
        let target = &course.skills;
        let cache = self.cache.as_deref();

        let outcome = self
            .search
            .run(points, representations, &self.budget, cache)?;
        let matching = match &outcome {
            ClusterOutcome::Clustered {
                clusters,
                similarity,
                ..
            } => self
                .matcher
                .match_clusters(clusters, Some(similarity), source, target, cache),
            ClusterOutcome::InsufficientData { .. } => {
                self.matcher.match_clusters(&[], None, source, target, cache)
            }
        };

        let edge_cases = self.detector.detect_all(units, course);
        let signals = edge_cases.penalty_signals();
        let score = self
            .scorer
            .score(&matching.matches, source, target, Some(&signals));
        let recommendation =
            CreditRecommendation::from_score(score.final_score, signals.missing_prerequisites);

        info!(
            "{} -> {}: {} matches, final score {:.3} ({})",
            source.code,
            course.code,
            matching.matches.len(),
            score.final_score,
            recommendation
        );

        let clustering = ClusteringSummary {
            insufficient_data: outcome.is_insufficient(),
            valid_points: points.len(),
            clusters: outcome.clusters().len(),
            report: outcome.report().cloned(),
        };

        Ok(AlignmentResult {
            source_code: source.code.clone(),
            target_code: course.code.clone(),
            score,
            recommendation,
            matching,
            edge_cases,
            clustering,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::skill::{Side, Skill};

    fn set(code: &str, side: Side, names: &[&str]) -> SkillSet {
        SkillSet::new(
            code,
            names.iter().map(|n| Skill::new(*n, side, code)).collect(),
        )
    }

    #[test]
    fn test_unknown_identifiers_fail_at_construction() {
        let mut config = Config::default();
        config.clustering.embeddings = vec!["word2vec".to_string()];
        assert!(matches!(
            AlignmentEngine::from_config(config),
            Err(CreditAlignerError::Configuration(_))
        ));

        let mut config = Config::default();
        config.clustering.algorithms = vec!["dbscan".to_string()];
        assert!(matches!(
            AlignmentEngine::from_config(config),
            Err(CreditAlignerError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_skill_set_is_rejected() {
        let engine = AlignmentEngine::from_config(Config::default()).unwrap();
        let result = engine.align(
            &SkillSet::new("ICT", Vec::new()),
            &set("COMP", Side::Target, &["programming"]),
        );
        assert!(matches!(result, Err(CreditAlignerError::InvalidInput(_))));
    }

    #[test]
    fn test_small_sets_report_insufficient_data() {
        let engine = AlignmentEngine::from_config(Config::default()).unwrap();
        let result = engine
            .align(
                &set("ICT", Side::Source, &["python programming", "databases"]),
                &set("COMP", Side::Target, &["python programming"]),
            )
            .unwrap();

        assert!(result.clustering.insufficient_data);
        assert!(result.matching.matches.is_empty());
        assert_eq!(result.score.components.coverage, 0.0);
        assert_eq!(result.recommendation, CreditRecommendation::None);
    }

    #[test]
    fn test_precomputed_embeddings_row_count_checked() {
        let engine = AlignmentEngine::from_config(Config::default()).unwrap();
        let source = set("ICT", Side::Source, &["a", "b"]);
        let target = set("COMP", Side::Target, &["c"]);
        let unit = UnitProfile {
            code: "ICT".to_string(),
            name: "Unit".to_string(),
            description: None,
            nominal_hours: None,
            prerequisites: Vec::new(),
            skills: source,
        };
        let course = CourseProfile {
            code: "COMP".to_string(),
            name: "Course".to_string(),
            description: None,
            credit_points: None,
            prerequisites: Vec::new(),
            skills: target,
        };
        let matrix = RepresentationMatrix::from_rows("custom", vec![vec![1.0, 0.0]; 2]).unwrap();
        assert!(matches!(
            engine.align_with_embeddings(&[unit], &course, &[matrix]),
            Err(CreditAlignerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_result_serialises() {
        let engine = AlignmentEngine::from_config(Config::default()).unwrap();
        let result = engine
            .align(
                &set("ICT", Side::Source, &["welding"]),
                &set("ENG", Side::Target, &["welding"]),
            )
            .unwrap();
        let json = result.to_json_pretty().unwrap();
        assert!(json.contains("\"final_score\""));
        assert!(json.contains("\"edge_cases\""));
    }
}
