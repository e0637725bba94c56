//! Consensus over repeated, noisy skill extractions
//!
//! The extractor itself is an external collaborator. [`EnsembleExtractor`]
//! runs it several times concurrently and [`ConsensusReconciler`] keeps the
//! skills that recur in a majority of the runs.

use crate::config::EnsembleConfig;
use crate::error::{CreditAlignerError, Result};
use crate::processing::embeddings::EmbeddingBackend;
use crate::processing::skill::{clamp_confidence, Skill};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;

/// What one extraction run returns: a flat list, or one list per item (e.g. per unit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionOutput {
    Single(Vec<Skill>),
    PerItem(BTreeMap<String, Vec<Skill>>),
}

impl ExtractionOutput {
    pub fn skill_count(&self) -> usize {
        match self {
            ExtractionOutput::Single(skills) => skills.len(),
            ExtractionOutput::PerItem(items) => items.values().map(Vec::len).sum(),
        }
    }
}

#[async_trait]
pub trait SkillExtractor: Send + Sync {
    /// Extract skills from `text`; `run` is the zero-based run index
    async fn extract(&self, text: &str, run: usize) -> Result<ExtractionOutput>;
}

struct SkillGroup {
    key: String,
    embedding: Option<Vec<f32>>,
    best: Skill,
    runs: BTreeSet<usize>,
}

/// Majority vote over semantic skill groups
#[derive(Debug, Clone)]
pub struct ConsensusReconciler {
    backend: Option<EmbeddingBackend>,
    similarity_threshold: f32,
}

impl ConsensusReconciler {
    /// Without a backend, skills group by exact lowercase name
    pub fn new(backend: Option<EmbeddingBackend>, similarity_threshold: f32) -> Self {
        Self {
            backend,
            similarity_threshold,
        }
    }

    pub fn from_config(config: &EnsembleConfig, backend: Option<EmbeddingBackend>) -> Self {
        Self::new(backend, config.similarity_threshold)
    }

    /// Consensus over `runs.len()` flat extraction runs
    pub fn reconcile(&self, runs: &[Vec<Skill>]) -> Result<Vec<Skill>> {
        let run_refs: Vec<(usize, &[Skill])> = runs
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.as_slice()))
            .collect();
        self.reconcile_group(&run_refs, runs.len())
    }

    /// Consensus per item; every item is judged against the total run count
    pub fn reconcile_items(
        &self,
        runs: &[BTreeMap<String, Vec<Skill>>],
    ) -> Result<BTreeMap<String, Vec<Skill>>> {
        let items: BTreeSet<&String> = runs.iter().flat_map(|r| r.keys()).collect();

        let mut consensus = BTreeMap::new();
        for item in items {
            let item_runs: Vec<(usize, &[Skill])> = runs
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.get(item).map(|skills| (i, skills.as_slice())))
                .collect();
            consensus.insert(item.clone(), self.reconcile_group(&item_runs, runs.len())?);
        }
        Ok(consensus)
    }

    /// Dispatch on the shape of the runs; mixing shapes is an error
    pub fn reconcile_outputs(&self, outputs: &[ExtractionOutput]) -> Result<ExtractionOutput> {
        if outputs
            .iter()
            .all(|o| matches!(o, ExtractionOutput::Single(_)))
        {
            let runs: Vec<Vec<Skill>> = outputs
                .iter()
                .filter_map(|o| match o {
                    ExtractionOutput::Single(skills) => Some(skills.clone()),
                    ExtractionOutput::PerItem(_) => None,
                })
                .collect();
            return Ok(ExtractionOutput::Single(self.reconcile(&runs)?));
        }

        if outputs
            .iter()
            .all(|o| matches!(o, ExtractionOutput::PerItem(_)))
        {
            let runs: Vec<BTreeMap<String, Vec<Skill>>> = outputs
                .iter()
                .filter_map(|o| match o {
                    ExtractionOutput::PerItem(items) => Some(items.clone()),
                    ExtractionOutput::Single(_) => None,
                })
                .collect();
            return Ok(ExtractionOutput::PerItem(self.reconcile_items(&runs)?));
        }

        Err(CreditAlignerError::Extraction(
            "Extraction runs returned inconsistent result shapes".to_string(),
        ))
    }

    fn reconcile_group(&self, runs: &[(usize, &[Skill])], total_runs: usize) -> Result<Vec<Skill>> {
        if total_runs == 0 {
            return Ok(Vec::new());
        }
        let embeddings = self.embed_names(runs)?;

        let mut groups: Vec<SkillGroup> = Vec::new();
        for (run, skills) in runs {
            for skill in skills.iter() {
                let name = skill.name.trim();
                if name.is_empty() {
                    continue;
                }
                let embedding = embeddings.as_ref().and_then(|e| e.get(name).cloned());

                match self.find_group(&groups, name, embedding.as_deref()) {
                    Some(idx) => {
                        let group = &mut groups[idx];
                        group.runs.insert(*run);
                        if skill.confidence > group.best.confidence {
                            group.best = skill.clone();
                        }
                    }
                    None => groups.push(SkillGroup {
                        key: name.to_lowercase(),
                        embedding,
                        best: skill.clone(),
                        runs: BTreeSet::from([*run]),
                    }),
                }
            }
        }

        let group_count = groups.len();
        let mut consensus: Vec<Skill> = groups
            .into_iter()
            .filter(|g| g.runs.len() * 2 >= total_runs)
            .map(|g| {
                let appearances = g.runs.len();
                debug!(
                    "Skill group '{}' kept with {}/{} appearances",
                    g.best.name, appearances, total_runs
                );
                let mut skill = g.best;
                skill.confidence =
                    clamp_confidence(skill.confidence * appearances as f32 / total_runs as f32);
                skill
            })
            .collect();

        consensus.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        info!(
            "Consensus extraction: {} skills from {} groups over {} runs",
            consensus.len(),
            group_count,
            total_runs
        );
        Ok(consensus)
    }

    fn embed_names(&self, runs: &[(usize, &[Skill])]) -> Result<Option<HashMap<String, Vec<f32>>>> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };
        let names: Vec<String> = runs
            .iter()
            .flat_map(|(_, skills)| skills.iter())
            .map(|s| s.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if names.is_empty() {
            return Ok(Some(HashMap::new()));
        }
        let vectors = backend.embed(&names)?;
        Ok(Some(names.into_iter().zip(vectors).collect()))
    }

    fn find_group(&self, groups: &[SkillGroup], name: &str, embedding: Option<&[f32]>) -> Option<usize> {
        match (&self.backend, embedding) {
            (Some(backend), Some(vector)) => groups.iter().position(|g| {
                g.embedding
                    .as_deref()
                    .is_some_and(|rep| backend.similarity(vector, rep) >= self.similarity_threshold)
            }),
            _ => {
                let key = name.to_lowercase();
                groups.iter().position(|g| g.key == key)
            }
        }
    }
}

/// Runs an extractor several times concurrently and reconciles the results
pub struct EnsembleExtractor {
    extractor: Arc<dyn SkillExtractor>,
    runs: usize,
    reconciler: ConsensusReconciler,
}

impl EnsembleExtractor {
    pub fn new(extractor: Arc<dyn SkillExtractor>, runs: usize, reconciler: ConsensusReconciler) -> Self {
        Self {
            extractor,
            runs: runs.max(1),
            reconciler,
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Failed runs are dropped and the majority is taken over the runs that succeeded
    pub async fn extract_with_consensus(&self, text: &str) -> Result<ExtractionOutput> {
        let mut join_set = JoinSet::new();
        for run in 0..self.runs {
            let extractor = Arc::clone(&self.extractor);
            let text = text.to_string();
            join_set.spawn(async move {
                info!("Ensemble extraction run {}", run + 1);
                (run, extractor.extract(&text, run).await)
            });
        }

        let mut completed: Vec<(usize, ExtractionOutput)> = Vec::with_capacity(self.runs);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((run, Ok(output))) => {
                    debug!("Run {} returned {} skills", run + 1, output.skill_count());
                    completed.push((run, output));
                }
                Ok((run, Err(e))) => warn!("Extraction run {} failed: {}", run + 1, e),
                Err(e) => warn!("Extraction task aborted: {}", e),
            }
        }

        if completed.is_empty() {
            return Err(CreditAlignerError::Extraction(format!(
                "All {} extraction runs failed",
                self.runs
            )));
        }

        // Completion order varies; grouping must not
        completed.sort_by_key(|(run, _)| *run);
        let outputs: Vec<ExtractionOutput> = completed.into_iter().map(|(_, o)| o).collect();
        self.reconciler.reconcile_outputs(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::embeddings::HashingEmbedder;
    use crate::processing::skill::Side;

    fn skill(name: &str, confidence: f32) -> Skill {
        Skill::new(name, Side::Source, "ICT").with_confidence(confidence)
    }

    fn hashing_reconciler() -> ConsensusReconciler {
        ConsensusReconciler::new(
            Some(EmbeddingBackend::Hashing(HashingEmbedder::default())),
            0.9,
        )
    }

    #[test]
    fn test_majority_boundary_with_three_runs() {
        let runs = vec![
            vec![skill("Network configuration", 0.9), skill("Cabling", 0.8)],
            vec![skill("Network configuration", 0.7), skill("Firewall rules", 0.8)],
            vec![skill("Firewall rules", 0.6)],
        ];
        let consensus = hashing_reconciler().reconcile(&runs).unwrap();
        let names: Vec<&str> = consensus.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["Network configuration", "Firewall rules"]);
        // Best member confidence scaled by 2/3
        assert!((consensus[0].confidence - 0.6).abs() < 1e-6);
        assert!((consensus[1].confidence - 0.8 * 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_name_fallback_without_embeddings() {
        let reconciler = ConsensusReconciler::new(None, 0.9);
        let runs = vec![
            vec![skill("Risk Assessment", 1.0)],
            vec![skill("risk assessment ", 1.0)],
            vec![skill("Risk analysis", 1.0)],
        ];
        let consensus = reconciler.reconcile(&runs).unwrap();
        assert_eq!(consensus.len(), 1);
        assert_eq!(consensus[0].name, "Risk Assessment");
    }

    #[test]
    fn test_per_item_consensus() {
        let run = |names: &[&str]| {
            BTreeMap::from([(
                "ICT1".to_string(),
                names.iter().map(|n| skill(n, 1.0)).collect::<Vec<_>>(),
            )])
        };
        let mut runs = vec![run(&["Scripting"]), run(&["Scripting"])];
        runs[1].insert("ICT2".to_string(), vec![skill("Routing", 1.0)]);
        runs.push(run(&["Databases"]));

        let consensus = hashing_reconciler().reconcile_items(&runs).unwrap();
        assert_eq!(consensus["ICT1"].len(), 1);
        // ICT2 appears in one run out of three
        assert!(consensus["ICT2"].is_empty());
    }

    #[test]
    fn test_mixed_shapes_are_rejected() {
        let outputs = vec![
            ExtractionOutput::Single(vec![skill("A", 1.0)]),
            ExtractionOutput::PerItem(BTreeMap::new()),
        ];
        assert!(matches!(
            hashing_reconciler().reconcile_outputs(&outputs),
            Err(CreditAlignerError::Extraction(_))
        ));
    }

    struct ScriptedExtractor {
        runs: Vec<Option<Vec<&'static str>>>,
    }

    #[async_trait]
    impl SkillExtractor for ScriptedExtractor {
        async fn extract(&self, _text: &str, run: usize) -> Result<ExtractionOutput> {
            match self.runs.get(run).cloned().flatten() {
                Some(names) => Ok(ExtractionOutput::Single(
                    names.into_iter().map(|n| skill(n, 1.0)).collect(),
                )),
                None => Err(CreditAlignerError::Extraction(format!("run {} failed", run))),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_runs_are_dropped() {
        let extractor = ScriptedExtractor {
            runs: vec![Some(vec!["Welding"]), None, Some(vec!["Welding", "Grinding"])],
        };
        let ensemble = EnsembleExtractor::new(Arc::new(extractor), 3, hashing_reconciler());
        let output = ensemble.extract_with_consensus("unit text").await.unwrap();

        // Two successful runs: "Grinding" appears in 1 of 2 and is kept
        match output {
            ExtractionOutput::Single(skills) => {
                assert_eq!(skills.len(), 2);
                assert_eq!(skills[0].name, "Welding");
                assert!((skills[1].confidence - 0.5).abs() < 1e-6);
            }
            ExtractionOutput::PerItem(_) => panic!("expected flat output"),
        }
    }

    #[tokio::test]
    async fn test_all_runs_failing_is_an_error() {
        let extractor = ScriptedExtractor {
            runs: vec![None, None],
        };
        let ensemble = EnsembleExtractor::new(Arc::new(extractor), 2, hashing_reconciler());
        let result = ensemble.extract_with_consensus("unit text").await;
        assert!(matches!(result, Err(CreditAlignerError::Extraction(_))));
    }
}
