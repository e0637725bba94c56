//! Credit aligner: skill alignment and credit recommendation tool

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::Parser;
use credit_aligner::cli::{self, Cli, Commands, ConfigAction, OutputFormat};
use credit_aligner::clustering::SearchBudget;
use credit_aligner::ensemble::{EnsembleExtractor, ExtractionOutput, SkillExtractor};
use credit_aligner::processing::{CourseProfile, SimilarityCache, UnitProfile};
use credit_aligner::{AlignmentEngine, AlignmentResult, Config, CreditAlignerError};
use log::{error, info};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command, config).await {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => Config::load()?,
    };
    Ok(config)
}

async fn run_command(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Align {
            source,
            target,
            output,
            save,
            max_trials,
            timeout_secs,
        } => {
            let units = read_units(&source)?;
            let course: CourseProfile = read_json(&target)?;
            info!(
                "Aligning {} unit(s) with course {}",
                units.len(),
                course.code
            );

            let mut budget = SearchBudget::unlimited();
            if let Some(max_trials) = max_trials {
                budget = budget.with_max_trials(max_trials);
            }
            if let Some(secs) = timeout_secs {
                budget = budget.with_timeout(Duration::from_secs(secs));
            }

            let cache = Arc::new(SimilarityCache::from_config(&config.cache));
            let engine = AlignmentEngine::from_config(config)?
                .with_cache(Arc::clone(&cache))
                .with_budget(budget);
            let result = engine.align_units(&units, &course)?;

            match output {
                OutputFormat::Console => print_summary(&result),
                OutputFormat::Json => println!("{}", result.to_json_pretty()?),
            }

            if let Some(path) = save {
                std::fs::write(&path, result.to_json_pretty()?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("💾 Result saved to {}", path.display());
            }

            let stats = cache.stats();
            info!(
                "Similarity cache: {} entries, {} hits, {} misses",
                stats.entries, stats.hits, stats.misses
            );
        }

        Commands::Consensus {
            runs,
            threshold,
            save,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.ensemble.similarity_threshold = threshold;
            }
            let run_count = runs.len();
            let engine = AlignmentEngine::from_config(config)?;
            let ensemble = EnsembleExtractor::new(
                Arc::new(RecordedRuns { files: runs }),
                run_count,
                engine.consensus_reconciler(),
            );

            let consensus = ensemble.extract_with_consensus("").await?;
            let json = serde_json::to_string_pretty(&consensus)?;
            match save {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!(
                        "💾 Consensus of {} skills saved to {}",
                        consensus.skill_count(),
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }

        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Some(ConfigAction::Path) => {
                println!("{}", Config::config_path().display());
            }
            Some(ConfigAction::Reset) => {
                println!("🔄 Resetting configuration to defaults...");
                Config::default().save_to(&Config::config_path())?;
                println!("✅ Configuration reset successfully!");
            }
        },
    }

    Ok(())
}

/// Extraction runs recorded earlier, one JSON file per run
struct RecordedRuns {
    files: Vec<PathBuf>,
}

#[async_trait]
impl SkillExtractor for RecordedRuns {
    async fn extract(&self, _text: &str, run: usize) -> credit_aligner::Result<ExtractionOutput> {
        let path = self.files.get(run).ok_or_else(|| {
            CreditAlignerError::Extraction(format!("No recorded run {}", run + 1))
        })?;
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    if let Err(e) = cli::validate_file_extension(path, &["json"]) {
        bail!("{}: {}", path.display(), e);
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// A single unit object or an array of units
fn read_units(path: &Path) -> anyhow::Result<Vec<UnitProfile>> {
    let value: serde_json::Value = read_json(path)?;
    let units = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(units)
}

fn print_summary(result: &AlignmentResult) {
    let score = &result.score;
    println!("🎓 Credit alignment: {} → {}", result.source_code, result.target_code);
    println!(
        "📊 Final score: {:.1}% (base {:.1}%, penalty {:.0}%)",
        score.final_score * 100.0,
        score.base_score * 100.0,
        score.total_penalty * 100.0
    );
    println!("✅ Recommendation: {}", result.recommendation);

    println!("\nComponents:");
    let c = &score.components;
    println!("  Coverage:   {:.1}%", c.coverage * 100.0);
    println!("  Quality:    {:.1}%", c.quality * 100.0);
    println!("  Level:      {:.1}%", c.level * 100.0);
    println!("  Context:    {:.1}%", c.context * 100.0);
    println!("  Confidence: {:.1}%", c.confidence * 100.0);

    if !score.penalties.is_empty() {
        println!("\n⚠️  Penalties:");
        for (penalty, magnitude) in &score.penalties {
            println!("  {}: {:.0}%", penalty, magnitude * 100.0);
        }
    }

    if result.clustering.insufficient_data {
        println!(
            "\n⚠️  Too few usable skill names for clustering ({} found)",
            result.clustering.valid_points
        );
    }

    println!("\n🔗 Matches ({}):", result.matching.matches.len());
    for m in result.matching.matches.iter().take(10) {
        let sources: Vec<&str> = m.source_skills.iter().map(|s| s.name.as_str()).collect();
        let targets: Vec<&str> = m.target_skills.iter().map(|s| s.name.as_str()).collect();
        println!(
            "  [{:.2}] {} ⇄ {} ({})",
            m.combined_score,
            sources.join(", "),
            targets.join(", "),
            m.match_type
        );
    }

    if !result.matching.unmapped_target.is_empty() {
        println!("\n❌ Unmatched course skills:");
        for name in &result.matching.unmapped_target {
            println!("  - {}", name);
        }
    }

    let flagged = result.edge_cases.flagged();
    if !flagged.is_empty() {
        println!("\n🔍 Edge cases: {}", flagged.join(", "));
    }
}
