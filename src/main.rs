use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::info;

use seo_refinery::{
    Content, ContentCorrector, CorrectorConfig, DetectorConfig, ErrorHandler, GenerationProvider,
    HttpProvider, MultiPassOptimizer, OptimizationMode, OptimizerConfig, ProgressTracker,
    PromptGenerator, RecoveryConfig, ScriptedProvider, SeoIssueDetector, StructurePreserver,
};

/// Run one bounded SEO optimization session over a content record.
#[derive(Debug, Parser)]
#[command(name = "seo-refinery", version, about)]
struct Cli {
    /// Path to the content record (JSON).
    #[arg(long)]
    content: PathBuf,

    /// Focus keyword; defaults to the record's own focus keyword.
    #[arg(long)]
    focus_keyword: Option<String>,

    /// Optional TOML config overriding detector/corrector/optimizer defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// OpenAI-compatible endpoint base URL for the primary provider.
    #[arg(long, env = "SEO_REFINERY_PROVIDER_URL")]
    provider_url: Option<String>,

    /// Optional failover endpoint base URL.
    #[arg(long, env = "SEO_REFINERY_FAILOVER_URL")]
    failover_url: Option<String>,

    /// Use a scripted provider instead of a real endpoint.
    #[arg(long)]
    dry_run: bool,

    /// How the session should run.
    #[arg(long, value_enum, default_value_t = Mode::Seamless)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Seamless,
    Manual,
    Bypass,
}

impl From<Mode> for OptimizationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Seamless => OptimizationMode::Seamless,
            Mode::Manual => OptimizationMode::Manual,
            Mode::Bypass => OptimizationMode::Bypass,
        }
    }
}

/// On-disk config; every section is optional and falls back to defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    detector: Option<DetectorConfig>,
    corrector: Option<CorrectorConfig>,
    optimizer: Option<OptimizerConfig>,
    recovery: Option<RecoveryConfig>,
}

impl FileConfig {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}

fn build_provider(cli: &Cli) -> Result<Arc<dyn GenerationProvider>> {
    if cli.dry_run {
        info!("dry run: using scripted provider");
        return Ok(Arc::new(ScriptedProvider::repeating(
            "scripted",
            "This rewrite is a dry-run placeholder and changes every field it touches.",
        )));
    }
    let url = cli
        .provider_url
        .clone()
        .context("--provider-url (or SEO_REFINERY_PROVIDER_URL) is required without --dry-run")?;
    let api_key = std::env::var("SEO_REFINERY_API_KEY").ok();
    Ok(Arc::new(HttpProvider::new("primary", url, api_key)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = FileConfig::load(cli.config.as_ref())?;

    let raw = std::fs::read_to_string(&cli.content)
        .with_context(|| format!("reading content {}", cli.content.display()))?;
    let content: Content = serde_json::from_str(&raw)
        .with_context(|| format!("parsing content {}", cli.content.display()))?;

    let focus_keyword = cli
        .focus_keyword
        .clone()
        .or_else(|| content.focus_keyword.clone())
        .context("no focus keyword given and the content record has none")?;

    let provider = build_provider(&cli)?;
    let mut corrector =
        ContentCorrector::new(provider, config.corrector.unwrap_or_default());
    if let Some(ref url) = cli.failover_url {
        let api_key = std::env::var("SEO_REFINERY_API_KEY").ok();
        corrector = corrector.with_failover(Arc::new(HttpProvider::new(
            "failover",
            url.clone(),
            api_key,
        )));
    }

    let optimizer_config = config.optimizer.unwrap_or_default();
    info!(
        max_iterations = optimizer_config.max_iterations,
        target = optimizer_config.target_compliance_score,
        keyword = %focus_keyword,
        "starting optimization session"
    );

    let mut optimizer = MultiPassOptimizer::new(
        SeoIssueDetector::new(config.detector.unwrap_or_default()),
        PromptGenerator::new(),
        corrector,
        StructurePreserver::new(),
        ErrorHandler::new(config.recovery.unwrap_or_default()),
        ProgressTracker::new(),
        optimizer_config,
    );

    let result = optimizer
        .optimize_content(content, &focus_keyword, cli.mode.into())
        .await;

    info!(
        passes = result.passes,
        score = result.compliance_score,
        reason = %result.termination_reason,
        "session finished"
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_no_config_path_yields_defaults() {
        let config = FileConfig::load(None).unwrap();
        assert!(config.detector.is_none());
        assert!(config.corrector.is_none());
        assert!(config.optimizer.is_none());
        assert!(config.recovery.is_none());
    }

    #[test]
    fn test_config_file_overrides_reach_the_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refinery.toml");
        fs::write(
            &path,
            r#"
[detector]
meta_min_chars = 100
meta_max_chars = 140
density_min_pct = 0.4
density_max_pct = 3.0
title_soft_max_chars = 55
title_hard_max_chars = 62
long_sentence_words = 18
long_sentence_ratio_max = 0.2
passive_ratio_max = 0.05
transition_ratio_min = 0.25

[optimizer]
max_iterations = 3
target_compliance_score = 85.0
"#,
        )
        .unwrap();

        let config = FileConfig::load(Some(&path)).unwrap();

        let detector = config.detector.expect("detector section");
        assert_eq!(detector.meta_min_chars, 100);
        assert_eq!(detector.meta_max_chars, 140);
        assert_eq!(detector.title_hard_max_chars, 62);
        assert_eq!(detector.passive_ratio_max, 0.05);

        let optimizer = config.optimizer.expect("optimizer section");
        assert_eq!(optimizer.max_iterations, 3);
        assert_eq!(optimizer.target_compliance_score, 85.0);

        // Omitted sections stay at their defaults.
        assert!(config.corrector.is_none());
        assert!(config.recovery.is_none());
    }

    #[test]
    fn test_unreadable_or_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(FileConfig::load(Some(&missing)).is_err());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[detector]\nmeta_min_chars = \"not a number\"\n").unwrap();
        assert!(FileConfig::load(Some(&bad)).is_err());
    }
}
