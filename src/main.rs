//! expertrec - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use expertrec::{
    agents::{AgentFactory, AgentRole},
    cli::{self, Args, Commands, Verbosity},
    config::SystemConfig,
    embedding::EmbeddingEngine,
    evaluation,
    index::{artifact::load_versioned, QdrantIndex},
    observe::{ObservationSink, RecordingSink, TracingSink},
    offline,
    pipeline::SessionState,
};

fn init_logging(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Normal => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity.filter())),
        _ => EnvFilter::new(verbosity.filter()),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbosity());

    if let Err(e) = run(&args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = SystemConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let verbosity = args.verbosity();

    match &args.command {
        Commands::Recommend {
            input,
            top_k,
            num,
            keep_history,
            session,
            show_trace,
        } => {
            let top_k = top_k.unwrap_or(config.pipeline.top_k);
            let num = num.unwrap_or(config.pipeline.num);
            recommend(
                &config,
                input,
                top_k,
                num,
                !*keep_history,
                session.as_deref(),
                *show_trace,
                verbosity,
            )
            .await
        }
        Commands::AnalyzeExperts { input, output } => {
            analyze_experts(&config, input, output, verbosity).await
        }
        Commands::BuildIndex {
            profiles,
            descriptions,
            output_dir,
            push,
        } => {
            build_index(
                &config,
                profiles,
                descriptions.as_deref(),
                output_dir,
                *push,
                verbosity,
            )
            .await
        }
        Commands::EvalRecall { test_data, depth } => eval_recall(&config, test_data, *depth).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn recommend(
    config: &SystemConfig,
    input: &[String],
    top_k: usize,
    num: usize,
    reset: bool,
    session_path: Option<&Path>,
    show_trace: bool,
    verbosity: Verbosity,
) -> Result<()> {
    let recording = RecordingSink::new();
    let sink: Arc<dyn ObservationSink> = if show_trace {
        Arc::new(recording.clone())
    } else {
        Arc::new(TracingSink)
    };

    let orchestrator = cli::load_system(config, sink)
        .await
        .context("Failed to initialise the recommendation system")?;

    let mut session = match session_path {
        Some(path) if path.exists() => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read session {}", path.display()))?;
            serde_json::from_str(&json).context("Failed to parse session file")?
        }
        _ => SessionState::new(),
    };

    let result = orchestrator
        .recommend(&mut session, input, top_k, num, reset)
        .await;

    if let Some(path) = session_path {
        std::fs::write(path, serde_json::to_string_pretty(&session)?)
            .with_context(|| format!("Failed to write session {}", path.display()))?;
    }

    let lines = result?;

    if show_trace {
        for observation in recording.entries() {
            println!(
                "{} {}",
                format!("[{}]", observation.source).cyan(),
                observation.payload.summary().trim_end()
            );
        }
        println!();
    }

    if verbosity != Verbosity::Quiet {
        println!("{}", "推荐专家".bold().green());
    }
    for line in &lines {
        println!("{}", line.trim_end());
    }
    Ok(())
}

async fn analyze_experts(
    config: &SystemConfig,
    input: &Path,
    output: &Path,
    verbosity: Verbosity,
) -> Result<()> {
    let agent = AgentFactory::new(config)
        .build(AgentRole::ExpertAnalyst)
        .context("ExpertAnalyst must be configured to analyse experts")?;
    let profiles = offline::load_profiles(input)
        .with_context(|| format!("Failed to read profiles from {}", input.display()))?;

    let records = offline::analyze_experts(&agent, &profiles, verbosity.show_progress()).await?;
    offline::save_records(output, &records)?;

    println!(
        "{} {} experts analysed → {}",
        "✓".green(),
        records.len(),
        output.display()
    );
    Ok(())
}

async fn build_index(
    config: &SystemConfig,
    profiles_path: &Path,
    descriptions: Option<&Path>,
    output_dir: &Path,
    push: bool,
    verbosity: Verbosity,
) -> Result<()> {
    let recall = config.recall()?;
    let profiles = offline::load_profiles(profiles_path)
        .with_context(|| format!("Failed to read profiles from {}", profiles_path.display()))?;
    let described = descriptions
        .map(offline::load_records)
        .transpose()
        .context("Failed to read expert descriptions")?
        .unwrap_or_default();

    let model = recall.emb_model_path.clone();
    let max_length = recall.max_length;
    let dir: PathBuf = output_dir.to_path_buf();
    let show_progress = verbosity.show_progress();

    let output = tokio::task::spawn_blocking(move || {
        let engine = EmbeddingEngine::load(&model, max_length)?;
        offline::build_index(&engine, &profiles, &described, &model, &dir, show_progress)
    })
    .await
    .context("Index build task panicked")??;

    println!(
        "{} {} experts indexed (dim {}, version {})",
        "✓".green(),
        output.rows,
        output.dimension,
        output.version
    );
    println!("  index: {}", output.index_path.display());
    println!("  table: {}", output.table_path.display());

    if push {
        let (url, collection) = cli::setup::qdrant_target(&recall)?;
        let (index, table) = load_versioned(&output.index_path, &output.table_path)?;
        QdrantIndex::populate(url, collection, &index, &table).await?;
        info!(collection, "qdrant collection populated");
        println!("{} pushed to qdrant collection {}", "✓".green(), collection);
    }
    Ok(())
}

async fn eval_recall(config: &SystemConfig, test_data: &Path, depth: usize) -> Result<()> {
    let recall = cli::load_recall(&config.recall()?, config).await?;
    let cases = evaluation::load_cases(test_data)
        .with_context(|| format!("Failed to read test data {}", test_data.display()))?;

    let report = evaluation::run_recall_eval(&recall, &cases, depth).await?;

    println!("{}", "Recall evaluation".bold());
    for (k, rate) in &report.hit_rates {
        println!("  Hit Rate at Top {:>3}: {:>6.2}%", k, rate);
    }
    println!("  Average Rank:        {:.2}", report.average_rank);
    Ok(())
}
