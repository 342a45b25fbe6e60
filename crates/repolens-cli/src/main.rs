use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use repolens_core::{
    llm, render_report, AnalysisReport, Collaborators, GitCloner, GithubTracker, LlmSettings,
    OutputFormat, Pipeline, PipelineConfig, PylintLinter, RepositoryRef,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "repolens",
    author,
    version,
    about = "Lint, review and summarize a source repository"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON, chosen by extension)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory that receives checkouts
    #[arg(long, value_name = "DIR", global = true)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a repository, analyze every file and print the report
    Analyze {
        /// Remote URL or local path of the repository
        repo: String,
        #[arg(long, value_enum, default_value_t = Format::Human)]
        format: Format,
        /// Abort the run after this long (e.g. `90s`, `5m`)
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
        /// Maximum number of files analyzed at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Leave the checkout on disk after the run
        #[arg(long)]
        keep_checkout: bool,
    },
    /// Print the extension routing table
    Routes {
        /// Emit routes as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Show which analyzer each path would be routed to
    Classify {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Human,
    Json,
    Yaml,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(workdir) = cli.workdir {
        config.workdir = workdir;
    }

    match cli.command {
        Commands::Analyze {
            repo,
            format,
            timeout,
            concurrency,
            keep_checkout,
        } => {
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            config.keep_checkout |= keep_checkout;
            config.validate().context("invalid configuration")?;
            analyze(&config, &repo, format, timeout).await
        }
        Commands::Routes { json } => {
            config.validate().context("invalid configuration")?;
            list_routes(&config, json)
        }
        Commands::Classify { paths } => {
            config.validate().context("invalid configuration")?;
            classify_paths(&config, &paths);
            Ok(())
        }
    }
}

/// Layer the optional file, then `REPOLENS__*` environment variables, over the defaults.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("REPOLENS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    let settings = builder.build().with_context(|| match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration".to_string(),
    })?;
    settings
        .try_deserialize::<PipelineConfig>()
        .context("configuration has unexpected values")
}

async fn analyze(
    config: &PipelineConfig,
    remote: &str,
    format: Format,
    timeout: Option<Duration>,
) -> Result<()> {
    let repo = RepositoryRef::parse(remote)?;
    let settings = LlmSettings::from_env_with(&config.llm)?;
    let reviewer = llm::build_client(&settings)?;
    info!(provider = %settings.provider, reviewer = reviewer.name(), "review backend ready");

    let linter = PylintLinter::new(&config.lint.program)
        .with_args(config.lint.args.iter().cloned())
        .with_timeout(config.lint.timeout());
    let collaborators = Collaborators {
        cloner: Arc::new(GitCloner::from_config(&config.fetch)),
        linter: Arc::new(linter),
        reviewer,
        tracker: Arc::new(GithubTracker::new(&config.tracker)?),
    };
    let pipeline = Pipeline::new(config, collaborators);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal_or_timeout(cancel.clone(), timeout));
    let outcome = pipeline.analyze(&repo, &cancel).await;
    watcher.abort();

    let report = outcome.with_context(|| format!("analysis of {repo} failed"))?;
    println!("{}", render(&report, format)?);
    Ok(())
}

async fn cancel_on_signal_or_timeout(cancel: CancellationToken, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = deadline => warn!("timeout reached; cancelling analysis"),
        _ = tokio::signal::ctrl_c() => warn!("interrupted; cancelling analysis"),
    }
    cancel.cancel();
}

fn render(report: &AnalysisReport, format: Format) -> Result<String> {
    match format {
        Format::Human => render_report(report, OutputFormat::Human),
        Format::Json => render_report(report, OutputFormat::Json),
        Format::Yaml => Ok(serde_yaml::to_string(report)?),
    }
}

#[derive(Serialize)]
struct RouteRow<'a> {
    extension: &'a str,
    kind: &'a str,
    language: &'a str,
}

fn list_routes(config: &PipelineConfig, json: bool) -> Result<()> {
    let classifier = config.classifier();
    let rows: Vec<_> = classifier
        .routes()
        .into_iter()
        .map(|(extension, route)| RouteRow {
            extension,
            kind: route.kind.as_str(),
            language: &route.language,
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{} route(s); other extensions are skipped", rows.len());
    for row in rows {
        println!(
            "- .{ext:<8} {kind:<18} {lang}",
            ext = row.extension,
            kind = row.kind,
            lang = row.language
        );
    }
    Ok(())
}

fn classify_paths(config: &PipelineConfig, paths: &[PathBuf]) {
    let classifier = config.classifier();
    for path in paths {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = classifier.classify(&extension);
        match classifier.language(&extension) {
            Some(language) => println!("{}\t{}\t{language}", path.display(), kind.as_str()),
            None => println!("{}\t{}", path.display(), kind.as_str()),
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
