//! kubectl-smart: read-only diagnostic plugin for Kubernetes
//!
//! Three commands: `diag` (root-cause analysis of one workload), `graph`
//! (dependency tree with health glyphs), and `top` (capacity and
//! certificate outlook for a namespace). Exit codes: 0 clean, 1 warnings
//! (`diag` only), 2 criticals or any fatal error.

mod kubectl;
mod watch;

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kubectl_smart_core::config::{Config, OutputFormat};
use kubectl_smart_core::error::SmartError;
use kubectl_smart_core::models::ResourceKind;
use kubectl_smart_core::render::{JsonRenderer, TextRenderer};
use kubectl_smart_core::{Pipeline, Subject};

use kubectl::KubectlClient;

#[derive(Parser)]
#[command(name = "kubectl-smart", version)]
#[command(about = "Read-only Kubernetes diagnostics: root causes, dependency graphs, forecasts")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Re-run the command on an interval and report changes
    #[arg(long, global = true)]
    watch: bool,

    /// Watch interval in seconds
    #[arg(long, global = true, default_value_t = 5.0)]
    interval: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Root-cause analysis of a single workload
    Diag {
        /// Resource kind (pod, deploy, sts, ds, rs, job, svc, ...)
        kind: String,
        /// Resource name
        name: String,
        #[arg(short = 'n', long)]
        namespace: Option<String>,
        /// kubeconfig context
        #[arg(long)]
        context: Option<String>,
        #[arg(short = 'o', long)]
        output: Option<OutputArg>,
    },

    /// Dependency tree around a resource
    Graph {
        /// Resource kind (pod, deploy, sts, ds, rs, job, svc, ...)
        kind: String,
        /// Resource name
        name: String,
        #[arg(short = 'n', long)]
        namespace: Option<String>,
        #[arg(long)]
        context: Option<String>,
        /// Follow what the subject depends on
        #[arg(long)]
        upstream: bool,
        /// Follow what depends on the subject (default)
        #[arg(long)]
        downstream: bool,
        #[arg(short = 'o', long)]
        output: Option<OutputArg>,
    },

    /// Capacity and certificate outlook for a namespace
    Top {
        /// Namespace to analyze
        namespace: String,
        /// Forecast horizon in hours (1..=168)
        #[arg(long)]
        horizon: Option<u32>,
        #[arg(long)]
        context: Option<String>,
        #[arg(short = 'o', long)]
        output: Option<OutputArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputArg {
    Text,
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(value: OutputArg) -> Self {
        match value {
            OutputArg::Text => OutputFormat::Text,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

fn init_tracing(debug_flag: bool, configured_level: &str) {
    let default = if debug_flag { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "kubectl_smart={default},kubectl_smart_core={default}"
        ))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(cli.debug, &config.log_level);

    if config.colors_enabled == Some(false) {
        colored::control::set_override(false);
    }

    // Ctrl-C cancels in-flight work and exits 2
    tokio::select! {
        code = run_command(&cli, &config) => code,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("cancelled");
            ExitCode::from(2)
        }
    }
}

async fn run_command(cli: &Cli, config: &Config) -> ExitCode {
    match dispatch(cli, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            report_fatal(&e, cli.debug);
            ExitCode::from(2)
        }
    }
}

async fn dispatch(cli: &Cli, config: &Config) -> Result<u8, SmartError> {
    match &cli.command {
        Commands::Diag {
            kind,
            name,
            namespace,
            context,
            output,
        } => {
            let subject = subject_for(kind, name, namespace.clone(), context.clone());
            let pipeline = build_pipeline(context.clone(), config)?;
            let format = resolve_format(*output, config);

            if cli.watch {
                return watch::watch_diag(&pipeline, &subject, cli.interval).await;
            }

            let report = pipeline.diag(&subject).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", JsonRenderer::new(Utc::now()).render_diag(&report))
                }
                OutputFormat::Text => print!("{}", text_renderer(config).render_diag(&report)),
            }
            Ok(report.exit_code() as u8)
        }

        Commands::Graph {
            kind,
            name,
            namespace,
            context,
            upstream,
            downstream,
            output,
        } => {
            let subject = subject_for(kind, name, namespace.clone(), context.clone());
            let pipeline = build_pipeline(context.clone(), config)?;
            let format = resolve_format(*output, config);
            let (up, down) = (*upstream, *downstream);

            if cli.watch {
                let (pipeline, subject) = (&pipeline, &subject);
                return watch::watch_reprint(cli.interval, move || async move {
                    let report = pipeline.graph(subject, up, down).await?;
                    Ok(render_graph(&report, format, config))
                })
                .await;
            }

            let report = pipeline.graph(&subject, up, down).await?;
            print!("{}", render_graph(&report, format, config));
            Ok(0)
        }

        Commands::Top {
            namespace,
            horizon,
            context,
            output,
        } => {
            let pipeline = build_pipeline(context.clone(), config)?;
            let format = resolve_format(*output, config);
            let horizon = horizon.unwrap_or(config.default_horizon_hours);

            if cli.watch {
                let (pipeline, namespace, context) =
                    (&pipeline, namespace.as_str(), context.as_deref());
                return watch::watch_reprint(cli.interval, move || async move {
                    let report = pipeline.top(namespace, horizon, context).await?;
                    Ok(render_top(&report, format, config))
                })
                .await;
            }

            let report = pipeline.top(namespace, horizon, context.as_deref()).await?;
            print!("{}", render_top(&report, format, config));
            Ok(0)
        }
    }
}

fn subject_for(
    kind: &str,
    name: &str,
    namespace: Option<String>,
    context: Option<String>,
) -> Subject {
    let mut subject = Subject::new(ResourceKind::parse(kind), name, namespace);
    subject.context = context;
    subject
}

fn build_pipeline(context: Option<String>, config: &Config) -> Result<Pipeline, SmartError> {
    let client = Arc::new(KubectlClient::new(context));
    Pipeline::new(client, config.clone())
}

fn resolve_format(flag: Option<OutputArg>, config: &Config) -> OutputFormat {
    flag.map(OutputFormat::from).unwrap_or(config.default_format)
}

fn text_renderer(config: &Config) -> TextRenderer {
    TextRenderer::from_env(config.colors_enabled, config.max_display_issues)
}

fn render_graph(
    report: &kubectl_smart_core::GraphReport,
    format: OutputFormat,
    config: &Config,
) -> String {
    match format {
        OutputFormat::Json => format!("{}\n", JsonRenderer::new(Utc::now()).render_graph(report)),
        OutputFormat::Text => text_renderer(config).render_graph(report),
    }
}

fn render_top(
    report: &kubectl_smart_core::TopReport,
    format: OutputFormat,
    config: &Config,
) -> String {
    match format {
        OutputFormat::Json => format!("{}\n", JsonRenderer::new(Utc::now()).render_top(report)),
        OutputFormat::Text => text_renderer(config).render_top(report),
    }
}

fn report_fatal(error: &SmartError, debug_mode: bool) {
    eprintln!("error: {error}");
    if let Some(hint) = error.hint() {
        eprintln!("hint: {hint}");
    }
    if debug_mode {
        debug!(?error, "fatal error detail");
        eprintln!("debug: {error:?}");
    }
}
