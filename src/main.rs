mod env;
mod gcloud;
mod localssd;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::localssd::{LocalSsdSpec, NODE_POOL_NAME};
use e2e_framework::{CloudConfig, E2eSpec, Runner, SpecOutcome, SpecResult, TestContext};

#[derive(Parser)]
#[command(name = "gke-e2e")]
#[command(about = "End-to-end tests for GKE node features", long_about = None)]
struct Cli {
    /// Dotenv file to load before reading GKE_E2E_* variables (default: ./.env if present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registered specs
    Run(RunArgs),

    /// List the registered specs
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    context: ContextArgs,

    /// Only run specs whose name contains this string
    #[arg(long, env = "GKE_E2E_FOCUS")]
    focus: Option<String>,

    /// Leave out specs whose name contains this string
    #[arg(long, env = "GKE_E2E_SKIP")]
    skip: Option<String>,

    /// Name of the node pool to provision
    #[arg(long, env = "GKE_E2E_NODE_POOL", default_value = NODE_POOL_NAME)]
    node_pool: String,

    /// Delete the provisioned node pool after the spec
    #[arg(long, env = "GKE_E2E_DELETE_NODE_POOL")]
    delete_node_pool: bool,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,
}

#[derive(Args)]
struct ContextArgs {
    /// Cloud provider of the cluster under test (gke, gce, local, ...)
    #[arg(long, env = "GKE_E2E_PROVIDER")]
    provider: Option<String>,

    /// Cluster name
    #[arg(long, env = "GKE_E2E_CLUSTER", default_value = "")]
    cluster: String,

    /// GCP project (defaults to the gcloud configuration)
    #[arg(long, env = "GKE_E2E_PROJECT")]
    project: Option<String>,

    /// Compute zone (defaults to the gcloud configuration)
    #[arg(long, env = "GKE_E2E_ZONE")]
    zone: Option<String>,

    /// Kubeconfig context (defaults to the current context)
    #[arg(long, env = "GKE_E2E_KUBE_CONTEXT")]
    context: Option<String>,

    /// Path to the gcloud binary
    #[arg(long, env = "GKE_E2E_GCLOUD", default_value = "gcloud")]
    gcloud: String,

    /// How long a test pod may take to complete
    #[arg(long, env = "GKE_E2E_POD_START_TIMEOUT", default_value = "5m")]
    pod_start_timeout: humantime::Duration,

    /// Upper bound for a whole spec
    #[arg(long, env = "GKE_E2E_SPEC_TIMEOUT", default_value = "30m")]
    spec_timeout: humantime::Duration,

    /// Delete the test namespace after each spec
    #[arg(long, env = "GKE_E2E_DELETE_NAMESPACE", default_value_t = true, action = clap::ArgAction::Set)]
    delete_namespace: bool,
}

impl From<ContextArgs> for TestContext {
    fn from(args: ContextArgs) -> Self {
        TestContext {
            provider: args.provider.unwrap_or_default(),
            cloud: CloudConfig {
                project: args.project,
                zone: args.zone,
                cluster: args.cluster,
            },
            kube_context: args.context,
            delete_namespace: args.delete_namespace,
            pod_start_timeout: args.pod_start_timeout.into(),
            spec_timeout: args.spec_timeout.into(),
            gcloud_bin: args.gcloud,
        }
    }
}

/// JSON output for `list --format json`
#[derive(Serialize)]
struct ListOutput {
    specs: Vec<SpecInfo>,
}

#[derive(Serialize)]
struct SpecInfo {
    name: String,
    base_name: String,
}

/// JSON output for `run --format json`
#[derive(Serialize)]
struct RunOutput<'a> {
    provider: &'a str,
    results: &'a [SpecResult],
}

fn registered_specs(node_pool: &str, delete_node_pool: bool) -> Vec<Box<dyn E2eSpec>> {
    vec![Box::new(LocalSsdSpec::new(node_pool, delete_node_pool))]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    // env vars from the file feed clap's `env` fallbacks, so parse again
    let cli = match env::load_dotenv(cli.env_file.as_deref()) {
        Ok(true) => Cli::parse(),
        Ok(false) => cli,
        Err(e) => anyhow::bail!("Failed to load env file: {}", e),
    };

    match cli.command {
        Commands::Run(args) => {
            if !matches!(args.format.as_str(), "text" | "json") {
                anyhow::bail!("Unknown format: {}. Use text or json", args.format);
            }

            let specs = registered_specs(&args.node_pool, args.delete_node_pool);
            let runner = Runner::new(args.context.into())
                .focus(args.focus)
                .skip(args.skip);
            let results = runner.run(&specs).await;

            if args.format == "json" {
                let output = RunOutput {
                    provider: &runner.context().provider,
                    results: &results,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_results(&results);
            }

            if results.iter().any(SpecResult::failed) {
                std::process::exit(1);
            }
        }

        Commands::List { format } => {
            let specs = registered_specs(NODE_POOL_NAME, false);
            match format.as_str() {
                "json" => {
                    let output = ListOutput {
                        specs: specs
                            .iter()
                            .map(|s| SpecInfo {
                                name: s.name(),
                                base_name: s.base_name().to_string(),
                            })
                            .collect(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                "text" => {
                    println!("{}", "Specs:".bold());
                    for spec in &specs {
                        println!("  {} {}", "•".cyan(), spec.name());
                    }
                }
                _ => anyhow::bail!("Unknown format: {}. Use text or json", format),
            }
        }
    }

    Ok(())
}

fn print_results(results: &[SpecResult]) {
    if results.is_empty() {
        println!("No specs matched");
        return;
    }

    println!("\n{}", "Results:".bold());
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for result in results {
        let elapsed = humantime::format_duration(std::time::Duration::from_secs(result.elapsed.as_secs()))
            .to_string()
            .dimmed();
        match &result.outcome {
            SpecOutcome::Passed => {
                passed += 1;
                println!("  {} {} {}", "✓".green(), result.name, elapsed);
            }
            SpecOutcome::Failed(msg) => {
                failed += 1;
                println!("  {} {} {}", "✗".red(), result.name, elapsed);
                for line in msg.lines() {
                    println!("      {}", line);
                }
            }
            SpecOutcome::Skipped(reason) => {
                skipped += 1;
                println!("  {} {}", "○".yellow(), result.name);
                println!("      {}", reason.dimmed());
            }
        }
    }
    println!("\n{} passed, {} failed, {} skipped", passed, failed, skipped);
}
