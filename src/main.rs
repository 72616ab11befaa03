use std::path::PathBuf;

use clap::Parser;
use procsweep::{
    cleaner::RetentionCleaner,
    config::SweeperConfig,
    engine::{EngineError, EngineServices},
    observability,
    retention::{log_run_result, run_retention, start_retention_worker},
};
use serde::Serialize;

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "procsweep.toml";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Retention cleanup for business-process engines",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./procsweep.toml if it exists,
    /// otherwise built-in defaults are used)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log the deletes that would happen without sending them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// List the definition ids registered under a process key
    Definitions {
        /// Process key (e.g. "loan-approval")
        process_key: String,
    },
    /// Delete every live instance of every definition under a process key
    PurgeKey {
        /// Process key (e.g. "loan-approval")
        process_key: String,
    },
    /// Delete the instances behind tasks older than the retention period
    PurgeStale {
        /// Process definition id (e.g. "loan-approval:3")
        process_definition_id: String,
        /// Retention period in days; without it every task qualifies
        #[arg(long)]
        days: Option<u32>,
    },
    /// Delete a single process instance
    Delete {
        /// Process instance id
        instance_id: String,
    },
    /// Deploy a workflow resource (resolved against engine.resource_root)
    Deploy {
        /// Resource path (e.g. "loan-approval.bpmn")
        resource: PathBuf,
    },
    /// Delete a deployment together with all of its instances
    Drop {
        /// Deployment id
        deployment_id: String,
        /// Confirm the cascading delete
        #[arg(long)]
        yes: bool,
    },
    /// Apply the configured retention policies
    Run {
        /// Run every policy once and exit instead of looping
        #[arg(long)]
        once: bool,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print enabled compile-time features
    Features,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Schema { output } => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Command::Features => run_features(),
        command => {
            let config = load_config(args.config.as_deref());
            if let Err(e) = observability::init_tracing(&config.observability) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            run_command(command, config, args.dry_run).await;
        }
    }
}

/// Resolve the config file path.
///
/// An explicit path must exist. Without one, `procsweep.toml` in the working
/// directory is used when present.
fn resolve_config_path(explicit_path: Option<&str>) -> Result<Option<PathBuf>, String> {
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    Ok(None)
}

fn load_config(explicit_path: Option<&str>) -> SweeperConfig {
    let config_path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let Some(config_path) = config_path else {
        return SweeperConfig::default();
    };

    match SweeperConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    }
}

async fn run_command(command: Command, config: SweeperConfig, dry_run_flag: bool) {
    let services = match EngineServices::from_config(&config.engine) {
        Ok(services) => services,
        Err(e) => fail("Failed to create engine client", e),
    };
    let dry_run = dry_run_flag || config.retention.safety.dry_run;
    let cleaner = RetentionCleaner::new(services).with_dry_run(dry_run);

    tracing::debug!(
        base_url = %config.engine.base_url,
        dry_run = dry_run,
        "Engine client ready"
    );

    match command {
        Command::Definitions { process_key } => {
            match cleaner.resolve_definition_ids(&process_key).await {
                Ok(ids) => {
                    for id in ids {
                        println!("{id}");
                    }
                }
                Err(e) => fail("Failed to resolve process definitions", e),
            }
        }
        Command::PurgeKey { process_key } => {
            match cleaner.delete_all_instances_for_key(&process_key).await {
                Ok(report) => finish(&report, report.has_failures()),
                Err(e) => fail("Failed to purge process instances", e),
            }
        }
        Command::PurgeStale {
            process_definition_id,
            days,
        } => match cleaner
            .delete_stale_instances(&process_definition_id, days)
            .await
        {
            Ok(report) => finish(&report, report.has_failures()),
            Err(e) => fail("Failed to purge stale process instances", e),
        },
        Command::Delete { instance_id } => {
            let outcome = cleaner.delete_instance(&instance_id).await;
            finish(&outcome, outcome.is_failure());
        }
        Command::Deploy { resource } => match cleaner.deploy_workflow(&resource).await {
            Ok(deployment) => {
                tracing::info!(
                    deployment_id = %deployment.id,
                    resource = %resource.display(),
                    "Workflow deployed"
                );
                finish(&deployment, false);
            }
            Err(e) => fail("Failed to deploy workflow", e),
        },
        Command::Drop { deployment_id, yes } => {
            if !yes {
                eprintln!(
                    "Error: dropping deployment {deployment_id} deletes all of its instances; \
                     pass --yes to confirm"
                );
                std::process::exit(1);
            }
            if dry_run {
                tracing::info!(
                    deployment_id = %deployment_id,
                    "DRY RUN: Would drop deployment"
                );
                return;
            }
            match cleaner.drop_workflow(&deployment_id).await {
                Ok(()) => tracing::info!(deployment_id = %deployment_id, "Deployment dropped"),
                Err(e) => fail("Failed to drop deployment", e),
            }
        }
        Command::Run { once: true } => {
            let result = run_retention(&cleaner, &config.retention).await;
            log_run_result(&result, dry_run);
            finish(&result, result.has_failures());
        }
        Command::Run { once: false } => {
            tokio::select! {
                _ = start_retention_worker(cleaner, config.retention) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal, stopping retention worker");
                }
            }
        }
        Command::Schema { .. } | Command::Features => {}
    }
}

/// Print `value` as JSON on stdout, exiting with status 2 if `failed`.
fn finish<T: Serialize>(value: &T, failed: bool) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize result: {e}"),
    }
    if failed {
        std::process::exit(2);
    }
}

fn fail(context: &str, error: EngineError) -> ! {
    tracing::error!(error = %error, "{}", context);
    eprintln!("Error: {context}: {error}");
    std::process::exit(1);
}

/// Export the configuration JSON schema to file or stdout.
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match procsweep::config::SweeperConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error: Failed to serialize JSON schema: {e}");
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Error: Failed to write to {path}: {e}");
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {path}");
        }
        None => {
            println!("{content}");
        }
    }
}

/// Print enabled compile-time features.
fn run_features() {
    let version = env!("CARGO_PKG_VERSION");

    let features: &[(&str, bool)] = &[
        ("cli", cfg!(feature = "cli")),
        ("json-schema", cfg!(feature = "json-schema")),
    ];

    println!("procsweep v{version}\n");
    println!("Features:");
    for (name, enabled) in features {
        let mark = if *enabled { "+" } else { "-" };
        println!("  {mark} {name}");
    }
}
