// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Main entry point for the skillgate supply-chain and sandbox gateway.
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use skillgate::config::Config;
use skillgate::core::constants::sandbox as sandbox_consts;
use skillgate::core::models::ExecuteParams;
use skillgate::core::trust::parse_trust_anchors;
use skillgate::install::registry::DirRegistry;
use skillgate::install::Installer;
use skillgate::sandbox::supervisor::SandboxSupervisor;
use skillgate::sandbox::worker;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify and install a skill from the registry
    Install {
        /// Skill reference, `name` or `name@version`
        reference: String,
    },
    /// Execute an installed skill inside the sandbox
    Exec {
        /// Path to the installed skill directory
        skill_path: PathBuf,

        /// Entrypoint override (defaults to the manifest's entrypoint)
        #[arg(long)]
        entrypoint: Option<String>,

        /// Command name within the skill
        #[arg(long)]
        command: Option<String>,

        /// JSON payload passed to the skill
        #[arg(long)]
        payload: Option<String>,
    },
    /// Probe the sandbox worker round trip
    Healthcheck,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Worker mode bypasses the CLI: the supervisor re-executes this binary
    // with a single marker argument and passes policy via the environment.
    if std::env::args().nth(1).as_deref() == Some(sandbox_consts::WORKER_MODE) {
        init_tracing(&Config::from_env());
        std::process::exit(worker::run().await);
    }

    let cli = Cli::parse();
    install_panic_hook();

    let config = Config::from_env();
    init_tracing(&config);

    match cli.command {
        Commands::Install { reference } => {
            let anchors = match &config.trust_anchors_raw {
                Some(raw) => parse_trust_anchors(raw)?,
                None => Default::default(),
            };
            let registry = DirRegistry::new(&config.registry_root);
            let installer = Installer::new(&config.install_root, registry, anchors);
            let record = installer.install(&reference, &config.plan).await?;
            info!(skill = %reference, path = %record.install_path.display(), "install completed");
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Exec {
            skill_path,
            entrypoint,
            command,
            payload,
        } => {
            let payload = payload
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .map_err(|e| anyhow::anyhow!("invalid --payload JSON: {e}"))?;
            let supervisor = spawn_supervisor(&config)?;
            let result = supervisor
                .execute(ExecuteParams {
                    skill_path,
                    entrypoint,
                    command,
                    payload,
                })
                .await;
            supervisor.close().await;
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
        Commands::Healthcheck => {
            let supervisor = spawn_supervisor(&config)?;
            let result = supervisor.healthcheck().await;
            supervisor.close().await;
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
    }

    Ok(())
}

fn spawn_supervisor(config: &Config) -> anyhow::Result<SandboxSupervisor> {
    SandboxSupervisor::spawn(&config.sandbox)?.ok_or_else(|| {
        anyhow::anyhow!(
            "sandbox is disabled ({} = false)",
            skillgate::core::constants::config::ENV_SANDBOX_ENABLED
        )
    })
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("skillgate=debug,info"));

    // Stdout carries results and wire frames; diagnostics go to stderr.
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
