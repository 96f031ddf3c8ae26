use anyhow::Context;
use clap::Parser;

use provisioner::cli::{Cli, Commands};
use provisioner::client::LdClient;
use provisioner::config::{self, ProvisionConfig};
use provisioner::errors::AppError;
use provisioner::interrupt::Interrupt;
use provisioner::logging;
use provisioner::models::approval::{ApprovalAction, DesiredApprovals};
use provisioner::prompt::ConsolePrompter;
use provisioner::provision;
use provisioner::reconcile::Reconciler;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    if let Err(e) = run(args).await {
        let msg = format!("{:#}", e);
        tracing::error!(error = %msg, "run failed");
        eprintln!("Error: {}", msg);
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let settings = config::load()?;
    let log_file = logging::init(&settings.log_dir, args.command.name(), args.log_json)?;
    tracing::info!(log_file = %log_file.display(), command = args.command.name(), "starting");

    let client = LdClient::from_settings(&settings)?;
    let interrupt = Interrupt::new();
    interrupt.listen_for_ctrl_c();
    let mut prompter = ConsolePrompter::new(interrupt.clone());

    match args.command {
        Commands::Provision { config } => {
            let cfg = ProvisionConfig::load(&config)?;
            tracing::info!(project = %cfg.project.key, environments = cfg.environments.len(), "loaded provisioning config");

            match provision::run_provision(&client, &settings, &cfg, &mut prompter, &interrupt).await {
                Ok(report) => {
                    report.log_summary();
                    println!("{}", report);
                }
                Err(AppError::Cancelled) => println!("Exiting..."),
                Err(e) => return Err(e).context("provisioning failed"),
            }
        }
        Commands::ReconcileApprovals { settings: file, remove } => {
            let preset = if remove {
                Some(ApprovalAction::Remove)
            } else if let Some(path) = file {
                let desired = DesiredApprovals::load(&path)?
                    .with_template_fallback(settings.servicenow_template_id.as_deref());
                desired.validate()?;
                Some(ApprovalAction::Apply(desired))
            } else {
                None
            };

            let mut reconciler = Reconciler::new(&client, &settings, interrupt);
            match reconciler.run(&mut prompter, preset).await {
                Ok(()) | Err(AppError::Cancelled) => {}
                Err(e) => return Err(e).context("approval reconciliation aborted"),
            }
        }
    }

    tracing::info!(log_file = %log_file.display(), "done");
    Ok(())
}
