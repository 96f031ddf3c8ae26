//! Project and environment provisioning from a YAML document.

use tracing::{info, warn};

use crate::client::LdClient;
use crate::config::{ProvisionConfig, Settings};
use crate::errors::AppError;
use crate::interrupt::Interrupt;
use crate::models::approval::{ApprovalAction, ApprovalKind};
use crate::models::project::{Environment, Project, DEFAULT_TEST_ENVIRONMENT};
use crate::models::report::{Outcome, Report};
use crate::prompt::{confirm, Prompter};
use crate::reconcile::{reconcile_environment, Target};
use crate::wizard;

pub struct Provisioner<'a> {
    client: &'a LdClient,
}

impl<'a> Provisioner<'a> {
    pub fn new(client: &'a LdClient) -> Self {
        Self { client }
    }

    /// Creates the project, or returns the existing one with the same key.
    pub async fn create_project(&self, key: &str, name: &str, tags: &[String]) -> Result<Project, AppError> {
        let key = key.to_lowercase();
        if let Some(existing) = self.client.get_project(&key).await? {
            info!(project = %key, "project already exists, reusing it");
            return Ok(existing);
        }

        let project = Project {
            key: key.clone(),
            name: name.to_string(),
            tags: tags.to_vec(),
        };
        match self.client.create_project(&project).await {
            Ok(created) => {
                info!(project = %key, "project created");
                Ok(created)
            }
            // created concurrently between the lookup and the POST
            Err(e) if e.status() == Some(409) => self
                .client
                .get_project(&key)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("project {} reported as existing but not found", key))
                }),
            Err(e) => Err(e),
        }
    }

    /// Creates or updates `env` in `project`. The built-in environments are
    /// always updated in place.
    pub async fn configure_environment(&self, project: &str, env: &Environment) -> Result<Environment, AppError> {
        if env.is_builtin() {
            info!(project, environment = %env.key, "updating built-in environment");
            return self.update_environment(project, env).await;
        }

        match self.client.create_environment(project, env).await {
            Ok(created) => {
                info!(project, environment = %env.key, "environment created");
                Ok(created)
            }
            Err(e) if e.status() == Some(409) => {
                info!(project, environment = %env.key, "environment exists, updating in place");
                self.update_environment(project, env).await
            }
            Err(e) => Err(e),
        }
    }

    async fn update_environment(&self, project: &str, env: &Environment) -> Result<Environment, AppError> {
        self.client
            .patch_environment(project, &env.key, &env.update_operations())
            .await
    }

    /// Deletes the auto-created `test` environment when `remove` is set.
    /// Returns whether a deletion happened; a missing environment is fine.
    pub async fn maybe_remove_test_environment(&self, project: &str, remove: bool) -> Result<bool, AppError> {
        if !remove {
            return Ok(false);
        }
        match self.client.delete_environment(project, DEFAULT_TEST_ENVIRONMENT).await {
            Ok(()) => {
                info!(project, "removed default test environment");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                info!(project, "default test environment already absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Full provisioning run: project, test-environment cleanup, environments,
/// declared approvals, then optional interactive approval setup. An interrupt
/// stops the run before the next environment and marks the report cancelled.
pub async fn run_provision(
    client: &LdClient,
    settings: &Settings,
    config: &ProvisionConfig,
    p: &mut dyn Prompter,
    interrupt: &Interrupt,
) -> Result<Report, AppError> {
    let provisioner = Provisioner::new(client);
    let spec = &config.project;

    let project = provisioner
        .create_project(&spec.key, &spec.name, &spec.tags)
        .await?;
    p.say(&format!("Project ready: {} ({})", project.name, project.key));

    if let Err(e) = provisioner
        .maybe_remove_test_environment(&project.key, config.defaults.remove_default_test_env)
        .await
    {
        if e.is_fatal() {
            return Err(e);
        }
        warn!(project = %project.key, error = %e, "could not remove default test environment");
        p.say(&format!("Warning: could not remove test environment: {}", e));
    }

    let template = settings.servicenow_template_id.as_deref();
    let mut report = Report::default();
    let mut configured = Vec::new();

    for env_spec in &config.environments {
        let env = env_spec.resolve(&config.defaults);
        if interrupt.is_triggered() {
            warn!(project = %project.key, "interrupted, stopping before environment {}", env.key);
            report.cancelled = true;
            return Ok(report);
        }
        if let Err(e) = provisioner.configure_environment(&project.key, &env).await {
            let fatal = e.is_fatal();
            report.record(&project.key, Some(env.key.as_str()), Outcome::Error { detail: e.detail() });
            if fatal {
                return Err(e);
            }
            continue;
        }

        let outcome = match &env_spec.approvals {
            None => Outcome::Updated { note: None },
            Some(desired) => {
                let action = ApprovalAction::Apply(desired.clone().with_template_fallback(template));
                let target = Target::new(&project.key, &env);
                match reconcile_environment(client, p, &target, &action, false).await {
                    Ok(Outcome::Updated { .. }) => Outcome::Updated {
                        note: Some("approvals updated".to_string()),
                    },
                    Ok(Outcome::Skipped { reason }) => Outcome::Updated {
                        note: Some(format!("approvals {}", reason)),
                    },
                    Ok(Outcome::Error { detail }) => Outcome::Error {
                        detail: format!("approval settings: {}", detail),
                    },
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => Outcome::Error {
                        detail: format!("approval settings: {}", e.detail()),
                    },
                }
            }
        };
        report.record(&project.key, Some(env.key.as_str()), outcome);
        configured.push(env);
    }

    if interrupt.is_triggered() {
        report.cancelled = true;
        return Ok(report);
    }
    if configured.is_empty() {
        return Ok(report);
    }
    match configure_approvals_interactively(client, settings, &project, &configured, p, &mut report).await {
        Ok(()) => {}
        Err(AppError::Cancelled) => report.cancelled = true,
        Err(e) => return Err(e),
    }
    Ok(report)
}

async fn configure_approvals_interactively(
    client: &LdClient,
    settings: &Settings,
    project: &Project,
    environments: &[Environment],
    p: &mut dyn Prompter,
    report: &mut Report,
) -> Result<(), AppError> {
    if !confirm(
        p,
        "Would you like to configure workflow approvals for these environments?",
        Some(false),
    )
    .await?
    {
        return Ok(());
    }

    let template = settings.servicenow_template_id.as_deref();
    for env in environments {
        if !confirm(p, &format!("Configure approvals for environment '{}'?", env.name), Some(false)).await? {
            continue;
        }
        let current = match client.get_environment(&project.key, &env.key).await {
            Ok(current) => current,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                report.record(&project.key, Some(env.key.as_str()), Outcome::Error { detail: e.detail() });
                continue;
            }
        };
        let Some(desired) =
            wizard::configure_approvals(p, current.approvals_for(ApprovalKind::Flag), template).await?
        else {
            continue;
        };

        let target = Target::new(&project.key, env);
        let action = ApprovalAction::Apply(desired);
        let outcome = match reconcile_environment(client, p, &target, &action, false).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => Outcome::Error {
                detail: format!("approval settings: {}", e.detail()),
            },
        };
        report.record(&project.key, Some(env.key.as_str()), outcome);
    }
    Ok(())
}
