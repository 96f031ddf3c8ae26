//! Batch reconciliation of workflow approval settings across projects and
//! environments.

use tracing::{info, warn};

use crate::cache::ProjectCache;
use crate::client::{LdClient, PAGE_SIZE};
use crate::config::Settings;
use crate::errors::AppError;
use crate::interrupt::Interrupt;
use crate::models::approval::{plan_patch, ApprovalAction};
use crate::models::project::{Environment, Project};
use crate::models::report::{Outcome, Report};
use crate::prompt::{choose, confirm, input, parse_list, Prompter};
use crate::wizard;

/// One environment queued for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub project: String,
    pub environment: String,
    pub name: String,
}

impl Target {
    pub fn new(project: &str, env: &Environment) -> Self {
        Self {
            project: project.to_lowercase(),
            environment: env.key.to_lowercase(),
            name: env.name.clone(),
        }
    }
}

/// How environments are picked for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workflow {
    /// The same environment keys in every targeted project. `None` means all.
    Global(Option<Vec<String>>),
    /// Environments picked per project, each change confirmed.
    PerProject,
}

impl Workflow {
    fn confirms_each(&self) -> bool {
        matches!(self, Workflow::PerProject)
    }
}

/// Brings one environment in line with `action`: validate, fetch, compare,
/// optionally confirm, then PATCH only what differs and re-read the
/// environment to check the write took.
pub async fn reconcile_environment(
    client: &LdClient,
    p: &mut dyn Prompter,
    target: &Target,
    action: &ApprovalAction,
    confirm_change: bool,
) -> Result<Outcome, AppError> {
    action.validate()?;

    let env = client
        .get_environment(&target.project, &target.environment)
        .await?;
    let Some(patch) = plan_patch(&env, action)? else {
        let reason = match action {
            ApprovalAction::Apply(_) => "already configured",
            ApprovalAction::Remove => "no approval settings",
        };
        return Ok(Outcome::Skipped {
            reason: reason.to_string(),
        });
    };

    if confirm_change {
        p.say(&format!(
            "Environment {} in {}: {}?",
            target.name,
            target.project,
            action.describe()
        ));
        if !confirm(p, "Would you like to proceed", Some(false)).await? {
            return Ok(Outcome::Skipped {
                reason: "declined by user".to_string(),
            });
        }
    }

    client
        .patch_environment(&target.project, &target.environment, &patch)
        .await?;

    let after = client
        .get_environment(&target.project, &target.environment)
        .await?;
    if plan_patch(&after, action)?.is_some() {
        warn!(
            project = %target.project,
            environment = %target.environment,
            "approval settings still differ after update"
        );
        return Ok(Outcome::Error {
            detail: "update not verified: approval settings still differ after PATCH".to_string(),
        });
    }
    Ok(Outcome::Updated { note: None })
}

/// Runs every target in order. Per-item failures are recorded and the run
/// continues; a fatal error prints the partial report and is returned.
pub async fn run_worklist(
    client: &LdClient,
    p: &mut dyn Prompter,
    interrupt: &Interrupt,
    targets: &[Target],
    action: &ApprovalAction,
    confirm_each: bool,
) -> Result<Report, AppError> {
    let mut report = Report::default();
    process_targets(client, p, interrupt, targets, action, confirm_each, &mut report).await?;
    Ok(report)
}

async fn process_targets(
    client: &LdClient,
    p: &mut dyn Prompter,
    interrupt: &Interrupt,
    targets: &[Target],
    action: &ApprovalAction,
    confirm_each: bool,
    report: &mut Report,
) -> Result<(), AppError> {
    for target in targets {
        if interrupt.is_triggered() {
            warn!("interrupted, stopping before {}/{}", target.project, target.environment);
            report.cancelled = true;
            break;
        }
        info!(project = %target.project, environment = %target.environment, "processing environment");

        match reconcile_environment(client, p, target, action, confirm_each).await {
            Ok(outcome) => report.record(&target.project, Some(target.environment.as_str()), outcome),
            Err(AppError::Cancelled) => {
                report.cancelled = true;
                break;
            }
            Err(e) => {
                report.record(
                    &target.project,
                    Some(target.environment.as_str()),
                    Outcome::Error {
                        detail: e.detail(),
                    },
                );
                if e.is_fatal() {
                    return Err(abort(p, report, e));
                }
            }
        }
    }
    Ok(())
}

fn abort(p: &mut dyn Prompter, report: &Report, err: AppError) -> AppError {
    report.log_summary();
    p.say(&report.to_string());
    p.say(&format!("Aborting: {}", err));
    err
}

/// Interactive driver: owns the project cache and loops over batches until
/// the user is done.
pub struct Reconciler<'a> {
    client: &'a LdClient,
    settings: &'a Settings,
    cache: ProjectCache,
    interrupt: Interrupt,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a LdClient, settings: &'a Settings, interrupt: Interrupt) -> Self {
        Self {
            client,
            settings,
            cache: ProjectCache::new(),
            interrupt,
        }
    }

    /// `preset` skips the action menu (settings file or `--remove`).
    pub async fn run(&mut self, p: &mut dyn Prompter, preset: Option<ApprovalAction>) -> Result<(), AppError> {
        let mut refresh = false;
        loop {
            let report = match self.run_batch(p, preset.as_ref(), refresh).await {
                Ok(report) => report,
                Err(AppError::Cancelled) => {
                    p.say("Exiting...");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            report.log_summary();
            p.say(&report.to_string());
            if report.cancelled || self.interrupt.is_triggered() {
                return Ok(());
            }

            let again = match confirm(p, "Would you like to run another batch?", Some(false)).await {
                Ok(again) => again,
                Err(AppError::Cancelled) => false,
                Err(e) => return Err(e),
            };
            if !again {
                return Ok(());
            }
            refresh = confirm(p, "Refresh the project list from LaunchDarkly?", Some(false)).await?;
        }
    }

    /// One pass through action, scope, environments and the worklist.
    /// `Err(Cancelled)` means the user quit before anything was recorded.
    pub async fn run_batch(
        &mut self,
        p: &mut dyn Prompter,
        preset: Option<&ApprovalAction>,
        refresh: bool,
    ) -> Result<Report, AppError> {
        let action = match preset {
            Some(action) => action.clone(),
            None => self.select_action(p).await?,
        };
        action.validate()?;

        let client = self.client;
        if refresh {
            self.cache.invalidate();
        }
        if self.cache.is_populated() {
            let age = self.cache.age_secs().unwrap_or_default();
            p.say(&format!("Using cached project list ({}s old)", age));
        }
        let projects = self.cache.get(client).await?.to_vec();
        if projects.is_empty() {
            p.say("No projects found");
            return Ok(Report::default());
        }
        p.say(&format!("Found {} projects", projects.len()));

        let workflow = select_workflow(p).await?;
        let scope = if matches!(workflow, Workflow::PerProject) {
            select_projects(p, &projects).await?
        } else {
            let all = choose(
                p,
                "How would you like to proceed with projects?",
                &["Process all projects", "Select specific projects"],
            )
            .await?;
            if all == 0 {
                projects
            } else {
                select_projects(p, &projects).await?
            }
        };

        let mut report = Report::default();
        let targets = match self.collect_targets(p, &scope, &workflow, &mut report).await {
            Ok(targets) => targets,
            Err(AppError::Cancelled) => {
                report.cancelled = true;
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        info!(targets = targets.len(), action = action.describe(), "starting worklist");
        process_targets(
            client,
            p,
            &self.interrupt,
            &targets,
            &action,
            workflow.confirms_each(),
            &mut report,
        )
        .await?;
        Ok(report)
    }

    async fn select_action(&self, p: &mut dyn Prompter) -> Result<ApprovalAction, AppError> {
        loop {
            let choice = choose(
                p,
                "What action would you like to take?",
                &["Add/update workflow approvals", "Remove workflow approvals"],
            )
            .await?;
            if choice == 1 {
                return Ok(ApprovalAction::Remove);
            }
            let template = self.settings.servicenow_template_id.as_deref();
            match wizard::configure_approvals(p, None, template).await? {
                Some(desired) => return Ok(ApprovalAction::Apply(desired)),
                None => p.say("No approval settings chosen."),
            }
        }
    }

    /// Lists each project's environments and narrows them per `workflow`.
    /// Listing failures are recorded against the project and skipped.
    async fn collect_targets(
        &self,
        p: &mut dyn Prompter,
        projects: &[Project],
        workflow: &Workflow,
        report: &mut Report,
    ) -> Result<Vec<Target>, AppError> {
        let mut targets = Vec::new();
        for project in projects {
            if self.interrupt.is_triggered() {
                return Err(AppError::Cancelled);
            }
            let environments = match self.client.list_environments(&project.key).await {
                Ok(envs) => envs,
                Err(e) => {
                    report.record(&project.key, None, Outcome::Error { detail: e.detail() });
                    if e.is_fatal() {
                        return Err(abort(p, report, e));
                    }
                    continue;
                }
            };

            let selected = match workflow {
                Workflow::Global(keys) => filter_environments(environments, keys.as_deref()),
                Workflow::PerProject => {
                    p.say(&format!("Selecting environments for {}", project.name));
                    select_environments(p, environments).await?
                }
            };
            if selected.is_empty() {
                info!(project = %project.key, "no matching environments");
                continue;
            }
            targets.extend(selected.iter().map(|env| Target::new(&project.key, env)));
        }
        Ok(targets)
    }
}

async fn select_workflow(p: &mut dyn Prompter) -> Result<Workflow, AppError> {
    let choice = choose(
        p,
        "How would you like to proceed?",
        &[
            "Update specific environments across all/selected projects",
            "Select environments individually for each project",
        ],
    )
    .await?;
    if choice == 1 {
        return Ok(Workflow::PerProject);
    }
    let raw = input(p, "Enter environment keys (comma-separated) or 'all'", Some("all")).await?;
    Ok(Workflow::Global(parse_env_keys(&raw)))
}

/// `all` selects every environment; otherwise a lowercased key list.
pub fn parse_env_keys(raw: &str) -> Option<Vec<String>> {
    if raw.trim().eq_ignore_ascii_case("all") {
        return None;
    }
    Some(parse_list(raw).into_iter().map(|k| k.to_lowercase()).collect())
}

/// Keeps the environments whose key is in `keys`; `None` keeps all.
pub fn filter_environments(environments: Vec<Environment>, keys: Option<&[String]>) -> Vec<Environment> {
    match keys {
        None => environments,
        Some(keys) => environments
            .into_iter()
            .filter(|env| keys.iter().any(|k| k.eq_ignore_ascii_case(&env.key)))
            .collect(),
    }
}

/// Pages through `projects` and returns the ones the user picked, in
/// selection order.
pub async fn select_projects(p: &mut dyn Prompter, projects: &[Project]) -> Result<Vec<Project>, AppError> {
    let total = projects.len();
    let mut page = 0;
    let mut selected: Vec<usize> = Vec::new();

    loop {
        let start = page * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(total);
        p.say(&format!("Projects (showing {}-{} of {}):", start + 1, end, total));
        for (i, project) in projects[start..end].iter().enumerate() {
            let mark = if selected.contains(&(start + i)) { "*" } else { " " };
            p.say(&format!("{}{}. {} ({})", mark, start + i + 1, project.name, project.key));
        }
        p.say("n - next page | p - previous page | s - select projects | d - done selecting | q - quit");

        let choice = p.ask("Enter your choice:").await?.to_lowercase();
        match choice.as_str() {
            "q" => return Err(AppError::Cancelled),
            "n" if end < total => page += 1,
            "n" => p.say("Already at last page"),
            "p" if page > 0 => page -= 1,
            "p" => p.say("Already at first page"),
            "s" => {
                let raw = p.ask("Enter project numbers to select (comma-separated):").await?;
                match parse_numbers(&raw, total) {
                    Some(numbers) => {
                        for n in numbers {
                            if !selected.contains(&n) {
                                selected.push(n);
                            }
                        }
                        p.say(&format!("Currently selected: {} projects", selected.len()));
                    }
                    None => p.say("Please enter valid numbers"),
                }
            }
            "d" if !selected.is_empty() => {
                return Ok(selected.iter().map(|&i| projects[i].clone()).collect());
            }
            "d" => p.say("Please select at least one project"),
            _ => p.say("Invalid choice"),
        }
    }
}

/// Numbered environment picker: numbers accumulate, `all` takes every
/// environment, `done` finishes.
pub async fn select_environments(
    p: &mut dyn Prompter,
    environments: Vec<Environment>,
) -> Result<Vec<Environment>, AppError> {
    if environments.is_empty() {
        return Ok(environments);
    }
    p.say("Available environments:");
    for (i, env) in environments.iter().enumerate() {
        p.say(&format!("{}. {} ({})", i + 1, env.name, env.key));
    }

    let mut selected: Vec<usize> = Vec::new();
    loop {
        let reply = p
            .ask("Enter environment numbers to select (comma-separated), or 'all'/'done':")
            .await?
            .to_lowercase();
        match reply.as_str() {
            "all" => return Ok(environments),
            "done" if !selected.is_empty() => {
                return Ok(selected.iter().map(|&i| environments[i].clone()).collect());
            }
            "done" => p.say("Please select at least one environment"),
            _ => match parse_numbers(&reply, environments.len()) {
                Some(numbers) => {
                    for n in numbers {
                        if !selected.contains(&n) {
                            selected.push(n);
                        }
                    }
                    let names: Vec<&str> = selected.iter().map(|&i| environments[i].name.as_str()).collect();
                    p.say(&format!("Currently selected: {}", names.join(", ")));
                }
                None => p.say("Please enter valid numbers"),
            },
        }
    }
}

/// 1-based numbers to 0-based indices; out-of-range entries are dropped.
fn parse_numbers(raw: &str, len: usize) -> Option<Vec<usize>> {
    let mut out = Vec::new();
    for part in parse_list(raw) {
        let n: usize = part.parse().ok()?;
        if (1..=len).contains(&n) {
            out.push(n - 1);
        }
    }
    Some(out)
}
