//! End-to-end tests for provisioning and approval reconciliation against a
//! mocked LaunchDarkly API.
//!
//! Every test starts its own `wiremock` server; no credentials or network
//! access are needed.

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use provisioner::client::LdClient;
use provisioner::config::Settings;
use provisioner::errors::AppError;
use provisioner::interrupt::Interrupt;
use provisioner::models::approval::{ApprovalAction, ApprovalKind, ApprovalSettings, DesiredApprovals};
use provisioner::prompt::{Prompter, ScriptedPrompter};
use provisioner::reconcile::Target;

fn settings(base_url: &str) -> Settings {
    Settings {
        api_key: "api-test-key".into(),
        base_url: base_url.into(),
        servicenow_template_id: None,
        log_dir: "logs".into(),
    }
}

fn env_json(key: &str, approvals: Option<Value>) -> Value {
    let mut env = json!({ "key": key, "name": key.to_uppercase(), "color": "7B42BC", "tags": [] });
    if let Some(doc) = approvals {
        env["approvalSettings"] = doc;
    }
    env
}

/// Serves `before` on the first GET of `env_path` and `after` on every later
/// one, so a write can be checked by re-reading the environment.
async fn mount_env_states(server: &MockServer, env_path: &str, before: Value, after: Value) {
    Mock::given(method("GET"))
        .and(path(env_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(before))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(env_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(after))
        .mount(server)
        .await;
}

fn flag_doc(desired: &DesiredApprovals) -> Value {
    desired.flags.document(ApprovalKind::Flag)
}

fn patch_ops(req: &Request) -> Vec<Value> {
    serde_json::from_slice(&req.body).unwrap_or_default()
}

fn native_flags(min: u8) -> DesiredApprovals {
    DesiredApprovals {
        flags: ApprovalSettings::native(min),
        segments: ApprovalSettings::unconfigured(),
    }
}

fn target(project: &str, env: &str) -> Target {
    Target {
        project: project.into(),
        environment: env.into(),
        name: env.to_uppercase(),
    }
}

mod provisioning_tests {
    use super::*;
    use provisioner::config::ProvisionConfig;
    use provisioner::provision::{run_provision, Provisioner};

    /// Running project creation twice creates the project once.
    #[tokio::test]
    async fn test_project_creation_is_idempotent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/demo-proj"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Unknown resource"})))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/demo-proj"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"key": "demo-proj", "name": "Demo Project"})),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects"))
            .and(body_partial_json(json!({
                "key": "demo-proj",
                "defaultClientSideAvailability": {"usingEnvironmentId": true, "usingMobileKey": false}
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"key": "demo-proj", "name": "Demo Project"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let provisioner = Provisioner::new(&client);
        let first = provisioner.create_project("Demo-Proj", "Demo Project", &[]).await.unwrap();
        let second = provisioner.create_project("Demo-Proj", "Demo Project", &[]).await.unwrap();
        assert_eq!(first, second);
    }

    /// Keys are lowercased on the wire while display names keep their case,
    /// and declared approvals are applied right after the environment.
    #[tokio::test]
    async fn test_provision_lowercases_keys_and_applies_declared_approvals() {
        let cfg = ProvisionConfig::from_yaml_str(
            r#"
project:
  key: Demo-Proj
  name: Demo Project
defaults:
  remove_default_test_env: true
environments:
  - key: Staging
    name: Staging
    approvals:
      flags:
        required: true
        minNumApprovals: 2
"#,
        )
        .unwrap();
        let declared = cfg.environments[0].approvals.clone().unwrap();

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/demo-proj"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects"))
            .and(body_partial_json(json!({"key": "demo-proj", "name": "Demo Project"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"key": "demo-proj", "name": "Demo Project"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/projects/demo-proj/environments/test"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/demo-proj/environments"))
            .and(body_partial_json(json!({"key": "staging", "name": "Staging", "color": "7B42BC"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(env_json("staging", None)))
            .expect(1)
            .mount(&mock_server)
            .await;
        mount_env_states(
            &mock_server,
            "/projects/demo-proj/environments/staging",
            env_json("staging", None),
            env_json("staging", Some(flag_doc(&declared))),
        )
        .await;
        Mock::given(method("PATCH"))
            .and(path("/projects/demo-proj/environments/staging"))
            .and(|req: &Request| {
                patch_ops(req).iter().any(|op| {
                    op["op"] == "add"
                        && op["path"] == "/approvalSettings"
                        && op["value"]["minNumApprovals"] == 2
                })
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("staging", None)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        // decline the interactive approval setup
        let mut p = ScriptedPrompter::new(["no"]);
        let report = run_provision(&client, &settings(&mock_server.uri()), &cfg, &mut p, &Interrupt::new())
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert_eq!(report.errored(), 0);
        assert_eq!(report.items[0].environment.as_deref(), Some("staging"));
        assert!(report.to_string().contains("approvals updated"));
    }

    /// Declared approvals that already match need no write, and the row
    /// says so.
    #[tokio::test]
    async fn test_declared_approvals_already_configured_are_reported() {
        let cfg = ProvisionConfig::from_yaml_str(
            r#"
project: {key: p, name: P}
environments:
  - key: staging
    name: Staging
    approvals:
      flags: {required: true, minNumApprovals: 1}
"#,
        )
        .unwrap();
        let declared = cfg.environments[0].approvals.clone().unwrap();

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "p", "name": "P"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/p/environments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(env_json("staging", None)))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/staging"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(env_json("staging", Some(flag_doc(&declared)))),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(["no"]);
        let report = run_provision(&client, &settings(&mock_server.uri()), &cfg, &mut p, &Interrupt::new())
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert!(report.to_string().contains("approvals already configured"));
    }

    /// An interrupt raised before the environment loop stops provisioning
    /// without touching any environment.
    #[tokio::test]
    async fn test_interrupt_stops_provisioning_before_environments() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "p", "name": "P"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/p/environments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(env_json("staging", None)))
            .expect(0)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", None)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let cfg = ProvisionConfig::from_yaml_str(
            r#"
project: {key: p, name: P}
environments:
  - {key: production, name: Production}
  - {key: staging, name: Staging}
"#,
        )
        .unwrap();

        let interrupt = Interrupt::new();
        interrupt.trigger();
        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let report = run_provision(&client, &settings(&mock_server.uri()), &cfg, &mut p, &interrupt)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.items.is_empty());
        // the interactive approval step is never offered
        assert!(p.questions.is_empty());
    }

    /// A failing environment is recorded and the next one still runs.
    #[tokio::test]
    async fn test_provision_continues_after_environment_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "p", "name": "P"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/p/environments"))
            .and(body_partial_json(json!({"key": "qa"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "invalid color"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/p/environments"))
            .and(body_partial_json(json!({"key": "staging"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(env_json("staging", None)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cfg = ProvisionConfig::from_yaml_str(
            r#"
project: {key: p, name: P}
environments:
  - {key: qa, name: QA, color: nope}
  - {key: staging, name: Staging}
"#,
        )
        .unwrap();

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(["no"]);
        let report = run_provision(&client, &settings(&mock_server.uri()), &cfg, &mut p, &Interrupt::new())
            .await
            .unwrap();
        assert_eq!((report.updated(), report.errored()), (1, 1));
        assert_eq!(report.items[0].environment.as_deref(), Some("qa"));
    }
}

mod reconcile_tests {
    use super::*;
    use provisioner::reconcile::{run_worklist, Reconciler};

    /// An environment already in the desired state is skipped without a PATCH.
    #[tokio::test]
    async fn test_matching_environment_is_skipped() {
        let mock_server = MockServer::start().await;
        let desired = native_flags(1);
        let current = desired.flags.document(ApprovalKind::Flag);
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", Some(current))))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let report = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "production")],
            &ApprovalAction::Apply(desired),
            true,
        )
        .await
        .unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.updated(), 0);
        // nothing to confirm when no change is needed
        assert!(p.questions.is_empty());
    }

    /// Item 2 of 3 failing leaves items 1 and 3 processed.
    #[tokio::test]
    async fn test_partial_failure_does_not_stop_the_batch() {
        let mock_server = MockServer::start().await;
        let desired = native_flags(2);
        for env in ["a", "c"] {
            mount_env_states(
                &mock_server,
                &format!("/projects/p/environments/{}", env),
                env_json(env, None),
                env_json(env, Some(flag_doc(&desired))),
            )
            .await;
            Mock::given(method("PATCH"))
                .and(path(format!("/projects/p/environments/{}", env)))
                .respond_with(ResponseTemplate::new(200).set_body_json(env_json(env, None)))
                .expect(1)
                .mount(&mock_server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/b"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let report = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "a"), target("p", "b"), target("p", "c")],
            &ApprovalAction::Apply(desired),
            false,
        )
        .await
        .unwrap();

        assert_eq!(report.errored(), 1);
        assert_eq!(report.updated(), 2);
        let envs: Vec<_> = report
            .items
            .iter()
            .map(|i| i.environment.as_deref().unwrap())
            .collect();
        assert_eq!(envs, vec!["a", "b", "c"]);
        assert!(report.to_string().contains("upstream exploded"));
    }

    /// ServiceNow settings without a template fail validation before any request.
    #[tokio::test]
    async fn test_servicenow_without_template_sends_nothing() {
        let mock_server = MockServer::start().await;
        let mut flags = ApprovalSettings::servicenow("", 1);
        flags.service_config.template = None;
        let action = ApprovalAction::Apply(DesiredApprovals {
            flags,
            segments: ApprovalSettings::unconfigured(),
        });

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let report = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "production"), target("p", "staging")],
            &action,
            false,
        )
        .await
        .unwrap();

        assert_eq!(report.errored(), 2);
        assert!(report.to_string().contains("template"));
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    /// Quitting at a confirmation keeps what was already recorded.
    #[tokio::test]
    async fn test_quit_mid_run_preserves_results() {
        let mock_server = MockServer::start().await;
        let desired = native_flags(1);
        mount_env_states(
            &mock_server,
            "/projects/p/environments/a",
            env_json("a", None),
            env_json("a", Some(flag_doc(&desired))),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("b", None)))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("e", None)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(["yes", "quit"]);
        let report = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "a"), target("p", "b"), target("p", "c")],
            &ApprovalAction::Apply(desired),
            true,
        )
        .await
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.updated(), 1);
        assert!(report.to_string().starts_with("Run cancelled"));
    }

    #[tokio::test]
    async fn test_declined_confirmation_is_skipped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("e", None)))
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(["no"]);
        let report = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "e")],
            &ApprovalAction::Apply(native_flags(1)),
            true,
        )
        .await
        .unwrap();
        assert_eq!(report.skipped(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_stops_before_next_item() {
        let mock_server = MockServer::start().await;
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let report = run_worklist(
            &client,
            &mut p,
            &interrupt,
            &[target("p", "a")],
            &ApprovalAction::Remove,
            false,
        )
        .await
        .unwrap();
        assert!(report.cancelled);
        assert!(report.items.is_empty());
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    /// Raises the interrupt as soon as it is asked anything, as Ctrl+C
    /// pressed at a confirmation would.
    struct InterruptingPrompter {
        inner: ScriptedPrompter,
        interrupt: Interrupt,
    }

    #[async_trait]
    impl Prompter for InterruptingPrompter {
        async fn ask(&mut self, question: &str) -> Result<String, AppError> {
            self.interrupt.trigger();
            self.inner.ask(question).await
        }

        fn say(&mut self, message: &str) {
            self.inner.say(message);
        }
    }

    /// An interrupt raised while item 1 is in flight lets it finish and
    /// stops before item 2 is fetched.
    #[tokio::test]
    async fn test_interrupt_during_item_finishes_it_and_stops() {
        let mock_server = MockServer::start().await;
        let desired = native_flags(1);
        mount_env_states(
            &mock_server,
            "/projects/p/environments/a",
            env_json("a", None),
            env_json("a", Some(flag_doc(&desired))),
        )
        .await;
        Mock::given(method("PATCH"))
            .and(path("/projects/p/environments/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("a", None)))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("b", None)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let interrupt = Interrupt::new();
        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = InterruptingPrompter {
            inner: ScriptedPrompter::new(["yes"]),
            interrupt: interrupt.clone(),
        };
        let report = run_worklist(
            &client,
            &mut p,
            &interrupt,
            &[target("p", "a"), target("p", "b")],
            &ApprovalAction::Apply(desired),
            true,
        )
        .await
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].environment.as_deref(), Some("a"));
        assert_eq!(report.updated(), 1);
    }

    /// A PATCH the service accepts but does not apply is reported as an
    /// error rather than an update.
    #[tokio::test]
    async fn test_unapplied_update_is_not_counted_as_updated() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", None)))
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/projects/p/environments/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", None)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let report = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "production")],
            &ApprovalAction::Apply(native_flags(2)),
            false,
        )
        .await
        .unwrap();

        assert_eq!(report.updated(), 0);
        assert_eq!(report.errored(), 1);
        assert!(report.to_string().contains("update not verified"));
    }

    /// Removing twice patches once; the second run sees nothing to remove.
    #[tokio::test]
    async fn test_removal_is_idempotent() {
        let mock_server = MockServer::start().await;
        let configured = ApprovalSettings::native(2).document(ApprovalKind::Flag);
        let removed = ApprovalSettings::unconfigured().document(ApprovalKind::Flag);
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", Some(configured))))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", Some(removed))))
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/projects/p/environments/production"))
            .and(|req: &Request| {
                patch_ops(req)
                    .iter()
                    .any(|op| op["path"] == "/approvalSettings" && op["value"]["required"] == false)
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", None)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let targets = [target("p", "production")];
        for expected_updates in [1, 0] {
            let mut p = ScriptedPrompter::new(Vec::<String>::new());
            let report = run_worklist(&client, &mut p, &Interrupt::new(), &targets, &ApprovalAction::Remove, false)
                .await
                .unwrap();
            assert_eq!(report.updated(), expected_updates);
        }
    }

    /// A rejected token aborts the run after printing the partial report.
    #[tokio::test]
    async fn test_auth_failure_aborts_with_partial_report() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/a"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/p/environments/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("b", None)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "bad").unwrap();
        let mut p = ScriptedPrompter::new(Vec::<String>::new());
        let err = run_worklist(
            &client,
            &mut p,
            &Interrupt::new(),
            &[target("p", "a"), target("p", "b")],
            &ApprovalAction::Remove,
            false,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Auth(_)));
        assert!(p.output.iter().any(|l| l.contains("Errors encountered: 1")));
    }

    /// Full interactive batch: global workflow over all projects, one
    /// environment key, then decline another batch.
    #[tokio::test]
    async fn test_interactive_removal_batch() {
        let mock_server = MockServer::start().await;
        let configured = ApprovalSettings::native(1).document(ApprovalKind::Flag);
        Mock::given(method("GET"))
            .and(path("/projects"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": [{"key": "p1", "name": "Project 1"}]})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/p1/environments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [env_json("production", Some(configured.clone())), env_json("test", None)]
            })))
            .mount(&mock_server)
            .await;
        mount_env_states(
            &mock_server,
            "/projects/p1/environments/production",
            env_json("production", Some(configured)),
            env_json(
                "production",
                Some(ApprovalSettings::unconfigured().document(ApprovalKind::Flag)),
            ),
        )
        .await;
        Mock::given(method("PATCH"))
            .and(path("/projects/p1/environments/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(env_json("production", None)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LdClient::new(&mock_server.uri(), "k").unwrap();
        let settings = settings(&mock_server.uri());
        let mut reconciler = Reconciler::new(&client, &settings, Interrupt::new());
        let mut p = ScriptedPrompter::new([
            "1",          // same environments across projects
            "Production", // environment keys
            "1",          // all projects
            "no",         // another batch
        ]);
        reconciler.run(&mut p, Some(ApprovalAction::Remove)).await.unwrap();

        assert!(p.output.iter().any(|l| l.contains("Environments updated: 1")));
        assert_eq!(p.remaining(), 0);
    }
}
