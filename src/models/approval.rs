//! Workflow-approval settings and the reconciliation rules around them.
//!
//! Every environment carries two independent approval documents: one for flag
//! targeting changes (`/approvalSettings`) and one for segment targeting
//! changes (`/resourceApprovalSettings/segment`). Both are always written as a
//! full replacement of the sub-document.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::project::Environment;

pub const MIN_APPROVALS: u8 = 1;
pub const MAX_APPROVALS: u8 = 5;
pub const DEFAULT_DETAIL_COLUMN: &str = "justification";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    #[default]
    #[serde(rename = "launchdarkly")]
    LaunchDarkly,
    #[serde(rename = "servicenow", alias = "service-now", alias = "servicenow-normal")]
    ServiceNow,
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::LaunchDarkly => "launchdarkly",
            ServiceKind::ServiceNow => "servicenow",
            ServiceKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::LaunchDarkly => write!(f, "LaunchDarkly approval system"),
            ServiceKind::ServiceNow => write!(f, "ServiceNow approvals"),
            ServiceKind::Unknown => write!(f, "unknown approval system"),
        }
    }
}

/// Which targeting changes an approval document gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    Flag,
    Segment,
}

impl ApprovalKind {
    pub const ALL: [ApprovalKind; 2] = [ApprovalKind::Flag, ApprovalKind::Segment];

    /// Environment member replaced by a patch for this kind.
    pub fn path(&self) -> &'static str {
        match self {
            ApprovalKind::Flag => "/approvalSettings",
            ApprovalKind::Segment => "/resourceApprovalSettings",
        }
    }

    fn wrap(&self, document: Value) -> Value {
        match self {
            ApprovalKind::Flag => document,
            ApprovalKind::Segment => json!({ "segment": document }),
        }
    }
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalKind::Flag => write!(f, "flag"),
            ApprovalKind::Segment => write!(f, "segment"),
        }
    }
}

/// Ticketing-system configuration; only meaningful for `servicenow`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, alias = "templateId", skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, alias = "detailColumn", skip_serializing_if = "Option::is_none")]
    pub detail_column: Option<String>,
}

impl ServiceConfig {
    pub fn template_id(&self) -> Option<&str> {
        self.template.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn detail_column(&self) -> &str {
        self.detail_column.as_deref().unwrap_or(DEFAULT_DETAIL_COLUMN)
    }
}

/// One approval document as the service stores it. Field names follow the
/// API; snake_case aliases are accepted for hand-written YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalSettings {
    pub required: bool,
    #[serde(alias = "min_num_approvals")]
    pub min_num_approvals: u8,
    #[serde(alias = "bypass_approvals_for_pending_changes")]
    pub bypass_approvals_for_pending_changes: bool,
    #[serde(alias = "auto_apply_approved_changes")]
    pub auto_apply_approved_changes: bool,
    #[serde(alias = "can_review_own_request")]
    pub can_review_own_request: bool,
    #[serde(alias = "can_apply_declined_changes")]
    pub can_apply_declined_changes: bool,
    /// Flags only: scheduled changes may be deleted without approval.
    #[serde(alias = "allow_delete_scheduled_changes")]
    pub allow_delete_scheduled_changes: bool,
    #[serde(alias = "service_kind")]
    pub service_kind: ServiceKind,
    #[serde(alias = "service_config")]
    pub service_config: ServiceConfig,
    #[serde(alias = "required_approval_tags")]
    pub required_approval_tags: Vec<String>,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self::unconfigured()
    }
}

impl ApprovalSettings {
    /// The state of an environment with no workflow approvals.
    pub fn unconfigured() -> Self {
        Self {
            required: false,
            min_num_approvals: MIN_APPROVALS,
            bypass_approvals_for_pending_changes: false,
            auto_apply_approved_changes: false,
            can_review_own_request: false,
            can_apply_declined_changes: true,
            allow_delete_scheduled_changes: false,
            service_kind: ServiceKind::LaunchDarkly,
            service_config: ServiceConfig::default(),
            required_approval_tags: Vec::new(),
        }
    }

    pub fn native(min_num_approvals: u8) -> Self {
        Self {
            required: true,
            min_num_approvals,
            can_apply_declined_changes: false,
            ..Self::unconfigured()
        }
    }

    pub fn servicenow(template: impl Into<String>, min_num_approvals: u8) -> Self {
        Self {
            required: true,
            min_num_approvals,
            service_kind: ServiceKind::ServiceNow,
            service_config: ServiceConfig {
                template: Some(template.into()),
                detail_column: Some(DEFAULT_DETAIL_COLUMN.to_string()),
            },
            ..Self::unconfigured()
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(MIN_APPROVALS..=MAX_APPROVALS).contains(&self.min_num_approvals) {
            return Err(AppError::Validation(format!(
                "minNumApprovals must be between {} and {}, got {}",
                MIN_APPROVALS, MAX_APPROVALS, self.min_num_approvals
            )));
        }
        if !self.required {
            return Ok(());
        }
        match self.service_kind {
            ServiceKind::LaunchDarkly => Ok(()),
            ServiceKind::ServiceNow if self.service_config.template_id().is_none() => {
                Err(AppError::Validation(
                    "ServiceNow approvals require a non-empty template id".to_string(),
                ))
            }
            ServiceKind::ServiceNow => Ok(()),
            ServiceKind::Unknown => Err(AppError::Validation(
                "unsupported approval service kind".to_string(),
            )),
        }
    }

    fn tag_set(&self) -> BTreeSet<&str> {
        self.required_approval_tags.iter().map(String::as_str).collect()
    }

    /// The full sub-document written for `kind`. Only fields relevant to the
    /// service kind carry caller values; the rest are pinned.
    pub fn document(&self, kind: ApprovalKind) -> Value {
        if !self.required {
            return removal_document(kind);
        }

        let bypass = kind == ApprovalKind::Flag && self.bypass_approvals_for_pending_changes;
        let mut doc = match self.service_kind {
            ServiceKind::ServiceNow => json!({
                "required": true,
                "minNumApprovals": self.min_num_approvals,
                "bypassApprovalsForPendingChanges": bypass,
                "autoApplyApprovedChanges": false,
                "serviceKind": ServiceKind::ServiceNow.as_str(),
                "serviceConfig": {
                    "template": self.service_config.template_id().unwrap_or_default(),
                    "detail_column": self.service_config.detail_column(),
                },
                "requiredApprovalTags": [],
            }),
            _ => json!({
                "required": true,
                "minNumApprovals": self.min_num_approvals,
                "bypassApprovalsForPendingChanges": bypass,
                "autoApplyApprovedChanges": self.auto_apply_approved_changes,
                "serviceKind": ServiceKind::LaunchDarkly.as_str(),
                "serviceConfig": {},
                "requiredApprovalTags": self.tag_set().into_iter().collect::<Vec<_>>(),
            }),
        };

        if kind == ApprovalKind::Flag {
            let (review_own, apply_declined, delete_scheduled) = match self.service_kind {
                ServiceKind::ServiceNow => (false, true, false),
                _ => (
                    self.can_review_own_request,
                    self.can_apply_declined_changes,
                    self.allow_delete_scheduled_changes,
                ),
            };
            doc["canReviewOwnRequest"] = json!(review_own);
            doc["canApplyDeclinedChanges"] = json!(apply_declined);
            doc["allowDeleteScheduledChanges"] = json!(delete_scheduled);
        }
        doc
    }
}

fn removal_document(kind: ApprovalKind) -> Value {
    let mut doc = json!({
        "required": false,
        "minNumApprovals": MIN_APPROVALS,
        "bypassApprovalsForPendingChanges": false,
        "autoApplyApprovedChanges": false,
        "serviceKind": ServiceKind::LaunchDarkly.as_str(),
        "serviceConfig": {},
        "requiredApprovalTags": [],
    });
    if kind == ApprovalKind::Flag {
        doc["canReviewOwnRequest"] = json!(false);
        doc["canApplyDeclinedChanges"] = json!(true);
        doc["allowDeleteScheduledChanges"] = json!(false);
    }
    doc
}

/// Compares `current` against `desired` on the fields that matter for the
/// desired service kind and approval kind. Absent settings are unconfigured.
pub fn settings_match(
    kind: ApprovalKind,
    current: Option<&ApprovalSettings>,
    desired: &ApprovalSettings,
) -> bool {
    let unconfigured = ApprovalSettings::unconfigured();
    let current = current.unwrap_or(&unconfigured);

    if !desired.required {
        return !current.required;
    }
    if !current.required
        || current.service_kind != desired.service_kind
        || current.min_num_approvals != desired.min_num_approvals
    {
        return false;
    }
    if kind == ApprovalKind::Flag
        && current.bypass_approvals_for_pending_changes
            != desired.bypass_approvals_for_pending_changes
    {
        return false;
    }

    match desired.service_kind {
        ServiceKind::LaunchDarkly => {
            let flag_fields_match = kind == ApprovalKind::Segment
                || (current.can_review_own_request == desired.can_review_own_request
                    && current.can_apply_declined_changes == desired.can_apply_declined_changes
                    && current.allow_delete_scheduled_changes
                        == desired.allow_delete_scheduled_changes);
            flag_fields_match
                && current.auto_apply_approved_changes == desired.auto_apply_approved_changes
                && current.tag_set() == desired.tag_set()
        }
        ServiceKind::ServiceNow => {
            current.service_config.template_id() == desired.service_config.template_id()
                && current.service_config.detail_column() == desired.service_config.detail_column()
        }
        ServiceKind::Unknown => current.service_config == desired.service_config,
    }
}

fn patch_op(op: &str, kind: ApprovalKind, document: Value) -> Value {
    json!({ "op": op, "path": kind.path(), "value": kind.wrap(document) })
}

fn into_patch(ops: Vec<Value>) -> Result<Patch, AppError> {
    serde_json::from_value(Value::Array(ops))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid JSON patch: {}", e)))
}

/// Replace-style patch writing `desired` for `kind`. Validation runs first so
/// an invalid document never reaches the wire.
pub fn build_payload(kind: ApprovalKind, desired: &ApprovalSettings) -> Result<Patch, AppError> {
    desired.validate()?;
    into_patch(vec![patch_op("replace", kind, desired.document(kind))])
}

/// Replace-style patch resetting `kind` to the unconfigured state.
pub fn build_removal_payload(kind: ApprovalKind) -> Result<Patch, AppError> {
    into_patch(vec![patch_op("replace", kind, removal_document(kind))])
}

// ── Desired state ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredApprovals {
    pub flags: ApprovalSettings,
    pub segments: ApprovalSettings,
}

impl DesiredApprovals {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn for_kind(&self, kind: ApprovalKind) -> &ApprovalSettings {
        match kind {
            ApprovalKind::Flag => &self.flags,
            ApprovalKind::Segment => &self.segments,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for kind in ApprovalKind::ALL {
            self.for_kind(kind)
                .validate()
                .map_err(|e| AppError::Validation(format!("{} approvals: {}", kind, strip(e))))?;
        }
        Ok(())
    }

    /// Fills a missing ServiceNow template from the process-wide secret.
    pub fn with_template_fallback(mut self, template: Option<&str>) -> Self {
        if let Some(template) = template {
            for settings in [&mut self.flags, &mut self.segments] {
                if settings.service_kind == ServiceKind::ServiceNow
                    && settings.service_config.template_id().is_none()
                {
                    settings.service_config.template = Some(template.to_string());
                }
            }
        }
        self
    }
}

fn strip(e: AppError) -> String {
    match e {
        AppError::Validation(msg) => msg,
        other => other.to_string(),
    }
}

/// What a reconciliation run does to each targeted environment.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalAction {
    Apply(DesiredApprovals),
    Remove,
}

impl ApprovalAction {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            ApprovalAction::Apply(desired) => desired.validate(),
            ApprovalAction::Remove => Ok(()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ApprovalAction::Apply(_) => "add/update workflow approvals for",
            ApprovalAction::Remove => "remove workflow approvals from",
        }
    }

    fn satisfied(&self, kind: ApprovalKind, current: Option<&ApprovalSettings>) -> bool {
        match self {
            ApprovalAction::Apply(desired) => settings_match(kind, current, desired.for_kind(kind)),
            ApprovalAction::Remove => current.map_or(true, |c| !c.required),
        }
    }

    fn document(&self, kind: ApprovalKind) -> Value {
        match self {
            ApprovalAction::Apply(desired) => desired.for_kind(kind).document(kind),
            ApprovalAction::Remove => removal_document(kind),
        }
    }
}

/// Decides what to write to `env`. `None` means every approval kind is
/// already in the desired state. Members missing from the current document
/// are added rather than replaced.
pub fn plan_patch(env: &Environment, action: &ApprovalAction) -> Result<Option<Patch>, AppError> {
    action.validate()?;

    let ops: Vec<Value> = ApprovalKind::ALL
        .into_iter()
        .filter(|kind| !action.satisfied(*kind, env.approvals_for(*kind)))
        .map(|kind| {
            let op = if env.has_approval_member(kind) { "replace" } else { "add" };
            patch_op(op, kind, action.document(kind))
        })
        .collect();

    if ops.is_empty() {
        return Ok(None);
    }
    into_patch(ops).map(Some)
}
