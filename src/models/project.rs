use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::approval::{ApprovalKind, ApprovalSettings};

/// Environments the service creates alongside every new project.
pub const BUILTIN_ENVIRONMENTS: [&str; 2] = ["production", "test"];
pub const DEFAULT_TEST_ENVIRONMENT: &str = "test";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Project {
    /// Creation payload. The key is lowercased before it leaves the process.
    pub fn creation_payload(&self) -> Value {
        json!({
            "key": self.key.to_lowercase(),
            "name": self.name,
            "tags": self.tags,
            "defaultClientSideAvailability": {
                "usingEnvironmentId": true,
                "usingMobileKey": false,
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceApprovalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<ApprovalSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confirm_changes: bool,
    #[serde(default)]
    pub require_comments: bool,
    #[serde(default)]
    pub default_ttl: u32,
    #[serde(default)]
    pub secure_mode: bool,
    #[serde(default)]
    pub default_track_events: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_settings: Option<ApprovalSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_approval_settings: Option<ResourceApprovalSettings>,
}

impl Environment {
    pub fn is_builtin(&self) -> bool {
        BUILTIN_ENVIRONMENTS.contains(&self.key.as_str())
    }

    pub fn approvals_for(&self, kind: ApprovalKind) -> Option<&ApprovalSettings> {
        match kind {
            ApprovalKind::Flag => self.approval_settings.as_ref(),
            ApprovalKind::Segment => self
                .resource_approval_settings
                .as_ref()
                .and_then(|r| r.segment.as_ref()),
        }
    }

    /// Whether the environment document has the member a patch for `kind`
    /// would target.
    pub fn has_approval_member(&self, kind: ApprovalKind) -> bool {
        match kind {
            ApprovalKind::Flag => self.approval_settings.is_some(),
            ApprovalKind::Segment => self.resource_approval_settings.is_some(),
        }
    }

    /// POST body for a new environment.
    pub fn creation_payload(&self) -> Value {
        let mut body = self.settings_document();
        body["key"] = json!(self.key.to_lowercase());
        body
    }

    /// JSON-Patch operations bringing an existing environment's plain
    /// settings in line with this one. Approval settings are left alone.
    pub fn update_operations(&self) -> Vec<Value> {
        let doc = self.settings_document();
        doc.as_object()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(field, value)| {
                        json!({ "op": "replace", "path": format!("/{}", field), "value": value })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn settings_document(&self) -> Value {
        json!({
            "name": self.name,
            "color": self.color,
            "tags": self.tags,
            "confirmChanges": self.confirm_changes,
            "requireComments": self.require_comments,
            "defaultTtl": self.default_ttl,
            "secureMode": self.secure_mode,
            "defaultTrackEvents": self.default_track_events,
        })
    }
}
