//! Interactive construction of desired approval settings.

use crate::errors::AppError;
use crate::models::approval::{
    ApprovalKind, ApprovalSettings, DesiredApprovals, ServiceKind, MAX_APPROVALS, MIN_APPROVALS,
};
use crate::prompt::{choose, confirm, input, number_in_range, parse_list, Prompter};

const RULE: &str = "--------------------------------------------------";

/// Walks the user through choosing an approval system and its settings.
/// Returns `None` when the user declines the final summary.
pub async fn configure_approvals(
    p: &mut dyn Prompter,
    current: Option<&ApprovalSettings>,
    servicenow_template: Option<&str>,
) -> Result<Option<DesiredApprovals>, AppError> {
    p.say("APPROVAL SYSTEM CONFIGURATION");
    p.say(RULE);
    match current {
        Some(c) if c.required => p.say(&format!("Current approval system: {}", c.service_kind)),
        _ => p.say("Current approval system: None"),
    }

    let system = choose(
        p,
        "Which approval system would you like to use?",
        &["LaunchDarkly approval system", "ServiceNow approvals"],
    )
    .await?;

    let desired = if system == 0 {
        let bypass = confirm(
            p,
            "Allow members with bypass permission to skip approval requirements?",
            Some(false),
        )
        .await?;
        let auto_apply = confirm(p, "Automatically apply changes when approved?", Some(false)).await?;

        let mut flags = native_settings(p, ApprovalKind::Flag).await?;
        flags.bypass_approvals_for_pending_changes = flags.required && bypass;
        flags.auto_apply_approved_changes = flags.required && auto_apply;

        p.say("Note: segment approvals cannot be bypassed, even in emergencies.");
        let mut segments = native_settings(p, ApprovalKind::Segment).await?;
        segments.auto_apply_approved_changes = segments.required && auto_apply;

        DesiredApprovals { flags, segments }
    } else {
        p.say("ServiceNow approvals use your ServiceNow change workflow.");
        p.say("Note: ServiceNow approval system does not support segment approvals.");
        let bypass = confirm(
            p,
            "Allow members with permission to bypass ServiceNow approvals?",
            Some(false),
        )
        .await?;
        let min = number_in_range(
            p,
            "Minimum number of approvals required",
            MIN_APPROVALS..=MAX_APPROVALS,
            MIN_APPROVALS,
        )
        .await?;
        let template = match servicenow_template {
            Some(t) => {
                p.say(&format!("Using ServiceNow Template System ID: {}", t));
                t.to_string()
            }
            None => input(p, "ServiceNow Template System ID", None).await?,
        };

        let mut flags = ApprovalSettings::servicenow(template, min);
        flags.bypass_approvals_for_pending_changes = bypass;
        DesiredApprovals {
            flags,
            segments: ApprovalSettings::unconfigured(),
        }
    };

    p.say("APPROVAL SETTINGS SUMMARY");
    p.say(RULE);
    for line in summarize(&desired) {
        p.say(&line);
    }

    if !confirm(p, "Apply these approval settings?", Some(false)).await? {
        p.say("Operation cancelled. No changes made to approval settings.");
        return Ok(None);
    }
    Ok(Some(desired))
}

async fn native_settings(p: &mut dyn Prompter, kind: ApprovalKind) -> Result<ApprovalSettings, AppError> {
    let noun = match kind {
        ApprovalKind::Flag => "flag",
        ApprovalKind::Segment => "segment",
    };
    if !confirm(p, &format!("Require approvals for {} targeting changes?", noun), Some(false)).await? {
        return Ok(ApprovalSettings::unconfigured());
    }

    let scope = choose(
        p,
        &format!("Which {}s require approval?", noun),
        &["All (recommended for critical environments)", "Only those with specific tags"],
    )
    .await?;
    let tags = if scope == 1 {
        parse_list(&input(p, "Enter comma-separated tags", None).await?)
    } else {
        Vec::new()
    };

    let delete_scheduled = if kind == ApprovalKind::Flag {
        p.say("Scheduled changes are targeting changes set to apply at a future date.");
        confirm(p, "Allow deleting scheduled changes without approval?", Some(false)).await?
    } else {
        false
    };

    let review_own = confirm(
        p,
        &format!("Allow requesters to review their own {} change requests?", noun),
        Some(false),
    )
    .await?;
    let min = number_in_range(
        p,
        &format!("Minimum number of approvals required for {}s", noun),
        MIN_APPROVALS..=MAX_APPROVALS,
        MIN_APPROVALS,
    )
    .await?;
    let prevent_declined = confirm(
        p,
        "Prevent applying changes if any reviewer has declined?",
        Some(true),
    )
    .await?;

    let mut settings = ApprovalSettings::native(min);
    settings.required_approval_tags = tags;
    if kind == ApprovalKind::Flag {
        settings.can_review_own_request = review_own;
        settings.can_apply_declined_changes = !prevent_declined;
        settings.allow_delete_scheduled_changes = delete_scheduled;
    }
    Ok(settings)
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "Yes"
    } else {
        "No"
    }
}

/// Human-readable summary of the settings about to be applied.
pub fn summarize(desired: &DesiredApprovals) -> Vec<String> {
    let flags = &desired.flags;
    let mut lines = vec![format!("Approval System: {}", flags.service_kind)];

    if flags.service_kind == ServiceKind::ServiceNow {
        lines.push(format!(
            "ServiceNow Template ID: {}",
            flags.service_config.template_id().unwrap_or("(missing)")
        ));
        lines.push(format!("Minimum Approvals: {}", flags.min_num_approvals));
        lines.push(format!(
            "Bypass Approvals for Emergencies: {}",
            yes_no(flags.bypass_approvals_for_pending_changes)
        ));
        lines.push("Segment Approvals: Not supported with ServiceNow".to_string());
        return lines;
    }

    for (label, s) in [("Flag", flags), ("Segment", &desired.segments)] {
        if !s.required {
            lines.push(format!("{} Approvals: Not required", label));
            continue;
        }
        let scope = if s.required_approval_tags.is_empty() {
            "All".to_string()
        } else {
            format!("Tags: {}", s.required_approval_tags.join(", "))
        };
        lines.push(format!("{} Approval Settings:", label));
        lines.push(format!("- Required for: {}", scope));
        lines.push(format!("- Minimum Approvals: {}", s.min_num_approvals));
        lines.push(format!("- Auto-apply Approved Changes: {}", yes_no(s.auto_apply_approved_changes)));
        if label == "Flag" {
            lines.push(format!(
                "- Bypass Approvals for Emergencies: {}",
                yes_no(s.bypass_approvals_for_pending_changes)
            ));
            lines.push(format!(
                "- Delete Scheduled Changes: {}",
                if s.allow_delete_scheduled_changes {
                    "No approval needed"
                } else {
                    "Requires approval"
                }
            ));
            lines.push(format!("- Self-review: {}", yes_no(s.can_review_own_request)));
            lines.push(format!("- Apply if Declined: {}", yes_no(s.can_apply_declined_changes)));
        }
    }
    lines
}
