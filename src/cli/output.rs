//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans,
//! diagnostics and apply results in text or JSON.

use colored::{ColoredString, Colorize};
use std::fmt::Write;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::lang::DynamicValue;
use crate::planner::{ApplyOutcome, changed_attributes};
use crate::plans::{Action, ActionReason, CheckStatus, Plan, ResourceInstanceChange};
use crate::provider::{ProviderRegistry, ProviderSchemasJson};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// The format this formatter writes.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan) -> String {
        let mut output = String::new();

        let drifted: Vec<&ResourceInstanceChange> = plan.drift().iter().filter(|c| !c.action().is_noop()).collect();
        if !drifted.is_empty() {
            let _ = writeln!(output, "\n{} Objects changed outside plangraph:\n", "⚠".yellow());
            for change in drifted {
                let _ = writeln!(output, "   {}", Self::format_change_line(change));
            }
        }

        if !plan.has_changes() && plan.deferred_changes().is_empty() {
            let _ = writeln!(
                output,
                "\n{} No changes required - infrastructure matches the configuration.",
                "✓".green()
            );
        } else {
            let _ = writeln!(output, "\n📋 Plan ({} mode)\n", plan.mode());
            for change in plan.resource_changes().iter().filter(|c| !c.action().is_noop()) {
                let _ = writeln!(output, "   {}", Self::format_change_line(change));
                if change.action() == Action::Update {
                    let names = changed_names(change);
                    if !names.is_empty() {
                        let _ = writeln!(output, "       changed: {}", names.join(", "));
                    }
                }
            }

            for (addr, deferred) in plan.deferred_changes() {
                let _ = writeln!(output, "   {} {addr} (deferred: {})", "?".dimmed(), deferred.reason);
            }

            if !plan.action_invocations().is_empty() {
                output.push_str("\nActions:\n");
                for invocation in plan.action_invocations() {
                    let _ = writeln!(
                        output,
                        "   {} {} ({} {})",
                        "!".cyan(),
                        invocation.addr,
                        invocation.trigger.event,
                        invocation.trigger.resource
                    );
                }
            }

            let outputs: Vec<String> = plan
                .output_changes()
                .values()
                .filter(|c| !c.change.action.is_noop())
                .map(|c| {
                    let shown = if c.sensitive {
                        String::from("(sensitive)")
                    } else {
                        display_value(&c.change.after)
                    };
                    format!("   {} {} = {shown}", Self::format_symbol(c.change.action), c.addr)
                })
                .collect();
            if !outputs.is_empty() {
                output.push_str("\nOutputs:\n");
                for line in outputs {
                    output.push_str(&line);
                    output.push('\n');
                }
            }
        }

        let failed: Vec<_> = plan
            .checks()
            .values()
            .filter(|c| matches!(c.status, CheckStatus::Fail | CheckStatus::Error))
            .collect();
        if !failed.is_empty() {
            let _ = write!(output, "\n{} Failed checks:\n", "⚠".yellow());
            for check in failed {
                let _ = writeln!(output, "   - {} ({})", check.config_addr, check.status);
                for message in &check.failure_messages {
                    let _ = writeln!(output, "       {message}");
                }
            }
        }

        if !plan.skipped().is_empty() {
            let _ = write!(output, "\n{} Not planned because a dependency failed:\n", "⚠".yellow());
            for (node, cause) in plan.skipped() {
                let _ = writeln!(output, "   - {node} (after {cause} failed)");
            }
        }

        if !plan.diagnostics().is_empty() {
            output.push('\n');
            output.push_str(&Self::format_diagnostics_text(plan.diagnostics()));
        }

        let summary = plan.summary();
        let _ = write!(
            output,
            "\nPlan: {} to add, {} to change, {} to destroy",
            summary.create.to_string().green(),
            summary.update.to_string().yellow(),
            summary.delete.to_string().red()
        );
        if summary.forget > 0 {
            let _ = write!(output, ", {} to forget", summary.forget);
        }
        if summary.deferred > 0 {
            let _ = write!(output, ", {} deferred", summary.deferred.to_string().dimmed());
        }
        let status = if plan.applyable() {
            plan.status().to_string().green()
        } else {
            plan.status().to_string().red()
        };
        let _ = writeln!(output, "\nStatus: {status}");

        output
    }

    /// Formats diagnostics for display.
    #[must_use]
    pub fn format_diagnostics(&self, diagnostics: &Diagnostics) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ValidateJson::from(diagnostics)).unwrap_or_default(),
            OutputFormat::Text => {
                if diagnostics.is_empty() {
                    format!("{} The configuration is valid.\n", "✓".green())
                } else {
                    Self::format_diagnostics_text(diagnostics)
                }
            }
        }
    }

    fn format_diagnostics_text(diagnostics: &Diagnostics) -> String {
        let mut output = String::new();
        for diagnostic in diagnostics {
            let _ = writeln!(output, "{}", Self::format_diagnostic(diagnostic));
        }
        output
    }

    fn format_diagnostic(diagnostic: &Diagnostic) -> String {
        let marker = if diagnostic.is_error() {
            "✗ Error:".red()
        } else {
            "⚠ Warning:".yellow()
        };
        let mut line = format!("{marker} {}", diagnostic.summary);
        if let Some(subject) = &diagnostic.subject {
            let _ = write!(line, " ({subject})");
        }
        if !diagnostic.detail.is_empty() {
            let _ = write!(line, "\n   {}", diagnostic.detail);
        }
        line
    }

    /// Formats the schemas of every provider in `registry`.
    #[must_use]
    pub fn format_provider_schemas(&self, registry: &ProviderRegistry) -> String {
        let schemas: Vec<_> = registry
            .names()
            .filter_map(|name| registry.schema(name).ok().map(|schema| (name, schema)))
            .collect();
        match self.format {
            OutputFormat::Json => {
                let document = ProviderSchemasJson::new(schemas.iter().map(|(name, schema)| (*name, schema.as_ref())));
                serde_json::to_string_pretty(&document).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for (name, schema) in &schemas {
                    let _ = writeln!(output, "{}", format!("provider \"{name}\"").bold());
                    for resource in schema.resource_types.keys() {
                        let _ = writeln!(output, "   resource    {resource}");
                    }
                    for data in schema.data_sources.keys() {
                        let _ = writeln!(output, "   data        {data}");
                    }
                    for ephemeral in schema.ephemeral_resource_types.keys() {
                        let _ = writeln!(output, "   ephemeral   {ephemeral}");
                    }
                    for (action, action_schema) in &schema.actions {
                        let _ = writeln!(output, "   action      {action} ({})", action_schema.kind);
                    }
                    for function in schema.functions.keys() {
                        let _ = writeln!(output, "   function    provider::{name}::{function}");
                    }
                }
                output
            }
        }
    }

    /// Formats the result of an apply.
    #[must_use]
    pub fn format_apply(&self, outcome: &ApplyOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ApplyJson::from(outcome)).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if outcome.applied {
                    format!("{} Apply complete!", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };
                let _ = writeln!(
                    output,
                    " State serial {}, {} objects.",
                    outcome.state.serial,
                    outcome.state.object_count()
                );

                if !outcome.diagnostics.is_empty() {
                    output.push('\n');
                    output.push_str(&Self::format_diagnostics_text(&outcome.diagnostics));
                }

                if !outcome.state.outputs.is_empty() {
                    output.push_str("\nOutputs:\n");
                    for (name, value) in &outcome.state.outputs {
                        if value.sensitive {
                            let _ = writeln!(output, "   {name} = (sensitive)");
                        } else {
                            let _ = writeln!(output, "   {name} = {}", value.value);
                        }
                    }
                }
                output
            }
        }
    }

    /// Formats an action with its symbol and color.
    fn format_symbol(action: Action) -> ColoredString {
        match action {
            Action::Create => action.symbol().green(),
            Action::Update => action.symbol().yellow(),
            Action::Delete => action.symbol().red(),
            Action::DeleteThenCreate | Action::CreateThenDelete | Action::CreateThenForget => {
                action.symbol().magenta()
            }
            Action::Read => action.symbol().cyan(),
            Action::Forget | Action::NoOp => action.symbol().dimmed(),
        }
    }

    fn format_change_line(change: &ResourceInstanceChange) -> String {
        let mut line = format!(
            "{} {} will be {}",
            Self::format_symbol(change.action()),
            change.addr,
            describe(change.action())
        );
        if let Some(key) = &change.deposed {
            let _ = write!(line, " (deposed object {key})");
        }
        if let Some(reason) = reason_label(change.action_reason) {
            let _ = write!(line, " {}", format!("# {reason}").dimmed());
        }
        line
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "success", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✓".green()),
        }
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "error", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }
}

fn describe(action: Action) -> &'static str {
    match action {
        Action::NoOp => "left unchanged",
        Action::Create => "created",
        Action::Read => "read during apply",
        Action::Update => "updated in-place",
        Action::DeleteThenCreate => "replaced (destroy first)",
        Action::CreateThenDelete => "replaced (create first)",
        Action::Delete => "destroyed",
        Action::Forget => "removed from state",
        Action::CreateThenForget => "replaced (old object forgotten)",
    }
}

fn reason_label(reason: ActionReason) -> Option<&'static str> {
    match reason {
        ActionReason::None => None,
        ActionReason::ReplaceByRequest => Some("replacement requested"),
        ActionReason::ReplaceBecauseCannotUpdate => Some("forces replacement"),
        ActionReason::DeleteBecauseNoResourceConfig => Some("no longer in configuration"),
        ActionReason::DeleteBecauseCountIndex => Some("count index out of range"),
        ActionReason::ReadBecauseConfigUnknown => Some("configuration known only after apply"),
        ActionReason::ReadBecauseDependencyPending => Some("depends on pending changes"),
    }
}

fn changed_names(change: &ResourceInstanceChange) -> Vec<String> {
    match (change.change.before.decode(), change.change.after.decode()) {
        (Ok(before), Ok(after)) => changed_attributes(&before, &after),
        _ => Vec::new(),
    }
}

fn display_value(value: &DynamicValue) -> String {
    match value.decode() {
        Ok(v) if v.is_wholly_known() => v.to_json().to_string(),
        Ok(_) => String::from("(known after apply)"),
        Err(e) => format!("(undecodable: {e})"),
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    format_version: u32,
    mode: String,
    status: String,
    applyable: bool,
    complete: bool,
    errored: bool,
    created_at: String,
    config_fingerprint: String,
    resource_changes: Vec<ChangeJson>,
    drift: Vec<ChangeJson>,
    deferred: Vec<DeferredJson>,
    outputs: Vec<OutputJson>,
    actions: Vec<InvocationJson>,
    checks: Vec<CheckJson>,
    skipped: std::collections::BTreeMap<String, String>,
    diagnostics: Vec<DiagnosticJson>,
}

#[derive(serde::Serialize)]
struct ChangeJson {
    address: String,
    deposed: Option<String>,
    action: String,
    reason: ActionReason,
    before: serde_json::Value,
    after: serde_json::Value,
}

#[derive(serde::Serialize)]
struct DeferredJson {
    address: String,
    reason: String,
    action: String,
}

#[derive(serde::Serialize)]
struct OutputJson {
    address: String,
    action: String,
    sensitive: bool,
    after: serde_json::Value,
}

#[derive(serde::Serialize)]
struct InvocationJson {
    address: String,
    resource: String,
    event: String,
}

#[derive(serde::Serialize)]
struct CheckJson {
    address: String,
    status: CheckStatus,
    failure_messages: Vec<String>,
}

#[derive(serde::Serialize)]
struct DiagnosticJson {
    severity: String,
    summary: String,
    detail: String,
    subject: Option<String>,
}

#[derive(serde::Serialize)]
struct ValidateJson {
    valid: bool,
    error_count: usize,
    diagnostics: Vec<DiagnosticJson>,
}

#[derive(serde::Serialize)]
struct ApplyJson {
    applied: bool,
    serial: u64,
    lineage: String,
    objects: usize,
    diagnostics: Vec<DiagnosticJson>,
}

/// JSON form of a value: sensitive values are masked, unknowns become null.
fn json_value(value: &DynamicValue, masked: bool) -> serde_json::Value {
    if masked && !value.is_null() {
        return serde_json::Value::String(String::from("(sensitive)"));
    }
    value.decode().map(|v| v.to_json()).unwrap_or_default()
}

impl From<&ResourceInstanceChange> for ChangeJson {
    fn from(change: &ResourceInstanceChange) -> Self {
        let inner = &change.change;
        Self {
            address: change.addr.to_string(),
            deposed: change.deposed.as_ref().map(ToString::to_string),
            action: inner.action.to_string(),
            reason: change.action_reason,
            before: json_value(&inner.before, !inner.before_sensitive_paths.is_empty()),
            after: json_value(&inner.after, !inner.after_sensitive_paths.is_empty()),
        }
    }
}

impl From<&Diagnostic> for DiagnosticJson {
    fn from(diagnostic: &Diagnostic) -> Self {
        Self {
            severity: diagnostic.severity.to_string().to_lowercase(),
            summary: diagnostic.summary.clone(),
            detail: diagnostic.detail.clone(),
            subject: diagnostic.subject.as_ref().map(ToString::to_string),
        }
    }
}

impl From<&Diagnostics> for ValidateJson {
    fn from(diagnostics: &Diagnostics) -> Self {
        Self {
            valid: !diagnostics.has_errors(),
            error_count: diagnostics.errors().count(),
            diagnostics: diagnostics.iter().map(DiagnosticJson::from).collect(),
        }
    }
}

impl From<&ApplyOutcome> for ApplyJson {
    fn from(outcome: &ApplyOutcome) -> Self {
        Self {
            applied: outcome.applied,
            serial: outcome.state.serial,
            lineage: outcome.state.lineage.clone(),
            objects: outcome.state.object_count(),
            diagnostics: outcome.diagnostics.iter().map(DiagnosticJson::from).collect(),
        }
    }
}

impl From<&Plan> for PlanJson {
    fn from(plan: &Plan) -> Self {
        Self {
            format_version: plan.version(),
            mode: plan.mode().to_string(),
            status: plan.status().to_string(),
            applyable: plan.applyable(),
            complete: plan.complete(),
            errored: plan.errored(),
            created_at: plan.created_at().to_rfc3339(),
            config_fingerprint: plan.config_fingerprint().to_string(),
            resource_changes: plan.resource_changes().iter().map(ChangeJson::from).collect(),
            drift: plan.drift().iter().map(ChangeJson::from).collect(),
            skipped: plan
                .skipped()
                .iter()
                .map(|(node, cause)| (node.to_string(), cause.to_string()))
                .collect(),
            deferred: plan
                .deferred_changes()
                .iter()
                .map(|(addr, deferred)| DeferredJson {
                    address: addr.to_string(),
                    reason: deferred.reason.to_string(),
                    action: deferred.change.action().to_string(),
                })
                .collect(),
            outputs: plan
                .output_changes()
                .values()
                .map(|c| OutputJson {
                    address: c.addr.to_string(),
                    action: c.change.action.to_string(),
                    sensitive: c.sensitive,
                    after: json_value(&c.change.after, c.sensitive),
                })
                .collect(),
            actions: plan
                .action_invocations()
                .iter()
                .map(|i| InvocationJson {
                    address: i.addr.to_string(),
                    resource: i.trigger.resource.to_string(),
                    event: i.trigger.event.to_string(),
                })
                .collect(),
            checks: plan
                .checks()
                .values()
                .map(|c| CheckJson {
                    address: c.config_addr.to_string(),
                    status: c.status,
                    failure_messages: c.failure_messages.clone(),
                })
                .collect(),
            diagnostics: plan.diagnostics().iter().map(DiagnosticJson::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;

    #[test]
    fn test_valid_configuration_message() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_diagnostics(&Diagnostics::new());
        assert!(text.contains("The configuration is valid."));
    }

    #[test]
    fn test_provider_schemas() {
        colored::control::set_override(false);
        let mut registry = ProviderRegistry::new();
        registry
            .register("test", std::sync::Arc::new(crate::provider::TestProvider::new()))
            .expect("register");

        let text = OutputFormatter::new(OutputFormat::Text).format_provider_schemas(&registry);
        assert!(text.contains("provider \"test\""));
        assert!(text.contains("action      test_lifecycle (lifecycle)"));

        let json: serde_json::Value =
            serde_json::from_str(&OutputFormatter::new(OutputFormat::Json).format_provider_schemas(&registry))
                .expect("valid json");
        assert_eq!(json["format_version"], "1.0");
        assert!(json["provider_schemas"]["test"]["resource_schemas"]["test_resource"].is_object());
    }

    #[test]
    fn test_diagnostics_json() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("Invalid value", "must be positive"));
        diags.push(Diagnostic::warning("Deprecated", ""));

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_diagnostics(&diags)).expect("valid json");
        assert_eq!(json["valid"], false);
        assert_eq!(json["error_count"], 1);
        assert_eq!(json["diagnostics"][0]["severity"], "error");
        assert_eq!(json["diagnostics"][1]["summary"], "Deprecated");
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(reason_label(ActionReason::None), None);
        assert_eq!(reason_label(ActionReason::ReplaceByRequest), Some("replacement requested"));
    }

    #[test]
    fn test_sensitive_values_are_masked() {
        let value = DynamicValue::encode(&crate::lang::Value::string("hunter2"));
        assert_eq!(json_value(&value, true), serde_json::json!("(sensitive)"));
        assert_eq!(json_value(&value, false), serde_json::json!("hunter2"));
        assert_eq!(json_value(&DynamicValue::Null, true), serde_json::Value::Null);
    }
}
