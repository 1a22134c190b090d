//! Human and JSON renderings of what the CLI fetched or discovered.

use crate::accounts::MergedAccount;
use crate::credentials::{LocationReport, SecretKind};
use crate::fetch::{FetchReport, ProviderId};
use crate::usage::{format_countdown, model_totals, AccountUsage, ProviderUsage, UsageWindow};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::fmt::Write;

/// Renders one orchestrator pass, providers in `order`.
///
/// `now` anchors the reset countdowns.
pub fn render_usage_text(
    report: &FetchReport<ProviderUsage>,
    order: &[ProviderId],
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    for id in order {
        let result = report.results.get(id);
        let error = report.errors.get(id);
        if result.is_none() && error.is_none() {
            continue;
        }

        match result {
            Some(result) if result.stale => {
                let _ = writeln!(
                    out,
                    "{} (stale, fetched {})",
                    id,
                    result.fetched_at.format("%Y-%m-%d %H:%M UTC")
                );
            }
            _ => {
                let _ = writeln!(out, "{}", id);
            }
        }

        if let Some(result) = result {
            for account in &result.usage.accounts {
                render_account(&mut out, account, now);
            }
        }
        if let Some(error) = error {
            let _ = writeln!(out, "  error: {}", error);
        }
    }
    out
}

fn render_account(out: &mut String, account: &AccountUsage, now: DateTime<Utc>) {
    let name = account.account.as_deref().unwrap_or("(unknown account)");
    match &account.plan {
        Some(plan) => {
            let _ = writeln!(out, "  {} [{}]", name, plan);
        }
        None => {
            let _ = writeln!(out, "  {}", name);
        }
    }
    if !account.sources.is_empty() {
        let _ = writeln!(out, "    via {}", account.sources.join(", "));
    }
    for window in &account.windows {
        let _ = writeln!(out, "    {}", window_line(window, now));
    }
    if let Some(amount) = account.billed_amount.filter(|a| *a > 0.0) {
        let _ = writeln!(out, "    add-on cost ${:.2}", amount);
    }
    render_history(out, account);
    if let Some(error) = &account.error {
        let _ = writeln!(out, "    error: {}", error);
    }
}

const RECENT_DAYS: usize = 10;
const TOP_MODELS: usize = 5;

fn render_history(out: &mut String, account: &AccountUsage) {
    if account.history.is_empty() {
        return;
    }
    out.push_str("    recent days\n");
    for day in account.history.iter().take(RECENT_DAYS) {
        let _ = write!(out, "      {}  {:.0} req", day.date, day.total_requests());
        if day.billed_requests > 0.0 {
            let _ = write!(out, " (${:.2})", day.billed_amount);
        }
        out.push('\n');
    }
    let models = model_totals(&account.history);
    if !models.is_empty() {
        out.push_str("    top models\n");
        for (model, requests) in models.iter().take(TOP_MODELS) {
            let _ = writeln!(out, "      {}  {:.0} req", model, requests);
        }
    }
}

/// `five_hour (5h)  42%  resets in 2h 05m`
pub fn window_line(window: &UsageWindow, now: DateTime<Utc>) -> String {
    let mut line = window.name.clone();
    if let Some(label) = window.span.label() {
        let _ = write!(line, " ({})", label);
    }

    match (window.used_percent, window.used, window.limit) {
        (_, Some(used), Some(limit)) if limit > 0.0 => {
            let _ = write!(
                line,
                "  {:.0}/{:.0} ({:.0}%)",
                used,
                limit,
                window.used_percent.unwrap_or(0.0)
            );
        }
        (_, Some(used), _) => {
            let _ = write!(line, "  {:.0} used, no limit", used);
        }
        (Some(percent), _, _) => {
            let _ = write!(line, "  {:.0}%", percent);
        }
        (None, None, _) => line.push_str("  n/a"),
    }

    if let Some(reset) = window.resets_at {
        let remaining = reset.remaining_at(now.timestamp());
        let _ = write!(line, "  resets in {}", format_countdown(remaining));
    }
    line
}

/// `{"results": {id: {usage, fetched_at, stale}}, "errors": {id: message}}`
pub fn render_usage_json(report: &FetchReport<ProviderUsage>) -> Value {
    let mut results = Map::new();
    for (id, result) in &report.results {
        results.insert(
            id.to_string(),
            json!({
                "usage": result.usage,
                "fetched_at": result.fetched_at.to_rfc3339(),
                "stale": result.stale,
            }),
        );
    }
    let errors: Map<String, Value> = report
        .errors
        .iter()
        .map(|(id, message)| (id.to_string(), Value::String(message.clone())))
        .collect();
    json!({ "results": results, "errors": errors })
}

/// One block per merged account with the sources that contributed to it.
pub fn render_accounts_text(accounts: &[MergedAccount], api_key_only: bool) -> String {
    let mut out = String::new();
    if accounts.is_empty() {
        out.push_str("No Codex accounts found.\n");
    }
    for account in accounts {
        let name = account
            .email
            .as_deref()
            .or(account.account_id.as_deref())
            .unwrap_or("(unknown account)");
        let _ = writeln!(out, "{}", name);
        if let Some(id) = &account.account_id {
            let _ = writeln!(out, "  Account ID: {}", id);
        }
        let _ = writeln!(out, "  Token From: {}", account.source_labels.join(", "));
        let _ = writeln!(out, "  Path: {}", account.origin_path.display());
    }
    if api_key_only {
        out.push_str("Codex CLI is configured with an API key; it has no usage windows.\n");
    }
    out
}

pub fn render_accounts_json(accounts: &[MergedAccount], api_key_only: bool) -> Value {
    let accounts: Vec<Value> = accounts
        .iter()
        .map(|account| {
            json!({
                "account_id": account.account_id,
                "email": account.email,
                "sources": account.source_labels,
                "path": account.origin_path.display().to_string(),
            })
        })
        .collect();
    json!({ "accounts": accounts, "api_key_only": api_key_only })
}

/// Every candidate location per secret, with the status of the last resolution.
pub fn render_sources_text(reports: &[(SecretKind, Vec<LocationReport>)]) -> String {
    let mut out = String::new();
    for (kind, locations) in reports {
        let _ = writeln!(out, "{}", kind);
        if locations.is_empty() {
            out.push_str("  (no candidate locations)\n");
        }
        for report in locations {
            let status = report.status.to_string();
            let _ = write!(out, "  {:<10} {}", status, report.location.path.display());
            if let Some(label) = &report.location.label {
                let _ = write!(out, " [{}]", label);
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;
