//! Provider-neutral usage model.
//!
//! Every provider adapter reduces its API response to a [`ProviderUsage`]:
//! one [`AccountUsage`] per real account, each holding the quota windows the
//! provider reports. These values are what the fetch orchestrator caches and
//! what the CLI prints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Length of a quota window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WindowSpan {
    #[default]
    Unknown,
    Minutes(u32),
    Hours(u32),
    Days(u32),
    /// Calendar month (billing period).
    Month,
}

impl WindowSpan {
    /// Fixed length of the span; calendar months have none.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            WindowSpan::Unknown | WindowSpan::Month => None,
            WindowSpan::Minutes(m) => Some(Duration::from_secs(*m as u64 * 60)),
            WindowSpan::Hours(h) => Some(Duration::from_secs(*h as u64 * 3600)),
            WindowSpan::Days(d) => Some(Duration::from_secs(*d as u64 * 86400)),
        }
    }

    /// Short label such as "5h" or "7d", normalised to the largest whole unit.
    pub fn label(&self) -> Option<String> {
        match self {
            WindowSpan::Unknown => None,
            WindowSpan::Month => Some("month".to_string()),
            WindowSpan::Minutes(m) if *m >= 60 && m % 60 == 0 => {
                WindowSpan::Hours(m / 60).label()
            }
            WindowSpan::Minutes(m) => Some(format!("{}m", m)),
            WindowSpan::Hours(h) if *h >= 24 && h % 24 == 0 => Some(format!("{}d", h / 24)),
            WindowSpan::Hours(h) => Some(format!("{}h", h)),
            WindowSpan::Days(d) => Some(format!("{}d", d)),
        }
    }
}

/// Absolute reset time as Unix epoch seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResetAt {
    pub epoch_seconds: i64,
}

impl ResetAt {
    pub fn from_epoch_seconds(epoch_seconds: i64) -> Self {
        Self { epoch_seconds }
    }

    /// Parses an RFC 3339 timestamp such as `2026-01-25T14:35:08Z`.
    pub fn parse_rfc3339(text: &str) -> Option<Self> {
        chrono::DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| Self::from_epoch_seconds(dt.timestamp()))
    }

    /// Time left until the reset, `None` once it has passed.
    pub fn remaining_at(&self, now_epoch_seconds: i64) -> Option<Duration> {
        let diff = self.epoch_seconds - now_epoch_seconds;
        (diff > 0).then(|| Duration::from_secs(diff as u64))
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(chrono::Utc::now().timestamp())
    }
}

/// One quota window of one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageWindow {
    /// Provider's name for the window ("five_hour", "premium_requests", ...).
    pub name: String,
    /// Percentage used, clamped to 0..=100.
    pub used_percent: Option<f64>,
    /// Absolute counts when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    pub resets_at: Option<ResetAt>,
    #[serde(default)]
    pub span: WindowSpan,
}

impl UsageWindow {
    pub fn new(name: impl Into<String>, span: WindowSpan) -> Self {
        Self {
            name: name.into(),
            used_percent: None,
            used: None,
            limit: None,
            resets_at: None,
            span,
        }
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.used_percent = Some(clamp_percent(percent));
        self
    }

    pub fn with_reset(mut self, resets_at: Option<ResetAt>) -> Self {
        self.resets_at = resets_at;
        self
    }

    /// Records absolute counts and derives the percentage from them.
    ///
    /// A zero limit leaves the percentage unknown.
    pub fn with_counts(mut self, used: f64, limit: f64) -> Self {
        self.used = Some(used);
        self.limit = Some(limit);
        if limit > 0.0 {
            self.used_percent = Some(clamp_percent(used / limit * 100.0));
        }
        self
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Usage of one account of a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountUsage {
    /// Email or other human-readable account name.
    pub account: Option<String>,
    pub plan: Option<String>,
    pub windows: Vec<UsageWindow>,
    /// Where the account's token came from ("Codex CLI", "Account Vault", ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Per-account failure when a provider reports several accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pay-as-you-go spend this billing period, in dollars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billed_amount: Option<f64>,
    /// Per-day breakdown, newest first, when the provider publishes one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<DailyUsage>,
}

impl AccountUsage {
    pub fn new(account: Option<String>) -> Self {
        Self {
            account,
            plan: None,
            windows: Vec::new(),
            sources: Vec::new(),
            error: None,
            billed_amount: None,
            history: Vec::new(),
        }
    }

    pub fn with_plan(mut self, plan: Option<String>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_window(mut self, window: UsageWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_billed_amount(mut self, amount: Option<f64>) -> Self {
        self.billed_amount = amount;
        self
    }

    pub fn with_history(mut self, history: Vec<DailyUsage>) -> Self {
        self.history = history;
        self
    }

    pub fn failed(account: Option<String>, error: impl Into<String>) -> Self {
        let mut usage = Self::new(account);
        usage.error = Some(error.into());
        usage
    }

    /// Window with the highest usage, the one a status line shows.
    pub fn tightest_window(&self) -> Option<&UsageWindow> {
        self.windows
            .iter()
            .filter(|w| w.used_percent.is_some())
            .max_by(|a, b| {
                let a = a.used_percent.unwrap_or(0.0);
                let b = b.used_percent.unwrap_or(0.0);
                a.total_cmp(&b)
            })
    }
}

/// Requests one model served on one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelUsage {
    pub model: String,
    pub included_requests: f64,
    pub billed_requests: f64,
    pub billed_amount: f64,
}

impl ModelUsage {
    pub fn total_requests(&self) -> f64 {
        self.included_requests + self.billed_requests
    }
}

/// One day of usage history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyUsage {
    /// Date as the provider prints it.
    pub date: String,
    pub included_requests: f64,
    pub billed_requests: f64,
    pub gross_amount: f64,
    pub billed_amount: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelUsage>,
}

impl DailyUsage {
    pub fn total_requests(&self) -> f64 {
        self.included_requests + self.billed_requests
    }
}

/// Requests per model summed over a history, busiest first.
///
/// Ties keep alphabetical order.
pub fn model_totals(history: &[DailyUsage]) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for model in history.iter().flat_map(|day| &day.models) {
        *totals.entry(model.model.as_str()).or_default() += model.total_requests();
    }
    let mut totals: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(model, requests)| (model.to_string(), requests))
        .collect();
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));
    totals
}

/// Everything one provider reported in one fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderUsage {
    pub provider: String,
    pub accounts: Vec<AccountUsage>,
}

impl ProviderUsage {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            accounts: Vec::new(),
        }
    }

    pub fn single(provider: impl Into<String>, account: AccountUsage) -> Self {
        Self {
            provider: provider.into(),
            accounts: vec![account],
        }
    }
}

/// Formats a countdown as "2d 3h", "4h 05m" or "45m".
///
/// Seconds are dropped; an elapsed or unknown countdown renders as "0m".
pub fn format_countdown(duration: Option<Duration>) -> String {
    let total_secs = duration.map(|d| d.as_secs()).unwrap_or(0);
    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;

    match (days, hours, minutes) {
        (0, 0, m) => format!("{}m", m),
        (0, h, m) => format!("{}h {:02}m", h, m),
        (d, 0, 0) => format!("{}d", d),
        (d, h, 0) => format!("{}d {}h", d, h),
        (d, h, m) => format!("{}d {}h {:02}m", d, h, m),
    }
}

#[cfg(test)]
#[path = "tests/usage_tests.rs"]
mod tests;
