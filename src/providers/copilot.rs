//! GitHub Copilot premium-request usage via the billing pages.
//!
//! There is no token-based API for this, so the adapter reuses a signed-in
//! browser session: github.com cookies are read from the first browser
//! profile that is signed in. Besides the monthly card, the daily usage
//! table is read for per-day and per-model history.

use super::http::HttpClient;
use super::{blocking, not_configured, ProviderContext};
use crate::credentials::{CookieJar, CredentialError, DecodeError};
use crate::fetch::{FetchError, ProviderId, UsageProvider};
use crate::usage::{AccountUsage, DailyUsage, ModelUsage, ProviderUsage, UsageWindow, WindowSpan};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

pub const PROVIDER_ID: &str = "copilot";

const BILLING_URL: &str = "https://github.com/settings/billing";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const USER_COOKIE: &str = "dotcom_user";

static CUSTOMER_ID: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#""customerId":\s*(\d+)"#));

#[derive(Clone)]
pub struct CopilotProvider {
    ctx: ProviderContext,
}

impl CopilotProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn fetch_blocking(&self) -> Result<ProviderUsage, FetchError> {
        let jar = match self.ctx.store.cookies() {
            Ok(Some(jar)) => jar,
            Ok(None) => return Err(not_configured("no browser profile has github.com cookies")),
            Err(CredentialError::Corrupt {
                source: DecodeError::NotSignedIn { profile },
                ..
            }) => {
                return Err(FetchError::Authentication(format!(
                    "{} is not signed in to GitHub",
                    profile
                )))
            }
            Err(err) => return Err(err.into()),
        };
        debug!("Using GitHub session from {}", jar.profile);

        let session = GitHubSession::new(&self.ctx.http, &jar);
        let page = session.get(BILLING_URL, "text/html")?;
        let customer_id = parse_customer_id(&page)?;
        let card = session.get(&usage_card_url(&customer_id), "application/json")?;
        let card: Value = serde_json::from_str(&card)?;

        let history = match session.get(&usage_table_url(&customer_id, 1), "application/json") {
            Ok(table) => serde_json::from_str::<Value>(&table)
                .map(|table| parse_daily_usage(&table))
                .unwrap_or_else(|err| {
                    warn!("Copilot usage table is not JSON: {}", err);
                    Vec::new()
                }),
            Err(err) => {
                warn!("Copilot usage history unavailable: {}", err);
                Vec::new()
            }
        };

        let account = AccountUsage::new(jar.get(USER_COOKIE).map(String::from))
            .with_window(parse_usage_card(&card))
            .with_billed_amount(card["netBilledAmount"].as_f64())
            .with_history(history);
        Ok(ProviderUsage::single(PROVIDER_ID, account))
    }
}

/// Requests carrying the browser session's cookies.
struct GitHubSession<'a> {
    http: &'a HttpClient,
    cookie_header: String,
}

impl<'a> GitHubSession<'a> {
    fn new(http: &'a HttpClient, jar: &CookieJar) -> Self {
        Self {
            http,
            cookie_header: jar.header(),
        }
    }

    fn get(&self, url: &str, accept: &str) -> Result<String, FetchError> {
        self.http
            .get_text(
                url,
                &[
                    ("Cookie", self.cookie_header.as_str()),
                    ("User-Agent", USER_AGENT),
                    ("Accept", accept),
                    ("X-Requested-With", "XMLHttpRequest"),
                ],
            )
            .map_err(|err| match err {
                FetchError::Authentication(_) => FetchError::Authentication(
                    "GitHub session expired; sign in again in the browser".to_string(),
                ),
                other => other,
            })
    }
}

pub fn usage_card_url(customer_id: &str) -> String {
    format!(
        "{}/copilot_usage_card?customer_id={}&period=3",
        BILLING_URL, customer_id
    )
}

/// One page of the daily usage table for the current billing period.
pub fn usage_table_url(customer_id: &str, page: u32) -> String {
    format!(
        "{}/copilot_usage_table?customer_id={}&group=0&period=3&query=&page={}",
        BILLING_URL, customer_id, page
    )
}

/// Customer id embedded in the billing page.
pub fn parse_customer_id(page: &str) -> Result<String, FetchError> {
    let pattern = CUSTOMER_ID
        .as_ref()
        .map_err(|err| FetchError::Decode(err.to_string()))?;
    pattern
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            FetchError::Decode("billing page has no customer id; is the session signed in?".into())
        })
}

/// Premium requests used this month against the plan entitlement.
///
/// Discounted (included) requests count as used alongside billed ones.
pub fn parse_usage_card(card: &Value) -> UsageWindow {
    let number = |key: &str| card[key].as_f64().unwrap_or(0.0);
    let used = number("netQuantity") + number("discountQuantity");
    let entitlement = number("userPremiumRequestEntitlement");
    UsageWindow::new("premium_requests", WindowSpan::Month).with_counts(used, entitlement)
}

/// Daily rows of the usage table, each with its per-model subtable.
///
/// Row cells are date, included requests, billed requests, gross amount
/// and billed amount. Rows with fewer cells are skipped.
pub fn parse_daily_usage(table: &Value) -> Vec<DailyUsage> {
    let Some(rows) = table["table"]["rows"].as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let cells = row_cells(row)?;
            let models = row["subtable"]["rows"]
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            let cells = row_cells(row)?;
                            Some(ModelUsage {
                                model: cell_text(&cells[0]),
                                included_requests: cell_number(&cells[1]),
                                billed_requests: cell_number(&cells[2]),
                                billed_amount: cell_number(&cells[4]),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(DailyUsage {
                date: cell_text(&cells[0]),
                included_requests: cell_number(&cells[1]),
                billed_requests: cell_number(&cells[2]),
                gross_amount: cell_number(&cells[3]),
                billed_amount: cell_number(&cells[4]),
                models,
            })
        })
        .collect()
}

fn row_cells(row: &Value) -> Option<&Vec<Value>> {
    row["cells"].as_array().filter(|cells| cells.len() >= 5)
}

fn cell_text(cell: &Value) -> String {
    match &cell["value"] {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Cell value as a number: `"1,204"` and `"$3.20"` both parse; blanks are zero.
fn cell_number(cell: &Value) -> f64 {
    match &cell["value"] {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(text) => text.trim().replace(['$', ','], "").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[async_trait]
impl UsageProvider for CopilotProvider {
    type Usage = ProviderUsage;

    fn id(&self) -> ProviderId {
        ProviderId::new(PROVIDER_ID)
    }

    fn timeout(&self) -> Duration {
        self.ctx.timeout
    }

    async fn fetch(&self) -> Result<ProviderUsage, FetchError> {
        let this = self.clone();
        blocking(move || this.fetch_blocking()).await
    }
}

#[cfg(test)]
#[path = "tests/copilot_tests.rs"]
mod tests;
