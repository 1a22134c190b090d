//! Account identity merging across credential sources.
//!
//! The same real-world account can be observed from several places (the
//! CLI's own auth file, the encrypted account vault, a shared auth
//! document). Each observation is an [`AccountIdentity`]; [`merge`] folds
//! them into one [`MergedAccount`] per account.
//!
//! Pass 1 groups by account id, then lowercase email, then the raw token.
//! Pass 2 bridges pass-1 groups that share an email, which catches sources
//! that only know the email of an account another source only knows by id.
//! An account id is authoritative: two groups with different ids are never
//! merged just because their emails agree.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::path::PathBuf;

/// One observation of an account from one credential source.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub account_id: Option<String>,
    pub email: Option<String>,
    pub access_token: String,
    /// Lower is higher priority.
    pub source_rank: u32,
    /// Display labels of the sources that contributed, first-seen order.
    pub source_labels: Vec<String>,
    pub origin_path: PathBuf,
}

impl Debug for AccountIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountIdentity")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field("source_rank", &self.source_rank)
            .field("source_labels", &self.source_labels)
            .field("origin_path", &self.origin_path)
            .finish()
    }
}

impl AccountIdentity {
    pub fn new(
        access_token: impl Into<String>,
        source_label: impl Into<String>,
        source_rank: u32,
        origin_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            account_id: None,
            email: None,
            access_token: access_token.into(),
            source_rank,
            source_labels: vec![source_label.into()],
            origin_path: origin_path.into(),
        }
    }

    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = non_empty(account_id);
        self
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = non_empty(email);
        self
    }

    /// Lowercased email used for grouping.
    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().map(normalize_email)
    }
}

/// The single identity chosen for one real account after merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedAccount(AccountIdentity);

impl MergedAccount {
    pub fn identity(&self) -> &AccountIdentity {
        &self.0
    }

    pub fn into_identity(self) -> AccountIdentity {
        self.0
    }
}

impl Deref for MergedAccount {
    type Target = AccountIdentity;

    fn deref(&self) -> &AccountIdentity {
        &self.0
    }
}

/// Account-id to email links learned from a third signal (e.g. id_token claims).
#[derive(Debug, Clone, Default)]
pub struct EmailHints(HashMap<String, String>);

impl EmailHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, account_id: &str, email: &str) {
        if account_id.trim().is_empty() || email.trim().is_empty() {
            return;
        }
        self.0
            .insert(account_id.trim().to_string(), normalize_email(email));
    }

    pub fn get(&self, account_id: &str) -> Option<&str> {
        self.0.get(account_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Merges identities using each record's `source_rank` as its priority.
pub fn merge(accounts: Vec<AccountIdentity>) -> Vec<MergedAccount> {
    merge_with_hints(accounts, &EmailHints::default())
}

/// Merges identities with a caller-supplied priority (lower wins).
pub fn merge_by<F>(accounts: Vec<AccountIdentity>, priority_of: F) -> Vec<MergedAccount>
where
    F: Fn(&AccountIdentity) -> u32,
{
    merge_inner(accounts, &priority_of, &EmailHints::default())
}

/// Merges identities, letting `hints` bridge id-only records to an email.
pub fn merge_with_hints(accounts: Vec<AccountIdentity>, hints: &EmailHints) -> Vec<MergedAccount> {
    merge_inner(accounts, &|a: &AccountIdentity| a.source_rank, hints)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    AccountId(String),
    Email(String),
    Token(String),
}

/// Working state for one (possibly already folded) identity.
struct Member {
    /// First-seen input position of anything folded into this member.
    index: usize,
    priority: u32,
    identity: AccountIdentity,
    /// Every label with the input position it was first seen at.
    labels: Vec<(usize, String)>,
}

fn merge_inner(
    accounts: Vec<AccountIdentity>,
    priority_of: &dyn Fn(&AccountIdentity) -> u32,
    hints: &EmailHints,
) -> Vec<MergedAccount> {
    let members = accounts.into_iter().enumerate().map(|(index, mut identity)| {
        identity.account_id = non_empty(identity.account_id.take());
        identity.email = non_empty(identity.email.take());
        let labels = identity
            .source_labels
            .iter()
            .map(|label| (index, label.clone()))
            .collect();
        Member {
            index,
            priority: priority_of(&identity),
            identity,
            labels,
        }
    });

    let pass_one = group_by_primary_key(members);
    let mut merged = bridge_by_email(pass_one, hints);
    merged.sort_by_key(|m| m.index);
    merged
        .into_iter()
        .map(|m| MergedAccount(m.identity))
        .collect()
}

fn primary_key(identity: &AccountIdentity) -> GroupKey {
    if let Some(id) = &identity.account_id {
        GroupKey::AccountId(id.clone())
    } else if let Some(email) = identity.normalized_email() {
        GroupKey::Email(email)
    } else {
        GroupKey::Token(identity.access_token.clone())
    }
}

fn group_by_primary_key(members: impl Iterator<Item = Member>) -> Vec<Member> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Vec<Member>> = HashMap::new();
    for member in members {
        let key = primary_key(&member.identity);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(member);
    }

    order
        .iter()
        .filter_map(|key| groups.remove(key))
        .filter_map(fold)
        .collect()
}

fn bridge_by_email(members: Vec<Member>, hints: &EmailHints) -> Vec<Member> {
    let mut order: Vec<String> = Vec::new();
    let mut by_email: HashMap<String, Vec<Member>> = HashMap::new();
    let mut result = Vec::new();

    for member in members {
        let bridge = member.identity.normalized_email().or_else(|| {
            member
                .identity
                .account_id
                .as_deref()
                .and_then(|id| hints.get(id))
                .map(str::to_string)
        });
        match bridge {
            Some(email) => by_email
                .entry(email.clone())
                .or_insert_with(|| {
                    order.push(email);
                    Vec::new()
                })
                .push(member),
            None => result.push(member),
        }
    }

    for email in &order {
        if let Some(group) = by_email.remove(email) {
            result.extend(fold_email_group(group));
        }
    }
    result
}

/// Folds one email collision without ever joining two distinct account ids.
fn fold_email_group(group: Vec<Member>) -> Vec<Member> {
    let (mut with_id, without_id): (Vec<Member>, Vec<Member>) = group
        .into_iter()
        .partition(|m| m.identity.account_id.is_some());

    if with_id.len() <= 1 {
        with_id.extend(without_id);
        return fold(with_id).into_iter().collect();
    }

    // Several distinct ids share this email: id-less records join the
    // highest-priority id-bearing one, the others stay separate.
    with_id.sort_by_key(|m| (m.priority, m.index));
    let mut rest = with_id.split_off(1);
    with_id.extend(without_id);
    rest.extend(fold(with_id));
    rest
}

/// Folds a group into its highest-priority member.
fn fold(mut members: Vec<Member>) -> Option<Member> {
    members.sort_by_key(|m| (m.priority, m.index));
    let mut iter = members.into_iter();
    let mut primary = iter.next()?;

    for fallback in iter {
        if primary.identity.account_id.is_none() {
            primary.identity.account_id = fallback.identity.account_id;
        }
        if primary.identity.email.is_none() {
            primary.identity.email = fallback.identity.email;
        }
        primary.index = primary.index.min(fallback.index);
        primary.labels.extend(fallback.labels);
    }

    primary.labels.sort_by_key(|(index, _)| *index);
    let mut seen: Vec<(usize, String)> = Vec::with_capacity(primary.labels.len());
    for (index, label) in primary.labels.drain(..) {
        if !seen.iter().any(|(_, existing)| *existing == label) {
            seen.push((index, label));
        }
    }
    primary.identity.source_labels = seen.iter().map(|(_, label)| label.clone()).collect();
    primary.labels = seen;
    Some(primary)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "tests/accounts_tests.rs"]
mod tests;
