//! Encrypted multi-account store.
//!
//! A vault is a directory holding `accounts.db` (SQLite, one row per
//! account) and `accounts.key` (base64url Fernet key). Each row's `token`
//! column is a Fernet token over a JSON payload. Rows are decrypted one at
//! a time; a row that fails is dropped without affecting its siblings.

use super::decode;
use super::error::DecodeError;
use super::snapshot::DatabaseSnapshot;
use super::types::VaultAccount;
use crate::crypto::fernet::{self, FernetKey};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DATABASE_FILE: &str = "accounts.db";
pub const KEY_FILE: &str = "accounts.key";

/// Files that make up a vault rooted at `dir`.
pub fn vault_files(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join(DATABASE_FILE), dir.join(KEY_FILE))
}

struct VaultRow {
    id: String,
    label: Option<String>,
    email: Option<String>,
    token: Vec<u8>,
}

/// Reads and decrypts every usable account in the vault at `dir`.
pub fn read_vault(dir: &Path) -> Result<Vec<VaultAccount>, DecodeError> {
    let (db_path, key_path) = vault_files(dir);
    let key_text = std::fs::read_to_string(&key_path)?;
    let key = FernetKey::from_base64(&key_text)?;

    let snapshot = DatabaseSnapshot::open(&db_path)?;
    let rows = load_rows(&snapshot)?;
    let total = rows.len();

    let accounts: Vec<VaultAccount> = rows
        .into_iter()
        .filter_map(|row| match decrypt_row(&key, &row) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!("Dropping vault account '{}': {}", row.id, e);
                None
            }
        })
        .collect();

    if total > 0 && accounts.is_empty() {
        return Err(DecodeError::NoUsableEntries { dropped: total });
    }
    Ok(accounts)
}

fn load_rows(snapshot: &DatabaseSnapshot) -> Result<Vec<VaultRow>, DecodeError> {
    let mut stmt = snapshot
        .connection()
        .prepare("SELECT id, label, email, token FROM accounts ORDER BY rowid")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(VaultRow {
                id: row.get::<_, rusqlite::types::Value>(0).map(value_to_string)?,
                label: row.get(1)?,
                email: row.get(2)?,
                token: row.get::<_, rusqlite::types::Value>(3).map(value_to_bytes)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn value_to_string(value: rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
        Value::Null => String::new(),
    }
}

/// Tokens are stored as text by most writers, but blobs are accepted too.
fn value_to_bytes(value: rusqlite::types::Value) -> Vec<u8> {
    use rusqlite::types::Value;
    match value {
        Value::Text(s) => s.into_bytes(),
        Value::Blob(b) => b,
        _ => Vec::new(),
    }
}

fn decrypt_row(key: &FernetKey, row: &VaultRow) -> Result<VaultAccount, DecodeError> {
    let plaintext = fernet::decrypt(key, &row.token)?;
    let mut credential = decode::vault_payload(&plaintext)?;
    if credential.email.is_none() {
        credential.email = row.email.clone().filter(|e| !e.trim().is_empty());
    }
    Ok(VaultAccount {
        id: row.id.clone(),
        label: row.label.clone().filter(|l| !l.trim().is_empty()),
        credential,
    })
}

#[cfg(test)]
#[path = "tests/vault_tests.rs"]
mod tests;
