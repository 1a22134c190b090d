//! Fixture builders shared by the credential tests.

use crate::crypto::chromium::{self, CookieKey, CookieVersion};
use crate::crypto::fernet;
use crate::protowire::encode_varint;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use rusqlite::{params, Connection};
use std::path::Path;

pub const VAULT_KEY: [u8; 32] = [7u8; 32];

pub fn vault_key_text() -> String {
    URL_SAFE.encode(VAULT_KEY)
}

/// Fernet token text for `payload`, as written into the vault's token column.
pub fn vault_token(payload: &str) -> String {
    URL_SAFE.encode(fernet::seal(
        &VAULT_KEY,
        payload.as_bytes(),
        [9u8; 16],
        1_700_000_000,
    ))
}

/// Creates `accounts.db` + `accounts.key` under `dir` with one row per
/// `(id, label, email, token)`.
pub fn write_vault(dir: &Path, rows: &[(&str, &str, &str, String)]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("accounts.key"), vault_key_text()).unwrap();
    let conn = Connection::open(dir.join("accounts.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE accounts (id TEXT PRIMARY KEY, label TEXT, email TEXT, token TEXT NOT NULL)",
    )
    .unwrap();
    for (id, label, email, token) in rows {
        conn.execute(
            "INSERT INTO accounts (id, label, email, token) VALUES (?1, ?2, ?3, ?4)",
            params![id, label, email, token],
        )
        .unwrap();
    }
}

/// Creates a Chromium `Cookies` database with `(host, name, plain value, encrypted value)` rows.
pub fn write_chromium_cookies(path: &Path, rows: &[(&str, &str, &str, Vec<u8>)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE cookies (host_key TEXT, name TEXT, value TEXT, encrypted_value BLOB)",
    )
    .unwrap();
    for (host, name, value, encrypted) in rows {
        conn.execute(
            "INSERT INTO cookies (host_key, name, value, encrypted_value) VALUES (?1, ?2, ?3, ?4)",
            params![host, name, value, encrypted],
        )
        .unwrap();
    }
}

/// Creates a Firefox `cookies.sqlite` with `(host, name, value)` rows.
pub fn write_firefox_cookies(path: &Path, rows: &[(&str, &str, &str)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    conn.execute_batch("CREATE TABLE moz_cookies (host TEXT, name TEXT, value TEXT)")
        .unwrap();
    for (host, name, value) in rows {
        conn.execute(
            "INSERT INTO moz_cookies (host, name, value) VALUES (?1, ?2, ?3)",
            params![host, name, value],
        )
        .unwrap();
    }
}

/// Encrypted cookie blob readable with the macOS flavor of `password`.
pub fn encrypted_cookie(password: &str, value: &str) -> Vec<u8> {
    let key = CookieKey::derive(password).unwrap();
    let mut plaintext = vec![0xffu8; 32];
    plaintext.extend_from_slice(value.as_bytes());
    chromium::seal(&key, &plaintext)
}

/// Linux blob of the given version; no filler, one PBKDF2 round.
pub fn linux_cookie(version: CookieVersion, password: &str, value: &str) -> Vec<u8> {
    let key = CookieKey::derive_linux(password).unwrap();
    chromium::seal_as(version, &key, value.as_bytes())
}

pub fn field_bytes(field: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = encode_varint((field << 3) | 2);
    out.extend(encode_varint(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn field_varint(field: u64, value: u64) -> Vec<u8> {
    let mut out = encode_varint(field << 3);
    out.extend(encode_varint(value));
    out
}

/// Base64 local session record as the IDE stores it.
pub fn session_blob(access: &str, refresh: &str, expiry_secs: u64, email: &str) -> String {
    let expiry = field_varint(1, expiry_secs);
    let mut token = field_bytes(1, access.as_bytes());
    token.extend(field_bytes(2, b"Bearer"));
    token.extend(field_bytes(3, refresh.as_bytes()));
    token.extend(field_bytes(4, &expiry));

    let mut outer = field_bytes(1, &token);
    outer.extend(field_bytes(2, email.as_bytes()));
    STANDARD.encode(outer)
}
