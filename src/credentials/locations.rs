//! Candidate file locations for each secret.
//!
//! Resolution is a pure function of a [`SecretEnvironment`] snapshot: the
//! override env var comes first, then XDG locations, then the platform
//! fallback. Nothing here touches the filesystem except browser profile
//! discovery in [`super::cookies`].

use super::types::SecretKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Home directory and environment variables captured once.
#[derive(Debug, Clone, Default)]
pub struct SecretEnvironment {
    home: Option<PathBuf>,
    vars: HashMap<String, String>,
}

impl SecretEnvironment {
    /// Snapshot of the running process.
    pub fn from_process() -> Self {
        Self {
            home: dirs::home_dir(),
            vars: std::env::vars().collect(),
        }
    }

    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            vars: HashMap::new(),
        }
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    /// Non-empty value of an env var.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Expands a template prefix (`~`, `$XDG_CONFIG_HOME`, `$XDG_DATA_HOME`,
    /// `$APP_SUPPORT`). Returns `None` when the base cannot be determined.
    pub fn expand(&self, template: &str) -> Option<PathBuf> {
        let (base, rest) = if let Some(rest) = template.strip_prefix("$XDG_CONFIG_HOME") {
            (self.xdg_dir("XDG_CONFIG_HOME", ".config")?, rest)
        } else if let Some(rest) = template.strip_prefix("$XDG_DATA_HOME") {
            (self.xdg_dir("XDG_DATA_HOME", ".local/share")?, rest)
        } else if let Some(rest) = template.strip_prefix("$APP_SUPPORT") {
            (self.home()?.join("Library/Application Support"), rest)
        } else if let Some(rest) = template.strip_prefix('~') {
            (self.home()?.to_path_buf(), rest)
        } else {
            let path = PathBuf::from(template);
            return path.is_absolute().then_some(path);
        };

        let rest = rest.trim_start_matches('/');
        Some(if rest.is_empty() { base } else { base.join(rest) })
    }

    fn xdg_dir(&self, var: &str, default: &str) -> Option<PathBuf> {
        match self.var(var) {
            Some(dir) if Path::new(dir).is_absolute() => Some(PathBuf::from(dir)),
            _ => self.home().map(|h| h.join(default)),
        }
    }
}

/// How the override env var's value maps to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    /// The variable names a directory; the secret's file name is appended.
    Directory(&'static str),
    /// The variable names the file (or directory for directory secrets) itself.
    Path,
}

/// Where to look for one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSpec {
    pub name: &'static str,
    pub override_var: Option<(&'static str, Override)>,
    pub fallbacks: Vec<&'static str>,
}

impl LocationSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            override_var: None,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_override(mut self, var: &'static str, how: Override) -> Self {
        self.override_var = Some((var, how));
        self
    }

    pub fn with_fallback(mut self, template: &'static str) -> Self {
        self.fallbacks.push(template);
        self
    }

    /// The built-in catalog entry for a secret kind.
    pub fn for_kind(kind: SecretKind) -> Self {
        match kind {
            SecretKind::ClaudeOAuth => LocationSpec::new("Claude credentials")
                .with_override("CLAUDE_CONFIG_DIR", Override::Directory(".credentials.json"))
                .with_fallback("$XDG_CONFIG_HOME/claude/.credentials.json")
                .with_fallback("~/.claude/.credentials.json"),
            SecretKind::CodexAuth => LocationSpec::new("Codex auth")
                .with_override("CODEX_HOME", Override::Directory("auth.json"))
                .with_fallback("~/.codex/auth.json"),
            SecretKind::GeminiOAuth => LocationSpec::new("Gemini OAuth")
                .with_override("GEMINI_DIR", Override::Directory("oauth_creds.json"))
                .with_fallback("$XDG_CONFIG_HOME/gemini/oauth_creds.json")
                .with_fallback("~/.gemini/oauth_creds.json"),
            SecretKind::AuthDocument => LocationSpec::new("OpenCode auth document")
                .with_override("QUOTABAR_AUTH_DOCUMENT", Override::Path)
                .with_fallback("$XDG_DATA_HOME/opencode/auth.json")
                .with_fallback("$APP_SUPPORT/opencode/auth.json"),
            SecretKind::AccountVault => LocationSpec::new("Codex account vault")
                .with_override("QUOTABAR_VAULT_DIR", Override::Path)
                .with_fallback("$XDG_DATA_HOME/codexbar")
                .with_fallback("$APP_SUPPORT/CodexBar"),
            SecretKind::LocalSession => LocationSpec::new("Antigravity session")
                .with_override("QUOTABAR_LOCAL_SESSION", Override::Path)
                .with_fallback("$XDG_CONFIG_HOME/Antigravity/User/globalStorage/state.vscdb")
                .with_fallback("$APP_SUPPORT/Antigravity/User/globalStorage/state.vscdb"),
            // Browser profiles are discovered on disk rather than templated.
            SecretKind::BrowserCookies => LocationSpec::new("Browser cookies"),
        }
    }
}

/// One candidate path; rank 0 is the highest priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLocation {
    pub path: PathBuf,
    pub rank: usize,
    /// Human label shown in diagnostics, e.g. the browser profile name.
    pub label: Option<String>,
}

impl SecretLocation {
    pub fn new(path: impl Into<PathBuf>, rank: usize) -> Self {
        Self {
            path: path.into(),
            rank,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Ordered, de-duplicated candidates for `spec`. Never fails.
pub fn resolve_locations(spec: &LocationSpec, env: &SecretEnvironment) -> Vec<SecretLocation> {
    let mut paths: Vec<PathBuf> = Vec::new();

    if let Some((var, how)) = spec.override_var {
        if let Some(value) = env.var(var) {
            let base = env
                .expand(value)
                .unwrap_or_else(|| PathBuf::from(value.trim()));
            paths.push(match how {
                Override::Directory(file_name) => base.join(file_name),
                Override::Path => base,
            });
        }
    }

    paths.extend(spec.fallbacks.iter().filter_map(|t| env.expand(t)));

    let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }

    unique
        .into_iter()
        .enumerate()
        .map(|(rank, path)| SecretLocation::new(path, rank))
        .collect()
}

#[cfg(test)]
#[path = "tests/locations_tests.rs"]
mod tests;
