//! Server configuration: TOML file merged under command-line/env values.
//!
//! # Invariants
//! - Explicit flags and env vars win over file values; file values win over
//!   built-in defaults.
//! - Every configured token maps to a non-blank identity and a known role.

use anyhow::{anyhow, bail, Context, Result};
use golden_graph_core::{parse_role, Caller};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_DB_PATH: &str = "golden_graph.db";

/// On-disk config file shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// One `[[tokens]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenEntry {
    pub token: String,
    pub identity: String,
    pub role: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config `{}`", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub tokens: TokenTable,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides, default_level: &str) -> Result<Self> {
        let listen = match overrides.listen.or(file.listen) {
            Some(addr) => addr,
            None => DEFAULT_LISTEN
                .parse()
                .map_err(|err| anyhow!("invalid default listen address: {err}"))?,
        };
        Ok(Self {
            listen,
            db_path: overrides
                .db_path
                .or(file.db_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            log_level: overrides
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| default_level.to_string()),
            log_dir: overrides.log_dir.or(file.log_dir),
            tokens: TokenTable::from_entries(&file.tokens)?,
        })
    }
}

/// Bearer token -> caller lookup.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    callers: HashMap<String, Caller>,
}

impl TokenTable {
    pub fn from_entries(entries: &[TokenEntry]) -> Result<Self> {
        let mut callers = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let token = entry.token.trim();
            if token.is_empty() {
                bail!("tokens[{index}]: token must not be blank");
            }
            let role = parse_role(&entry.role).map_err(|err| anyhow!("tokens[{index}]: {err}"))?;
            let caller = Caller::authenticated(entry.identity.as_str(), role);
            if caller.identity().is_none() {
                bail!("tokens[{index}]: identity must not be blank");
            }
            if callers.insert(token.to_string(), caller).is_some() {
                bail!("tokens[{index}]: duplicate token");
            }
        }
        Ok(Self { callers })
    }

    pub fn lookup(&self, token: &str) -> Option<&Caller> {
        self.callers.get(token)
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}
