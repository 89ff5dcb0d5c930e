//! Parser for `server.properties`
//! Line-oriented `key=value` pairs; `#` comments and blank lines are ignored

use crate::error::{AppError, AppResult};
use std::path::Path;

pub const DEFAULT_SERVER_PORT: u16 = 19132;
pub const DEFAULT_SERVER_PORT_V6: u16 = 19133;
pub const DEFAULT_MAX_PLAYERS: u32 = 10;

/// Key-value settings of one instance, kept in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProperties {
    entries: Vec<(String, String)>,
}

impl ServerProperties {
    /// Parse properties from file content
    pub fn parse(content: &str) -> Self {
        let mut props = Self::default();

        for line in content.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                props.set(key.trim(), value.trim());
            }
        }

        props
    }

    /// Read and parse a properties file
    pub async fn load(path: &Path) -> AppResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(Self::parse(&content))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a value, replacing an existing key in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.get("server-name")
    }

    pub fn gamemode(&self) -> Option<&str> {
        self.get("gamemode")
    }

    pub fn level_name(&self) -> Option<&str> {
        self.get("level-name")
    }

    pub fn level_type(&self) -> Option<&str> {
        self.get("level-type")
    }

    pub fn difficulty(&self) -> Option<&str> {
        self.get("difficulty")
    }

    pub fn server_port(&self) -> u16 {
        self.parsed("server-port").unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn server_port_v6(&self) -> u16 {
        self.parsed("server-portv6").unwrap_or(DEFAULT_SERVER_PORT_V6)
    }

    pub fn max_players(&self) -> u32 {
        self.parsed("max-players").unwrap_or(DEFAULT_MAX_PLAYERS)
    }

    pub fn allow_cheats(&self) -> bool {
        self.get("allow-cheats")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }
}
