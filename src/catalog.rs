//! Token Catalog (§4.1, §3.1): an immutable map of token-id → metadata,
//! loaded once at startup from a JSON file. Loading failure is fatal — the
//! system has no default tokens to fall back to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryType {
    Personal,
    Business,
    Technical,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl MemoryType {
    /// §3.1 `typeMultiplier`.
    pub fn multiplier(self) -> u32 {
        match self {
            MemoryType::Personal => 1,
            MemoryType::Business => 3,
            MemoryType::Technical => 5,
            MemoryType::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "processingImage")]
    pub processing_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(rename = "memoryType")]
    pub memory_type: MemoryType,
    #[serde(rename = "valueRating")]
    pub value_rating: Option<u8>,
    #[serde(default)]
    pub group: String,
    #[serde(rename = "mediaAssets", default)]
    pub media_assets: MediaAssets,
}

impl Token {
    /// §3.1 `basePoints`.
    fn base_points(&self) -> u32 {
        match self.value_rating {
            Some(1) => 100,
            Some(2) => 500,
            Some(3) => 1000,
            Some(4) => 5000,
            Some(5) => 10000,
            _ => 0,
        }
    }

    /// `tokenValue = basePoints × typeMultiplier` (§3.1).
    pub fn token_value(&self) -> u32 {
        self.base_points() * self.memory_type.multiplier()
    }

    /// Parses the `"<name> (xN)"` group encoding. Returns `None` for an
    /// empty group string.
    pub fn group_spec(&self) -> Option<GroupSpec> {
        parse_group(&self.group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: String,
    pub size: u32,
}

fn parse_group(raw: &str) -> Option<GroupSpec> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let open = raw.rfind('(')?;
    let close = raw.rfind(')')?;
    if close < open {
        return None;
    }
    let name = raw[..open].trim().to_string();
    let count_part = raw[open + 1..close].trim();
    let count_str = count_part.strip_prefix('x').or_else(|| count_part.strip_prefix('X'))?;
    let size: u32 = count_str.parse().ok()?;
    if name.is_empty() || size == 0 {
        return None;
    }
    Some(GroupSpec { name, size })
}

/// Token id pattern: `^[A-Za-z_0-9]+$`, 1–100 chars (§3.1).
pub fn is_valid_token_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 100
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Team id pattern: `^[0-9]{3}$` (§3.2).
pub fn is_valid_team_id(id: &str) -> bool {
    id.len() == 3 && id.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug)]
pub struct TokenCatalog {
    tokens: HashMap<String, Token>,
}

impl TokenCatalog {
    /// Loads the catalog from a JSON file: either `{id: {...}, ...}` or
    /// `[{id, ...}, ...]`. Fatal on any I/O or parse error.
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read token catalog {path}: {e}"))?;
        Self::load_from_str(&raw)
    }

    pub fn load_from_str(raw: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let mut tokens = HashMap::new();

        match value {
            serde_json::Value::Object(map) => {
                for (id, entry) in map {
                    let mut token: Token = serde_json::from_value(entry)?;
                    token.id = id.clone();
                    tokens.insert(id, token);
                }
            }
            serde_json::Value::Array(items) => {
                for entry in items {
                    let token: Token = serde_json::from_value(entry)?;
                    tokens.insert(token.id.clone(), token);
                }
            }
            _ => anyhow::bail!("token catalog must be a JSON object or array"),
        }

        if tokens.is_empty() {
            tracing::warn!("token catalog loaded with zero entries");
        } else {
            tracing::info!(count = tokens.len(), "token catalog loaded");
        }

        Ok(Self { tokens })
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
