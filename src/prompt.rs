//! Typed prompt templates.
//!
//! The summary instruction is rendered from named fields so the limit count
//! and unit can never be swapped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Unit a summary length limit is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitUnit {
    #[default]
    Characters,
    Tokens,
    Sentences,
}

impl LimitUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitUnit::Characters => "characters",
            LimitUnit::Tokens => "tokens",
            LimitUnit::Sentences => "sentences",
        }
    }
}

impl fmt::Display for LimitUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "characters" | "character" | "chars" | "char" => Ok(LimitUnit::Characters),
            "tokens" | "token" => Ok(LimitUnit::Tokens),
            "sentences" | "sentence" => Ok(LimitUnit::Sentences),
            other => Err(ConfigError::InvalidLimit {
                input: s.to_string(),
                message: format!(
                    "unknown unit '{}', expected characters, tokens or sentences",
                    other
                ),
            }),
        }
    }
}

/// Target size of the final summary, e.g. `500 characters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub count: u32,
    pub unit: LimitUnit,
}

impl Limit {
    pub fn new(count: u32, unit: LimitUnit) -> Self {
        Self { count, unit }
    }
}

impl Default for Limit {
    fn default() -> Self {
        Self::new(500, LimitUnit::Characters)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.unit)
    }
}

/// Parses `"<count> [unit]"`; a bare number means characters.
impl FromStr for Limit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ConfigError::InvalidLimit {
            input: s.to_string(),
            message: message.to_string(),
        };

        let mut parts = s.split_whitespace();
        let count_str = parts.next().ok_or_else(|| invalid("empty limit"))?;
        let count: u32 = count_str
            .parse()
            .map_err(|_| invalid("count must be a non-negative integer"))?;
        if count == 0 {
            return Err(invalid("count must be positive"));
        }
        let unit = match parts.next() {
            Some(unit) => unit.parse()?,
            None => LimitUnit::Characters,
        };
        if parts.next().is_some() {
            return Err(invalid("expected '<count> <unit>'"));
        }
        Ok(Limit { count, unit })
    }
}

/// System instruction for summarizing a text down to `limit`.
#[derive(Debug, Clone, Copy)]
pub struct SummaryPrompt<'a> {
    pub limit: &'a Limit,
}

impl SummaryPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "You will be provided with a text. Your task is to summarize the text. \
             The summary should contain a maximum of {count} {unit}.",
            count = self.limit.count,
            unit = self.limit.unit,
        )
    }
}
