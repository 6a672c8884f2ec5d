//! Device search filter construction.
//!
//! Builds the JSON body POSTed to `devices/search`: a regex match on the device
//! name, bounded to a lookback window ending at the appliance's "now".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compliance pattern used when the caller does not supply one
pub const DEFAULT_NAME_PATTERN: &str = "^VMware";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;
pub const DEFAULT_LIMIT: u32 = 100;

/// Comparison applied between the device name and the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchOperator {
    /// Select devices whose name does not match (non-compliant devices)
    #[default]
    #[serde(rename = "!=")]
    NotEqual,
    /// Select devices whose name matches
    #[serde(rename = "=")]
    Equal,
}

impl MatchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOperator::NotEqual => "!=",
            MatchOperator::Equal => "=",
        }
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "!=" | "ne" | "not-equal" => Ok(MatchOperator::NotEqual),
            "=" | "eq" | "equal" => Ok(MatchOperator::Equal),
            other => Err(format!("unknown operator '{}', expected '!=' or '='", other)),
        }
    }
}

/// Everything a caller can tune about a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub regex: String,
    pub lookback_days: u32,
    pub limit: u32,
    pub offset: u32,
    pub operator: MatchOperator,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            regex: DEFAULT_NAME_PATTERN.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            limit: DEFAULT_LIMIT,
            offset: 0,
            operator: MatchOperator::default(),
        }
    }
}

impl SearchParams {
    pub fn to_filter(&self) -> SearchFilter {
        build_with_operator(
            &self.regex,
            self.lookback_days,
            self.limit,
            self.offset,
            self.operator,
        )
    }

    /// Parameters for the page following this one
    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            ..self.clone()
        }
    }
}

/// Request body for `POST devices/search`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Relative start of the window, e.g. `-7d`
    pub active_from: String,
    /// End of the window; 0 is "now" on the appliance clock
    pub active_until: i64,
    pub filter: FieldFilter,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub operand: Operand,
    pub operator: MatchOperator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub value: String,
    pub is_regex: bool,
}

/// Build a filter selecting devices whose name does not match `pattern`.
pub fn build(pattern: &str, lookback_days: u32, limit: u32, offset: u32) -> SearchFilter {
    build_with_operator(pattern, lookback_days, limit, offset, MatchOperator::NotEqual)
}

/// Build a filter with an explicit operator.
///
/// The pattern is not validated here; a bad regex is rejected by the appliance.
pub fn build_with_operator(
    pattern: &str,
    lookback_days: u32,
    limit: u32,
    offset: u32,
    operator: MatchOperator,
) -> SearchFilter {
    let pattern = if pattern.is_empty() {
        DEFAULT_NAME_PATTERN
    } else {
        pattern
    };

    SearchFilter {
        active_from: format!("-{}d", lookback_days),
        active_until: 0,
        filter: FieldFilter {
            field: "name".to_string(),
            operand: Operand {
                value: pattern.to_string(),
                is_regex: true,
            },
            operator,
        },
        limit,
        offset,
    }
}
