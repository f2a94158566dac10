//! Validated tool arguments.
//!
//! Model-supplied argument bags are parsed into a [`ToolInvocation`] at the
//! dispatch boundary. Each variant carries its own checked parameter shape,
//! so handlers never see untyped JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name of the read-only lookup tool.
pub const QUERY_TOOL: &str = "query_items";
/// Name of the draft tool.
pub const STAGE_TOOL: &str = "stage_item";
/// Name of the finalize tool.
pub const COMMIT_TOOL: &str = "commit_item";

/// Default number of records a query returns.
pub const DEFAULT_QUERY_LIMIT: usize = 10;
/// Largest accepted query limit.
pub const MAX_QUERY_LIMIT: usize = 50;

/// Argument validation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolArgError {
    /// No tool with this name exists.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Arguments did not match the tool's parameter shape.
    #[error("invalid arguments for {tool}: {reason}")]
    Invalid {
        /// Tool name.
        tool: String,
        /// What was wrong.
        reason: String,
    },
}

impl ToolArgError {
    fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

/// Arguments for [`QUERY_TOOL`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryArgs {
    /// Category filter.
    pub category: Option<String>,
    /// Brand filter.
    pub brand: Option<String>,
    /// Condition filter.
    pub condition: Option<String>,
    /// Inclusive lower price bound.
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub max_price: Option<f64>,
    /// Free-text question answered over the filtered records.
    pub query: Option<String>,
    /// Maximum records considered.
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub limit: Option<f64>,
}

impl QueryArgs {
    /// Effective record limit, clamped to `1..=MAX_QUERY_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(n) if n.is_finite() && n >= 1.0 => (n as usize).min(MAX_QUERY_LIMIT),
            Some(_) => 1,
            None => DEFAULT_QUERY_LIMIT,
        }
    }

    /// The free-text query, if non-blank.
    pub fn question(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    fn validate(self) -> Result<Self, ToolArgError> {
        for (label, value) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if let Some(v) = value
                && (!v.is_finite() || v < 0.0)
            {
                return Err(ToolArgError::invalid(
                    QUERY_TOOL,
                    format!("{label} must be a non-negative number"),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            return Err(ToolArgError::invalid(
                QUERY_TOOL,
                "min_price is greater than max_price",
            ));
        }
        Ok(self)
    }
}

/// Arguments for [`STAGE_TOOL`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageArgs {
    /// Item name.
    pub name: String,
    /// Category.
    #[serde(default)]
    pub category: Option<String>,
    /// Brand.
    #[serde(default)]
    pub brand: Option<String>,
    /// Condition, e.g. "new" or "used".
    #[serde(default)]
    pub condition: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl StageArgs {
    /// Non-empty fields as a flat map.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), self.name.clone());
        for (key, value) in [
            ("category", &self.category),
            ("brand", &self.brand),
            ("condition", &self.condition),
            ("description", &self.description),
        ] {
            if let Some(v) = value
                && !v.trim().is_empty()
            {
                fields.insert(key.to_string(), v.trim().to_string());
            }
        }
        fields
    }

    fn validate(mut self) -> Result<Self, ToolArgError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(ToolArgError::invalid(STAGE_TOOL, "name must not be empty"));
        }
        Ok(self)
    }
}

/// Arguments for [`COMMIT_TOOL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitArgs {
    /// Unit price.
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    /// Units on hand (defaults to 1).
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub quantity: Option<f64>,
}

impl CommitArgs {
    /// Effective quantity.
    pub fn quantity(&self) -> u32 {
        self.quantity.map_or(1, |q| q as u32)
    }

    fn validate(self) -> Result<Self, ToolArgError> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ToolArgError::invalid(
                COMMIT_TOOL,
                "price must be a non-negative number",
            ));
        }
        if let Some(q) = self.quantity
            && (!q.is_finite() || q < 1.0 || q.fract() != 0.0 || q > f64::from(u32::MAX))
        {
            return Err(ToolArgError::invalid(
                COMMIT_TOOL,
                "quantity must be a whole number of at least 1",
            ));
        }
        Ok(self)
    }
}

/// A validated tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    /// Read-only lookup.
    Query(QueryArgs),
    /// Draft an item.
    Stage(StageArgs),
    /// Finalize the drafted item.
    Commit(CommitArgs),
}

impl ToolInvocation {
    /// Parse and validate `args` for the tool called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolArgError`] for unknown tools or malformed arguments.
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolArgError> {
        let empty = Value::Object(serde_json::Map::new());
        let args = if args.is_null() { &empty } else { args };
        match name {
            QUERY_TOOL => decode::<QueryArgs>(name, args)?
                .validate()
                .map(Self::Query),
            STAGE_TOOL => decode::<StageArgs>(name, args)?
                .validate()
                .map(Self::Stage),
            COMMIT_TOOL => decode::<CommitArgs>(name, args)?
                .validate()
                .map(Self::Commit),
            other => Err(ToolArgError::UnknownTool(other.to_string())),
        }
    }

    /// The tool this invocation targets.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Query(_) => QUERY_TOOL,
            Self::Stage(_) => STAGE_TOOL,
            Self::Commit(_) => COMMIT_TOOL,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolArgError> {
    T::deserialize(args).map_err(|e| ToolArgError::invalid(tool, e.to_string()))
}

/// Accept a JSON number or a numeric string (`"12.50"`, `"$12.50"`).
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    number_from(&value).ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {value}")))
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    number_from(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {value}")))
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    }
}
