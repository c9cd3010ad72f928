use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::{Error, Result};

// =============================================================================
// Variable Tiers
// =============================================================================

/// Ordered key/value bag backing a single tier.
pub type Variables = serde_json::Map<String, Value>;

/// One of the named variable scopes a script can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableTier {
    /// Host process environment handed in by the caller (read-only).
    ProcessEnv,
    /// Workspace-wide global environment.
    GlobalEnvironment,
    /// Collection-level variables.
    Collection,
    /// The selected collection environment.
    Environment,
    /// Folder-level variables.
    Folder,
    /// Variables declared on the request itself.
    Request,
    /// Variables set during the current run.
    Runtime,
}

impl VariableTier {
    /// Unscoped lookup order, most specific first.
    pub const PRECEDENCE: [VariableTier; 7] = [
        VariableTier::Request,
        VariableTier::Runtime,
        VariableTier::Folder,
        VariableTier::Environment,
        VariableTier::Collection,
        VariableTier::GlobalEnvironment,
        VariableTier::ProcessEnv,
    ];

    /// Wire name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessEnv => "processEnv",
            Self::GlobalEnvironment => "globalEnvironment",
            Self::Collection => "collection",
            Self::Environment => "environment",
            Self::Folder => "folder",
            Self::Request => "request",
            Self::Runtime => "runtime",
        }
    }

    /// Whether scripts may write to this tier.
    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::ProcessEnv)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for VariableTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VariableTier::PRECEDENCE
            .iter()
            .copied()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownTier(s.to_string()))
    }
}

// =============================================================================
// Variable Scope Facade
// =============================================================================

/// Unifies every variable tier behind get/set.
///
/// Reads without a tier walk [`VariableTier::PRECEDENCE`] and return the first
/// defined value. Writes always name their tier and never fall back.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    tiers: [Variables; 7],
}

impl VariableScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tier (builder style).
    pub fn with_tier(mut self, tier: VariableTier, variables: Variables) -> Self {
        self.tiers[tier.slot()] = variables;
        self
    }

    /// Borrow the raw contents of a tier.
    pub fn tier(&self, tier: VariableTier) -> &Variables {
        &self.tiers[tier.slot()]
    }

    /// Take the contents of a tier out of the scope.
    pub fn take_tier(&mut self, tier: VariableTier) -> Variables {
        std::mem::take(&mut self.tiers[tier.slot()])
    }

    /// Read a key from a specific tier, or by precedence when `tier` is `None`.
    pub fn get(&self, tier: Option<VariableTier>, key: &str) -> Option<&Value> {
        match tier {
            Some(tier) => self.tiers[tier.slot()].get(key),
            None => self.resolve(key),
        }
    }

    /// Read a key by precedence (request first, process environment last).
    pub fn resolve(&self, key: &str) -> Option<&Value> {
        VariableTier::PRECEDENCE
            .iter()
            .find_map(|tier| self.tiers[tier.slot()].get(key))
    }

    /// Whether a tier holds the key.
    pub fn has(&self, tier: VariableTier, key: &str) -> bool {
        self.tiers[tier.slot()].contains_key(key)
    }

    /// Write a key into a tier.
    pub fn set(&mut self, tier: VariableTier, key: impl Into<String>, value: Value) -> Result<()> {
        Self::ensure_writable(tier)?;
        let key = key.into();
        Self::validate_name(&key)?;
        self.tiers[tier.slot()].insert(key, value);
        Ok(())
    }

    /// Check that a variable name only uses alphanumerics, `-`, `_` and `.`.
    pub fn validate_name(key: &str) -> Result<()> {
        static NAME: OnceLock<regex::Regex> = OnceLock::new();
        let re = NAME.get_or_init(|| regex::Regex::new(r"^[\w\-.]+$").expect("name pattern is valid"));
        if re.is_match(key) {
            Ok(())
        } else {
            Err(Error::InvalidVariableName(key.to_string()))
        }
    }

    /// Remove a key from a tier, returning the previous value.
    pub fn delete(&mut self, tier: VariableTier, key: &str) -> Result<Option<Value>> {
        Self::ensure_writable(tier)?;
        Ok(self.tiers[tier.slot()].remove(key))
    }

    /// Remove every key from a tier.
    pub fn clear(&mut self, tier: VariableTier) -> Result<()> {
        Self::ensure_writable(tier)?;
        self.tiers[tier.slot()].clear();
        Ok(())
    }

    /// Replace `{{name}}` placeholders using unscoped lookup.
    ///
    /// `{{process.env.NAME}}` reads the process environment tier. Unknown
    /// placeholders are left untouched.
    pub fn interpolate(&self, template: &str) -> String {
        static PLACEHOLDER: OnceLock<regex::Regex> = OnceLock::new();
        let re = PLACEHOLDER.get_or_init(|| {
            regex::Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("placeholder pattern is valid")
        });

        re.replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let value = match name.strip_prefix("process.env.") {
                Some(env_key) => self.get(Some(VariableTier::ProcessEnv), env_key),
                None => self.resolve(name),
            };
            match value {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
    }

    fn ensure_writable(tier: VariableTier) -> Result<()> {
        if tier.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnlyTier(tier.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_precedence_request_over_collection() {
        let scope = VariableScope::new()
            .with_tier(VariableTier::Request, vars(json!({"a": 1})))
            .with_tier(VariableTier::Collection, vars(json!({"a": 2, "b": 3})));

        assert_eq!(scope.resolve("a"), Some(&json!(1)));
        assert_eq!(scope.resolve("b"), Some(&json!(3)));
        assert_eq!(scope.resolve("missing"), None);
    }

    #[test]
    fn test_full_precedence_chain() {
        let mut scope = VariableScope::new();
        for (i, tier) in VariableTier::PRECEDENCE.iter().rev().enumerate() {
            scope = scope.with_tier(*tier, vars(json!({"k": i})));
            assert_eq!(scope.resolve("k"), Some(&json!(i)), "tier {tier} should win");
        }
    }

    #[test]
    fn test_write_is_visible_and_does_not_fall_back() {
        let mut scope = VariableScope::new()
            .with_tier(VariableTier::Collection, vars(json!({"x": "old"})));

        scope.set(VariableTier::Runtime, "x", json!(5)).unwrap();

        assert_eq!(scope.get(Some(VariableTier::Runtime), "x"), Some(&json!(5)));
        assert_eq!(scope.get(Some(VariableTier::Collection), "x"), Some(&json!("old")));
        assert_eq!(scope.resolve("x"), Some(&json!(5)));
    }

    #[test]
    fn test_process_env_is_read_only() {
        let mut scope = VariableScope::new();
        let err = scope.set(VariableTier::ProcessEnv, "HOME", json!("/tmp")).unwrap_err();
        assert!(matches!(err, Error::ReadOnlyTier(_)));
        assert!(scope.clear(VariableTier::ProcessEnv).is_err());
    }

    #[test]
    fn test_delete_and_clear() {
        let mut scope = VariableScope::new()
            .with_tier(VariableTier::Runtime, vars(json!({"a": 1, "b": 2})));

        assert_eq!(scope.delete(VariableTier::Runtime, "a").unwrap(), Some(json!(1)));
        assert!(!scope.has(VariableTier::Runtime, "a"));
        scope.clear(VariableTier::Runtime).unwrap();
        assert!(scope.tier(VariableTier::Runtime).is_empty());
    }

    #[test]
    fn test_interpolate() {
        let scope = VariableScope::new()
            .with_tier(VariableTier::Environment, vars(json!({"host": "api.local", "port": 8080})))
            .with_tier(VariableTier::ProcessEnv, vars(json!({"TOKEN": "s3cr3t"})));

        assert_eq!(
            scope.interpolate("https://{{host}}:{{ port }}/x?t={{process.env.TOKEN}}&u={{unknown}}"),
            "https://api.local:8080/x?t=s3cr3t&u={{unknown}}"
        );
    }

    #[test]
    fn test_variable_names_are_validated() {
        let mut scope = VariableScope::new();
        assert!(scope.set(VariableTier::Runtime, "auth.token-v2_x", json!(1)).is_ok());

        let err = scope.set(VariableTier::Runtime, "bad name!", json!(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidVariableName(_)));
        assert!(scope.set(VariableTier::Runtime, "", json!(1)).is_err());
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("runtime".parse::<VariableTier>().unwrap(), VariableTier::Runtime);
        assert_eq!(
            "globalEnvironment".parse::<VariableTier>().unwrap(),
            VariableTier::GlobalEnvironment
        );
        assert!("bogus".parse::<VariableTier>().is_err());
    }
}
