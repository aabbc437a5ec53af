//! Package descriptor (arikaim-package.json) handling

use crate::version::{normalize_version, DEFAULT_VERSION};
use crate::{PackageError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Descriptor file name, one per package directory
pub const DESCRIPTOR_FILE: &str = "arikaim-package.json";

/// Install order used when a descriptor does not declare one
pub const DEFAULT_INSTALL_ORDER: i64 = 1000;

/// Properties read from a package descriptor
///
/// Only the fields the lifecycle core reads are typed. Everything else (routes,
/// console commands, facade bindings, ...) is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageProperties {
    /// Package name
    #[serde(default)]
    pub name: String,

    /// Normalized version
    #[serde(default = "default_version", deserialize_with = "deserialize_version")]
    pub version: String,

    /// Declared requirements per dependency category
    #[serde(default, skip_serializing_if = "Requirements::is_empty")]
    pub require: Requirements,

    /// Batch install priority
    #[serde(
        rename = "install-order",
        default,
        deserialize_with = "deserialize_lenient_order",
        skip_serializing_if = "Option::is_none"
    )]
    pub install_order: Option<i64>,

    /// Declared category ("system", "user", ...). Some descriptors store a numeric id.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<String>,

    /// Declared package type tag
    #[serde(
        rename = "package-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub package_type: Option<String>,

    /// Pass-through properties consumed by type behaviors
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Requirements map: category ("library", "extensions", "modules", "themes", "composer")
/// to dependency tokens (`name[:version[:optional]]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Requirements(pub BTreeMap<String, Vec<String>>);

impl<'de> Deserialize<'de> for Requirements {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // An empty list (`[]`) or null means no requirements, a single token stands
        // in for a list
        let raw = match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Object(map)) => map,
            _ => return Ok(Requirements::default()),
        };
        let categories = raw
            .into_iter()
            .map(|(category, tokens)| {
                let tokens = match tokens {
                    Value::String(token) => vec![token],
                    Value::Array(items) => items
                        .into_iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                (category, tokens)
            })
            .collect();
        Ok(Requirements(categories))
    }
}

impl Requirements {
    /// Tokens declared for a category
    pub fn category(&self, name: &str) -> &[String] {
        self.0.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Add a dependency token to a category
    pub fn add(&mut self, category: &str, token: impl Into<String>) {
        self.0.entry(category.to_string()).or_default().push(token.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty())
    }
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn deserialize_version<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => normalize_version(&s),
        Some(Value::Number(n)) => normalize_version(&n.to_string()),
        _ => default_version(),
    })
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Install order given as a number or a numeric string; anything else is unset
fn deserialize_lenient_order<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl FromStr for PackageProperties {
    type Err = PackageError;

    /// Parse descriptor JSON
    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl PackageProperties {
    /// Empty properties for a package whose descriptor could not be read
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: default_version(),
            ..Default::default()
        }
    }

    /// Load a descriptor file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PackageError::InvalidDescriptor {
            path: path.to_path_buf(),
            message: format!("Failed to read file: {}", e),
        })?;

        content.parse::<Self>().map_err(|e| PackageError::InvalidDescriptor {
            path: path.to_path_buf(),
            message: format!("Failed to parse JSON: {}", e),
        })
    }

    /// Build properties from an already decoded JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Write the descriptor back to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Batch install priority: system packages first, then declared order
    pub fn effective_install_order(&self) -> i64 {
        if self.is_system() {
            0
        } else {
            self.install_order.unwrap_or(DEFAULT_INSTALL_ORDER)
        }
    }

    pub fn is_system(&self) -> bool {
        self.category.as_deref() == Some("system")
    }

    /// Look up any property by its descriptor key
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::String(self.name.clone())),
            "version" => Some(Value::String(self.version.clone())),
            "require" => serde_json::to_value(&self.require).ok(),
            "install-order" => self.install_order.map(Value::from),
            "type" => self.category.clone().map(Value::String),
            "package-type" => self.package_type.clone().map(Value::String),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Whether every `key -> value` pair of the filter matches these properties
    pub fn matches(&self, filter: &BTreeMap<String, Value>) -> bool {
        filter.iter().all(|(key, expected)| {
            self.get(key)
                .map(|actual| values_match(&actual, expected))
                .unwrap_or(false)
        })
    }
}

/// Loose equality between descriptor values, so that `"1"` matches `1`
fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a == &b.to_string()
        }
        (Value::String(a), Value::Bool(b)) | (Value::Bool(b), Value::String(a)) => {
            a == &b.to_string()
        }
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_parsing() {
        let json = r#"{
            "name": "blog",
            "version": "2.3",
            "install-order": 20,
            "type": "user",
            "require": {
                "library": ["semantic:2.4"],
                "composer": ["guzzlehttp/guzzle:7.0:optional"]
            },
            "routes": [{ "path": "/blog" }]
        }"#;

        let properties = PackageProperties::from_str(json).unwrap();
        assert_eq!(properties.name, "blog");
        assert_eq!(properties.version, "2.3.0");
        assert_eq!(properties.install_order, Some(20));
        assert_eq!(properties.require.category("library"), ["semantic:2.4"]);
        assert!(properties.require.category("modules").is_empty());
        assert!(properties.extra.contains_key("routes"));
    }

    #[test]
    fn test_single_requirement_token() {
        let properties =
            PackageProperties::from_str(r#"{ "name": "x", "require": { "modules": "cache:1.1" } }"#)
                .unwrap();
        assert_eq!(properties.require.category("modules"), ["cache:1.1"]);
    }

    #[test]
    fn test_missing_version_defaults() {
        let properties = PackageProperties::from_str(r#"{ "name": "x" }"#).unwrap();
        assert_eq!(properties.version, "1.0.0");
        assert_eq!(properties.effective_install_order(), DEFAULT_INSTALL_ORDER);
    }

    #[test]
    fn test_numeric_category_is_kept_as_string() {
        let properties = PackageProperties::from_str(r#"{ "name": "x", "type": 1 }"#).unwrap();
        assert_eq!(properties.category.as_deref(), Some("1"));
        assert!(!properties.is_system());
    }

    #[test]
    fn test_system_packages_order_first() {
        let properties =
            PackageProperties::from_str(r#"{ "name": "core", "type": "system", "install-order": 50 }"#)
                .unwrap();
        assert_eq!(properties.effective_install_order(), 0);
    }

    #[test]
    fn test_filter_requires_every_entry() {
        let properties =
            PackageProperties::from_str(r#"{ "name": "x", "type": "user", "framework": true }"#).unwrap();

        let mut filter = BTreeMap::new();
        filter.insert("type".to_string(), Value::from("user"));
        assert!(properties.matches(&filter));

        filter.insert("framework".to_string(), Value::from(true));
        assert!(properties.matches(&filter));

        filter.insert("category".to_string(), Value::from("cms"));
        assert!(!properties.matches(&filter));
    }

    #[test]
    fn test_empty_require_list() {
        let properties: PackageProperties =
            r#"{ "name": "blog", "version": "2.3", "type": "system", "require": [] }"#
                .parse()
                .unwrap();
        assert!(properties.require.is_empty());
        assert_eq!(properties.version, "2.3.0");
        assert!(properties.is_system());

        let properties: PackageProperties = r#"{ "name": "blog", "require": null }"#.parse().unwrap();
        assert!(properties.require.is_empty());
    }

    #[test]
    fn test_loose_install_order() {
        let numeric: PackageProperties = r#"{ "name": "a", "install-order": "10" }"#.parse().unwrap();
        assert_eq!(numeric.install_order, Some(10));

        let garbage: PackageProperties =
            r#"{ "name": "b", "install-order": "soon", "routes": [] }"#.parse().unwrap();
        assert_eq!(garbage.effective_install_order(), DEFAULT_INSTALL_ORDER);
        assert!(garbage.extra.contains_key("routes"));
    }

    #[test]
    fn test_unparsable_descriptor_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            PackageProperties::from_file(&path),
            Err(PackageError::InvalidDescriptor { .. })
        ));
    }
}
