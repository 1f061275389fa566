//! Plugin configuration schemas.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration schema a plugin's settings must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Configuration fields.
    #[serde(default)]
    pub fields: BTreeMap<String, ConfigFieldSchema>,
    /// Required fields.
    #[serde(default)]
    pub required: Vec<String>,
    /// Whether keys not declared in `fields` are accepted.
    #[serde(default)]
    pub allow_unknown: bool,
}

/// Configuration field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFieldSchema {
    /// Field type.
    pub field_type: ConfigFieldType,
    /// Field description.
    #[serde(default)]
    pub description: String,
    /// Default value.
    #[serde(default)]
    pub default: Option<Value>,
    /// Validation rules.
    #[serde(default)]
    pub validation: Option<ValidationRules>,
}

/// Configuration field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFieldType {
    /// JSON string.
    String,
    /// JSON number without a fractional part.
    Integer,
    /// Any JSON number.
    Float,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ConfigFieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for ConfigFieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{name}")
    }
}

/// Validation rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Minimum value (for numbers).
    pub min: Option<f64>,
    /// Maximum value (for numbers).
    pub max: Option<f64>,
    /// Minimum length (for strings/arrays).
    pub min_length: Option<usize>,
    /// Maximum length (for strings/arrays).
    pub max_length: Option<usize>,
    /// Regular expression strings must match.
    pub pattern: Option<String>,
    /// Allowed values (enum).
    pub allowed_values: Option<Vec<Value>>,
}

impl ConfigFieldSchema {
    /// Field of the given type with no rules.
    pub fn new(field_type: ConfigFieldType) -> Self {
        Self {
            field_type,
            description: String::new(),
            default: None,
            validation: None,
        }
    }

    /// Sets the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the validation rules.
    pub fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }

    /// Check `value` against this field, pushing messages into `violations`.
    fn check(&self, key: &str, value: &Value, violations: &mut Vec<String>) {
        if !self.field_type.accepts(value) {
            violations.push(format!(
                "field '{}': expected {}, got {}",
                key,
                self.field_type,
                json_type_name(value)
            ));
            return;
        }

        let Some(rules) = &self.validation else {
            return;
        };

        if let Some(n) = value.as_f64() {
            if let Some(min) = rules.min
                && n < min
            {
                violations.push(format!("field '{key}': value {n} is below minimum {min}"));
            }
            if let Some(max) = rules.max
                && n > max
            {
                violations.push(format!("field '{key}': value {n} is above maximum {max}"));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };
        if let Some(len) = length {
            if let Some(min_len) = rules.min_length
                && len < min_len
            {
                violations.push(format!("field '{key}': length {len} is shorter than {min_len}"));
            }
            if let Some(max_len) = rules.max_length
                && len > max_len
            {
                violations.push(format!("field '{key}': length {len} is longer than {max_len}"));
            }
        }

        if let (Some(pattern), Value::String(s)) = (&rules.pattern, value) {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => violations.push(format!(
                    "field '{key}': value '{s}' does not match pattern '{pattern}'"
                )),
                Err(e) => violations.push(format!("field '{key}': invalid pattern '{pattern}': {e}")),
            }
        }

        if let Some(allowed) = &rules.allowed_values
            && !allowed.contains(value)
        {
            violations.push(format!("field '{key}': value {value} is not one of the allowed values"));
        }
    }
}

impl ConfigSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    pub fn field(mut self, name: impl Into<String>, field: ConfigFieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Marks a field as required.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Accept keys the schema does not declare.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    /// Declared defaults for every field that has one.
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(k, f)| f.default.clone().map(|d| (k.clone(), d)))
            .collect()
    }

    /// Validate a full configuration object, collecting every violation.
    pub fn validate(&self, config: &Map<String, Value>) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        for required in &self.required {
            if !config.contains_key(required) {
                violations.push(format!("field '{required}': required"));
            }
        }

        for (key, value) in config {
            match self.fields.get(key) {
                Some(field) => field.check(key, value, &mut violations),
                None if self.allow_unknown => {}
                None => violations.push(format!("field '{key}': not declared in schema")),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Problems with the schema itself: undeclared required fields,
    /// invalid patterns, and defaults that violate their own rules.
    pub(crate) fn self_check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for required in &self.required {
            if !self.fields.contains_key(required) {
                problems.push(format!("required field '{required}' is not declared"));
            }
        }
        for (key, field) in &self.fields {
            if let Some(pattern) = field.validation.as_ref().and_then(|r| r.pattern.as_ref())
                && let Err(e) = Regex::new(pattern)
            {
                problems.push(format!("field '{key}': invalid pattern '{pattern}': {e}"));
            }
            if let Some(default) = &field.default {
                let mut violations = Vec::new();
                field.check(key, default, &mut violations);
                problems.extend(violations.into_iter().map(|v| format!("default for {v}")));
            }
        }
        problems
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
