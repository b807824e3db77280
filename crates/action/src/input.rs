//! Declared action inputs: defaults, formats and validators.
//!
//! [`prepare_params`] applies an [`Inputs`] map to raw params. For each
//! declared input, in declaration order:
//!
//! 1. a missing value is replaced by the default, if any (computed defaults
//!    are evaluated on every call);
//! 2. a value that is still missing is an error when the input is required,
//!    otherwise the input is skipped;
//! 3. the format converts the value;
//! 4. the validator checks the converted value.
//!
//! Errors for every input are collected before returning.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use orbit_config::{GeneralConfig, MissingParamCheck};
use orbit_core::Params;
use regex::Regex;
use serde_json::{Number, Value};

use crate::error::FieldErrors;

/// Declared inputs of an action, in declaration order.
pub type Inputs = IndexMap<String, InputSpec>;

type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;
type FormatFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;
type ValidateFn = Arc<dyn Fn(&Value) -> Verdict + Send + Sync>;

/// How one input is treated.
#[derive(Clone, Default)]
pub struct InputSpec {
    /// Fail when the value is missing after defaulting.
    pub required: bool,
    /// Value used when the param is missing.
    pub default: Option<DefaultValue>,
    /// Conversion applied to present values.
    pub format: Option<InputFormat>,
    /// Check applied after formatting.
    pub validator: Option<InputValidator>,
}

/// Default for a missing input.
#[derive(Clone)]
pub enum DefaultValue {
    /// Fixed value.
    Literal(Value),
    /// Evaluated on every call.
    Computed(DefaultFn),
}

/// Conversion applied to an input value.
#[derive(Clone)]
pub enum InputFormat {
    /// Integer, parsing numeric strings.
    Integer,
    /// Float, parsing numeric strings.
    Float,
    /// Boolean, accepting `"true"`/`"false"`/`"1"`/`"0"`.
    Boolean,
    /// String; numbers and booleans are stringified.
    String,
    /// Custom conversion returning the new value or a message.
    Custom(FormatFn),
}

/// Check applied to an input value.
#[derive(Clone)]
pub enum InputValidator {
    /// A predefined rule.
    Named(NamedRule),
    /// The value (strings as-is, anything else as JSON) must match.
    Pattern(Regex),
    /// Custom predicate.
    Custom(ValidateFn),
}

/// Outcome of a custom validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Value accepted.
    Pass,
    /// Value rejected with the generic message.
    Fail,
    /// Value rejected with this message.
    Message(String),
}

/// Predefined validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedRule {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// Whole number
    Integer,
    /// JSON boolean
    Boolean,
    /// Plausible email address
    Email,
    /// Absolute URL with a scheme
    Url,
    /// Hyphenated or simple UUID
    Uuid,
    /// Non-blank string or non-empty array/object
    NonEmpty,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

/// Which values count as missing in addition to an absent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingPolicy {
    /// `null` is missing.
    pub null: bool,
    /// `""` is missing.
    pub empty_string: bool,
}

impl Default for MissingPolicy {
    fn default() -> Self {
        Self {
            null: true,
            empty_string: true,
        }
    }
}

impl From<&GeneralConfig> for MissingPolicy {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            null: general.treats_as_missing(MissingParamCheck::Null),
            empty_string: general.treats_as_missing(MissingParamCheck::EmptyString),
        }
    }
}

impl MissingPolicy {
    /// Whether `value` counts as missing.
    pub fn is_missing(&self, value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(Value::Null) => self.null,
            Some(Value::String(s)) if s.is_empty() => self.empty_string,
            Some(_) => false,
        }
    }
}

// ── InputSpec builders ──────────────────────────────────────────────────────

impl InputSpec {
    /// A required input.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    /// An optional input.
    pub fn optional() -> Self {
        Self::default()
    }

    /// Use `value` when the param is missing.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Compute the default on every call.
    #[must_use]
    pub fn with_default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    /// Convert present values.
    #[must_use]
    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Convert present values with a custom function.
    #[must_use]
    pub fn format_with<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.with_format(InputFormat::Custom(Arc::new(f)))
    }

    /// Check values with a predefined rule.
    #[must_use]
    pub fn with_rule(mut self, rule: NamedRule) -> Self {
        self.validator = Some(InputValidator::Named(rule));
        self
    }

    /// Check values against a pattern.
    #[must_use]
    pub fn matching(mut self, pattern: Regex) -> Self {
        self.validator = Some(InputValidator::Pattern(pattern));
        self
    }

    /// Check values with a custom predicate.
    #[must_use]
    pub fn validate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Verdict + Send + Sync + 'static,
    {
        self.validator = Some(InputValidator::Custom(Arc::new(f)));
        self
    }
}

impl fmt::Debug for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSpec")
            .field("required", &self.required)
            .field("default", &self.default)
            .field("format", &self.format)
            .field("validator", &self.validator)
            .finish()
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl fmt::Debug for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("Integer"),
            Self::Float => f.write_str("Float"),
            Self::Boolean => f.write_str("Boolean"),
            Self::String => f.write_str("String"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl fmt::Debug for InputValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(rule) => f.debug_tuple("Named").field(rule).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ── Defaults, formats, validators ───────────────────────────────────────────

impl DefaultValue {
    /// The value to insert.
    pub fn resolve(&self) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl InputFormat {
    /// Convert `value`, or explain why it cannot be converted.
    pub fn apply(&self, value: Value) -> Result<Value, String> {
        match self {
            Self::Integer => to_integer(&value).ok_or_else(|| "must be an integer".to_string()),
            Self::Float => to_float(&value).ok_or_else(|| "must be a number".to_string()),
            Self::Boolean => to_boolean(&value).ok_or_else(|| "must be a boolean".to_string()),
            Self::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err("must be a string".to_string()),
            },
            Self::Custom(f) => f(value),
        }
    }
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" | "int" => Ok(Self::Integer),
            "float" | "number" => Ok(Self::Float),
            "boolean" | "bool" => Ok(Self::Boolean),
            "string" => Ok(Self::String),
            other => Err(format!("unknown format `{other}`")),
        }
    }
}

/// Floats that convert to `i64` without saturating: `-2^63..2^63`.
const I64_AS_F64: std::ops::Range<f64> =
    -9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0;

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        #[allow(clippy::cast_possible_truncation)]
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && I64_AS_F64.contains(f))
            .map(|f| Value::from(f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn to_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s/?#]+[^\s]*$").expect("url pattern compiles")
});

impl NamedRule {
    fn check(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Email => value.as_str().is_some_and(|s| EMAIL.is_match(s)),
            Self::Url => value.as_str().is_some_and(|s| URL.is_match(s)),
            Self::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            Self::NonEmpty => match value {
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                Value::Null => false,
                _ => true,
            },
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Email => "a valid email address",
            Self::Url => "a valid URL",
            Self::Uuid => "a valid UUID",
            Self::NonEmpty => "non-empty",
            Self::Array => "an array",
            Self::Object => "an object",
        }
    }
}

impl FromStr for NamedRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            "email" => Ok(Self::Email),
            "url" => Ok(Self::Url),
            "uuid" => Ok(Self::Uuid),
            "non_empty" => Ok(Self::NonEmpty),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(format!("unknown validation rule `{other}`")),
        }
    }
}

impl InputValidator {
    /// Check `value` for the input called `field`.
    pub fn check(&self, field: &str, value: &Value) -> Result<(), String> {
        match self {
            Self::Named(rule) => {
                if rule.check(value) {
                    Ok(())
                } else {
                    Err(format!("`{field}` must be {}", rule.describe()))
                }
            }
            Self::Pattern(re) => {
                let matched = match value {
                    Value::String(s) => re.is_match(s),
                    other => re.is_match(&other.to_string()),
                };
                if matched {
                    Ok(())
                } else {
                    Err(generic_failure(field))
                }
            }
            Self::Custom(f) => match f(value) {
                Verdict::Pass => Ok(()),
                Verdict::Fail => Err(generic_failure(field)),
                Verdict::Message(message) => Err(message),
            },
        }
    }
}

fn generic_failure(field: &str) -> String {
    format!("Input for parameter `{field}` failed validation")
}

fn required_message(field: &str) -> String {
    format!("`{field}` is a required parameter for this action")
}

// ── Param preparation ───────────────────────────────────────────────────────

/// Apply defaults, formats and validators to `params` in place.
///
/// Returns every failing field at once.
pub fn prepare_params(
    inputs: &Inputs,
    params: &mut Params,
    policy: MissingPolicy,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    for (name, spec) in inputs {
        if policy.is_missing(params.get(name)) {
            if let Some(default) = &spec.default {
                params.insert(name.clone(), default.resolve());
            }
        }

        if policy.is_missing(params.get(name)) {
            if spec.required {
                errors.insert(name.clone(), required_message(name));
            }
            continue;
        }

        if let Some(format) = &spec.format {
            let raw = params.remove(name).unwrap_or(Value::Null);
            match format.apply(raw) {
                Ok(formatted) => {
                    params.insert(name.clone(), formatted);
                }
                Err(message) => {
                    errors.insert(name.clone(), format!("`{name}` {message}"));
                    continue;
                }
            }
        }

        if let Some(validator) = &spec.validator {
            let value = params.get(name).unwrap_or(&Value::Null);
            if let Err(message) = validator.check(name, value) {
                errors.insert(name.clone(), message);
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Drop every param that is neither a declared input nor reserved.
pub fn scrub_params(inputs: &Inputs, params: &mut Params) {
    params.retain(|key, _| inputs.contains_key(key) || orbit_core::params::is_reserved(key));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test params must be an object"),
        }
    }

    fn inputs(entries: Vec<(&str, InputSpec)>) -> Inputs {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn reports_every_missing_required_field() {
        let inputs = inputs(vec![
            ("key", InputSpec::required()),
            ("value", InputSpec::required()),
        ]);
        let mut p = Params::new();

        let errors = prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors["key"],
            "`key` is a required parameter for this action"
        );
        assert!(errors.contains_key("value"));
    }

    #[test]
    fn literal_default_fills_missing_value() {
        let inputs = inputs(vec![("limit", InputSpec::required().with_default(10))]);
        let mut p = Params::new();
        prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap();
        assert_eq!(p["limit"], json!(10));
    }

    #[test]
    fn computed_default_runs_per_call() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let inputs = inputs(vec![(
            "nonce",
            InputSpec::optional().with_default_fn(move || json!(c.fetch_add(1, Ordering::SeqCst))),
        )]);

        let mut first = Params::new();
        let mut second = Params::new();
        prepare_params(&inputs, &mut first, MissingPolicy::default()).unwrap();
        prepare_params(&inputs, &mut second, MissingPolicy::default()).unwrap();

        assert_eq!(first["nonce"], json!(0));
        assert_eq!(second["nonce"], json!(1));
    }

    #[test]
    fn present_value_is_not_replaced_by_default() {
        let inputs = inputs(vec![("limit", InputSpec::optional().with_default(10))]);
        let mut p = params(json!({"limit": 3}));
        prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap();
        assert_eq!(p["limit"], json!(3));
    }

    #[rstest]
    #[case(json!(null), MissingPolicy { null: true, empty_string: true }, true)]
    #[case(json!(null), MissingPolicy { null: false, empty_string: true }, false)]
    #[case(json!(""), MissingPolicy { null: true, empty_string: true }, true)]
    #[case(json!(""), MissingPolicy { null: true, empty_string: false }, false)]
    #[case(json!(0), MissingPolicy::default(), false)]
    fn missing_policy_controls_required_check(
        #[case] value: Value,
        #[case] policy: MissingPolicy,
        #[case] rejected: bool,
    ) {
        let inputs = inputs(vec![("name", InputSpec::required())]);
        let mut p = Params::new();
        p.insert("name".into(), value);
        assert_eq!(prepare_params(&inputs, &mut p, policy).is_err(), rejected);
    }

    #[test]
    fn optional_missing_input_skips_validation() {
        let inputs = inputs(vec![(
            "email",
            InputSpec::optional().with_rule(NamedRule::Email),
        )]);
        let mut p = Params::new();
        prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap();
        assert!(!p.contains_key("email"));
    }

    #[rstest]
    #[case(InputFormat::Integer, json!("42"), Ok(json!(42)))]
    #[case(InputFormat::Integer, json!(4.0), Ok(json!(4)))]
    #[case(InputFormat::Integer, json!("4.5"), Err(()))]
    #[case(InputFormat::Integer, json!(-4.0e18), Ok(json!(-4_000_000_000_000_000_000_i64)))]
    #[case(InputFormat::Integer, json!(1e300), Err(()))]
    #[case(InputFormat::Integer, json!(-1e19), Err(()))]
    #[case(InputFormat::Float, json!("2.5"), Ok(json!(2.5)))]
    #[case(InputFormat::Boolean, json!("TRUE"), Ok(json!(true)))]
    #[case(InputFormat::Boolean, json!(0), Ok(json!(false)))]
    #[case(InputFormat::Boolean, json!("maybe"), Err(()))]
    #[case(InputFormat::String, json!(7), Ok(json!("7")))]
    #[case(InputFormat::String, json!([1]), Err(()))]
    fn formats_convert(
        #[case] format: InputFormat,
        #[case] input: Value,
        #[case] expected: Result<Value, ()>,
    ) {
        assert_eq!(format.apply(input).map_err(|_| ()), expected);
    }

    #[test]
    fn format_failure_is_a_field_error() {
        let inputs = inputs(vec![(
            "age",
            InputSpec::required().with_format(InputFormat::Integer),
        )]);
        let mut p = params(json!({"age": "old"}));
        let errors = prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap_err();
        assert_eq!(errors["age"], "`age` must be an integer");
    }

    #[rstest]
    #[case(NamedRule::Email, json!("a@b.io"), true)]
    #[case(NamedRule::Email, json!("not-an-email"), false)]
    #[case(NamedRule::Url, json!("https://orbit.dev/docs"), true)]
    #[case(NamedRule::Url, json!("orbit.dev"), false)]
    #[case(NamedRule::Uuid, json!("67e55044-10b1-426f-9247-bb680e5fe0c8"), true)]
    #[case(NamedRule::Integer, json!(1.5), false)]
    #[case(NamedRule::NonEmpty, json!("  "), false)]
    #[case(NamedRule::NonEmpty, json!([0]), true)]
    #[case(NamedRule::Object, json!({}), true)]
    fn named_rules(#[case] rule: NamedRule, #[case] value: Value, #[case] ok: bool) {
        assert_eq!(InputValidator::Named(rule).check("f", &value).is_ok(), ok);
    }

    #[test]
    fn pattern_validator_tests_strings() {
        let v = InputValidator::Pattern(Regex::new("^[a-z]+$").unwrap());
        assert!(v.check("slug", &json!("orbit")).is_ok());
        assert_eq!(
            v.check("slug", &json!("Orbit!")).unwrap_err(),
            "Input for parameter `slug` failed validation"
        );
    }

    #[test]
    fn custom_validator_message_or_generic() {
        let inputs = inputs(vec![
            (
                "even",
                InputSpec::required().validate_with(|v| {
                    if v.as_i64().is_some_and(|n| n % 2 == 0) {
                        Verdict::Pass
                    } else {
                        Verdict::Message("must be even".into())
                    }
                }),
            ),
            ("never", InputSpec::required().validate_with(|_| Verdict::Fail)),
        ]);
        let mut p = params(json!({"even": 3, "never": true}));

        let errors = prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap_err();

        assert_eq!(errors["even"], "must be even");
        assert_eq!(
            errors["never"],
            "Input for parameter `never` failed validation"
        );
    }

    #[test]
    fn validator_sees_formatted_value() {
        let inputs = inputs(vec![(
            "port",
            InputSpec::required()
                .with_format(InputFormat::Integer)
                .with_rule(NamedRule::Integer),
        )]);
        let mut p = params(json!({"port": "8080"}));
        prepare_params(&inputs, &mut p, MissingPolicy::default()).unwrap();
        assert_eq!(p["port"], json!(8080));
    }

    #[test]
    fn scrub_keeps_inputs_and_reserved_keys() {
        let inputs = inputs(vec![("name", InputSpec::optional())]);
        let mut p = params(json!({
            "action": "greet",
            "apiVersion": 1,
            "name": "ada",
            "admin": true
        }));
        scrub_params(&inputs, &mut p);
        let mut keys: Vec<&str> = p.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["action", "apiVersion", "name"]);
    }

    #[test]
    fn parses_names() {
        assert_eq!("email".parse::<NamedRule>().unwrap(), NamedRule::Email);
        assert!("shout".parse::<NamedRule>().is_err());
        assert!(matches!("int".parse::<InputFormat>(), Ok(InputFormat::Integer)));
    }
}
