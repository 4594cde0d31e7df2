//! Request payload checks.
//!
//! Bodies are parsed as loose JSON first so that every problem in a request
//! can be reported at once instead of stopping at the first bad field.

use crate::types::{Color, Namespace, Urls};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: &'static str,
    pub message: String,
}

/// Every violation found in one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.violations.iter().map(|v| v.message.as_str()).collect();
        write!(f, "invalid request: {}", messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateRequest {
    pub namespace: Namespace,
    pub name: String,
    pub color: Color,
    pub duration: u64,
    pub urls: Urls,
}

/// URL overrides applied during a flip. Missing colors keep their stored URL.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UrlOverrides {
    pub blue: Option<String>,
    pub green: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlipRequest {
    pub namespace: Namespace,
    pub name: String,
    pub color: Color,
    pub duration: u64,
    pub urls: UrlOverrides,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NextColorRequest {
    pub namespace: Namespace,
    pub name: String,
}

/// Validates request payloads against the configured environment allow-list.
#[derive(Clone, Debug)]
pub struct Validator {
    environments: Vec<String>,
}

struct Checker<'a> {
    fields: &'a Map<String, Value>,
    violations: Vec<FieldViolation>,
}

impl<'a> Checker<'a> {
    fn new(fields: &'a Map<String, Value>) -> Self {
        Checker {
            fields,
            violations: Vec::new(),
        }
    }

    fn violation(&mut self, field: &str, reason: &'static str, message: String) {
        self.violations.push(FieldViolation {
            field: field.to_string(),
            reason,
            message,
        });
    }

    fn allow_only(&mut self, allowed: &[&str]) {
        let mut unknown: Vec<&String> = self
            .fields
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .collect();
        unknown.sort();
        for key in unknown {
            self.violation(key, "object.allowUnknown", format!("\"{key}\" is not allowed"));
        }
    }

    fn string(&mut self, field: &str, required: bool) -> Option<String> {
        let fields = self.fields;
        match fields.get(field) {
            None | Some(Value::Null) => {
                if required {
                    self.violation(field, "any.required", format!("\"{field}\" is required"));
                }
                None
            }
            Some(Value::String(s)) if s.is_empty() => {
                self.violation(
                    field,
                    "string.empty",
                    format!("\"{field}\" is not allowed to be empty"),
                );
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.violation(field, "string.base", format!("\"{field}\" must be a string"));
                None
            }
        }
    }

    fn color(&mut self, field: &str) -> Option<Color> {
        let value = self.string(field, true)?;
        let color = Color::parse(&value);
        if color.is_none() {
            self.violation(
                field,
                "any.allowOnly",
                format!("\"{field}\" must be one of [blue, green]"),
            );
        }
        color
    }

    fn duration(&mut self, field: &str) -> Option<u64> {
        let fields = self.fields;
        let Some(value) = fields.get(field).filter(|v| !v.is_null()) else {
            self.violation(field, "any.required", format!("\"{field}\" is required"));
            return None;
        };
        let Value::Number(number) = value else {
            self.violation(field, "number.base", format!("\"{field}\" must be a number"));
            return None;
        };

        if let Some(secs) = number.as_u64() {
            return Some(secs);
        }
        // Whole floats such as 60.0 count as integers.
        if let Some(n) = number
            .as_f64()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64)
        {
            return Some(n as u64);
        }
        if number.as_f64().is_some_and(|n| n < 0.0) {
            self.violation(
                field,
                "number.min",
                format!("\"{field}\" must be larger than or equal to 0"),
            );
        } else {
            self.violation(
                field,
                "number.integer",
                format!("\"{field}\" must be an integer"),
            );
        }
        None
    }

    fn environment(&mut self, field: &str, allowed: &[String]) -> Option<Namespace> {
        let env = self.string(field, false);
        match env {
            Some(env) if !allowed.contains(&env) => {
                self.violation(
                    field,
                    "any.allowOnly",
                    format!("\"{field}\" must be one of [{}]", allowed.join(", ")),
                );
                None
            }
            env => Some(Namespace::for_environment(env.as_deref())),
        }
    }

    /// Checks a `urls` object. Both colors are required when `complete` is set.
    fn urls(&mut self, field: &str, complete: bool) -> Option<UrlOverrides> {
        let fields = self.fields;
        let value = match fields.get(field) {
            None | Some(Value::Null) if complete => {
                self.violation(field, "any.required", format!("\"{field}\" is required"));
                return None;
            }
            None | Some(Value::Null) => return Some(UrlOverrides::default()),
            Some(value) => value,
        };
        let Value::Object(urls) = value else {
            self.violation(field, "object.base", format!("\"{field}\" must be an object"));
            return None;
        };

        let mut nested = Checker::new(urls);
        nested.allow_only(&[Color::Blue.as_str(), Color::Green.as_str()]);
        let blue = nested.string(Color::Blue.as_str(), complete);
        let green = nested.string(Color::Green.as_str(), complete);

        let ok = nested.violations.is_empty();
        for v in nested.violations {
            self.violations.push(FieldViolation {
                field: format!("{field}.{}", v.field),
                reason: v.reason,
                message: v.message.replacen(
                    &format!("\"{}\"", v.field),
                    &format!("\"{field}.{}\"", v.field),
                    1,
                ),
            });
        }

        ok.then_some(UrlOverrides { blue, green })
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(value) if self.violations.is_empty() => Ok(value),
            _ => Err(ValidationError {
                violations: self.violations,
            }),
        }
    }
}

/// Parses a request body. Malformed JSON is reported like any other violation.
pub fn parse_json(body: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(body).map_err(|err| ValidationError {
        violations: vec![FieldViolation {
            field: "value".into(),
            reason: "json.invalid",
            message: format!("\"value\" must be valid JSON: {err}"),
        }],
    })
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, ValidationError> {
    payload.as_object().ok_or_else(|| ValidationError {
        violations: vec![FieldViolation {
            field: "value".into(),
            reason: "object.base",
            message: "\"value\" must be an object".into(),
        }],
    })
}

impl Validator {
    pub fn new(environments: Vec<String>) -> Self {
        Validator { environments }
    }

    pub fn create(&self, payload: &Value) -> Result<CreateRequest, ValidationError> {
        let mut check = Checker::new(as_object(payload)?);
        check.allow_only(&["name", "color", "duration", "urls", "environment"]);

        let name = check.string("name", true);
        let color = check.color("color");
        let duration = check.duration("duration");
        let urls = check.urls("urls", true);
        let namespace = check.environment("environment", &self.environments);

        let request = (|| {
            let urls = urls?;
            Some(CreateRequest {
                namespace: namespace?,
                name: name?,
                color: color?,
                duration: duration?,
                urls: Urls {
                    blue: urls.blue?,
                    green: urls.green?,
                },
            })
        })();
        check.finish(request)
    }

    pub fn flip(&self, payload: &Value) -> Result<FlipRequest, ValidationError> {
        let mut check = Checker::new(as_object(payload)?);
        check.allow_only(&["name", "color", "duration", "urls", "environment"]);

        let name = check.string("name", true);
        let color = check.color("color");
        let duration = check.duration("duration");
        let urls = check.urls("urls", false);
        let namespace = check.environment("environment", &self.environments);

        let request = (|| {
            Some(FlipRequest {
                namespace: namespace?,
                name: name?,
                color: color?,
                duration: duration?,
                urls: urls?,
            })
        })();
        check.finish(request)
    }

    /// Query parameters of the next-color lookup.
    pub fn next_color(
        &self,
        name: Option<&str>,
        environment: Option<&str>,
    ) -> Result<NextColorRequest, ValidationError> {
        let fields = query_fields(&[("name", name), ("environment", environment)]);
        let mut check = Checker::new(&fields);

        let name = check.string("name", true);
        let namespace = check.environment("environment", &self.environments);

        let request = (|| {
            Some(NextColorRequest {
                namespace: namespace?,
                name: name?,
            })
        })();
        check.finish(request)
    }

    /// Namespace for the directory lookup.
    pub fn directory(&self, environment: Option<&str>) -> Result<Namespace, ValidationError> {
        let fields = query_fields(&[("environment", environment)]);
        let mut check = Checker::new(&fields);
        let namespace = check.environment("environment", &self.environments);
        check.finish(namespace)
    }
}

fn query_fields(params: &[(&str, Option<&str>)]) -> Map<String, Value> {
    params
        .iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), Value::String(v.to_string()))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(vec!["staging".into(), "prod".into()])
    }

    fn reasons(err: &ValidationError) -> Vec<(&str, &str)> {
        err.violations
            .iter()
            .map(|v| (v.field.as_str(), v.reason))
            .collect()
    }

    #[test]
    fn test_create_valid() {
        let request = validator()
            .create(&json!({
                "name": "svc",
                "color": "blue",
                "duration": 3600,
                "environment": "prod",
                "urls": {"blue": "https://b", "green": "https://g"}
            }))
            .unwrap();

        assert_eq!(request.name, "svc");
        assert_eq!(request.color, Color::Blue);
        assert_eq!(request.duration, 3600);
        assert_eq!(request.namespace.as_str(), "prod-deployments");
        assert_eq!(request.urls.green, "https://g");
    }

    #[test]
    fn test_create_default_namespace() {
        let request = validator()
            .create(&json!({
                "name": "svc",
                "color": "green",
                "duration": 0,
                "urls": {"blue": "https://b", "green": "https://g"}
            }))
            .unwrap();
        assert_eq!(request.namespace.as_str(), "deployments");
    }

    #[test]
    fn test_create_reports_every_violation() {
        let err = validator()
            .create(&json!({
                "name": "",
                "color": "red",
                "duration": -5,
                "environment": "qa",
                "urls": {"blue": 1},
                "extra": true
            }))
            .unwrap_err();

        assert_eq!(
            reasons(&err),
            vec![
                ("extra", "object.allowUnknown"),
                ("name", "string.empty"),
                ("color", "any.allowOnly"),
                ("duration", "number.min"),
                ("urls.blue", "string.base"),
                ("urls.green", "any.required"),
                ("environment", "any.allowOnly"),
            ]
        );
        assert_eq!(err.violations[5].message, "\"urls.green\" is required");
    }

    #[test]
    fn test_create_urls_must_have_both_colors() {
        let err = validator()
            .create(&json!({
                "name": "svc",
                "color": "blue",
                "duration": 10,
                "urls": {"blue": "https://b"}
            }))
            .unwrap_err();
        assert_eq!(reasons(&err), vec![("urls.green", "any.required")]);
    }

    #[test]
    fn test_create_rejects_third_color() {
        let err = validator()
            .create(&json!({
                "name": "svc",
                "color": "blue",
                "duration": 10,
                "urls": {"blue": "https://b", "green": "https://g", "red": "https://r"}
            }))
            .unwrap_err();
        assert_eq!(reasons(&err), vec![("urls.red", "object.allowUnknown")]);
    }

    #[test]
    fn test_create_missing_everything() {
        let err = validator().create(&json!({})).unwrap_err();
        assert_eq!(
            reasons(&err),
            vec![
                ("name", "any.required"),
                ("color", "any.required"),
                ("duration", "any.required"),
                ("urls", "any.required"),
            ]
        );
    }

    #[test]
    fn test_not_an_object() {
        let err = validator().flip(&json!([1, 2])).unwrap_err();
        assert_eq!(reasons(&err), vec![("value", "object.base")]);
    }

    #[test]
    fn test_flip() {
        let request = validator()
            .flip(&json!({"name": "svc", "color": "green", "duration": 60, "environment": "staging"}))
            .unwrap();
        assert_eq!(request.urls, UrlOverrides::default());
        assert_eq!(request.namespace.as_str(), "staging-deployments");

        let request = validator()
            .flip(&json!({"name": "svc", "color": "green", "duration": 60, "urls": {"green": "https://g2"}}))
            .unwrap();
        assert_eq!(request.urls.green.as_deref(), Some("https://g2"));
        assert_eq!(request.urls.blue, None);

        let err = validator()
            .flip(&json!({"name": "svc", "color": "green", "duration": 1.5, "urls": "nope"}))
            .unwrap_err();
        assert_eq!(
            reasons(&err),
            vec![("duration", "number.integer"), ("urls", "object.base")]
        );

        let request = validator()
            .flip(&json!({"name": "svc", "color": "green", "duration": 60.0}))
            .unwrap();
        assert_eq!(request.duration, 60);

        let err = validator()
            .flip(&json!({"name": 3, "color": "blue", "duration": "10"}))
            .unwrap_err();
        assert_eq!(
            reasons(&err),
            vec![("name", "string.base"), ("duration", "number.base")]
        );
    }

    #[test]
    fn test_flip_rejects_third_color() {
        let err = validator()
            .flip(&json!({
                "name": "svc",
                "color": "green",
                "duration": 60,
                "urls": {"green": "https://g2", "red": "https://r"}
            }))
            .unwrap_err();
        assert_eq!(reasons(&err), vec![("urls.red", "object.allowUnknown")]);

        let err = validator()
            .flip(&json!({"name": "svc", "color": "green", "duration": -0.5}))
            .unwrap_err();
        assert_eq!(reasons(&err), vec![("duration", "number.min")]);
    }

    #[test]
    fn test_next_color_and_directory() {
        let v = validator();
        let request = v.next_color(Some("svc"), None).unwrap();
        assert_eq!(request.namespace.as_str(), "deployments");

        let err = v.next_color(None, Some("qa")).unwrap_err();
        assert_eq!(
            reasons(&err),
            vec![("name", "any.required"), ("environment", "any.allowOnly")]
        );

        assert_eq!(v.directory(None).unwrap().as_str(), "deployments");
        assert_eq!(v.directory(Some("prod")).unwrap().as_str(), "prod-deployments");
        assert!(v.directory(Some("qa")).is_err());
    }

    #[test]
    fn test_parse_json() {
        assert_eq!(parse_json(br#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        let err = parse_json(b"{not json").unwrap_err();
        assert_eq!(reasons(&err), vec![("value", "json.invalid")]);
    }

    #[test]
    fn test_display() {
        let err = validator().next_color(Some(""), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid request: \"name\" is not allowed to be empty"
        );
    }
}
