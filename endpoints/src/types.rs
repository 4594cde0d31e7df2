use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Storage kind of endpoint documents.
pub const ENDPOINT_KIND: &str = "Endpoint";

/// Namespace used when a request names no environment.
pub const DEFAULT_NAMESPACE: &str = "deployments";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    pub const ALL: [Color; 2] = [Color::Blue, Color::Green];

    pub fn other(self) -> Color {
        match self {
            Color::Blue => Color::Green,
            Color::Green => Color::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Green => "green",
        }
    }

    pub fn parse(value: &str) -> Option<Color> {
        Color::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two candidate URLs of an endpoint. There is no slot for a third color.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Urls {
    pub blue: String,
    pub green: String,
}

impl Urls {
    pub fn get(&self, color: Color) -> &str {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }

    pub fn set(&mut self, color: Color, url: String) {
        match color {
            Color::Blue => self.blue = url,
            Color::Green => self.green = url,
        }
    }
}

/// Persisted state of one blue/green endpoint. The name is the storage key
/// and is not part of the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Canonical color.
    pub color: Color,
    pub urls: Urls,
    /// Rollout window length in seconds, starting at `updated_at`.
    pub duration: u64,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// URL of the canonical color.
    pub fn freshest(&self) -> &str {
        self.urls.get(self.color)
    }

    /// URL of the color being rolled away from.
    pub fn previous(&self) -> &str {
        self.urls.get(self.color.other())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub url: String,
    pub freshest: String,
}

/// Resolved URL for every endpoint of a namespace, computed at `last_updated`.
#[derive(Clone, Debug, PartialEq)]
pub struct Directory {
    pub entries: HashMap<String, DirectoryEntry>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextColor {
    pub is_new: bool,
    pub next_color: Color,
}

/// Storage partition derived from the request's environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn for_environment(environment: Option<&str>) -> Self {
        match environment {
            Some(env) => Namespace(format!("{env}-deployments")),
            None => Namespace(DEFAULT_NAMESPACE.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color() {
        assert_eq!(Color::Blue.other(), Color::Green);
        assert_eq!(Color::Green.other(), Color::Blue);
        assert_eq!(Color::parse("green"), Some(Color::Green));
        assert_eq!(Color::parse("red"), None);
        assert_eq!(Color::parse("Blue"), None);
    }

    #[test]
    fn test_endpoint_document() {
        let json = r#"{
            "color": "green",
            "urls": {"blue": "https://b.example", "green": "https://g.example"},
            "duration": 60,
            "updatedAt": "2024-05-01T12:00:00Z"
        }"#;
        let endpoint: Endpoint = serde_json::from_str(json).unwrap();
        assert_eq!(endpoint.color, Color::Green);
        assert_eq!(endpoint.freshest(), "https://g.example");
        assert_eq!(endpoint.previous(), "https://b.example");

        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["updatedAt"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_urls_reject_third_color() {
        let json = r#"{"blue": "a", "green": "b", "red": "c"}"#;
        assert!(serde_json::from_str::<Urls>(json).is_err());
    }

    #[test]
    fn test_namespace() {
        assert_eq!(Namespace::for_environment(None).as_str(), "deployments");
        assert_eq!(
            Namespace::for_environment(Some("prod")).as_str(),
            "prod-deployments"
        );
    }
}
