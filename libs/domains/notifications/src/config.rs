//! Relay configuration: broker settings and per-event-type routing rules.
//!
//! Loaded once at startup from a JSON file, validated, and then shared
//! read-only as a [`RoutingTable`].

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::{Display, EnumString};
use thiserror::Error;

/// Redelivery threshold used when `mq.max_retries` is unset or 0.
pub const DEFAULT_MAX_RETRIES: u32 = 16;

/// Work stream used when `mq.stream_name` is unset.
pub const DEFAULT_STREAM_NAME: &str = "NOTIFICATIONS";

/// Errors raised while loading or validating the relay configuration.
#[derive(Debug, Error)]
pub enum RelayConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} is required")]
    MissingField(String),

    #[error("mq.max_retries must not be negative, got {0}")]
    NegativeMaxRetries(i64),

    #[error("at least one notification rule is required")]
    NoRules,

    #[error("notifications[{index}]: invalid http_method {method:?}, expected one of GET, POST, PUT, DELETE, PATCH")]
    InvalidMethod { index: usize, method: String },

    #[error("notifications[{index}]: invalid http_url {url:?}: {reason}")]
    InvalidUrl {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("notifications[{index}]: invalid header {name:?}: {reason}")]
    InvalidHeader {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("notifications[{index}]: duplicate event_type {event_type:?}")]
    DuplicateEventType { index: usize, event_type: String },
}

/// HTTP methods a routing rule may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Broker settings (`mq` section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MqConfig {
    #[serde(default)]
    pub name_server: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub stream_name: String,
    #[serde(default)]
    pub max_retries: i64,
}

impl MqConfig {
    /// User/password credentials, when both keys are set.
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            None
        } else {
            Some((self.access_key.clone(), self.secret_key.clone()))
        }
    }
}

/// One entry of the `notifications` array as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub queue_name: String,
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub http_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// The configuration file as parsed, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfigFile {
    #[serde(default)]
    pub mq: MqConfig,
    #[serde(default)]
    pub notifications: Vec<NotificationEntry>,
}

impl RelayConfigFile {
    /// Validate every field and apply defaults.
    pub fn validate(self) -> Result<RelayConfig, RelayConfigError> {
        let mut mq = self.mq;

        if mq.name_server.is_empty() {
            return Err(RelayConfigError::MissingField("mq.name_server".to_string()));
        }
        if mq.group_name.is_empty() {
            return Err(RelayConfigError::MissingField("mq.group_name".to_string()));
        }
        if mq.max_retries < 0 {
            return Err(RelayConfigError::NegativeMaxRetries(mq.max_retries));
        }
        if mq.max_retries == 0 {
            mq.max_retries = i64::from(DEFAULT_MAX_RETRIES);
        }
        if mq.stream_name.is_empty() {
            mq.stream_name = DEFAULT_STREAM_NAME.to_string();
        }

        if self.notifications.is_empty() {
            return Err(RelayConfigError::NoRules);
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.notifications.len());
        for (index, entry) in self.notifications.into_iter().enumerate() {
            let rule = RoutingRule::from_entry(index, entry)?;
            if !seen.insert(rule.event_type.clone()) {
                return Err(RelayConfigError::DuplicateEventType {
                    index,
                    event_type: rule.event_type,
                });
            }
            rules.push(rule);
        }

        Ok(RelayConfig { mq, rules })
    }
}

/// Validated routing rule for one event type.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRule {
    pub event_type: String,
    /// Topic the ingestion API publishes this event type to
    pub queue_name: String,
    pub method: HttpMethod,
    pub url: Url,
    /// Sent as-is, nothing merged in
    pub headers: HeaderMap,
    /// Body template; `None` sends no body and no `Content-Type`.
    ///
    /// Earlier relays rendered a missing template as `{}` and always sent
    /// that empty object. Rules that rely on an empty JSON body must now
    /// declare `"body": {}` explicitly.
    pub body: Option<Value>,
}

impl RoutingRule {
    fn from_entry(index: usize, entry: NotificationEntry) -> Result<Self, RelayConfigError> {
        let required = |value: &str, field: &str| {
            if value.is_empty() {
                Err(RelayConfigError::MissingField(format!(
                    "notifications[{index}].{field}"
                )))
            } else {
                Ok(())
            }
        };
        required(&entry.event_type, "event_type")?;
        required(&entry.queue_name, "queue_name")?;
        required(&entry.http_method, "http_method")?;
        required(&entry.http_url, "http_url")?;

        let method: HttpMethod =
            entry
                .http_method
                .parse()
                .map_err(|_| RelayConfigError::InvalidMethod {
                    index,
                    method: entry.http_method.clone(),
                })?;

        let url = parse_url(&entry.http_url).map_err(|reason| RelayConfigError::InvalidUrl {
            index,
            url: entry.http_url.clone(),
            reason,
        })?;

        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            let invalid = |reason: String| RelayConfigError::InvalidHeader {
                index,
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            event_type: entry.event_type,
            queue_name: entry.queue_name,
            method,
            url,
            headers,
            body: entry.body,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}

/// Validated relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub mq: MqConfig,
    pub rules: Vec<RoutingRule>,
}

impl RelayConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RelayConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, RelayConfigError> {
        let file: RelayConfigFile = serde_json::from_str(raw)?;
        file.validate()
    }

    /// Redelivery count at which a message is dead-lettered.
    pub fn max_retries(&self) -> u32 {
        u32::try_from(self.mq.max_retries).unwrap_or(u32::MAX)
    }

    /// Immutable lookup table over the rules.
    pub fn routing_table(&self) -> RoutingTable {
        RoutingTable::new(self.rules.iter().cloned())
    }
}

/// Event type → routing rule lookup, shared read-only across handlers.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: HashMap<String, Arc<RoutingRule>>,
    topics: Vec<String>,
}

impl RoutingTable {
    /// Build a table; a later rule for the same event type replaces an earlier one.
    pub fn new(rules: impl IntoIterator<Item = RoutingRule>) -> Self {
        let mut table = Self::default();
        for rule in rules {
            if !table.topics.contains(&rule.queue_name) {
                table.topics.push(rule.queue_name.clone());
            }
            table.rules.insert(rule.event_type.clone(), Arc::new(rule));
        }
        table
    }

    /// Rule for `event_type` (exact match).
    pub fn get(&self, event_type: &str) -> Option<&RoutingRule> {
        self.rules.get(event_type).map(Arc::as_ref)
    }

    /// Distinct queue names, in configuration order.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_json(notifications: Value) -> String {
        json!({
            "mq": {
                "name_server": "nats://localhost:4222",
                "group_name": "notifier",
                "max_retries": 5
            },
            "notifications": notifications
        })
        .to_string()
    }

    fn rule_json(event_type: &str, method: &str, url: &str) -> Value {
        json!({
            "event_type": event_type,
            "queue_name": "user_events",
            "http_method": method,
            "http_url": url,
            "headers": {"Content-Type": "application/json"},
            "body": {"id": "{$.event.user_id}"}
        })
    }

    #[test]
    fn test_valid_config() {
        let raw = config_json(json!([rule_json("user.created", "post", "https://api.example.com/hooks")]));
        let config = RelayConfig::from_json(&raw).unwrap();

        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.mq.stream_name, DEFAULT_STREAM_NAME);
        let rule = &config.rules[0];
        assert_eq!(rule.method, HttpMethod::Post);
        assert_eq!(rule.url.as_str(), "https://api.example.com/hooks");
        assert_eq!(rule.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(rule.body, Some(json!({"id": "{$.event.user_id}"})));
    }

    #[test]
    fn test_max_retries_defaults_to_16() {
        let raw = json!({
            "mq": {"name_server": "nats://localhost:4222", "group_name": "g"},
            "notifications": [rule_json("a", "GET", "http://localhost/x")]
        })
        .to_string();
        assert_eq!(RelayConfig::from_json(&raw).unwrap().max_retries(), 16);
    }

    #[test]
    fn test_negative_max_retries_rejected() {
        let raw = json!({
            "mq": {"name_server": "nats://localhost:4222", "group_name": "g", "max_retries": -1},
            "notifications": [rule_json("a", "GET", "http://localhost/x")]
        })
        .to_string();
        assert!(matches!(
            RelayConfig::from_json(&raw),
            Err(RelayConfigError::NegativeMaxRetries(-1))
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        let raw = json!({"mq": {"group_name": "g"}, "notifications": []}).to_string();
        let err = RelayConfig::from_json(&raw).unwrap_err();
        assert_eq!(err.to_string(), "mq.name_server is required");

        let raw = json!({"mq": {"name_server": "nats://x"}, "notifications": []}).to_string();
        let err = RelayConfig::from_json(&raw).unwrap_err();
        assert_eq!(err.to_string(), "mq.group_name is required");

        let raw = config_json(json!([]));
        assert!(matches!(RelayConfig::from_json(&raw), Err(RelayConfigError::NoRules)));

        let raw = config_json(json!([{"event_type": "a", "http_method": "GET", "http_url": "http://x"}]));
        let err = RelayConfig::from_json(&raw).unwrap_err();
        assert_eq!(err.to_string(), "notifications[0].queue_name is required");
    }

    #[test]
    fn test_method_parsing_is_case_insensitive() {
        for (raw, expected) in [
            ("get", HttpMethod::Get),
            ("Put", HttpMethod::Put),
            ("DELETE", HttpMethod::Delete),
            ("patch", HttpMethod::Patch),
        ] {
            assert_eq!(raw.parse::<HttpMethod>().unwrap(), expected);
        }
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(reqwest::Method::from(HttpMethod::Delete), reqwest::Method::DELETE);
    }

    #[test]
    fn test_invalid_method_rejected() {
        let raw = config_json(json!([rule_json("a", "HEAD", "http://localhost/x")]));
        assert!(matches!(
            RelayConfig::from_json(&raw),
            Err(RelayConfigError::InvalidMethod { index: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_url_rejected() {
        for url in ["not a url", "/relative/path", "ftp://files.example.com/x"] {
            let raw = config_json(json!([rule_json("a", "POST", url)]));
            assert!(
                matches!(RelayConfig::from_json(&raw), Err(RelayConfigError::InvalidUrl { .. })),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut rule = rule_json("a", "POST", "http://localhost/x");
        rule["headers"] = json!({"bad header": "x"});
        let raw = config_json(json!([rule]));
        assert!(matches!(
            RelayConfig::from_json(&raw),
            Err(RelayConfigError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_duplicate_event_type_rejected() {
        let raw = config_json(json!([
            rule_json("user.created", "POST", "http://localhost/a"),
            rule_json("user.created", "PUT", "http://localhost/b"),
        ]));
        assert!(matches!(
            RelayConfig::from_json(&raw),
            Err(RelayConfigError::DuplicateEventType { index: 1, .. })
        ));
    }

    #[test]
    fn test_absent_body_is_none() {
        let mut rule = rule_json("a", "GET", "http://localhost/x");
        rule.as_object_mut().unwrap().remove("body");
        let config = RelayConfig::from_json(&config_json(json!([rule]))).unwrap();
        assert_eq!(config.rules[0].body, None);
    }

    #[test]
    fn test_credentials_require_both_keys() {
        let mut mq = MqConfig::default();
        assert_eq!(mq.credentials(), None);
        mq.access_key = "relay".to_string();
        assert_eq!(mq.credentials(), None);
        mq.secret_key = "secret".to_string();
        assert_eq!(
            mq.credentials(),
            Some(("relay".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_routing_table_lookup_and_topics() {
        let mut a = rule_json("user.created", "POST", "http://localhost/a");
        a["queue_name"] = json!("user_events");
        let mut b = rule_json("user.deleted", "DELETE", "http://localhost/b");
        b["queue_name"] = json!("user_events");
        let mut c = rule_json("order.paid", "POST", "http://localhost/c");
        c["queue_name"] = json!("order_events");

        let config = RelayConfig::from_json(&config_json(json!([a, b, c]))).unwrap();
        let table = config.routing_table();

        assert_eq!(table.len(), 3);
        assert_eq!(table.topics(), ["user_events", "order_events"]);
        assert_eq!(table.get("order.paid").unwrap().method, HttpMethod::Post);
        assert!(table.get("Order.Paid").is_none());
        assert!(table.get("unknown").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RelayConfig::load("/nonexistent/notifier.json").unwrap_err();
        assert!(matches!(err, RelayConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("notifier-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            config_json(json!([rule_json("a", "POST", "http://localhost/x")])),
        )
        .unwrap();

        let config = RelayConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.rules.len(), 1);
    }
}
