use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::errors::ClientError;
use crate::reassembler::ReassemblyPolicy;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Everything outside the RFC 3986 unreserved set.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Configuration shared by the REST client, the chat session and the alert
/// feed.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the dashboard API (`http://` or `https://`).
    pub api_url: String,
    /// Base URL for the chat socket (`ws://` or `wss://`).
    pub ws_url: String,
    /// Business the dashboard is scoped to, once the owner has one.
    pub business_id: Option<String>,
    /// Timeout applied to REST calls and to realtime connection setup.
    pub request_timeout: Duration,
    /// Bounded buffer size between link tasks and consumers.
    pub event_buffer_capacity: usize,
    pub policy: ReassemblyPolicy,
    /// Optional cap on the in-memory chat history.
    pub chat_history_limit: Option<usize>,
    /// Optional cap on the alert list.
    pub alert_limit: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    /// Creates a config for `api_url`; the socket URL is derived from it.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            ws_url: derive_ws_url(&api_url),
            api_url,
            business_id: None,
            request_timeout: Duration::from_secs(30),
            event_buffer_capacity: 128,
            policy: ReassemblyPolicy::default(),
            chat_history_limit: None,
            alert_limit: None,
        }
    }

    /// Builds a config from the environment, loading `.env` first.
    ///
    /// Variables: `BIZPULSE_API_URL`, `BIZPULSE_WS_URL`,
    /// `BIZPULSE_BUSINESS_ID`, `BIZPULSE_TIMEOUT_SECS`,
    /// `BIZPULSE_CHAT_POLICY` (`append` | `replace`), `BIZPULSE_ALERT_LIMIT`.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = match get("BIZPULSE_API_URL") {
            Some(api_url) => Self::new(api_url),
            None => Self::default(),
        };
        if let Some(ws_url) = get("BIZPULSE_WS_URL") {
            config = config.ws_url(ws_url);
        }
        config.business_id = get("BIZPULSE_BUSINESS_ID");
        if let Some(raw) = get("BIZPULSE_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                ClientError::Config(format!("BIZPULSE_TIMEOUT_SECS must be an integer, got `{raw}`"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("BIZPULSE_CHAT_POLICY") {
            config.policy = raw.parse()?;
        }
        if let Some(raw) = get("BIZPULSE_ALERT_LIMIT") {
            let limit: usize = raw.parse().map_err(|_| {
                ClientError::Config(format!("BIZPULSE_ALERT_LIMIT must be an integer, got `{raw}`"))
            })?;
            config.alert_limit = Some(limit).filter(|l| *l > 0);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn business_id(mut self, business_id: Option<impl Into<String>>) -> Self {
        self.business_id = business_id.map(Into::into);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    pub fn policy(mut self, policy: ReassemblyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn chat_history_limit(mut self, limit: Option<usize>) -> Self {
        self.chat_history_limit = limit;
        self
    }

    pub fn alert_limit(mut self, limit: Option<usize>) -> Self {
        self.alert_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !has_scheme(&self.api_url, &["http://", "https://"]) {
            return Err(ClientError::Config(format!(
                "api_url must start with http:// or https://, got `{}`",
                self.api_url
            )));
        }
        if !has_scheme(&self.ws_url, &["ws://", "wss://"]) {
            return Err(ClientError::Config(format!(
                "ws_url must start with ws:// or wss://, got `{}`",
                self.ws_url
            )));
        }
        if self.event_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Chat socket URL, scoped to the configured business when there is one.
    pub fn chat_url(&self) -> String {
        chat_url(&self.ws_url, self.business_id.as_deref())
    }

    pub fn alerts_url(&self) -> String {
        format!("{}/alerts/sse", self.api_url)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

/// Builds `<ws_base>/ws/chat`, adding an encoded `business_id` query
/// parameter when one is given.
pub fn chat_url(ws_base: &str, business_id: Option<&str>) -> String {
    let base = format!("{}/ws/chat", ws_base.trim_end_matches('/'));
    match business_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("{base}?business_id={}", utf8_percent_encode(id, QUERY_VALUE)),
        None => base,
    }
}

fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.to_ascii_lowercase().starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_derive_socket_url_from_api_url() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.chat_url(), "ws://localhost:8000/ws/chat");
        assert_eq!(config.alerts_url(), "http://localhost:8000/alerts/sse");
        assert_eq!(config.policy, ReassemblyPolicy::ReplaceOnFinal);
        assert!(config.validate().is_ok());

        let tls = ClientConfig::new("https://api.example.com/");
        assert_eq!(tls.ws_url, "wss://api.example.com");
    }

    #[test]
    fn chat_url_encodes_business_id() {
        assert_eq!(
            chat_url("ws://h:8000/", Some("biz 1/가")),
            "ws://h:8000/ws/chat?business_id=biz%201%2F%EA%B0%80"
        );
        assert_eq!(chat_url("ws://h", Some("  ")), "ws://h/ws/chat");
        assert_eq!(
            chat_url("ws://h", Some("a&b=c?d#e+f~g.h_i-j")),
            "ws://h/ws/chat?business_id=a%26b%3Dc%3Fd%23e%2Bf~g.h_i-j"
        );
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("BIZPULSE_API_URL", "https://dash.example.com"),
            ("BIZPULSE_BUSINESS_ID", "biz-9"),
            ("BIZPULSE_TIMEOUT_SECS", "5"),
            ("BIZPULSE_CHAT_POLICY", "append"),
            ("BIZPULSE_ALERT_LIMIT", "50"),
        ]))
        .expect("config");
        assert_eq!(config.ws_url, "wss://dash.example.com");
        assert_eq!(config.business_id.as_deref(), Some("biz-9"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.policy, ReassemblyPolicy::IncrementalAppend);
        assert_eq!(config.alert_limit, Some(50));
        assert_eq!(
            config.chat_url(),
            "wss://dash.example.com/ws/chat?business_id=biz-9"
        );
    }

    #[test]
    fn from_lookup_rejects_bad_values() {
        let err = ClientConfig::from_lookup(lookup(&[("BIZPULSE_TIMEOUT_SECS", "soon")]))
            .expect_err("bad timeout");
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("BIZPULSE_TIMEOUT_SECS")));

        let err = ClientConfig::from_lookup(lookup(&[("BIZPULSE_WS_URL", "http://x")]))
            .expect_err("bad ws url");
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("ws_url")));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = ClientConfig::default().event_buffer_capacity(0);
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }
}
