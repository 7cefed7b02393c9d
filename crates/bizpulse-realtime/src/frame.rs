//! Wire frames exchanged over the chat socket.
//!
//! Server frames are discriminated by their `type` member. Decoding is
//! tolerant: a frame that cannot be parsed becomes an `error` frame, and
//! malformed optional members are dropped one by one instead of rejecting
//! the whole frame.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::ClientError;

/// One decoded server → client frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Partial streamed answer text.
    Chunk { content: String },
    /// Complete answer.
    Final(FinalAnswer),
    /// Server-side failure, optionally with a human-readable detail.
    Error { detail: Option<String> },
    /// Any other `type`, kept only for logging.
    Unknown { kind: Option<String> },
}

/// Which server response shape a `final` frame arrived in.
///
/// The server has no version field, so the shape is inferred from the keys
/// present and recorded for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FinalShape {
    /// `{ "type": "final", "payload": { "answer", "sources", ... } }`
    Enveloped,
    /// `{ "type": "final", "answer": ..., ... }`
    Flat,
    /// `{ "type": "final", "response": ..., "sources": ... }`
    #[default]
    Legacy,
}

/// Structured contents of a `final` frame.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FinalAnswer {
    pub text: String,
    pub sources: Vec<Source>,
    pub charts: Vec<Chart>,
    pub calculations: BTreeMap<String, Option<f64>>,
    pub shape: FinalShape,
}

/// Citation backing a generated answer.
///
/// Accepts both the simple `{ "source_name": ... }` shape and the hybrid
/// `{ "type": "sql" | "doc", "name": ..., "meta": {...} }` shape.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Source {
    /// Creates a hybrid-style citation.
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Best display label: `name`, then `source_name`, then the kind.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.source_name.as_deref())
            .or(self.kind.as_deref())
            .unwrap_or("unknown source")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub series: Vec<ChartSeries>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    #[serde(default)]
    pub data: Vec<ChartPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: String,
    pub y: f64,
}

/// Client → server query frame.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryFrame {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl QueryFrame {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn business_id(mut self, business_id: Option<impl Into<String>>) -> Self {
        self.business_id = business_id.map(Into::into);
        self
    }

    /// Restricts the answer to an ISO date range.
    pub fn date_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.date_from = Some(from.into());
        self.date_to = Some(to.into());
        self
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decodes one text message from the socket. Never fails.
pub fn decode_frame(text: &str) -> Frame {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Frame::from_value(&value),
        Err(err) => {
            warn!(error = %err, len = text.len(), "dropping malformed frame");
            Frame::Error { detail: None }
        }
    }
}

impl Frame {
    /// Maps an already-parsed JSON value onto a frame.
    pub fn from_value(value: &Value) -> Frame {
        if !value.is_object() {
            warn!("frame is not a JSON object");
            return Frame::Error { detail: None };
        }
        let kind = value.get("type").and_then(Value::as_str);
        match kind {
            Some("chunk") => Frame::Chunk {
                content: value
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some("final") => Frame::Final(FinalAnswer::from_value(value)),
            Some("error") => Frame::Error {
                detail: value.get("detail").and_then(detail_text),
            },
            other => Frame::Unknown {
                kind: other.map(ToOwned::to_owned),
            },
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &str {
        match self {
            Frame::Chunk { .. } => "chunk",
            Frame::Final(_) => "final",
            Frame::Error { .. } => "error",
            Frame::Unknown { kind } => kind.as_deref().unwrap_or("<untyped>"),
        }
    }
}

impl FinalAnswer {
    /// Builds an answer from a `final` frame in any of the known shapes.
    ///
    /// Text precedence is `payload.answer`, then `answer`, then `response`.
    /// Collections are read from the payload envelope when present, falling
    /// back to top-level members.
    pub fn from_value(frame: &Value) -> Self {
        let payload = frame.get("payload").filter(|p| p.is_object());
        let (body, shape) = match payload {
            Some(payload) => (payload, FinalShape::Enveloped),
            None if frame.get("answer").is_some() => (frame, FinalShape::Flat),
            None => (frame, FinalShape::Legacy),
        };

        let text = body
            .get("answer")
            .and_then(Value::as_str)
            .or_else(|| frame.get("answer").and_then(Value::as_str))
            .or_else(|| frame.get("response").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let member = |key: &str| body.get(key).or_else(|| frame.get(key));

        Self {
            text,
            sources: lenient_list(member("sources")),
            charts: lenient_list(member("charts")),
            calculations: calculations(member("calculations")),
            shape,
        }
    }
}

fn detail_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn lenient_list<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(error = %err, "dropping malformed frame member");
                None
            }
        })
        .collect()
}

fn calculations(value: Option<&Value>) -> BTreeMap<String, Option<f64>> {
    let Some(map) = value.and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(key, v)| match v {
            Value::Null => Some((key.clone(), None)),
            Value::Number(n) => Some((key.clone(), n.as_f64())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_chunk_and_error_frames() {
        assert_eq!(
            decode_frame(r#"{"type":"chunk","content":"Hel"}"#),
            Frame::Chunk {
                content: "Hel".into()
            }
        );
        assert_eq!(
            decode_frame(r#"{"type":"error","detail":"Query not provided."}"#),
            Frame::Error {
                detail: Some("Query not provided.".into())
            }
        );
        assert_eq!(
            decode_frame(r#"{"type":"error"}"#),
            Frame::Error { detail: None }
        );
    }

    #[test]
    fn malformed_json_fails_closed_to_error_frame() {
        assert_eq!(decode_frame("{not json"), Frame::Error { detail: None });
        assert_eq!(decode_frame("[1,2]"), Frame::Error { detail: None });
    }

    #[test]
    fn unknown_and_untyped_frames_are_preserved_as_unknown() {
        assert_eq!(
            decode_frame(r#"{"type":"ping"}"#),
            Frame::Unknown {
                kind: Some("ping".into())
            }
        );
        assert_eq!(decode_frame(r#"{"x":1}"#), Frame::Unknown { kind: None });
    }

    #[test]
    fn final_legacy_shape_uses_response_and_sources() {
        let frame = decode_frame(
            r#"{"type":"final","response":"Sales are up","sources":[{"source_name":"daily.csv"}]}"#,
        );
        let Frame::Final(answer) = frame else {
            panic!("expected final frame");
        };
        assert_eq!(answer.shape, FinalShape::Legacy);
        assert_eq!(answer.text, "Sales are up");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].label(), "daily.csv");
        assert!(answer.charts.is_empty());
        assert!(answer.calculations.is_empty());
    }

    #[test]
    fn final_enveloped_shape_reads_payload() {
        let value = json!({
            "type": "final",
            "payload": {
                "answer": "Revenue grew 12%",
                "sources": [{"type": "sql", "name": "public.metrics_daily", "meta": {"from": "2024-01-01"}}],
                "charts": [{"type": "timeseries", "series": [{"name": "sales", "data": [{"x": "2024-01-01", "y": 10.5}]}]}],
                "calculations": {"growth": 0.12, "avg": null, "bogus": "x"}
            }
        });
        let Frame::Final(answer) = Frame::from_value(&value) else {
            panic!("expected final frame");
        };
        assert_eq!(answer.shape, FinalShape::Enveloped);
        assert_eq!(answer.text, "Revenue grew 12%");
        assert_eq!(answer.sources[0].kind.as_deref(), Some("sql"));
        assert_eq!(answer.sources[0].label(), "public.metrics_daily");
        assert_eq!(answer.charts[0].series[0].data[0].y, 10.5);
        assert_eq!(answer.calculations.get("growth"), Some(&Some(0.12)));
        assert_eq!(answer.calculations.get("avg"), Some(&None));
        assert!(!answer.calculations.contains_key("bogus"));
    }

    #[test]
    fn final_without_optional_members_defaults_to_empty() {
        let Frame::Final(answer) = decode_frame(r#"{"type":"final","answer":"Done"}"#) else {
            panic!("expected final frame");
        };
        assert_eq!(answer.shape, FinalShape::Flat);
        assert_eq!(answer.text, "Done");
        assert!(answer.sources.is_empty());
        assert!(answer.charts.is_empty());
        assert!(answer.calculations.is_empty());
    }

    #[test]
    fn malformed_members_are_dropped_individually() {
        let Frame::Final(answer) = decode_frame(
            r#"{"type":"final","answer":"ok","sources":[{"name":"a"},"oops",{"name":"b"}],"charts":[{"series":[]}]}"#,
        ) else {
            panic!("expected final frame");
        };
        let labels: Vec<_> = answer.sources.iter().map(Source::label).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert!(answer.charts.is_empty());
    }

    #[test]
    fn query_frame_omits_unset_members() {
        assert_eq!(
            QueryFrame::new("how are sales?").to_json().expect("encode"),
            r#"{"query":"how are sales?"}"#
        );
        let with_biz = QueryFrame::new("q").business_id(Some("biz-1"));
        assert_eq!(
            with_biz.to_json().expect("encode"),
            r#"{"query":"q","business_id":"biz-1"}"#
        );
    }
}
