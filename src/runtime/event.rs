use axum::http::{header::CONTENT_TYPE, request::Parts, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// The record a handler receives for one invocation.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct Event {
    /// Parsed JSON when the payload is JSON, the raw text otherwise, `null` when empty.
    pub body: Value,
    /// First value per header name.
    pub headers: BTreeMap<String, String>,
    pub method: String,
    pub path: String,
    /// First value per query key.
    pub query: BTreeMap<String, String>,
}

#[derive(ThisError, Debug)]
pub enum EventError {
    #[error("Malformed JSON body: {0}")]
    MalformedJson(#[source] serde_json::Error),
}

impl Event {
    pub fn from_parts(parts: &Parts, body: &[u8]) -> Result<Self, EventError> {
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        Ok(Self {
            body: parse_body(content_type, body)?,
            headers: first_header_values(&parts.headers),
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: first_query_values(parts.uri.query()),
        })
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json" || essence.ends_with("+json")
}

/// A declared JSON payload must parse. Anything else is parsed opportunistically.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Value, EventError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    if content_type.map(is_json).unwrap_or(false) {
        return serde_json::from_slice(body).map_err(EventError::MalformedJson);
    }

    Ok(serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())))
}

pub fn first_header_values(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for (name, value) in headers {
        values
            .entry(name.as_str().to_string())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    values
}

pub fn first_query_values(query: Option<&str>) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        values.entry(key.into_owned()).or_insert(value.into_owned());
    }
    values
}
