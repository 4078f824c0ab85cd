//! Turning an inbound webhook delivery into a storable record, and the shape
//! of the synthetic response sent while capture is disabled.

use rocket::{
    http::{ContentType, HeaderMap, RawStr, Status},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde_json::{Map, Value};

use crate::{settings::Settings, store::NewRequest};

/// Bracket segments beyond this depth stay part of the last key verbatim.
const MAX_KEY_DEPTH: usize = 5;

/// Builds the row for `req`, whose payload has already been read into `body`.
pub fn capture_record(req: &Request<'_>, body: &[u8]) -> NewRequest {
    let query = req
        .uri()
        .query()
        .map(|query| parse_query_string(query.as_str()))
        .unwrap_or_else(|| Value::Object(Map::new()));

    NewRequest {
        method: req.method().as_str().to_owned(),
        headers: header_map(req.headers()).to_string(),
        query: query.to_string(),
        body: CapturedBody::parse(req.content_type(), body).into_stored(),
    }
}

/// A request payload after content-type driven parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedBody {
    /// An object or array; stored re-encoded as JSON.
    Structured(Value),
    /// Anything else; stored verbatim.
    Text(String),
}

impl CapturedBody {
    pub fn parse(content_type: Option<&ContentType>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Structured(Value::Object(Map::new()));
        }

        let text = String::from_utf8_lossy(bytes);
        match content_type {
            Some(ct) if ct.is_json() => match serde_json::from_str::<Value>(&text) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
                _ => Self::Text(text.into_owned()),
            },
            Some(ct) if ct.is_form() => Self::Structured(parse_query_string(&text)),
            _ => Self::Text(text.into_owned()),
        }
    }

    pub fn into_stored(self) -> String {
        match self {
            Self::Structured(value) => value.to_string(),
            Self::Text(text) => text,
        }
    }
}

/// Header name to value; a name seen more than once maps to an array.
pub fn header_map(headers: &HeaderMap<'_>) -> Value {
    let mut map = Map::new();
    for header in headers.iter() {
        insert(
            &mut map,
            header.name().as_str(),
            &[],
            Value::String(header.value().to_owned()),
        );
    }
    Value::Object(map)
}

/// Parses `a=1&a=2&b[c]=3&d[]=4` into `{"a":["1","2"],"b":{"c":"3"},"d":["4"]}`.
///
/// Works for both query strings and `application/x-www-form-urlencoded`
/// bodies. Never fails: pairs without `=` get an empty value and unbalanced
/// brackets keep the key literal.
pub fn parse_query_string(raw: &str) -> Value {
    let mut root = Map::new();
    for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = RawStr::new(key).url_decode_lossy();
        if key.is_empty() {
            continue;
        }
        let value = RawStr::new(value).url_decode_lossy().into_owned();

        let (head, path) = split_key(&key);
        insert(&mut root, head, &path, Value::String(value));
    }
    Value::Object(root)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// `[]`
    Push,
    /// `[name]`
    Key(&'a str),
}

fn split_key(key: &str) -> (&str, Vec<Segment<'_>>) {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return (key, Vec::new());
    };

    let (head, mut rest) = key.split_at(open);
    let mut segments = Vec::new();
    while segments.len() < MAX_KEY_DEPTH {
        let Some(inner) = rest.strip_prefix('[') else {
            break;
        };
        let Some(close) = inner.find(']') else {
            break;
        };
        let name = &inner[..close];
        segments.push(if name.is_empty() {
            Segment::Push
        } else {
            Segment::Key(name)
        });
        rest = &inner[close + 1..];
    }

    if !rest.is_empty() {
        if segments.is_empty() {
            return (key, Vec::new());
        }
        segments.push(Segment::Key(rest));
    }
    (head, segments)
}

fn insert(map: &mut Map<String, Value>, key: &str, path: &[Segment<'_>], value: Value) {
    match map.get_mut(key) {
        Some(existing) => merge(existing, path, value),
        None => {
            map.insert(key.to_owned(), build(path, value));
        }
    }
}

fn build(path: &[Segment<'_>], value: Value) -> Value {
    match path.split_first() {
        None => value,
        Some((Segment::Push, rest)) => Value::Array(vec![build(rest, value)]),
        Some((Segment::Key(name), rest)) => {
            let mut map = Map::new();
            map.insert((*name).to_owned(), build(rest, value));
            Value::Object(map)
        }
    }
}

fn merge(existing: &mut Value, path: &[Segment<'_>], value: Value) {
    match (existing, path.split_first()) {
        (Value::Array(items), None) => items.push(value),
        (Value::Array(items), Some((Segment::Push, rest))) => items.push(build(rest, value)),
        (Value::Object(map), Some((Segment::Key(name), rest))) => insert(map, name, rest, value),
        // `a=1&a[]=2` is the same list as `a[]=1&a=2`.
        (existing, Some((Segment::Push, rest))) if !existing.is_object() => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, build(rest, value)]);
        }
        // Shapes disagree (e.g. `a=1&a[b]=2`): keep every value, in order.
        (existing, _) => {
            let next = build(path, value);
            *existing = match existing.take() {
                Value::Array(mut items) => {
                    items.push(next);
                    Value::Array(items)
                }
                previous => Value::Array(vec![previous, next]),
            };
        }
    }
}

/// Body of a disabled-mode response: the configured error body is sent as
/// JSON when it parses as JSON, as plain text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Structured(Value),
    Text(String),
}

impl ErrorBody {
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw)
            .map(Self::Structured)
            .unwrap_or_else(|_| Self::Text(raw.to_owned()))
    }
}

/// What `/webhook` answers while capture is disabled and downtime is not
/// being simulated.
#[derive(Debug, Clone, PartialEq)]
pub struct DisabledResponse {
    pub status: Status,
    pub body: ErrorBody,
}

impl DisabledResponse {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            status: Status::new(settings.error_status_code),
            body: ErrorBody::parse(&settings.error_body),
        }
    }
}

impl<'r> Responder<'r, 'static> for DisabledResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        match self.body {
            ErrorBody::Structured(value) => (self.status, Json(value)).respond_to(req),
            ErrorBody::Text(text) => (self.status, text).respond_to(req),
        }
    }
}
