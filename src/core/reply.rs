//! Purpose: Classify raw API replies and expose query comprehension helpers.
//! Exports: `ActionReply`, `ReplyBody`, `QueryReply`, `NormalizationMap`.
//! Role: The only place that inspects loosely-typed reply JSON for success/error shape.
//! Invariants: Exactly one `ReplyBody` variant holds; an empty payload is the null reply.
//! Invariants: Comprehension helpers never fail; absent sections yield empty results.
//! Invariants: Title normalization is applied through `NormalizationMap::apply` only.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Outcome of one action as reported by the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyBody {
    /// The section keyed by the action name.
    Success(Value),
    Error { code: String, info: String },
    /// Neither an `error` section nor the action section was present.
    Unknown(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionReply {
    action: Option<String>,
    body: ReplyBody,
    raw: Value,
}

impl ActionReply {
    /// Sentinel for transport-level failure: no action, empty error, empty payload.
    pub fn null() -> Self {
        Self {
            action: None,
            body: ReplyBody::Error {
                code: String::new(),
                info: String::new(),
            },
            raw: Value::Object(Map::new()),
        }
    }

    pub fn wrap(action: &str, raw: Value) -> Self {
        let is_empty = match &raw {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        };
        if is_empty {
            return Self::null();
        }

        let body = if let Some(error) = raw.get("error") {
            ReplyBody::Error {
                code: string_field(error, "code"),
                info: string_field(error, "info"),
            }
        } else if let Some(section) = raw.get(action) {
            ReplyBody::Success(section.clone())
        } else {
            ReplyBody::Unknown(raw.clone())
        };

        Self {
            action: Some(action.to_string()),
            body,
            raw,
        }
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn body(&self) -> &ReplyBody {
        &self.body
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.action.is_none()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, ReplyBody::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, ReplyBody::Error { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.body, ReplyBody::Unknown(_))
    }

    pub fn success(&self) -> Option<&Value> {
        match &self.body {
            ReplyBody::Success(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match &self.body {
            ReplyBody::Error { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn error_info(&self) -> Option<&str> {
        match &self.body {
            ReplyBody::Error { info, .. } => Some(info),
            _ => None,
        }
    }

    pub(crate) fn has_error_code(&self, expected: &str) -> bool {
        self.error_code() == Some(expected)
    }
}

/// `from -> to` pairs reported under `query.normalized` for one reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizationMap {
    pairs: Vec<(String, String)>,
}

impl NormalizationMap {
    pub fn from_reply(raw: &Value) -> Self {
        let pairs = raw
            .pointer("/query/normalized")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let from = entry.get("from")?.as_str()?;
                        let to = entry.get("to")?.as_str()?;
                        Some((from.to_string(), to.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn canonical(&self, title: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(from, _)| from == title)
            .map(|(_, to)| to.as_str())
    }

    /// Copies each canonical key's value to its pre-normalization key. Idempotent.
    pub fn apply<V: Clone>(&self, map: &mut HashMap<String, V>) {
        for (from, to) in &self.pairs {
            if let Some(value) = map.get(to).cloned() {
                map.insert(from.clone(), value);
            }
        }
    }
}

/// Reply to an `action=query` request.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryReply {
    reply: ActionReply,
    normalized: NormalizationMap,
}

impl QueryReply {
    pub fn null() -> Self {
        Self {
            reply: ActionReply::null(),
            normalized: NormalizationMap::default(),
        }
    }

    pub fn wrap(raw: Value) -> Self {
        let normalized = NormalizationMap::from_reply(&raw);
        Self {
            reply: ActionReply::wrap("query", raw),
            normalized,
        }
    }

    pub fn reply(&self) -> &ActionReply {
        &self.reply
    }

    pub fn is_null(&self) -> bool {
        self.reply.is_null()
    }

    pub fn normalization(&self) -> &NormalizationMap {
        &self.normalized
    }

    pub fn continuation(&self) -> Option<&Map<String, Value>> {
        self.reply.raw().get("continue").and_then(Value::as_object)
    }

    /// Objects of the array at `query.<key>`.
    pub fn list_comp(&self, key: &str) -> Vec<Value> {
        self.query_section()
            .and_then(|query| query.get(key))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter(|item| item.is_object()).cloned().collect())
            .unwrap_or_default()
    }

    /// One entry per page under `query.pages`, keyed by `key_field`; `None` marks a page
    /// without `value_field`. Title normalization is applied before returning.
    pub fn prop_comp(&self, key_field: &str, value_field: &str) -> HashMap<String, Option<Value>> {
        self.page_comp(key_field)
            .into_iter()
            .map(|(key, page)| {
                let value = page.get(value_field).cloned();
                (key, value)
            })
            .collect()
    }

    /// Whole page objects under `query.pages`, keyed by `key_field`, normalization applied.
    pub fn page_comp(&self, key_field: &str) -> HashMap<String, Value> {
        let mut out = HashMap::new();
        let Some(pages) = self.query_section().and_then(|query| query.get("pages")) else {
            return out;
        };

        let entries: Vec<&Value> = match pages {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            _ => Vec::new(),
        };
        for page in entries {
            let Some(key) = page.get(key_field).and_then(Value::as_str) else {
                continue;
            };
            out.insert(key.to_string(), page.clone());
        }

        self.normalized.apply(&mut out);
        out
    }

    /// `query.<key>`, or an empty object when absent.
    pub fn meta_comp(&self, key: &str) -> Value {
        self.query_section()
            .and_then(|query| query.get(key))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn query_section(&self) -> Option<&Value> {
        self.reply.raw().get("query")
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
