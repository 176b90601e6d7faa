//! Purpose: Drive paginated `action=query` requests to completion.
//! Exports: `QueryCursor`.
//! Role: Seeds parameters from templates, merges `continue` maps, enforces a total result cap.
//! Invariants: Each `advance` issues exactly one request.
//! Invariants: No request leaves while a template placeholder is unset.
//! Invariants: With a cap, the final round asks for exactly the remaining budget.
//! Invariants: A transport failure ends the cursor with a null reply.
#![allow(clippy::result_large_err)]

use super::ApiResult;
use super::session::{ApiCall, Session};
use crate::core::error::{Error, ErrorKind};
use crate::core::reply::QueryReply;
use crate::core::template::ParamTemplate;
use serde_json::Value;

const MAX_LIMIT: &str = "max";

#[derive(Debug)]
pub struct QueryCursor {
    session: Session,
    params: Vec<(String, Option<String>)>,
    limit_keys: Vec<&'static str>,
    per_page: u64,
    total_cap: Option<u64>,
    emitted: u64,
    can_continue: bool,
}

impl QueryCursor {
    /// Cursor over the union of `templates`; later templates override earlier fields.
    pub fn new(session: &Session, templates: &[ParamTemplate]) -> Self {
        let mut cursor = Self {
            session: session.clone(),
            params: Vec::new(),
            limit_keys: Vec::new(),
            per_page: u64::from(session.config().max_result_limit()),
            total_cap: None,
            emitted: 0,
            can_continue: true,
        };
        for template in templates {
            for (key, value) in template.fields() {
                cursor.put(key, value.map(str::to_string));
            }
            if let Some(limit_key) = template.limit_key() {
                if !cursor.limit_keys.contains(&limit_key) {
                    cursor.limit_keys.push(limit_key);
                }
                cursor.put(limit_key, Some(MAX_LIMIT.to_string()));
            }
        }
        cursor
    }

    /// Caps the number of results across all rounds; `cap <= 0` means unbounded.
    pub fn with_cap(mut self, cap: i64) -> Self {
        self.total_cap = u64::try_from(cap).ok().filter(|cap| *cap > 0);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.put(key, Some(value.into()));
        self
    }

    /// Binds `key` to the values joined with `|`.
    pub fn set_list<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> &mut Self {
        let joined = values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("|");
        self.put(key, Some(joined));
        self
    }

    /// `n <= 0` or above the session's result ceiling selects `"max"`.
    pub fn adjust_limit(&mut self, n: i64) -> &mut Self {
        let ceiling = u64::from(self.session.config().max_result_limit());
        let (value, per_page) = match u64::try_from(n) {
            Ok(n) if n > 0 && n <= ceiling => (n.to_string(), n),
            _ => (MAX_LIMIT.to_string(), ceiling),
        };
        self.per_page = per_page;
        for key in self.limit_keys.clone() {
            self.put(key, Some(value.clone()));
        }
        self
    }

    pub fn has_more(&self) -> bool {
        self.can_continue
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Issues the next request and returns its reply.
    pub fn advance(&mut self) -> ApiResult<QueryReply> {
        if !self.can_continue {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("query cursor has no more results")
                .with_hint("Check has_more() before calling advance()."));
        }
        let unset: Vec<&str> = self
            .params
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.as_str())
            .collect();
        if !unset.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("query parameters not set: {}", unset.join(", "))));
        }

        let mut final_round = false;
        if let Some(cap) = self.total_cap {
            let remaining = cap.saturating_sub(self.emitted);
            if remaining <= self.per_page {
                self.adjust_limit(i64::try_from(remaining).unwrap_or(i64::MAX));
                final_round = true;
            }
            self.emitted = self.emitted.saturating_add(self.per_page);
        }

        let call = ApiCall::get("query").params(
            self.params
                .iter()
                .filter_map(|(key, value)| value.as_ref().map(|value| (key.clone(), value.clone()))),
        );
        let body = match self.session.tokenized_request(&call) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!("query request failed: {err}");
                self.can_continue = false;
                return Ok(QueryReply::null());
            }
        };

        let reply = QueryReply::wrap(body);
        match reply.continuation() {
            Some(cont) if !final_round => {
                for (key, value) in cont {
                    self.put(key, Some(continue_value(value)));
                }
            }
            _ => self.can_continue = false,
        }
        Ok(reply)
    }

    /// Runs the cursor dry and concatenates `list_comp(key)` of every reply.
    pub fn collect_list(&mut self, key: &str) -> ApiResult<Vec<Value>> {
        let mut out = Vec::new();
        while self.has_more() {
            out.extend(self.advance()?.list_comp(key));
        }
        Ok(out)
    }

    fn put(&mut self, key: &str, value: Option<String>) {
        if let Some(slot) = self.params.iter_mut().find(|(name, _)| name == key) {
            slot.1 = value;
        } else {
            self.params.push((key.to_string(), value));
        }
    }
}

fn continue_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
