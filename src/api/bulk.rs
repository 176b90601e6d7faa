//! Purpose: Multi-title queries split into server-sized batches.
//! Exports: `continued_props`, `single_props`, `single_pages`, `uncontinued_list`.
//! Role: Combines `BatchGrouper` and `QueryCursor` for per-title property and list fetches.
//! Invariants: Every input title appears as a key of the returned map.
//! Invariants: `None` marks a title the server never reported or that lacked the value field.
//! Invariants: Empty or blank titles are rejected before any request is sent.
#![allow(clippy::result_large_err)]

use super::ApiResult;
use super::query::QueryCursor;
use super::session::Session;
use crate::core::batch::{BatchGrouper, MAX_GROUP_QUERY};
use crate::core::error::{Error, ErrorKind};
use crate::core::template::ParamTemplate;
use serde_json::Value;
use std::collections::HashMap;

const TITLE_FIELD: &str = "title";

/// Property query followed through every continuation round. Each title maps to the
/// concatenated records found under `value_key`.
pub fn continued_props<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
    template: &ParamTemplate,
    extra: &[(&str, &str)],
    value_key: &str,
) -> ApiResult<HashMap<String, Option<Vec<Value>>>> {
    ensure_titles(titles)?;
    let mut out: HashMap<String, Option<Vec<Value>>> = titles
        .iter()
        .map(|title| (title.as_ref().to_string(), None))
        .collect();

    for batch in BatchGrouper::new(titles, MAX_GROUP_QUERY)? {
        let mut cursor = cursor_for(session, template, extra);
        cursor.set_list("titles", batch);
        while cursor.has_more() {
            let reply = cursor.advance()?;
            for (title, value) in reply.prop_comp(TITLE_FIELD, value_key) {
                let records = out.entry(title).or_default().get_or_insert_with(Vec::new);
                if let Some(Value::Array(items)) = value {
                    records.extend(items.into_iter().filter(Value::is_object));
                }
            }
        }
    }
    Ok(out)
}

/// Property query sent once per batch; each title maps to its `value_key` value.
pub fn single_props<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
    template: &ParamTemplate,
    extra: &[(&str, &str)],
    value_key: &str,
) -> ApiResult<HashMap<String, Option<Value>>> {
    ensure_titles(titles)?;
    let mut out: HashMap<String, Option<Value>> = titles
        .iter()
        .map(|title| (title.as_ref().to_string(), None))
        .collect();

    for batch in BatchGrouper::new(titles, MAX_GROUP_QUERY)? {
        let mut cursor = cursor_for(session, template, extra);
        cursor.set_list("titles", batch);
        let reply = cursor.advance()?;
        out.extend(reply.prop_comp(TITLE_FIELD, value_key));
    }
    Ok(out)
}

/// Property query sent once per batch; each title maps to its whole page object, or
/// `None` when no reply reported it.
pub fn single_pages<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
    template: &ParamTemplate,
    extra: &[(&str, &str)],
) -> ApiResult<HashMap<String, Option<Value>>> {
    ensure_titles(titles)?;
    let mut out: HashMap<String, Option<Value>> = titles
        .iter()
        .map(|title| (title.as_ref().to_string(), None))
        .collect();

    for batch in BatchGrouper::new(titles, MAX_GROUP_QUERY)? {
        let mut cursor = cursor_for(session, template, extra);
        cursor.set_list("titles", batch);
        let reply = cursor.advance()?;
        out.extend(
            reply
                .page_comp(TITLE_FIELD)
                .into_iter()
                .map(|(title, page)| (title, Some(page))),
        );
    }
    Ok(out)
}

/// List query sent once per batch with the batch bound to `title_key`; records are
/// concatenated in reply order.
pub fn uncontinued_list<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
    template: &ParamTemplate,
    extra: &[(&str, &str)],
    title_key: &str,
) -> ApiResult<Vec<Value>> {
    ensure_titles(titles)?;
    let mut out = Vec::new();
    for batch in BatchGrouper::new(titles, MAX_GROUP_QUERY)? {
        let mut cursor = cursor_for(session, template, extra);
        cursor.set_list(title_key, batch);
        out.extend(cursor.advance()?.list_comp(template.result_key()));
    }
    Ok(out)
}

fn cursor_for(session: &Session, template: &ParamTemplate, extra: &[(&str, &str)]) -> QueryCursor {
    let mut cursor = QueryCursor::new(session, &[*template]);
    for (key, value) in extra {
        cursor.set(key, *value);
    }
    cursor
}

fn ensure_titles<S: AsRef<str>>(titles: &[S]) -> ApiResult<()> {
    match titles.iter().position(|title| title.as_ref().trim().is_empty()) {
        Some(index) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("title at position {index} is empty"))),
        None => Ok(()),
    }
}
