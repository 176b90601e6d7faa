//! Purpose: Small task-level operations built on cursors, batch helpers, and executors.
//! Exports: listing, page text, existence, categories, user groups, redirects, edit, upload.
//! Role: The surface the CLI calls; each function is one user-visible operation.
//! Invariants: Titles are passed through verbatim; no namespace rewriting happens here.
#![allow(clippy::result_large_err)]

use super::ApiResult;
use super::action::{ActionExecutor, EditRequest};
use super::bulk::{continued_props, single_pages, single_props, uncontinued_list};
use super::query::QueryCursor;
use super::session::Session;
use super::upload::{ChunkedUploadManager, UploadRequest};
use crate::core::reply::ActionReply;
use crate::core::template::{
    ALL_PAGES, CATEGORY_MEMBERS, EXISTS, PAGE_CATEGORIES, PAGE_TEXT, RESOLVE_REDIRECT, USER_RIGHTS,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Titles in `category` (full title, e.g. `Category:Foo`); `cap <= 0` fetches everything.
pub fn category_members(session: &Session, category: &str, cap: i64) -> ApiResult<Vec<String>> {
    tracing::info!("listing members of {category}");
    let mut cursor = QueryCursor::new(session, &[CATEGORY_MEMBERS]).with_cap(cap);
    cursor.set("cmtitle", category);
    Ok(titles_of(&cursor.collect_list("categorymembers")?))
}

pub fn all_pages(session: &Session, prefix: Option<&str>, cap: i64) -> ApiResult<Vec<String>> {
    tracing::info!("listing pages with prefix {}", prefix.unwrap_or("(none)"));
    let mut cursor = QueryCursor::new(session, &[ALL_PAGES]).with_cap(cap);
    if let Some(prefix) = prefix {
        cursor.set("apprefix", prefix);
    }
    Ok(titles_of(&cursor.collect_list("allpages")?))
}

/// Current wikitext per title; missing pages map to an empty string.
pub fn page_text<S: AsRef<str>>(session: &Session, titles: &[S]) -> ApiResult<HashMap<String, String>> {
    let props = single_props(session, titles, &PAGE_TEXT, &[], PAGE_TEXT.result_key())?;
    Ok(props
        .into_iter()
        .map(|(title, revisions)| {
            let text = revisions
                .as_ref()
                .and_then(|revisions| revisions.get(0))
                .and_then(revision_text)
                .unwrap_or_default()
                .to_string();
            (title, text)
        })
        .collect())
}

/// `Some(false)` for pages the server marks `missing` or `invalid`, `Some(true)` for other
/// reported pages, and `None` for titles no reply mentioned.
pub fn exists<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
) -> ApiResult<HashMap<String, Option<bool>>> {
    let pages = single_pages(session, titles, &EXISTS, &[])?;
    Ok(pages
        .into_iter()
        .map(|(title, page)| {
            let present =
                page.map(|page| page.get("missing").is_none() && page.get("invalid").is_none());
            (title, present)
        })
        .collect())
}

pub fn page_categories<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
) -> ApiResult<HashMap<String, Vec<String>>> {
    let props = continued_props(session, titles, &PAGE_CATEGORIES, &[], PAGE_CATEGORIES.result_key())?;
    Ok(props
        .into_iter()
        .map(|(title, records)| (title, records.map(|r| titles_of(&r)).unwrap_or_default()))
        .collect())
}

/// Groups per user name; users the server does not know are absent.
pub fn user_groups<S: AsRef<str>>(
    session: &Session,
    users: &[S],
) -> ApiResult<HashMap<String, Vec<String>>> {
    let records = uncontinued_list(session, users, &USER_RIGHTS, &[], "ususers")?;
    Ok(records
        .iter()
        .filter_map(|record| {
            let name = record.get("name")?.as_str()?.to_string();
            let groups = record
                .get("groups")
                .and_then(Value::as_array)
                .map(|groups| groups.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Some((name, groups))
        })
        .collect())
}

/// Redirect target per title; titles that are not redirects map to themselves.
pub fn resolve_redirects<S: AsRef<str>>(
    session: &Session,
    titles: &[S],
) -> ApiResult<HashMap<String, String>> {
    let mut out: HashMap<String, String> = titles
        .iter()
        .map(|title| (title.as_ref().to_string(), title.as_ref().to_string()))
        .collect();
    for record in uncontinued_list(session, titles, &RESOLVE_REDIRECT, &[], "titles")? {
        if let (Some(from), Some(to)) = (
            record.get("from").and_then(Value::as_str),
            record.get("to").and_then(Value::as_str),
        ) {
            out.insert(from.to_string(), to.to_string());
        }
    }
    Ok(out)
}

pub fn edit(session: &Session, title: &str, text: &str, summary: &str) -> ActionReply {
    ActionExecutor::new(session).edit(&EditRequest::new(title, text, summary))
}

pub fn upload(
    session: &Session,
    path: &Path,
    title: &str,
    text: &str,
    summary: &str,
) -> ApiResult<ActionReply> {
    ChunkedUploadManager::new(session).upload(path, &UploadRequest::new(title, text, summary))
}

/// `title` field of each record, skipping records without one.
pub fn titles_of(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.get("title").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn revision_text(revision: &Value) -> Option<&str> {
    revision
        .get("*")
        .or_else(|| revision.pointer("/slots/main/*"))
        .or_else(|| revision.pointer("/slots/main/content"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::{revision_text, titles_of};
    use serde_json::json;

    #[test]
    fn titles_skip_records_without_title() {
        let records = vec![json!({"title": "A"}), json!({"pageid": 3}), json!({"title": "B"})];
        assert_eq!(titles_of(&records), vec!["A", "B"]);
    }

    #[test]
    fn revision_text_reads_legacy_and_slot_layouts() {
        assert_eq!(revision_text(&json!({"*": "legacy"})), Some("legacy"));
        assert_eq!(
            revision_text(&json!({"slots": {"main": {"*": "slotted"}}})),
            Some("slotted")
        );
        assert_eq!(revision_text(&json!({"comment": "x"})), None);
    }
}
