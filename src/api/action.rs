//! Purpose: Execute one logical API action with rate-limit backoff, plus the edit retry layer.
//! Exports: `ActionExecutor`, `EditRequest`.
//! Role: Turns the session's request primitive into an `ActionReply` that never fails.
//! Invariants: Transport faults become the null reply; nothing here returns `Err`.
//! Invariants: `ratelimited` replies are retried after a randomized, truncated exponential wait.
//! Invariants: Edits stop early on success or protection errors and return the last reply otherwise.

use super::session::{ApiCall, Session};
use super::transport::Method;
use crate::core::reply::ActionReply;
use std::thread;
use std::time::Instant;

const PROTECTION_CODES: [&str; 2] = ["protectedpage", "cascadeprotected"];

#[derive(Clone, Debug)]
pub struct ActionExecutor {
    session: Session,
}

impl ActionExecutor {
    pub fn new(session: &Session) -> Self {
        Self {
            session: session.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn execute(
        &self,
        action: &str,
        method: Method,
        fields: &[(&str, &str)],
        apply_token: bool,
    ) -> ActionReply {
        let call = match method {
            Method::Get => ApiCall::get(action),
            Method::Post => ApiCall::post(action),
        };
        self.execute_call(&call.params(fields.iter().copied()).with_token(apply_token))
    }

    /// Sends `call`, sleeping and resending for as long as the server reports `ratelimited`.
    pub fn execute_call(&self, call: &ApiCall) -> ActionReply {
        let mut backoff = self.session.config().backoff().start();
        loop {
            let body = match self.session.tokenized_request(call) {
                Ok(body) => body,
                Err(err) => {
                    tracing::error!("{} request failed: {err}", call.action());
                    return ActionReply::null();
                }
            };
            let reply = ActionReply::wrap(call.action(), body);
            if !reply.has_error_code("ratelimited") {
                return reply;
            }
            let wait = backoff.next_wait();
            tracing::warn!(
                "rate limited on {}; waiting {:?} (window {})",
                call.action(),
                wait,
                backoff.bound()
            );
            thread::sleep(wait);
        }
    }

    pub fn edit(&self, request: &EditRequest) -> ActionReply {
        let policy = self.session.config().edit_policy();
        let started = Instant::now();
        tracing::info!("editing {}", request.title);

        let call = request.to_call();
        let mut last = ActionReply::null();
        for attempt in 1..=policy.max_attempts() {
            last = self.execute_call(&call);
            if last.is_success() {
                return last;
            }
            if last
                .error_code()
                .is_some_and(|code| PROTECTION_CODES.contains(&code))
            {
                tracing::error!("{} is protected; not editing", request.title);
                return last;
            }
            if last.is_unknown() {
                tracing::warn!("unknown edit reply for {} on attempt {attempt}", request.title);
            } else {
                tracing::warn!(
                    "edit of {} failed on attempt {attempt}: {}",
                    request.title,
                    last.error_code().unwrap_or_default()
                );
            }
            if policy
                .max_elapsed()
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                tracing::warn!("edit of {} ran out of time", request.title);
                break;
            }
        }

        tracing::error!("could not edit {}; giving up", request.title);
        last
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditRequest {
    title: String,
    text: String,
    summary: String,
    bot: bool,
}

impl EditRequest {
    pub fn new(title: impl Into<String>, text: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            summary: summary.into(),
            bot: false,
        }
    }

    /// Flags the edit as a bot edit.
    pub fn bot(mut self, bot: bool) -> Self {
        self.bot = bot;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn to_call(&self) -> ApiCall {
        let call = ApiCall::post("edit")
            .param("title", self.title.as_str())
            .param("text", self.text.as_str())
            .param("summary", self.summary.as_str())
            .with_token(true);
        if self.bot { call.param("bot", "") } else { call }
    }
}
