// Token recovery, rate-limit backoff, and edit retry policy.
mod support;

use mwclient::api::{
    ActionExecutor, ApiRequest, ApiResponse, ApiResult, EditPolicy, EditRequest, Method,
    RequestBody, Session, Transport, ops,
};
use serde_json::json;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use support::{ScriptedTransport, fast_config, session_with, session_with_config};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn logged_in(transport: &Arc<ScriptedTransport>) -> TestResult<Session> {
    transport.push_login("Bot", "tok1+\\");
    let session = session_with(transport);
    assert!(session.login("Bot", "hunter2")?);
    assert_eq!(session.username().as_deref(), Some("Bot"));
    assert_eq!(session.token(), "tok1+\\");
    transport.clear_requests();
    Ok(session)
}

fn login_count(transport: &ScriptedTransport) -> usize {
    transport
        .actions()
        .iter()
        .filter(|action| *action == "login")
        .count()
}

#[test]
fn login_flow_posts_credentials_with_login_token() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_login("Bot", "tok1+\\");
    let session = session_with(&transport);
    assert!(session.login("Bot", "hunter2")?);

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].param("type").as_deref(), Some("login"));
    let login = &requests[1];
    assert_eq!(login.method, Method::Post);
    assert_eq!(login.url.query(), Some("action=login"));
    assert_eq!(login.body.field("lgname"), Some("Bot"));
    assert_eq!(login.body.field("lgpassword"), Some("hunter2"));
    assert_eq!(login.body.field("lgtoken"), Some("lt+\\"));
    assert_eq!(requests[3].param("type").as_deref(), Some("csrf"));

    // Already logged in as Bot: no further traffic.
    assert!(session.login("Bot", "hunter2")?);
    assert_eq!(transport.requests().len(), 4);
    Ok(())
}

#[test]
fn rejected_login_returns_false() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"query": {"tokens": {"logintoken": "lt"}}}));
    transport.push_json(json!({"login": {"result": "Failed", "reason": "Incorrect password"}}));
    let session = session_with(&transport);

    assert!(!session.login("Bot", "wrong")?);
    assert!(!session.is_logged_in());
    assert_eq!(session.username(), None);
    Ok(())
}

#[test]
fn badtoken_triggers_exactly_one_login_and_one_retry() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    let session = logged_in(&transport)?;

    transport.push_json(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}}));
    transport.push_login("Bot", "tok2+\\");
    transport.push_json(json!({"purge": [{"title": "Main Page", "purged": ""}]}));

    let reply = ActionExecutor::new(&session).execute(
        "purge",
        Method::Post,
        &[("titles", "Main Page")],
        true,
    );

    assert!(reply.is_success());
    assert_eq!(login_count(&transport), 1);
    let purges: Vec<_> = transport
        .requests()
        .into_iter()
        .filter(|request| request.param("action").as_deref() == Some("purge"))
        .collect();
    assert_eq!(purges.len(), 2);
    assert_eq!(purges[0].body.field("token"), Some("tok1+\\"));
    assert_eq!(purges[1].body.field("token"), Some("tok2+\\"));
    assert_eq!(session.token(), "tok2+\\");
    assert_eq!(transport.remaining(), 0);
    Ok(())
}

struct WikiState {
    valid_token: String,
    logins: usize,
}

/// Answers by request content, so concurrent callers cannot steal each other's replies.
struct TokenCheckingWiki {
    state: Mutex<WikiState>,
}

impl TokenCheckingWiki {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WikiState {
                valid_token: String::new(),
                logins: 0,
            }),
        })
    }

    fn expire_token(&self) {
        self.state.lock().expect("lock").valid_token = "expired".to_string();
    }

    fn logins(&self) -> usize {
        self.state.lock().expect("lock").logins
    }
}

impl Transport for TokenCheckingWiki {
    fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let mut state = self.state.lock().expect("lock");
        let body = match request.param("action").as_deref() {
            Some("login") => {
                state.logins += 1;
                state.valid_token = format!("tok{}+\\", state.logins);
                json!({"login": {"result": "Success", "lgusername": "Bot"}})
            }
            Some("purge") => {
                if request.param("token").as_deref() == Some(state.valid_token.as_str()) {
                    json!({"purge": []})
                } else {
                    json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}})
                }
            }
            Some("query") => match request.param("type").as_deref() {
                Some("login") => json!({"query": {"tokens": {"logintoken": "lt+\\"}}}),
                Some("csrf") => json!({"query": {"tokens": {"csrftoken": state.valid_token}}}),
                _ => json!({"query": {"userinfo": {"id": 7, "name": "Bot"}}}),
            },
            _ => json!({"error": {"code": "badvalue", "info": "Unrecognized action."}}),
        };
        Ok(ApiResponse {
            status: 200,
            body: body.to_string(),
            set_cookies: Vec::new(),
        })
    }
}

#[test]
fn concurrent_badtoken_callers_share_one_login() -> TestResult<()> {
    let wiki = TokenCheckingWiki::new();
    let session = Session::with_transport(fast_config(), wiki.clone());
    assert!(session.login("Bot", "hunter2")?);
    assert_eq!(session.token(), "tok1+\\");
    wiki.expire_token();

    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ActionExecutor::new(&session)
                    .execute("purge", Method::Post, &[("titles", "Main Page")], true)
                    .is_success()
            })
        })
        .collect();
    for worker in workers {
        assert!(worker.join().expect("worker"));
    }

    assert_eq!(wiki.logins(), 2);
    assert_eq!(session.token(), "tok2+\\");
    Ok(())
}

#[test]
fn derived_session_carries_only_central_auth_cookies() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"query": {"tokens": {"logintoken": "lt+\\"}}}));
    transport.push_json_with_cookies(
        json!({"login": {"result": "Success", "lgusername": "Bot"}}),
        &[
            "centralauth_User=Bot; path=/; domain=.example.org",
            "centralauth_Token=abc; path=/; HttpOnly",
            "enwikiSession=xyz; path=/; HttpOnly",
        ],
    );
    transport.push_json(json!({"query": {"userinfo": {"id": 7, "name": "Bot"}}}));
    transport.push_json(json!({"query": {"tokens": {"csrftoken": "tok1+\\"}}}));
    let parent = session_with(&transport);
    assert!(parent.login("Bot", "hunter2")?);
    assert_eq!(parent.cookie("enwikiSession").as_deref(), Some("xyz"));
    transport.clear_requests();

    transport.push_json(json!({"query": {"userinfo": {"id": 7, "name": "Bot"}}}));
    transport.push_json(json!({"query": {"tokens": {"csrftoken": "c2+\\"}}}));
    let derived = parent.derive_for_host("commons.example.org")?;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let first = &requests[0];
    assert_eq!(first.url.host_str(), Some("commons.example.org"));
    assert_eq!(first.url.path(), "/w/api.php");
    assert_eq!(first.param("meta").as_deref(), Some("userinfo"));
    assert_eq!(
        first.cookie.as_deref(),
        Some("centralauth_Token=abc; centralauth_User=Bot")
    );
    assert_eq!(requests[1].param("type").as_deref(), Some("csrf"));
    assert_eq!(derived.host(), "commons.example.org");
    assert_eq!(derived.username().as_deref(), Some("Bot"));
    assert_eq!(derived.token(), "c2+\\");
    assert_eq!(derived.cookie("enwikiSession"), None);
    assert_eq!(parent.token(), "tok1+\\");

    transport.push_json_with_cookies(
        json!({"purge": [{"title": "File:Logo.png", "purged": ""}]}),
        &["commonswikiSession=new; path=/"],
    );
    let reply = ActionExecutor::new(&derived).execute(
        "purge",
        Method::Post,
        &[("titles", "File:Logo.png")],
        true,
    );
    assert!(reply.is_success());
    let purge = transport.requests().pop().expect("purge request");
    assert_eq!(purge.url.host_str(), Some("commons.example.org"));
    assert_eq!(purge.body.field("token"), Some("c2+\\"));
    assert_eq!(derived.cookie("commonswikiSession").as_deref(), Some("new"));
    assert_eq!(parent.cookie("commonswikiSession"), None);

    transport.clear_requests();
    transport.push_json(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}}));
    let reply = ActionExecutor::new(&derived).execute("purge", Method::Post, &[], true);
    assert_eq!(reply.error_code(), Some("badtoken"));
    assert_eq!(login_count(&transport), 0);
    assert_eq!(transport.requests().len(), 1);
    Ok(())
}

#[test]
fn second_badtoken_surfaces_as_is() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    let session = logged_in(&transport)?;

    transport.push_json(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}}));
    transport.push_login("Bot", "tok2+\\");
    transport.push_json(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}}));

    let reply = ActionExecutor::new(&session).execute("purge", Method::Post, &[], true);
    assert_eq!(reply.error_code(), Some("badtoken"));
    assert_eq!(login_count(&transport), 1);
    Ok(())
}

#[test]
fn badtoken_without_credentials_is_not_retried() {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}}));
    let session = session_with(&transport);

    let reply = ActionExecutor::new(&session).execute("purge", Method::Post, &[], true);
    assert_eq!(reply.error_code(), Some("badtoken"));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(transport.requests()[0].body.field("token"), Some("+\\"));
}

#[test]
fn ratelimited_replies_back_off_then_succeed() {
    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.push_json(json!({"error": {"code": "ratelimited", "info": "slow down"}}));
    }
    transport.push_json(json!({"purge": []}));
    let session = session_with(&transport);

    let started = Instant::now();
    let reply = ActionExecutor::new(&session).execute("purge", Method::Post, &[], false);

    assert!(reply.is_success());
    assert_eq!(transport.requests().len(), 4);
    // Windows of 2, 4, and 8 one-millisecond units.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn transport_fault_is_null_reply() {
    let transport = ScriptedTransport::new();
    transport.push_fault();
    let session = session_with(&transport);

    let reply = ActionExecutor::new(&session).execute("purge", Method::Get, &[], false);
    assert!(reply.is_null());
    assert!(reply.is_error());
}

#[test]
fn get_action_sends_fields_in_query_string() {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"parse": {"title": "Main Page"}}));
    let session = session_with(&transport);

    let reply = ActionExecutor::new(&session).execute(
        "parse",
        Method::Get,
        &[("page", "Main Page")],
        false,
    );
    assert!(reply.is_success());
    let request = &transport.requests()[0];
    assert_eq!(request.body, RequestBody::Empty);
    assert_eq!(request.param("page").as_deref(), Some("Main Page"));
    assert_eq!(request.param("token"), None);
}

#[test]
fn edit_retries_unknown_replies_until_success() {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"warnings": {"main": {"*": "odd"}}}));
    transport.push_json(json!({"edit": {"result": "Success", "newrevid": 42}}));
    let session = session_with(&transport);

    let reply = ops::edit(&session, "Sandbox", "hello", "test");
    assert!(reply.is_success());
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body.field("title"), Some("Sandbox"));
    assert_eq!(requests[0].body.field("text"), Some("hello"));
    assert_eq!(requests[0].body.field("summary"), Some("test"));
    assert_eq!(requests[0].body.field("token"), Some("+\\"));
}

#[test]
fn edit_stops_on_protection() {
    for code in ["protectedpage", "cascadeprotected"] {
        let transport = ScriptedTransport::new();
        transport.push_json(json!({"error": {"code": code, "info": "protected"}}));
        let session = session_with(&transport);

        let reply = ActionExecutor::new(&session).edit(&EditRequest::new("Main Page", "x", ""));
        assert_eq!(reply.error_code(), Some(code));
        assert_eq!(transport.requests().len(), 1);
    }
}

#[test]
fn edit_gives_up_after_five_attempts_with_last_reply() {
    let transport = ScriptedTransport::new();
    for n in 1..=6 {
        transport.push_json(json!({"error": {"code": "editconflict", "info": format!("try {n}")}}));
    }
    let session = session_with(&transport);

    let reply = ops::edit(&session, "Sandbox", "x", "");
    assert_eq!(reply.error_code(), Some("editconflict"));
    assert_eq!(reply.error_info(), Some("try 5"));
    assert_eq!(transport.requests().len(), 5);
    assert_eq!(transport.remaining(), 1);
}

#[test]
fn edit_time_limit_cuts_retries_short() {
    let transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.push_json(json!({"warnings": {}}));
    }
    let config = fast_config().with_edit_policy(EditPolicy::default().with_max_elapsed(Duration::ZERO));
    let session = session_with_config(&transport, config);

    let reply = ops::edit(&session, "Sandbox", "x", "");
    assert!(reply.is_unknown());
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn bot_edits_carry_bot_flag() {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"edit": {"result": "Success"}}));
    let session = session_with(&transport);

    let reply = ActionExecutor::new(&session).edit(&EditRequest::new("Sandbox", "x", "").bot(true));
    assert!(reply.is_success());
    assert_eq!(transport.requests()[0].body.field("bot"), Some(""));
}
