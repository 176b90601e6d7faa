//! Purpose: Shared per-wiki context: config, transport, cookies, CSRF token, credentials.
//! Exports: `Session`, `ApiCall`, `ApiResult`, `ANONYMOUS_TOKEN`.
//! Role: Owns the single token-aware request primitive every cursor and executor goes through.
//! Invariants: `Session` is `Clone + Send + Sync`; clones share the pool, jar, and token.
//! Invariants: A `badtoken` reply triggers at most one re-login and one resend per call.
//! Invariants: Re-login is single-flight behind `login_lock`; stale observers reuse the fresh token.
//! Invariants: Requests issued by the login flow never re-authenticate.
#![allow(clippy::result_large_err)]

use super::config::SessionConfig;
use super::transport::{ApiRequest, FilePart, HttpTransport, Method, RequestBody, Transport};
use crate::core::cookies::CookieJar;
use crate::core::error::{Error, ErrorKind};
use crate::core::reply::{ActionReply, QueryReply};
use crate::core::template::{ParamTemplate, TOKENS_CSRF, TOKENS_LOGIN, USER_INFO};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

pub type ApiResult<T> = Result<T, Error>;

/// CSRF token the API hands to anonymous users.
pub const ANONYMOUS_TOKEN: &str = "+\\";

/// One request through the shared primitive. `action` and `format=json` are always sent.
#[derive(Clone, Debug)]
pub struct ApiCall {
    action: String,
    method: Method,
    params: Vec<(String, String)>,
    file: Option<FilePart>,
    with_token: bool,
    reauth: bool,
}

impl ApiCall {
    pub fn get(action: impl Into<String>) -> Self {
        Self::new(action.into(), Method::Get)
    }

    pub fn post(action: impl Into<String>) -> Self {
        Self::new(action.into(), Method::Post)
    }

    fn new(action: String, method: Method) -> Self {
        Self {
            action,
            method,
            params: Vec::new(),
            file: None,
            with_token: false,
            reauth: true,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(key.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.set_param(key.into(), value.into());
        }
        self
    }

    /// Attaches a binary part; forces a multipart POST.
    pub fn file(mut self, file: FilePart) -> Self {
        self.method = Method::Post;
        self.file = Some(file);
        self
    }

    /// Sends the session's cached CSRF token as `token`.
    pub fn with_token(mut self, enabled: bool) -> Self {
        self.with_token = enabled;
        self
    }

    pub(crate) fn without_reauth(mut self) -> Self {
        self.reauth = false;
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn sends_token(&self) -> bool {
        self.with_token
    }

    fn set_param(&mut self, key: String, value: String) {
        if let Some(slot) = self.params.iter_mut().find(|(name, _)| *name == key) {
            slot.1 = value;
        } else {
            self.params.push((key, value));
        }
    }
}

#[derive(Clone)]
struct Credentials {
    user: String,
    password: String,
}

struct AuthState {
    token: String,
    username: Option<String>,
    credentials: Option<Credentials>,
}

struct SessionInner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    cookies: Mutex<CookieJar>,
    auth: RwLock<AuthState>,
    login_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_url", &self.inner.config.api_url().as_str())
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(config, transport, CookieJar::new())
    }

    fn from_parts(config: SessionConfig, transport: Arc<dyn Transport>, cookies: CookieJar) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                cookies: Mutex::new(cookies),
                auth: RwLock::new(AuthState {
                    token: ANONYMOUS_TOKEN.to_string(),
                    username: None,
                    credentials: None,
                }),
                login_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &str {
        self.inner.config.host()
    }

    pub fn token(&self) -> String {
        self.read_auth().token.clone()
    }

    /// Cached name of the logged-in user, `None` while anonymous.
    pub fn username(&self) -> Option<String> {
        self.read_auth().username.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read_auth().username.is_some()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .get(self.host(), name)
            .map(str::to_string)
    }

    /// Logs in; returns `Ok(false)` when the server rejects the credentials.
    /// A repeated login for the current user is a no-op.
    pub fn login(&self, user: &str, password: &str) -> ApiResult<bool> {
        {
            let auth = self.read_auth();
            if auth.credentials.is_some() && auth.username.as_deref() == Some(user) {
                return Ok(true);
            }
        }
        let _guard = lock(&self.inner.login_lock);
        tracing::info!("logging in to {} as {user}", self.host());
        self.internal_login(&Credentials {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Live lookup of the name the server associates with this session.
    /// Anonymous sessions get their IP address back.
    pub fn whoami(&self) -> ApiResult<String> {
        let info = self.template_query(&USER_INFO)?.meta_comp("userinfo");
        Ok(user_name(&info).to_string())
    }

    /// Re-reads the user name and CSRF token from the server.
    pub fn refresh_status(&self) -> ApiResult<()> {
        let info = self.template_query(&USER_INFO)?.meta_comp("userinfo");
        let token = self.fetch_token(&TOKENS_CSRF, "csrftoken")?;
        let mut auth = self.write_auth();
        auth.username = if info.get("anon").is_some() {
            None
        } else {
            Some(user_name(&info).to_string())
        };
        auth.token = token.unwrap_or_else(|| ANONYMOUS_TOKEN.to_string());
        Ok(())
    }

    /// Session for a sibling wiki sharing this one's central login.
    pub fn derive_for_host(&self, host: &str) -> ApiResult<Session> {
        if !self.is_logged_in() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("cannot derive a session from an anonymous session")
                .with_hint("Log in before deriving sessions for other hosts."));
        }
        let config = self.inner.config.retarget(host)?;
        let jar = self.cookies().central_auth_for(self.host(), config.host());
        let derived = Session::from_parts(config, Arc::clone(&self.inner.transport), jar);
        derived.refresh_status()?;
        if derived.is_logged_in() {
            tracing::info!("derived session for {host}");
        } else {
            tracing::warn!("derived session for {host} is not logged in");
        }
        Ok(derived)
    }

    /// The shared request primitive: inject the token, send, record cookies, parse JSON, and
    /// recover once from `badtoken` when credentials are known.
    pub fn tokenized_request(&self, call: &ApiCall) -> ApiResult<Value> {
        let observed = self.token();
        let body = self.send_once(call, &observed)?;

        if !call.reauth || error_code(&body) != Some("badtoken") {
            return Ok(body);
        }
        let Some(credentials) = self.read_auth().credentials.clone() else {
            return Ok(body);
        };

        tracing::warn!("token rejected for {}; logging in again", call.action);
        self.reauthenticate(&observed, &credentials)?;
        let fresh = self.token();
        self.send_once(call, &fresh)
    }

    fn reauthenticate(&self, stale: &str, credentials: &Credentials) -> ApiResult<()> {
        let _guard = lock(&self.inner.login_lock);
        if self.token() != stale {
            return Ok(());
        }
        if !self.internal_login(credentials)? {
            tracing::error!("re-login as {} failed", credentials.user);
        }
        Ok(())
    }

    fn internal_login(&self, credentials: &Credentials) -> ApiResult<bool> {
        let login_token = self.fetch_token(&TOKENS_LOGIN, "logintoken")?.ok_or_else(|| {
            Error::new(ErrorKind::Corrupt).with_message("login token missing from reply")
        })?;
        let call = ApiCall::post("login")
            .param("lgname", credentials.user.as_str())
            .param("lgpassword", credentials.password.as_str())
            .param("lgtoken", login_token)
            .without_reauth();
        let reply = ActionReply::wrap("login", self.tokenized_request(&call)?);
        let accepted = reply
            .success()
            .and_then(|login| login.get("result"))
            .and_then(Value::as_str)
            == Some("Success");
        if !accepted {
            tracing::warn!("login as {} rejected by {}", credentials.user, self.host());
            return Ok(false);
        }

        self.write_auth().credentials = Some(credentials.clone());
        self.refresh_status()?;
        tracing::info!("logged in as {}", credentials.user);
        Ok(true)
    }

    fn fetch_token(&self, template: &ParamTemplate, key: &str) -> ApiResult<Option<String>> {
        let reply = self.template_query(template)?;
        Ok(reply
            .meta_comp("tokens")
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn template_query(&self, template: &ParamTemplate) -> ApiResult<QueryReply> {
        let params = template
            .fields()
            .iter()
            .filter_map(|(key, value)| value.map(|value| (*key, value)));
        let call = ApiCall::get("query").params(params).without_reauth();
        Ok(QueryReply::wrap(self.tokenized_request(&call)?))
    }

    fn send_once(&self, call: &ApiCall, token: &str) -> ApiResult<Value> {
        let request = self.build_request(call, token);
        tracing::debug!("{} {}", request.method.as_str(), call.action);
        let response = self.inner.transport.send(&request)?;

        if !response.set_cookies.is_empty() {
            let mut jar = self.cookies();
            for header in &response.set_cookies {
                jar.store_set_cookie(self.host(), header);
            }
        }

        if !response.is_success() {
            return Err(Error::new(ErrorKind::Io)
                .with_message(format!("remote error status {}", response.status)));
        }
        tracing::trace!("reply to {}: {}", call.action, response.body);
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("invalid response json")
                .with_source(err)
        })
    }

    fn build_request(&self, call: &ApiCall, token: &str) -> ApiRequest {
        let mut fields: Vec<(String, String)> = Vec::with_capacity(call.params.len() + 2);
        fields.push(("format".to_string(), "json".to_string()));
        fields.extend(
            call.params
                .iter()
                .filter(|(key, _)| key != "format" && key != "action")
                .cloned(),
        );
        if call.with_token {
            fields.retain(|(key, _)| key != "token");
            fields.push(("token".to_string(), token.to_string()));
        }

        let mut url = self.inner.config.api_url().clone();
        url.query_pairs_mut().append_pair("action", &call.action);

        let body = match (call.method, &call.file) {
            (_, Some(file)) => RequestBody::Multipart {
                fields,
                file: file.clone(),
            },
            (Method::Post, None) => RequestBody::Form(fields),
            (Method::Get, None) => {
                url.query_pairs_mut().extend_pairs(fields.iter());
                RequestBody::Empty
            }
        };

        ApiRequest {
            method: call.method,
            url,
            body,
            cookie: self.cookies().header_for(self.host()),
        }
    }

    fn cookies(&self) -> MutexGuard<'_, CookieJar> {
        lock(&self.inner.cookies)
    }

    fn read_auth(&self) -> std::sync::RwLockReadGuard<'_, AuthState> {
        self.inner.auth.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_auth(&self) -> std::sync::RwLockWriteGuard<'_, AuthState> {
        self.inner.auth.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn user_name(info: &Value) -> &str {
    info.get("name").and_then(Value::as_str).unwrap_or_default()
}

fn error_code(body: &Value) -> Option<&str> {
    body.get("error")?.get("code")?.as_str()
}
