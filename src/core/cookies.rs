// Per-host cookie storage: name -> value, replayed as a single `Cookie` header.
use std::collections::{BTreeMap, HashMap};

/// Cookie names carried over when deriving a session for a sibling host.
pub const CENTRAL_AUTH_MARKER: &str = "centralauth";

#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    hosts: HashMap<String, BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the `name=value` pair that leads a `Set-Cookie` header; attributes are ignored.
    /// An empty value removes the cookie.
    pub fn store_set_cookie(&mut self, host: &str, header: &str) {
        let Some(pair) = header.split(';').next() else {
            return;
        };
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().trim_matches('"');
        let cookies = self.hosts.entry(host.to_ascii_lowercase()).or_default();
        if value.is_empty() {
            cookies.remove(name);
        } else {
            cookies.insert(name.to_string(), value.to_string());
        }
    }

    pub fn get(&self, host: &str, name: &str) -> Option<&str> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .and_then(|cookies| cookies.get(name))
            .map(String::as_str)
    }

    pub fn header_for(&self, host: &str) -> Option<String> {
        let cookies = self.hosts.get(&host.to_ascii_lowercase())?;
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// New jar holding the cookies of `from` whose name mentions `centralauth`, filed under `to`.
    pub fn central_auth_for(&self, from: &str, to: &str) -> CookieJar {
        let mut derived = CookieJar::new();
        let Some(source) = self.hosts.get(&from.to_ascii_lowercase()) else {
            return derived;
        };
        let carried: BTreeMap<String, String> = source
            .iter()
            .filter(|(name, _)| name.contains(CENTRAL_AUTH_MARKER))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !carried.is_empty() {
            derived.hosts.insert(to.to_ascii_lowercase(), carried);
        }
        derived
    }
}
