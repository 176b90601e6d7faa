//! Purpose: The network seam: one request in, status + body + cookies out.
//! Exports: `Transport`, `HttpTransport`, `ApiRequest`, `ApiResponse`, `Method`, `RequestBody`, `FilePart`.
//! Role: Sessions talk only to `dyn Transport`; tests swap in scripted transports.
//! Invariants: Non-2xx statuses are returned as responses; only transport faults are `Err`.
//! Invariants: Cookies are not stored here; the session passes them in and reads them back.
#![allow(clippy::result_large_err)]

use super::ApiResult;
use super::config::SessionConfig;
use crate::core::error::{Error, ErrorKind};
use std::fmt;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        file: FilePart,
    },
}

impl RequestBody {
    pub fn field(&self, key: &str) -> Option<&str> {
        let fields = match self {
            RequestBody::Empty => return None,
            RequestBody::Form(fields) => fields,
            RequestBody::Multipart { fields, .. } => fields,
        };
        fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: RequestBody,
    pub cookie: Option<String>,
}

impl ApiRequest {
    /// Looks `key` up in the query string first, then the body fields.
    pub fn param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
            .or_else(|| self.body.field(key).map(str::to_string))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub set_cookies: Vec<String>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse>;
}

/// Blocking HTTP transport over a pooled `ureq::Agent`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_read(config.read_timeout())
            .user_agent(config.user_agent())
            .build();
        Self { agent }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let mut call = self
            .agent
            .request(request.method.as_str(), request.url.as_str())
            .set("Accept", "application/json");
        if let Some(cookie) = &request.cookie {
            call = call.set("Cookie", cookie);
        }

        let response = match &request.body {
            RequestBody::Empty => call.call(),
            RequestBody::Form(fields) => {
                let pairs: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                call.send_form(&pairs)
            }
            RequestBody::Multipart { fields, file } => {
                let boundary = multipart_boundary()?;
                let payload = encode_multipart(&boundary, fields, file);
                call.set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={boundary}"),
                )
                .send_bytes(&payload)
            }
        };

        match response {
            Ok(resp) => read_response(resp),
            Err(ureq::Error::Status(_, resp)) => read_response(resp),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

fn read_response(response: ureq::Response) -> ApiResult<ApiResponse> {
    let status = response.status();
    let set_cookies = response
        .all("set-cookie")
        .into_iter()
        .map(str::to_string)
        .collect();
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    Ok(ApiResponse {
        status,
        body,
        set_cookies,
    })
}

fn multipart_boundary() -> ApiResult<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to generate multipart boundary: {err}"))
    })?;
    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(format!("----mwclient{hex}"))
}

/// `multipart/form-data` body: text fields first, then the file part.
pub fn encode_multipart(boundary: &str, fields: &[(String, String)], file: &FilePart) -> Vec<u8> {
    let mut out = Vec::with_capacity(file.data.len() + 256 * (fields.len() + 1));
    for (name, value) in fields {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        out.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", quote(name)).as_bytes(),
        );
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    out.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            quote(&file.field),
            quote(&file.filename)
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
    out.extend_from_slice(&file.data);
    out.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    out
}

fn quote(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::{ApiRequest, FilePart, Method, RequestBody, encode_multipart, multipart_boundary};
    use url::Url;

    fn chunk_part(data: &[u8]) -> FilePart {
        FilePart {
            field: "chunk".to_string(),
            filename: "Cat \"1\".png".to_string(),
            content_type: "application/octet-stream".to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn multipart_layout() {
        let fields = vec![
            ("filename".to_string(), "Cat.png".to_string()),
            ("offset".to_string(), "0".to_string()),
        ];
        let body = encode_multipart("XYZ", &fields, &chunk_part(&[0, 159, 146, 150]));

        let head = b"--XYZ\r\nContent-Disposition: form-data; name=\"filename\"\r\n\r\nCat.png\r\n";
        assert!(body.starts_with(head));
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"chunk\"; filename=\"Cat \\\"1\\\".png\"\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n\r\n"));
        assert!(body.ends_with(b"\r\n--XYZ--\r\n"));
        assert!(body.windows(4).any(|window| window == [0, 159, 146, 150]));
    }

    #[test]
    fn boundaries_differ() {
        let first = multipart_boundary().expect("boundary");
        let second = multipart_boundary().expect("boundary");
        assert_ne!(first, second);
        assert!(first.starts_with("----mwclient"));
    }

    #[test]
    fn param_checks_query_then_body() {
        let request = ApiRequest {
            method: Method::Post,
            url: Url::parse("https://example.org/w/api.php?action=edit").expect("url"),
            body: RequestBody::Form(vec![("title".to_string(), "Sandbox".to_string())]),
            cookie: None,
        };
        assert_eq!(request.param("action").as_deref(), Some("edit"));
        assert_eq!(request.param("title").as_deref(), Some("Sandbox"));
        assert_eq!(request.param("token"), None);
    }
}
