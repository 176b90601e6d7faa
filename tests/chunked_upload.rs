// Chunked upload: chunk boundaries, file-key threading, retries, and unstash.
mod support;

use mwclient::api::{
    ApiRequest, ChunkReader, ChunkedUploadManager, ErrorKind, RequestBody, Session, UploadPolicy,
    UploadRequest, ops,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use support::{ScriptedTransport, fast_config, multipart_field, session_with_config};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn small_chunks(transport: &Arc<ScriptedTransport>, chunk_size: u64) -> Session {
    let config = fast_config().with_upload_policy(UploadPolicy::default().with_chunk_size(chunk_size));
    session_with_config(transport, config)
}

fn source_file(bytes: &[u8]) -> TestResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".png").tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

fn chunk_data(request: &ApiRequest) -> Option<&[u8]> {
    match &request.body {
        RequestBody::Multipart { file, .. } => Some(file.data.as_slice()),
        _ => None,
    }
}

#[test]
fn file_is_sent_in_chunks_then_unstashed() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"upload": {"result": "Continue", "offset": 4, "filekey": "fk.1"}}));
    transport.push_json(json!({"upload": {"result": "Continue", "offset": 8, "filekey": "fk.1"}}));
    transport.push_json(json!({"upload": {"result": "Success", "filekey": "fk.1"}}));
    transport.push_json(json!({"upload": {"result": "Success", "filename": "Logo.png"}}));
    let session = small_chunks(&transport, 4);
    let file = source_file(b"0123456789")?;

    let reply = ops::upload(&session, file.path(), "Logo.png", "== Summary ==", "new logo")?;
    assert!(reply.is_success());

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    let local_name = file
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");

    let offsets: Vec<_> = requests[..3]
        .iter()
        .map(|request| multipart_field(request, "offset"))
        .collect();
    assert_eq!(offsets, vec![Some("0"), Some("4"), Some("8")]);
    let payloads: Vec<_> = requests[..3].iter().filter_map(chunk_data).collect();
    assert_eq!(payloads, vec![&b"0123"[..], &b"4567"[..], &b"89"[..]]);

    for (index, request) in requests[..3].iter().enumerate() {
        assert_eq!(request.param("action").as_deref(), Some("upload"));
        assert_eq!(multipart_field(request, "filename"), Some("Logo.png"));
        assert_eq!(multipart_field(request, "filesize"), Some("10"));
        assert_eq!(multipart_field(request, "stash"), Some("1"));
        assert_eq!(multipart_field(request, "token"), Some("+\\"));
        let expected_key = if index == 0 { None } else { Some("fk.1") };
        assert_eq!(multipart_field(request, "filekey"), expected_key);
        let RequestBody::Multipart { file: part, .. } = &request.body else {
            panic!("chunk must be multipart");
        };
        assert_eq!(part.field, "chunk");
        assert_eq!(part.filename, local_name);
        assert_eq!(part.content_type, "application/octet-stream");
    }

    let unstash = &requests[3];
    assert!(matches!(unstash.body, RequestBody::Form(_)));
    assert_eq!(unstash.body.field("filekey"), Some("fk.1"));
    assert_eq!(unstash.body.field("filename"), Some("Logo.png"));
    assert_eq!(unstash.body.field("text"), Some("== Summary =="));
    assert_eq!(unstash.body.field("comment"), Some("new logo"));
    assert_eq!(unstash.body.field("ignorewarnings"), Some("true"));
    Ok(())
}

#[test]
fn exact_multiple_of_chunk_size_has_no_trailing_chunk() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"upload": {"result": "Continue", "filekey": "k"}}));
    transport.push_json(json!({"upload": {"result": "Success", "filekey": "k"}}));
    transport.push_json(json!({"upload": {"result": "Success"}}));
    let session = small_chunks(&transport, 4);

    let reader = ChunkReader::new(&b"abcdefgh"[..], 8, 4);
    assert_eq!(reader.total_chunks(), 2);
    let reply = ChunkedUploadManager::new(&session).upload_from(
        reader,
        "local.bin",
        &UploadRequest::new("Remote.bin", "", ""),
    )?;
    assert!(reply.is_success());
    assert_eq!(transport.requests().len(), 3);
    Ok(())
}

#[test]
fn failing_chunk_is_retried_then_abandoned() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.push_status(500, "Internal Server Error");
    }
    transport.push_json(json!({"upload": {"result": "Success", "filekey": "never"}}));
    let session = small_chunks(&transport, 4);
    let file = source_file(b"0123456789")?;

    let reply = ops::upload(&session, file.path(), "Logo.png", "", "")?;
    assert!(reply.is_null());
    let requests = transport.requests();
    assert_eq!(requests.len(), 5);
    for request in &requests {
        assert_eq!(multipart_field(request, "offset"), Some("0"));
    }
    assert_eq!(transport.remaining(), 1);
    Ok(())
}

#[test]
fn transient_chunk_failure_resends_same_chunk() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_status(503, "Service Unavailable");
    transport.push_json(json!({"upload": {"result": "Continue", "filekey": "fk"}}));
    transport.push_fault();
    transport.push_json(json!({"upload": {"result": "Success", "filekey": "fk"}}));
    transport.push_json(json!({"upload": {"result": "Success"}}));
    let session = small_chunks(&transport, 5);
    let file = source_file(b"0123456789")?;

    let reply = ops::upload(&session, file.path(), "Logo.png", "", "")?;
    assert!(reply.is_success());
    let offsets: Vec<_> = transport
        .requests()
        .iter()
        .map(|request| multipart_field(request, "offset").map(str::to_string))
        .collect();
    assert_eq!(
        offsets,
        vec![
            Some("0".to_string()),
            Some("0".to_string()),
            Some("5".to_string()),
            Some("5".to_string()),
            None,
        ]
    );
    Ok(())
}

#[test]
fn rate_limited_chunk_backs_off_without_using_attempts() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    for _ in 0..6 {
        transport.push_json(json!({"error": {"code": "ratelimited", "info": "slow down"}}));
    }
    transport.push_json(json!({"upload": {"result": "Success", "filekey": "fk"}}));
    transport.push_json(json!({"upload": {"result": "Success", "filename": "Tiny.png"}}));
    let session = small_chunks(&transport, 64);
    let file = source_file(b"tiny")?;

    let reply = ops::upload(&session, file.path(), "Tiny.png", "", "")?;
    assert!(reply.is_success());
    let requests = transport.requests();
    assert_eq!(requests.len(), 8);
    for request in &requests[..7] {
        assert_eq!(multipart_field(request, "offset"), Some("0"));
    }
    assert_eq!(requests[7].param("filekey").as_deref(), Some("fk"));
    Ok(())
}

#[test]
fn unstash_gives_up_with_last_reply() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"upload": {"result": "Success", "filekey": "fk"}}));
    for n in 1..=3 {
        transport.push_json(json!({"error": {"code": "stashfailed", "info": format!("attempt {n}")}}));
    }
    let session = small_chunks(&transport, 64);
    let file = source_file(b"tiny")?;

    let reply = ops::upload(&session, file.path(), "Tiny.png", "", "")?;
    assert_eq!(reply.error_code(), Some("stashfailed"));
    assert_eq!(reply.error_info(), Some("attempt 3"));
    assert_eq!(transport.requests().len(), 4);
    Ok(())
}

#[test]
fn empty_file_is_rejected_before_any_request() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    let session = small_chunks(&transport, 4);
    let file = source_file(b"")?;

    let err = ops::upload(&session, file.path(), "Empty.png", "", "").expect_err("empty");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(err.path(), Some(file.path()));
    assert!(transport.requests().is_empty());
    Ok(())
}

#[test]
fn missing_file_is_io_error() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    let session = small_chunks(&transport, 4);
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.png");

    let err = ops::upload(&session, &path, "Absent.png", "", "").expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(transport.requests().is_empty());
    Ok(())
}

#[test]
fn upload_by_url_posts_source_url() -> TestResult<()> {
    let transport = ScriptedTransport::new();
    transport.push_json(json!({"upload": {"result": "Success"}}));
    let session = small_chunks(&transport, 4);
    let source = url::Url::parse("https://images.example.org/logo.png")?;

    let reply = ChunkedUploadManager::new(&session)
        .upload_by_url(&source, &UploadRequest::new("Logo.png", "text", "from url"));
    assert!(reply.is_success());
    let request = &transport.requests()[0];
    assert_eq!(request.body.field("url"), Some("https://images.example.org/logo.png"));
    assert_eq!(request.body.field("filename"), Some("Logo.png"));
    assert_eq!(request.body.field("token"), Some("+\\"));
    Ok(())
}
