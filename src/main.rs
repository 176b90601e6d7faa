//! Purpose: `mwclient` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, opens a session, emits JSON on stdout.
//! Invariants: Results are JSON on stdout; errors are JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Passwords are only read from files, never from argv.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use mwclient::api::{
    ActionReply, EditPolicy, Error, ErrorKind, QueryCursor, ReplyBody, Session, SessionConfig,
    bulk, ops, template, to_exit_code,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

#[derive(Parser)]
#[command(
    name = "mwclient",
    version,
    about = "Query and edit MediaWiki sites from the command line",
    after_help = r#"EXAMPLES
  $ mwclient --api https://en.wikipedia.org/w/api.php whoami
  $ mwclient --api https://en.wikipedia.org/w/api.php list categorymembers --set cmtitle=Category:Physics --cap 120
  $ mwclient --api https://en.wikipedia.org/w/api.php prop categories --title "Main Page" --continued
  $ mwclient --api https://test.wikipedia.org/w/api.php --user Bot --password-file ~/.bot edit --title Sandbox --text hi"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true, help = "Full api.php endpoint URL", value_hint = ValueHint::Url)]
    api: Option<String>,
    #[arg(long, global = true, help = "Account to log in as")]
    user: Option<String>,
    #[arg(
        long,
        global = true,
        help = "File holding the account password",
        value_hint = ValueHint::FilePath
    )]
    password_file: Option<PathBuf>,
    #[arg(long, global = true, help = "User-Agent header to send")]
    user_agent: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        help = "Stop retrying an edit after this many seconds"
    )]
    max_elapsed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show the user name the wiki associates with this session")]
    Whoami,
    #[command(about = "Run a list or meta query template to completion")]
    List {
        #[arg(help = "Template name, e.g. allpages, categorymembers, userinfo")]
        template: String,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val, help = "Bind a query parameter")]
        set: Vec<(String, String)>,
        #[arg(long, default_value_t = 0, help = "Total result cap (0 = unbounded)")]
        cap: i64,
        #[arg(long, help = "Per-request limit (default: server maximum)")]
        limit: Option<i64>,
        #[arg(long, help = "Print only this field of each record")]
        field: Option<String>,
    },
    #[command(about = "Fetch a property for many titles")]
    Prop {
        #[arg(help = "Template name, e.g. categories, exists, pagetext")]
        template: String,
        #[arg(long = "title", required = true, help = "Title to query (repeatable)")]
        titles: Vec<String>,
        #[arg(long, help = "Page field to extract (default: the template's result key)")]
        value_key: Option<String>,
        #[arg(long, help = "Follow continuation and collect every record")]
        continued: bool,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val, help = "Bind a query parameter")]
        set: Vec<(String, String)>,
    },
    #[command(about = "Replace the text of a page")]
    Edit {
        #[arg(long)]
        title: String,
        #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
        text: Option<String>,
        #[arg(long, value_hint = ValueHint::FilePath)]
        text_file: Option<PathBuf>,
        #[arg(long, default_value = "")]
        summary: String,
    },
    #[command(about = "Upload a local file in chunks")]
    Upload {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, help = "Destination title, e.g. File:Example.png")]
        title: String,
        #[arg(long, default_value = "", help = "Description page text")]
        text: String,
        #[arg(long, default_value = "")]
        summary: String,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `mwclient --help`."));
            }
        },
    };

    if let Command::Completion { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::aot::generate(shell, &mut cmd, "mwclient", &mut io::stdout());
        return Ok(RunOutcome::ok());
    }

    let session = open_session(&cli)?;
    dispatch(cli.command, &session)
}

fn open_session(cli: &Cli) -> Result<Session, Error> {
    let api = cli.api.as_deref().ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("missing --api")
            .with_hint("Pass the wiki endpoint, e.g. --api https://en.wikipedia.org/w/api.php.")
    })?;
    let mut config = SessionConfig::new(api)?;
    if let Some(user_agent) = &cli.user_agent {
        config = config.with_user_agent(user_agent.clone());
    }
    if let Some(seconds) = cli.max_elapsed {
        config = config.with_edit_policy(
            EditPolicy::default().with_max_elapsed(Duration::from_secs(seconds)),
        );
    }
    let session = Session::new(config);

    match (&cli.user, &cli.password_file) {
        (Some(user), Some(path)) => {
            let password = read_password_file(path)?;
            if !session.login(user, &password)? {
                return Err(Error::new(ErrorKind::Permission)
                    .with_message(format!("login as {user} was rejected"))
                    .with_hint("Check the user name and password file; bot passwords use User@BotName."));
            }
        }
        (Some(_), None) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--user requires --password-file"));
        }
        (None, Some(_)) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--password-file requires --user"));
        }
        (None, None) => {}
    }
    Ok(session)
}

fn dispatch(command: Command, session: &Session) -> Result<RunOutcome, Error> {
    match command {
        Command::Whoami => {
            let name = session.whoami()?;
            emit_json(json!({
                "host": session.host(),
                "user": name,
                "logged_in": session.is_logged_in(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::List {
            template,
            set,
            cap,
            limit,
            field,
        } => {
            let template = lookup_template(&template)?;
            let mut cursor = QueryCursor::new(session, &[*template]).with_cap(cap);
            for (key, value) in &set {
                cursor.set(key, value.as_str());
            }
            if let Some(limit) = limit {
                cursor.adjust_limit(limit);
            }

            let output = match query_kind(template) {
                Some("list") => {
                    let records = cursor.collect_list(template.result_key())?;
                    Value::Array(project(records, field.as_deref()))
                }
                Some("meta") => cursor.advance()?.meta_comp(template.result_key()),
                _ => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("{} is a per-title property query", template.name()))
                        .with_hint(format!("Use `mwclient prop {} --title ...`.", template.name())));
                }
            };
            emit_json(output);
            Ok(RunOutcome::ok())
        }
        Command::Prop {
            template,
            titles,
            value_key,
            continued,
            set,
        } => {
            let template = lookup_template(&template)?;
            let value_key = value_key.unwrap_or_else(|| template.result_key().to_string());
            let extra: Vec<(&str, &str)> = set
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            let output: Map<String, Value> = if continued {
                bulk::continued_props(session, &titles, template, &extra, &value_key)?
                    .into_iter()
                    .map(|(title, records)| (title, records.map(Value::Array).unwrap_or(Value::Null)))
                    .collect()
            } else {
                bulk::single_props(session, &titles, template, &extra, &value_key)?
                    .into_iter()
                    .map(|(title, value)| (title, value.unwrap_or(Value::Null)))
                    .collect()
            };
            emit_json(Value::Object(output));
            Ok(RunOutcome::ok())
        }
        Command::Edit {
            title,
            text,
            text_file,
            summary,
        } => {
            let text = match (text, text_file) {
                (Some(text), _) => text,
                (None, Some(path)) => read_text_file(&path)?,
                (None, None) => String::new(),
            };
            let reply = ops::edit(session, &title, &text, &summary);
            Ok(emit_reply(&reply))
        }
        Command::Upload {
            path,
            title,
            text,
            summary,
        } => {
            let reply = ops::upload(session, &path, &title, &text, &summary)?;
            Ok(emit_reply(&reply))
        }
        Command::Completion { .. } => Ok(RunOutcome::ok()),
    }
}

fn lookup_template(name: &str) -> Result<&'static mwclient::api::ParamTemplate, Error> {
    template::by_name(name).ok_or_else(|| {
        let known: Vec<&str> = template::CATALOG.iter().map(|t| t.name()).collect();
        Error::new(ErrorKind::NotFound)
            .with_message(format!("unknown query template: {name}"))
            .with_hint(format!("Known templates: {}.", known.join(", ")))
    })
}

fn query_kind(template: &mwclient::api::ParamTemplate) -> Option<&'static str> {
    template
        .fields()
        .iter()
        .map(|(key, _)| *key)
        .find(|key| matches!(*key, "list" | "meta" | "prop"))
}

fn project(records: Vec<Value>, field: Option<&str>) -> Vec<Value> {
    match field {
        Some(field) => records
            .into_iter()
            .filter_map(|mut record| record.get_mut(field).map(Value::take))
            .collect(),
        None => records,
    }
}

#[derive(Serialize)]
struct ReplyReport<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<&'a str>,
    reply: &'a Value,
}

fn reply_json(reply: &ActionReply) -> Value {
    let (status, code, info) = match reply.body() {
        _ if reply.is_null() => ("null", None, None),
        ReplyBody::Success(_) => ("success", None, None),
        ReplyBody::Error { code, info } => ("error", Some(code.as_str()), Some(info.as_str())),
        ReplyBody::Unknown(_) => ("unknown", None, None),
    };
    let report = ReplyReport {
        status,
        action: reply.action(),
        code,
        info,
        reply: reply.raw(),
    };
    serde_json::to_value(report).unwrap_or_default()
}

fn emit_reply(reply: &ActionReply) -> RunOutcome {
    emit_json(reply_json(reply));
    if reply.is_success() {
        RunOutcome::ok()
    } else {
        RunOutcome::with_code(1)
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

#[derive(Serialize)]
struct ErrorReport {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
}

fn error_json(err: &Error) -> ErrorReport {
    ErrorReport {
        error: ErrorDetail {
            kind: format!("{:?}", err.kind()),
            message: error_message(err),
            hint: err.hint().map(str::to_string),
            path: err.path().map(|path| path.display().to_string()),
            causes: error_causes(err),
        },
    }
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

fn read_password_file(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to read password file")
            .with_path(path)
            .with_source(err)
    })?;
    let password = raw.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("password file is empty")
            .with_path(path));
    }
    Ok(password)
}

fn read_text_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read text file")
            .with_path(path)
            .with_source(err)
    })
}
