// src/command.rs
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::session::SourceUrl;
use crate::state::{Action, ChatState, DropPayload};
use crate::upload::FileUpload;

pub const HELP: &str = "/tool N  select tool N from the last suggestion | /cancel  leave upload mode | \
/file PATH  attach a file | /run  run analysis | /clear  drop attachment | \
/source add URL [DESCRIPTION]  trust a source | /source rm N|ID  remove a source | /quit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0}. Type /help.")]
    Unknown(String),
    #[error("Missing argument for /{0}.")]
    MissingArgument(&'static str),
    #[error("Not a number: {0}")]
    NotANumber(String),
    #[error("No tool #{0} in the last suggestion.")]
    NoSuchTool(usize),
    #[error("No trusted source matches '{0}'.")]
    NoSuchSource(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    SelectTool(usize),
    CancelTool,
    AttachFile(PathBuf),
    Run,
    ClearAttachment,
    AddSource { url: String, description: Option<String> },
    RemoveSource(String),
    Help,
    Quit,
}

/// Parses one input line. Anything not starting with `/` is a query.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Command::Submit(line.to_string()));
    };
    let (name, args) = split_word(rest);
    match name {
        "tool" => {
            let arg = required(args, "tool")?;
            let n = arg.parse::<usize>().map_err(|_| CommandError::NotANumber(arg.to_string()))?;
            Ok(Command::SelectTool(n))
        }
        "cancel" => Ok(Command::CancelTool),
        "file" => Ok(Command::AttachFile(clean_path(required(args, "file")?))),
        "run" => Ok(Command::Run),
        "clear" => Ok(Command::ClearAttachment),
        "source" => {
            let (sub, sub_args) = split_word(args);
            match sub {
                "add" => {
                    let (url, description) = split_word(required(sub_args, "source add")?);
                    let description = Some(description.to_string()).filter(|d| !d.is_empty());
                    Ok(Command::AddSource { url: url.to_string(), description })
                }
                "rm" | "remove" => Ok(Command::RemoveSource(required(sub_args, "source rm")?.to_string())),
                "" => Err(CommandError::MissingArgument("source")),
                other => Err(CommandError::Unknown(format!("source {other}"))),
            }
        }
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Turns a parsed command into reducer actions against the current state.
pub fn resolve(command: Command, state: &ChatState) -> Result<Vec<Action>, CommandError> {
    let actions = match command {
        Command::Submit(text) => vec![Action::SubmitText(text)],
        Command::SelectTool(n) => {
            let tool = n
                .checked_sub(1)
                .and_then(|i| state.latest_tools().and_then(|tools| tools.get(i)))
                .ok_or(CommandError::NoSuchTool(n))?;
            vec![Action::SelectTool(tool.clone())]
        }
        Command::CancelTool => vec![Action::ClearTool],
        Command::AttachFile(path) => vec![read_file(&path, Action::UploadFile)],
        Command::Run => vec![Action::RunAnalysis],
        Command::ClearAttachment => vec![Action::ClearPreview],
        Command::AddSource { url, description } => vec![Action::AddSource { url, description }],
        Command::RemoveSource(key) => {
            let source = match key.parse::<usize>() {
                Ok(n) if key.len() < MIN_ID_PREFIX => n.checked_sub(1).and_then(|i| state.sources.get(i)),
                _ => source_by_id_prefix(state, &key),
            };
            let source = source.ok_or(CommandError::NoSuchSource(key))?;
            vec![Action::RemoveSource(source.id)]
        }
        Command::Help | Command::Quit => Vec::new(),
    };
    Ok(actions)
}

/// Interprets bracketed-paste text while in upload mode. Terminals deliver an
/// OS file drop as a pasted path; the in-app sample gallery pastes JSON.
/// Returns `None` when the paste should go to the input line instead.
pub fn paste_to_action(text: &str, state: &ChatState) -> Option<Action> {
    state.selected_tool.as_ref()?;
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Some(Action::Drop(DropPayload::Structured(trimmed.to_string())));
    }
    let path = clean_path(trimmed);
    if !path.is_file() {
        return None;
    }
    Some(read_file(&path, |file| Action::Drop(DropPayload::File(file))))
}

/// A key shorter than this is a list index; longer keys must prefix exactly one id.
const MIN_ID_PREFIX: usize = 8;

fn source_by_id_prefix<'a>(state: &'a ChatState, key: &str) -> Option<&'a SourceUrl> {
    if key.len() < MIN_ID_PREFIX {
        return None;
    }
    let mut matches = state.sources.iter().filter(|s| s.id.to_string().starts_with(key));
    match (matches.next(), matches.next()) {
        (Some(source), None) => Some(source),
        _ => None,
    }
}

fn read_file(path: &Path, wrap: impl FnOnce(FileUpload) -> Action) -> Action {
    match FileUpload::from_path(path) {
        Ok(file) => wrap(file),
        Err(e) => Action::UploadFailed(e.to_string()),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s, ""),
    }
}

fn required<'a>(args: &'a str, name: &'static str) -> Result<&'a str, CommandError> {
    Some(args.trim()).filter(|a| !a.is_empty()).ok_or(CommandError::MissingArgument(name))
}

fn clean_path(raw: &str) -> PathBuf {
    let unquoted = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    PathBuf::from(unquoted.strip_prefix("file://").unwrap_or(unquoted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatResponse;
    use crate::session::RequestId;
    use crate::state::Effect;
    use uuid::Uuid;

    use pretty_assertions::assert_eq;

    fn state_with_suggestion() -> ChatState {
        let mut state = ChatState::default();
        let effects = state.apply(Action::SubmitText("brain tumor".into()));
        let request_id = match &effects[0] {
            Effect::SendChat { request_id, .. } => *request_id,
            Effect::Cancel(_) => RequestId(0),
        };
        state.apply(Action::ChatSucceeded {
            request_id,
            response: ChatResponse {
                response: "You can use this suggested tool:".into(),
                suggested_tool: Some("brain_tumor".into()),
                trigger_agent: false,
                conversation_id: "c".into(),
                sources: None,
            },
        });
        state
    }

    #[test]
    fn plain_text_is_a_query() {
        assert_eq!(parse("  hello there ").unwrap(), Command::Submit("  hello there ".into()));
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse("/tool 2").unwrap(), Command::SelectTool(2));
        assert_eq!(parse("/file '/tmp/scan 1.png'").unwrap(), Command::AttachFile(PathBuf::from("/tmp/scan 1.png")));
        assert_eq!(
            parse("/source add https://vidal.fr French drug database").unwrap(),
            Command::AddSource { url: "https://vidal.fr".into(), description: Some("French drug database".into()) }
        );
        assert_eq!(
            parse("/source add https://vidal.fr").unwrap(),
            Command::AddSource { url: "https://vidal.fr".into(), description: None }
        );
        assert_eq!(parse("/source rm 1").unwrap(), Command::RemoveSource("1".into()));
        assert_eq!(parse("/run").unwrap(), Command::Run);
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(parse("/tool").unwrap_err(), CommandError::MissingArgument("tool"));
        assert_eq!(parse("/tool x").unwrap_err(), CommandError::NotANumber("x".into()));
        assert_eq!(parse("/frobnicate").unwrap_err(), CommandError::Unknown("frobnicate".into()));
        assert_eq!(parse("/source").unwrap_err(), CommandError::MissingArgument("source"));
    }

    #[test]
    fn selects_tool_from_last_suggestion() {
        let state = state_with_suggestion();
        let actions = resolve(Command::SelectTool(1), &state).unwrap();
        assert!(matches!(&actions[0], Action::SelectTool(t) if t.key == "brain_tumor"));
        assert_eq!(resolve(Command::SelectTool(2), &state).unwrap_err(), CommandError::NoSuchTool(2));
        assert_eq!(resolve(Command::SelectTool(0), &state).unwrap_err(), CommandError::NoSuchTool(0));
    }

    #[test]
    fn removes_source_by_index_or_id_prefix() {
        let mut state = ChatState::default();
        state.apply(Action::AddSource { url: "https://a.org".into(), description: None });
        state.apply(Action::AddSource { url: "https://b.org".into(), description: None });
        let second = state.sources[1].id;

        assert_eq!(resolve(Command::RemoveSource("2".into()), &state).unwrap(), vec![Action::RemoveSource(second)]);
        let prefix = second.to_string()[..8].to_string();
        assert_eq!(resolve(Command::RemoveSource(prefix), &state).unwrap(), vec![Action::RemoveSource(second)]);
        assert!(resolve(Command::RemoveSource("zzz".into()), &state).is_err());
    }

    #[test]
    fn out_of_range_index_never_matches_an_id() {
        let mut state = ChatState::default();
        state.apply(Action::AddSource { url: "https://a.org".into(), description: None });
        state.apply(Action::AddSource { url: "https://b.org".into(), description: None });
        state.sources[0].id = Uuid::parse_str("11111111-1111-4111-8111-111111111111").unwrap();
        state.sources[1].id = Uuid::parse_str("30000000-0000-4000-8000-000000000000").unwrap();

        assert_eq!(
            resolve(Command::RemoveSource("3".into()), &state).unwrap_err(),
            CommandError::NoSuchSource("3".into())
        );
        assert_eq!(
            resolve(Command::RemoveSource("30000000".into()), &state).unwrap(),
            vec![Action::RemoveSource(state.sources[1].id)]
        );
    }

    #[test]
    fn unreadable_file_becomes_inline_error() {
        let actions = resolve(Command::AttachFile(PathBuf::from("/no/such/scan.png")), &ChatState::default()).unwrap();
        assert!(matches!(&actions[0], Action::UploadFailed(msg) if msg.starts_with("Could not read")));
    }

    #[test]
    fn paste_is_ignored_outside_upload_mode() {
        assert_eq!(paste_to_action("{\"id\":1}", &ChatState::default()), None);
    }

    #[test]
    fn pasted_path_and_json_become_drops() {
        let mut state = state_with_suggestion();
        let tool = state.latest_tools().unwrap()[0].clone();
        state.apply(Action::SelectTool(tool));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mri.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let pasted = format!("'{}'\n", path.display());
        assert!(matches!(
            paste_to_action(&pasted, &state),
            Some(Action::Drop(DropPayload::File(f))) if f.mime == "image/png"
        ));

        assert!(matches!(
            paste_to_action(" {\"id\":\"s\"} ", &state),
            Some(Action::Drop(DropPayload::Structured(raw))) if raw == "{\"id\":\"s\"}"
        ));
        assert_eq!(paste_to_action("just some words", &state), None);
    }
}
