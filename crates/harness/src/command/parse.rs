use thiserror::Error;

use super::call::CallArg;
use super::ControllerHandle;

/// A call decoded from its wire string. The target is kept as the raw
/// dotted path: the wire form does not distinguish a controller instance
/// from a builtin namespace, so that classification is the interpreter's.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub target: String,
    pub method: String,
    pub args: Vec<CallArg>,
    pub kwargs: Vec<(String, CallArg)>,
}

impl ParsedCall {
    pub fn targets_instance(&self, handle: &ControllerHandle) -> bool {
        self.target == handle.instance()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallParseError {
    #[error("missing '(' in call: {line}")]
    MissingOpenParen { line: String },
    #[error("missing trailing ')' in call: {line}")]
    MissingCloseParen { line: String },
    #[error("call target cannot be empty: {line}")]
    EmptyTarget { line: String },
    #[error("call method cannot be empty: {line}")]
    EmptyMethod { line: String },
    #[error("unterminated quoted string in arguments")]
    UnterminatedString,
    #[error("invalid argument literal '{fragment}' (expected quoted string, number, or bool)")]
    InvalidLiteral { fragment: String },
    #[error("keyword argument name cannot be empty")]
    EmptyKeywordName,
    #[error("positional argument after keyword argument")]
    PositionalAfterKeyword,
    #[error("empty argument in call")]
    EmptyArgument,
    #[error("unexpected input after quoted string: '{fragment}'")]
    TrailingInput { fragment: String },
}

/// Decodes `<target>.<method>(<args>)` back into a structured call.
pub fn parse_wire_call(line: &str) -> Result<ParsedCall, CallParseError> {
    let trimmed = line.trim();
    let open = trimmed
        .find('(')
        .ok_or_else(|| CallParseError::MissingOpenParen {
            line: trimmed.to_string(),
        })?;
    if !trimmed.ends_with(')') {
        return Err(CallParseError::MissingCloseParen {
            line: trimmed.to_string(),
        });
    }

    let head = &trimmed[..open];
    let body = &trimmed[open + 1..trimmed.len() - 1];

    let Some(last_dot) = head.rfind('.') else {
        return Err(CallParseError::EmptyTarget {
            line: trimmed.to_string(),
        });
    };
    let target = head[..last_dot].trim();
    let method = head[last_dot + 1..].trim();
    if target.is_empty() {
        return Err(CallParseError::EmptyTarget {
            line: trimmed.to_string(),
        });
    }
    if method.is_empty() {
        return Err(CallParseError::EmptyMethod {
            line: trimmed.to_string(),
        });
    }

    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for raw in split_top_level_args(body)? {
        match classify_argument(&raw)? {
            Argument::Positional(value) => {
                if !kwargs.is_empty() {
                    return Err(CallParseError::PositionalAfterKeyword);
                }
                args.push(value);
            }
            Argument::Keyword { name, value } => kwargs.push((name, value)),
        }
    }

    Ok(ParsedCall {
        target: target.to_string(),
        method: method.to_string(),
        args,
        kwargs,
    })
}

enum Argument {
    Positional(CallArg),
    Keyword { name: String, value: CallArg },
}

fn split_top_level_args(body: &str) -> Result<Vec<String>, CallParseError> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in body.chars() {
        if in_quotes {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_quotes = true;
                current.push(ch);
            }
            ',' => {
                pieces.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if in_quotes {
        return Err(CallParseError::UnterminatedString);
    }
    if !current.trim().is_empty() || !pieces.is_empty() {
        pieces.push(current);
    }

    let mut cleaned = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let trimmed = piece.trim().to_string();
        if trimmed.is_empty() {
            return Err(CallParseError::EmptyArgument);
        }
        cleaned.push(trimmed);
    }
    Ok(cleaned)
}

fn classify_argument(raw: &str) -> Result<Argument, CallParseError> {
    // A '=' before any quote marks a keyword argument; '=' inside a quoted
    // value must not split.
    if !raw.starts_with('"') {
        if let Some(eq) = raw.find('=') {
            let name = raw[..eq].trim();
            let value = raw[eq + 1..].trim();
            if name.is_empty() {
                return Err(CallParseError::EmptyKeywordName);
            }
            return Ok(Argument::Keyword {
                name: name.to_string(),
                value: parse_literal(value)?,
            });
        }
    }
    Ok(Argument::Positional(parse_literal(raw)?))
}

fn parse_literal(raw: &str) -> Result<CallArg, CallParseError> {
    if raw.starts_with('"') {
        return parse_string_literal(raw);
    }
    match raw {
        "true" => return Ok(CallArg::Bool(true)),
        "false" => return Ok(CallArg::Bool(false)),
        _ => {}
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(CallArg::Int(value));
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Ok(CallArg::Float(value));
    }
    Err(CallParseError::InvalidLiteral {
        fragment: raw.to_string(),
    })
}

fn parse_string_literal(raw: &str) -> Result<CallArg, CallParseError> {
    let mut value = String::new();
    let mut chars = raw.chars();
    let _ = chars.next(); // opening quote
    let mut closed = false;

    while let Some(ch) = chars.next() {
        if closed {
            let mut rest = String::from(ch);
            rest.extend(chars);
            let rest = rest.trim().to_string();
            if rest.is_empty() {
                break;
            }
            return Err(CallParseError::TrailingInput { fragment: rest });
        }
        match ch {
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => return Err(CallParseError::UnterminatedString),
            },
            '"' => closed = true,
            _ => value.push(ch),
        }
    }

    if !closed {
        return Err(CallParseError::UnterminatedString);
    }
    Ok(CallArg::Str(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RemoteCall;

    fn handle() -> ControllerHandle {
        ControllerHandle::new("edprobe_controller").expect("handle")
    }

    #[test]
    fn parses_call_with_mixed_argument_kinds() {
        let parsed =
            parse_wire_call("edprobe_controller.push_result(true, \"msg, with comma\", retries=2)")
                .expect("parse");
        assert_eq!(parsed.target, "edprobe_controller");
        assert_eq!(parsed.method, "push_result");
        assert_eq!(
            parsed.args,
            vec![
                CallArg::Bool(true),
                CallArg::Str("msg, with comma".to_string())
            ]
        );
        assert_eq!(parsed.kwargs, vec![("retries".to_string(), CallArg::Int(2))]);
    }

    #[test]
    fn round_trips_rendered_calls() {
        let call = RemoteCall::builtin("host.ui", "notify")
            .arg("It \"works\"")
            .arg(0.25f64)
            .kwarg("sticky", false);
        let parsed = parse_wire_call(&call.render_wire()).expect("parse");
        assert_eq!(parsed.target, "host.ui");
        assert_eq!(parsed.method, "notify");
        assert_eq!(parsed.args, call.args);
        assert_eq!(parsed.kwargs, call.kwargs);
    }

    #[test]
    fn keeps_dotted_target_path_intact() {
        let parsed = parse_wire_call("host.assets.reimport(\"/game/mesh\")").expect("parse");
        assert_eq!(parsed.target, "host.assets");
        assert_eq!(parsed.method, "reimport");
    }

    #[test]
    fn targets_instance_matches_exactly() {
        let parsed = parse_wire_call("edprobe_controller.begin(0)").expect("parse");
        assert!(parsed.targets_instance(&handle()));
        let other = parse_wire_call("other.begin(0)").expect("parse");
        assert!(!other.targets_instance(&handle()));
    }

    #[test]
    fn rejects_malformed_calls() {
        assert!(matches!(
            parse_wire_call("no_parens_here"),
            Err(CallParseError::MissingOpenParen { .. })
        ));
        assert!(matches!(
            parse_wire_call("ctrl.begin(0"),
            Err(CallParseError::MissingCloseParen { .. })
        ));
        assert!(matches!(
            parse_wire_call("begin(0)"),
            Err(CallParseError::EmptyTarget { .. })
        ));
        assert!(matches!(
            parse_wire_call("ctrl.(0)"),
            Err(CallParseError::EmptyMethod { .. })
        ));
    }

    #[test]
    fn rejects_bad_argument_lists() {
        assert!(matches!(
            parse_wire_call("ctrl.f(\"open"),
            Err(CallParseError::MissingCloseParen { .. })
        ));
        assert!(matches!(
            parse_wire_call("ctrl.f(\"open)"),
            Err(CallParseError::UnterminatedString)
        ));
        assert!(matches!(
            parse_wire_call("ctrl.f(nope)"),
            Err(CallParseError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            parse_wire_call("ctrl.f(1,,2)"),
            Err(CallParseError::EmptyArgument)
        ));
        assert!(matches!(
            parse_wire_call("ctrl.f(a=1, 2)"),
            Err(CallParseError::PositionalAfterKeyword)
        ));
    }

    #[test]
    fn equals_inside_quoted_string_stays_positional() {
        let parsed = parse_wire_call("ctrl.note(\"a=b\")").expect("parse");
        assert_eq!(parsed.args, vec![CallArg::Str("a=b".to_string())]);
        assert!(parsed.kwargs.is_empty());
    }
}
