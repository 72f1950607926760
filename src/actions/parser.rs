//! Parsing of `do(...)` / `finish(...)` calls out of raw model text.
//!
//! Model output is never evaluated. Arguments are tokenized by a small
//! lexer that only understands string, number and flat number-list
//! literals; anything else is rejected.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{Action, ActionName, ActionParams, Coordinate, DoAction, Literal};

const ANSWER_OPEN: &str = "<answer>";
const ANSWER_CLOSE: &str = "</answer>";

/// Action parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty response")]
    Empty,
    #[error("Unterminated call: {0}")]
    UnterminatedCall(String),
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unsupported value format: {0}")]
    UnsafeLiteral(String),
    #[error("Missing required parameter: {0}")]
    MissingKey(&'static str),
    #[error("Invalid coordinate for {key}: {value}")]
    InvalidCoordinate { key: String, value: String },
    #[error("Duplicate parameter: {0}")]
    DuplicateKey(String),
    #[error("Malformed call: {0}")]
    Malformed(String),
}

/// Parse action from model response.
///
/// The `<answer>` region is preferred when present. A region that is a JSON
/// object is read as `{"_metadata": "do" | "finish", "action": ..., ...}`. Otherwise the last
/// top-level `do(...)` or `finish(...)` call in the text is used. Text with
/// no call at all becomes `Finish` carrying the text itself.
pub fn parse_action(response: &str) -> Result<Action, ParseError> {
    let region = answer_region(response).unwrap_or(response).trim();
    if region.is_empty() {
        return Err(ParseError::Empty);
    }
    if region.starts_with('{') && region.ends_with('}') {
        return parse_json_action(region);
    }

    match find_last_call(region)? {
        Some(call) => call.parse(region),
        None => Ok(Action::finish(region)),
    }
}

/// Extract the last top-level `do(...)`/`finish(...)` call from `content`.
///
/// Returns the byte offset where the call starts together with the call text.
pub fn extract_action_call(content: &str) -> Option<(usize, &str)> {
    find_last_call(content)
        .ok()
        .flatten()
        .map(|call| (call.start, &content[call.start..call.end]))
}

/// Render an action in the call form the model emits.
pub fn render_action(action: &Action) -> String {
    match action {
        Action::Finish { message } => format!("finish(message={})", quote(message)),
        Action::Do(DoAction { name, params }) => {
            let mut args = vec![format!("action={}", quote(name.as_wire()))];
            for (key, coord) in [
                ("element", &params.element),
                ("start", &params.start),
                ("end", &params.end),
            ] {
                if let Some(c) = coord {
                    args.push(format!("{}={}", key, c));
                }
            }
            for (key, value) in [
                ("app", &params.app),
                ("text", &params.text),
                ("message", &params.message),
                ("duration", &params.duration),
                ("instruction", &params.instruction),
            ] {
                if let Some(v) = value {
                    args.push(format!("{}={}", key, quote(v)));
                }
            }
            for (key, value) in &params.extra {
                args.push(format!("{}={}", key, render_literal(value)));
            }
            format!("do({})", args.join(", "))
        }
    }
}

fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Str(s) => quote(s),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => format!("{:?}", f),
        Literal::List(items) => {
            let inner: Vec<String> = items.iter().map(render_literal).collect();
            format!("[{}]", inner.join(","))
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Interior of the first `<answer>` region, if the text has one.
fn answer_region(text: &str) -> Option<&str> {
    let open = text.find(ANSWER_OPEN)?;
    let rest = &text[open + ANSWER_OPEN.len()..];
    Some(match rest.rfind(ANSWER_CLOSE) {
        Some(close) => &rest[..close],
        None => rest,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Do,
    Finish,
}

impl CallKind {
    fn name(&self) -> &'static str {
        match self {
            CallKind::Do => "do",
            CallKind::Finish => "finish",
        }
    }
}

/// Byte span of a balanced call inside the scanned text.
#[derive(Debug, Clone, Copy)]
struct CallSpan {
    kind: CallKind,
    start: usize,
    /// Offset just past the opening parenthesis.
    args_start: usize,
    /// Offset of the closing parenthesis.
    args_end: usize,
    end: usize,
}

impl CallSpan {
    fn contains(&self, other: &CallSpan) -> bool {
        self.start < other.start && other.end <= self.end
    }

    fn parse(&self, text: &str) -> Result<Action, ParseError> {
        let args = parse_arguments(&text[self.args_start..self.args_end])?;
        match self.kind {
            CallKind::Do => build_do(args),
            CallKind::Finish => build_finish(args),
        }
    }
}

/// Locate the last call that is not nested inside another call.
///
/// `Err` only when call heads exist but none of them is balanced.
fn find_last_call(text: &str) -> Result<Option<CallSpan>, ParseError> {
    let mut spans = Vec::new();
    let mut unterminated = None;

    for kind in [CallKind::Do, CallKind::Finish] {
        for (start, name) in text.match_indices(kind.name()) {
            let boundary = text[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
            if !boundary {
                continue;
            }
            // `do (` is accepted as well as `do(`.
            let after = &text[start + name.len()..];
            let open = after.len()
                - after
                    .trim_start_matches(|c: char| c == ' ' || c == '\t')
                    .len();
            if !after[open..].starts_with('(') {
                continue;
            }
            let args_start = start + name.len() + open + 1;
            match balanced_span(text, kind, start, args_start) {
                Some(span) => spans.push(span),
                None => unterminated = Some(start),
            }
        }
    }

    let top_level: Vec<CallSpan> = spans
        .iter()
        .filter(|s| !spans.iter().any(|outer| outer.contains(s)))
        .copied()
        .collect();

    match top_level.into_iter().max_by_key(|s| s.start) {
        Some(span) => Ok(Some(span)),
        None => match unterminated {
            Some(start) => Err(ParseError::UnterminatedCall(
                text[start..].chars().take(40).collect(),
            )),
            None => Ok(None),
        },
    }
}

fn balanced_span(
    text: &str,
    kind: CallKind,
    start: usize,
    args_start: usize,
) -> Option<CallSpan> {
    let mut lexer = Lexer::new(text, args_start);
    let mut depth = 1usize;

    while let Some(item) = lexer.next_token() {
        let (token, tok_start, tok_end) = item.ok()?;
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(CallSpan {
                        kind,
                        start,
                        args_start,
                        args_end: tok_start,
                        end: tok_end,
                    });
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Eq,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Other(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Str(s) => format!("{:?}", s),
            Token::Int(n) => n.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Eq => "=".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::Other(c) => c.to_string(),
        }
    }
}

type Spanned = (Token, usize, usize);

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn next_token(&mut self) -> Option<Result<Spanned, ParseError>> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let start = self.pos;
        let c = self.peek()?;

        let token = match c {
            '"' | '\'' => match self.string(c) {
                Ok(s) => Token::Str(s),
                Err(e) => return Some(Err(e)),
            },
            '0'..='9' | '-' | '+' | '.' => match self.number() {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            },
            c if c.is_alphabetic() || c == '_' => {
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.bump();
                }
                Token::Ident(self.src[start..self.pos].to_string())
            }
            _ => {
                self.bump();
                match c {
                    '=' => Token::Eq,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    other => Token::Other(other),
                }
            }
        };
        Some(Ok((token, start, self.pos)))
    }

    /// Lex a quoted string. A quote that is not followed by `,`, `)`, `]`
    /// or the end of input is kept as part of the value, which tolerates
    /// models that forget to escape inner quotes.
    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        self.bump();
        let mut value = String::new();
        loop {
            let c = self.bump().ok_or(ParseError::UnterminatedString)?;
            match c {
                '\\' => {
                    let escaped = self.bump().ok_or(ParseError::UnterminatedString)?;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\\' | '"' | '\'' => value.push(escaped),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c if c == quote => {
                    let next = self.src[self.pos..].trim_start().chars().next();
                    match next {
                        None | Some(',') | Some(')') | Some(']') => return Ok(value),
                        Some(_) => value.push(c),
                    }
                }
                c => value.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let unsafe_literal = || ParseError::UnsafeLiteral(text.to_string());

        if seen_dot {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| unsafe_literal())
        } else {
            text.parse::<i64>().map(Token::Int).map_err(|_| unsafe_literal())
        }
    }
}

/// Argument of a call: `key=value` or a bare positional value.
#[derive(Debug)]
enum Argument {
    Keyword(String, Literal),
    Positional(Literal),
}

fn parse_arguments(src: &str) -> Result<Vec<Argument>, ParseError> {
    let mut lexer = Lexer::new(src, 0);
    let mut tokens = Vec::new();
    while let Some(item) = lexer.next_token() {
        tokens.push(item?.0);
    }

    let mut args = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while iter.peek().is_some() {
        let arg = match iter.next() {
            Some(Token::Ident(key)) if iter.peek() == Some(&Token::Eq) => {
                iter.next();
                let value = parse_value(&mut iter)?;
                Argument::Keyword(key, value)
            }
            Some(token) => Argument::Positional(parse_value_from(token, &mut iter)?),
            None => break,
        };
        args.push(arg);

        match iter.next() {
            None | Some(Token::Comma) => {}
            Some(other) => {
                return Err(ParseError::Malformed(format!(
                    "expected ',' but found '{}'",
                    other.describe()
                )))
            }
        }
    }
    Ok(args)
}

fn parse_value<I: Iterator<Item = Token>>(
    iter: &mut std::iter::Peekable<I>,
) -> Result<Literal, ParseError> {
    let token = iter
        .next()
        .ok_or_else(|| ParseError::Malformed("missing value after '='".to_string()))?;
    parse_value_from(token, iter)
}

fn parse_value_from<I: Iterator<Item = Token>>(
    token: Token,
    iter: &mut std::iter::Peekable<I>,
) -> Result<Literal, ParseError> {
    match token {
        Token::Str(s) => Ok(Literal::Str(s)),
        Token::Int(n) => Ok(Literal::Int(n)),
        Token::Float(f) => Ok(Literal::Float(f)),
        Token::LBracket => {
            let mut items = Vec::new();
            loop {
                match iter.next() {
                    Some(Token::RBracket) => break,
                    Some(Token::Int(n)) => items.push(Literal::Int(n)),
                    Some(Token::Float(f)) => items.push(Literal::Float(f)),
                    Some(other) => return Err(ParseError::UnsafeLiteral(other.describe())),
                    None => return Err(ParseError::Malformed("unterminated list".to_string())),
                }
                match iter.next() {
                    Some(Token::Comma) => {}
                    Some(Token::RBracket) => break,
                    Some(other) => return Err(ParseError::UnsafeLiteral(other.describe())),
                    None => return Err(ParseError::Malformed("unterminated list".to_string())),
                }
            }
            Ok(Literal::List(items))
        }
        other => Err(ParseError::UnsafeLiteral(other.describe())),
    }
}

fn keyword_map(
    args: Vec<Argument>,
) -> Result<(BTreeMap<String, Literal>, Vec<Literal>), ParseError> {
    let mut keywords = BTreeMap::new();
    let mut positional = Vec::new();
    for arg in args {
        match arg {
            Argument::Keyword(key, value) => {
                if keywords.contains_key(&key) {
                    return Err(ParseError::DuplicateKey(key));
                }
                keywords.insert(key, value);
            }
            Argument::Positional(value) => positional.push(value),
        }
    }
    Ok((keywords, positional))
}

fn parse_json_action(src: &str) -> Result<Action, ParseError> {
    let object: Map<String, Value> =
        serde_json::from_str(src).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let mut metadata = None;
    let mut args = Vec::with_capacity(object.len());
    for (key, value) in object {
        if key == "_metadata" {
            metadata = value.as_str().map(str::to_string);
            continue;
        }
        args.push(Argument::Keyword(key, json_literal(&value)?));
    }

    match metadata.as_deref() {
        Some("finish") => build_finish(args),
        _ => build_do(args),
    }
}

/// Same literal subset as the call form: strings, numbers, flat number lists.
fn json_literal(value: &Value) -> Result<Literal, ParseError> {
    match value {
        Value::String(s) => Ok(Literal::Str(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(Literal::Int)
            .or_else(|| n.as_f64().map(Literal::Float))
            .ok_or_else(|| ParseError::UnsafeLiteral(n.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(_) => json_literal(item),
                other => Err(ParseError::UnsafeLiteral(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Literal::List),
        other => Err(ParseError::UnsafeLiteral(other.to_string())),
    }
}

fn build_do(args: Vec<Argument>) -> Result<Action, ParseError> {
    let (mut keywords, positional) = keyword_map(args)?;
    if !positional.is_empty() {
        return Err(ParseError::Malformed(
            "do() arguments must be key-value pairs".to_string(),
        ));
    }

    let name = match keywords.remove("action") {
        Some(Literal::Str(name)) => ActionName::from_wire(name.trim()),
        Some(other) => {
            return Err(ParseError::Malformed(format!(
                "action must be a string, got {:?}",
                other
            )))
        }
        None => return Err(ParseError::MissingKey("action")),
    };

    let mut params = ActionParams::default();
    for (key, value) in keywords {
        match key.as_str() {
            "element" => params.element = Some(coordinate(&key, &value)?),
            "start" => params.start = Some(coordinate(&key, &value)?),
            "end" => params.end = Some(coordinate(&key, &value)?),
            "app" => params.app = Some(string_value(&key, value)?),
            "text" => params.text = Some(string_value(&key, value)?),
            "message" => params.message = Some(string_value(&key, value)?),
            "instruction" => params.instruction = Some(string_value(&key, value)?),
            "duration" => {
                params.duration = Some(match value {
                    Literal::Int(n) => format!("{} seconds", n),
                    Literal::Float(f) => format!("{} seconds", f),
                    other => string_value(&key, other)?,
                })
            }
            _ => {
                params.extra.insert(key, value);
            }
        }
    }

    Ok(Action::Do(DoAction { name, params }))
}

fn build_finish(args: Vec<Argument>) -> Result<Action, ParseError> {
    let (mut keywords, mut positional) = keyword_map(args)?;
    let message = match keywords.remove("message") {
        Some(value) => string_value("message", value)?,
        None if positional.len() == 1 => string_value("message", positional.remove(0))?,
        None => return Err(ParseError::MissingKey("message")),
    };
    Ok(Action::Finish { message })
}

fn coordinate(key: &str, value: &Literal) -> Result<Coordinate, ParseError> {
    let invalid = || ParseError::InvalidCoordinate {
        key: key.to_string(),
        value: format!("{:?}", value),
    };
    match value {
        Literal::List(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (Literal::Int(x), Literal::Int(y)) => Coordinate::new(*x, *y).ok_or_else(invalid),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

fn string_value(key: &str, value: Literal) -> Result<String, ParseError> {
    match value {
        Literal::Str(s) => Ok(s),
        Literal::Int(n) => Ok(n.to_string()),
        Literal::Float(f) => Ok(f.to_string()),
        Literal::List(_) => Err(ParseError::Malformed(format!("{} must be a string", key))),
    }
}
