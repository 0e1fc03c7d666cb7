use crate::pbx::errors::ScanError;
use crate::pbx::locator::ConfigBlock;
use crate::pbx::scanner::{find_matching, next_significant, tokenize_range, Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a build setting, compared by content rather than by quoting style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Scalar(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        SettingValue::Scalar(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SettingValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Elements of the value, treating a scalar as a one-element list.
    pub fn elements(&self) -> Vec<&str> {
        match self {
            SettingValue::Scalar(value) => vec![value.as_str()],
            SettingValue::List(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Scalar(value) => write!(f, "{}", quote(value)),
            SettingValue::List(values) => {
                let quoted: Vec<String> = values.iter().map(|value| quote(value)).collect();
                write!(f, "({})", quoted.join(", "))
            }
        }
    }
}

/// One element of a list-valued setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListElement {
    pub value: String,
    pub start: usize,
    pub end: usize,
    /// Offset just past the `,` following this element, if any.
    pub comma_end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLayout {
    /// Offset just past `(`
    pub open: usize,
    /// Offset of `)`
    pub close: usize,
    pub elements: Vec<ListElement>,
}

/// A `key = value;` statement inside a settings table, with absolute offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    /// Unquoted key
    pub key: String,
    pub key_start: usize,
    /// Value span: a single token, or `(` through `)` inclusive.
    pub value_start: usize,
    pub value_end: usize,
    /// Offset just past the terminating `;`
    pub statement_end: usize,
    /// For a `{ ... }` dictionary this holds the raw text, and the entry is never patched.
    pub value: SettingValue,
    pub list: Option<ListLayout>,
    pub dictionary: bool,
}

/// Parse the flat settings table of `block`.
///
/// Offsets are only valid for the text they were parsed from: re-parse after every
/// mutation.
pub fn parse_entries(source: &str, block: &ConfigBlock) -> Result<Vec<SettingEntry>, ScanError> {
    let tokens = tokenize_range(source, block.span())?;
    let mut entries = Vec::new();
    let mut cursor = 0;

    while let Some(key) = next_significant(&tokens, cursor) {
        let key_token = tokens[key];
        if !key_token.is_scalar() {
            return Err(unexpected(source, key_token, "expected a setting name"));
        }

        let eq = expect_kind(source, &tokens, key, TokenKind::Equals, "expected '='")?;
        let value = next_significant(&tokens, eq + 1).ok_or(ScanError::UnexpectedToken {
            found: "end of block".to_string(),
            offset: block.end,
            context: "missing setting value",
        })?;

        let mut dictionary = false;
        let (parsed, list, value_last) = match tokens[value].kind {
            TokenKind::Word | TokenKind::Quoted => (
                SettingValue::Scalar(unquote(tokens[value].text(source))),
                None,
                value,
            ),
            TokenKind::OpenBrace => {
                let close = find_matching(&tokens, value)?;
                dictionary = true;
                let raw = &source[tokens[value].start..tokens[close].end];
                (SettingValue::Scalar(raw.to_string()), None, close)
            }
            TokenKind::OpenParen => {
                let (layout, close) = parse_list(source, &tokens, value)?;
                let values = layout
                    .elements
                    .iter()
                    .map(|element| element.value.clone())
                    .collect();
                (SettingValue::List(values), Some(layout), close)
            }
            _ => return Err(unexpected(source, tokens[value], "unsupported setting value")),
        };

        let semi = expect_kind(source, &tokens, value_last, TokenKind::Semicolon, "expected ';'")?;

        entries.push(SettingEntry {
            key: unquote(key_token.text(source)),
            key_start: key_token.start,
            value_start: tokens[value].start,
            value_end: tokens[value_last].end,
            statement_end: tokens[semi].end,
            value: parsed,
            list,
            dictionary,
        });
        cursor = semi + 1;
    }

    Ok(entries)
}

fn parse_list(
    source: &str,
    tokens: &[Token],
    open: usize,
) -> Result<(ListLayout, usize), ScanError> {
    let mut elements = Vec::new();
    let mut cursor = open + 1;

    loop {
        let Some(next) = next_significant(tokens, cursor) else {
            return Err(ScanError::Unclosed {
                open: '(',
                offset: tokens[open].start,
            });
        };
        let token = tokens[next];
        match token.kind {
            TokenKind::CloseParen => {
                let layout = ListLayout {
                    open: tokens[open].end,
                    close: token.start,
                    elements,
                };
                return Ok((layout, next));
            }
            TokenKind::Word | TokenKind::Quoted => {
                let mut element = ListElement {
                    value: unquote(token.text(source)),
                    start: token.start,
                    end: token.end,
                    comma_end: None,
                };
                cursor = next + 1;
                if let Some(comma) = next_significant(tokens, cursor) {
                    if tokens[comma].kind == TokenKind::Comma {
                        element.comma_end = Some(tokens[comma].end);
                        cursor = comma + 1;
                    }
                }
                elements.push(element);
            }
            _ => return Err(unexpected(source, token, "unsupported list element")),
        }
    }
}

fn expect_kind(
    source: &str,
    tokens: &[Token],
    after: usize,
    kind: TokenKind,
    context: &'static str,
) -> Result<usize, ScanError> {
    match next_significant(tokens, after + 1) {
        Some(index) if tokens[index].kind == kind => Ok(index),
        Some(index) => Err(unexpected(source, tokens[index], context)),
        None => Err(ScanError::UnexpectedToken {
            found: "end of block".to_string(),
            offset: tokens[after].end,
            context,
        }),
    }
}

fn unexpected(source: &str, token: Token, context: &'static str) -> ScanError {
    ScanError::UnexpectedToken {
        found: token.text(source).to_string(),
        offset: token.start,
        context,
    }
}

/// Strip quotes and resolve escapes. Bare words are returned as-is.
pub fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Render a string the way Xcode writes it: bare when it only contains safe characters.
pub fn quote(value: &str) -> String {
    let bare = !value.is_empty()
        && !value.contains("//")
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '$' | '/' | ':' | '.'));
    if bare {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
