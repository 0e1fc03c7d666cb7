//! Finds `XCBuildConfiguration` objects and the bounds of their `buildSettings` table.
//!
//! Anchor shape:
//!
//! ```text
//! E0C520F82DF4C8C7009D84A3 /* Debug */ = {
//!     isa = XCBuildConfiguration;
//!     buildSettings = {
//!         ...
//!     };
//!     name = Debug;
//! };
//! ```

use crate::pbx::errors::ScanError;
use crate::pbx::scanner::{find_matching, next_significant, tokenize, Token, TokenKind};
use crate::pbx::settings::unquote;
use std::fmt;

const CONFIGURATION_ISA: &str = "XCBuildConfiguration";
const SETTINGS_KEY: &str = "buildSettings";

/// Which configuration blocks an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockSelector {
    /// Configuration name (e.g. "Debug"); `None` selects every configuration.
    pub name: Option<String>,
    /// Restrict to one object identifier.
    pub object_id: Option<String>,
}

impl BlockSelector {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            object_id: None,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Parse the plan-file form: `"*"` means every configuration.
    pub fn parse(block: &str, object_id: Option<&str>) -> Self {
        let name = match block.trim() {
            "*" => None,
            other => Some(other.to_string()),
        };
        Self {
            name,
            object_id: object_id.map(str::to_string),
        }
    }

    fn matches(&self, name: &str, object_id: &str) -> bool {
        self.name.as_deref().map_or(true, |wanted| wanted == name)
            && self.object_id.as_deref().map_or(true, |wanted| wanted == object_id)
    }
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.object_id) {
            (Some(name), Some(id)) => write!(f, "{name} ({id})"),
            (Some(name), None) => write!(f, "{name}"),
            (None, Some(id)) => write!(f, "* ({id})"),
            (None, None) => write!(f, "*"),
        }
    }
}

/// The settings table of one build configuration.
///
/// `start` is the offset just past the opening `{`, `end` the offset of the matching `}`.
/// Every edit made on behalf of this block must stay inside `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    pub name: String,
    pub object_id: String,
    pub start: usize,
    pub end: usize,
}

impl ConfigBlock {
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.object_id)
    }
}

/// A configuration object whose anchor matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockMatch {
    Found(ConfigBlock),
    /// The anchor matched but brackets inside the object do not balance.
    Malformed {
        name: String,
        object_id: String,
        error: ScanError,
    },
}

impl BlockMatch {
    pub fn label(&self) -> String {
        match self {
            BlockMatch::Found(block) => block.label(),
            BlockMatch::Malformed {
                name, object_id, ..
            } => format!("{name} ({object_id})"),
        }
    }

    fn position(&self) -> usize {
        match self {
            BlockMatch::Found(block) => block.start,
            BlockMatch::Malformed { error, .. } => error_offset(error),
        }
    }
}

fn error_offset(error: &ScanError) -> usize {
    match error {
        ScanError::UnterminatedString { offset }
        | ScanError::UnterminatedComment { offset }
        | ScanError::Unclosed { offset, .. }
        | ScanError::Mismatched { offset, .. }
        | ScanError::UnexpectedToken { offset, .. } => *offset,
    }
}

/// Locate every configuration block matching `selector`, in document order.
///
/// An empty result means the configuration does not exist in this document; that is
/// reported by callers, not raised. A document that cannot be tokenized at all is an
/// error since no anchor can be trusted.
pub fn locate(source: &str, selector: &BlockSelector) -> Result<Vec<BlockMatch>, ScanError> {
    let tokens = tokenize(source)?;
    let mut found = Vec::new();

    for index in 0..tokens.len() {
        let Some(anchor) = match_anchor(source, &tokens, index) else {
            continue;
        };

        let block = resolve_object(source, &tokens, &anchor);
        let (name, object_id) = match &block {
            BlockMatch::Found(block) => (block.name.as_str(), block.object_id.as_str()),
            BlockMatch::Malformed {
                name, object_id, ..
            } => (name.as_str(), object_id.as_str()),
        };

        if selector.matches(name, object_id) {
            tracing::debug!(block = %block.label(), "located build configuration");
            found.push(block);
        }
    }

    found.sort_by_key(BlockMatch::position);
    Ok(found)
}

struct Anchor {
    object_id: String,
    comment_name: Option<String>,
    /// token index of the object's `{`
    open: usize,
    /// token index of the first property after `isa = XCBuildConfiguration;`
    body: usize,
}

/// `ID /* Name */ = { isa = XCBuildConfiguration;`
fn match_anchor(source: &str, tokens: &[Token], index: usize) -> Option<Anchor> {
    let id = tokens[index];
    if !id.is_scalar() {
        return None;
    }

    let mut cursor = index + 1;
    let mut comment_name = None;
    if let Some(token) = tokens.get(cursor) {
        if token.kind == TokenKind::Comment {
            comment_name = comment_text(token.text(source));
            cursor += 1;
        }
    }

    let expect = |at: usize, kind: TokenKind| tokens.get(at).filter(|token| token.kind == kind);
    expect(cursor, TokenKind::Equals)?;
    let open = cursor + 1;
    expect(open, TokenKind::OpenBrace)?;

    let isa_key = next_significant(tokens, open + 1)?;
    if tokens[isa_key].text(source) != "isa" {
        return None;
    }
    let eq = next_significant(tokens, isa_key + 1)?;
    expect(eq, TokenKind::Equals)?;
    let isa_value = next_significant(tokens, eq + 1)?;
    if unquote(tokens[isa_value].text(source)) != CONFIGURATION_ISA {
        return None;
    }
    let semi = next_significant(tokens, isa_value + 1)?;
    expect(semi, TokenKind::Semicolon)?;

    Some(Anchor {
        object_id: unquote(id.text(source)),
        comment_name,
        open,
        body: semi + 1,
    })
}

fn comment_text(comment: &str) -> Option<String> {
    let inner = comment
        .strip_prefix("/*")
        .and_then(|rest| rest.strip_suffix("*/"))?
        .trim();
    (!inner.is_empty()).then(|| inner.to_string())
}

/// Walk the object's properties to find `buildSettings = {` and `name = ...;`.
fn resolve_object(source: &str, tokens: &[Token], anchor: &Anchor) -> BlockMatch {
    let fallback_name = anchor.comment_name.clone().unwrap_or_default();
    let malformed = |error: ScanError, name: &str| BlockMatch::Malformed {
        name: name.to_string(),
        object_id: anchor.object_id.clone(),
        error,
    };

    let object_close = match find_matching(tokens, anchor.open) {
        Ok(close) => close,
        Err(error) => return malformed(error, &fallback_name),
    };

    let mut settings = None;
    let mut name_property = None;
    let mut cursor = anchor.body;

    while let Some(key) = next_significant(tokens, cursor).filter(|&at| at < object_close) {
        let key_text = unquote(tokens[key].text(source));
        let Some(eq) = next_significant(tokens, key + 1)
            .filter(|&at| tokens[at].kind == TokenKind::Equals)
        else {
            let error = unexpected(source, tokens, key, "expected 'key = value;' in object");
            return malformed(error, &fallback_name);
        };
        let Some(value) = next_significant(tokens, eq + 1).filter(|&at| at < object_close) else {
            let error = unexpected(source, tokens, eq, "missing property value");
            return malformed(error, &fallback_name);
        };

        let value_end = match tokens[value].kind {
            TokenKind::OpenBrace | TokenKind::OpenParen => match find_matching(tokens, value) {
                Ok(close) => close,
                Err(error) => return malformed(error, &fallback_name),
            },
            _ => value,
        };

        if key_text == SETTINGS_KEY && tokens[value].kind == TokenKind::OpenBrace {
            settings = Some((tokens[value].end, tokens[value_end].start));
        } else if key_text == "name" && tokens[value].is_scalar() {
            name_property = Some(unquote(tokens[value].text(source)));
        }

        match next_significant(tokens, value_end + 1) {
            Some(semi) if tokens[semi].kind == TokenKind::Semicolon => cursor = semi + 1,
            _ => {
                let error = unexpected(source, tokens, value_end, "missing ';' after property");
                return malformed(error, &fallback_name);
            }
        }
    }

    let name = anchor.comment_name.clone().or(name_property).unwrap_or_default();
    match settings {
        Some((start, end)) => BlockMatch::Found(ConfigBlock {
            name,
            object_id: anchor.object_id.clone(),
            start,
            end,
        }),
        None => malformed(
            ScanError::UnexpectedToken {
                found: "}".to_string(),
                offset: tokens[object_close].start,
                context: "configuration has no buildSettings table",
            },
            &name,
        ),
    }
}

fn unexpected(source: &str, tokens: &[Token], at: usize, context: &'static str) -> ScanError {
    let token = tokens[at];
    ScanError::UnexpectedToken {
        found: token.text(source).to_string(),
        offset: token.start,
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = "\
/* Begin XCBuildConfiguration section */
\t\tAA0001 /* Debug */ = {
\t\t\tisa = XCBuildConfiguration;
\t\t\tbuildSettings = {
\t\t\t\tOTHER_LDFLAGS = (
\t\t\t\t\t\"$(inherited)\",
\t\t\t\t\t\"-lfoo\",
\t\t\t\t);
\t\t\t};
\t\t\tname = Debug;
\t\t};
\t\tAA0002 /* Release */ = {
\t\t\tisa = XCBuildConfiguration;
\t\t\tbuildSettings = {
\t\t\t\tSWIFT_VERSION = 5.0;
\t\t\t};
\t\t\tname = Release;
\t\t};
/* End XCBuildConfiguration section */
";

    fn found(matches: Vec<BlockMatch>) -> Vec<ConfigBlock> {
        matches
            .into_iter()
            .map(|block| match block {
                BlockMatch::Found(block) => block,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_locate_by_name() {
        let blocks = found(locate(PROJECT, &BlockSelector::named("Debug")).unwrap());
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.object_id, "AA0001");
        let body = &PROJECT[block.span()];
        assert!(body.contains("\"-lfoo\""));
        assert!(!body.contains("name = Debug"));
        assert_eq!(&PROJECT[block.end..block.end + 2], "};");
    }

    #[test]
    fn test_locate_all() {
        let blocks = found(locate(PROJECT, &BlockSelector::all()).unwrap());
        let names: Vec<_> = blocks.iter().map(|block| block.name.as_str()).collect();
        assert_eq!(names, vec!["Debug", "Release"]);
    }

    #[test]
    fn test_locate_missing_is_empty() {
        assert!(locate(PROJECT, &BlockSelector::named("Profile"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_locate_by_object_id() {
        let selector = BlockSelector::named("Release").with_object_id("AA0001");
        assert!(locate(PROJECT, &selector).unwrap().is_empty());
        let selector = BlockSelector::all().with_object_id("AA0002");
        let blocks = found(locate(PROJECT, &selector).unwrap());
        assert_eq!(blocks[0].name, "Release");
    }

    #[test]
    fn test_ignores_other_isa() {
        let source = "AB /* Debug */ = { isa = XCConfigurationList; buildConfigurations = (AA0001); };";
        assert!(locate(source, &BlockSelector::named("Debug"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_brace_in_quoted_value() {
        let source = "\
X1 /* Debug */ = {
\tisa = XCBuildConfiguration;
\tbuildSettings = {
\t\tGCC_PREPROCESSOR_DEFINITIONS = (\"A=}\", \"B=)\");
\t\tOTHER = 1;
\t};
\tname = Debug;
};
";
        let blocks = found(locate(source, &BlockSelector::named("Debug")).unwrap());
        let body = &source[blocks[0].span()];
        assert!(body.contains("OTHER = 1;"));
        assert!(body.trim_end().ends_with("OTHER = 1;"));
    }

    #[test]
    fn test_malformed_block_is_reported() {
        let source = "\
X1 /* Debug */ = {
\tisa = XCBuildConfiguration;
\tbuildSettings = {
\t\tOTHER_LDFLAGS = (\"-lfoo\";
\t};
\tname = Debug;
};
X2 /* Release */ = {
\tisa = XCBuildConfiguration;
\tbuildSettings = {
\t};
\tname = Release;
};
";
        let debug = locate(source, &BlockSelector::named("Debug")).unwrap();
        assert!(matches!(debug[0], BlockMatch::Malformed { .. }));
        let release = locate(source, &BlockSelector::named("Release")).unwrap();
        assert!(matches!(release[0], BlockMatch::Found(_)));
    }

    #[test]
    fn test_name_property_without_comment() {
        let source = "X9 = { isa = XCBuildConfiguration; buildSettings = { }; name = Staging; };";
        let blocks = found(locate(source, &BlockSelector::named("Staging")).unwrap());
        assert_eq!(blocks[0].object_id, "X9");
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(BlockSelector::parse("*", None), BlockSelector::all());
        assert_eq!(
            BlockSelector::parse("Debug", Some("AA")).to_string(),
            "Debug (AA)"
        );
    }
}
