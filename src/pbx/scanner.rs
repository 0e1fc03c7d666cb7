//! Tokenizer for the bracket-delimited property-list format used by `project.pbxproj`.
//!
//! The scanner does not build a tree. It produces a flat token stream with byte spans
//! and knows how to find the partner of an opening `{` or `(`, which is all the block
//! locator and setting patcher need. Quoted strings and comments are single tokens, so
//! brackets inside them never affect nesting.

use crate::pbx::errors::ScanError;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Equals,
    Semicolon,
    Comma,
    /// `"..."` including the quotes
    Quoted,
    /// Bare identifier, number or path
    Word,
    /// `/* ... */` or `// ...`
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, TokenKind::Quoted | TokenKind::Word)
    }

    fn closer(&self) -> Option<char> {
        match self.kind {
            TokenKind::OpenBrace => Some('}'),
            TokenKind::OpenParen => Some(')'),
            _ => None,
        }
    }
}

/// Tokenize the whole document.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScanError> {
    tokenize_range(source, 0..source.len())
}

/// Tokenize `source[range]`, reporting absolute offsets.
pub fn tokenize_range(source: &str, range: Range<usize>) -> Result<Vec<Token>, ScanError> {
    let bytes = source.as_bytes();
    let end = range.end.min(bytes.len());
    let mut tokens = Vec::new();
    let mut pos = range.start;

    while pos < end {
        let byte = bytes[pos];
        let start = pos;

        let kind = match byte {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'{' => TokenKind::OpenBrace,
            b'}' => TokenKind::CloseBrace,
            b'(' => TokenKind::OpenParen,
            b')' => TokenKind::CloseParen,
            b'=' => TokenKind::Equals,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'/' if bytes.get(pos + 1) == Some(&b'*') && pos + 1 < end => {
                pos = find_comment_end(bytes, pos + 2, end)
                    .ok_or(ScanError::UnterminatedComment { offset: start })?;
                tokens.push(Token {
                    kind: TokenKind::Comment,
                    start,
                    end: pos,
                });
                continue;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'/') && pos + 1 < end => {
                while pos < end && bytes[pos] != b'\n' {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Comment,
                    start,
                    end: pos,
                });
                continue;
            }
            b'"' => {
                pos = find_string_end(bytes, pos + 1, end)
                    .ok_or(ScanError::UnterminatedString { offset: start })?;
                tokens.push(Token {
                    kind: TokenKind::Quoted,
                    start,
                    end: pos,
                });
                continue;
            }
            _ => {
                while pos < end && is_word_byte(bytes, pos) {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word,
                    start,
                    end: pos,
                });
                continue;
            }
        };

        pos += 1;
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

fn find_comment_end(bytes: &[u8], mut pos: usize, end: usize) -> Option<usize> {
    while pos + 1 < end {
        if bytes[pos] == b'*' && bytes[pos + 1] == b'/' {
            return Some(pos + 2);
        }
        pos += 1;
    }
    None
}

fn find_string_end(bytes: &[u8], mut pos: usize, end: usize) -> Option<usize> {
    while pos < end {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'"' => return Some(pos + 1),
            _ => pos += 1,
        }
    }
    None
}

fn is_word_byte(bytes: &[u8], pos: usize) -> bool {
    match bytes[pos] {
        b' ' | b'\t' | b'\r' | b'\n' | b'{' | b'}' | b'(' | b')' | b'=' | b';' | b',' | b'"' => {
            false
        }
        b'/' => !matches!(bytes.get(pos + 1), Some(b'*') | Some(b'/')),
        _ => true,
    }
}

/// Index of the token closing the group opened at `tokens[open]`.
///
/// Tracks both brace and parenthesis nesting, so a `)` closing a `{` is an error rather
/// than a silent match.
pub fn find_matching(tokens: &[Token], open: usize) -> Result<usize, ScanError> {
    let first = tokens.get(open).ok_or(ScanError::UnexpectedToken {
        found: "end of input".to_string(),
        offset: 0,
        context: "expected an opening bracket",
    })?;
    let Some(closer) = first.closer() else {
        return Err(ScanError::UnexpectedToken {
            found: format!("{:?}", first.kind),
            offset: first.start,
            context: "expected an opening bracket",
        });
    };

    let mut stack = vec![(closer, first.start, open_char(closer))];
    for (index, token) in tokens.iter().enumerate().skip(open + 1) {
        if let Some(closer) = token.closer() {
            stack.push((closer, token.start, open_char(closer)));
            continue;
        }
        let found = match token.kind {
            TokenKind::CloseBrace => '}',
            TokenKind::CloseParen => ')',
            _ => continue,
        };
        let Some((expected, _, _)) = stack.pop() else {
            break;
        };
        if expected != found {
            return Err(ScanError::Mismatched {
                expected,
                found,
                offset: token.start,
            });
        }
        if stack.is_empty() {
            return Ok(index);
        }
    }

    let (_, offset, open) = stack.last().copied().unwrap_or((closer, first.start, '{'));
    Err(ScanError::Unclosed { open, offset })
}

fn open_char(closer: char) -> char {
    if closer == '}' {
        '{'
    } else {
        '('
    }
}

/// Check that every bracket in `source` is closed by its partner.
pub fn check_balance(source: &str) -> Result<(), ScanError> {
    let tokens = tokenize(source)?;
    let mut stack: Vec<(char, usize)> = Vec::new();

    for token in &tokens {
        match token.kind {
            TokenKind::OpenBrace => stack.push(('{', token.start)),
            TokenKind::OpenParen => stack.push(('(', token.start)),
            TokenKind::CloseBrace | TokenKind::CloseParen => {
                let found = if token.kind == TokenKind::CloseBrace {
                    '}'
                } else {
                    ')'
                };
                match stack.pop() {
                    Some((open, _)) if (open == '{') == (found == '}') => {}
                    Some((open, _)) => {
                        return Err(ScanError::Mismatched {
                            expected: if open == '{' { '}' } else { ')' },
                            found,
                            offset: token.start,
                        });
                    }
                    None => {
                        return Err(ScanError::UnexpectedToken {
                            found: found.to_string(),
                            offset: token.start,
                            context: "closing bracket without an opener",
                        });
                    }
                }
            }
            _ => {}
        }
    }

    match stack.pop() {
        Some((open, offset)) => Err(ScanError::Unclosed { open, offset }),
        None => Ok(()),
    }
}

/// Index of the next non-comment token at or after `from`.
pub fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&index| tokens[index].kind != TokenKind::Comment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_assignment() {
        assert_eq!(
            kinds("A = \"x y\"; /* c */"),
            vec![
                TokenKind::Word,
                TokenKind::Equals,
                TokenKind::Quoted,
                TokenKind::Semicolon,
                TokenKind::Comment,
            ]
        );
    }

    #[test]
    fn test_brackets_inside_strings_are_inert() {
        let source = "X = (\"$(SRCROOT)/a}\", \"b)\");";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[3].text(source), "\"$(SRCROOT)/a}\"");
        assert_eq!(tokens[5].text(source), "\"b)\"");
        assert!(check_balance(source).is_ok());
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let source = r#"K = "say \"hi\"";"#;
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[2].text(source), r#""say \"hi\"""#);
    }

    #[test]
    fn test_paths_are_words() {
        let source = "path = Sources/App/main.swift; // trailing";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[2].text(source), "Sources/App/main.swift");
        assert_eq!(tokens[4].kind, TokenKind::Comment);
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            tokenize("A = \"oops;"),
            Err(ScanError::UnterminatedString { offset: 4 })
        );
    }

    #[test]
    fn test_unterminated_comment() {
        assert!(matches!(
            tokenize("A /* never"),
            Err(ScanError::UnterminatedComment { offset: 2 })
        ));
    }

    #[test]
    fn test_find_matching_nested() {
        let source = "{ a = { b = (c, d); }; e = f; } tail";
        let tokens = tokenize(source).unwrap();
        let close = find_matching(&tokens, 0).unwrap();
        assert_eq!(tokens[close].start, source.find("} tail").unwrap());
    }

    #[test]
    fn test_find_matching_mismatch() {
        let source = "{ a = ( b; }";
        let tokens = tokenize(source).unwrap();
        assert!(matches!(
            find_matching(&tokens, 0),
            Err(ScanError::Mismatched {
                expected: ')',
                found: '}',
                ..
            })
        ));
    }

    #[test]
    fn test_find_matching_unclosed() {
        let source = "{ a = b;";
        let tokens = tokenize(source).unwrap();
        assert_eq!(
            find_matching(&tokens, 0),
            Err(ScanError::Unclosed {
                open: '{',
                offset: 0
            })
        );
    }

    #[test]
    fn test_check_balance_detects_stray_closer() {
        assert!(check_balance("{ a = b; }").is_ok());
        assert!(check_balance("a = b; }").is_err());
        assert!(check_balance("{ a = (b; }").is_err());
    }

    #[test]
    fn test_tokenize_range_offsets_are_absolute() {
        let source = "xxxx{ A = 1; }";
        let tokens = tokenize_range(source, 5..13).unwrap();
        assert_eq!(tokens[0].start, 6);
        assert_eq!(tokens[0].text(source), "A");
    }
}
