//! Tokenizer for LaTeX source.
//!
//! Produces a flat token stream with byte spans into the source. Comments
//! are dropped here. Spaces after a control word are skipped the way TeX
//! skips them, and runs of whitespace collapse into a single
//! [`TokenKind::Space`] or a [`TokenKind::ParBreak`] when they contain a
//! blank line.

use std::ops::Range;

/// Kind of a lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Control word such as `\section` (name without backslash)
    Command(String),
    /// Backslash followed by a single non-letter, such as `\&` or `\\`
    Symbol(char),
    /// `{`
    BeginGroup,
    /// `}`
    EndGroup,
    /// `&`
    Alignment,
    /// `~`
    Tie,
    /// Inline or display math, raw source including delimiters
    Math(String),
    /// Whitespace inside a paragraph
    Space,
    /// Blank line
    ParBreak,
    /// Ordinary characters; `[` and `]` always come as their own token
    Text(String),
}

/// A token with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
    pub line: usize,
}

/// Tokenizer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub message: String,
    pub line: usize,
}

/// Tokenize `source`.
///
/// In lenient mode an unterminated math span degrades to a literal `$`
/// instead of failing.
pub(crate) fn tokenize(source: &str, lenient: bool) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        src: source,
        pos: 0,
        line: 1,
        lenient,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '\\' | '{' | '}' | '&' | '~' | '%' | '$' | '[' | ']' | ' ' | '\t' | '\n' | '\r'
    )
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    lenient: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        self.tokens.push(Token {
            kind,
            span: start..self.pos,
            line,
        });
    }

    fn run(&mut self) -> Result<(), LexError> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            let line = self.line;
            match c {
                '\\' => self.control_sequence(start, line)?,
                '{' => {
                    self.bump();
                    self.push(TokenKind::BeginGroup, start, line);
                }
                '}' => {
                    self.bump();
                    self.push(TokenKind::EndGroup, start, line);
                }
                '&' => {
                    self.bump();
                    self.push(TokenKind::Alignment, start, line);
                }
                '~' => {
                    self.bump();
                    self.push(TokenKind::Tie, start, line);
                }
                '[' | ']' => {
                    self.bump();
                    self.push(TokenKind::Text(c.to_string()), start, line);
                }
                '$' => self.dollar_math(start, line)?,
                ' ' | '\t' | '\n' | '\r' | '%' => self.whitespace(start, line),
                _ => {
                    while let Some(c) = self.peek() {
                        if is_special(c) {
                            break;
                        }
                        self.bump();
                    }
                    let text = self.src[start..self.pos].to_string();
                    self.push(TokenKind::Text(text), start, line);
                }
            }
        }
        Ok(())
    }

    fn control_sequence(&mut self, start: usize, line: usize) -> Result<(), LexError> {
        self.bump();
        match self.peek() {
            None => self.push(TokenKind::Text("\\".to_string()), start, line),
            Some(c) if c.is_ascii_alphabetic() => {
                while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
                    self.bump();
                }
                let name = self.src[start + 1..self.pos].to_string();
                self.push(TokenKind::Command(name), start, line);
                while matches!(self.peek(), Some(' ' | '\t')) {
                    self.bump();
                }
            }
            Some('(') => self.delimited_math(start, line, "\\)")?,
            Some('[') => self.delimited_math(start, line, "\\]")?,
            Some(c) => {
                self.bump();
                self.push(TokenKind::Symbol(c), start, line);
            }
        }
        Ok(())
    }

    fn dollar_math(&mut self, start: usize, line: usize) -> Result<(), LexError> {
        let display = self.peek_second() == Some('$');
        let close = if display { "$$" } else { "$" };
        self.bump();
        if display {
            self.bump();
        }
        self.math_body(start, line, close)
    }

    fn delimited_math(&mut self, start: usize, line: usize, close: &str) -> Result<(), LexError> {
        self.bump();
        self.math_body(start, line, close)
    }

    fn math_body(&mut self, start: usize, line: usize, close: &str) -> Result<(), LexError> {
        let body_start = self.pos;
        while self.pos < self.src.len() {
            if self.src[self.pos..].starts_with(close) {
                for _ in 0..close.chars().count() {
                    self.bump();
                }
                let raw = self.src[start..self.pos].to_string();
                self.push(TokenKind::Math(raw), start, line);
                return Ok(());
            }
            // An escaped character never closes the span.
            if self.peek() == Some('\\') && !close.starts_with('\\') {
                self.bump();
            }
            self.bump();
        }

        if self.lenient {
            // Rewind and keep the opening delimiter as text.
            self.pos = body_start;
            self.line = line;
            let delimiter = self.src[start..body_start].to_string();
            self.tokens.push(Token {
                kind: TokenKind::Text(delimiter),
                span: start..body_start,
                line,
            });
            return Ok(());
        }
        Err(LexError {
            message: "unterminated math".to_string(),
            line,
        })
    }

    /// Consume whitespace and comments, emitting at most one token.
    fn whitespace(&mut self, start: usize, line: usize) {
        let mut saw_space = false;
        let mut par = false;
        let mut at_line_start = false;
        let mut after_comment = false;

        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                    if !after_comment {
                        saw_space = true;
                    }
                }
                Some('\n') => {
                    self.bump();
                    if at_line_start {
                        par = true;
                    }
                    at_line_start = true;
                    after_comment = false;
                    saw_space = true;
                }
                Some('%') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                    at_line_start = true;
                    after_comment = true;
                }
                _ => break,
            }
        }

        if par {
            self.push(TokenKind::ParBreak, start, line);
        } else if saw_space {
            self.push(TokenKind::Space, start, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, false)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn text(s: &str) -> TokenKind {
        TokenKind::Text(s.to_string())
    }

    fn cmd(s: &str) -> TokenKind {
        TokenKind::Command(s.to_string())
    }

    #[test]
    fn test_commands_and_groups() {
        assert_eq!(
            kinds(r"\section{Intro}\textbf{Hello} x"),
            vec![
                cmd("section"),
                TokenKind::BeginGroup,
                text("Intro"),
                TokenKind::EndGroup,
                cmd("textbf"),
                TokenKind::BeginGroup,
                text("Hello"),
                TokenKind::EndGroup,
                TokenKind::Space,
                text("x"),
            ]
        );
    }

    #[test]
    fn test_space_after_control_word_skipped() {
        assert_eq!(kinds(r"\LaTeX  rocks"), vec![cmd("LaTeX"), text("rocks")]);
        assert_eq!(kinds(r"a\&b"), vec![text("a"), TokenKind::Symbol('&'), text("b")]);
    }

    #[test]
    fn test_paragraph_breaks() {
        assert_eq!(kinds("a\nb"), vec![text("a"), TokenKind::Space, text("b")]);
        assert_eq!(
            kinds("a\n  \n b"),
            vec![text("a"), TokenKind::ParBreak, text("b")]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(kinds("a% note\nb"), vec![text("a"), text("b")]);
        assert_eq!(
            kinds("a\n% note\nb"),
            vec![text("a"), TokenKind::Space, text("b")]
        );
        assert_eq!(
            kinds("a\n% note\n\nb"),
            vec![text("a"), TokenKind::ParBreak, text("b")]
        );
    }

    #[test]
    fn test_brackets_and_specials() {
        assert_eq!(
            kinds("[h]x~y&z"),
            vec![
                text("["),
                text("h"),
                text("]"),
                text("x"),
                TokenKind::Tie,
                text("y"),
                TokenKind::Alignment,
                text("z"),
            ]
        );
    }

    #[test]
    fn test_math() {
        assert_eq!(
            kinds(r"a $x^2 \$ y$ b"),
            vec![
                text("a"),
                TokenKind::Space,
                TokenKind::Math(r"$x^2 \$ y$".to_string()),
                TokenKind::Space,
                text("b"),
            ]
        );
        assert_eq!(
            kinds(r"\(a\) \[b\]"),
            vec![
                TokenKind::Math(r"\(a\)".to_string()),
                TokenKind::Space,
                TokenKind::Math(r"\[b\]".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_math() {
        let err = tokenize("line one\n$x", false).unwrap_err();
        assert_eq!(err.line, 2);

        let tokens = tokenize("$x", true).unwrap();
        assert_eq!(tokens[0].kind, text("$"));
        assert_eq!(tokens[1].kind, text("x"));
    }

    #[test]
    fn test_spans_and_lines() {
        let tokens = tokenize("ab\n\\cmd", false).unwrap();
        assert_eq!(tokens[0].span, 0..2);
        assert_eq!(tokens[2].span, 3..7);
        assert_eq!(tokens[2].line, 2);
    }
}
