//! Splits template source into literal text and tokenized actions.

use super::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Dot,
    Field(String),
    Variable(String),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Pipe,
    LParen,
    RParen,
    Comma,
    Declare,
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    /// Whitespace separated this token from the previous one.
    pub spaced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action { line: usize, tokens: Vec<Token> },
}

pub(crate) fn lex(name: &str, src: &str) -> Result<Vec<Item>, TemplateError> {
    Lexer { name, src, pos: 0 }.run()
}

struct Lexer<'a> {
    name: &'a str,
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Item>, TemplateError> {
        let mut items = Vec::new();
        let mut trim_leading = false;

        loop {
            let rest = &self.src[self.pos..];
            let Some(offset) = rest.find(OPEN) else {
                let text = if trim_leading { rest.trim_start() } else { rest };
                push_text(&mut items, text);
                return Ok(items);
            };

            let open_at = self.pos + offset;
            let mut inner = open_at + OPEN.len();
            let trim_trailing = is_trim_marker(&self.src[inner..]);
            if trim_trailing {
                inner += 1;
            }

            let mut text = &rest[..offset];
            if trim_leading {
                text = text.trim_start();
            }
            if trim_trailing {
                text = text.trim_end();
            }
            push_text(&mut items, text);

            let line = self.line_at(open_at);
            self.pos = inner;
            self.skip_space();

            trim_leading = if self.src[self.pos..].starts_with("/*") {
                self.comment(line)?
            } else {
                let (tokens, trim) = self.action(line)?;
                items.push(Item::Action { line, tokens });
                trim
            };
        }
    }

    fn line_at(&self, offset: usize) -> usize {
        1 + self.src[..offset].matches('\n').count()
    }

    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            name: self.name.to_string(),
            line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_space(&mut self) -> bool {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        rest.len() != trimmed.len()
    }

    /// Consumes a close delimiter if one starts here, returning whether it trims.
    fn close(&mut self, spaced: bool) -> Option<bool> {
        let rest = &self.src[self.pos..];
        if rest.starts_with(CLOSE) {
            self.pos += CLOSE.len();
            Some(false)
        } else if spaced && rest.starts_with("-}}") {
            self.pos += 1 + CLOSE.len();
            Some(true)
        } else {
            None
        }
    }

    fn comment(&mut self, line: usize) -> Result<bool, TemplateError> {
        let rest = &self.src[self.pos..];
        let end = rest
            .find("*/")
            .ok_or_else(|| self.error(line, "unclosed comment"))?;
        self.pos += end + 2;
        let spaced = self.skip_space();
        self.close(spaced)
            .ok_or_else(|| self.error(line, "comment ends before closing delimiter"))
    }

    fn action(&mut self, line: usize) -> Result<(Vec<Token>, bool), TemplateError> {
        let mut tokens = Vec::new();
        // The open delimiter counts as a separator for the first token.
        let mut spaced = true;

        loop {
            spaced |= self.skip_space();
            if let Some(trim) = self.close(spaced) {
                return Ok((tokens, trim));
            }
            let Some(c) = self.peek() else {
                return Err(self.error(line, "unclosed action"));
            };

            let tok = match c {
                '|' => self.single(Tok::Pipe),
                '(' => self.single(Tok::LParen),
                ')' => self.single(Tok::RParen),
                ',' => self.single(Tok::Comma),
                '=' => self.single(Tok::Assign),
                ':' => {
                    if self.src[self.pos..].starts_with(":=") {
                        self.pos += 2;
                        Tok::Declare
                    } else {
                        return Err(self.error(line, "expected :="));
                    }
                }
                '"' => self.quoted(line)?,
                '`' => self.raw(line)?,
                '.' => {
                    self.pos += 1;
                    let word = self.word();
                    if word.is_empty() {
                        Tok::Dot
                    } else {
                        Tok::Field(word.to_string())
                    }
                }
                '$' => {
                    self.pos += 1;
                    Tok::Variable(self.word().to_string())
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' => self.number(line)?,
                c if c.is_alphabetic() || c == '_' => match self.word() {
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    "nil" => Tok::Nil,
                    word => Tok::Ident(word.to_string()),
                },
                c => return Err(self.error(line, format!("unexpected {:?} in action", c))),
            };

            tokens.push(Token { tok, spaced });
            spaced = false;
        }
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.pos += 1;
        tok
    }

    fn word(&mut self) -> &'a str {
        let src: &'a str = self.src;
        let rest = &src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn number(&mut self, line: usize) -> Result<Tok, TemplateError> {
        let rest = &self.src[self.pos..];
        let len = rest
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || c == '_' || (i == 0 && (c == '-' || c == '+'))))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let text = rest[..len].replace('_', "");
        self.pos += len;

        if let Ok(n) = text.parse::<i64>() {
            Ok(Tok::Int(n))
        } else if let Ok(f) = text.parse::<f64>() {
            Ok(Tok::Float(f))
        } else {
            Err(self.error(line, format!("bad number syntax: {:?}", &rest[..len])))
        }
    }

    fn quoted(&mut self, line: usize) -> Result<Tok, TemplateError> {
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(Tok::Str(out));
                }
                '\n' => break,
                '\\' => {
                    let (_, esc) = chars
                        .next()
                        .ok_or_else(|| self.error(line, "unterminated quoted string"))?;
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        other => {
                            return Err(self.error(line, format!("unknown escape sequence: \\{}", other)))
                        }
                    }
                }
                c => out.push(c),
            }
        }
        Err(self.error(line, "unterminated quoted string"))
    }

    fn raw(&mut self, line: usize) -> Result<Tok, TemplateError> {
        let rest = &self.src[self.pos + 1..];
        let end = rest
            .find('`')
            .ok_or_else(|| self.error(line, "unterminated raw quoted string"))?;
        let text = rest[..end].to_string();
        self.pos += end + 2;
        Ok(Tok::Str(text))
    }
}

fn is_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_whitespace())
}

fn push_text(items: &mut Vec<Item>, text: &str) {
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}
