//! Builds the node tree from lexed items.

use super::funcs;
use super::lexer::{Item, Tok, Token};
use super::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action {
        line: usize,
        pipe: Pipeline,
    },
    If {
        line: usize,
        pipe: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        line: usize,
        pipe: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        line: usize,
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub vars: Vec<String>,
    /// `=` instead of `:=`.
    pub assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Pipe(Box<Pipeline>, Vec<String>),
}

enum Stop {
    End,
    Else(Vec<Token>, usize),
    Eof,
}

#[derive(Clone, Copy, PartialEq)]
enum Block {
    If,
    With,
    Range,
}

pub(crate) fn parse(name: &str, items: Vec<Item>) -> Result<Vec<Node>, TemplateError> {
    let mut parser = Parser {
        name,
        items: items.into_iter(),
        last_line: 1,
    };
    let (nodes, stop) = parser.list()?;
    match stop {
        Stop::Eof => Ok(nodes),
        Stop::End => Err(parser.error(parser.last_line, "unexpected {{end}}")),
        Stop::Else(_, line) => Err(parser.error(line, "unexpected {{else}}")),
    }
}

struct Parser<'a> {
    name: &'a str,
    items: std::vec::IntoIter<Item>,
    last_line: usize,
}

impl Parser<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            name: self.name.to_string(),
            line,
            message: message.into(),
        }
    }

    fn list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let (line, tokens) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { line, tokens } => (line, tokens),
            };
            self.last_line = line;

            let keyword = match tokens.first().map(|t| &t.tok) {
                Some(Tok::Ident(word)) => word.as_str(),
                None => return Err(self.error(line, "missing value for command")),
                _ => "",
            };

            match keyword {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(self.error(line, "unexpected token after end"));
                    }
                    return Ok((nodes, Stop::End));
                }
                "else" => return Ok((nodes, Stop::Else(tokens[1..].to_vec(), line))),
                "if" => nodes.push(self.block(Block::If, &tokens[1..], line)?),
                "with" => nodes.push(self.block(Block::With, &tokens[1..], line)?),
                "range" => nodes.push(self.block(Block::Range, &tokens[1..], line)?),
                "define" | "template" | "block" | "break" | "continue" => {
                    return Err(self.error(line, format!("unsupported action: {}", keyword)))
                }
                _ => {
                    let pipe = self.pipeline(&tokens, line, false)?;
                    nodes.push(Node::Action { line, pipe });
                }
            }
        }

        Ok((nodes, Stop::Eof))
    }

    fn block(&mut self, kind: Block, tokens: &[Token], line: usize) -> Result<Node, TemplateError> {
        let pipe = self.pipeline(tokens, line, kind == Block::Range)?;
        let (then, stop) = self.list()?;

        let otherwise = match stop {
            Stop::End => Vec::new(),
            Stop::Eof => return Err(self.error(line, "unexpected EOF")),
            Stop::Else(rest, else_line) => match rest.first().map(|t| &t.tok) {
                None => {
                    let (otherwise, stop) = self.list()?;
                    match stop {
                        Stop::End => otherwise,
                        Stop::Eof => return Err(self.error(line, "unexpected EOF")),
                        Stop::Else(_, line) => {
                            return Err(self.error(line, "expected end; found {{else}}"))
                        }
                    }
                }
                // `else if` and `else with` chain onto the same `end`.
                Some(Tok::Ident(word)) if word == "if" && kind == Block::If => {
                    vec![self.block(Block::If, &rest[1..], else_line)?]
                }
                Some(Tok::Ident(word)) if word == "with" && kind == Block::With => {
                    vec![self.block(Block::With, &rest[1..], else_line)?]
                }
                _ => return Err(self.error(else_line, "unexpected token after else")),
            },
        };

        Ok(match kind {
            Block::If => Node::If {
                line,
                pipe,
                then,
                otherwise,
            },
            Block::With => Node::With {
                line,
                pipe,
                then,
                otherwise,
            },
            Block::Range => Node::Range {
                line,
                pipe,
                body: then,
                otherwise,
            },
        })
    }

    fn pipeline(&self, tokens: &[Token], line: usize, allow_pair: bool) -> Result<Pipeline, TemplateError> {
        let mut pos = 0;
        let (vars, assign) = self.declarations(tokens, &mut pos, line, allow_pair)?;
        let pipe = self.commands(tokens, &mut pos, line, vars, assign)?;
        if pos < tokens.len() {
            return Err(self.error(line, format!("unexpected {} in operand", describe(&tokens[pos].tok))));
        }
        Ok(pipe)
    }

    fn declarations(
        &self,
        tokens: &[Token],
        pos: &mut usize,
        line: usize,
        allow_pair: bool,
    ) -> Result<(Vec<String>, bool), TemplateError> {
        let var = |i: usize| match tokens.get(i).map(|t| &t.tok) {
            Some(Tok::Variable(name)) => Some(name.clone()),
            _ => None,
        };
        let tok = |i: usize| tokens.get(i).map(|t| &t.tok);

        if let Some(first) = var(0) {
            match tok(1) {
                Some(Tok::Declare) => {
                    *pos = 2;
                    return Ok((vec![first], false));
                }
                Some(Tok::Assign) => {
                    *pos = 2;
                    return Ok((vec![first], true));
                }
                Some(Tok::Comma) => {
                    if !allow_pair {
                        return Err(self.error(line, "too many declarations"));
                    }
                    let second = var(2).ok_or_else(|| self.error(line, "expected variable after comma"))?;
                    let assign = match tok(3) {
                        Some(Tok::Declare) => false,
                        Some(Tok::Assign) => true,
                        _ => return Err(self.error(line, "expected := after variables")),
                    };
                    *pos = 4;
                    return Ok((vec![first, second], assign));
                }
                _ => {}
            }
        }
        Ok((Vec::new(), false))
    }

    fn commands(
        &self,
        tokens: &[Token],
        pos: &mut usize,
        line: usize,
        vars: Vec<String>,
        assign: bool,
    ) -> Result<Pipeline, TemplateError> {
        let mut cmds = Vec::new();

        loop {
            let mut args = Vec::new();
            while let Some(token) = tokens.get(*pos) {
                if matches!(token.tok, Tok::Pipe | Tok::RParen) {
                    break;
                }
                args.push(self.operand(tokens, pos, line)?);
            }
            if args.is_empty() {
                return Err(self.error(line, "missing value for command"));
            }
            cmds.push(Command { args });

            match tokens.get(*pos).map(|t| &t.tok) {
                Some(Tok::Pipe) => *pos += 1,
                _ => break,
            }
        }

        Ok(Pipeline { vars, assign, cmds })
    }

    fn operand(&self, tokens: &[Token], pos: &mut usize, line: usize) -> Result<Arg, TemplateError> {
        let token = &tokens[*pos];
        *pos += 1;

        let arg = match &token.tok {
            Tok::Dot => Arg::Dot,
            Tok::Field(name) => {
                let mut chain = vec![name.clone()];
                chain.extend(attached_fields(tokens, pos));
                return Ok(Arg::Field(chain));
            }
            Tok::Variable(name) => {
                let chain = attached_fields(tokens, pos);
                return Ok(Arg::Variable(name.clone(), chain));
            }
            Tok::Ident(name) => match name.as_str() {
                "if" | "else" | "end" | "range" | "with" => {
                    return Err(self.error(line, format!("unexpected keyword {} in operand", name)))
                }
                _ if funcs::exists(name) => Arg::Function(name.clone()),
                _ => return Err(self.error(line, format!("function {:?} not defined", name))),
            },
            Tok::Str(s) => Arg::Str(s.clone()),
            Tok::Int(n) => Arg::Int(*n),
            Tok::Float(f) => Arg::Float(*f),
            Tok::Bool(b) => Arg::Bool(*b),
            Tok::Nil => Arg::Nil,
            Tok::LParen => {
                let inner = self.commands(tokens, pos, line, Vec::new(), false)?;
                match tokens.get(*pos).map(|t| &t.tok) {
                    Some(Tok::RParen) => *pos += 1,
                    _ => return Err(self.error(line, "unclosed left paren")),
                }
                let chain = attached_fields(tokens, pos);
                return Ok(Arg::Pipe(Box::new(inner), chain));
            }
            other => return Err(self.error(line, format!("unexpected {} in operand", describe(other)))),
        };

        if let Some(next) = tokens.get(*pos) {
            if !next.spaced && matches!(next.tok, Tok::Field(_)) {
                return Err(self.error(line, "unexpected field access on literal"));
            }
        }
        Ok(arg)
    }
}

fn attached_fields(tokens: &[Token], pos: &mut usize) -> Vec<String> {
    let mut chain = Vec::new();
    while let Some(Token {
        tok: Tok::Field(name),
        spaced: false,
    }) = tokens.get(*pos)
    {
        chain.push(name.clone());
        *pos += 1;
    }
    chain
}

fn describe(tok: &Tok) -> &'static str {
    match tok {
        Tok::Pipe => "'|'",
        Tok::LParen => "'('",
        Tok::RParen => "')'",
        Tok::Comma => "','",
        Tok::Declare => "':='",
        Tok::Assign => "'='",
        _ => "token",
    }
}
