//! Parser module for Lua source code
//!
//! A recursive-descent parser for Lua 5.4 producing the ranged tree in
//! [`super::ast`], wrapped by [`ParsedFile`] together with the comment table
//! and inline disable directives.

use std::ops::Range;
use std::sync::OnceLock;

use super::ast::*;
use super::comments::CommentTable;
use super::lexer::{Lexer, Tok, Token};
use crate::disable_comments::DisableDirectives;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {}:{}", .line + 1, .column + 1)]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug)]
pub struct ParseResult {
    pub chunk: Option<Chunk>,
    pub comments: CommentTable,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.chunk.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub fn parse(source: &str) -> ParseResult {
    let lexed = match Lexer::new(source).tokenize() {
        Ok(lexed) => lexed,
        Err(err) => {
            return ParseResult {
                chunk: None,
                comments: CommentTable::default(),
                errors: vec![err],
            };
        }
    };
    let comments = CommentTable::from_comments(lexed.comments);
    let mut parser = Parser {
        tokens: lexed.tokens,
        pos: 0,
        depth: 0,
    };
    match parser.chunk() {
        Ok(chunk) => ParseResult {
            chunk: Some(chunk),
            comments,
            errors: Vec::new(),
        },
        Err(err) => ParseResult {
            chunk: None,
            comments,
            errors: vec![err],
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub filename: String,
    pub line_count: usize,
    pub has_errors: bool,
}

pub struct ParsedFile {
    source: String,
    metadata: FileMetadata,
    chunk: Option<Chunk>,
    comments: CommentTable,
    errors: Vec<ParseError>,
    line_ranges: OnceLock<Vec<Range<usize>>>,
    disable_directives: DisableDirectives,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("metadata", &self.metadata)
            .field("has_chunk", &self.chunk.is_some())
            .field("error_count", &self.errors.len())
            .finish()
    }
}

impl ParsedFile {
    pub fn from_source(filename: &str, source: &str) -> Self {
        let parse_result = parse(source);
        let disable_directives = DisableDirectives::from_source(source);

        let line_count = if source.is_empty() {
            0
        } else {
            source.lines().count()
        };

        let metadata = FileMetadata {
            filename: filename.to_string(),
            line_count,
            has_errors: parse_result.has_errors(),
        };

        Self {
            source: source.to_string(),
            metadata,
            chunk: parse_result.chunk,
            comments: parse_result.comments,
            errors: parse_result.errors,
            line_ranges: OnceLock::new(),
            disable_directives,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn chunk(&self) -> Option<&Chunk> {
        self.chunk.as_ref()
    }

    pub fn comments(&self) -> &CommentTable {
        &self.comments
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn disable_directives(&self) -> &DisableDirectives {
        &self.disable_directives
    }

    /// Zero-based line lookup.
    pub fn get_line(&self, line: usize) -> Option<&str> {
        let ranges = self.line_ranges.get_or_init(|| self.build_line_ranges());
        ranges.get(line).map(|range| &self.source[range.clone()])
    }

    fn build_line_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;

        for (i, c) in self.source.char_indices() {
            if c == '\n' {
                ranges.push(start..i);
                start = i + 1;
            }
        }

        if start < self.source.len() || (start == 0 && !self.source.is_empty()) {
            ranges.push(start..self.source.len());
        }

        ranges
    }
}

// Binary operator priorities as (left, right).
fn binary_priority(tok: &Tok) -> Option<(BinOp, u8, u8)> {
    let entry = match tok {
        Tok::Or => (BinOp::Or, 1, 1),
        Tok::And => (BinOp::And, 2, 2),
        Tok::Lt => (BinOp::Lt, 3, 3),
        Tok::Gt => (BinOp::Gt, 3, 3),
        Tok::Le => (BinOp::Le, 3, 3),
        Tok::Ge => (BinOp::Ge, 3, 3),
        Tok::NotEq => (BinOp::Ne, 3, 3),
        Tok::EqEq => (BinOp::Eq, 3, 3),
        Tok::Pipe => (BinOp::BOr, 4, 4),
        Tok::Tilde => (BinOp::BXor, 5, 5),
        Tok::Ampersand => (BinOp::BAnd, 6, 6),
        Tok::Shl => (BinOp::Shl, 7, 7),
        Tok::Shr => (BinOp::Shr, 7, 7),
        Tok::Concat => (BinOp::Concat, 9, 8),
        Tok::Plus => (BinOp::Add, 10, 10),
        Tok::Minus => (BinOp::Sub, 10, 10),
        Tok::Star => (BinOp::Mul, 11, 11),
        Tok::Slash => (BinOp::Div, 11, 11),
        Tok::DoubleSlash => (BinOp::IDiv, 11, 11),
        Tok::Percent => (BinOp::Mod, 11, 11),
        Tok::Caret => (BinOp::Pow, 14, 13),
        _ => return None,
    };
    Some(entry)
}

const UNARY_PRIORITY: u8 = 12;

/// Nesting limit shared by statements and expressions, as in the reference
/// Lua interpreter.
const MAX_SYNTAX_LEVELS: u32 = 200;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn current_range(&self) -> TextRange {
        self.tokens[self.pos].range
    }

    fn prev_range(&self) -> TextRange {
        self.tokens[self.pos.saturating_sub(1)].range
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let range = self.current_range();
        ParseError {
            line: range.start.line,
            column: range.start.column,
            message: message.into(),
        }
    }

    /// Errors leave the counter raised; they abort the whole parse anyway.
    fn enter_level(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_LEVELS {
            return Err(self.error_here("chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn leave_level(&mut self) {
        self.depth -= 1;
    }

    fn expect(&mut self, tok: Tok, what: &str) -> PResult<Token> {
        if self.check(&tok) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "{} expected near {}",
                what,
                self.peek().describe()
            )))
        }
    }

    fn expect_match(&mut self, tok: Tok, what: &str, opener: &str, line: u32) -> PResult<Token> {
        if self.check(&tok) {
            return Ok(self.advance());
        }
        let range = self.current_range();
        if range.start.line == line {
            return self.expect(tok, what);
        }
        Err(self.error_here(format!(
            "{} expected (to close '{}' at line {}) near {}",
            what,
            opener,
            line + 1,
            self.peek().describe()
        )))
    }

    fn name(&mut self) -> PResult<Name> {
        let range = self.current_range();
        match self.peek().clone() {
            Tok::Name(name) => {
                self.advance();
                Ok(Name { name, range })
            }
            other => Err(self.error_here(format!("<name> expected near {}", other.describe()))),
        }
    }

    fn chunk(&mut self) -> PResult<Chunk> {
        let block = self.block()?;
        if !self.check(&Tok::Eof) {
            let near = self.peek().describe();
            return Err(self.error_here(format!("'<eof>' expected near {}", near)));
        }
        let end = self.current_range().end;
        Ok(Chunk {
            range: TextRange::new(Position::default(), end),
            block,
        })
    }

    fn block_follows(&self, with_until: bool) -> bool {
        match self.peek() {
            Tok::Else | Tok::Elseif | Tok::End | Tok::Eof => true,
            Tok::Until => with_until,
            _ => false,
        }
    }

    fn block(&mut self) -> PResult<Block> {
        let start = self.current_range().start;
        let mut stats = Vec::new();
        let mut ret = None;
        while !self.block_follows(true) {
            if self.check(&Tok::Return) {
                ret = Some(self.return_stat()?);
                break;
            }
            stats.push(self.statement()?);
        }
        let end = if ret.is_some() || !stats.is_empty() {
            self.prev_range().end
        } else {
            start
        };
        Ok(Block {
            stats,
            ret,
            range: TextRange::new(start, end.max(start)),
        })
    }

    fn return_stat(&mut self) -> PResult<ReturnStat> {
        let start = self.advance().range;
        let exprs = if self.block_follows(true) || self.check(&Tok::Semi) {
            Vec::new()
        } else {
            self.exp_list()?
        };
        self.eat(&Tok::Semi);
        Ok(ReturnStat {
            exprs,
            range: start.cover(self.prev_range()),
        })
    }

    fn statement(&mut self) -> PResult<Stat> {
        self.enter_level()?;
        let start = self.current_range();
        let kind = match self.peek().clone() {
            Tok::Semi => {
                self.advance();
                StatKind::Empty
            }
            Tok::If => StatKind::If(self.if_stat(start.start.line)?),
            Tok::While => {
                self.advance();
                let cond = self.exp()?;
                self.expect(Tok::Do, "'do'")?;
                let block = self.block()?;
                self.expect_match(Tok::End, "'end'", "while", start.start.line)?;
                StatKind::While { cond, block }
            }
            Tok::Do => {
                self.advance();
                let block = self.block()?;
                self.expect_match(Tok::End, "'end'", "do", start.start.line)?;
                StatKind::Do(block)
            }
            Tok::For => self.for_stat(start.start.line)?,
            Tok::Repeat => {
                self.advance();
                let block = self.block()?;
                self.expect_match(Tok::Until, "'until'", "repeat", start.start.line)?;
                let cond = self.exp()?;
                StatKind::Repeat { block, cond }
            }
            Tok::Function => {
                self.advance();
                let name = self.func_name()?;
                let is_method = name.method.is_some();
                let body = self.function_body(start, is_method)?;
                StatKind::Function { name, body }
            }
            Tok::Local => {
                self.advance();
                if self.eat(&Tok::Function) {
                    let name = self.name()?;
                    let body = self.function_body(start, false)?;
                    StatKind::LocalFunction { name, body }
                } else {
                    StatKind::Local(self.local_stat()?)
                }
            }
            Tok::DoubleColon => {
                self.advance();
                let name = self.name()?;
                self.expect(Tok::DoubleColon, "'::'")?;
                StatKind::Label(name)
            }
            Tok::Break => {
                self.advance();
                StatKind::Break
            }
            Tok::Goto => {
                self.advance();
                StatKind::Goto(self.name()?)
            }
            _ => self.expr_stat()?,
        };
        self.leave_level();
        Ok(Stat {
            kind,
            range: start.cover(self.prev_range()),
        })
    }

    fn if_stat(&mut self, line: u32) -> PResult<IfStat> {
        let mut clauses = Vec::new();
        self.advance();
        let cond = self.exp()?;
        self.expect(Tok::Then, "'then'")?;
        let block = self.block()?;
        clauses.push(IfClause { cond, block });
        let mut else_block = None;
        loop {
            if self.eat(&Tok::Elseif) {
                let cond = self.exp()?;
                self.expect(Tok::Then, "'then'")?;
                let block = self.block()?;
                clauses.push(IfClause { cond, block });
            } else if self.eat(&Tok::Else) {
                else_block = Some(self.block()?);
                self.expect_match(Tok::End, "'end'", "if", line)?;
                break;
            } else {
                self.expect_match(Tok::End, "'end'", "if", line)?;
                break;
            }
        }
        Ok(IfStat {
            clauses,
            else_block,
        })
    }

    fn for_stat(&mut self, line: u32) -> PResult<StatKind> {
        self.advance();
        let first = self.name()?;
        if self.eat(&Tok::Assign) {
            let start = self.exp()?;
            self.expect(Tok::Comma, "','")?;
            let limit = self.exp()?;
            let step = if self.eat(&Tok::Comma) {
                Some(self.exp()?)
            } else {
                None
            };
            self.expect(Tok::Do, "'do'")?;
            let block = self.block()?;
            self.expect_match(Tok::End, "'end'", "for", line)?;
            return Ok(StatKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                block,
            });
        }
        let mut names = vec![first];
        while self.eat(&Tok::Comma) {
            names.push(self.name()?);
        }
        if !self.check(&Tok::In) {
            return Err(self.error_here(format!(
                "'=' or 'in' expected near {}",
                self.peek().describe()
            )));
        }
        self.advance();
        let exprs = self.exp_list()?;
        self.expect(Tok::Do, "'do'")?;
        let block = self.block()?;
        self.expect_match(Tok::End, "'end'", "for", line)?;
        Ok(StatKind::GenericFor {
            names,
            exprs,
            block,
        })
    }

    fn func_name(&mut self) -> PResult<FuncName> {
        let mut path = vec![self.name()?];
        while self.eat(&Tok::Dot) {
            path.push(self.name()?);
        }
        let method = if self.eat(&Tok::Colon) {
            Some(self.name()?)
        } else {
            None
        };
        Ok(FuncName { path, method })
    }

    fn local_stat(&mut self) -> PResult<LocalStat> {
        let mut names = Vec::new();
        loop {
            let name = self.name()?;
            let attrib = if self.eat(&Tok::Lt) {
                let attr = self.name()?;
                self.expect(Tok::Gt, "'>'")?;
                match attr.name.as_str() {
                    "const" => Some(Attrib::Const),
                    "close" => Some(Attrib::Close),
                    other => {
                        return Err(ParseError {
                            line: attr.range.start.line,
                            column: attr.range.start.column,
                            message: format!("unknown attribute '{}'", other),
                        });
                    }
                }
            } else {
                None
            };
            names.push(LocalName { name, attrib });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        let exprs = if self.eat(&Tok::Assign) {
            self.exp_list()?
        } else {
            Vec::new()
        };
        Ok(LocalStat { names, exprs })
    }

    fn expr_stat(&mut self) -> PResult<StatKind> {
        let first = self.suffixed_exp()?;
        if self.check(&Tok::Assign) || self.check(&Tok::Comma) {
            let mut targets = vec![first];
            while self.eat(&Tok::Comma) {
                targets.push(self.suffixed_exp()?);
            }
            for target in &targets {
                if !matches!(target.kind, ExpKind::Name(_) | ExpKind::Index { .. }) {
                    return Err(ParseError {
                        line: target.range.start.line,
                        column: target.range.start.column,
                        message: "syntax error near '='".to_string(),
                    });
                }
            }
            self.expect(Tok::Assign, "'='")?;
            let exprs = self.exp_list()?;
            return Ok(StatKind::Assign { targets, exprs });
        }
        if !first.is_multi_value() || matches!(first.kind, ExpKind::Vararg) {
            return Err(ParseError {
                line: first.range.start.line,
                column: first.range.start.column,
                message: "syntax error: expression is not a statement".to_string(),
            });
        }
        Ok(StatKind::Call(first))
    }

    fn exp_list(&mut self) -> PResult<Vec<Exp>> {
        let mut list = vec![self.exp()?];
        while self.eat(&Tok::Comma) {
            list.push(self.exp()?);
        }
        Ok(list)
    }

    fn exp(&mut self) -> PResult<Exp> {
        self.sub_exp(0)
    }

    fn sub_exp(&mut self, limit: u8) -> PResult<Exp> {
        self.enter_level()?;
        let start = self.current_range();
        let unary = match self.peek() {
            Tok::Not => Some(UnOp::Not),
            Tok::Minus => Some(UnOp::Neg),
            Tok::Hash => Some(UnOp::Len),
            Tok::Tilde => Some(UnOp::BNot),
            _ => None,
        };
        let mut lhs = if let Some(op) = unary {
            self.advance();
            let operand = self.sub_exp(UNARY_PRIORITY)?;
            let range = start.cover(operand.range);
            Exp::new(
                ExpKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                range,
            )
        } else {
            self.simple_exp()?
        };
        while let Some((op, left, right)) = binary_priority(self.peek()) {
            if left <= limit {
                break;
            }
            self.advance();
            let rhs = self.sub_exp(right)?;
            let range = lhs.range.cover(rhs.range);
            lhs = Exp::new(
                ExpKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                range,
            );
        }
        self.leave_level();
        Ok(lhs)
    }

    fn simple_exp(&mut self) -> PResult<Exp> {
        let range = self.current_range();
        let kind = match self.peek().clone() {
            Tok::Number { value, is_float } => ExpKind::Number { value, is_float },
            Tok::String(s) => ExpKind::String(s),
            Tok::Nil => ExpKind::Nil,
            Tok::True => ExpKind::True,
            Tok::False => ExpKind::False,
            Tok::Ellipsis => ExpKind::Vararg,
            Tok::LBrace => return self.table_constructor(),
            Tok::Function => {
                self.advance();
                let body = self.function_body(range, false)?;
                let range = range.cover(body.range);
                return Ok(Exp::new(ExpKind::Function(Box::new(body)), range));
            }
            _ => return self.suffixed_exp(),
        };
        self.advance();
        Ok(Exp::new(kind, range))
    }

    fn primary_exp(&mut self) -> PResult<Exp> {
        let range = self.current_range();
        match self.peek().clone() {
            Tok::Name(name) => {
                self.advance();
                Ok(Exp::new(ExpKind::Name(name), range))
            }
            Tok::LParen => {
                self.advance();
                let inner = self.exp()?;
                self.expect_match(Tok::RParen, "')'", "(", range.start.line)?;
                let range = range.cover(self.prev_range());
                Ok(Exp::new(ExpKind::Paren(Box::new(inner)), range))
            }
            other => Err(self.error_here(format!("unexpected symbol near {}", other.describe()))),
        }
    }

    fn suffixed_exp(&mut self) -> PResult<Exp> {
        let mut exp = self.primary_exp()?;
        loop {
            match self.peek().clone() {
                Tok::Dot => {
                    self.advance();
                    let key = self.name()?;
                    let range = exp.range.cover(key.range);
                    exp = Exp::new(
                        ExpKind::Index {
                            obj: Box::new(exp),
                            key: Box::new(Exp::new(ExpKind::String(key.name), key.range)),
                            dotted: true,
                        },
                        range,
                    );
                }
                Tok::LBracket => {
                    self.advance();
                    let key = self.exp()?;
                    self.expect(Tok::RBracket, "']'")?;
                    let range = exp.range.cover(self.prev_range());
                    exp = Exp::new(
                        ExpKind::Index {
                            obj: Box::new(exp),
                            key: Box::new(key),
                            dotted: false,
                        },
                        range,
                    );
                }
                Tok::Colon => {
                    self.advance();
                    let method = self.name()?;
                    let args = self.call_args()?;
                    let range = exp.range.cover(self.prev_range());
                    exp = Exp::new(
                        ExpKind::MethodCall {
                            obj: Box::new(exp),
                            method,
                            args,
                        },
                        range,
                    );
                }
                Tok::LParen | Tok::String(_) | Tok::LBrace => {
                    let args = self.call_args()?;
                    let range = exp.range.cover(self.prev_range());
                    exp = Exp::new(
                        ExpKind::Call {
                            func: Box::new(exp),
                            args,
                        },
                        range,
                    );
                }
                _ => return Ok(exp),
            }
        }
    }

    fn call_args(&mut self) -> PResult<Vec<Exp>> {
        let range = self.current_range();
        match self.peek().clone() {
            Tok::String(s) => {
                self.advance();
                Ok(vec![Exp::new(ExpKind::String(s), range)])
            }
            Tok::LBrace => Ok(vec![self.table_constructor()?]),
            Tok::LParen => {
                self.advance();
                let args = if self.check(&Tok::RParen) {
                    Vec::new()
                } else {
                    self.exp_list()?
                };
                self.expect_match(Tok::RParen, "')'", "(", range.start.line)?;
                Ok(args)
            }
            other => Err(self.error_here(format!(
                "function arguments expected near {}",
                other.describe()
            ))),
        }
    }

    fn table_constructor(&mut self) -> PResult<Exp> {
        let open = self.expect(Tok::LBrace, "'{'")?.range;
        let mut fields = Vec::new();
        while !self.check(&Tok::RBrace) {
            let field = match (self.peek().clone(), self.peek_at(1).clone()) {
                (Tok::Name(_), Tok::Assign) => {
                    let key = self.name()?;
                    self.advance();
                    let value = self.exp()?;
                    Field::Named { key, value }
                }
                (Tok::LBracket, _) => {
                    self.advance();
                    let key = self.exp()?;
                    self.expect(Tok::RBracket, "']'")?;
                    self.expect(Tok::Assign, "'='")?;
                    let value = self.exp()?;
                    Field::Keyed { key, value }
                }
                _ => Field::Positional(self.exp()?),
            };
            fields.push(field);
            if !self.eat(&Tok::Comma) && !self.eat(&Tok::Semi) {
                break;
            }
        }
        self.expect_match(Tok::RBrace, "'}'", "{", open.start.line)?;
        Ok(Exp::new(
            ExpKind::Table(TableConstructor { fields }),
            open.cover(self.prev_range()),
        ))
    }

    fn function_body(&mut self, start: TextRange, is_method: bool) -> PResult<FunctionBody> {
        let line = start.start.line;
        self.expect(Tok::LParen, "'('")?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if is_method {
            // Implicit `self` has no source range of its own.
            params.push(Name {
                name: "self".to_string(),
                range: self.prev_range(),
            });
        }
        if !self.check(&Tok::RParen) {
            loop {
                if self.eat(&Tok::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.name()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;
        let block = self.block()?;
        self.expect_match(Tok::End, "'end'", "function", line)?;
        Ok(FunctionBody {
            params,
            is_vararg,
            block,
            range: start.cover(self.prev_range()),
        })
    }
}
