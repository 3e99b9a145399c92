//! Tokenizer for Lua source text
//!
//! Produces a flat token list plus every comment encountered, so the
//! comment table can be built without a second scan.

use super::ast::{Position, TextRange};
use super::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    String(String),
    Number { value: f64, is_float: bool },
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    Ampersand,
    Tilde,
    Pipe,
    Shl,
    Shr,
    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semi,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,
    Eof,
}

impl Tok {
    pub fn describe(&self) -> String {
        match self {
            Tok::Name(n) => format!("'{}'", n),
            Tok::String(_) => "string".to_string(),
            Tok::Number { .. } => "number".to_string(),
            Tok::Eof => "<eof>".to_string(),
            other => format!("'{}'", symbol_text(other)),
        }
    }
}

fn symbol_text(tok: &Tok) -> &'static str {
    match tok {
        Tok::And => "and",
        Tok::Break => "break",
        Tok::Do => "do",
        Tok::Else => "else",
        Tok::Elseif => "elseif",
        Tok::End => "end",
        Tok::False => "false",
        Tok::For => "for",
        Tok::Function => "function",
        Tok::Goto => "goto",
        Tok::If => "if",
        Tok::In => "in",
        Tok::Local => "local",
        Tok::Nil => "nil",
        Tok::Not => "not",
        Tok::Or => "or",
        Tok::Repeat => "repeat",
        Tok::Return => "return",
        Tok::Then => "then",
        Tok::True => "true",
        Tok::Until => "until",
        Tok::While => "while",
        Tok::Plus => "+",
        Tok::Minus => "-",
        Tok::Star => "*",
        Tok::Slash => "/",
        Tok::DoubleSlash => "//",
        Tok::Percent => "%",
        Tok::Caret => "^",
        Tok::Hash => "#",
        Tok::Ampersand => "&",
        Tok::Tilde => "~",
        Tok::Pipe => "|",
        Tok::Shl => "<<",
        Tok::Shr => ">>",
        Tok::EqEq => "==",
        Tok::NotEq => "~=",
        Tok::Le => "<=",
        Tok::Ge => ">=",
        Tok::Lt => "<",
        Tok::Gt => ">",
        Tok::Assign => "=",
        Tok::LParen => "(",
        Tok::RParen => ")",
        Tok::LBrace => "{",
        Tok::RBrace => "}",
        Tok::LBracket => "[",
        Tok::RBracket => "]",
        Tok::DoubleColon => "::",
        Tok::Semi => ";",
        Tok::Colon => ":",
        Tok::Comma => ",",
        Tok::Dot => ".",
        Tok::Concat => "..",
        Tok::Ellipsis => "...",
        _ => "?",
    }
}

fn keyword(word: &str) -> Option<Tok> {
    let tok = match word {
        "and" => Tok::And,
        "break" => Tok::Break,
        "do" => Tok::Do,
        "else" => Tok::Else,
        "elseif" => Tok::Elseif,
        "end" => Tok::End,
        "false" => Tok::False,
        "for" => Tok::For,
        "function" => Tok::Function,
        "goto" => Tok::Goto,
        "if" => Tok::If,
        "in" => Tok::In,
        "local" => Tok::Local,
        "nil" => Tok::Nil,
        "not" => Tok::Not,
        "or" => Tok::Or,
        "repeat" => Tok::Repeat,
        "return" => Tok::Return,
        "then" => Tok::Then,
        "true" => Tok::True,
        "until" => Tok::Until,
        "while" => Tok::While,
        _ => return None,
    };
    Some(tok)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub range: TextRange,
}

/// A raw comment; `text` excludes the leading `--` and any long brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub range: TextRange,
    /// Code precedes the comment on its first line.
    pub trailing: bool,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    code_on_line: bool,
    comments: Vec<Comment>,
}

#[derive(Debug)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 0,
            line_start: 0,
            code_on_line: false,
            comments: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<LexOutput, ParseError> {
        let mut tokens = Vec::new();
        // A leading `#!` line is ignored by the reference interpreter.
        if self.src.starts_with(b"#") {
            while self.peek(0).is_some_and(|c| c != b'\n' && c != b'\r') {
                self.pos += 1;
            }
        }
        loop {
            self.skip_trivia()?;
            let start = self.position();
            let Some(c) = self.peek(0) else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    range: TextRange::new(start, start),
                });
                break;
            };
            self.code_on_line = true;
            let tok = self.next_token(c)?;
            tokens.push(Token {
                tok,
                range: TextRange::new(start, self.position()),
            });
        }
        Ok(LexOutput {
            tokens,
            comments: self.comments,
        })
    }

    fn position(&self) -> Position {
        Position::new(self.line, (self.pos - self.line_start) as u32)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let pos = self.position();
        ParseError {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    fn newline(&mut self) {
        let c = self.src[self.pos];
        self.pos += 1;
        if let Some(next) = self.peek(0) {
            if (next == b'\n' || next == b'\r') && next != c {
                self.pos += 1;
            }
        }
        self.line += 1;
        self.line_start = self.pos;
        self.code_on_line = false;
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek(0) {
            match c {
                b'\n' | b'\r' => self.newline(),
                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                b'-' if self.peek(1) == Some(b'-') => self.comment()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn comment(&mut self) -> Result<(), ParseError> {
        let start = self.position();
        let trailing = self.code_on_line;
        self.pos += 2;
        let text = if let Some(level) = self.long_bracket_level() {
            self.long_bracket_body(level)?
        } else {
            let begin = self.pos;
            while self.peek(0).is_some_and(|c| c != b'\n' && c != b'\r') {
                self.pos += 1;
            }
            String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned()
        };
        self.comments.push(Comment {
            text,
            range: TextRange::new(start, self.position()),
            trailing,
        });
        Ok(())
    }

    /// At `[`, returns the level of a long bracket `[==[` without consuming it.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek(0) != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek(1 + level) == Some(b'=') {
            level += 1;
        }
        (self.peek(1 + level) == Some(b'[')).then_some(level)
    }

    fn long_bracket_body(&mut self, level: usize) -> Result<String, ParseError> {
        self.pos += level + 2;
        if matches!(self.peek(0), Some(b'\n' | b'\r')) {
            self.newline();
        }
        let mut out = Vec::new();
        loop {
            match self.peek(0) {
                None => return Err(self.error("unfinished long string or comment")),
                Some(b']') => {
                    let mut eq = 0;
                    while self.peek(1 + eq) == Some(b'=') {
                        eq += 1;
                    }
                    if eq == level && self.peek(1 + eq) == Some(b']') {
                        self.pos += level + 2;
                        return Ok(String::from_utf8_lossy(&out).into_owned());
                    }
                    out.push(b']');
                    self.pos += 1;
                }
                Some(b'\n' | b'\r') => {
                    out.push(b'\n');
                    self.newline();
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn next_token(&mut self, c: u8) -> Result<Tok, ParseError> {
        if c.is_ascii_alphabetic() || c == b'_' {
            let begin = self.pos;
            while self
                .peek(0)
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.pos += 1;
            }
            let word = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
            return Ok(keyword(&word).unwrap_or(Tok::Name(word)));
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.number();
        }
        if c == b'"' || c == b'\'' {
            return self.short_string(c);
        }
        if c == b'[' {
            if let Some(level) = self.long_bracket_level() {
                return Ok(Tok::String(self.long_bracket_body(level)?));
            }
        }

        let two = [c, self.peek(1).unwrap_or(0)];
        let (tok, len) = match &two {
            b"//" => (Tok::DoubleSlash, 2),
            b"<<" => (Tok::Shl, 2),
            b">>" => (Tok::Shr, 2),
            b"==" => (Tok::EqEq, 2),
            b"~=" => (Tok::NotEq, 2),
            b"<=" => (Tok::Le, 2),
            b">=" => (Tok::Ge, 2),
            b"::" => (Tok::DoubleColon, 2),
            b".." if self.peek(2) == Some(b'.') => (Tok::Ellipsis, 3),
            b".." => (Tok::Concat, 2),
            _ => {
                let tok = match c {
                    b'+' => Tok::Plus,
                    b'-' => Tok::Minus,
                    b'*' => Tok::Star,
                    b'/' => Tok::Slash,
                    b'%' => Tok::Percent,
                    b'^' => Tok::Caret,
                    b'#' => Tok::Hash,
                    b'&' => Tok::Ampersand,
                    b'~' => Tok::Tilde,
                    b'|' => Tok::Pipe,
                    b'<' => Tok::Lt,
                    b'>' => Tok::Gt,
                    b'=' => Tok::Assign,
                    b'(' => Tok::LParen,
                    b')' => Tok::RParen,
                    b'{' => Tok::LBrace,
                    b'}' => Tok::RBrace,
                    b'[' => Tok::LBracket,
                    b']' => Tok::RBracket,
                    b';' => Tok::Semi,
                    b':' => Tok::Colon,
                    b',' => Tok::Comma,
                    b'.' => Tok::Dot,
                    other => {
                        return Err(self.error(format!(
                            "unexpected symbol near '{}'",
                            other as char
                        )));
                    }
                };
                (tok, 1)
            }
        };
        self.pos += len;
        Ok(tok)
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let begin = self.pos;
        let hex = self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X'));
        if hex {
            self.pos += 2;
        }
        let (exp_lo, exp_hi) = if hex { (b'p', b'P') } else { (b'e', b'E') };
        loop {
            match self.peek(0) {
                Some(c) if c == exp_lo || c == exp_hi => {
                    self.pos += 1;
                    if matches!(self.peek(0), Some(b'+' | b'-')) {
                        self.pos += 1;
                    }
                }
                Some(c) if c.is_ascii_hexdigit() || c == b'.' => self.pos += 1,
                _ => break,
            }
        }
        if self
            .peek(0)
            .is_some_and(|c| c.is_ascii_alphabetic() || c == b'_')
        {
            return Err(self.error("malformed number"));
        }
        let text = String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned();
        parse_number(&text).ok_or_else(|| self.error(format!("malformed number near '{}'", text)))
    }

    fn short_string(&mut self, quote: u8) -> Result<Tok, ParseError> {
        self.pos += 1;
        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error("unfinished string"));
            };
            match c {
                b'\n' | b'\r' => return Err(self.error("unfinished string")),
                b'\\' => {
                    self.pos += 1;
                    self.escape(&mut out)?;
                }
                c if c == quote => {
                    self.pos += 1;
                    break;
                }
                c => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(Tok::String(String::from_utf8_lossy(&out).into_owned()))
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> Result<(), ParseError> {
        let Some(c) = self.peek(0) else {
            return Err(self.error("unfinished string"));
        };
        let simple = match c {
            b'n' => Some(b'\n'),
            b't' => Some(b'\t'),
            b'r' => Some(b'\r'),
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0c),
            b'v' => Some(0x0b),
            b'\\' => Some(b'\\'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            _ => None,
        };
        if let Some(byte) = simple {
            out.push(byte);
            self.pos += 1;
            return Ok(());
        }
        match c {
            b'\n' | b'\r' => {
                out.push(b'\n');
                self.newline();
            }
            b'z' => {
                self.pos += 1;
                while let Some(c) = self.peek(0) {
                    match c {
                        b'\n' | b'\r' => self.newline(),
                        c if c.is_ascii_whitespace() => self.pos += 1,
                        _ => break,
                    }
                }
            }
            b'x' => {
                self.pos += 1;
                let digits = self.take_while(2, |c| c.is_ascii_hexdigit());
                let value = u8::from_str_radix(&digits, 16)
                    .map_err(|_| self.error("hexadecimal digit expected"))?;
                out.push(value);
            }
            b'u' => {
                self.pos += 1;
                if self.peek(0) != Some(b'{') {
                    return Err(self.error("missing '{' in \\u{xxxx}"));
                }
                self.pos += 1;
                let digits = self.take_while(8, |c| c.is_ascii_hexdigit());
                if self.peek(0) != Some(b'}') {
                    return Err(self.error("missing '}' in \\u{xxxx}"));
                }
                self.pos += 1;
                let code = u32::from_str_radix(&digits, 16)
                    .map_err(|_| self.error("hexadecimal digit expected"))?;
                let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            c if c.is_ascii_digit() => {
                let digits = self.take_while(3, |c| c.is_ascii_digit());
                let value: u32 = digits.parse().unwrap_or(0);
                if value > 255 {
                    return Err(self.error("decimal escape too large"));
                }
                out.push(value as u8);
            }
            _ => return Err(self.error("invalid escape sequence")),
        }
        Ok(())
    }

    fn take_while(&mut self, max: usize, pred: impl Fn(u8) -> bool) -> String {
        let begin = self.pos;
        while self.pos - begin < max && self.peek(0).is_some_and(&pred) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[begin..self.pos]).into_owned()
    }
}

fn parse_number(text: &str) -> Option<Tok> {
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        if !hex.contains(['.', 'p']) {
            // Hex integers wrap around like the reference implementation.
            let mut value: u64 = 0;
            for c in hex.chars() {
                value = value.wrapping_mul(16).wrapping_add(c.to_digit(16)? as u64);
            }
            return Some(Tok::Number {
                value: value as i64 as f64,
                is_float: false,
            });
        }
        let (mantissa, exponent) = match hex.split_once('p') {
            Some((m, e)) => (m, e.parse::<i32>().ok()?),
            None => (hex, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let mut value = 0f64;
        for c in int_part.chars() {
            value = value * 16.0 + c.to_digit(16)? as f64;
        }
        let mut scale = 1.0 / 16.0;
        for c in frac_part.chars() {
            value += c.to_digit(16)? as f64 * scale;
            scale /= 16.0;
        }
        return Some(Tok::Number {
            value: value * 2f64.powi(exponent),
            is_float: true,
        });
    }
    let is_float = lower.contains(['.', 'e']);
    let value = lower.parse::<f64>().ok()?;
    Some(Tok::Number { value, is_float })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .tokens
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn lexes_keywords_names_and_symbols() {
        assert_eq!(
            toks("local x = a.b .. ..."),
            vec![
                Tok::Local,
                Tok::Name("x".into()),
                Tok::Assign,
                Tok::Name("a".into()),
                Tok::Dot,
                Tok::Name("b".into()),
                Tok::Concat,
                Tok::Ellipsis,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            toks("10 0x10 1.5 2e2")[..4],
            [
                Tok::Number {
                    value: 10.0,
                    is_float: false
                },
                Tok::Number {
                    value: 16.0,
                    is_float: false
                },
                Tok::Number {
                    value: 1.5,
                    is_float: true
                },
                Tok::Number {
                    value: 200.0,
                    is_float: true
                },
            ]
        );
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(toks(r#""a\tb" 'c\65'"#)[..2], [
            Tok::String("a\tb".into()),
            Tok::String("cA".into())
        ]);
    }

    #[test]
    fn long_string_skips_first_newline() {
        assert_eq!(toks("[==[\nhello]]x]==]")[0], Tok::String("hello]]x".into()));
    }

    #[test]
    fn collects_comments_with_trailing_flag() {
        let out = Lexer::new("-- head\nlocal x -- tail\n--[[ long\ncomment ]]")
            .tokenize()
            .unwrap();
        let comments = out.comments;
        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].text, " head");
        assert!(!comments[0].trailing);
        assert!(comments[1].trailing);
        assert_eq!(comments[2].range.start.line, 2);
        assert_eq!(comments[2].range.end.line, 3);
    }

    #[test]
    fn positions_are_zero_based() {
        let out = Lexer::new("a\n  bb").tokenize().unwrap();
        assert_eq!(out.tokens[1].range, TextRange::from_coords(1, 2, 1, 4));
    }

    #[test]
    fn unfinished_string_is_an_error() {
        let err = Lexer::new("x = 'abc").tokenize().unwrap_err();
        assert!(err.message.contains("unfinished string"));
    }
}
