//! Tokenizer: source text to a comma-terminated token stream.
//!
//! The tricky part of this module is not recognizing tokens but the automatic
//! separator insertion rule (see [`tokenize`]), which is what lets the grammar
//! stay uniformly comma-terminated regardless of whether the source used
//! newlines or literal commas.

use std::fmt;
use std::rc::Rc;

/// A source position. Carries the file name so error messages stay meaningful
/// across imported modules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pos {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
}

impl Pos {
    fn new(file: Rc<str>, line: u32, col: u32) -> Self {
        Self { file, line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokKind {
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Assign,
    NonlocalAssign,
    BranchArrow,
    PipeArrow,
    PushArrow,
    Ellipsis,
    QMark,
    Exclam,
    Empty,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    Pipe,
    Gt,
    Lt,
    Eq,
    Geq,
    Leq,
    Neq,
    If,
    Fn,
    With,
    Identifier,
    True,
    False,
    StringLit,
    IntLit,
    FloatLit,
}

impl fmt::Display for TokKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Comma => ",",
            Self::Dot => ".",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Colon => ":",
            Self::Assign => ":=",
            Self::NonlocalAssign => "<-",
            Self::BranchArrow => "->",
            Self::PipeArrow => "|>",
            Self::PushArrow => "<<",
            Self::Ellipsis => "...",
            Self::QMark => "?",
            Self::Exclam => "!",
            Self::Empty => "_",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Caret => "^",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
            Self::Geq => ">=",
            Self::Leq => "<=",
            Self::Neq => "!=",
            Self::If => "if",
            Self::Fn => "fn",
            Self::With => "with",
            Self::Identifier => "identifier",
            Self::True => "true",
            Self::False => "false",
            Self::StringLit => "string",
            Self::IntLit => "int",
            Self::FloatLit => "float",
        };
        f.write_str(s)
    }
}

/// Token kinds that forbid an implicit newline-to-comma promotion when they are
/// the most recently emitted token. See [`tokenize`].
fn forbids_separator(kind: TokKind) -> bool {
    matches!(
        kind,
        TokKind::Comma
            | TokKind::LParen
            | TokKind::LBracket
            | TokKind::LBrace
            | TokKind::Plus
            | TokKind::Minus
            | TokKind::Star
            | TokKind::Slash
            | TokKind::Percent
            | TokKind::Caret
            | TokKind::Amp
            | TokKind::Pipe
            | TokKind::Gt
            | TokKind::Lt
            | TokKind::Eq
            | TokKind::Geq
            | TokKind::Leq
            | TokKind::Neq
            | TokKind::Exclam
            | TokKind::Assign
            | TokKind::NonlocalAssign
            | TokKind::BranchArrow
            | TokKind::PipeArrow
            | TokKind::PushArrow
            | TokKind::Dot
            | TokKind::Colon
            | TokKind::If
            | TokKind::Fn
            | TokKind::With
    )
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    None,
    Str(Vec<u8>),
    Ident(Rc<str>),
    Int(i64),
    Float(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokKind,
    pub pos: Pos,
    pub payload: Payload,
}

impl Token {
    fn synthetic(kind: TokKind, pos: Pos) -> Self {
        Self { kind, pos, payload: Payload::None }
    }

    pub fn ident_name(&self) -> Rc<str> {
        match &self.payload {
            Payload::Ident(name) => name.clone(),
            _ => panic!("token {:?} has no identifier payload", self.kind),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Ident(name) => write!(f, "identifier `{name}`"),
            Payload::Str(_) => write!(f, "string literal"),
            Payload::Int(n) => write!(f, "integer `{n}`"),
            Payload::Float(n) => write!(f, "float `{n}`"),
            Payload::None => write!(f, "`{}`", self.kind),
        }
    }
}

struct Source {
    chars: Vec<char>,
    idx: usize,
    file: Rc<str>,
    line: u32,
    col: u32,
}

impl Source {
    fn new(source: &str, file: Rc<str>) -> Self {
        Self { chars: source.chars().collect(), idx: 0, file, line: 1, col: 1 }
    }

    fn is_eof(&self) -> bool {
        self.idx >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.idx).copied().unwrap_or('\0')
    }

    fn peek_ahead(&self, n: usize) -> char {
        self.chars.get(self.idx + n).copied().unwrap_or('\0')
    }

    fn next(&mut self) -> char {
        let c = self.peek();
        if !self.is_eof() {
            self.idx += 1;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        c
    }

    fn pos(&self) -> Pos {
        Pos::new(self.file.clone(), self.line, self.col)
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while !self.is_eof() && pred(self.peek()) {
            out.push(self.next());
        }
        out
    }

    /// Skips one run of insignificant whitespace or a single-line comment.
    /// Returns true if anything was consumed.
    fn skip_space_or_comment(&mut self) -> bool {
        if !self.is_eof() && self.peek().is_whitespace() {
            self.next();
            true
        } else if self.peek() == '/' && self.peek_ahead(1) == '/' {
            while !self.is_eof() && self.peek() != '\n' {
                self.next();
            }
            true
        } else {
            false
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '?' || c == '!'
}

fn read_string_literal(s: &mut Source) -> Vec<u8> {
    let mut bytes = Vec::new();
    while !s.is_eof() && s.peek() != '\'' {
        let c = s.next();
        if c == '\\' && !s.is_eof() {
            let esc = s.next();
            match esc {
                'n' => bytes.push(b'\n'),
                'r' => bytes.push(b'\r'),
                'f' => bytes.push(0x0c),
                't' => bytes.push(b'\t'),
                '\\' => bytes.push(b'\\'),
                '\'' => bytes.push(b'\''),
                other => {
                    bytes.push(b'\\');
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    if !s.is_eof() {
        s.next(); // closing quote; an unterminated string at EOF is tolerated
    }
    bytes
}

fn next_token(s: &mut Source) -> Token {
    let pos = s.pos();
    let c = s.next();
    let kind = match c {
        ',' => TokKind::Comma,
        '.' => {
            if s.peek() == '.' && s.peek_ahead(1) == '.' {
                s.next();
                s.next();
                TokKind::Ellipsis
            } else {
                TokKind::Dot
            }
        }
        '(' => TokKind::LParen,
        ')' => TokKind::RParen,
        '[' => TokKind::LBracket,
        ']' => TokKind::RBracket,
        '{' => TokKind::LBrace,
        '}' => TokKind::RBrace,
        ':' => {
            if s.peek() == '=' {
                s.next();
                TokKind::Assign
            } else {
                TokKind::Colon
            }
        }
        '<' => match s.peek() {
            '-' => {
                s.next();
                TokKind::NonlocalAssign
            }
            '=' => {
                s.next();
                TokKind::Leq
            }
            '<' => {
                s.next();
                TokKind::PushArrow
            }
            _ => TokKind::Lt,
        },
        '?' => TokKind::QMark,
        '!' => {
            if s.peek() == '=' {
                s.next();
                TokKind::Neq
            } else {
                TokKind::Exclam
            }
        }
        '+' => TokKind::Plus,
        '-' => {
            if s.peek() == '>' {
                s.next();
                TokKind::BranchArrow
            } else {
                TokKind::Minus
            }
        }
        '*' => TokKind::Star,
        '/' => TokKind::Slash,
        '%' => TokKind::Percent,
        '^' => TokKind::Caret,
        '&' => TokKind::Amp,
        '|' => {
            if s.peek() == '>' {
                s.next();
                TokKind::PipeArrow
            } else {
                TokKind::Pipe
            }
        }
        '>' => {
            if s.peek() == '=' {
                s.next();
                TokKind::Geq
            } else {
                TokKind::Gt
            }
        }
        '=' => TokKind::Eq,
        '\'' => {
            let payload = read_string_literal(s);
            return Token { kind: TokKind::StringLit, pos, payload: Payload::Str(payload) };
        }
        d if d.is_ascii_digit() => {
            let mut digits = d.to_string();
            digits.push_str(&s.read_while(|c| c.is_ascii_digit() || c == '.'));
            let dot_count = digits.bytes().filter(|b| *b == b'.').count();
            return if dot_count == 0 {
                // A digit run this long only fails to parse by overflowing
                // i64; the lexer stays permissive and saturates rather than
                // panicking on an otherwise well-formed literal.
                let n = digits.parse().unwrap_or(i64::MAX);
                Token { kind: TokKind::IntLit, pos, payload: Payload::Int(n) }
            } else if dot_count == 1 {
                let parsed: f64 = digits.parse().unwrap_or_else(|_| {
                    // a lone trailing `.` (e.g. "3.") is not accepted by all
                    // float parsers; pad it so the literal still has a meaning.
                    format!("{digits}0").parse().expect("padded float digits")
                });
                Token { kind: TokKind::FloatLit, pos, payload: Payload::Float(parsed) }
            } else {
                // malformed number: more than one '.' — lexer is permissive and
                // recovers by truncating at the first dot, letting the parser
                // surface a sensible error from the leftover tokens.
                let head = digits.split('.').next().unwrap_or("0");
                Token {
                    kind: TokKind::IntLit,
                    pos,
                    payload: Payload::Int(head.parse().unwrap_or(0)),
                }
            };
        }
        c if is_ident_start(c) => {
            let mut name = c.to_string();
            name.push_str(&s.read_while(is_ident_continue));
            return match name.as_str() {
                "_" => Token::synthetic(TokKind::Empty, pos),
                "if" => Token::synthetic(TokKind::If, pos),
                "fn" => Token::synthetic(TokKind::Fn, pos),
                "with" => Token::synthetic(TokKind::With, pos),
                "true" => Token::synthetic(TokKind::True, pos),
                "false" => Token::synthetic(TokKind::False, pos),
                _ => Token { kind: TokKind::Identifier, pos, payload: Payload::Ident(name.into()) },
            };
        }
        _ => {
            // Unrecognized characters are folded into an identifier-shaped token
            // so the lexer never hard-fails on stray input; the parser will
            // reject it with a useful message instead.
            Token { kind: TokKind::Identifier, pos: pos.clone(), payload: Payload::Ident(c.to_string().into()) }
        }
    };
    Token::synthetic(kind, pos)
}

/// Tokenizes `source`, returning a token stream that always ends in a `Comma`.
///
/// A leading `#!` line (shebang) is skipped entirely before tokenization
/// begins. See the module doc for the separator-insertion rule.
pub fn tokenize(source: &str, file_name: &str) -> Vec<Token> {
    let file: Rc<str> = file_name.into();
    let mut s = Source::new(source, file);

    if s.peek() == '#' && s.peek_ahead(1) == '!' {
        while !s.is_eof() && s.peek() != '\n' {
            s.next();
        }
    }

    while s.skip_space_or_comment() {}

    let mut tokens = Vec::new();
    let mut last = Token::synthetic(TokKind::Comma, s.pos());

    while !s.is_eof() {
        let mut next = next_token(&mut s);

        let closing = matches!(next.kind, TokKind::RParen | TokKind::RBracket | TokKind::RBrace);
        let last_is_opener =
            matches!(last.kind, TokKind::LParen | TokKind::LBracket | TokKind::LBrace | TokKind::Comma);
        if closing && !last_is_opener {
            tokens.push(Token::synthetic(TokKind::Comma, next.pos.clone()));
        }
        tokens.push(next.clone());

        loop {
            if s.is_eof() {
                break;
            }
            if s.peek() == '\n' {
                if !forbids_separator(next.kind) {
                    next = Token::synthetic(TokKind::Comma, s.pos());
                    tokens.push(next.clone());
                }
                s.next();
                continue;
            }
            if s.peek().is_whitespace() {
                s.next();
                continue;
            }
            if s.peek() == '/' && s.peek_ahead(1) == '/' {
                while !s.is_eof() && s.peek() != '\n' {
                    s.next();
                }
                continue;
            }
            break;
        }

        last = next;
    }

    if last.kind != TokKind::Comma {
        tokens.push(Token::synthetic(TokKind::Comma, s.pos()));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        tokenize(src, "test").into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn newline_becomes_comma() {
        assert_eq!(kinds("1\n2"), vec![TokKind::IntLit, TokKind::Comma, TokKind::IntLit, TokKind::Comma]);
    }

    #[test]
    fn newline_after_operator_does_not_insert_comma() {
        assert_eq!(
            kinds("1 +\n2"),
            vec![TokKind::IntLit, TokKind::Plus, TokKind::IntLit, TokKind::Comma]
        );
    }

    #[test]
    fn comma_inserted_before_closing_paren() {
        assert_eq!(
            kinds("f(a)"),
            vec![
                TokKind::Identifier,
                TokKind::LParen,
                TokKind::Identifier,
                TokKind::Comma,
                TokKind::RParen,
                TokKind::Comma
            ]
        );
    }

    #[test]
    fn empty_parens_get_no_spurious_comma() {
        assert_eq!(
            kinds("f()"),
            vec![TokKind::Identifier, TokKind::LParen, TokKind::RParen, TokKind::Comma]
        );
    }

    #[test]
    fn comment_does_not_reset_separator_rule() {
        // the newline after the comment should still be judged against `+`,
        // which forbids a separator, so no comma should appear.
        assert_eq!(
            kinds("1 + // comment\n2"),
            vec![TokKind::IntLit, TokKind::Plus, TokKind::IntLit, TokKind::Comma]
        );
    }

    #[test]
    fn shebang_is_skipped() {
        assert_eq!(kinds("#!/usr/bin/env glint\n1"), vec![TokKind::IntLit, TokKind::Comma]);
    }

    #[test]
    fn trailing_dot_is_a_float() {
        let toks = tokenize("3.", "test");
        assert_eq!(toks[0].kind, TokKind::FloatLit);
        match toks[0].payload {
            Payload::Float(f) => assert!((f - 3.0).abs() < f64::EPSILON),
            ref other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn malformed_number_recovers() {
        // more than one '.' is a malformed numeric literal; the lexer
        // truncates at the first dot rather than hard-failing.
        let toks = tokenize("1.2.3", "test");
        assert_eq!(toks[0].kind, TokKind::IntLit);
    }

    #[test]
    fn string_escapes() {
        let toks = tokenize("'a\\nb'", "test");
        match &toks[0].payload {
            Payload::Str(bytes) => assert_eq!(bytes, b"a\nb"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_still_produces_a_token() {
        let toks = tokenize("'abc", "test");
        assert_eq!(toks[0].kind, TokKind::StringLit);
    }
}
