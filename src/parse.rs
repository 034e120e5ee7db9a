//! Recursive-descent unit parser threaded with Pratt-style precedence climbing
//! for binary operators.
//!
//! The precedence climb keeps an explicit stack of "floors" rather than
//! threading a parameter through every call: entering any fresh sub-expression
//! (a call argument, a list element, an `if` target, ...) resets the floor to
//! zero, and only the binary-operator recursion itself pushes a higher floor
//! for its right operand.

use std::rc::Rc;

use crate::ast::{BinOp, Expr, FnDef, IfBranch, UnOp};
use crate::error::GlintError;
use crate::token::{Payload, TokKind, Token};

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    floor_stack: Vec<i32>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, idx: 0, floor_stack: Vec::new() }
    }

    fn at_eof(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.idx).unwrap_or_else(|| self.tokens.last().expect("non-empty token stream"))
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokKind) -> Result<Token, GlintError> {
        if self.peek().kind == kind {
            Ok(self.next())
        } else {
            let tok = self.peek().clone();
            Err(GlintError::parse(tok.pos.clone(), format!("expected `{kind}`, found {tok}")))
        }
    }

    fn unexpected(&self) -> GlintError {
        let tok = self.peek().clone();
        GlintError::parse(tok.pos.clone(), format!("unexpected {tok}"))
    }

    fn floor(&self) -> i32 {
        self.floor_stack.last().copied().unwrap_or(0)
    }

    fn with_floor<T>(
        &mut self,
        floor: i32,
        f: impl FnOnce(&mut Self) -> Result<T, GlintError>,
    ) -> Result<T, GlintError> {
        self.floor_stack.push(floor);
        let result = f(self);
        self.floor_stack.pop();
        result
    }

    /// Parses one full, comma-terminated expression: a statement, a list
    /// element, a call argument, an object entry, an `if` target/body, ...
    /// Always begins at precedence floor zero.
    fn parse_node(&mut self) -> Result<Expr, GlintError> {
        self.with_floor(0, Self::parse_node_inner)
    }

    fn parse_node_inner(&mut self) -> Result<Expr, GlintError> {
        let left = self.parse_postfix_unit()?;
        match self.peek().kind {
            TokKind::Assign | TokKind::NonlocalAssign => {
                let is_local = self.peek().kind == TokKind::Assign;
                let pos = self.next().pos;
                let right = self.parse_node()?;
                Ok(Expr::Assignment(pos, is_local, Box::new(left), Box::new(right)))
            }
            TokKind::PipeArrow => {
                let mut cur = left;
                while self.peek().kind == TokKind::PipeArrow {
                    let pos = self.next().pos;
                    let call = self.parse_postfix_unit()?;
                    cur = pipe_into(pos, call, cur)?;
                }
                Ok(cur)
            }
            _ => self.parse_binary(left),
        }
    }

    fn parse_binary(&mut self, mut left: Expr) -> Result<Expr, GlintError> {
        loop {
            let Some((op, prec)) = binop_for(self.peek().kind) else { break };
            if prec < self.floor() {
                break;
            }
            let pos = self.next().pos;
            let right = self.with_floor(prec + 1, |p| {
                let unit = p.parse_postfix_unit()?;
                p.parse_binary(unit)
            })?;
            left = Expr::Binary(pos, op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// A unit followed by any number of `.field` / `(args)` suffixes, which
    /// bind tighter than every binary operator.
    fn parse_postfix_unit(&mut self) -> Result<Expr, GlintError> {
        let mut e = self.parse_unit()?;
        loop {
            match self.peek().kind {
                TokKind::Dot => {
                    let pos = self.next().pos;
                    let key = self.parse_unit()?;
                    e = Expr::PropertyAccess(pos, Box::new(e), Box::new(key));
                }
                TokKind::LParen => {
                    let pos = self.next().pos;
                    let (args, rest) = self.parse_call_args()?;
                    e = Expr::FnCall(pos, Box::new(e), args, rest);
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Option<Box<Expr>>), GlintError> {
        let mut args = Vec::new();
        let mut rest = None;
        loop {
            if self.peek().kind == TokKind::RParen {
                self.next();
                break;
            }
            let e = self.parse_node()?;
            if self.peek().kind == TokKind::Ellipsis {
                self.next();
                rest = Some(Box::new(e));
            } else {
                args.push(e);
            }
            self.expect(TokKind::Comma)?;
        }
        Ok((args, rest))
    }

    fn parse_unit(&mut self) -> Result<Expr, GlintError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokKind::Empty => {
                self.next();
                Ok(Expr::Empty(tok.pos))
            }
            TokKind::QMark => {
                self.next();
                Ok(Expr::Null(tok.pos))
            }
            TokKind::True => {
                self.next();
                Ok(Expr::Bool(tok.pos, true))
            }
            TokKind::False => {
                self.next();
                Ok(Expr::Bool(tok.pos, false))
            }
            TokKind::IntLit => {
                self.next();
                let Payload::Int(n) = tok.payload else { unreachable!() };
                Ok(Expr::Int(tok.pos, n))
            }
            TokKind::FloatLit => {
                self.next();
                let Payload::Float(n) = tok.payload else { unreachable!() };
                Ok(Expr::Float(tok.pos, n))
            }
            TokKind::StringLit => {
                self.next();
                let Payload::Str(bytes) = tok.payload else { unreachable!() };
                Ok(Expr::Str(tok.pos, bytes))
            }
            TokKind::Identifier => {
                self.next();
                Ok(Expr::Identifier(tok.pos, tok.ident_name()))
            }
            TokKind::Colon => self.parse_atom(),
            TokKind::Minus | TokKind::Plus | TokKind::Exclam => self.parse_unary(),
            TokKind::LParen => self.parse_paren(),
            TokKind::LBracket => self.parse_list(),
            TokKind::LBrace => self.parse_brace_form(false),
            TokKind::Fn => self.parse_fn(),
            TokKind::If => self.parse_if(),
            TokKind::With => self.parse_with(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume ':'
        if self.peek().kind != TokKind::Identifier {
            return Err(GlintError::parse(pos, "expected an identifier after `:`"));
        }
        let name = self.next().ident_name();
        Ok(Expr::Atom(pos, name))
    }

    fn parse_unary(&mut self) -> Result<Expr, GlintError> {
        let tok = self.next();
        let op = match tok.kind {
            TokKind::Plus => UnOp::Plus,
            TokKind::Minus => UnOp::Minus,
            TokKind::Exclam => UnOp::Not,
            _ => unreachable!(),
        };
        let operand = self.parse_postfix_unit()?;
        Ok(Expr::Unary(tok.pos, op, Box::new(operand)))
    }

    fn parse_paren(&mut self) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume '('
        let mut exprs = Vec::new();
        if self.peek().kind == TokKind::RParen {
            self.next();
            return Ok(Expr::Block(pos, exprs));
        }
        loop {
            exprs.push(self.parse_node()?);
            match self.peek().kind {
                TokKind::Comma => {
                    self.next();
                    if self.peek().kind == TokKind::RParen {
                        self.next();
                        break;
                    }
                }
                TokKind::RParen => {
                    self.next();
                    break;
                }
                _ => return Err(self.unexpected()),
            }
        }
        Ok(Expr::Block(pos, exprs))
    }

    fn parse_list(&mut self) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume '['
        let mut elems = Vec::new();
        loop {
            if self.peek().kind == TokKind::RBracket {
                self.next();
                break;
            }
            elems.push(self.parse_node()?);
            self.expect(TokKind::Comma)?;
        }
        Ok(Expr::List(pos, elems))
    }

    /// Parses the body of `{ ... }`, disambiguating object literal from block
    /// per §4.2: empty `{}` is an empty object unless `force_block` is set
    /// (used for `fn` bodies, where an empty brace is an empty block).
    fn parse_brace_form(&mut self, force_block: bool) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume '{'
        if self.peek().kind == TokKind::RBrace {
            self.next();
            return Ok(if force_block { Expr::Block(pos, Vec::new()) } else { Expr::Object(pos, Vec::new()) });
        }
        let first = self.parse_node()?;
        if self.peek().kind == TokKind::Colon {
            self.next();
            let first_val = self.parse_node()?;
            let mut entries = vec![(first, first_val)];
            self.expect(TokKind::Comma)?;
            loop {
                if self.peek().kind == TokKind::RBrace {
                    self.next();
                    break;
                }
                let key = self.parse_node()?;
                self.expect(TokKind::Colon)?;
                let val = self.parse_node()?;
                entries.push((key, val));
                self.expect(TokKind::Comma)?;
            }
            Ok(Expr::Object(pos, entries))
        } else {
            let mut exprs = vec![first];
            self.expect(TokKind::Comma)?;
            loop {
                if self.peek().kind == TokKind::RBrace {
                    self.next();
                    break;
                }
                exprs.push(self.parse_node()?);
                self.expect(TokKind::Comma)?;
            }
            Ok(Expr::Block(pos, exprs))
        }
    }

    fn parse_fn(&mut self) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume 'fn'
        let name = if self.peek().kind == TokKind::Identifier { Some(self.next().ident_name()) } else { None };
        self.expect(TokKind::LParen)?;
        let (params, rest) = self.parse_fn_params()?;
        let body = if self.peek().kind == TokKind::LBrace { self.parse_brace_form(true)? } else { self.parse_node()? };
        Ok(Expr::Fn(pos.clone(), Rc::new(FnDef { name, params, rest, body, pos })))
    }

    fn parse_fn_params(&mut self) -> Result<(Vec<Rc<str>>, Option<Rc<str>>), GlintError> {
        let mut params = Vec::new();
        let mut rest = None;
        loop {
            if self.peek().kind == TokKind::RParen {
                self.next();
                break;
            }
            let name: Rc<str> = match self.peek().kind {
                TokKind::Identifier => self.next().ident_name(),
                TokKind::Empty => {
                    self.next();
                    "".into()
                }
                _ => return Err(self.unexpected()),
            };
            if self.peek().kind == TokKind::Ellipsis {
                self.next();
                rest = Some(name);
            } else {
                params.push(name);
            }
            self.expect(TokKind::Comma)?;
        }
        Ok((params, rest))
    }

    fn parse_if(&mut self) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume 'if'
        let cond = self.parse_node()?;
        self.expect(TokKind::LBrace)?;
        let mut branches = Vec::new();
        if self.peek().kind == TokKind::RBrace {
            self.next();
            return Ok(Expr::If(pos, Box::new(cond), branches));
        }
        loop {
            let mut targets = Vec::new();
            loop {
                targets.push(self.parse_node()?);
                if self.peek().kind == TokKind::BranchArrow {
                    self.next();
                    break;
                }
                self.expect(TokKind::Comma)?;
            }
            let body = Rc::new(self.parse_node()?);
            for target in targets {
                branches.push(IfBranch { target, body: body.clone() });
            }
            match self.peek().kind {
                TokKind::Comma => {
                    self.next();
                    if self.peek().kind == TokKind::RBrace {
                        self.next();
                        break;
                    }
                }
                TokKind::RBrace => {
                    self.next();
                    break;
                }
                _ => return Err(self.unexpected()),
            }
        }
        Ok(Expr::If(pos, Box::new(cond), branches))
    }

    fn parse_with(&mut self) -> Result<Expr, GlintError> {
        let pos = self.next().pos; // consume 'with'
        let call = self.parse_node()?;
        let extra = self.parse_node()?;
        match call {
            Expr::FnCall(cpos, callee, mut args, rest) => {
                args.push(extra);
                Ok(Expr::FnCall(cpos, callee, args, rest))
            }
            other => Err(GlintError::parse(pos, format!("`with` requires a call expression, found {other:?}"))),
        }
    }
}

fn binop_for(kind: TokKind) -> Option<(BinOp, i32)> {
    Some(match kind {
        TokKind::Percent => (BinOp::Mod, 80),
        TokKind::Star => (BinOp::Mul, 50),
        TokKind::Slash => (BinOp::Div, 50),
        TokKind::Plus => (BinOp::Add, 40),
        TokKind::Minus => (BinOp::Sub, 40),
        TokKind::Eq => (BinOp::Eq, 30),
        TokKind::Gt => (BinOp::Gt, 30),
        TokKind::Lt => (BinOp::Lt, 30),
        TokKind::Geq => (BinOp::Geq, 30),
        TokKind::Leq => (BinOp::Leq, 30),
        TokKind::Neq => (BinOp::Neq, 30),
        TokKind::Amp => (BinOp::And, 20),
        TokKind::Caret => (BinOp::Xor, 15),
        TokKind::Pipe => (BinOp::Or, 10),
        TokKind::PushArrow => (BinOp::Push, 1),
        _ => return None,
    })
}

fn pipe_into(pos: crate::token::Pos, call: Expr, piped: Expr) -> Result<Expr, GlintError> {
    match call {
        Expr::FnCall(cpos, callee, mut args, rest) => {
            args.insert(0, piped);
            Ok(Expr::FnCall(cpos, callee, args, rest))
        }
        other => Err(GlintError::parse(pos, format!("`|>` right side must be a call, found {other:?}"))),
    }
}

/// Parses a full token stream into the top-level sequence of expressions.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Expr>, GlintError> {
    let mut p = Parser::new(tokens);
    let mut exprs = Vec::new();
    while !p.at_eof() {
        exprs.push(p.parse_node()?);
        p.expect(TokKind::Comma)?;
    }
    Ok(exprs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn parse_src(src: &str) -> Vec<Expr> {
        parse(tokenize(src, "test")).expect("parse should succeed")
    }

    #[test]
    fn left_associative_same_precedence() {
        let exprs = parse_src("1 - 2 - 3");
        match &exprs[0] {
            Expr::Binary(_, BinOp::Sub, l, r) => {
                assert!(matches!(**r, Expr::Int(_, 3)));
                assert!(matches!(**l, Expr::Binary(_, BinOp::Sub, ..)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn precedence_climb() {
        let exprs = parse_src("1 + 2 * 3");
        match &exprs[0] {
            Expr::Binary(_, BinOp::Add, l, r) => {
                assert!(matches!(**l, Expr::Int(_, 1)));
                assert!(matches!(**r, Expr::Binary(_, BinOp::Mul, ..)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pipeline_desugars_to_nested_calls() {
        let exprs = parse_src("10 |> add(20) |> add(100)");
        match &exprs[0] {
            Expr::FnCall(_, _, outer_args, _) => {
                assert_eq!(outer_args.len(), 2);
                assert!(matches!(outer_args[0], Expr::FnCall(..)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_branches_are_split_per_target() {
        let exprs = parse_src("if 12 { 10, 5+7, 3 -> :yes, _ -> :no }");
        match &exprs[0] {
            Expr::If(_, _, branches) => assert_eq!(branches.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_braces_is_empty_object() {
        let exprs = parse_src("{}");
        assert!(matches!(exprs[0], Expr::Object(_, ref entries) if entries.is_empty()));
    }

    #[test]
    fn empty_fn_body_is_empty_block_not_object() {
        let exprs = parse_src("fn() {}");
        match &exprs[0] {
            Expr::Fn(_, def) => assert!(matches!(def.body, Expr::Block(_, ref e) if e.is_empty())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn computed_property_key() {
        let exprs = parse_src("arr.(len(arr))");
        assert!(matches!(exprs[0], Expr::PropertyAccess(_, _, ref k) if matches!(**k, Expr::FnCall(..))));
    }

    #[test]
    fn rest_call_argument() {
        let exprs = parse_src("f(a, b...)");
        match &exprs[0] {
            Expr::FnCall(_, _, args, rest) => {
                assert_eq!(args.len(), 1);
                assert!(rest.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
