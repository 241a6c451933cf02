/*!

  Parser for the generic operation syntax:

  ```text
  %r = "dialect.op"(%a, %b) [^bb1] <{key = value}> ({
    ^bb0(%arg : i32):
      ...
  }) : (!pdl.value, !pdl.value) -> !pdl.operation
  ```

  The printer in this crate emits exactly this grammar, and the parser
  accepts everything the printer emits, so parse/print round-trips.

*/

use crate::core::attribute::{Attribute, SymbolRef};
use crate::core::ir::{BlockId, IrGraph, OpId, RegionId, ValueId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("parse error at {line}:{col}: {msg}")]
pub struct ParseError {
    pub msg: String,
    pub line: usize,
    pub col: usize,
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Percent(String),
    Caret(String),
    At(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Equal,
    Colon,
    ColonColon,
    Comma,
    Arrow,
    Bang,
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Lexer<'a> {
        Lexer {
            chars: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.col = 1;
            }
            Some(_) => self.col += 1,
            None => {}
        }
        c
    }

    fn error(&self, msg: &str) -> ParseError {
        ParseError {
            msg: msg.to_string(),
            line: self.line,
            col: self.col,
        }
    }

    fn lex(mut self) -> Result<Vec<(Tok, usize, usize)>, ParseError> {
        let mut out = Vec::new();
        loop {
            while let Some(c) = self.chars.peek() {
                if c.is_whitespace() {
                    self.bump();
                } else if *c == '/' {
                    // Line comments only.
                    self.bump();
                    if self.chars.peek() == Some(&'/') {
                        while let Some(c) = self.bump() {
                            if c == '\n' {
                                break;
                            }
                        }
                    } else {
                        return Err(self.error("unexpected `/`"));
                    }
                } else {
                    break;
                }
            }
            let (line, col) = (self.line, self.col);
            let c = match self.chars.peek() {
                None => {
                    out.push((Tok::Eof, line, col));
                    return Ok(out);
                }
                Some(c) => *c,
            };
            let tok = match c {
                '(' => {
                    self.bump();
                    Tok::LParen
                }
                ')' => {
                    self.bump();
                    Tok::RParen
                }
                '{' => {
                    self.bump();
                    Tok::LBrace
                }
                '}' => {
                    self.bump();
                    Tok::RBrace
                }
                '[' => {
                    self.bump();
                    Tok::LBracket
                }
                ']' => {
                    self.bump();
                    Tok::RBracket
                }
                '<' => {
                    self.bump();
                    Tok::Lt
                }
                '>' => {
                    self.bump();
                    Tok::Gt
                }
                '=' => {
                    self.bump();
                    Tok::Equal
                }
                ',' => {
                    self.bump();
                    Tok::Comma
                }
                '!' => {
                    self.bump();
                    Tok::Bang
                }
                ':' => {
                    self.bump();
                    if self.chars.peek() == Some(&':') {
                        self.bump();
                        Tok::ColonColon
                    } else {
                        Tok::Colon
                    }
                }
                '-' => {
                    self.bump();
                    match self.chars.peek() {
                        Some('>') => {
                            self.bump();
                            Tok::Arrow
                        }
                        Some(c) if c.is_ascii_digit() => {
                            let n = self.lex_int()?;
                            Tok::Int(-n)
                        }
                        _ => return Err(self.error("expected `->` or a number after `-`")),
                    }
                }
                '%' => {
                    self.bump();
                    Tok::Percent(self.lex_ident_text()?)
                }
                '^' => {
                    self.bump();
                    Tok::Caret(self.lex_ident_text()?)
                }
                '@' => {
                    self.bump();
                    Tok::At(self.lex_ident_text()?)
                }
                '"' => Tok::Str(self.lex_string()?),
                c if c.is_ascii_digit() => Tok::Int(self.lex_int()?),
                c if c.is_ascii_alphabetic() || c == '_' => Tok::Ident(self.lex_ident_text()?),
                _ => return Err(self.error(&format!("unexpected character `{}`", c))),
            };
            out.push((tok, line, col));
        }
    }

    fn lex_ident_text(&mut self) -> Result<String, ParseError> {
        let mut s = String::new();
        while let Some(c) = self.chars.peek() {
            if is_ident_char(*c) {
                s.push(*c);
                self.bump();
            } else {
                break;
            }
        }
        if s.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(s)
    }

    fn lex_int(&mut self) -> Result<i64, ParseError> {
        let mut s = String::new();
        while let Some(c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(*c);
                self.bump();
            } else {
                break;
            }
        }
        s.parse::<i64>()
            .map_err(|_| self.error("integer literal out of range"))
    }

    fn lex_string(&mut self) -> Result<String, ParseError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    _ => return Err(self.error("unknown escape sequence")),
                },
                Some(c) => s.push(c),
            }
        }
    }
}

pub struct Parser {
    toks: Vec<(Tok, usize, usize)>,
    pos: usize,
    values: HashMap<String, ValueId>,
}

impl Parser {
    pub fn new(input: &str) -> Result<Parser, ParseError> {
        Ok(Parser {
            toks: Lexer::new(input).lex()?,
            pos: 0,
            values: HashMap::new(),
        })
    }

    /// Parse a whole input into top-level operations of `g`.
    pub fn parse_module(input: &str, g: &mut IrGraph) -> Result<Vec<OpId>, ParseError> {
        let mut parser = Parser::new(input)?;
        let mut ops = Vec::new();
        while parser.peek() != &Tok::Eof {
            let (op, successors) = parser.parse_op(g)?;
            if !successors.is_empty() {
                return Err(parser.error("successors are only valid inside a region"));
            }
            g.push_top_op(op);
            ops.push(op);
        }
        Ok(ops)
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos].0
    }

    fn peek2(&self) -> &Tok {
        &self.toks[(self.pos + 1).min(self.toks.len() - 1)].0
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].0.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, msg: &str) -> ParseError {
        let (_, line, col) = self.toks[self.pos];
        ParseError {
            msg: msg.to_string(),
            line,
            col,
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ParseError> {
        if *self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}, found {:?}", tok, self.peek())))
        }
    }

    fn accept(&mut self, tok: Tok) -> bool {
        if *self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Parse one operation. Successor labels, if any, are returned for the
    /// enclosing region to resolve once all of its blocks are known.
    fn parse_op(&mut self, g: &mut IrGraph) -> Result<(OpId, Vec<String>), ParseError> {
        // Result bindings.
        let mut result_names: Vec<String> = Vec::new();
        if matches!(self.peek(), Tok::Percent(_)) {
            loop {
                match self.bump() {
                    Tok::Percent(name) => result_names.push(name),
                    _ => return Err(self.error("expected a result name")),
                }
                if !self.accept(Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::Equal)?;
        }

        let name = match self.bump() {
            Tok::Str(s) => s,
            _ => return Err(self.error("expected a quoted operation name")),
        };

        // Operands.
        self.expect(Tok::LParen)?;
        let mut operands = Vec::new();
        if !self.accept(Tok::RParen) {
            loop {
                match self.bump() {
                    Tok::Percent(n) => {
                        let v = self
                            .values
                            .get(&n)
                            .copied()
                            .ok_or_else(|| self.error(&format!("unknown value `%{}`", n)))?;
                        operands.push(v);
                    }
                    _ => return Err(self.error("expected an operand name")),
                }
                if self.accept(Tok::RParen) {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
        }

        // Successors.
        let mut successor_names = Vec::new();
        if self.accept(Tok::LBracket) {
            loop {
                match self.bump() {
                    Tok::Caret(n) => successor_names.push(n),
                    _ => return Err(self.error("expected a block label")),
                }
                if self.accept(Tok::RBracket) {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
        }

        // Properties.
        let mut attrs = Vec::new();
        if self.accept(Tok::Lt) {
            self.expect(Tok::LBrace)?;
            self.parse_attr_entries(&mut attrs)?;
            self.expect(Tok::RBrace)?;
            self.expect(Tok::Gt)?;
        }

        // Regions.
        let mut regions = Vec::new();
        if *self.peek() == Tok::LParen {
            self.bump();
            loop {
                let region = g.new_region();
                self.parse_region(g, region)?;
                regions.push(region);
                if self.accept(Tok::RParen) {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
        }

        // Trailing attribute dict.
        if self.accept(Tok::LBrace) {
            self.parse_attr_entries(&mut attrs)?;
            self.expect(Tok::RBrace)?;
        }

        // Function type.
        self.expect(Tok::Colon)?;
        self.expect(Tok::LParen)?;
        let mut operand_types = Vec::new();
        if !self.accept(Tok::RParen) {
            loop {
                operand_types.push(self.parse_type()?);
                if self.accept(Tok::RParen) {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
        }
        self.expect(Tok::Arrow)?;
        let mut result_types = Vec::new();
        if self.accept(Tok::LParen) {
            if !self.accept(Tok::RParen) {
                loop {
                    result_types.push(self.parse_type()?);
                    if self.accept(Tok::RParen) {
                        break;
                    }
                    self.expect(Tok::Comma)?;
                }
            }
        } else {
            result_types.push(self.parse_type()?);
        }

        if !result_names.is_empty() && result_names.len() != result_types.len() {
            return Err(self.error(&format!(
                "{} results bound but {} result types given",
                result_names.len(),
                result_types.len()
            )));
        }

        let op = g.create_op(Some(&name), operands, result_types, attrs, regions, vec![]);
        for (name, value) in result_names.iter().zip(g.results(op).to_vec()) {
            self.values.insert(name.clone(), value);
            if !name.chars().all(|c| c.is_ascii_digit()) {
                g.set_name_hint(value, name);
            }
        }

        Ok((op, successor_names))
    }

    fn parse_region(&mut self, g: &mut IrGraph, region: RegionId) -> Result<(), ParseError> {
        self.expect(Tok::LBrace)?;
        let mut labels: HashMap<String, BlockId> = HashMap::new();
        let mut fixups: Vec<PendingSuccessor> = Vec::new();

        // Anonymous entry block.
        if !matches!(self.peek(), Tok::Caret(_)) && *self.peek() != Tok::RBrace {
            let block = g.add_block(region, vec![]);
            self.parse_block_body(g, block, &mut fixups)?;
        }
        while let Tok::Caret(label) = self.peek().clone() {
            self.bump();
            let mut arg_types = Vec::new();
            let mut arg_names = Vec::new();
            if self.accept(Tok::LParen) {
                if !self.accept(Tok::RParen) {
                    loop {
                        match self.bump() {
                            Tok::Percent(n) => arg_names.push(n),
                            _ => return Err(self.error("expected a block argument name")),
                        }
                        self.expect(Tok::Colon)?;
                        arg_types.push(self.parse_type()?);
                        if self.accept(Tok::RParen) {
                            break;
                        }
                        self.expect(Tok::Comma)?;
                    }
                }
            }
            self.expect(Tok::Colon)?;
            let block = g.add_block(region, arg_types);
            for (name, value) in arg_names.iter().zip(g.block_args(block).to_vec()) {
                self.values.insert(name.clone(), value);
            }
            labels.insert(label, block);
            self.parse_block_body(g, block, &mut fixups)?;
        }
        self.expect(Tok::RBrace)?;

        for fixup in fixups {
            let mut blocks = Vec::new();
            for name in &fixup.successors {
                let block = labels
                    .get(name)
                    .copied()
                    .ok_or_else(|| self.error(&format!("unknown block label `^{}`", name)))?;
                blocks.push(block);
            }
            g.set_successors(fixup.op, blocks);
        }
        Ok(())
    }

    fn parse_block_body(
        &mut self,
        g: &mut IrGraph,
        block: BlockId,
        fixups: &mut Vec<PendingSuccessor>,
    ) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Tok::RBrace | Tok::Caret(_) => return Ok(()),
                _ => {
                    let (op, successors) = self.parse_op(g)?;
                    g.append_op(block, op);
                    if !successors.is_empty() {
                        fixups.push(PendingSuccessor { op, successors });
                    }
                }
            }
        }
    }

    fn parse_attr_entries(
        &mut self,
        out: &mut Vec<(String, Attribute)>,
    ) -> Result<(), ParseError> {
        if *self.peek() == Tok::RBrace {
            return Ok(());
        }
        loop {
            let key = match self.bump() {
                Tok::Ident(s) => s,
                Tok::Str(s) => s,
                _ => return Err(self.error("expected an attribute name")),
            };
            if self.accept(Tok::Equal) {
                let value = self.parse_attr()?;
                out.push((key, value));
            } else {
                out.push((key, Attribute::Unit));
            }
            if !self.accept(Tok::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_attr(&mut self) -> Result<Attribute, ParseError> {
        match self.peek().clone() {
            Tok::Int(v) => {
                self.bump();
                if *self.peek() == Tok::Colon {
                    self.bump();
                    let ty = self.parse_type()?;
                    Ok(Attribute::IntegerAttr(
                        Box::new(Attribute::Int(v)),
                        Box::new(ty),
                    ))
                } else {
                    Ok(Attribute::Int(v))
                }
            }
            Tok::Str(s) => {
                self.bump();
                Ok(Attribute::String(s))
            }
            Tok::LBracket => {
                self.bump();
                let mut items = Vec::new();
                if !self.accept(Tok::RBracket) {
                    loop {
                        items.push(self.parse_attr()?);
                        if self.accept(Tok::RBracket) {
                            break;
                        }
                        self.expect(Tok::Comma)?;
                    }
                }
                Ok(Attribute::Array(items))
            }
            Tok::LBrace => {
                self.bump();
                let mut entries = Vec::new();
                self.parse_attr_entries(&mut entries)?;
                self.expect(Tok::RBrace)?;
                Ok(Attribute::Dict(entries))
            }
            Tok::At(root) => {
                self.bump();
                let mut nested = Vec::new();
                while self.accept(Tok::ColonColon) {
                    match self.bump() {
                        Tok::At(n) => nested.push(n),
                        _ => return Err(self.error("expected `@name` after `::`")),
                    }
                }
                Ok(Attribute::SymbolRef(SymbolRef { root, nested }))
            }
            Tok::Ident(id) if id == "array" && *self.peek2() == Tok::Lt => {
                self.bump();
                self.expect(Tok::Lt)?;
                match self.bump() {
                    Tok::Ident(elem) if elem == "i32" || elem == "i64" => {}
                    _ => return Err(self.error("expected an element type in `array<...>`")),
                }
                let mut items = Vec::new();
                if self.accept(Tok::Colon) {
                    loop {
                        match self.bump() {
                            Tok::Int(v) => items.push(v as i32),
                            _ => return Err(self.error("expected an integer")),
                        }
                        if !self.accept(Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Tok::Gt)?;
                Ok(Attribute::DenseI32(items))
            }
            Tok::Ident(id) if id == "unit" => {
                self.bump();
                Ok(Attribute::Unit)
            }
            Tok::Ident(_) | Tok::Bang => self.parse_type(),
            _ => Err(self.error("expected an attribute value")),
        }
    }

    fn parse_type(&mut self) -> Result<Attribute, ParseError> {
        match self.bump() {
            Tok::Bang => {
                let name = match self.bump() {
                    Tok::Ident(s) => s,
                    _ => return Err(self.error("expected a type name after `!`")),
                };
                let mut params = Vec::new();
                if self.accept(Tok::Lt) {
                    loop {
                        params.push(self.parse_attr()?);
                        if self.accept(Tok::Gt) {
                            break;
                        }
                        self.expect(Tok::Comma)?;
                    }
                }
                Ok(Attribute::Parametric(name, params))
            }
            Tok::Ident(id) => {
                if id == "index" {
                    return Ok(Attribute::index_type());
                }
                if let Some(width) = id.strip_prefix('i') {
                    if let Ok(width) = width.parse::<i64>() {
                        return Ok(Attribute::integer_type(width));
                    }
                }
                Err(self.error(&format!("unknown type `{}`", id)))
            }
            _ => Err(self.error("expected a type")),
        }
    }
}

struct PendingSuccessor {
    op: OpId,
    successors: Vec<String>,
}
