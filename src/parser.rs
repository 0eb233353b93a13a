// ABOUTME: Recursive-descent parser turning a token stream into an AST

use crate::ast::*;
use crate::error::InterpError;
use crate::token::{Token, TokenKind};

pub fn parse_program(tokens: Vec<Token>) -> Result<Program, InterpError> {
    let mut p = Parser::new(tokens);
    p.program()
}

pub fn parse_unit(tokens: Vec<Token>) -> Result<Unit, InterpError> {
    let mut p = Parser::new(tokens);
    p.unit()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn err(&self, message: impl Into<String>) -> InterpError {
        let tok = self.peek();
        InterpError::parse(message, tok.line, tok.column)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, InterpError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.err(format!(
                "expected {:?}, found {:?} ('{}')",
                kind,
                self.peek_kind(),
                self.peek().lexeme
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, InterpError> {
        if self.check(&TokenKind::Identifier) {
            Ok(self.advance().lexeme)
        } else {
            Err(self.err(format!(
                "expected identifier, found {:?} ('{}')",
                self.peek_kind(),
                self.peek().lexeme
            )))
        }
    }

    fn lower_ident_is(&self, name: &str) -> bool {
        self.check(&TokenKind::Identifier) && self.peek().lexeme.eq_ignore_ascii_case(name)
    }

    // ===== top level =====

    fn program(&mut self) -> Result<Program, InterpError> {
        self.expect(TokenKind::Program)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Semicolon)?;

        let uses = self.maybe_uses_clause()?;
        let decls = self.declarations_until(&[TokenKind::Begin])?;
        let block = self.compound_statement()?;
        self.expect(TokenKind::Dot)?;

        Ok(Program {
            name,
            uses,
            decls,
            block,
        })
    }

    fn unit(&mut self) -> Result<Unit, InterpError> {
        self.expect(TokenKind::Unit)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Semicolon)?;

        self.expect(TokenKind::Interface)?;
        let interface_uses = self.maybe_uses_clause()?;
        let interface_decls = self.declarations_until(&[TokenKind::Implementation])?;

        self.expect(TokenKind::Implementation)?;
        let implementation_uses = self.maybe_uses_clause()?;
        let implementation_decls = self.declarations_until(&[
            TokenKind::Initialization,
            TokenKind::Finalization,
            TokenKind::End,
        ])?;

        // `statement_list_until` consumes its own stop token, so the unit's
        // closing `end` (and a `finalization` keyword reached while scanning
        // the initialization section) is swallowed before we ever see it.
        let mut initialization = None;
        let mut finalization = None;
        let mut end_consumed = false;

        if self.check(&TokenKind::Initialization) {
            self.advance();
            let (stmts, matched) =
                self.statement_list_until(&[TokenKind::Finalization, TokenKind::End])?;
            initialization = Some(stmts);
            if matched == TokenKind::End {
                end_consumed = true;
            } else {
                let (fstmts, _) = self.statement_list_until(&[TokenKind::End])?;
                finalization = Some(fstmts);
                end_consumed = true;
            }
        } else if self.check(&TokenKind::Finalization) {
            self.advance();
            let (stmts, _) = self.statement_list_until(&[TokenKind::End])?;
            finalization = Some(stmts);
            end_consumed = true;
        }

        if !end_consumed {
            self.expect(TokenKind::End)?;
        }
        self.expect(TokenKind::Dot)?;

        Ok(Unit {
            name,
            interface_uses,
            interface_decls,
            implementation_uses,
            implementation_decls,
            initialization,
            finalization,
        })
    }

    fn maybe_uses_clause(&mut self) -> Result<Vec<String>, InterpError> {
        if !self.check(&TokenKind::Uses) {
            return Ok(Vec::new());
        }
        self.advance();
        let mut names = vec![self.expect_ident()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.expect_ident()?);
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(names)
    }

    /// Parses an interleaved sequence of type-sections, var-sections, and
    /// routine declarations until one of `stop`'s token kinds is seen.
    fn declarations_until(&mut self, stop: &[TokenKind]) -> Result<Declarations, InterpError> {
        let mut decls = Declarations::default();
        loop {
            if stop.iter().any(|k| self.check(k)) {
                break;
            }
            match self.peek_kind() {
                TokenKind::Type => self.type_section(&mut decls)?,
                TokenKind::Const => self.const_section()?,
                TokenKind::Var => self.var_section(&mut decls)?,
                TokenKind::Procedure => {
                    let d = self.proc_decl()?;
                    decls.procs.push(d);
                }
                TokenKind::Function => {
                    let d = self.func_decl()?;
                    decls.funcs.push(d);
                }
                _ => {
                    return Err(self.err(format!(
                        "unexpected token in declarations: {:?}",
                        self.peek_kind()
                    )))
                }
            }
        }
        Ok(decls)
    }

    /// `const` sections are parsed (so programs using them don't fail to
    /// parse) but constants aren't part of this subset's data model; the
    /// value is simply discarded, matching spec.md's declared Non-goal.
    fn const_section(&mut self) -> Result<(), InterpError> {
        self.expect(TokenKind::Const)?;
        while self.check(&TokenKind::Identifier) {
            self.expect_ident()?;
            self.expect(TokenKind::Equal)?;
            self.expr()?;
            self.expect(TokenKind::Semicolon)?;
        }
        Ok(())
    }

    fn type_section(&mut self, decls: &mut Declarations) -> Result<(), InterpError> {
        self.expect(TokenKind::Type)?;
        while self.check(&TokenKind::Identifier) {
            let name = self.expect_ident()?;
            self.expect(TokenKind::Equal)?;

            if self.check(&TokenKind::Record) {
                self.advance();
                let fields = self.field_list()?;
                self.expect(TokenKind::End)?;
                decls.record_types.push(RecordTypeDecl { name, fields });
            } else if self.check(&TokenKind::LParen) {
                self.advance();
                let mut members = vec![self.expect_ident()?];
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    members.push(self.expect_ident()?);
                }
                self.expect(TokenKind::RParen)?;
                decls.enum_types.push(EnumTypeDecl { name, members });
            } else {
                return Err(self.err("expected 'record' or an enum member list in type definition"));
            }
            self.expect(TokenKind::Semicolon)?;
        }
        Ok(())
    }

    fn field_list(&mut self) -> Result<Vec<(Vec<String>, String)>, InterpError> {
        let mut fields = Vec::new();
        while self.check(&TokenKind::Identifier) {
            let mut names = vec![self.expect_ident()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                names.push(self.expect_ident()?);
            }
            self.expect(TokenKind::Colon)?;
            let type_name = self.type_ident()?;
            fields.push((names, type_name));
            // The field before `end` may omit its trailing semicolon.
            if self.check(&TokenKind::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(fields)
    }

    fn var_section(&mut self, decls: &mut Declarations) -> Result<(), InterpError> {
        self.expect(TokenKind::Var)?;
        let mut anon_counter = 0usize;
        while self.check(&TokenKind::Identifier) {
            let mut names = vec![self.expect_ident()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                names.push(self.expect_ident()?);
            }
            self.expect(TokenKind::Colon)?;
            self.var_type(&names, decls, &mut anon_counter)?;
            self.expect(TokenKind::Semicolon)?;
        }
        Ok(())
    }

    /// Parses the type half of one var-section entry and pushes the
    /// resulting declaration into `decls`.
    fn var_type(
        &mut self,
        names: &[String],
        decls: &mut Declarations,
        anon_counter: &mut usize,
    ) -> Result<(), InterpError> {
        match self.peek_kind().clone() {
            TokenKind::Array => {
                self.advance();
                self.expect(TokenKind::LBracket)?;
                let mut dims = vec![self.range()?];
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    dims.push(self.range()?);
                }
                self.expect(TokenKind::RBracket)?;
                self.expect(TokenKind::Of)?;
                let element_type = self.type_ident()?;
                decls.array_vars.push(ArrayVarDecl {
                    names: names.to_vec(),
                    dims,
                    element_type,
                });
            }
            TokenKind::Record => {
                self.advance();
                let fields = self.field_list()?;
                self.expect(TokenKind::End)?;
                *anon_counter += 1;
                let synth_name = format!("${}$anon{}", names.join("_"), anon_counter);
                decls.record_types.push(RecordTypeDecl {
                    name: synth_name.clone(),
                    fields,
                });
                decls.record_vars.push(RecordVarDecl {
                    names: names.to_vec(),
                    record_type_name: synth_name,
                });
            }
            TokenKind::Caret => {
                self.advance();
                let pointed_type = self.type_ident()?;
                decls.pointer_vars.push(PointerVarDecl {
                    names: names.to_vec(),
                    pointed_type,
                });
            }
            TokenKind::Set => {
                self.advance();
                self.expect(TokenKind::Of)?;
                let element_type = self.type_ident()?;
                decls.set_vars.push(SetVarDecl {
                    names: names.to_vec(),
                    element_type,
                });
            }
            TokenKind::Text => {
                self.advance();
                decls.file_vars.push(FileVarDecl {
                    names: names.to_vec(),
                    is_text: true,
                    element_type: None,
                });
            }
            TokenKind::File => {
                self.advance();
                self.expect(TokenKind::Of)?;
                let element_type = self.type_ident()?;
                decls.file_vars.push(FileVarDecl {
                    names: names.to_vec(),
                    is_text: false,
                    element_type: Some(element_type),
                });
            }
            TokenKind::Identifier => {
                let type_name = self.expect_ident()?;
                decls.simple_vars.push(VarDecl {
                    names: names.to_vec(),
                    type_name,
                });
            }
            other => {
                return Err(self.err(format!("expected a type, found {:?}", other)));
            }
        }
        Ok(())
    }

    fn range(&mut self) -> Result<(i64, i64), InterpError> {
        let lo = self.int_literal()?;
        self.expect(TokenKind::DotDot)?;
        let hi = self.int_literal()?;
        Ok((lo, hi))
    }

    fn int_literal(&mut self) -> Result<i64, InterpError> {
        match self.peek_kind().clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(v)
            }
            TokenKind::Minus => {
                self.advance();
                let v = self.int_literal()?;
                Ok(-v)
            }
            other => Err(self.err(format!("expected integer literal, found {:?}", other))),
        }
    }

    /// A type identifier in a position requiring a simple named type
    /// (array element type, pointer target, set element type, file
    /// element type, function return type).
    fn type_ident(&mut self) -> Result<String, InterpError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier => Ok(self.advance().lexeme),
            TokenKind::Text => {
                self.advance();
                Ok("text".to_string())
            }
            other => Err(self.err(format!("expected a type name, found {:?}", other))),
        }
    }

    // ===== routines =====

    fn param_list(&mut self) -> Result<Vec<Param>, InterpError> {
        if !self.check(&TokenKind::LParen) {
            return Ok(Vec::new());
        }
        self.advance();
        if self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            let by_ref = if self.check(&TokenKind::Var) {
                self.advance();
                true
            } else {
                false
            };
            let mut names = vec![self.expect_ident()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                names.push(self.expect_ident()?);
            }
            self.expect(TokenKind::Colon)?;
            let type_name = self.type_ident()?;
            params.push(Param {
                names,
                type_name,
                by_ref,
            });
            if self.check(&TokenKind::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn proc_decl(&mut self) -> Result<ProcDecl, InterpError> {
        self.expect(TokenKind::Procedure)?;
        let name = self.expect_ident()?;
        let params = self.param_list()?;
        self.expect(TokenKind::Semicolon)?;

        let local_decls = self.declarations_until(&[TokenKind::Begin])?;
        let body = Some(self.compound_statement()?);
        self.expect(TokenKind::Semicolon)?;

        Ok(ProcDecl {
            name,
            params,
            local_decls,
            body,
        })
    }

    fn func_decl(&mut self) -> Result<FuncDecl, InterpError> {
        self.expect(TokenKind::Function)?;
        let name = self.expect_ident()?;
        let params = self.param_list()?;
        self.expect(TokenKind::Colon)?;
        let return_type = self.type_ident()?;
        self.expect(TokenKind::Semicolon)?;

        let local_decls = self.declarations_until(&[TokenKind::Begin])?;
        let body = Some(self.compound_statement()?);
        self.expect(TokenKind::Semicolon)?;

        Ok(FuncDecl {
            name,
            params,
            return_type,
            local_decls,
            body,
        })
    }

    // ===== statements =====

    fn compound_statement(&mut self) -> Result<Block, InterpError> {
        self.expect(TokenKind::Begin)?;
        let (stmts, _) = self.statement_list_until(&[TokenKind::End])?;
        Ok(stmts)
    }

    /// Parses statements separated by `;` until one of `stop` is seen, then
    /// consumes that terminator and reports which one matched (callers that
    /// branch on which of several possible terminators ended a section need
    /// to know this, since the token is gone by the time they look).
    fn statement_list_until(&mut self, stop: &[TokenKind]) -> Result<(Block, TokenKind), InterpError> {
        let mut stmts = Vec::new();
        loop {
            while self.check(&TokenKind::Semicolon) {
                self.advance();
            }
            if let Some(matched) = stop.iter().find(|k| self.check(k)).cloned() {
                self.expect(matched.clone())?;
                return Ok((stmts, matched));
            }
            let stmt = self.statement()?;
            stmts.push(stmt);
            if self.check(&TokenKind::Semicolon) {
                self.advance();
            } else if let Some(matched) = stop.iter().find(|k| self.check(k)).cloned() {
                self.expect(matched.clone())?;
                return Ok((stmts, matched));
            } else {
                return Err(self.err(format!(
                    "expected ';' or block terminator, found {:?}",
                    self.peek_kind()
                )));
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, InterpError> {
        match self.peek_kind().clone() {
            TokenKind::Begin => Ok(Stmt::Compound(self.compound_statement()?)),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Repeat => self.repeat_statement(),
            TokenKind::Case => self.case_statement(),
            TokenKind::With => self.with_statement(),
            TokenKind::Goto => {
                self.advance();
                let label = self.expect_ident_or_int_label()?;
                Ok(Stmt::Goto(label))
            }
            TokenKind::Assign => self.file_assign_statement(),
            TokenKind::Reset => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let f = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Stmt::FileReset(f))
            }
            TokenKind::Rewrite => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let f = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Stmt::FileRewrite(f))
            }
            TokenKind::Close => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let f = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Stmt::FileClose(f))
            }
            TokenKind::New => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let name = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Stmt::New(name))
            }
            TokenKind::Dispose => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let name = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Stmt::Dispose(name))
            }
            TokenKind::Page
            | TokenKind::Get
            | TokenKind::Put
            | TokenKind::Pack
            | TokenKind::Unpack => self.unsupported_builtin_statement(),
            TokenKind::Identifier => self.identifier_led_statement(),
            other => Err(self.err(format!("unexpected token at start of statement: {:?}", other))),
        }
    }

    fn expect_ident_or_int_label(&mut self) -> Result<String, InterpError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier => Ok(self.advance().lexeme),
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(v.to_string())
            }
            other => Err(self.err(format!("expected a label, found {:?}", other))),
        }
    }

    /// `pack`/`unpack`/`get`/`put`/`page` parse but are rejected at
    /// evaluation time.
    fn unsupported_builtin_statement(&mut self) -> Result<Stmt, InterpError> {
        let name = self.advance().lexeme;
        let mut args = Vec::new();
        if self.check(&TokenKind::LParen) {
            self.advance();
            if !self.check(&TokenKind::RParen) {
                args.push(self.expr()?);
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    args.push(self.expr()?);
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        Ok(Stmt::UnsupportedBuiltin { name, args })
    }

    fn if_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::If)?;
        let cond = self.expr()?;
        self.expect(TokenKind::Then)?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::While)?;
        let cond = self.expr()?;
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn for_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::For)?;
        let var_name = self.expect_ident()?;
        self.expect(TokenKind::Assign_)?;
        let start = self.expr()?;
        let downto = if self.check(&TokenKind::To) {
            self.advance();
            false
        } else {
            self.expect(TokenKind::Downto)?;
            true
        };
        let end = self.expr()?;
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            var_name,
            start,
            end,
            downto,
            body,
        })
    }

    fn repeat_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::Repeat)?;
        let (body, _) = self.statement_list_until(&[TokenKind::Until])?;
        let cond = self.expr()?;
        Ok(Stmt::Repeat { body, cond })
    }

    fn case_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::Case)?;
        let selector = self.expr()?;
        self.expect(TokenKind::Of)?;

        let mut branches = Vec::new();
        let mut else_branch = None;

        loop {
            if self.check(&TokenKind::Else) {
                self.advance();
                else_branch = Some(self.statement_list_until_case_end()?);
                break;
            }
            if self.check(&TokenKind::End) {
                break;
            }
            let mut labels = vec![self.case_label()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                labels.push(self.case_label()?);
            }
            self.expect(TokenKind::Colon)?;
            let body = Box::new(self.statement()?);
            branches.push(CaseBranch { labels, body });
            if self.check(&TokenKind::Semicolon) {
                self.advance();
            }
        }
        self.expect(TokenKind::End)?;
        Ok(Stmt::Case {
            selector,
            branches,
            else_branch,
        })
    }

    /// Statements under `else` in a `case` block, up to (not consuming) `end`.
    fn statement_list_until_case_end(&mut self) -> Result<Block, InterpError> {
        let mut stmts = Vec::new();
        loop {
            while self.check(&TokenKind::Semicolon) {
                self.advance();
            }
            if self.check(&TokenKind::End) {
                break;
            }
            stmts.push(self.statement()?);
            if self.check(&TokenKind::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(stmts)
    }

    fn case_label(&mut self) -> Result<CaseLabel, InterpError> {
        let first = self.expr()?;
        if self.check(&TokenKind::DotDot) {
            self.advance();
            let last = self.expr()?;
            Ok(CaseLabel::Range(first, last))
        } else {
            Ok(CaseLabel::Value(first))
        }
    }

    fn with_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::With)?;
        let mut record_vars = vec![self.expect_ident()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            record_vars.push(self.expect_ident()?);
        }
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::With { record_vars, body })
    }

    fn file_assign_statement(&mut self) -> Result<Stmt, InterpError> {
        self.expect(TokenKind::Assign)?;
        self.expect(TokenKind::LParen)?;
        let file_var = self.expect_ident()?;
        self.expect(TokenKind::Comma)?;
        let filename = self.expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Stmt::FileAssign { file_var, filename })
    }

    /// Statements that start with a plain identifier: write/writeln/read/
    /// readln (matched by case-insensitive name), a labeled statement, or
    /// an assignment/procedure-call form.
    fn identifier_led_statement(&mut self) -> Result<Stmt, InterpError> {
        if self.lower_ident_is("write") || self.lower_ident_is("writeln") {
            return self.write_statement();
        }
        if self.lower_ident_is("read") || self.lower_ident_is("readln") {
            return self.read_statement();
        }

        if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Colon) {
            let label = self.advance().lexeme;
            self.advance(); // ':'
            let stmt = self.statement()?;
            return Ok(Stmt::Labeled(label, Box::new(stmt)));
        }

        let name = self.expect_ident()?;

        if self.check(&TokenKind::LParen) {
            let args = self.call_args()?;
            return Ok(Stmt::ProcCall { name, args });
        }

        if self.check(&TokenKind::Caret) {
            self.advance();
            self.expect(TokenKind::Assign_)?;
            let value = self.expr()?;
            return Ok(Stmt::Assign(LValue::Deref(name), value));
        }

        if self.check(&TokenKind::LBracket) {
            self.advance();
            let mut indices = vec![self.expr()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                indices.push(self.expr()?);
            }
            self.expect(TokenKind::RBracket)?;
            if self.check(&TokenKind::Dot) {
                self.advance();
                let field = self.expect_ident()?;
                self.expect(TokenKind::Assign_)?;
                let value = self.expr()?;
                return Ok(Stmt::Assign(LValue::ArrayField(name, indices, field), value));
            }
            self.expect(TokenKind::Assign_)?;
            let value = self.expr()?;
            return Ok(Stmt::Assign(LValue::Indexed(name, indices), value));
        }

        if self.check(&TokenKind::Dot) {
            self.advance();
            let field = self.expect_ident()?;
            self.expect(TokenKind::Assign_)?;
            let value = self.expr()?;
            return Ok(Stmt::Assign(LValue::Field(name, field), value));
        }

        self.expect(TokenKind::Assign_)?;
        let value = self.expr()?;
        Ok(Stmt::Assign(LValue::Simple(name), value))
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, InterpError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            args.push(self.expr()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                args.push(self.expr()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    /// Console `write`/`writeln` only; the file-targeted forms are produced
    /// separately as `Stmt::FileWrite` by the evaluator's statement
    /// handling is out of scope here since the parser performs no type
    /// lookups, so any `write(f, ...)` is parsed as console output whose
    /// first argument happens to be a file-valued expression.
    fn write_statement(&mut self) -> Result<Stmt, InterpError> {
        let newline = self.lower_ident_is("writeln");
        self.advance();
        if self.check(&TokenKind::LParen) {
            self.advance();
            if self.check(&TokenKind::RParen) {
                self.advance();
                return Ok(Stmt::Write {
                    args: Vec::new(),
                    newline,
                });
            }
            let mut args = vec![self.expr()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                args.push(self.expr()?);
            }
            self.expect(TokenKind::RParen)?;
            return Ok(Stmt::Write { args, newline });
        }
        Ok(Stmt::Write {
            args: Vec::new(),
            newline,
        })
    }

    fn read_statement(&mut self) -> Result<Stmt, InterpError> {
        let newline = self.lower_ident_is("readln");
        self.advance();
        let mut targets = Vec::new();
        if self.check(&TokenKind::LParen) {
            self.advance();
            if !self.check(&TokenKind::RParen) {
                targets.push(self.lvalue()?);
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    targets.push(self.lvalue()?);
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        Ok(Stmt::Read { targets, newline })
    }

    fn lvalue(&mut self) -> Result<LValue, InterpError> {
        let name = self.expect_ident()?;
        if self.check(&TokenKind::LBracket) {
            self.advance();
            let mut indices = vec![self.expr()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                indices.push(self.expr()?);
            }
            self.expect(TokenKind::RBracket)?;
            return Ok(LValue::Indexed(name, indices));
        }
        if self.check(&TokenKind::Dot) {
            self.advance();
            let field = self.expect_ident()?;
            return Ok(LValue::Field(name, field));
        }
        Ok(LValue::Simple(name))
    }

    // ===== expressions =====

    fn expr(&mut self) -> Result<Expr, InterpError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, InterpError> {
        let mut lhs = self.and_expr()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, InterpError> {
        let mut lhs = self.comparison_expr()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let rhs = self.comparison_expr()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison_expr(&mut self) -> Result<Expr, InterpError> {
        let lhs = self.additive_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Equal => BinOp::Eq,
            TokenKind::NotEqual => BinOp::Ne,
            TokenKind::Less => BinOp::Lt,
            TokenKind::Greater => BinOp::Gt,
            TokenKind::LessEqual => BinOp::Le,
            TokenKind::GreaterEqual => BinOp::Ge,
            TokenKind::In => {
                self.advance();
                let rhs = self.additive_expr()?;
                return Ok(Expr::In(Box::new(lhs), Box::new(rhs)));
            }
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.additive_expr()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive_expr(&mut self) -> Result<Expr, InterpError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.multiplicative_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, InterpError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::RealDiv,
                TokenKind::Div => BinOp::IntDiv,
                TokenKind::Mod => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, InterpError> {
        match self.peek_kind() {
            TokenKind::Plus => {
                self.advance();
                Ok(Expr::Unary(UnOp::Plus, Box::new(self.unary_expr()?)))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.unary_expr()?)))
            }
            TokenKind::Not => {
                self.advance();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.unary_expr()?)))
            }
            TokenKind::At => {
                self.advance();
                Ok(Expr::AddrOf(Box::new(self.unary_expr()?)))
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Result<Expr, InterpError> {
        let mut e = self.primary_expr()?;
        while self.check(&TokenKind::Caret) {
            self.advance();
            e = Expr::Deref(Box::new(e));
        }
        Ok(e)
    }

    fn primary_expr(&mut self) -> Result<Expr, InterpError> {
        match self.peek_kind().clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(Expr::IntLit(v))
            }
            TokenKind::RealLiteral(v) => {
                self.advance();
                Ok(Expr::RealLit(v))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expr::StrLit(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit(false))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Eof => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let name = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Eof(name))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    items.push(self.expr()?);
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        items.push(self.expr()?);
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::SetLit(items))
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                let mut e = if self.check(&TokenKind::LParen) {
                    let args = self.call_args()?;
                    Expr::Call(name, args)
                } else if self.check(&TokenKind::LBracket) {
                    self.advance();
                    let mut indices = vec![self.expr()?];
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        indices.push(self.expr()?);
                    }
                    self.expect(TokenKind::RBracket)?;
                    Expr::Index(name, indices)
                } else {
                    Expr::Ident(name)
                };
                while self.check(&TokenKind::Dot) {
                    self.advance();
                    let field = self.expect_ident()?;
                    e = Expr::Field(Box::new(e), field);
                }
                Ok(e)
            }
            other => Err(self.err(format!("unexpected token in expression: {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn parse_src(src: &str) -> Program {
        parse_program(scan(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_minimal_program() {
        let p = parse_src("program P; begin end.");
        assert_eq!(p.name, "P");
        assert!(p.block.is_empty());
    }

    #[test]
    fn parses_var_section_and_assignment() {
        let p = parse_src("program P; var x: integer; begin x := 5+3*2 end.");
        assert_eq!(p.decls.simple_vars.len(), 1);
        assert_eq!(p.decls.simple_vars[0].names, vec!["x".to_string()]);
        assert_eq!(p.block.len(), 1);
    }

    #[test]
    fn parses_for_loop() {
        let p = parse_src("program P; var i: integer; begin for i:=1 to 3 do writeln(i) end.");
        match &p.block[0] {
            Stmt::For { downto, .. } => assert!(!downto),
            _ => panic!("expected for statement"),
        }
    }

    #[test]
    fn parses_function_with_params() {
        let p =
            parse_src("program P; function F(n:integer):integer; begin F:=n end; begin end.");
        assert_eq!(p.decls.funcs.len(), 1);
        assert_eq!(p.decls.funcs[0].params[0].names, vec!["n".to_string()]);
        assert_eq!(p.decls.funcs[0].return_type, "integer");
    }

    #[test]
    fn parses_array_var_decl() {
        let p = parse_src("program P; var a: array[1..10] of integer; begin end.");
        assert_eq!(p.decls.array_vars[0].dims, vec![(1, 10)]);
    }

    #[test]
    fn parses_record_type_and_var() {
        let p = parse_src(
            "program P; type Point = record x, y: integer end; var p: Point; begin end.",
        );
        assert_eq!(p.decls.record_types[0].name, "Point");
        assert_eq!(p.decls.simple_vars[0].type_name, "Point");
    }

    #[test]
    fn parses_pointer_and_new_dispose() {
        let p = parse_src("program P; var p: ^integer; begin new(p); p^:=7; dispose(p) end.");
        assert_eq!(p.decls.pointer_vars[0].pointed_type, "integer");
        assert!(matches!(p.block[0], Stmt::New(_)));
        assert!(matches!(p.block[2], Stmt::Dispose(_)));
    }

    #[test]
    fn parses_case_statement() {
        let p = parse_src(
            "program P; var x:integer; begin case x of 1: x:=1; 2..4: x:=2; else x:=3 end end.",
        );
        match &p.block[0] {
            Stmt::Case {
                branches,
                else_branch,
                ..
            } => {
                assert_eq!(branches.len(), 2);
                assert!(else_branch.is_some());
            }
            _ => panic!("expected case statement"),
        }
    }

    #[test]
    fn parse_error_reports_position() {
        let err = parse_program(scan("program P begin end.").unwrap()).unwrap_err();
        match err {
            InterpError::Parse { .. } => {}
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn parses_unit_form() {
        let tokens = scan(
            "unit U; interface var x: integer; implementation initialization x := 1 end.",
        )
        .unwrap();
        let u = parse_unit(tokens).unwrap();
        assert_eq!(u.name, "U");
        assert_eq!(u.interface_decls.simple_vars.len(), 1);
    }
}
