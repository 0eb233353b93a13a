// ABOUTME: Tree-walking evaluator executing a parsed program against the runtime environment

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write as IoWrite};

use crate::ast::*;
use crate::env::{Environment, FileMode};
use crate::error::InterpError;
use crate::units::{import_unit, UnitLoader};
use crate::value::{ArrayValue, Value};

/// Metadata about declared composite variables needed at runtime but not
/// carried by `Value` itself (element/field/target types).
#[derive(Default)]
struct TypeInfo {
    record_types: HashMap<String, RecordTypeDecl>,
    array_elem_types: HashMap<String, String>,
    pointer_target_types: HashMap<String, String>,
    var_type_names: HashMap<String, String>,
    enum_type_names: std::collections::HashSet<String>,
}

enum RoutineDef {
    Proc(ProcDecl),
    Func(FuncDecl),
}

pub struct Interpreter {
    env: Environment,
    routines: HashMap<String, RoutineDef>,
    types: TypeInfo,
    stdout: io::Stdout,
}

/// Runs a parsed program to completion, executing its top-level block.
pub fn execute(program: &Program, loader: Option<&dyn UnitLoader>) -> Result<(), InterpError> {
    let mut interp = Interpreter::new();
    for name in &program.uses {
        let loader = loader.ok_or_else(|| {
            InterpError::Name(format!("no unit loader configured to resolve unit '{}'", name))
        })?;
        let unit = loader
            .load(name)
            .ok_or_else(|| InterpError::Name(format!("unknown unit '{}'", name)))?;
        import_unit(&mut interp, &unit)?;
    }
    interp.register_declarations(&program.decls)?;
    let result = interp.exec_block(&program.block);
    interp.close_all_files();
    result
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            env: Environment::new(),
            routines: HashMap::new(),
            types: TypeInfo::default(),
            stdout: io::stdout(),
        }
    }

    pub fn env(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Registers every declaration kind in `decls`: record/enum types feed
    /// the type table and (for enums) the environment's ordinal table; var
    /// declarations of every shape get their default value; routines are
    /// added to the routine table under their case-insensitive name.
    pub fn register_declarations(&mut self, decls: &Declarations) -> Result<(), InterpError> {
        for rt in &decls.record_types {
            self.types
                .record_types
                .insert(rt.name.to_ascii_lowercase(), rt.clone());
        }
        for et in &decls.enum_types {
            self.types
                .enum_type_names
                .insert(et.name.to_ascii_lowercase());
            for (ord, member) in et.members.iter().enumerate() {
                self.env.define_enum_member(member, ord as i64);
            }
        }
        for v in &decls.simple_vars {
            for name in &v.names {
                self.types
                    .var_type_names
                    .insert(name.to_ascii_lowercase(), v.type_name.clone());
                let value = self.default_for_named_type(&v.type_name);
                self.env.define_local(name, value);
            }
        }
        for v in &decls.array_vars {
            for name in &v.names {
                self.types
                    .array_elem_types
                    .insert(name.to_ascii_lowercase(), v.element_type.clone());
                let count: i64 = v.dims.iter().map(|(lo, hi)| hi - lo + 1).product();
                let elem_default = self.default_for_named_type(&v.element_type);
                let elems = (0..count.max(0)).map(|_| elem_default.deep_clone()).collect();
                let arr = ArrayValue {
                    dims: v.dims.clone(),
                    elems,
                };
                self.env
                    .define_local(name, Value::Array(std::rc::Rc::new(std::cell::RefCell::new(arr))));
            }
        }
        for v in &decls.record_vars {
            for name in &v.names {
                let value = self.default_record(&v.record_type_name)?;
                self.env.define_local(name, value);
            }
        }
        for v in &decls.pointer_vars {
            for name in &v.names {
                self.types
                    .pointer_target_types
                    .insert(name.to_ascii_lowercase(), v.pointed_type.clone());
                self.env.define_local(name, Value::Pointer(None));
            }
        }
        for v in &decls.set_vars {
            for name in &v.names {
                self.env.define_local(name, Value::Set(BTreeSet::new()));
            }
        }
        for v in &decls.file_vars {
            for name in &v.names {
                self.env.define_local(name, Value::Nil);
                self.env.assign_file(name, String::new());
                let _ = v.is_text;
            }
        }
        for p in &decls.procs {
            self.routines
                .insert(p.name.to_ascii_lowercase(), RoutineDef::Proc(p.clone()));
        }
        for f in &decls.funcs {
            self.routines
                .insert(f.name.to_ascii_lowercase(), RoutineDef::Func(f.clone()));
        }
        Ok(())
    }

    fn default_for_named_type(&self, type_name: &str) -> Value {
        let lower = type_name.to_ascii_lowercase();
        if self.types.record_types.contains_key(&lower) {
            return self.default_record(type_name).unwrap_or(Value::Nil);
        }
        if self.types.enum_type_names.contains(&lower) {
            return Value::Integer(0);
        }
        Value::default_for_type(type_name)
    }

    fn default_record(&self, type_name: &str) -> Result<Value, InterpError> {
        let lower = type_name.to_ascii_lowercase();
        let decl = self
            .types
            .record_types
            .get(&lower)
            .ok_or_else(|| InterpError::Type(format!("unknown record type '{}'", type_name)))?;
        let mut fields = HashMap::new();
        for (names, field_type) in &decl.fields {
            for n in names {
                fields.insert(n.to_ascii_lowercase(), self.default_for_named_type(field_type));
            }
        }
        Ok(Value::Record(std::rc::Rc::new(std::cell::RefCell::new(
            fields,
        ))))
    }

    fn close_all_files(&mut self) {
        let names: Vec<String> = self.env.file_names();
        for name in names {
            if let Some(handle) = self.env.file_mut(&name) {
                if let Some(w) = handle.writer.take() {
                    let mut w = w;
                    let _ = w.flush();
                }
                handle.mode = FileMode::Closed;
                handle.lines = None;
            }
        }
    }

    // ===== statements =====

    pub fn exec_block(&mut self, block: &Block) -> Result<(), InterpError> {
        for stmt in block {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), InterpError> {
        match stmt {
            Stmt::Assign(lvalue, expr) => {
                let value = self.eval_expr(expr)?.deep_clone();
                self.assign_lvalue(lvalue, value)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_truthy(cond)? {
                    self.exec_stmt(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::While { cond, body } => {
                while self.eval_truthy(cond)? {
                    self.exec_stmt(body)?;
                }
                Ok(())
            }
            Stmt::Repeat { body, cond } => loop {
                self.exec_block(body)?;
                if self.eval_truthy(cond)? {
                    return Ok(());
                }
            },
            Stmt::For {
                var_name,
                start,
                end,
                downto,
                body,
            } => {
                let start_v = self
                    .eval_expr(start)?
                    .as_int()
                    .ok_or_else(|| InterpError::Type("for-loop bound must be an integer".into()))?;
                let end_v = self
                    .eval_expr(end)?
                    .as_int()
                    .ok_or_else(|| InterpError::Type("for-loop bound must be an integer".into()))?;
                let mut i = start_v;
                if *downto {
                    while i >= end_v {
                        self.env.set(var_name, Value::Integer(i)).or_else(|_| {
                            self.env.define_local(var_name, Value::Integer(i));
                            Ok::<(), InterpError>(())
                        })?;
                        self.exec_stmt(body)?;
                        i -= 1;
                    }
                } else {
                    while i <= end_v {
                        self.env.set(var_name, Value::Integer(i)).or_else(|_| {
                            self.env.define_local(var_name, Value::Integer(i));
                            Ok::<(), InterpError>(())
                        })?;
                        self.exec_stmt(body)?;
                        i += 1;
                    }
                }
                Ok(())
            }
            Stmt::Case {
                selector,
                branches,
                else_branch,
            } => {
                let sel = self.eval_expr(selector)?;
                for branch in branches {
                    for label in &branch.labels {
                        if self.case_label_matches(&sel, label)? {
                            return self.exec_stmt(&branch.body);
                        }
                    }
                }
                if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch)?;
                }
                Ok(())
            }
            Stmt::With { .. } => Err(InterpError::Unsupported(
                "'with' statements are not evaluated".into(),
            )),
            Stmt::Goto(_) => Err(InterpError::Unsupported(
                "'goto' is not evaluated".into(),
            )),
            Stmt::Labeled(_, inner) => self.exec_stmt(inner),
            Stmt::Compound(block) => self.exec_block(block),
            Stmt::ProcCall { name, args } => self.call_routine(name, args).map(|_| ()),
            Stmt::Write { args, newline } => self.exec_write(args, *newline),
            Stmt::Read { targets, newline } => self.exec_read(targets, *newline),
            Stmt::FileAssign { file_var, filename } => {
                let path = self.eval_expr(filename)?.to_string();
                self.env.assign_file(file_var, path);
                Ok(())
            }
            Stmt::FileReset(name) => self.file_reset(name),
            Stmt::FileRewrite(name) => self.file_rewrite(name),
            Stmt::FileClose(name) => self.file_close(name),
            Stmt::FileRead { .. } | Stmt::FileWrite { .. } => Err(InterpError::Unsupported(
                "file-targeted write/read are dispatched through Write/Read at evaluation time"
                    .into(),
            )),
            Stmt::New(name) => {
                let addr = self.env.heap_new(Value::Integer(0));
                self.env.set(name, Value::Pointer(Some(addr)))
            }
            Stmt::Dispose(name) => {
                let ptr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match ptr {
                    Value::Pointer(Some(addr)) => {
                        self.env.heap_dispose(addr)?;
                        self.env.set(name, Value::Pointer(None))
                    }
                    Value::Pointer(None) => Err(InterpError::Pointer(format!(
                        "dispose of nil pointer '{}'",
                        name
                    ))),
                    _ => Err(InterpError::Type(format!("'{}' is not a pointer", name))),
                }
            }
            Stmt::UnsupportedBuiltin { name, .. } => Err(InterpError::Unsupported(format!(
                "'{}' is not evaluated",
                name
            ))),
        }
    }

    fn case_label_matches(&mut self, sel: &Value, label: &CaseLabel) -> Result<bool, InterpError> {
        match label {
            CaseLabel::Value(e) => Ok(*sel == self.eval_expr(e)?),
            CaseLabel::Range(lo, hi) => {
                let lo = self.eval_expr(lo)?.as_int();
                let hi = self.eval_expr(hi)?.as_int();
                let x = sel.as_int();
                match (x, lo, hi) {
                    (Some(x), Some(lo), Some(hi)) => Ok(x >= lo && x <= hi),
                    _ => Ok(false),
                }
            }
        }
    }

    fn eval_truthy(&mut self, expr: &Expr) -> Result<bool, InterpError> {
        Ok(self.eval_expr(expr)?.truthy())
    }

    // ===== write/read =====

    fn exec_write(&mut self, args: &[Expr], newline: bool) -> Result<(), InterpError> {
        if let Some((file_var, rest)) = self.split_file_designator(args) {
            let mut text = String::new();
            for a in rest {
                text.push_str(&self.eval_expr(a)?.to_string());
            }
            if newline {
                text.push('\n');
            }
            return self.file_write_text(&file_var, &text);
        }
        let mut out = String::new();
        for a in args {
            out.push_str(&self.eval_expr(a)?.to_string());
        }
        if newline {
            out.push('\n');
        }
        write!(self.stdout, "{}", out).map_err(|e| InterpError::File(e.to_string()))?;
        self.stdout
            .flush()
            .map_err(|e| InterpError::File(e.to_string()))
    }

    fn exec_read(&mut self, targets: &[LValue], newline: bool) -> Result<(), InterpError> {
        if let Some(LValue::Simple(first)) = targets.first() {
            if self.env.has_file(first) {
                let file_var = first.clone();
                for target in &targets[1..] {
                    let line = self.file_read_line(&file_var)?;
                    self.assign_parsed_line(target, &line)?;
                }
                if newline {
                    let _ = self.file_read_line(&file_var);
                }
                return Ok(());
            }
        }
        for target in targets {
            let mut line = String::new();
            io::stdin()
                .read_line(&mut line)
                .map_err(|e| InterpError::File(e.to_string()))?;
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            self.assign_parsed_line(target, &line)?;
        }
        let _ = newline;
        Ok(())
    }

    fn assign_parsed_line(&mut self, target: &LValue, line: &str) -> Result<(), InterpError> {
        let current = self.get_lvalue(target)?;
        let parsed = match current {
            Value::Integer(_) => Value::Integer(
                line.trim()
                    .parse()
                    .map_err(|_| InterpError::Type(format!("cannot parse '{}' as integer", line)))?,
            ),
            Value::Real(_) => Value::Real(
                line.trim()
                    .parse()
                    .map_err(|_| InterpError::Type(format!("cannot parse '{}' as real", line)))?,
            ),
            Value::Bool(_) => Value::Bool(line.trim().eq_ignore_ascii_case("true")),
            _ => Value::Str(line.to_string()),
        };
        self.assign_lvalue(target, parsed)
    }

    /// `write(f, ...)`/`read(f, ...)` target a file when the leading
    /// argument names a declared file variable.
    fn split_file_designator<'a>(&self, args: &'a [Expr]) -> Option<(String, &'a [Expr])> {
        if let Some(Expr::Ident(name)) = args.first() {
            if self.env.has_file(name) {
                return Some((name.clone(), &args[1..]));
            }
        }
        None
    }

    fn file_reset(&mut self, name: &str) -> Result<(), InterpError> {
        let path = self
            .env
            .file(name)
            .map(|h| h.path.clone())
            .ok_or_else(|| InterpError::File(format!("'{}' was never assigned", name)))?;
        let file = File::open(&path).map_err(|e| InterpError::File(e.to_string()))?;
        let handle = self
            .env
            .file_mut(name)
            .ok_or_else(|| InterpError::File(format!("unknown file '{}'", name)))?;
        handle.lines = Some(BufReader::new(file).lines());
        handle.mode = FileMode::Read;
        handle.peeked = None;
        Ok(())
    }

    fn file_rewrite(&mut self, name: &str) -> Result<(), InterpError> {
        let path = self
            .env
            .file(name)
            .map(|h| h.path.clone())
            .ok_or_else(|| InterpError::File(format!("'{}' was never assigned", name)))?;
        let file = File::create(&path).map_err(|e| InterpError::File(e.to_string()))?;
        let handle = self
            .env
            .file_mut(name)
            .ok_or_else(|| InterpError::File(format!("unknown file '{}'", name)))?;
        handle.writer = Some(BufWriter::new(file));
        handle.mode = FileMode::Write;
        Ok(())
    }

    fn file_close(&mut self, name: &str) -> Result<(), InterpError> {
        let handle = self
            .env
            .file_mut(name)
            .ok_or_else(|| InterpError::File(format!("unknown file '{}'", name)))?;
        if let Some(mut w) = handle.writer.take() {
            w.flush().map_err(|e| InterpError::File(e.to_string()))?;
        }
        handle.lines = None;
        handle.peeked = None;
        handle.mode = FileMode::Closed;
        Ok(())
    }

    fn file_write_text(&mut self, name: &str, text: &str) -> Result<(), InterpError> {
        let handle = self
            .env
            .file_mut(name)
            .ok_or_else(|| InterpError::File(format!("unknown file '{}'", name)))?;
        let writer = handle
            .writer
            .as_mut()
            .ok_or_else(|| InterpError::File(format!("'{}' is not open for writing", name)))?;
        writer
            .write_all(text.as_bytes())
            .map_err(|e| InterpError::File(e.to_string()))
    }

    fn file_read_line(&mut self, name: &str) -> Result<String, InterpError> {
        let handle = self
            .env
            .file_mut(name)
            .ok_or_else(|| InterpError::File(format!("unknown file '{}'", name)))?;
        if let Some(line) = handle.peeked.take() {
            return Ok(line);
        }
        let lines = handle
            .lines
            .as_mut()
            .ok_or_else(|| InterpError::File(format!("'{}' is not open for reading", name)))?;
        match lines.next() {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => Err(InterpError::File(e.to_string())),
            None => Err(InterpError::File(format!("read past end of file '{}'", name))),
        }
    }

    fn file_is_eof(&mut self, name: &str) -> Result<bool, InterpError> {
        let handle = match self.env.file_mut(name) {
            Some(h) => h,
            None => return Ok(true),
        };
        if handle.peeked.is_some() {
            return Ok(false);
        }
        let lines = match handle.lines.as_mut() {
            Some(l) => l,
            None => return Ok(true),
        };
        match lines.next() {
            Some(Ok(line)) => {
                handle.peeked = Some(line);
                Ok(false)
            }
            Some(Err(e)) => Err(InterpError::File(e.to_string())),
            None => Ok(true),
        }
    }

    // ===== lvalues =====

    fn get_lvalue(&mut self, lvalue: &LValue) -> Result<Value, InterpError> {
        match lvalue {
            LValue::Simple(name) => self
                .env
                .get(name)
                .ok_or_else(|| InterpError::Name(name.clone())),
            LValue::Indexed(name, indices) => {
                let idxs = self.eval_indices(indices)?;
                let arr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match arr {
                    Value::Array(a) => {
                        let a = a.borrow();
                        let i = a.linear_index(&idxs).ok_or_else(|| {
                            InterpError::Bounds(format!("index out of range for '{}'", name))
                        })?;
                        Ok(a.elems[i].clone())
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not an array", name))),
                }
            }
            LValue::Field(name, field) => {
                let rec = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match rec {
                    Value::Record(fields) => fields
                        .borrow()
                        .get(&field.to_ascii_lowercase())
                        .cloned()
                        .ok_or_else(|| InterpError::Name(format!("{}.{}", name, field))),
                    _ => Err(InterpError::Type(format!("'{}' is not a record", name))),
                }
            }
            LValue::ArrayField(name, indices, field) => {
                let idxs = self.eval_indices(indices)?;
                let arr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match arr {
                    Value::Array(a) => {
                        let a = a.borrow();
                        let i = a.linear_index(&idxs).ok_or_else(|| {
                            InterpError::Bounds(format!("index out of range for '{}'", name))
                        })?;
                        match &a.elems[i] {
                            Value::Record(fields) => fields
                                .borrow()
                                .get(&field.to_ascii_lowercase())
                                .cloned()
                                .ok_or_else(|| InterpError::Name(field.clone())),
                            _ => Err(InterpError::Type(format!("{}[..] is not a record", name))),
                        }
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not an array", name))),
                }
            }
            LValue::Deref(name) => {
                let ptr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match ptr {
                    Value::Pointer(Some(addr)) => self.env.heap_get(addr),
                    Value::Pointer(None) => {
                        Err(InterpError::Pointer(format!("dereference of nil pointer '{}'", name)))
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not a pointer", name))),
                }
            }
        }
    }

    fn assign_lvalue(&mut self, lvalue: &LValue, value: Value) -> Result<(), InterpError> {
        match lvalue {
            LValue::Simple(name) => self.env.set(name, value),
            LValue::Indexed(name, indices) => {
                let idxs = self.eval_indices(indices)?;
                let arr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match arr {
                    Value::Array(a) => {
                        let mut a = a.borrow_mut();
                        let i = a.linear_index(&idxs).ok_or_else(|| {
                            InterpError::Bounds(format!("index out of range for '{}'", name))
                        })?;
                        a.elems[i] = value;
                        Ok(())
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not an array", name))),
                }
            }
            LValue::Field(name, field) => {
                let rec = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match rec {
                    Value::Record(fields) => {
                        fields.borrow_mut().insert(field.to_ascii_lowercase(), value);
                        Ok(())
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not a record", name))),
                }
            }
            LValue::ArrayField(name, indices, field) => {
                let idxs = self.eval_indices(indices)?;
                let arr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match arr {
                    Value::Array(a) => {
                        let a = a.borrow_mut();
                        let i = a.linear_index(&idxs).ok_or_else(|| {
                            InterpError::Bounds(format!("index out of range for '{}'", name))
                        })?;
                        match &a.elems[i] {
                            Value::Record(fields) => {
                                fields.borrow_mut().insert(field.to_ascii_lowercase(), value);
                                Ok(())
                            }
                            _ => Err(InterpError::Type(format!("{}[..] is not a record", name))),
                        }
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not an array", name))),
                }
            }
            LValue::Deref(name) => {
                let ptr = self
                    .env
                    .get(name)
                    .ok_or_else(|| InterpError::Name(name.clone()))?;
                match ptr {
                    Value::Pointer(Some(addr)) => self.env.heap_set(addr, value),
                    Value::Pointer(None) => {
                        Err(InterpError::Pointer(format!("assignment through nil pointer '{}'", name)))
                    }
                    _ => Err(InterpError::Type(format!("'{}' is not a pointer", name))),
                }
            }
        }
    }

    fn eval_indices(&mut self, indices: &[Expr]) -> Result<Vec<i64>, InterpError> {
        indices
            .iter()
            .map(|e| {
                self.eval_expr(e)?
                    .as_int()
                    .ok_or_else(|| InterpError::Type("array index must be an integer".into()))
            })
            .collect()
    }

    // ===== expressions =====

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, InterpError> {
        match expr {
            Expr::IntLit(v) => Ok(Value::Integer(*v)),
            Expr::RealLit(v) => Ok(Value::Real(*v)),
            Expr::StrLit(s) => Ok(Value::Str(s.clone())),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::Nil => Ok(Value::Pointer(None)),
            Expr::Ident(name) => self.eval_ident(name),
            Expr::Call(name, args) => self.call_routine(name, args),
            Expr::Unary(op, inner) => self.eval_unary(*op, inner),
            Expr::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs),
            Expr::Index(name, indices) => self.get_lvalue(&LValue::Indexed(name.clone(), indices.clone())),
            Expr::Field(inner, field) => self.eval_field(inner, field),
            Expr::Deref(inner) => self.eval_deref(inner),
            Expr::AddrOf(inner) => self.eval_addr_of(inner),
            Expr::SetLit(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    let v = self.eval_expr(item)?;
                    set.insert(v.as_int().ok_or_else(|| {
                        InterpError::Type("set elements must be ordinal".into())
                    })?);
                }
                Ok(Value::Set(set))
            }
            Expr::Eof(name) => Ok(Value::Bool(self.file_is_eof(name)?)),
            Expr::In(elem, set) => {
                let elem = self.eval_expr(elem)?;
                let set_v = self.eval_expr(set)?;
                match set_v {
                    Value::Set(s) => {
                        let x = elem
                            .as_int()
                            .ok_or_else(|| InterpError::Type("'in' left operand must be ordinal".into()))?;
                        Ok(Value::Bool(s.contains(&x)))
                    }
                    _ => Err(InterpError::Type("'in' right operand must be a set".into())),
                }
            }
        }
    }

    /// A bare identifier may name a variable, a zero-argument function
    /// (Pascal allows calling parameterless functions without `()`), or an
    /// enum member; variables win first since that's the common case.
    fn eval_ident(&mut self, name: &str) -> Result<Value, InterpError> {
        if let Some(v) = self.env.get(name) {
            return Ok(v);
        }
        if self.routines.contains_key(&name.to_ascii_lowercase()) {
            return self.call_routine(name, &[]);
        }
        Err(InterpError::Name(name.to_string()))
    }

    fn eval_field(&mut self, inner: &Expr, field: &str) -> Result<Value, InterpError> {
        let base = self.eval_expr(inner)?;
        match base {
            Value::Record(fields) => fields
                .borrow()
                .get(&field.to_ascii_lowercase())
                .cloned()
                .ok_or_else(|| InterpError::Name(field.to_string())),
            _ => Err(InterpError::Type("field access on a non-record value".into())),
        }
    }

    fn eval_deref(&mut self, inner: &Expr) -> Result<Value, InterpError> {
        let base = self.eval_expr(inner)?;
        match base {
            Value::Pointer(Some(addr)) => self.env.heap_get(addr),
            Value::Pointer(None) => Err(InterpError::Pointer("dereference of nil pointer".into())),
            _ => Err(InterpError::Type("'^' applied to a non-pointer value".into())),
        }
    }

    fn eval_addr_of(&mut self, inner: &Expr) -> Result<Value, InterpError> {
        let name = match inner {
            Expr::Ident(n) => n,
            _ => {
                return Err(InterpError::Unsupported(
                    "'@' is only supported on a plain identifier".into(),
                ))
            }
        };
        let current = self
            .env
            .get(name)
            .ok_or_else(|| InterpError::Name(name.clone()))?;
        let addr = self.env.heap_new(current.deep_clone());
        Ok(Value::Pointer(Some(addr)))
    }

    fn eval_unary(&mut self, op: UnOp, inner: &Expr) -> Result<Value, InterpError> {
        let v = self.eval_expr(inner)?;
        match op {
            UnOp::Plus => match v {
                Value::Integer(_) | Value::Real(_) => Ok(v),
                _ => Err(InterpError::Type("unary '+' requires a numeric operand".into())),
            },
            UnOp::Neg => match v {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Real(r) => Ok(Value::Real(-r)),
                _ => Err(InterpError::Type("unary '-' requires a numeric operand".into())),
            },
            UnOp::Not => Ok(Value::Bool(!v.truthy())),
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, InterpError> {
        if matches!(op, BinOp::And | BinOp::Or) {
            let l = self.eval_expr(lhs)?.truthy();
            let r = self.eval_expr(rhs)?.truthy();
            return Ok(Value::Bool(match op {
                BinOp::And => l && r,
                BinOp::Or => l || r,
                _ => unreachable!(),
            }));
        }

        let l = self.eval_expr(lhs)?;
        let r = self.eval_expr(rhs)?;

        if op == BinOp::Add && (matches!(l, Value::Str(_)) || matches!(r, Value::Str(_))) {
            return Ok(Value::Str(format!("{}{}", l, r)));
        }

        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul => self.numeric_binop(op, &l, &r),
            BinOp::RealDiv => {
                let a = l
                    .as_real()
                    .ok_or_else(|| InterpError::Type("'/' requires numeric operands".into()))?;
                let b = r
                    .as_real()
                    .ok_or_else(|| InterpError::Type("'/' requires numeric operands".into()))?;
                Ok(Value::Real(a / b))
            }
            BinOp::IntDiv => {
                let a = l
                    .as_int()
                    .ok_or_else(|| InterpError::Type("'div' requires integer operands".into()))?;
                let b = r
                    .as_int()
                    .ok_or_else(|| InterpError::Type("'div' requires integer operands".into()))?;
                if b == 0 {
                    return Err(InterpError::Type("division by zero".into()));
                }
                Ok(Value::Integer(a.div_euclid(b)))
            }
            BinOp::Mod => {
                let a = l
                    .as_int()
                    .ok_or_else(|| InterpError::Type("'mod' requires integer operands".into()))?;
                let b = r
                    .as_int()
                    .ok_or_else(|| InterpError::Type("'mod' requires integer operands".into()))?;
                if b == 0 {
                    return Err(InterpError::Type("division by zero".into()));
                }
                Ok(Value::Integer(a.rem_euclid(b)))
            }
            BinOp::Eq => Ok(Value::Bool(self.values_equal(&l, &r)?)),
            BinOp::Ne => Ok(Value::Bool(!self.values_equal(&l, &r)?)),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => self.compare(op, &l, &r),
            BinOp::And | BinOp::Or => unreachable!(),
        }
    }

    fn numeric_binop(&self, op: BinOp, l: &Value, r: &Value) -> Result<Value, InterpError> {
        match (l, r) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                _ => unreachable!(),
            })),
            _ => {
                let a = l
                    .as_real()
                    .ok_or_else(|| InterpError::Type("arithmetic requires numeric operands".into()))?;
                let b = r
                    .as_real()
                    .ok_or_else(|| InterpError::Type("arithmetic requires numeric operands".into()))?;
                Ok(Value::Real(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    _ => unreachable!(),
                }))
            }
        }
    }

    fn values_equal(&self, l: &Value, r: &Value) -> Result<bool, InterpError> {
        Ok(l == r)
    }

    fn compare(&self, op: BinOp, l: &Value, r: &Value) -> Result<Value, InterpError> {
        let ordering = match (l, r) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => (*a as u8).cmp(&(*b as u8)),
            _ => {
                let a = l
                    .as_real()
                    .ok_or_else(|| InterpError::Type("comparison requires numeric operands".into()))?;
                let b = r
                    .as_real()
                    .ok_or_else(|| InterpError::Type("comparison requires numeric operands".into()))?;
                a.partial_cmp(&b)
                    .ok_or_else(|| InterpError::Type("operands are not comparable".into()))?
            }
        };
        use std::cmp::Ordering::*;
        Ok(Value::Bool(match op {
            BinOp::Lt => ordering == Less,
            BinOp::Gt => ordering == Greater,
            BinOp::Le => ordering != Greater,
            BinOp::Ge => ordering != Less,
            _ => unreachable!(),
        }))
    }

    // ===== routine calls =====

    pub(crate) fn call_routine(&mut self, name: &str, args: &[Expr]) -> Result<Value, InterpError> {
        if let Some(v) = self.call_builtin(name, args)? {
            return Ok(v);
        }

        let key = name.to_ascii_lowercase();
        let (params, local_decls, body, return_type) = match self.routines.get(&key) {
            Some(RoutineDef::Proc(p)) => (p.params.clone(), p.local_decls.clone(), p.body.clone(), None),
            Some(RoutineDef::Func(f)) => (
                f.params.clone(),
                f.local_decls.clone(),
                f.body.clone(),
                Some(f.return_type.clone()),
            ),
            None => return Err(InterpError::Name(name.to_string())),
        };

        let mut flat_params = Vec::new();
        for p in &params {
            for n in &p.names {
                flat_params.push((n.clone(), p.type_name.clone(), p.by_ref));
            }
        }
        if flat_params.len() != args.len() {
            return Err(InterpError::Arity(format!(
                "'{}' expects {} argument(s), got {}",
                name,
                flat_params.len(),
                args.len()
            )));
        }

        let mut writebacks: Vec<(String, String)> = Vec::new();
        let mut bindings: Vec<(String, Value)> = Vec::new();
        for ((pname, _ptype, by_ref), arg) in flat_params.iter().zip(args.iter()) {
            if *by_ref {
                let caller_name = match arg {
                    Expr::Ident(n) => n.clone(),
                    _ => {
                        return Err(InterpError::Arity(format!(
                            "by-reference parameter '{}' of '{}' requires an identifier argument",
                            pname, name
                        )))
                    }
                };
                let current = self
                    .env
                    .get(&caller_name)
                    .ok_or_else(|| InterpError::Name(caller_name.clone()))?;
                writebacks.push((pname.clone(), caller_name));
                bindings.push((pname.clone(), current));
            } else {
                let v = self.eval_expr(arg)?.deep_clone();
                bindings.push((pname.clone(), v));
            }
        }

        self.env.push_frame();
        for (pname, value) in bindings {
            self.env.define_local(&pname, value);
        }
        self.register_declarations(&local_decls)?;
        if let Some(rt) = &return_type {
            let default = self.default_for_named_type(rt);
            self.env.define_local(name, default);
        }

        let exec_result = match &body {
            Some(block) => self.exec_block(block),
            None => Ok(()),
        };

        let return_value = if return_type.is_some() {
            self.env.get(name)
        } else {
            None
        };
        let final_param_values: Vec<Value> = writebacks
            .iter()
            .map(|(pname, _)| self.env.get(pname).unwrap_or(Value::Nil))
            .collect();

        self.env.pop_frame();
        exec_result?;

        for ((_, caller_name), value) in writebacks.iter().zip(final_param_values) {
            self.env.set(caller_name, value)?;
        }

        Ok(return_value.unwrap_or(Value::Nil))
    }

    fn call_builtin(&mut self, name: &str, args: &[Expr]) -> Result<Option<Value>, InterpError> {
        if self.routines.contains_key(&name.to_ascii_lowercase()) {
            return Ok(None);
        }
        let lower = name.to_ascii_lowercase();
        let arg_val = |me: &mut Self, i: usize| -> Result<Value, InterpError> { me.eval_expr(&args[i]) };

        let result = match lower.as_str() {
            "length" => {
                let s = arg_val(self, 0)?;
                match s {
                    Value::Str(s) => Value::Integer(s.chars().count() as i64),
                    _ => return Err(InterpError::Type("length() requires a string".into())),
                }
            }
            "ord" => {
                let v = arg_val(self, 0)?;
                match v {
                    Value::Integer(i) => Value::Integer(i),
                    Value::Bool(b) => Value::Integer(b as i64),
                    Value::Str(s) => Value::Integer(s.chars().next().map(|c| c as i64).unwrap_or(0)),
                    _ => return Err(InterpError::Type("ord() requires an ordinal value".into())),
                }
            }
            "chr" => {
                let i = arg_val(self, 0)?
                    .as_int()
                    .ok_or_else(|| InterpError::Type("chr() requires an integer".into()))?;
                let c = char::from_u32(i as u32)
                    .ok_or_else(|| InterpError::Type(format!("{} is not a valid character code", i)))?;
                Value::Str(c.to_string())
            }
            "abs" => match arg_val(self, 0)? {
                Value::Integer(i) => Value::Integer(i.abs()),
                Value::Real(r) => Value::Real(r.abs()),
                _ => return Err(InterpError::Type("abs() requires a numeric value".into())),
            },
            "sqr" => match arg_val(self, 0)? {
                Value::Integer(i) => Value::Integer(i * i),
                Value::Real(r) => Value::Real(r * r),
                _ => return Err(InterpError::Type("sqr() requires a numeric value".into())),
            },
            "sqrt" => {
                let r = arg_val(self, 0)?
                    .as_real()
                    .ok_or_else(|| InterpError::Type("sqrt() requires a numeric value".into()))?;
                Value::Real(r.sqrt())
            }
            "trunc" => {
                let r = arg_val(self, 0)?
                    .as_real()
                    .ok_or_else(|| InterpError::Type("trunc() requires a numeric value".into()))?;
                Value::Integer(r.trunc() as i64)
            }
            "round" => {
                let r = arg_val(self, 0)?
                    .as_real()
                    .ok_or_else(|| InterpError::Type("round() requires a numeric value".into()))?;
                Value::Integer(r.round() as i64)
            }
            "upcase" => match arg_val(self, 0)? {
                Value::Str(s) => Value::Str(s.to_ascii_uppercase()),
                _ => return Err(InterpError::Type("upcase() requires a string".into())),
            },
            _ => return Ok(None),
        };
        Ok(Some(result))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::scanner::scan;

    fn run(src: &str) -> Interpreter {
        let program = parse_program(scan(src).unwrap()).unwrap();
        let mut interp = Interpreter::new();
        interp.register_declarations(&program.decls).unwrap();
        interp.exec_block(&program.block).unwrap();
        interp
    }

    #[test]
    fn assignment_and_arithmetic() {
        let mut interp = run("program P; var x: integer; begin x := 2 + 3 * 4 end.");
        assert_eq!(interp.env().get("x"), Some(Value::Integer(14)));
    }

    #[test]
    fn string_concatenation_with_plus() {
        let mut interp = run("program P; var s: string; begin s := 'foo' + 'bar' end.");
        assert_eq!(interp.env().get("s"), Some(Value::Str("foobar".to_string())));
    }

    #[test]
    fn real_division_always_real() {
        let mut interp = run("program P; var x: real; begin x := 7 / 2 end.");
        assert_eq!(interp.env().get("x"), Some(Value::Real(3.5)));
    }

    #[test]
    fn for_loop_runs_expected_count() {
        let mut interp =
            run("program P; var i, n: integer; begin n := 0; for i := 1 to 5 do n := n + 1 end.");
        assert_eq!(interp.env().get("n"), Some(Value::Integer(5)));
    }

    #[test]
    fn for_loop_downto_zero_iterations_when_out_of_range() {
        let mut interp =
            run("program P; var i, n: integer; begin n := 0; for i := 5 to 1 do n := n + 1 end.");
        assert_eq!(interp.env().get("n"), Some(Value::Integer(0)));
    }

    #[test]
    fn by_value_parameter_leaves_caller_unchanged() {
        let mut interp = run(
            "program P; var x: integer; procedure Bump(n: integer); begin n := n + 1 end; begin x := 5; Bump(x) end.",
        );
        assert_eq!(interp.env().get("x"), Some(Value::Integer(5)));
    }

    #[test]
    fn by_reference_parameter_mutates_caller() {
        let mut interp = run(
            "program P; var x: integer; procedure Bump(var n: integer); begin n := n + 1 end; begin x := 5; Bump(x) end.",
        );
        assert_eq!(interp.env().get("x"), Some(Value::Integer(6)));
    }

    #[test]
    fn function_returns_value_of_its_own_name() {
        let mut interp = run(
            "program P; var r: integer; function Sq(n: integer): integer; begin Sq := n * n end; begin r := Sq(6) end.",
        );
        assert_eq!(interp.env().get("r"), Some(Value::Integer(36)));
    }

    #[test]
    fn array_read_write_roundtrip() {
        let mut interp = run(
            "program P; var a: array[1..3] of integer; x: integer; begin a[2] := 9; x := a[2] end.",
        );
        assert_eq!(interp.env().get("x"), Some(Value::Integer(9)));
    }

    #[test]
    fn record_field_assignment() {
        let mut interp = run(
            "program P; type Point = record x, y: integer end; var p: Point; begin p.x := 1; p.y := 2 end.",
        );
        match interp.env().get("p") {
            Some(Value::Record(fields)) => {
                assert_eq!(fields.borrow().get("x"), Some(&Value::Integer(1)));
                assert_eq!(fields.borrow().get("y"), Some(&Value::Integer(2)));
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn pointer_new_deref_assign_dispose() {
        let mut interp = run(
            "program P; var p: ^integer; v: integer; begin new(p); p^ := 7; v := p^; dispose(p) end.",
        );
        assert_eq!(interp.env().get("v"), Some(Value::Integer(7)));
        assert_eq!(interp.env().get("p"), Some(Value::Pointer(None)));
    }

    #[test]
    fn set_membership() {
        let mut interp = run(
            "program P; var b: boolean; begin b := 3 in [1,2,3] end.",
        );
        assert_eq!(interp.env().get("b"), Some(Value::Bool(true)));
    }

    #[test]
    fn case_statement_matches_range() {
        let mut interp = run(
            "program P; var x, r: integer; begin x := 5; r := 0; case x of 1: r:=1; 2..6: r:=2; else r:=3 end end.",
        );
        assert_eq!(interp.env().get("r"), Some(Value::Integer(2)));
    }

    #[test]
    fn repeat_runs_body_at_least_once() {
        let mut interp = run(
            "program P; var n: integer; begin n := 0; repeat n := n + 1 until n >= 1 end.",
        );
        assert_eq!(interp.env().get("n"), Some(Value::Integer(1)));
    }

    #[test]
    fn goto_is_rejected_at_evaluation_time() {
        let program = parse_program(
            scan("program P; begin goto 1 end.").unwrap(),
        )
        .unwrap();
        let mut interp = Interpreter::new();
        interp.register_declarations(&program.decls).unwrap();
        assert!(interp.exec_block(&program.block).is_err());
    }

    #[test]
    fn supplemental_builtins() {
        let mut interp = run(
            "program P; var n: integer; r: real; begin n := length('hello'); r := sqrt(16.0) end.",
        );
        assert_eq!(interp.env().get("n"), Some(Value::Integer(5)));
        assert_eq!(interp.env().get("r"), Some(Value::Real(4.0)));
    }

    #[test]
    fn execute_imports_units_named_in_the_uses_clause() {
        use crate::units::UnitRegistry;

        let unit = crate::parser::parse_unit(
            scan(
                "unit MathUtil; interface function Double(n: integer): integer; begin end; \
                 implementation function Double(n: integer): integer; begin Double := n * 2 end; \
                 end.",
            )
            .unwrap(),
        )
        .unwrap();
        let mut registry = UnitRegistry::new();
        registry.register(unit);

        let program = parse_program(
            scan("program P; uses MathUtil; var r: integer; begin r := Double(21) end.").unwrap(),
        )
        .unwrap();
        execute(&program, Some(&registry)).unwrap();
    }

    #[test]
    fn execute_errors_when_uses_clause_has_no_loader() {
        let program = parse_program(
            scan("program P; uses MathUtil; begin end.").unwrap(),
        )
        .unwrap();
        assert!(execute(&program, None).is_err());
    }
}
