// ABOUTME: Abstract syntax tree node types produced by the parser

/// A compilation unit is either a whole program or a unit (interface +
/// implementation). Both share the same declaration and statement shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub uses: Vec<String>,
    pub decls: Declarations,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub interface_uses: Vec<String>,
    pub interface_decls: Declarations,
    pub implementation_uses: Vec<String>,
    pub implementation_decls: Declarations,
    pub initialization: Option<Block>,
    pub finalization: Option<Block>,
}

/// All declarations seen in a type/var section plus routine declarations,
/// bucketed by kind the way spec.md's Program/Unit AST groups them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Declarations {
    pub record_types: Vec<RecordTypeDecl>,
    pub enum_types: Vec<EnumTypeDecl>,
    pub simple_vars: Vec<VarDecl>,
    pub array_vars: Vec<ArrayVarDecl>,
    pub record_vars: Vec<RecordVarDecl>,
    pub file_vars: Vec<FileVarDecl>,
    pub pointer_vars: Vec<PointerVarDecl>,
    pub set_vars: Vec<SetVarDecl>,
    pub procs: Vec<ProcDecl>,
    pub funcs: Vec<FuncDecl>,
}

impl Declarations {
    pub fn push_decl(&mut self, decl: Decl) {
        match decl {
            Decl::RecordType(d) => self.record_types.push(d),
            Decl::EnumType(d) => self.enum_types.push(d),
            Decl::Var(d) => self.simple_vars.push(d),
            Decl::ArrayVar(d) => self.array_vars.push(d),
            Decl::RecordVar(d) => self.record_vars.push(d),
            Decl::FileVar(d) => self.file_vars.push(d),
            Decl::PointerVar(d) => self.pointer_vars.push(d),
            Decl::SetVar(d) => self.set_vars.push(d),
        }
    }
}

/// One declaration parsed from a type-section or var-section entry, before
/// it is bucketed into `Declarations`.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    RecordType(RecordTypeDecl),
    EnumType(EnumTypeDecl),
    Var(VarDecl),
    ArrayVar(ArrayVarDecl),
    RecordVar(RecordVarDecl),
    FileVar(FileVarDecl),
    PointerVar(PointerVarDecl),
    SetVar(SetVarDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub names: Vec<String>,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayVarDecl {
    pub names: Vec<String>,
    pub dims: Vec<(i64, i64)>,
    pub element_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordTypeDecl {
    pub name: String,
    pub fields: Vec<(Vec<String>, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordVarDecl {
    pub names: Vec<String>,
    pub record_type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumTypeDecl {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerVarDecl {
    pub names: Vec<String>,
    pub pointed_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetVarDecl {
    pub names: Vec<String>,
    pub element_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileVarDecl {
    pub names: Vec<String>,
    pub is_text: bool,
    pub element_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub names: Vec<String>,
    pub type_name: String,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub local_decls: Declarations,
    pub body: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: String,
    pub local_decls: Declarations,
    pub body: Option<Block>,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Simple(String),
    Indexed(String, Vec<Expr>),
    Field(String, String),
    ArrayField(String, Vec<Expr>, String),
    Deref(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub labels: Vec<CaseLabel>,
    pub body: Box<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    Value(Expr),
    Range(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(LValue, Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        var_name: String,
        start: Expr,
        end: Expr,
        downto: bool,
        body: Box<Stmt>,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    Case {
        selector: Expr,
        branches: Vec<CaseBranch>,
        else_branch: Option<Block>,
    },
    With {
        record_vars: Vec<String>,
        body: Box<Stmt>,
    },
    Goto(String),
    Labeled(String, Box<Stmt>),
    Compound(Block),
    ProcCall {
        name: String,
        args: Vec<Expr>,
    },
    Write {
        args: Vec<Expr>,
        newline: bool,
    },
    Read {
        targets: Vec<LValue>,
        newline: bool,
    },
    FileAssign {
        file_var: String,
        filename: Expr,
    },
    FileReset(String),
    FileRewrite(String),
    FileClose(String),
    FileRead {
        file_var: String,
        targets: Vec<LValue>,
        newline: bool,
    },
    FileWrite {
        file_var: String,
        args: Vec<Expr>,
        newline: bool,
    },
    New(String),
    Dispose(String),
    /// Parsed but not evaluated per spec.md §9 (pack/unpack/get/put/page).
    UnsupportedBuiltin {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    RealDiv,
    IntDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    RealLit(f64),
    StrLit(String),
    BoolLit(bool),
    Nil,
    Ident(String),
    Call(String, Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Index(String, Vec<Expr>),
    Field(Box<Expr>, String),
    Deref(Box<Expr>),
    AddrOf(Box<Expr>),
    SetLit(Vec<Expr>),
    Eof(String),
    In(Box<Expr>, Box<Expr>),
}
