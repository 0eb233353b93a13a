// ABOUTME: Unit-symbol importer: loads a parsed unit's interface into an interpreter

use crate::ast::Unit;
use crate::error::InterpError;
use crate::eval::Interpreter;

/// A source of compiled units a program's `uses` clause can draw on. Mirrors
/// how a pluggable capability is registered and resolved by name rather than
/// by a fixed, closed list.
pub trait UnitLoader {
    fn load(&self, name: &str) -> Option<Unit>;
}

/// Loader backed by a fixed set of already-parsed units, keyed case-insensitively.
pub struct UnitRegistry {
    units: std::collections::HashMap<String, Unit>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        UnitRegistry {
            units: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, unit: Unit) {
        self.units.insert(unit.name.to_ascii_lowercase(), unit);
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitLoader for UnitRegistry {
    fn load(&self, name: &str) -> Option<Unit> {
        self.units.get(&name.to_ascii_lowercase()).cloned()
    }
}

/// Imports a unit's interface into `interp`: interface record/enum types and
/// variables are registered with their defaults, each interface routine takes
/// its implementation-section body when one of the same name exists (else it
/// is registered header-only, with no body to execute), and the unit's
/// initialization block, if present, runs immediately.
pub fn import_unit(interp: &mut Interpreter, unit: &Unit) -> Result<(), InterpError> {
    interp.register_declarations(&unit.interface_decls)?;

    let mut merged = unit.interface_decls.clone();
    merged.procs.clear();
    merged.funcs.clear();

    for proc in &unit.interface_decls.procs {
        let body = unit
            .implementation_decls
            .procs
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(&proc.name))
            .and_then(|p| p.body.clone())
            .or_else(|| proc.body.clone());
        let mut proc = proc.clone();
        proc.body = body;
        merged.procs.push(proc);
    }
    for func in &unit.interface_decls.funcs {
        let body = unit
            .implementation_decls
            .funcs
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(&func.name))
            .and_then(|f| f.body.clone())
            .or_else(|| func.body.clone());
        let mut func = func.clone();
        func.body = body;
        merged.funcs.push(func);
    }

    interp.register_declarations(&merged)?;

    if let Some(init) = &unit.initialization {
        interp.exec_block(init)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Declarations, FuncDecl, Param};
    use crate::value::Value;

    fn plain_unit() -> Unit {
        Unit {
            name: "MathUtil".to_string(),
            interface_uses: Vec::new(),
            interface_decls: Declarations {
                funcs: vec![FuncDecl {
                    name: "Double".to_string(),
                    params: vec![Param {
                        names: vec!["n".to_string()],
                        type_name: "integer".to_string(),
                        by_ref: false,
                    }],
                    return_type: "integer".to_string(),
                    local_decls: Declarations::default(),
                    body: None,
                }],
                ..Declarations::default()
            },
            implementation_uses: Vec::new(),
            implementation_decls: Declarations {
                funcs: vec![FuncDecl {
                    name: "Double".to_string(),
                    params: vec![Param {
                        names: vec!["n".to_string()],
                        type_name: "integer".to_string(),
                        by_ref: false,
                    }],
                    return_type: "integer".to_string(),
                    local_decls: Declarations::default(),
                    body: Some(vec![crate::ast::Stmt::Assign(
                        crate::ast::LValue::Simple("Double".to_string()),
                        crate::ast::Expr::Binary(
                            crate::ast::BinOp::Mul,
                            Box::new(crate::ast::Expr::Ident("n".to_string())),
                            Box::new(crate::ast::Expr::IntLit(2)),
                        ),
                    )]),
                }],
                ..Declarations::default()
            },
            initialization: None,
            finalization: None,
        }
    }

    #[test]
    fn imports_interface_routine_with_implementation_body() {
        let unit = plain_unit();
        let mut interp = Interpreter::new();
        import_unit(&mut interp, &unit).unwrap();
        let result = interp
            .call_routine("Double", &[crate::ast::Expr::IntLit(21)])
            .unwrap();
        assert_eq!(result, Value::Integer(42));
    }

    #[test]
    fn runs_initialization_block_immediately() {
        let mut unit = plain_unit();
        unit.interface_decls.simple_vars.push(crate::ast::VarDecl {
            names: vec!["ready".to_string()],
            type_name: "boolean".to_string(),
        });
        unit.initialization = Some(vec![crate::ast::Stmt::Assign(
            crate::ast::LValue::Simple("ready".to_string()),
            crate::ast::Expr::BoolLit(true),
        )]);
        let mut interp = Interpreter::new();
        import_unit(&mut interp, &unit).unwrap();
        assert_eq!(interp.env().get("ready"), Some(Value::Bool(true)));
    }
}
