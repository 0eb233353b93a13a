// ABOUTME: Runtime environment: scope-chain variable storage, heap, and file table

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Lines};

use crate::error::InterpError;
use crate::value::Value;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FileMode {
    Read,
    Write,
    Closed,
}

pub struct FileHandle {
    pub path: String,
    pub mode: FileMode,
    pub lines: Option<Lines<BufReader<File>>>,
    pub writer: Option<BufWriter<File>>,
    /// Line fetched ahead of time so `eof(f)` can answer without consuming it.
    pub peeked: Option<String>,
}

impl FileHandle {
    pub fn new(path: String) -> Self {
        FileHandle {
            path,
            mode: FileMode::Closed,
            lines: None,
            writer: None,
            peeked: None,
        }
    }
}

/// Pascal's scoping is a stack of lexical frames, not closures: reading a
/// name walks the call stack from the innermost frame outward and finally
/// checks the global table; writing resolves to the first frame (innermost
/// to outermost) already holding the name, falling back to global.
pub struct Environment {
    global: HashMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
    heap: Vec<Option<Value>>,
    files: HashMap<String, FileHandle>,
    enum_members: HashMap<String, i64>,
}

fn norm(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            global: HashMap::new(),
            frames: Vec::new(),
            heap: Vec::new(),
            files: HashMap::new(),
            enum_members: HashMap::new(),
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn define_local(&mut self, name: &str, value: Value) {
        let key = norm(name);
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(key, value);
        } else {
            self.global.insert(key, value);
        }
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global.insert(norm(name), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let key = norm(name);
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.get(&key) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.global.get(&key) {
            return Some(v.clone());
        }
        self.enum_members.get(&key).map(|ord| Value::Integer(*ord))
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), InterpError> {
        let key = norm(name);
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(&key) {
                *slot = value;
                return Ok(());
            }
        }
        if let Some(slot) = self.global.get_mut(&key) {
            *slot = value;
            return Ok(());
        }
        Err(InterpError::Name(name.to_string()))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        let key = norm(name);
        self.frames.iter().any(|f| f.contains_key(&key))
            || self.global.contains_key(&key)
            || self.enum_members.contains_key(&key)
    }

    pub fn define_enum_member(&mut self, name: &str, ordinal: i64) {
        self.enum_members.insert(norm(name), ordinal);
    }

    pub fn enum_ordinal(&self, name: &str) -> Option<i64> {
        self.enum_members.get(&norm(name)).copied()
    }

    // ===== heap =====

    pub fn heap_new(&mut self, default: Value) -> usize {
        self.heap.push(Some(default));
        self.heap.len() - 1
    }

    pub fn heap_get(&self, addr: usize) -> Result<Value, InterpError> {
        match self.heap.get(addr) {
            Some(Some(v)) => Ok(v.clone()),
            Some(None) => Err(InterpError::Pointer(format!(
                "dereference of disposed pointer at address {}",
                addr
            ))),
            None => Err(InterpError::Pointer(format!(
                "invalid pointer address {}",
                addr
            ))),
        }
    }

    pub fn heap_set(&mut self, addr: usize, value: Value) -> Result<(), InterpError> {
        match self.heap.get_mut(addr) {
            Some(slot @ Some(_)) => {
                *slot = Some(value);
                Ok(())
            }
            Some(None) => Err(InterpError::Pointer(format!(
                "assignment through disposed pointer at address {}",
                addr
            ))),
            None => Err(InterpError::Pointer(format!(
                "invalid pointer address {}",
                addr
            ))),
        }
    }

    pub fn heap_dispose(&mut self, addr: usize) -> Result<(), InterpError> {
        match self.heap.get_mut(addr) {
            Some(slot) => {
                *slot = None;
                Ok(())
            }
            None => Err(InterpError::Pointer(format!(
                "invalid pointer address {}",
                addr
            ))),
        }
    }

    // ===== files =====

    pub fn file_mut(&mut self, name: &str) -> Option<&mut FileHandle> {
        self.files.get_mut(&norm(name))
    }

    pub fn file(&self, name: &str) -> Option<&FileHandle> {
        self.files.get(&norm(name))
    }

    pub fn assign_file(&mut self, name: &str, path: String) {
        self.files.insert(norm(name), FileHandle::new(path));
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(&norm(name))
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_define_and_get() {
        let mut env = Environment::new();
        env.define_global("x", Value::Integer(42));
        assert_eq!(env.get("X"), Some(Value::Integer(42)));
    }

    #[test]
    fn frame_shadows_global() {
        let mut env = Environment::new();
        env.define_global("x", Value::Integer(1));
        env.push_frame();
        env.define_local("x", Value::Integer(2));
        assert_eq!(env.get("x"), Some(Value::Integer(2)));
        env.pop_frame();
        assert_eq!(env.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn set_resolves_innermost_frame_first() {
        let mut env = Environment::new();
        env.define_global("x", Value::Integer(1));
        env.push_frame();
        env.define_local("x", Value::Integer(2));
        env.set("x", Value::Integer(99)).unwrap();
        assert_eq!(env.get("x"), Some(Value::Integer(99)));
        env.pop_frame();
        assert_eq!(env.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn set_falls_back_to_global_when_not_shadowed() {
        let mut env = Environment::new();
        env.define_global("x", Value::Integer(1));
        env.push_frame();
        env.set("x", Value::Integer(5)).unwrap();
        env.pop_frame();
        assert_eq!(env.get("x"), Some(Value::Integer(5)));
    }

    #[test]
    fn set_undeclared_name_is_error() {
        let mut env = Environment::new();
        assert!(env.set("nope", Value::Integer(1)).is_err());
    }

    #[test]
    fn heap_new_get_set_dispose() {
        let mut env = Environment::new();
        let addr = env.heap_new(Value::Integer(7));
        assert_eq!(env.heap_get(addr).unwrap(), Value::Integer(7));
        env.heap_set(addr, Value::Integer(8)).unwrap();
        assert_eq!(env.heap_get(addr).unwrap(), Value::Integer(8));
        env.heap_dispose(addr).unwrap();
        assert!(env.heap_get(addr).is_err());
    }

    #[test]
    fn enum_members_resolve_as_ordinals() {
        let mut env = Environment::new();
        env.define_enum_member("Red", 0);
        env.define_enum_member("Green", 1);
        assert_eq!(env.get("red"), Some(Value::Integer(0)));
        assert_eq!(env.enum_ordinal("Green"), Some(1));
    }
}
