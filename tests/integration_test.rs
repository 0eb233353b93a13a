// ABOUTME: End-to-end scan -> parse -> execute tests mirroring the testable-properties scenarios

use std::io::Read;
use std::process::{Command, Stdio};
use serial_test::serial;

/// Runs a program through the compiled binary and captures its stdout, since
/// the evaluator writes directly to the process's standard output rather than
/// returning a buffer.
fn run_via_binary(source: &str) -> String {
    let dir = std::env::temp_dir().join(format!(
        "pascal-interp-test-{}-{}",
        std::process::id(),
        source.len()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("program.pas");
    std::fs::write(&path, source).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_pascal-interp"))
        .arg(&path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to launch interpreter binary");
    let status = child.wait().expect("interpreter did not run");
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .unwrap()
        .read_to_string(&mut stdout)
        .unwrap();
    assert!(status.success(), "program failed: {}", source);
    stdout
}

#[test]
fn arithmetic_precedence() {
    let out = run_via_binary("program P; var x:integer; begin x := 5+3*2; writeln(x) end.");
    assert!(out.contains("11"));
}

#[test]
fn for_loop_prints_in_order() {
    let out = run_via_binary("program P; var i:integer; begin for i:=1 to 3 do writeln(i) end.");
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["1", "2", "3"]);
}

#[test]
fn recursive_style_iterative_factorial_function() {
    let out = run_via_binary(
        "program P; function F(n:integer):integer; var i:integer; begin F:=1; for i:=2 to n do F:=F*i end; begin writeln(F(5)) end.",
    );
    assert!(out.contains("120"));
}

#[test]
fn local_shadowing_does_not_leak_to_global() {
    let out = run_via_binary(
        "program P; var x:integer; procedure S; var x:integer; begin x:=99 end; begin x:=5; S(); writeln(x) end.",
    );
    assert!(out.contains("5"));
    assert!(!out.contains("99"));
}

#[test]
fn string_concatenation_via_plus() {
    let out = run_via_binary("program P; var s:string; begin s:='Hello'+' '+'World'; writeln(s) end.");
    assert!(out.contains("Hello World"));
}

#[test]
fn pointer_lifecycle() {
    let out =
        run_via_binary("program P; var p:^integer; begin new(p); p^:=7; writeln(p^); dispose(p) end.");
    assert!(out.contains("7"));
}

#[test]
fn integer_div_and_mod() {
    let out = run_via_binary("program P; begin writeln(17 div 5); writeln(17 mod 5) end.");
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["3", "2"]);
}

#[test]
fn case_insensitive_identifiers_produce_identical_output() {
    let lower = run_via_binary(
        "program p; var count:integer; begin count := 1; writeln(count) end.",
    );
    let mixed = run_via_binary(
        "PROGRAM p; VAR Count:Integer; BEGIN Count := 1; WriteLn(COUNT) END.",
    );
    assert_eq!(lower, mixed);
}

#[test]
fn mixed_case_keyword_and_identifier_spelling_resolves_consistently() {
    let out = run_via_binary(
        "Program P; Var X: Integer; procedure BUMP(var n: integer); begin n := n + 1 end; Begin x := 1; bump(X); WriteLn(x) End.",
    );
    assert!(out.contains("2"));
}

#[test]
fn by_value_parameter_leaves_caller_argument_unchanged() {
    let out = run_via_binary(
        "program P; var x:integer; procedure Bump(n:integer); begin n := n + 1 end; begin x := 10; Bump(x); writeln(x) end.",
    );
    assert!(out.contains("10"));
}

#[test]
fn by_reference_parameter_mutates_only_bound_variable() {
    let out = run_via_binary(
        "program P; var a, b:integer; procedure Bump(var n:integer); begin n := n + 1 end; begin a := 1; b := 1; Bump(a); writeln(a); writeln(b) end.",
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["2", "1"]);
}

#[test]
fn for_loop_body_runs_zero_times_when_range_is_empty() {
    let out = run_via_binary(
        "program P; var i, n:integer; begin n := 0; for i := 5 to 1 do n := n + 1; writeln(n) end.",
    );
    assert!(out.contains("0"));
}

#[test]
fn array_linearisation_roundtrips_every_index() {
    let out = run_via_binary(
        "program P; var a: array[1..2,1..2] of integer; i, j:integer; begin \
         for i := 1 to 2 do for j := 1 to 2 do a[i,j] := i*10+j; \
         writeln(a[1,1]); writeln(a[1,2]); writeln(a[2,1]); writeln(a[2,2]) end.",
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["11", "12", "21", "22"]);
}

#[test]
fn set_membership_matches_value_equality() {
    let out = run_via_binary(
        "program P; var b1, b2:boolean; begin b1 := 2 in [1,2,3]; b2 := 9 in [1,2,3]; writeln(b1); writeln(b2) end.",
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["True", "False"]);
}

#[test]
fn logical_operators_coerce_nonzero_numbers_as_true() {
    let out = run_via_binary(
        "program P; var a, b, c: boolean; begin a := 5 and 3; b := not 5; c := not 0; \
         writeln(a); writeln(b); writeln(c) end.",
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["True", "False", "True"]);
}

#[test]
#[serial]
fn file_write_then_read_back_round_trips_and_reports_eof() {
    let dir = std::env::temp_dir().join("pascal-interp-test-file-io");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("roundtrip.txt");
    let path_str = path.to_str().unwrap().replace('\'', "''");

    let out = run_via_binary(&format!(
        "program P; var f: text; x: integer; done: boolean; begin \
         assign(f, '{path}'); rewrite(f); writeln(f, 42); close(f); \
         reset(f); readln(f, x); done := eof(f); close(f); \
         writeln(x); writeln(done) end.",
        path = path_str
    ));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["42", "True"]);
}

#[test]
fn goto_is_rejected_with_a_clear_error() {
    let dir = std::env::temp_dir().join("pascal-interp-test-goto");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("goto.pas");
    std::fs::write(&path, "program P; begin goto 1 end.").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_pascal-interp"))
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
}
