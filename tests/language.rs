use indoc::indoc;

use rill::ast::ExprIdGen;
use rill::diagnostics::Diagnostics;
use rill::error::RuntimeError;
use rill::interpreter::Interpreter;
use rill::lexer::Scanner;
use rill::parser::Parser;
use rill::printer::Printer;
use rill::resolver::Resolver;

/// Outcome of pushing one source unit through the whole pipeline.
struct Run {
    output: Vec<String>,
    diagnostics: Vec<String>,
    fault: Option<RuntimeError>,
}

fn run(source: &str) -> Run {
    let mut diagnostics = Diagnostics::new();
    let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
    let mut ids = ExprIdGen::new();
    let statements = Parser::new(tokens, &mut ids, &mut diagnostics).parse();
    let locals = if diagnostics.had_error() {
        Default::default()
    } else {
        Resolver::new(&mut diagnostics).resolve(&statements)
    };

    let (printer, lines) = Printer::capture();
    let mut fault = None;
    if !diagnostics.had_error() {
        let mut interpreter = Interpreter::new(printer);
        interpreter.add_locals(locals);
        fault = interpreter.interpret(&statements).err();
    }

    let output = lines.borrow().clone();
    Run {
        output,
        diagnostics: diagnostics.iter().map(ToString::to_string).collect(),
        fault,
    }
}

fn output(source: &str) -> Vec<String> {
    let outcome = run(source);
    assert!(
        outcome.diagnostics.is_empty(),
        "diagnostics: {:?}",
        outcome.diagnostics
    );
    assert!(outcome.fault.is_none(), "fault: {:?}", outcome.fault);
    outcome.output
}

#[test]
fn fibonacci_with_closures_and_mutation() {
    let lines = output(indoc! {"
        fun fibcounter():
            mut var a := 0
            mut var b := 1
            fun next():
                var value := a
                unstable var t := b
                b := a + b
                a := t
                return value
            return next
        var next := fibcounter()
        mut var i := 0
        while i < 7:
            print next()
            i := i + 1
    "});
    assert_eq!(lines, ["0", "1", "1", "2", "3", "5", "8"]);
}

#[test]
fn closures_capture_variables_not_values() {
    let lines = output(indoc! {"
        mut var greeting := \"hi\"
        fun greet():
            print greeting
        greet()
        greeting := \"yo\"
        greet()
    "});
    assert_eq!(lines, ["hi", "yo"]);
}

#[test]
fn mutability_ladder_is_enforced_at_runtime() {
    let outcome = run("var fixed := 1\nfixed := 2\n");
    let fault = outcome.fault.expect("expected an immutability fault");
    assert_eq!(
        fault.to_string(),
        "Variable 'fixed' is immutable and can not be redefined."
    );

    let outcome = run("mut var stable := 1\nstable := \"one\"\n");
    let fault = outcome.fault.expect("expected a type stability fault");
    assert_eq!(
        fault.to_string(),
        "Variable 'stable' is type stable and can not change type to 'string'."
    );

    let lines = output(indoc! {"
        unstable mut var free := 1
        free := \"one\"
        free := true
        print free
    "});
    assert_eq!(lines, ["true"]);
}

#[test]
fn comparison_quirks_survive_end_to_end() {
    assert_eq!(output("print 1 < 2 < 3\n"), ["3"]);
    assert_eq!(output("print false < 10\n"), ["false"]);
    assert_eq!(output("print none = none\n"), ["false"]);
    assert_eq!(
        output(indoc! {"
            if 0:
                print \"zero is truthy\"
        "}),
        ["zero is truthy"]
    );
}

#[test]
fn range_lists_and_indexing() {
    assert_eq!(output("print [3..7]\n"), ["[3, 4, 5, 6, 7]"]);
    assert_eq!(output("print [10, 8..2]\n"), ["[10, 8, 6, 4, 2]"]);
    assert_eq!(
        output("var xs := [2, 4..10]\nprint xs[0] + xs[len(xs) - 1]\n"),
        ["12"]
    );
    assert_eq!(
        output("var word := \"interpret\"\nprint word[0, 1, 2]\n"),
        ["int"]
    );
}

#[test]
fn out_of_bounds_previews_depend_on_length() {
    let outcome = run("var xs := [7, 8, 9]\nprint xs[3]\n");
    let fault = outcome.fault.expect("expected a bounds fault");
    assert_eq!(
        fault.to_string(),
        "Index 3 is out of bounds for [7, 8, 9]."
    );

    let outcome = run("var xs := [1..9]\nprint xs[42]\n");
    let fault = outcome.fault.expect("expected a bounds fault");
    assert_eq!(
        fault.to_string(),
        "Index 42 is out of bounds for [1, 2, ..., 8, 9]."
    );
}

#[test]
fn runtime_faults_render_with_stage_and_line() {
    let source = "var ok := 1\nprint ok / 0\n";
    let mut diagnostics = Diagnostics::new();
    let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
    let mut ids = ExprIdGen::new();
    let statements = Parser::new(tokens, &mut ids, &mut diagnostics).parse();
    let locals = Resolver::new(&mut diagnostics).resolve(&statements);
    assert!(!diagnostics.had_error());

    let (printer, _) = Printer::capture();
    let mut interpreter = Interpreter::new(printer);
    interpreter.add_locals(locals);
    let fault = interpreter
        .interpret(&statements)
        .expect_err("division by zero");
    diagnostics.runtime_error(&fault);

    let rendered: Vec<_> = diagnostics.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        ["[line 2] Runtime Error: Attempted to divide by zero."]
    );
}

#[test]
fn static_diagnostics_gate_execution() {
    // A resolver complaint means no statement runs, including valid ones.
    let outcome = run(indoc! {"
        fun f():
            var unused := 1
            return 2
        print f()
    "});
    assert_eq!(
        outcome.diagnostics,
        ["[line 2] Syntax Error: Local variable 'unused' is defined but not used."]
    );
    assert!(outcome.output.is_empty());
    assert!(outcome.fault.is_none());
}

#[test]
fn parse_faults_recover_per_statement() {
    let outcome = run(indoc! {"
        var := 1
        print \"still parsed\"
        break
    "});
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.contains("Expect variable name.")));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.contains("'break' statement must be inside a loop.")));
    // Diagnostics gate execution entirely.
    assert!(outcome.output.is_empty());
}

#[test]
fn indentation_faults_carry_their_line() {
    let outcome = run("if true:\n         print 1\n");
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| d.starts_with("[line 2] Syntax Error:")),
        "diagnostics: {:?}",
        outcome.diagnostics
    );
}

#[test]
fn classes_hold_state_per_instance() {
    let lines = output(indoc! {"
        class Counter:
            fun label():
                return \"counter\"
        var a := Counter()
        var b := Counter()
        a.count := 1
        b.count := 10
        print a.count + b.count
        var describe := a.label
        print describe()
    "});
    assert_eq!(lines, ["11", "counter"]);
}

#[test]
fn builtins_compose_with_user_code() {
    let lines = output(indoc! {"
        fun shout(text):
            return text + \"!\"
        print shout(tostring(len([1..3])))
        print list(tonumber(\"4\"), tonumber(true))
    "});
    assert_eq!(lines, ["3!", "[4, 1]"]);
}

#[test]
fn lambdas_flow_through_higher_order_functions() {
    let lines = output(indoc! {"
        fun twice(f, x):
            return f(f(x))
        print twice(\\n: n * 3, 2)
        var add := λ(a, b): a + b
        print add(20, 22)
    "});
    assert_eq!(lines, ["18", "42"]);
}

#[test]
fn break_and_continue_shape_loop_output() {
    let lines = output(indoc! {"
        mut var n := 0
        while true:
            n := n + 1
            if n = 2:
                continue
            if n > 4:
                break
            print n
    "});
    assert_eq!(lines, ["1", "3", "4"]);
}

#[test]
fn deep_nesting_keeps_resolution_and_environments_aligned() {
    let lines = output(indoc! {"
        var x := \"global\"
        fun outer():
            var x := \"outer\"
            fun inner():
                return x
            if true:
                var x := \"block\"
                print x
            return inner()
        print outer()
        print x
    "});
    assert_eq!(lines, ["block", "outer", "global"]);
}

#[test]
fn comma_declarations_build_lists() {
    let lines = output(indoc! {"
        var xs := 1, 2, 3
        print xs
        print len(xs)
    "});
    assert_eq!(lines, ["[1, 2, 3]", "3"]);
}
