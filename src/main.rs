use std::io::{BufRead, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use rill::ast::ExprIdGen;
use rill::diagnostics::Diagnostics;
use rill::interpreter::Interpreter;
use rill::lexer::Scanner;
use rill::parser::Parser;
use rill::printer::Printer;
use rill::resolver::Resolver;

fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => run_prompt(),
        (Some(path), None) => run_file(&path),
        (Some(_), Some(_)) => bail!("usage: rill [script]"),
    }
}

fn run_file(path: &str) -> Result<ExitCode> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("could not read script '{path}'"))?;

    let mut interpreter = Interpreter::new(Printer::Stdout);
    let mut ids = ExprIdGen::new();
    if run(&source, &mut interpreter, &mut ids) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Line-at-a-time prompt. The interpreter and id source persist across
/// inputs so definitions from earlier lines stay visible; diagnostics reset
/// with every input.
fn run_prompt() -> Result<ExitCode> {
    let stdin = std::io::stdin();
    let mut interpreter = Interpreter::new(Printer::Stdout);
    let mut ids = ExprIdGen::new();

    loop {
        print!("> ");
        std::io::stdout().flush().context("could not flush prompt")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("could not read input line")?;
        if read == 0 {
            return Ok(ExitCode::SUCCESS);
        }
        if !line.ends_with('\n') {
            line.push('\n');
        }
        run(&line, &mut interpreter, &mut ids);
    }
}

/// Run one source unit through the pipeline. Static diagnostics gate
/// execution; a runtime fault ends this unit only. Returns whether anything
/// went wrong.
fn run(source: &str, interpreter: &mut Interpreter, ids: &mut ExprIdGen) -> bool {
    let mut diagnostics = Diagnostics::new();

    let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
    let statements = Parser::new(tokens, ids, &mut diagnostics).parse();
    if diagnostics.had_error() {
        diagnostics.report();
        return true;
    }

    let locals = Resolver::new(&mut diagnostics).resolve(&statements);
    if diagnostics.had_error() {
        diagnostics.report();
        return true;
    }

    interpreter.add_locals(locals);
    if let Err(fault) = interpreter.interpret(&statements) {
        diagnostics.runtime_error(&fault);
        diagnostics.report();
        return true;
    }
    false
}
