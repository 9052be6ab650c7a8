use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use tacc::{
    codegen,
    error::Diagnostics,
    ir::{Instruction, Listing},
    lex::Lexer,
    opt::{self, Passes},
    parse::{self, Ast},
    source::Source,
};

/// Salidas de todas las fases para un programa sin errores.
#[allow(dead_code)]
pub struct Compiled {
    pub ast: Ast,
    pub raw: Vec<Instruction>,
    pub optimized: Vec<Instruction>,
    pub assembly: String,
}

pub fn parse_program(text: &str) -> Result<Ast> {
    let source = Source::new("test.c", text);
    let (tokens, errors) = Lexer::new(Rc::clone(&source)).exhaust();
    if !errors.is_empty() {
        bail!("{}", Diagnostics::from(errors).kind("Lexical error"));
    }

    parse::parse(tokens.iter(), source.eof())
        .map_err(|error| anyhow!("{}", Diagnostics::from(error).kind("Syntax error")))
}

pub fn compile(text: &str) -> Result<Compiled> {
    let ast = parse_program(text)?;

    let lowered = ast.lower();
    if !lowered.errors.is_empty() {
        bail!("{}", Diagnostics::from(lowered.errors).kind("Lowering error"));
    }

    let optimized = opt::optimize(lowered.code.clone(), Passes::default());

    let mut assembly = Vec::new();
    codegen::emit(&optimized, &mut assembly)?;

    Ok(Compiled {
        ast,
        raw: lowered.code,
        optimized,
        assembly: String::from_utf8(assembly)?,
    })
}

pub fn lines(code: &[Instruction]) -> Vec<String> {
    Listing(code)
        .to_string()
        .lines()
        .map(str::to_owned)
        .collect()
}
