//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{anyhow, bail, Context};
use clap::{self, crate_version, Arg, Command};
use tacc::{
    codegen,
    error::Diagnostics,
    ir::Listing,
    lex::{Lexer, Report},
    opt::{self, Comparison, Passes},
    parse::{self, Ast},
    source::Source,
};

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    rc::Rc,
    str::FromStr,
};

use tracing::Level;

/// Última fase cuya salida se muestra.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Tokens,
    Tree,
    Tac,
    Opt,
    Asm,
    All,
}

impl Stage {
    fn shows(self, stage: Stage) -> bool {
        self == stage || self == Stage::All
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "tokens" => Ok(Stage::Tokens),
            "tree" => Ok(Stage::Tree),
            "tac" => Ok(Stage::Tac),
            "opt" => Ok(Stage::Opt),
            "asm" => Ok(Stage::Asm),
            "all" => Ok(Stage::All),
            _ => Err(()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("tacc")
        .version(crate_version!())
        .about("Compiles a C subset into three-address code and pseudo-assembly")
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .help("Source file (absent or '-' for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("emit")
                .long("emit")
                .takes_value(true)
                .value_name("STAGE")
                .default_value("all")
                .possible_values(["tokens", "tree", "tac", "opt", "asm", "all"])
                .help("Stage whose output is shown"),
        )
        .arg(
            Arg::new("skip")
                .long("skip")
                .takes_value(true)
                .value_name("PASS")
                .multiple_occurrences(true)
                .possible_values(["fold", "dead-temps", "unused-labels", "jumps"])
                .help("Disable an optimizer pass"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase log verbosity"),
        )
        .get_matches();

    let level = match args.occurrences_of("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // Se extraen argumentos necesarios
    let stage = args.value_of("emit").unwrap_or("all");
    let stage = Stage::from_str(stage).map_err(|()| anyhow!("Bad stage: {}", stage))?;

    let mut passes = Passes::default();
    for pass in args.values_of("skip").into_iter().flatten() {
        passes -= Passes::from_str(pass).map_err(|()| anyhow!("Bad pass: {}", pass))?;
    }

    let source = read_source(args.value_of("input"))?;

    match args.value_of("output").unwrap_or("-") {
        "-" => {
            let stdout = io::stdout();
            compile(&source, stage, passes, &mut stdout.lock())
        }

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            compile(&source, stage, passes, &mut file)
        }
    }
}

fn read_source(path: Option<&str>) -> anyhow::Result<Rc<Source>> {
    match path {
        None | Some("-") => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;

            Ok(Source::new("<stdin>", text))
        }

        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read source file: {}", path))?;

            Ok(Source::new(path, text))
        }
    }
}

fn compile<W: Write>(
    source: &Rc<Source>,
    stage: Stage,
    passes: Passes,
    output: &mut W,
) -> anyhow::Result<()> {
    let (tokens, errors) = Lexer::new(Rc::clone(source)).exhaust();
    if stage.shows(Stage::Tokens) {
        writeln!(output, "--- Tokens ---")?;
        write!(output, "{}", Report::new(&tokens, &errors))?;
    }

    // Los errores léxicos no detienen la compilación
    if !errors.is_empty() {
        eprint!("{}", Diagnostics::from(errors).kind("Lexical error"));
    }

    if stage < Stage::Tree {
        return Ok(());
    }

    // Un encabezado inválido deja un árbol vacío; las fases restantes
    // igual se muestran y la compilación falla al final
    let (ast, fatal) = match parse::parse(tokens.iter(), source.eof()) {
        Ok(ast) => (ast, false),
        Err(error) => {
            let ast = Ast::empty(error.location().clone());
            eprint!("{}", Diagnostics::from(error).kind("Syntax error"));
            (ast, true)
        }
    };

    translate(&ast, stage, passes, output)?;
    if fatal {
        bail!("Parsing failed");
    }

    Ok(())
}

/// Fases posteriores al análisis sintáctico.
fn translate<W: Write>(
    ast: &Ast,
    stage: Stage,
    passes: Passes,
    output: &mut W,
) -> anyhow::Result<()> {
    if stage.shows(Stage::Tree) {
        writeln!(output, "\n--- Parse Tree ---")?;
        write!(output, "{}", ast)?;
    }

    if stage < Stage::Tac {
        return Ok(());
    }

    let lowered = ast.lower();
    if !lowered.errors.is_empty() {
        eprint!("{}", Diagnostics::from(lowered.errors).kind("Lowering error"));
    }

    let code = lowered.code;
    if stage.shows(Stage::Tac) {
        writeln!(output, "\n--- Three Address Code ---")?;
        write!(output, "{}", Listing(&code))?;
    }

    if stage < Stage::Opt {
        return Ok(());
    }

    let optimized = opt::optimize(code.clone(), passes);
    if stage.shows(Stage::Opt) {
        let comparison = Comparison {
            before: &code,
            after: &optimized,
        };

        writeln!(output, "\n--- Optimized TAC ---")?;
        write!(output, "{}", comparison)?;
    }

    if stage.shows(Stage::Asm) {
        writeln!(output, "\n--- Assembly ---")?;
        codegen::emit(&optimized, output).context("Failed to emit assembly")?;
    }

    Ok(())
}
