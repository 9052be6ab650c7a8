mod common;

use std::rc::Rc;

use anyhow::Result;
use tacc::{
    codegen,
    lex::{Category, Lexer, Report},
    opt::{self, Passes},
    parse::{self, Ast, ParserError},
    source::Source,
};

use common::{compile, lines, parse_program};

#[test]
fn declaration_folds_into_copy() -> Result<()> {
    let compiled = compile("void main(){ int x = 5; return x; }")?;

    assert_eq!(lines(&compiled.raw), ["t1 = 5", "x = t1", "RETURN x"]);
    assert_eq!(lines(&compiled.optimized), ["x = 5", "RETURN x"]);
    assert_eq!(
        compiled.assembly,
        "\tMOV     R1, 5\n\tMOV     R0, R1\n\tRET\n"
    );

    Ok(())
}

#[test]
fn multiplication_before_addition() -> Result<()> {
    let compiled = compile(r#"void main(){ int a = 2 + 3 * 4; printf("%d", a); }"#)?;
    let raw = lines(&compiled.raw);

    let product = raw.iter().position(|line| line == "t1 = 3 * 4");
    let sum = raw.iter().position(|line| line == "t2 = 2 + t1");
    assert!(product.is_some() && sum.is_some());
    assert!(product < sum);

    assert_eq!(lines(&compiled.optimized), ["a = 14", r#"PRINT "%d", a"#]);
    Ok(())
}

#[test]
fn while_back_edge_targets_guard() -> Result<()> {
    let compiled = compile("void main(){ int i = 0; while (i < 3) { i = i + 1; } return i; }")?;

    assert_eq!(
        lines(&compiled.optimized),
        [
            "i = 0",
            "LABEL L1",
            "t2 = i < 3",
            "IF_FALSE t2 GOTO L2",
            "t3 = i + 1",
            "i = t3",
            "GOTO L1",
            "LABEL L2",
            "RETURN i",
        ]
    );

    assert!(compiled.assembly.contains("L1:\n\t; t2 = i < 3\n\tCMP     R2, 0\n\tJE      L2\n"));
    assert!(compiled.assembly.contains("\tJMP     L1\nL2:\n"));
    Ok(())
}

#[test]
fn chained_assignment_shares_one_value() -> Result<()> {
    let compiled = compile("void main(){ int a; int b; a = b = 7; }")?;

    assert_eq!(lines(&compiled.raw), ["t1 = 7", "b = t1", "a = b"]);
    assert_eq!(lines(&compiled.optimized), ["b = 7", "a = b"]);
    Ok(())
}

#[test]
fn for_loop_end_to_end() -> Result<()> {
    let compiled =
        compile("void main(){ int s = 0; for (int i = 0; i < 3; i++) { s = s + i; } return s; }")?;

    assert_eq!(
        lines(&compiled.optimized),
        [
            "s = 0",
            "i = 0",
            "LABEL L1",
            "t3 = i < 3",
            "IF_FALSE t3 GOTO L2",
            "t4 = s + i",
            "s = t4",
            "i = i + 1",
            "GOTO L1",
            "LABEL L2",
            "RETURN s",
        ]
    );

    assert!(compiled.assembly.contains("\tADD     R2, R2, 1\n"));
    Ok(())
}

#[test]
fn tree_mirrors_nesting() -> Result<()> {
    let ast = parse_program("void main(){ while (x) { if (y) { x = 0; } } }")?;
    let tree = ast.to_string();

    assert!(tree.starts_with("Program\n    ├── Function\n"));
    assert!(tree.contains("            ├── WhileLoop\n"));
    assert!(tree.contains("                ├── LoopBody\n"));
    assert!(tree.contains("                    ├── IfStatement\n"));
    Ok(())
}

#[test]
fn lexical_errors_do_not_stop_parsing() -> Result<()> {
    let source = Source::new("test.c", "void main(){ int x = 1 @; return x; }");
    let (tokens, errors) = Lexer::new(Rc::clone(&source)).exhaust();

    let report = Report::new(&tokens, &errors);
    assert_eq!(report.invalid(), ["@"]);
    assert_eq!(
        report.lexemes(Category::Keyword).collect::<Vec<_>>(),
        ["int", "return", "void"]
    );

    let ast = parse::parse(tokens.iter(), source.eof())
        .map_err(|error| anyhow::anyhow!("{}", error.val()))?;

    let lowered = ast.lower();
    assert!(lowered.errors.is_empty());
    assert_eq!(lines(&lowered.code), ["t1 = 1", "x = t1", "RETURN x"]);
    Ok(())
}

#[test]
fn bad_header_aborts() -> Result<()> {
    let source = Source::new("test.c", "int main() { return 0; }");
    let (tokens, _) = Lexer::new(Rc::clone(&source)).exhaust();

    let error = match parse::parse(tokens.iter(), source.eof()) {
        Ok(_) => anyhow::bail!("header should have been rejected"),
        Err(error) => error,
    };

    assert!(matches!(error.val(), ParserError::BadHeader));
    assert_eq!(error.location().start().column(), 1);

    let ast = Ast::empty(error.location().clone());
    assert!(ast.to_string().contains("Function"));

    let code = opt::optimize(ast.lower().code, Passes::default());
    assert!(code.is_empty());

    let mut assembly = Vec::new();
    codegen::emit(&code, &mut assembly)?;
    assert!(assembly.is_empty());
    Ok(())
}
