//! Generación de código de tres direcciones.
//!
//! El árbol se recorre sentencia por sentencia. Cada sentencia se
//! traduce de manera independiente: si falla, sus instrucciones
//! parciales se descartan, el error se registra y la traducción
//! continúa con la siguiente. Los contadores de temporales y
//! etiquetas pertenecen a un [`Context`] creado para cada
//! compilación, por lo que los nombres son únicos dentro de ella.

use thiserror::Error;

use crate::{
    expr::{self, Expr, ExprError},
    ir::{BinOp, Instruction, Label, Operand, Place, Temp},
    lex::{Identifier, Keyword, Number, Token},
    parse::{Ast, Block, Region, Statement},
    source::{Located, Location},
};

pub type Lowering<T> = Result<T, Located<LowerError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LowerError {
    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error("No assignment operator found")]
    MissingAssignment,

    #[error("Invalid assignment target `{0}`")]
    BadTarget(String),

    #[error("Expected `init; condition; step` in `for` header")]
    BadForHeader,
}

/// Resultado de traducir un programa.
#[derive(Debug, Default)]
pub struct Lowered {
    pub code: Vec<Instruction>,
    pub errors: Vec<Located<LowerError>>,
}

impl Ast {
    /// Traduce el programa completo a TAC.
    pub fn lower(&self) -> Lowered {
        let mut context = Context::default();
        context.block(self.body());

        tracing::debug!(
            instructions = context.code.len(),
            errors = context.errors.len(),
            "lowering finished"
        );

        Lowered {
            code: context.code,
            errors: context.errors,
        }
    }
}

/// Estado de una traducción en curso.
struct Context {
    next_temp: u32,
    next_label: u32,
    code: Vec<Instruction>,
    errors: Vec<Located<LowerError>>,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            next_temp: 1,
            next_label: 1,
            code: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl Context {
    fn temp(&mut self) -> Temp {
        let temp = Temp(self.next_temp);
        self.next_temp += 1;
        temp
    }

    fn label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn block(&mut self, statements: &[Located<Statement>]) {
        for statement in statements {
            let checkpoint = self.code.len();
            if let Err(error) = self.statement(statement) {
                tracing::debug!(
                    error = %error.val(),
                    location = %error.location(),
                    "statement dropped"
                );

                self.code.truncate(checkpoint);
                self.errors.push(error);
            }
        }
    }

    fn body(&mut self, body: &Option<Block>) {
        if let Some(body) = body {
            self.block(body);
        }
    }

    fn statement(&mut self, statement: &Located<Statement>) -> Lowering<()> {
        let whole = statement.location();

        match statement.as_ref() {
            Statement::Declaration { declarators, .. } => {
                self.declaration(declarators.tokens(), whole)
            }

            Statement::Expression { tokens, .. } => self.simple(tokens.tokens(), whole),

            Statement::Return { value, .. } => {
                let value = if value.is_empty() {
                    Operand::Const(Number::Int(0))
                } else {
                    self.expression(value.tokens(), whole)?
                };

                self.push(Instruction::Return(Some(value)));
                Ok(())
            }

            Statement::Print { arguments, .. } => {
                let arguments = match arguments {
                    Some(region) if !region.is_empty() => split(region.tokens(), &Token::Comma)
                        .into_iter()
                        .map(|argument| self.expression(argument, whole))
                        .collect::<Result<Vec<_>, _>>()?,

                    _ => Vec::new(),
                };

                self.push(Instruction::Print(arguments));
                Ok(())
            }

            Statement::If {
                condition,
                body,
                otherwise,
            } => {
                let condition = self.condition(condition, whole)?;
                let on_false = self.label();
                let end = self.label();

                self.push(Instruction::IfFalse(condition, on_false));
                self.body(body);
                self.push(Instruction::Goto(end));
                self.push(Instruction::Label(on_false));

                if let Some(otherwise) = otherwise {
                    self.body(&otherwise.body);
                }

                self.push(Instruction::Label(end));
                Ok(())
            }

            Statement::While { condition, body } => {
                let start = self.label();
                let end = self.label();

                self.push(Instruction::Label(start));
                let condition = self.condition(condition, whole)?;
                self.push(Instruction::IfFalse(condition, end));

                self.body(body);
                self.push(Instruction::Goto(start));
                self.push(Instruction::Label(end));
                Ok(())
            }

            Statement::For { header, body } => {
                let clauses = match header {
                    Some(header) => split(header.tokens(), &Token::Semicolon),
                    None => Vec::new(),
                };

                let (init, guard, step) = match clauses[..] {
                    [init, guard, step] => (init, guard, step),
                    _ => return Err(Located::at(LowerError::BadForHeader, whole.clone())),
                };

                match init.split_first() {
                    Some((first, declarators)) if is_type(first.val()) => {
                        self.declaration(declarators, whole)?
                    }

                    _ => self.simple(init, whole)?,
                }

                let start = self.label();
                let end = self.label();

                self.push(Instruction::Label(start));
                if !guard.is_empty() {
                    let guard = self.expression(guard, whole)?;
                    self.push(Instruction::IfFalse(guard, end));
                }

                self.body(body);
                self.simple(step, whole)?;

                self.push(Instruction::Goto(start));
                self.push(Instruction::Label(end));
                Ok(())
            }
        }
    }

    fn condition(&mut self, condition: &Option<Region>, whole: &Location) -> Lowering<Operand> {
        match condition {
            Some(region) => self.expression(region.tokens(), whole),
            None => Err(Located::at(ExprError::ExpectedExpr.into(), whole.clone())),
        }
    }

    /// Declaradores separados por comas, cada uno `x` o `x = expr`.
    fn declaration(&mut self, declarators: &[Located<Token>], whole: &Location) -> Lowering<()> {
        if declarators.is_empty() {
            return Ok(());
        }

        for declarator in split(declarators, &Token::Comma) {
            match declarator {
                [name] if matches!(name.val(), Token::Id(_)) => (),
                _ if contains(declarator, &Token::Assign) => self.assignment(declarator, whole)?,
                _ => return Err(bad_target(declarator, whole)),
            }
        }

        Ok(())
    }

    /// Sentencia genérica: vacía, incremento o asignación.
    fn simple(&mut self, tokens: &[Located<Token>], whole: &Location) -> Lowering<()> {
        if let Some((var, op)) = increment(tokens) {
            let dest = Place::Var(var.clone());
            self.push(Instruction::Binary {
                dest,
                lhs: Operand::Var(var),
                op,
                rhs: Operand::Const(Number::Int(1)),
            });

            return Ok(());
        }

        if tokens.is_empty() {
            Ok(())
        } else if contains(tokens, &Token::Assign) {
            self.assignment(tokens, whole)
        } else {
            let location = span(tokens).unwrap_or_else(|| whole.clone());
            Err(Located::at(LowerError::MissingAssignment, location))
        }
    }

    /// Asignación, posiblemente encadenada: `a = b = expr`.
    ///
    /// El lado derecho se evalúa una sola vez hacia un temporal y luego
    /// se copia a cada destino de derecha a izquierda, donde cada
    /// destino es la fuente del siguiente.
    fn assignment(&mut self, tokens: &[Located<Token>], whole: &Location) -> Lowering<()> {
        let mut parts = split(tokens, &Token::Assign);
        let rhs = match parts.pop() {
            Some(rhs) if !parts.is_empty() => rhs,
            _ => return Err(Located::at(LowerError::MissingAssignment, whole.clone())),
        };

        let targets = parts
            .into_iter()
            .map(|target| match target {
                [name] => match name.val() {
                    Token::Id(id) => Ok(id.clone()),
                    _ => Err(bad_target(target, whole)),
                },

                _ => Err(bad_target(target, whole)),
            })
            .collect::<Result<Vec<Identifier>, _>>()?;

        let mut source = match self.expression(rhs, whole)? {
            Operand::Temp(temp) => Operand::Temp(temp),
            value => {
                let temp = self.temp();
                self.push(Instruction::Copy {
                    dest: Place::Temp(temp),
                    src: value,
                });

                Operand::Temp(temp)
            }
        };

        for target in targets.into_iter().rev() {
            self.push(Instruction::Copy {
                dest: Place::Var(target.clone()),
                src: source,
            });

            source = Operand::Var(target);
        }

        Ok(())
    }

    /// Traduce una expresión y retorna el operando que contiene su valor.
    ///
    /// Los átomos se retornan tal cual, sin instrucciones.
    fn expression(&mut self, tokens: &[Located<Token>], whole: &Location) -> Lowering<Operand> {
        let location = span(tokens).unwrap_or_else(|| whole.clone());
        let expr = expr::parse(tokens, &location).map_err(|error| error.map(LowerError::Expr))?;

        Ok(self.value(&expr))
    }

    /// Emite en postorden las instrucciones de un árbol de expresión.
    fn value(&mut self, expr: &Located<Expr>) -> Operand {
        match expr.as_ref() {
            Expr::Var(var) => Operand::Var(var.clone()),
            Expr::Const(number) => Operand::Const(*number),
            Expr::Str(string) => Operand::Str(string.clone()),

            Expr::Binary(lhs, op, rhs) => {
                let lhs = self.value(lhs);
                let rhs = self.value(rhs);
                let dest = self.temp();

                self.push(Instruction::Binary {
                    dest: Place::Temp(dest),
                    lhs,
                    op: *op,
                    rhs,
                });

                Operand::Temp(dest)
            }
        }
    }
}

/// Divide en un separador que no esté dentro de paréntesis.
fn split<'t>(tokens: &'t [Located<Token>], separator: &Token) -> Vec<&'t [Located<Token>]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.val() {
            Token::OpenParen => depth += 1,
            Token::CloseParen => depth = depth.saturating_sub(1),
            token if depth == 0 && token == separator => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }

            _ => (),
        }
    }

    parts.push(&tokens[start..]);
    parts
}

fn contains(tokens: &[Located<Token>], token: &Token) -> bool {
    tokens.iter().any(|other| other.val() == token)
}

fn is_type(token: &Token) -> bool {
    matches!(
        token,
        Token::Keyword(Keyword::Int | Keyword::Float | Keyword::String)
    )
}

/// Reconoce `x++`, `x--`, `++x` y `--x`.
fn increment(tokens: &[Located<Token>]) -> Option<(Identifier, BinOp)> {
    let (var, op) = match tokens {
        [a, b] => match (a.val(), b.val()) {
            (Token::Id(var), op) | (op, Token::Id(var)) => (var, op),
            _ => return None,
        },

        _ => return None,
    };

    let op = match op {
        Token::Increment => BinOp::Add,
        Token::Decrement => BinOp::Sub,
        _ => return None,
    };

    Some((var.clone(), op))
}

fn span(tokens: &[Located<Token>]) -> Option<Location> {
    let first = tokens.first()?;
    let last = tokens.last()?;

    Some(Location::span(first.location().clone(), last.location()))
}

fn bad_target(tokens: &[Located<Token>], whole: &Location) -> Located<LowerError> {
    let text = tokens
        .iter()
        .map(|token| token.val().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let location = span(tokens).unwrap_or_else(|| whole.clone());
    Located::at(LowerError::BadTarget(text), location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::Listing, lex::Lexer, parse, source::Source};
    use std::rc::Rc;

    fn lower(body: &str) -> Lowered {
        let text = format!("void main() {{ {} }}", body);
        let source = Source::new("test.c", text);
        let (tokens, errors) = Lexer::new(Rc::clone(&source)).exhaust();
        assert!(errors.is_empty());

        parse::parse(tokens.iter(), source.eof())
            .expect("valid header")
            .lower()
    }

    fn listing(body: &str) -> Vec<String> {
        let lowered = lower(body);
        assert!(lowered.errors.is_empty(), "{:?}", lowered.errors);

        Listing(&lowered.code)
            .to_string()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn declaration_with_initializer() {
        assert_eq!(listing("int x = 5; return x;"), ["t1 = 5", "x = t1", "RETURN x"]);
    }

    #[test]
    fn declarations_without_initializer_emit_nothing() {
        assert_eq!(listing("int a, b = 2; float c;"), ["t1 = 2", "b = t1"]);
    }

    #[test]
    fn precedence_orders_temporaries() {
        assert_eq!(
            listing(r#"int a = 2 + 3 * 4; printf("%d", a);"#),
            ["t1 = 3 * 4", "t2 = 2 + t1", "a = t2", r#"PRINT "%d", a"#]
        );
    }

    #[test]
    fn chained_assignment_right_to_left() {
        assert_eq!(listing("a = b = 7;"), ["t1 = 7", "b = t1", "a = b"]);
    }

    #[test]
    fn if_else_shape() {
        assert_eq!(
            listing("if (x > 1) { y = 1; } else { y = 2; }"),
            [
                "t1 = x > 1",
                "IF_FALSE t1 GOTO L1",
                "t2 = 1",
                "y = t2",
                "GOTO L2",
                "LABEL L1",
                "t3 = 2",
                "y = t3",
                "LABEL L2",
            ]
        );
    }

    #[test]
    fn while_guard_precedes_body() {
        assert_eq!(
            listing("while (i < 3) { i = i + 1; }"),
            [
                "LABEL L1",
                "t1 = i < 3",
                "IF_FALSE t1 GOTO L2",
                "t2 = i + 1",
                "i = t2",
                "GOTO L1",
                "LABEL L2",
            ]
        );
    }

    #[test]
    fn for_loop_shape() {
        assert_eq!(
            listing(r#"for (int i = 0; i < 2; i++) { printf("%d", i); }"#),
            [
                "t1 = 0",
                "i = t1",
                "LABEL L1",
                "t2 = i < 2",
                "IF_FALSE t2 GOTO L2",
                r#"PRINT "%d", i"#,
                "i = i + 1",
                "GOTO L1",
                "LABEL L2",
            ]
        );
    }

    #[test]
    fn for_header_needs_three_clauses() {
        let lowered = lower("for (i = 0; i < 3) { } x = 1;");

        assert_eq!(lowered.errors.len(), 1);
        assert!(matches!(lowered.errors[0].as_ref(), LowerError::BadForHeader));
        assert_eq!(Listing(&lowered.code).to_string(), "t1 = 1\nx = t1\n");
    }

    #[test]
    fn increments_and_empty_return() {
        assert_eq!(
            listing("x++; --y; return;"),
            ["x = x + 1", "y = y - 1", "RETURN 0"]
        );
    }

    #[test]
    fn nested_parentheses_in_conditions() {
        assert_eq!(
            listing("while (((a + 1) > b)) { }"),
            [
                "LABEL L1",
                "t1 = a + 1",
                "t2 = t1 > b",
                "IF_FALSE t2 GOTO L2",
                "GOTO L1",
                "LABEL L2",
            ]
        );
    }

    #[test]
    fn compound_print_arguments_are_lowered() {
        assert_eq!(
            listing(r#"printf("%d %d", a + 1, b);"#),
            ["t1 = a + 1", r#"PRINT "%d %d", t1, b"#]
        );
    }

    #[test]
    fn failing_statements_are_dropped() {
        let lowered = lower("x = (1 + ; 5 + x; a + 1 = 3; y = 2;");
        let kinds: Vec<_> = lowered.errors.iter().map(|error| error.val()).collect();

        assert_eq!(kinds.len(), 3);
        assert!(matches!(
            kinds[0],
            LowerError::Expr(ExprError::MissingOperand(BinOp::Add))
        ));

        assert!(matches!(kinds[1], LowerError::MissingAssignment));
        assert!(matches!(kinds[2], LowerError::BadTarget(target) if target == "a + 1"));
        assert_eq!(Listing(&lowered.code).to_string(), "t1 = 2\ny = t1\n");
    }

    #[test]
    fn counters_span_the_whole_program() {
        let lowered = lower("if (a) { } if (b) { } c = 1 + 2;");
        let code = Listing(&lowered.code).to_string();

        assert!(code.contains("IF_FALSE a GOTO L1"));
        assert!(code.contains("IF_FALSE b GOTO L3"));
        assert!(code.contains("t1 = 1 + 2"));
    }
}
