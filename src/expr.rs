//! Árboles de expresión.
//!
//! El parser de sentencias conserva las condiciones, encabezados y lados
//! derechos como regiones planas de tokens. Este módulo convierte una de
//! esas regiones en un árbol de expresión mediante evaluación por
//! precedencia de operadores: una pila de operandos y una de operadores.
//! Al encontrar un operador se aplican los operadores pendientes con
//! precedencia mayor o igual, lo cual hace a todos asociativos por la
//! izquierda. Los paréntesis colocan un delimitador que bloquea esa
//! reducción.
//!
//! El orden en que se aplican operadores coincide con un recorrido en
//! postorden del árbol resultante, que es el orden en que el generador
//! de TAC emite temporales.

use std::rc::Rc;
use thiserror::Error;

use crate::{
    ir::BinOp,
    lex::{Identifier, Number, Token},
    source::{Located, Location},
};

/// Nodo de expresión.
#[derive(Debug, Clone)]
pub enum Expr {
    Var(Identifier),
    Const(Number),
    Str(Rc<str>),
    Binary(Box<Located<Expr>>, BinOp, Box<Located<Expr>>),
}

/// Error al construir una expresión.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("Not enough operands to apply operator `{0}`")]
    MissingOperand(BinOp),

    #[error("Mismatched parentheses")]
    UnmatchedParen,

    #[error("Expected an expression")]
    ExpectedExpr,

    #[error("Expected an operator between operands")]
    ExpectedOperator,

    #[error("Unexpected `{0}` in expression")]
    UnexpectedToken(Token),
}

pub type Parse<T> = Result<T, Located<ExprError>>;

/// Entrada de la pila de operadores.
enum Pending {
    Operator(Located<BinOp>),
    Paren(Location),
}

/// Construye el árbol de una región de tokens.
///
/// `whole` es la ubicación que se reporta cuando la región está vacía.
pub fn parse(tokens: &[Located<Token>], whole: &Location) -> Parse<Located<Expr>> {
    let mut operands: Vec<Located<Expr>> = Vec::new();
    let mut operators: Vec<Pending> = Vec::new();

    // Un `-` al inicio o justo después de `(` es unario
    let mut leading = true;

    for token in tokens {
        let location = token.location().clone();
        let at_start = std::mem::replace(&mut leading, false);

        let op = match token.as_ref() {
            Token::Id(id) => {
                operands.push(Located::at(Expr::Var(id.clone()), location));
                continue;
            }

            Token::Constant(constant) => {
                operands.push(Located::at(Expr::Const(constant.value()), location));
                continue;
            }

            Token::Str(string) => {
                operands.push(Located::at(Expr::Str(Rc::clone(string)), location));
                continue;
            }

            Token::OpenParen => {
                operators.push(Pending::Paren(location));
                leading = true;
                continue;
            }

            Token::CloseParen => {
                loop {
                    match operators.pop() {
                        Some(Pending::Operator(op)) => apply(&mut operands, op)?,
                        Some(Pending::Paren(_)) => break,
                        None => return Err(Located::at(ExprError::UnmatchedParen, location)),
                    }
                }

                continue;
            }

            Token::Minus if at_start => {
                // `-x` se reescribe como `0 - x`
                operands.push(Located::at(Expr::Const(Number::Int(0)), location.clone()));
                BinOp::Sub
            }

            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Times => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Less => BinOp::Less,
            Token::LessOrEqual => BinOp::LessOrEqual,
            Token::Greater => BinOp::Greater,
            Token::GreaterOrEqual => BinOp::GreaterOrEqual,
            Token::Equal => BinOp::Equal,
            Token::NotEqual => BinOp::NotEqual,

            other => {
                let error = ExprError::UnexpectedToken(other.clone());
                return Err(Located::at(error, location));
            }
        };

        while let Some(Pending::Operator(top)) = operators.last() {
            if top.val().precedence() < op.precedence() {
                break;
            }

            if let Some(Pending::Operator(top)) = operators.pop() {
                apply(&mut operands, top)?;
            }
        }

        operators.push(Pending::Operator(Located::at(op, location)));
    }

    while let Some(pending) = operators.pop() {
        match pending {
            Pending::Operator(op) => apply(&mut operands, op)?,
            Pending::Paren(location) => {
                return Err(Located::at(ExprError::UnmatchedParen, location))
            }
        }
    }

    let mut operands = operands.into_iter();
    match (operands.next(), operands.next()) {
        (Some(expr), None) => Ok(expr),
        (Some(_), Some(extra)) => Err(Located::at(
            ExprError::ExpectedOperator,
            extra.location().clone(),
        )),

        (None, _) => Err(Located::at(ExprError::ExpectedExpr, whole.clone())),
    }
}

/// Reduce los dos operandos superiores con un operador.
fn apply(operands: &mut Vec<Located<Expr>>, op: Located<BinOp>) -> Parse<()> {
    let (location, op) = op.split();

    let (lhs, rhs) = match (operands.pop(), operands.pop()) {
        (Some(rhs), Some(lhs)) => (lhs, rhs),
        _ => return Err(Located::at(ExprError::MissingOperand(op), location)),
    };

    let location = Location::span(lhs.location().clone(), rhs.location());
    let expr = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
    operands.push(Located::at(expr, location));

    Ok(())
}
