//! Código de tres direcciones (TAC).
//!
//! Esta es la representación intermedia que comparten el generador
//! de TAC, el optimizador y el generador de ensamblador. Cada
//! instrucción tiene a lo sumo un operador y un único destino. Los
//! operandos son campos tipados, de manera que las transformaciones
//! reescriben valores directamente en vez de manipular texto.
//!
//! La representación textual ([`Display`]) de cada instrucción es la
//! forma canónica del listado:
//!
//! ```text
//! t1 = 3 * 4
//! x = t1
//! LABEL L1
//! IF_FALSE t2 GOTO L2
//! PRINT "%d", x
//! RETURN x
//! ```

use crate::lex::{Identifier, Number};
use std::{
    fmt::{self, Display},
    rc::Rc,
};

/// Temporal generado por el compilador, `t<N>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub u32);

impl Display for Temp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "t{}", self.0)
    }
}

/// Etiqueta de salto, `L<N>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "L{}", self.0)
    }
}

/// Destino de una asignación.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Place {
    Temp(Temp),
    Var(Identifier),
}

impl Place {
    pub fn temp(&self) -> Option<Temp> {
        match self {
            Place::Temp(temp) => Some(*temp),
            Place::Var(_) => None,
        }
    }
}

impl Display for Place {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Temp(temp) => temp.fmt(fmt),
            Place::Var(var) => var.fmt(fmt),
        }
    }
}

impl From<Place> for Operand {
    fn from(place: Place) -> Self {
        match place {
            Place::Temp(temp) => Operand::Temp(temp),
            Place::Var(var) => Operand::Var(var),
        }
    }
}

/// Un operando de lectura.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Temp(Temp),
    Var(Identifier),
    Const(Number),

    /// Literal de cadena, comillas incluidas.
    Str(Rc<str>),
}

impl Operand {
    pub fn temp(&self) -> Option<Temp> {
        match self {
            Operand::Temp(temp) => Some(*temp),
            _ => None,
        }
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(temp) => temp.fmt(fmt),
            Operand::Var(var) => var.fmt(fmt),
            Operand::Const(number) => number.fmt(fmt),
            Operand::Str(string) => fmt.write_str(string),
        }
    }
}

/// Operador binario.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl BinOp {
    /// Precedencia, de mayor a menor. Todos son asociativos por la izquierda.
    pub fn precedence(self) -> u8 {
        use BinOp::*;

        match self {
            Mul | Div => 3,
            Add | Sub => 2,
            Less | LessOrEqual | Greater | GreaterOrEqual => 1,
            Equal | NotEqual => 0,
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        let string = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Equal => "==",
            NotEqual => "!=",
        };

        fmt.write_str(string)
    }
}

/// Instrucción de tres direcciones.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// `dest = lhs op rhs`
    Binary {
        dest: Place,
        lhs: Operand,
        op: BinOp,
        rhs: Operand,
    },

    /// `dest = src`
    Copy { dest: Place, src: Operand },

    /// `LABEL name`
    Label(Label),

    /// `GOTO name`
    Goto(Label),

    /// `IF_FALSE cond GOTO name`
    IfFalse(Operand, Label),

    /// `PRINT a, b, ...`
    Print(Vec<Operand>),

    /// `RETURN [value]`
    Return(Option<Operand>),
}

impl Instruction {
    /// Destino escrito por la instrucción, si existe.
    pub fn dest(&self) -> Option<&Place> {
        match self {
            Instruction::Binary { dest, .. } | Instruction::Copy { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// Operandos leídos por la instrucción.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instruction::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Copy { src, .. } => vec![src],
            Instruction::IfFalse(cond, _) => vec![cond],
            Instruction::Print(arguments) => arguments.iter().collect(),
            Instruction::Return(value) => value.iter().collect(),
            Instruction::Label(_) | Instruction::Goto(_) => Vec::new(),
        }
    }

    /// Operandos leídos por la instrucción, mutables.
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instruction::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Copy { src, .. } => vec![src],
            Instruction::IfFalse(cond, _) => vec![cond],
            Instruction::Print(arguments) => arguments.iter_mut().collect(),
            Instruction::Return(value) => value.iter_mut().collect(),
            Instruction::Label(_) | Instruction::Goto(_) => Vec::new(),
        }
    }

    /// Etiqueta hacia la que salta la instrucción, si es un salto.
    pub fn target(&self) -> Option<Label> {
        match self {
            Instruction::Goto(label) | Instruction::IfFalse(_, label) => Some(*label),
            _ => None,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Binary { dest, lhs, op, rhs } => write!(fmt, "{} = {} {} {}", dest, lhs, op, rhs),
            Copy { dest, src } => write!(fmt, "{} = {}", dest, src),
            Label(label) => write!(fmt, "LABEL {}", label),
            Goto(label) => write!(fmt, "GOTO {}", label),
            IfFalse(cond, label) => write!(fmt, "IF_FALSE {} GOTO {}", cond, label),

            Print(arguments) => {
                fmt.write_str("PRINT")?;
                for (i, argument) in arguments.iter().enumerate() {
                    let separator = if i == 0 { " " } else { ", " };
                    write!(fmt, "{}{}", separator, argument)?;
                }

                Ok(())
            }

            Return(Some(value)) => write!(fmt, "RETURN {}", value),
            Return(None) => fmt.write_str("RETURN"),
        }
    }
}

/// Listado de instrucciones, una por línea.
pub struct Listing<'a>(pub &'a [Instruction]);

impl Display for Listing<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in self.0 {
            writeln!(fmt, "{}", instruction)?;
        }

        Ok(())
    }
}
