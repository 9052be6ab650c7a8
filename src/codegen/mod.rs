//! Generación de pseudo-ensamblador.
//!
//! Cada instrucción de TAC se traduce a una secuencia fija de
//! instrucciones de tres operandos sobre registros virtuales. Las
//! constantes numéricas y los literales de cadena se emiten como
//! operandos inmediatos. Lo que no tiene traducción se conserva como
//! un comentario, de modo que ninguna instrucción desaparece.

use crate::ir::{BinOp, Instruction, Operand, Place};
use std::io::{self, Write};

mod regs;

pub use regs::{Reg, RegisterFile};

/// Emite el listado completo de una secuencia de TAC.
pub fn emit<W: Write>(code: &[Instruction], output: &mut W) -> io::Result<()> {
    let mut context = Context {
        output,
        regs: RegisterFile::default(),
    };

    for instruction in code {
        context.instruction(instruction)?;
    }

    tracing::debug!(registers = context.regs.len(), "assembly emitted");
    Ok(())
}

struct Context<'a, W: Write> {
    output: &'a mut W,
    regs: RegisterFile,
}

impl<W: Write> Context<'_, W> {
    fn output(&mut self) -> &mut W {
        &mut *self.output
    }

    fn instruction(&mut self, instruction: &Instruction) -> io::Result<()> {
        use Instruction::*;

        match instruction {
            Binary { dest, lhs, op, rhs } => {
                let opcode = match op {
                    BinOp::Add => "ADD",
                    BinOp::Sub => "SUB",
                    BinOp::Mul => "MUL",
                    BinOp::Div => "DIV",
                    _ => return self.placeholder(instruction),
                };

                let dest = self.regs.get(dest);
                let lhs = self.operand(lhs);
                let rhs = self.operand(rhs);

                emit!(self, opcode, dest, lhs, rhs)
            }

            Copy { dest, src } => {
                let dest = self.regs.get(dest);
                let src = self.operand(src);

                emit!(self, "MOV", dest, src)
            }

            Label(label) => writeln!(self.output(), "{}:", label),

            Goto(label) => emit!(self, "JMP", label),

            IfFalse(condition, label) => {
                let condition = self.operand(condition);

                emit!(self, "CMP", condition, 0)?;
                emit!(self, "JE", label)
            }

            Print(arguments) if arguments.is_empty() => emit!(self, "PRINT"),

            Print(arguments) => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.operand(argument))
                    .collect::<Vec<_>>()
                    .join(" ");

                emit!(self, "PRINT", arguments)
            }

            Return(Some(value)) => {
                let value = self.operand(value);

                emit!(self, "MOV", Reg::RETURN, value)?;
                emit!(self, "RET")
            }

            Return(None) => emit!(self, "RET"),
        }
    }

    fn operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Temp(temp) => self.regs.get(&Place::Temp(*temp)).to_string(),
            Operand::Var(var) => self.regs.get(&Place::Var(var.clone())).to_string(),
            Operand::Const(number) => number.to_string(),
            Operand::Str(string) => string.to_string(),
        }
    }

    fn placeholder(&mut self, instruction: &Instruction) -> io::Result<()> {
        writeln!(self.output(), "\t; {}", instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Label, Temp},
        lex::{Identifier, Number},
    };
    use std::rc::Rc;

    fn listing(code: &[Instruction]) -> String {
        let mut output = Vec::new();
        emit(code, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    fn var(name: &str) -> Place {
        Place::Var(Identifier::new(name))
    }

    #[test]
    fn copies_and_return() {
        let code = [
            Instruction::Copy {
                dest: var("x"),
                src: Operand::Const(Number::Int(5)),
            },
            Instruction::Return(Some(Operand::Var(Identifier::new("x")))),
        ];

        assert_eq!(
            listing(&code),
            "\tMOV     R1, 5\n\tMOV     R0, R1\n\tRET\n"
        );
    }

    #[test]
    fn destination_register_comes_first() {
        let code = [Instruction::Binary {
            dest: Place::Temp(Temp(1)),
            lhs: Operand::Var(Identifier::new("a")),
            op: BinOp::Mul,
            rhs: Operand::Const(Number::Int(2)),
        }];

        assert_eq!(listing(&code), "\tMUL     R1, R2, 2\n");
    }

    #[test]
    fn control_flow() {
        let code = [
            Instruction::Label(Label(1)),
            Instruction::IfFalse(Operand::Temp(Temp(1)), Label(2)),
            Instruction::Goto(Label(1)),
            Instruction::Label(Label(2)),
            Instruction::Return(None),
        ];

        assert_eq!(
            listing(&code),
            "L1:\n\tCMP     R1, 0\n\tJE      L2\n\tJMP     L1\nL2:\n\tRET\n"
        );
    }

    #[test]
    fn print_passes_literals_through() {
        let code = [
            Instruction::Print(vec![
                Operand::Str(Rc::from("\"%d\"")),
                Operand::Var(Identifier::new("a")),
            ]),
            Instruction::Print(Vec::new()),
        ];

        assert_eq!(listing(&code), "\tPRINT   \"%d\" R1\n\tPRINT\n");
    }

    #[test]
    fn relational_instructions_become_comments() {
        let code = [Instruction::Binary {
            dest: Place::Temp(Temp(1)),
            lhs: Operand::Var(Identifier::new("i")),
            op: BinOp::Less,
            rhs: Operand::Const(Number::Int(10)),
        }];

        assert_eq!(listing(&code), "\t; t1 = i < 10\n");
    }
}
