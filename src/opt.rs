//! Optimización de TAC.
//!
//! Cuatro pasadas independientes que se aplican una vez cada una y en
//! orden fijo; la salida de cada una es la entrada de la siguiente:
//!
//! 1. Plegado de constantes con propagación de temporales constantes.
//! 2. Eliminación de temporales muertos.
//! 3. Eliminación de etiquetas que ningún salto referencia.
//! 4. Eliminación de saltos hacia la instrucción inmediata siguiente.
//!
//! Cada pasada es idempotente sobre su propia salida.

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Display},
    str::FromStr,
};

use bitflags::bitflags;

use crate::{
    ir::{BinOp, Instruction, Label, Operand, Place, Temp},
    lex::Number,
};

bitflags! {
    /// Conjunto de pasadas habilitadas.
    pub struct Passes: u8 {
        /// Plegado y propagación de constantes.
        const FOLD = 0x01;

        /// Eliminación de temporales sin uso.
        const DEAD_TEMPS = 0x02;

        /// Eliminación de etiquetas sin referencias.
        const UNUSED_LABELS = 0x04;

        /// Eliminación de `GOTO L` seguido de `LABEL L`.
        const REDUNDANT_JUMPS = 0x08;
    }
}

impl Default for Passes {
    fn default() -> Self {
        Passes::all()
    }
}

impl FromStr for Passes {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "fold" => Ok(Passes::FOLD),
            "dead-temps" => Ok(Passes::DEAD_TEMPS),
            "unused-labels" => Ok(Passes::UNUSED_LABELS),
            "jumps" => Ok(Passes::REDUNDANT_JUMPS),
            _ => Err(()),
        }
    }
}

/// Aplica las pasadas habilitadas, en orden.
pub fn optimize(code: Vec<Instruction>, passes: Passes) -> Vec<Instruction> {
    const ORDER: &[(Passes, &str, fn(Vec<Instruction>) -> Vec<Instruction>)] = &[
        (Passes::FOLD, "fold", fold),
        (Passes::DEAD_TEMPS, "dead-temps", dead_temps),
        (Passes::UNUSED_LABELS, "unused-labels", unused_labels),
        (Passes::REDUNDANT_JUMPS, "jumps", redundant_jumps),
    ];

    ORDER
        .iter()
        .filter(|(pass, _, _)| passes.contains(*pass))
        .fold(code, |code, &(_, name, pass)| {
            let before = code.len();
            let code = pass(code);

            tracing::debug!(pass = name, removed = before - code.len(), "optimizer pass");
            code
        })
}

/// Plegado de constantes y propagación de temporales constantes.
///
/// Antes de examinar cada instrucción se sustituyen sus operandos por
/// los valores ya conocidos, de modo que un plegado habilita el
/// siguiente dentro de la misma pasada. Nunca se sustituyen destinos.
pub fn fold(code: Vec<Instruction>) -> Vec<Instruction> {
    let mut known: HashMap<Temp, Number> = HashMap::new();

    code.into_iter()
        .map(|mut instruction| {
            for operand in instruction.operands_mut() {
                if let Some(value) = operand.temp().and_then(|temp| known.get(&temp)) {
                    *operand = Operand::Const(*value);
                }
            }

            let instruction = match instruction {
                Instruction::Binary {
                    dest,
                    lhs: Operand::Const(lhs),
                    op,
                    rhs: Operand::Const(rhs),
                } => match evaluate(lhs, op, rhs) {
                    Some(value) => Instruction::Copy {
                        dest,
                        src: Operand::Const(value),
                    },

                    None => Instruction::Binary {
                        dest,
                        lhs: Operand::Const(lhs),
                        op,
                        rhs: Operand::Const(rhs),
                    },
                },

                other => other,
            };

            if let Instruction::Copy {
                dest: Place::Temp(temp),
                src: Operand::Const(value),
            } = &instruction
            {
                known.insert(*temp, *value);
            }

            instruction
        })
        .collect()
}

/// Evalúa una operación aritmética entre constantes.
///
/// Retorna `None` si el resultado no es representable o si la
/// operación no es aritmética.
fn evaluate(lhs: Number, op: BinOp, rhs: Number) -> Option<Number> {
    match (lhs, rhs) {
        (Number::Int(lhs), Number::Int(rhs)) => {
            let value = match op {
                BinOp::Add => lhs.checked_add(rhs),
                BinOp::Sub => lhs.checked_sub(rhs),
                BinOp::Mul => lhs.checked_mul(rhs),
                BinOp::Div => lhs.checked_div(rhs),
                _ => None,
            };

            value.map(Number::Int)
        }

        (lhs, rhs) => {
            let (lhs, rhs) = (as_float(lhs), as_float(rhs));
            let value = match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                BinOp::Mul => lhs * rhs,
                BinOp::Div if rhs != 0.0 => lhs / rhs,
                _ => return None,
            };

            Some(value)
                .filter(|value| value.is_finite())
                .map(Number::Float)
        }
    }
}

fn as_float(number: Number) -> f64 {
    match number {
        Number::Int(int) => int as f64,
        Number::Float(float) => float,
    }
}

/// Elimina instrucciones cuyo destino es un temporal que nunca se lee.
///
/// Solo cuentan las lecturas. Se repite hasta que no haya cambios, ya
/// que eliminar una instrucción puede dejar sin uso a otro temporal.
pub fn dead_temps(mut code: Vec<Instruction>) -> Vec<Instruction> {
    loop {
        let used: HashSet<Temp> = code
            .iter()
            .flat_map(Instruction::operands)
            .filter_map(Operand::temp)
            .collect();

        let before = code.len();
        code.retain(|instruction| match instruction.dest().and_then(Place::temp) {
            Some(temp) => used.contains(&temp),
            None => true,
        });

        if code.len() == before {
            break code;
        }
    }
}

/// Elimina declaraciones de etiquetas que ningún salto referencia.
pub fn unused_labels(mut code: Vec<Instruction>) -> Vec<Instruction> {
    let targets: HashSet<Label> = code.iter().filter_map(Instruction::target).collect();

    code.retain(|instruction| match instruction {
        Instruction::Label(label) => targets.contains(label),
        _ => true,
    });

    code
}

/// Elimina `GOTO L` inmediatamente seguido de `LABEL L`.
///
/// Varios saltos consecutivos hacia la misma etiqueta también se
/// eliminan, por lo que una segunda aplicación no encuentra nada.
pub fn redundant_jumps(code: Vec<Instruction>) -> Vec<Instruction> {
    let mut output: Vec<Instruction> = Vec::with_capacity(code.len());

    for instruction in code {
        if let Instruction::Label(label) = &instruction {
            while matches!(output.last(), Some(Instruction::Goto(target)) if target == label) {
                output.pop();
            }
        }

        output.push(instruction);
    }

    output
}

/// Listados antes y después de optimizar, numerados.
pub struct Comparison<'a> {
    pub before: &'a [Instruction],
    pub after: &'a [Instruction],
}

impl Display for Comparison<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [("Before", self.before), ("After", self.after)];

        for (i, (title, code)) in sections.iter().enumerate() {
            if i > 0 {
                writeln!(fmt)?;
            }

            writeln!(fmt, "{}:", title)?;
            for (number, instruction) in code.iter().enumerate() {
                writeln!(fmt, "({}) {}", number + 1, instruction)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Identifier;

    fn t(n: u32) -> Operand {
        Operand::Temp(Temp(n))
    }

    fn dt(n: u32) -> Place {
        Place::Temp(Temp(n))
    }

    fn var(name: &str) -> Operand {
        Operand::Var(Identifier::new(name))
    }

    fn dvar(name: &str) -> Place {
        Place::Var(Identifier::new(name))
    }

    fn int(value: i64) -> Operand {
        Operand::Const(Number::Int(value))
    }

    fn lines(code: &[Instruction]) -> Vec<String> {
        code.iter().map(Instruction::to_string).collect()
    }

    #[test]
    fn literal_copy_propagates() {
        let code = vec![
            Instruction::Copy { dest: dt(1), src: int(5) },
            Instruction::Copy { dest: dvar("x"), src: t(1) },
            Instruction::Return(Some(var("x"))),
        ];

        let code = optimize(code, Passes::default());
        assert_eq!(lines(&code), ["x = 5", "RETURN x"]);
    }

    #[test]
    fn folding_chains_within_one_pass() {
        let code = vec![
            Instruction::Binary { dest: dt(1), lhs: int(3), op: BinOp::Mul, rhs: int(4) },
            Instruction::Binary { dest: dt(2), lhs: int(2), op: BinOp::Add, rhs: t(1) },
            Instruction::Copy { dest: dvar("a"), src: t(2) },
        ];

        let once = fold(code);
        assert_eq!(lines(&once), ["t1 = 12", "t2 = 14", "a = 14"]);
        assert_eq!(fold(once.clone()), once);
    }

    #[test]
    fn unsafe_arithmetic_is_not_folded() {
        let code = vec![
            Instruction::Binary { dest: dt(1), lhs: int(1), op: BinOp::Div, rhs: int(0) },
            Instruction::Binary { dest: dt(2), lhs: int(i64::MAX), op: BinOp::Add, rhs: int(1) },
            Instruction::Binary { dest: dt(3), lhs: int(1), op: BinOp::Less, rhs: int(2) },
            Instruction::Binary { dest: dt(4), lhs: int(7), op: BinOp::Div, rhs: int(2) },
        ];

        let code = fold(code);
        assert!(matches!(code[0], Instruction::Binary { .. }));
        assert!(matches!(code[1], Instruction::Binary { .. }));
        assert!(matches!(code[2], Instruction::Binary { .. }));
        assert_eq!(code[3].to_string(), "t4 = 3");
    }

    #[test]
    fn mixed_arithmetic_folds_to_float() {
        let code = vec![Instruction::Binary {
            dest: dt(1),
            lhs: Operand::Const(Number::Float(2.5)),
            op: BinOp::Add,
            rhs: Operand::Const(Number::Float(0.5)),
        }];

        assert_eq!(lines(&fold(code)), ["t1 = 3.0"]);
    }

    #[test]
    fn variables_are_not_propagated() {
        let code = vec![
            Instruction::Copy { dest: dvar("x"), src: int(1) },
            Instruction::Binary { dest: dt(1), lhs: var("x"), op: BinOp::Add, rhs: int(1) },
        ];

        assert_eq!(lines(&fold(code)), ["x = 1", "t1 = x + 1"]);
    }

    #[test]
    fn temps_read_by_print_and_return_survive() {
        let code = vec![
            Instruction::Binary { dest: dt(1), lhs: var("a"), op: BinOp::Add, rhs: int(1) },
            Instruction::Binary { dest: dt(2), lhs: var("a"), op: BinOp::Mul, rhs: int(2) },
            Instruction::Binary { dest: dt(3), lhs: t(2), op: BinOp::Sub, rhs: int(1) },
            Instruction::Binary { dest: dt(4), lhs: var("b"), op: BinOp::Sub, rhs: int(1) },
            Instruction::Print(vec![t(1)]),
            Instruction::Return(Some(t(3))),
        ];

        let code = dead_temps(code);
        assert_eq!(
            lines(&code),
            ["t1 = a + 1", "t2 = a * 2", "t3 = t2 - 1", "PRINT t1", "RETURN t3"]
        );
    }

    #[test]
    fn dead_temps_cascade() {
        let code = vec![
            Instruction::Binary { dest: dt(1), lhs: var("a"), op: BinOp::Add, rhs: int(1) },
            Instruction::Binary { dest: dt(2), lhs: t(1), op: BinOp::Mul, rhs: int(2) },
            Instruction::Copy { dest: dvar("x"), src: int(0) },
        ];

        let once = dead_temps(code);
        assert_eq!(lines(&once), ["x = 0"]);
        assert_eq!(dead_temps(once.clone()), once);
    }

    #[test]
    fn labels_kept_regardless_of_order() {
        let code = vec![
            Instruction::Label(Label(1)),
            Instruction::IfFalse(var("c"), Label(2)),
            Instruction::Goto(Label(1)),
            Instruction::Label(Label(3)),
            Instruction::Label(Label(2)),
        ];

        let once = unused_labels(code);
        assert_eq!(
            lines(&once),
            ["LABEL L1", "IF_FALSE c GOTO L2", "GOTO L1", "LABEL L2"]
        );

        assert_eq!(unused_labels(once.clone()), once);
    }

    #[test]
    fn jumps_to_next_instruction_removed() {
        let code = vec![
            Instruction::IfFalse(var("c"), Label(1)),
            Instruction::Goto(Label(2)),
            Instruction::Goto(Label(2)),
            Instruction::Label(Label(2)),
            Instruction::Goto(Label(1)),
            Instruction::Label(Label(3)),
            Instruction::Label(Label(1)),
        ];

        let once = redundant_jumps(code);
        assert_eq!(
            lines(&once),
            [
                "IF_FALSE c GOTO L1",
                "LABEL L2",
                "GOTO L1",
                "LABEL L3",
                "LABEL L1"
            ]
        );

        assert_eq!(redundant_jumps(once.clone()), once);
    }

    #[test]
    fn disabled_passes_are_skipped() {
        let code = vec![
            Instruction::Copy { dest: dt(1), src: int(5) },
            Instruction::Copy { dest: dvar("x"), src: t(1) },
            Instruction::Label(Label(1)),
        ];

        let passes = Passes::default() - Passes::DEAD_TEMPS;
        let code = optimize(code, passes);

        assert_eq!(lines(&code), ["t1 = 5", "x = 5"]);
        assert_eq!("jumps".parse::<Passes>(), Ok(Passes::REDUNDANT_JUMPS));
        assert!("inline".parse::<Passes>().is_err());
    }

    #[test]
    fn comparison_numbers_both_listings() {
        let before = vec![
            Instruction::Copy { dest: dt(1), src: int(5) },
            Instruction::Copy { dest: dvar("x"), src: t(1) },
        ];

        let after = optimize(before.clone(), Passes::default());
        let rendered = Comparison {
            before: &before,
            after: &after,
        }
        .to_string();

        assert_eq!(
            rendered,
            "Before:\n(1) t1 = 5\n(2) x = t1\n\nAfter:\n(1) x = 5\n"
        );
    }
}
