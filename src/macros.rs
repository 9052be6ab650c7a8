/// Emite una instrucción de ensamblador.
///
/// El código de operación se alinea a una columna fija y los operandos
/// se separan por comas: `emit!(context, "ADD", dest, lhs, rhs)`.
macro_rules! emit {
    ($context:expr, $opcode:expr) => {
        writeln!($context.output(), "\t{}", $opcode)
    };

    ($context:expr, $opcode:expr, $first:expr $(, $rest:expr)*) => {{
        let output = $context.output();
        write!(output, "\t{:8}{}", $opcode, $first)?;
        $(write!(output, ", {}", $rest)?;)*
        writeln!(output)
    }};
}
