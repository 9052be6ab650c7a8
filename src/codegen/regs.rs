use crate::ir::Place;
use std::{
    collections::HashMap,
    fmt::{self, Display},
};

/// Registro virtual, `R<N>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reg(pub u32);

impl Reg {
    /// Registro reservado para valores de retorno.
    pub const RETURN: Reg = Reg(0);
}

impl Display for Reg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "R{}", self.0)
    }
}

/// Asignación de registros virtuales a variables y temporales.
///
/// No hay límite de registros ni spilling: cada nombre recibe un
/// registro nuevo la primera vez que aparece y lo conserva por el
/// resto del listado.
pub struct RegisterFile {
    assigned: HashMap<Place, Reg>,
    next: u32,
}

impl RegisterFile {
    /// Registro de un nombre, asignándolo si es su primer uso.
    pub fn get(&mut self, place: &Place) -> Reg {
        if let Some(reg) = self.assigned.get(place) {
            return *reg;
        }

        let reg = Reg(self.next);
        self.next += 1;

        tracing::trace!(%place, %reg, "register assigned");
        self.assigned.insert(place.clone(), reg);

        reg
    }

    /// Cantidad de registros asignados, sin contar `R0`.
    pub fn len(&self) -> usize {
        self.assigned.len()
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile {
            assigned: HashMap::new(),
            next: Reg::RETURN.0 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::Temp, lex::Identifier};

    #[test]
    fn stable_first_use_order() {
        let mut regs = RegisterFile::default();
        let x = Place::Var(Identifier::new("x"));
        let t1 = Place::Temp(Temp(1));

        assert_eq!(regs.get(&x), Reg(1));
        assert_eq!(regs.get(&t1), Reg(2));
        assert_eq!(regs.get(&x), Reg(1));
        assert_eq!(regs.len(), 2);
        assert_eq!(Reg::RETURN.to_string(), "R0");
    }
}
