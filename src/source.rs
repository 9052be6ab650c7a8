//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el código fuente original, lo cual permite determinar un punto
//! exacto o aproximado en donde ocurre un error de abstracción
//! arbitraria.
//!
//! A diferencia de un flujo de caracteres, aquí el programa completo
//! se recibe como una sola cadena en memoria. Las ubicaciones se
//! calculan a partir de rangos de bytes sobre esa cadena.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Texto fuente de una unidad de compilación.
///
/// Se conserva el texto íntegro junto a una tabla de inicios de
/// línea, lo cual permite tanto traducir offsets a posiciones como
/// recuperar líneas completas al reportar errores.
pub struct Source {
    name: String,
    text: String,
    line_starts: Vec<usize>,
}

impl Source {
    /// Construye un origen a partir de un nombre y su contenido.
    pub fn new<N, T>(name: N, text: T) -> Rc<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(index, _)| index + 1))
            .collect();

        Rc::new(Source {
            name: name.into(),
            text,
            line_starts,
        })
    }

    /// Nombre del origen, usualmente una ruta o `<stdin>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contenido completo.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Obtiene una línea por número (base 1), sin su terminador.
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        let start = *self.line_starts.get(index)?;
        let end = self
            .line_starts
            .get(index + 1)
            .map_or(self.text.len(), |next| next - 1);

        Some(self.text[start..end].trim_end_matches('\r'))
    }

    /// Traduce un rango de bytes a una ubicación.
    pub fn locate(self: &Rc<Self>, bytes: Range<usize>) -> Location {
        let start = self.position(bytes.start);
        // Ningún lexema cruza un fin de línea
        let end = if bytes.end > bytes.start {
            self.position(bytes.end)
        } else {
            start.advance()
        };

        Location {
            from: Rc::clone(self),
            position: start..end,
        }
    }

    /// Ubicación que sigue inmediatamente al último carácter.
    pub fn eof(self: &Rc<Self>) -> Location {
        let len = self.text.len();
        self.locate(len..len)
    }

    fn position(&self, offset: usize) -> Position {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };

        let line_start = self.line_starts[line_index];
        let prefix = self.text.get(line_start..offset).unwrap_or_default();

        let mut position = Position {
            line: line_index as u32 + 1,
            column: 1,
        };

        for c in prefix.chars() {
            position = match c {
                '\t' => position.tab(),
                _ => position.advance(),
            };
        }

        position
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Origen al que pertenece esta ubicación.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_second_line() {
        let source = Source::new("test.c", "void main()\n{ int x; }");
        let location = source.locate(14..17);

        assert_eq!(location.start().line(), 2);
        assert_eq!(location.start().column(), 3);
        assert_eq!(location.end().column(), 6);
        assert_eq!(location.to_string(), "test.c:[2:3-2:5]");
    }

    #[test]
    fn tabs_jump_to_stop() {
        let source = Source::new("test.c", "\tx");
        let location = source.locate(1..2);

        assert_eq!(location.start().column(), 5);
        assert_eq!(location.to_string(), "test.c:1:5");
    }

    #[test]
    fn lines_without_terminators() {
        let source = Source::new("test.c", "a\r\nb\n");

        assert_eq!(source.line(1), Some("a"));
        assert_eq!(source.line(2), Some("b"));
        assert_eq!(source.line(3), Some(""));
        assert_eq!(source.line(4), None);
    }

    #[test]
    fn eof_points_past_end() {
        let source = Source::new("test.c", "ab");
        assert_eq!(source.eof().start().column(), 3);
    }
}
