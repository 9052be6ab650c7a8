//! Compilador de un subconjunto de C hacia pseudo-ensamblador.
//!
//! # Front end
//! Cada programa deriva de un único texto fuente, representado por
//! [`source::Source`]. Este texto se somete primero a análisis léxico
//! en [`lex`], de lo cual se obtiene un flujo de tokens y un conjunto
//! de lexemas inválidos. El flujo de tokens se dispone en un árbol
//! sintáctico por medio de análisis sintáctico en [`parse`]. Las
//! expresiones dentro del árbol se conservan como regiones planas de
//! tokens hasta que [`expr`] las convierte en árboles de expresión.
//!
//! # Representación intermedia
//! El árbol se traduce en [`lower`] a código de tres direcciones,
//! descrito en [`ir`]. Esta representación pasa por las cuatro
//! pasadas de [`opt`], cada una independiente de las demás.
//!
//! # Back end
//! Finalmente, [`codegen`] traduce el TAC optimizado a un
//! pseudo-ensamblador de tres operandos sobre registros virtuales
//! ilimitados. No existe un objetivo real ni asignación de registros.
//!
//! Los errores de todas las fases se reportan por medio de
//! [`error::Diagnostics`].

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod expr;
pub mod ir;
pub mod lex;
pub mod lower;
pub mod opt;
pub mod parse;
pub mod source;
