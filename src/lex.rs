//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto de un
//! [`Source`] en unidades léxicas denominadas tokens. Los espacios en
//! blanco se descartan durante esta operación. Cada token emitido está
//! asociado a una ubicación en el código fuente original, lo cual permite
//! rastrear errores en tanto los mismos como constructos más elevados de
//! fases posteriores.
//!
//! # Patrón combinado
//! El escaneo se realiza con una sola expresión regular compuesta por
//! alternativas en orden de prioridad: literales de cadena, términos
//! (identificadores o palabras clave), constantes flotantes, constantes
//! enteras, operadores de dos caracteres antes que los de uno, puntuación
//! y finalmente cualquier otro carácter visible. Esta última alternativa
//! garantiza que ningún lexema se descarte en silencio: lo que no cae en
//! ninguna categoría se reporta como error.
//!
//! # Errores
//! Un lexema inválido no detiene el análisis. Se reporta y se excluye del
//! flujo ordenado de tokens, y el escaneo continúa con el resto de la
//! entrada.

use crate::source::{Located, Source};
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
    sync::OnceLock,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Lexema que no pertenece a ninguna categoría conocida.
    #[error("Unrecognized lexeme `{0}`")]
    BadLexeme(String),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal `{0}` overflows, valid range is [0, 9223372036854775807]")]
    IntOverflow(String),

    /// Constante flotante fuera del rango de `f64`.
    #[error("Float literal `{0}` is out of range")]
    FloatOverflow(String),
}

impl LexerError {
    /// Lexema original que causó el error.
    pub fn lexeme(&self) -> &str {
        match self {
            LexerError::BadLexeme(lexeme)
            | LexerError::IntOverflow(lexeme)
            | LexerError::FloatOverflow(lexeme) => lexeme,
        }
    }
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Self {
        Identifier(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Valor numérico de una constante.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Display for Number {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(integer) => write!(fmt, "{}", integer),

            // Un flotante entero conserva su punto decimal
            Number::Float(float) if float.is_finite() && float.fract() == 0.0 => {
                write!(fmt, "{:.1}", float)
            }

            Number::Float(float) => write!(fmt, "{}", float),
        }
    }
}

/// Literal numérico junto a su lexema original.
#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    lexeme: Rc<str>,
    value: Number,
}

impl Constant {
    pub fn value(&self) -> Number {
        self.value
    }
}

impl Display for Constant {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.lexeme)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente. Su representación textual
/// ([`Display`]) es siempre el lexema original.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal numérico, entero o flotante.
    Constant(Constant),

    /// Literal de cadena, comillas incluidas.
    Str(Rc<str>),

    /// `=`
    Assign,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `<`
    Less,

    /// `>`
    Greater,

    /// `<=`
    LessOrEqual,

    /// `>=`
    GreaterOrEqual,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `++`
    Increment,

    /// `--`
    Decrement,

    /// `;`
    Semicolon,

    /// `,`
    Comma,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl Token {
    /// Categoría léxica del token.
    pub fn category(&self) -> Category {
        use Token::*;

        match self {
            Id(_) => Category::Identifier,
            Keyword(_) => Category::Keyword,
            Constant(_) => Category::Constant,
            Str(_) => Category::String,

            Assign | Plus | Minus | Times | Slash | Less | Greater | LessOrEqual
            | GreaterOrEqual | Equal | NotEqual | Increment | Decrement => Category::Operator,

            Semicolon | Comma | OpenParen | CloseParen | OpenCurly | CloseCurly => {
                Category::Punctuation
            }
        }
    }

    fn symbol(lexeme: &str) -> Option<Token> {
        use Token::*;

        let token = match lexeme {
            "=" => Assign,
            "+" => Plus,
            "-" => Minus,
            "*" => Times,
            "/" => Slash,
            "<" => Less,
            ">" => Greater,
            "<=" => LessOrEqual,
            ">=" => GreaterOrEqual,
            "==" => Equal,
            "!=" => NotEqual,
            "++" => Increment,
            "--" => Decrement,
            ";" => Semicolon,
            "," => Comma,
            "(" => OpenParen,
            ")" => CloseParen,
            "{" => OpenCurly,
            "}" => CloseCurly,
            _ => return None,
        };

        Some(token)
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => id.fmt(fmt),
            Keyword(keyword) => keyword.fmt(fmt),
            Constant(constant) => constant.fmt(fmt),
            Str(string) => fmt.write_str(string),
            Assign => fmt.write_str("="),
            Plus => fmt.write_str("+"),
            Minus => fmt.write_str("-"),
            Times => fmt.write_str("*"),
            Slash => fmt.write_str("/"),
            Less => fmt.write_str("<"),
            Greater => fmt.write_str(">"),
            LessOrEqual => fmt.write_str("<="),
            GreaterOrEqual => fmt.write_str(">="),
            Equal => fmt.write_str("=="),
            NotEqual => fmt.write_str("!="),
            Increment => fmt.write_str("++"),
            Decrement => fmt.write_str("--"),
            Semicolon => fmt.write_str(";"),
            Comma => fmt.write_str(","),
            OpenParen => fmt.write_str("("),
            CloseParen => fmt.write_str(")"),
            OpenCurly => fmt.write_str("{"),
            CloseCurly => fmt.write_str("}"),
        }
    }
}

/// Categoría léxica, en el orden en que se reportan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Keyword,
    Identifier,
    Operator,
    Constant,
    String,
    Punctuation,
}

impl Display for Category {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            Category::Keyword => "Keyword",
            Category::Identifier => "Identifier",
            Category::Operator => "Operator",
            Category::Constant => "Constant",
            Category::String => "String",
            Category::Punctuation => "Punctuation",
        };

        fmt.write_str(string)
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Int,
    Float,
    String,
    Void,
    Return,
    If,
    Else,
    For,
    While,
    Printf,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Int    => "int",
            Float  => "float",
            String => "string",
            Void   => "void",
            Return => "return",
            If     => "if",
            Else   => "else",
            For    => "for",
            While  => "while",
            Printf => "printf",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("int",    Int),
            ("float",  Float),
            ("string", String),
            ("void",   Void),
            ("return", Return),
            ("if",     If),
            ("else",   Else),
            ("for",    For),
            ("while",  While),
            ("printf", Printf),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Patrón combinado, en orden de prioridad.
fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?P<string>"[^"\n]*")"#,
            r"|(?P<word>[A-Za-z_][A-Za-z0-9_]*)",
            r"|(?P<float>[0-9]+\.[0-9]+)",
            r"|(?P<int>[0-9]+)",
            r"|(?P<symbol>==|!=|<=|>=|\+\+|--|[-+*/=<>;,(){}])",
            r"|(?P<other>\S)",
        ))
        .expect("lexer pattern is valid")
    })
}

/// Escáner sobre el texto completo de un [`Source`].
pub struct Lexer {
    source: Rc<Source>,
    offset: usize,
}

impl Lexer {
    /// Crea un lexer posicionado al inicio del texto.
    pub fn new(source: Rc<Source>) -> Self {
        Lexer { source, offset: 0 }
    }

    /// Consume la entrada completa.
    ///
    /// A diferencia de una compilación normal, los errores léxicos no
    /// impiden que se continúe con los tokens válidos; ambos conjuntos
    /// se retornan por separado, cada uno en orden de aparición.
    pub fn exhaust(self) -> (Vec<Located<Token>>, Vec<Located<LexerError>>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        for result in self {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => errors.push(error),
            }
        }

        tracing::debug!(
            tokens = tokens.len(),
            errors = errors.len(),
            "lexical analysis finished"
        );

        (tokens, errors)
    }

    /// Clasifica un único lexema emparejado por el patrón.
    fn classify(captures: &regex::Captures<'_>) -> Result<Token, LexerError> {
        if let Some(string) = captures.name("string") {
            return Ok(Token::Str(Rc::from(string.as_str())));
        }

        if let Some(word) = captures.name("word") {
            let word = word.as_str();
            return Ok(match Keyword::from_str(word) {
                Ok(keyword) => Token::Keyword(keyword),
                Err(()) => Token::Id(Identifier::new(word)),
            });
        }

        if let Some(float) = captures.name("float") {
            let lexeme = float.as_str();
            let value = lexeme
                .parse::<f64>()
                .map_err(|_| LexerError::BadLexeme(lexeme.to_owned()))?;

            if !value.is_finite() {
                return Err(LexerError::FloatOverflow(lexeme.to_owned()));
            }

            return Ok(Token::Constant(Constant {
                lexeme: Rc::from(lexeme),
                value: Number::Float(value),
            }));
        }

        if let Some(int) = captures.name("int") {
            let lexeme = int.as_str();
            let value = lexeme
                .parse()
                .map_err(|_| LexerError::IntOverflow(lexeme.to_owned()))?;

            return Ok(Token::Constant(Constant {
                lexeme: Rc::from(lexeme),
                value: Number::Int(value),
            }));
        }

        // Solo queda `symbol` u `other`
        let lexeme = captures.get(0).map_or("", |whole| whole.as_str());
        Token::symbol(lexeme).ok_or_else(|| LexerError::BadLexeme(lexeme.to_owned()))
    }
}

impl Iterator for Lexer {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        let captures = pattern().captures_at(self.source.text(), self.offset)?;
        let whole = captures.get(0)?;

        self.offset = whole.end();
        let location = self.source.locate(whole.range());

        Some(match Lexer::classify(&captures) {
            Ok(token) => Ok(Located::at(token, location)),
            Err(error) => Err(Located::at(error, location)),
        })
    }
}

/// Reporte categorizado de un análisis léxico.
///
/// Cada categoría agrupa sus lexemas únicos en orden lexicográfico.
/// Los lexemas inválidos se listan aparte, en orden de aparición.
#[derive(Debug, Default)]
pub struct Report {
    categories: BTreeMap<Category, BTreeSet<String>>,
    invalid: Vec<String>,
}

impl Report {
    pub fn new(tokens: &[Located<Token>], errors: &[Located<LexerError>]) -> Self {
        let mut categories: BTreeMap<_, BTreeSet<_>> = BTreeMap::new();
        for token in tokens {
            let token = token.as_ref();
            categories
                .entry(token.category())
                .or_default()
                .insert(token.to_string());
        }

        let invalid = errors
            .iter()
            .map(|error| error.as_ref().lexeme().to_owned())
            .collect();

        Report {
            categories,
            invalid,
        }
    }

    /// Lexemas únicos de una categoría.
    pub fn lexemes(&self, category: Category) -> impl Iterator<Item = &str> {
        self.categories
            .get(&category)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Lexemas inválidos, en orden de aparición.
    pub fn invalid(&self) -> &[String] {
        &self.invalid
    }
}

impl Display for Report {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (category, lexemes) in &self.categories {
            let lexemes: Vec<_> = lexemes.iter().map(String::as_str).collect();
            writeln!(fmt, "{} ({}): {}", category, lexemes.len(), lexemes.join(", "))?;
        }

        if !self.invalid.is_empty() {
            writeln!(
                fmt,
                "Invalid Tokens ({}): {}",
                self.invalid.len(),
                self.invalid.join(", ")
            )?;
        }

        Ok(())
    }
}
