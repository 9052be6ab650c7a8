//! Análisis sintáctico.
//!
//! La única forma aceptada en el nivel superior es
//! `void main ( ) { <sentencias> }`. Cualquier desviación en el
//! encabezado es fatal y no hay recuperación a través de esa frontera.
//!
//! Dentro del cuerpo el parser es tolerante: cada sentencia se
//! reconoce por su primer token y luego se escanea linealmente hasta
//! su siguiente delimitador estructural, sin retroceso. Una sentencia
//! malformada nunca se descarta por completo, sino que se absorbe en
//! el nodo que se estaba construyendo. Condiciones, encabezados de
//! `for`, argumentos y lados derechos se conservan como regiones
//! planas de tokens; su estructura interna la resuelve [`crate::expr`]
//! al generar TAC.

use std::{
    fmt::{self, Display},
    iter::Peekable,
};

use thiserror::Error;

use crate::{
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

/// Árbol sintáctico de un programa completo.
#[derive(Debug)]
pub struct Ast {
    name: Located<Identifier>,
    body: Block,
}

impl Ast {
    /// Árbol de un programa cuyo encabezado no se reconoció: la función
    /// `main` sin sentencias. `location` es la del error de encabezado.
    pub fn empty(location: Location) -> Ast {
        Ast {
            name: Located::at(Identifier::new("main"), location),
            body: Vec::new(),
        }
    }

    /// Sentencias del cuerpo de la función.
    pub fn body(&self) -> &[Located<Statement>] {
        &self.body
    }
}

/// Secuencia de sentencias entre llaves.
pub type Block = Vec<Located<Statement>>;

/// Tipo declarado.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    String,
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => fmt.write_str("int"),
            Type::Float => fmt.write_str("float"),
            Type::String => fmt.write_str("string"),
        }
    }
}

/// Región plana de tokens, tal cual aparecen en el código fuente.
#[derive(Debug, Clone, Default)]
pub struct Region(Vec<Located<Token>>);

impl Region {
    pub fn tokens(&self) -> &[Located<Token>] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rama `else` de un `if`.
#[derive(Debug)]
pub struct Else {
    pub body: Option<Block>,
}

/// Una sentencia.
///
/// Los componentes opcionales están ausentes cuando el delimitador que
/// los introduce (`(` o `{`) no se encontró.
#[derive(Debug)]
pub enum Statement {
    Declaration {
        typ: Type,
        declarators: Region,
        terminated: bool,
    },

    If {
        condition: Option<Region>,
        body: Option<Block>,
        otherwise: Option<Else>,
    },

    While {
        condition: Option<Region>,
        body: Option<Block>,
    },

    For {
        header: Option<Region>,
        body: Option<Block>,
    },

    Print {
        arguments: Option<Region>,
        terminated: bool,
    },

    Return {
        value: Region,
        terminated: bool,
    },

    /// Asignación o expresión suelta.
    Expression {
        tokens: Region,
        terminated: bool,
    },
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Missing or invalid function header (expected `void main()`)")]
    BadHeader,

    #[error("Missing opening `{{` of function body")]
    MissingBody,
}

/// Construye el árbol a partir del flujo ordenado de tokens.
///
/// `eof` es la ubicación que se reporta para errores al final de la entrada.
pub fn parse<'a, I>(tokens: I, eof: Location) -> Result<Ast, Located<ParserError>>
where
    I: Iterator<Item = &'a Located<Token>>,
{
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: eof.clone(),
        eof,
    };

    parser.program()
}

struct Parser<I: Iterator> {
    tokens: Peekable<I>,
    last_known: Location,
    eof: Location,
}

type Parse<T> = Result<T, Located<ParserError>>;

impl<'a, I: Iterator<Item = &'a Located<Token>>> Parser<I> {
    fn program(&mut self) -> Parse<Ast> {
        let name = self.header()?;

        match self.peek() {
            Some(token) if *token.val() == Token::OpenCurly => self.advance(),
            Some(token) => return self.fail_at(ParserError::MissingBody, token.location()),
            None => return self.fail_at(ParserError::MissingBody, &self.eof),
        }

        let body = self.statements();
        self.eat(&Token::CloseCurly);

        let trailing = self.tokens.by_ref().count();
        if trailing > 0 {
            tracing::warn!(trailing, "ignoring tokens after the function body");
        }

        tracing::debug!(statements = body.len(), "parsing finished");
        Ok(Ast { name, body })
    }

    fn header(&mut self) -> Parse<Located<Identifier>> {
        let mut name = None;

        for expected in 0..4 {
            let token = match self.peek() {
                Some(token) => token,
                None => return self.fail_at(ParserError::BadHeader, &self.eof),
            };

            let ok = match (expected, token.val()) {
                (0, Token::Keyword(Keyword::Void)) => true,
                (1, Token::Id(id)) if id.as_str() == "main" => {
                    name = Some(Located::at(id.clone(), token.location().clone()));
                    true
                }

                (2, Token::OpenParen) | (3, Token::CloseParen) => true,
                _ => false,
            };

            if !ok {
                return self.fail_at(ParserError::BadHeader, token.location());
            }

            self.advance();
        }

        match name {
            Some(name) => Ok(name),
            None => self.fail_at(ParserError::BadHeader, &self.eof),
        }
    }

    /// Sentencias hasta la `}` que cierra el bloque actual, sin consumirla.
    fn statements(&mut self) -> Block {
        let mut statements = Vec::new();
        while let Some(token) = self.peek() {
            if *token.val() == Token::CloseCurly {
                break;
            }

            statements.push(self.statement(token));
        }

        statements
    }

    fn statement(&mut self, first: &Located<Token>) -> Located<Statement> {
        let start = first.location().clone();

        let statement = match first.val() {
            Token::Keyword(Keyword::Int) => self.declaration(Type::Int),
            Token::Keyword(Keyword::Float) => self.declaration(Type::Float),
            Token::Keyword(Keyword::String) => self.declaration(Type::String),
            Token::Keyword(Keyword::If) => self.if_statement(),
            Token::Keyword(Keyword::While) => self.while_loop(),
            Token::Keyword(Keyword::For) => self.for_loop(),
            Token::Keyword(Keyword::Printf) => self.print(),
            Token::Keyword(Keyword::Return) => self.return_statement(),
            _ => self.expression_statement(),
        };

        Located::at(statement, Location::span(start, &self.last_known))
    }

    fn declaration(&mut self, typ: Type) -> Statement {
        self.advance();

        let declarators = self.scan_until_end();
        let terminated = self.eat(&Token::Semicolon);

        Statement::Declaration {
            typ,
            declarators,
            terminated,
        }
    }

    fn if_statement(&mut self) -> Statement {
        self.advance();

        let condition = self.parenthesized();
        let body = self.block();

        let otherwise = if self.eat(&Token::Keyword(Keyword::Else)) {
            Some(Else { body: self.block() })
        } else {
            None
        };

        Statement::If {
            condition,
            body,
            otherwise,
        }
    }

    fn while_loop(&mut self) -> Statement {
        self.advance();

        let condition = self.parenthesized();
        let body = self.block();

        Statement::While { condition, body }
    }

    fn for_loop(&mut self) -> Statement {
        self.advance();

        let header = self.parenthesized();
        let body = self.block();

        Statement::For { header, body }
    }

    fn print(&mut self) -> Statement {
        self.advance();

        let arguments = self.parenthesized();
        let terminated = self.eat(&Token::Semicolon);

        Statement::Print {
            arguments,
            terminated,
        }
    }

    fn return_statement(&mut self) -> Statement {
        self.advance();

        let value = self.scan_until_end();
        let terminated = self.eat(&Token::Semicolon);

        Statement::Return { value, terminated }
    }

    fn expression_statement(&mut self) -> Statement {
        let tokens = self.scan_until_end();
        let terminated = self.eat(&Token::Semicolon);

        Statement::Expression { tokens, terminated }
    }

    /// Región entre `(` y su `)` correspondiente.
    ///
    /// Los paréntesis interiores se balancean. Una llave detiene el
    /// escaneo, ya que no puede formar parte de la región.
    fn parenthesized(&mut self) -> Option<Region> {
        if !self.eat(&Token::OpenParen) {
            return None;
        }

        let mut tokens = Vec::new();
        let mut depth = 0usize;

        while let Some(token) = self.peek() {
            match token.val() {
                Token::CloseParen if depth == 0 => break,
                Token::OpenCurly | Token::CloseCurly => break,
                Token::OpenParen => depth += 1,
                Token::CloseParen => depth -= 1,
                _ => (),
            }

            tokens.push(token.clone());
            self.advance();
        }

        self.eat(&Token::CloseParen);
        Some(Region(tokens))
    }

    /// Bloque entre llaves, si lo hay.
    fn block(&mut self) -> Option<Block> {
        if !self.eat(&Token::OpenCurly) {
            return None;
        }

        let statements = self.statements();
        self.eat(&Token::CloseCurly);

        Some(statements)
    }

    /// Tokens hasta `;` o hasta la `}` del bloque, sin consumir ninguno.
    fn scan_until_end(&mut self) -> Region {
        let mut tokens = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token.val(), Token::Semicolon | Token::CloseCurly) {
                break;
            }

            tokens.push(token.clone());
            self.advance();
        }

        Region(tokens)
    }

    /// Consume el siguiente token si es igual al esperado.
    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(token) if token.val() == expected => {
                self.advance();
                true
            }

            _ => false,
        }
    }

    fn peek(&mut self) -> Option<&'a Located<Token>> {
        self.tokens.peek().copied()
    }

    fn advance(&mut self) {
        if let Some(token) = self.tokens.next() {
            self.last_known = token.location().clone();
        }
    }

    fn fail_at<T>(&self, error: ParserError, location: &Location) -> Parse<T> {
        Err(Located::at(error, location.clone()))
    }
}

impl Display for Ast {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tree = Tree { fmt, level: 0 };

        tree.node("Program", |tree| {
            tree.node("Function", |tree| {
                tree.token(&Token::Keyword(Keyword::Void))?;
                tree.token(&Token::Id(self.name.val().clone()))?;
                tree.token(&Token::OpenParen)?;
                tree.token(&Token::CloseParen)?;
                tree.token(&Token::OpenCurly)?;
                tree.node("Body", |tree| tree.statements(&self.body))?;
                tree.token(&Token::CloseCurly)
            })
        })
    }
}

/// Impresión indentada del árbol.
///
/// Cada nodo se imprime con una indentación proporcional a su
/// profundidad; los valores terminales se imprimen un nivel más
/// adentro y con un prefijo distinto.
struct Tree<'f, 'a> {
    fmt: &'f mut fmt::Formatter<'a>,
    level: usize,
}

impl Tree<'_, '_> {
    fn node<F>(&mut self, name: &str, children: F) -> fmt::Result
    where
        F: FnOnce(&mut Self) -> fmt::Result,
    {
        let branch = if self.level > 0 { "├── " } else { "" };
        writeln!(self.fmt, "{:indent$}{}{}", "", branch, name, indent = self.level * 4)?;

        self.level += 1;
        let result = children(self);
        self.level -= 1;

        result
    }

    fn leaf(&mut self, value: &dyn Display) -> fmt::Result {
        writeln!(self.fmt, "{:indent$}└── {}", "", value, indent = self.level * 4)
    }

    fn token(&mut self, token: &Token) -> fmt::Result {
        self.node(&token.category().to_string(), |tree| tree.leaf(token))
    }

    fn tokens(&mut self, region: &Region) -> fmt::Result {
        region
            .tokens()
            .iter()
            .try_for_each(|token| self.token(token.as_ref()))
    }

    fn terminator(&mut self, terminated: bool) -> fmt::Result {
        if terminated {
            self.token(&Token::Semicolon)
        } else {
            Ok(())
        }
    }

    fn region(&mut self, name: &str, region: &Option<Region>) -> fmt::Result {
        match region {
            Some(region) => self.node(name, |tree| tree.tokens(region)),
            None => Ok(()),
        }
    }

    fn block(&mut self, name: &str, block: &Option<Block>) -> fmt::Result {
        match block {
            Some(block) => self.node(name, |tree| tree.statements(block)),
            None => Ok(()),
        }
    }

    fn statements(&mut self, statements: &[Located<Statement>]) -> fmt::Result {
        statements
            .iter()
            .try_for_each(|statement| self.statement(statement.as_ref()))
    }

    fn statement(&mut self, statement: &Statement) -> fmt::Result {
        use Statement::*;

        match statement {
            Declaration {
                typ,
                declarators,
                terminated,
            } => self.node("Declaration", |tree| {
                tree.node("Type", |tree| tree.leaf(typ))?;
                tree.tokens(declarators)?;
                tree.terminator(*terminated)
            }),

            If {
                condition,
                body,
                otherwise,
            } => self.node("IfStatement", |tree| {
                tree.token(&Token::Keyword(Keyword::If))?;
                tree.region("Condition", condition)?;
                tree.block("IfBody", body)?;

                match otherwise {
                    Some(otherwise) => tree.node("ElseStatement", |tree| {
                        tree.token(&Token::Keyword(Keyword::Else))?;
                        tree.block("ElseBody", &otherwise.body)
                    }),

                    None => Ok(()),
                }
            }),

            While { condition, body } => self.node("WhileLoop", |tree| {
                tree.token(&Token::Keyword(Keyword::While))?;
                tree.region("Condition", condition)?;
                tree.block("LoopBody", body)
            }),

            For { header, body } => self.node("ForLoop", |tree| {
                tree.token(&Token::Keyword(Keyword::For))?;
                tree.region("Header", header)?;
                tree.block("LoopBody", body)
            }),

            Print {
                arguments,
                terminated,
            } => self.node("PrintStatement", |tree| {
                tree.token(&Token::Keyword(Keyword::Printf))?;
                tree.region("Arguments", arguments)?;
                tree.terminator(*terminated)
            }),

            Return { value, terminated } => self.node("ReturnStatement", |tree| {
                tree.token(&Token::Keyword(Keyword::Return))?;
                tree.tokens(value)?;
                tree.terminator(*terminated)
            }),

            Expression { tokens, terminated } => self.node("Statement", |tree| {
                tree.tokens(tokens)?;
                tree.terminator(*terminated)
            }),
        }
    }
}
