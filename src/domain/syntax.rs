//! Parse tree produced by the grammar.
//!
//! Nodes keep the matched lexemes as text together with their source span.
//! Conversion into typed values is the AST builder's job.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseTree {
    pub statements: Vec<SyntaxStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxStatement {
    Assignment {
        variable: String,
        value: Node,
        span: Span,
    },
    Call {
        command: String,
        arguments: Vec<Node>,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub literal: Literal,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Variable(String),
    DateTime {
        date: DateFields,
        hour: String,
        minute: String,
        second: Option<String>,
    },
    Date(DateFields),
    Offset {
        negative: bool,
        magnitude: String,
        unit: String,
    },
    TimeFrame {
        count: String,
        unit: String,
    },
    Symbol(String),
    Numeric(String),
    Keyword(String),
    /// Text between the quotes, escape sequences not yet resolved.
    Text(String),
    SymbolArray(Vec<ArrayElement>),
    Parameters(Vec<SyntaxParameter>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateFields {
    pub year: String,
    pub month: String,
    pub day: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    None,
    /// `,`
    Plain,
    /// `|`
    Emphasized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElement {
    pub separator: Separator,
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxParameter {
    pub name: String,
    pub value: ParameterLiteral,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterLiteral {
    Range {
        low: String,
        high: Option<String>,
        step: Option<String>,
    },
    NumericList(Vec<String>),
    StringList(Vec<String>),
    Text(String),
    Bool(String),
    Numeric(String),
}
