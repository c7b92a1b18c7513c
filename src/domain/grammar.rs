//! Script grammar.
//!
//! An ordered-choice (PEG) grammar over a line-oriented program:
//!
//! ```text
//! Program    = (Statement? (EOL | EOI))*
//! Statement  = Assignment / Call
//! Assignment = "$" Ident "=" Value
//! Call       = Ident (Value ("," Value)*)?
//! Value      = Variable / DateTime / Date / Offset / TimeFrame / Symbol
//!            / Numeric / Keyword / String / SymbolArray / Parameters
//! ```
//!
//! Every alternative restores the input position when it fails. Failures are
//! recorded at the rightmost position reached so a syntax error always points
//! at the furthest place the grammar could not advance past.

use crate::domain::error::ParseError;
use crate::domain::syntax::{
    ArrayElement, DateFields, Literal, Node, ParameterLiteral, ParseTree, Separator, Span,
    SyntaxParameter, SyntaxStatement,
};
use crate::domain::value::ALL_SYMBOLS;
use std::fmt;

const KEYWORDS: &[&str] = &["true", "false", "first", "last", "now", "daily", ALL_SYMBOLS];
// "mo" must precede "m".
const OFFSET_UNITS: &[&str] = &["mo", "m", "h", "d", "w", "y"];
const TIME_FRAME_UNITS: &[&str] = &["m", "h"];

/// The lexical tables and rules of the script language. Built once per engine.
#[derive(Debug, Clone)]
pub struct Grammar {
    keywords: &'static [&'static str],
    offset_units: &'static [&'static str],
    time_frame_units: &'static [&'static str],
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub fn new() -> Self {
        Self {
            keywords: KEYWORDS,
            offset_units: OFFSET_UNITS,
            time_frame_units: TIME_FRAME_UNITS,
        }
    }

    pub fn parse(&self, input: &str) -> Result<ParseTree, ParseError> {
        Parser::new(self, input).program()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Token(&'static str),
    Class(&'static str),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Token(token) => write!(f, "'{}'", token),
            Expected::Class(class) => write!(f, "{}", class),
        }
    }
}

type Rule<'g, 'a, T> = fn(&mut Parser<'g, 'a>) -> Option<T>;

struct Parser<'g, 'a> {
    grammar: &'g Grammar,
    input: &'a str,
    pos: usize,
    furthest: usize,
    expected: Vec<Expected>,
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

impl<'g, 'a> Parser<'g, 'a> {
    fn new(grammar: &'g Grammar, input: &'a str) -> Self {
        Self {
            grammar,
            input,
            pos: 0,
            furthest: 0,
            expected: Vec::new(),
        }
    }

    // Helpers

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn fail<T>(&mut self, expected: Expected) -> Option<T> {
        if self.pos > self.furthest {
            self.furthest = self.pos;
            self.expected.clear();
        }
        if self.pos == self.furthest && !self.expected.contains(&expected) {
            self.expected.push(expected);
        }
        None
    }

    /// Run `rule`, rewinding to the starting position if it fails.
    fn attempt<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let start = self.pos;
        let result = rule(self);
        if result.is_none() {
            self.pos = start;
        }
        result
    }

    fn error(&self) -> ParseError {
        let found = match self.input[self.furthest..].chars().next() {
            Some('\n') | Some('\r') => "end of line".to_string(),
            Some(ch) => format!("'{}'", ch),
            None => "end of input".to_string(),
        };
        let expected: Vec<String> = self.expected.iter().map(ToString::to_string).collect();
        let message = match expected.split_last() {
            None => format!("unexpected {}", found),
            Some((last, [])) => format!("expected {}, found {}", last, found),
            Some((last, rest)) => format!("expected {} or {}, found {}", rest.join(", "), last, found),
        };
        ParseError {
            message,
            position: self.furthest,
            expected,
        }
    }

    // Terminals

    fn token(&mut self, token: &'static str) -> Option<()> {
        if self.remaining().starts_with(token) {
            self.pos += token.len();
            Some(())
        } else {
            self.fail(Expected::Token(token))
        }
    }

    fn word_end(&mut self) -> Option<()> {
        if self.peek().is_some_and(is_word_char) {
            self.fail(Expected::Class("end of word"))
        } else {
            Some(())
        }
    }

    fn ws(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
    }

    fn ws1(&mut self) -> Option<()> {
        let start = self.pos;
        self.ws();
        if self.pos == start {
            self.fail(Expected::Class("whitespace"))
        } else {
            Some(())
        }
    }

    /// Whitespace including line breaks, used inside brackets and braces.
    fn ws_nl(&mut self) {
        while self.peek().is_some_and(|ch| ch.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn ws1_nl(&mut self) -> Option<()> {
        let start = self.pos;
        self.ws_nl();
        if self.pos == start {
            self.fail(Expected::Class("whitespace"))
        } else {
            Some(())
        }
    }

    fn end_of_line(&mut self) -> Option<()> {
        if self.remaining().starts_with("\r\n") {
            self.pos += 2;
            Some(())
        } else if self.remaining().starts_with('\n') {
            self.pos += 1;
            Some(())
        } else {
            self.fail(Expected::Class("end of line"))
        }
    }

    fn digits_exact(&mut self, count: usize) -> Option<&'a str> {
        let start = self.pos;
        for _ in 0..count {
            match self.peek() {
                Some(ch) if ch.is_ascii_digit() => self.pos += 1,
                _ => return self.fail(Expected::Class("digit")),
            }
        }
        Some(&self.input[start..self.pos])
    }

    fn digits(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            self.fail(Expected::Class("digit"))
        } else {
            Some(&self.input[start..self.pos])
        }
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.pos += 1,
            _ => return self.fail(Expected::Class("identifier")),
        }
        while self.peek().is_some_and(is_word_char) {
            self.pos += 1;
        }
        Some(&self.input[start..self.pos])
    }

    fn unit(&mut self, units: &'static [&'static str]) -> Option<&'static str> {
        for &unit in units {
            if self.remaining().starts_with(unit) {
                self.pos += unit.len();
                return Some(unit);
            }
        }
        self.fail(Expected::Class("time unit"))
    }

    fn number(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.pos += 1;
        }
        self.digits()?;
        self.attempt(|p| {
            p.token(".")?;
            p.digits()
        });
        Some(&self.input[start..self.pos])
    }

    fn string_lexeme(&mut self) -> Option<&'a str> {
        self.token("\"")?;
        let start = self.pos;
        loop {
            match self.peek() {
                Some('"') => {
                    let text = &self.input[start..self.pos];
                    self.pos += 1;
                    return Some(text);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('"') | Some('\\') | Some('n') | Some('t') => self.pos += 1,
                        _ => return self.fail(Expected::Class("escape sequence")),
                    }
                }
                Some('\n') | Some('\r') | None => return self.fail(Expected::Token("\"")),
                Some(ch) => self.pos += ch.len_utf8(),
            }
        }
    }

    // Program and statements

    fn program(&mut self) -> Result<ParseTree, ParseError> {
        let mut tree = ParseTree::default();
        loop {
            self.ws();
            if self.at_end() {
                break;
            }
            if self.end_of_line().is_some() {
                continue;
            }
            match self.statement() {
                Some(statement) => tree.statements.push(statement),
                None => return Err(self.error()),
            }
            self.ws();
            if self.at_end() {
                break;
            }
            if self.end_of_line().is_none() {
                return Err(self.error());
            }
        }
        Ok(tree)
    }

    fn statement(&mut self) -> Option<SyntaxStatement> {
        self.attempt(Self::assignment)
            .or_else(|| self.attempt(Self::call))
    }

    fn assignment(&mut self) -> Option<SyntaxStatement> {
        let start = self.pos;
        self.token("$")?;
        let variable = self.identifier()?;
        self.ws();
        self.token("=")?;
        self.ws();
        let value = self.value()?;
        Some(SyntaxStatement::Assignment {
            variable: variable.to_string(),
            value,
            span: Span::new(start, self.pos),
        })
    }

    fn call(&mut self) -> Option<SyntaxStatement> {
        let start = self.pos;
        let command = self.identifier()?;
        let mut arguments = Vec::new();
        if let Some(first) = self.attempt(|p| {
            p.ws1()?;
            p.value()
        }) {
            arguments.push(first);
            while let Some(next) = self.attempt(|p| {
                p.ws();
                p.token(",")?;
                p.ws();
                p.value()
            }) {
                arguments.push(next);
            }
        }
        Some(SyntaxStatement::Call {
            command: command.to_string(),
            arguments,
            span: Span::new(start, self.pos),
        })
    }

    // Values, in declared precedence

    fn value(&mut self) -> Option<Node> {
        let start = self.pos;
        let rules: [Rule<'g, 'a, Literal>; 11] = [
            Self::variable,
            Self::date_time,
            Self::date,
            Self::offset,
            Self::time_frame,
            Self::symbol,
            Self::numeric,
            Self::keyword,
            Self::text,
            Self::symbol_array,
            Self::parameters,
        ];
        for rule in rules {
            if let Some(literal) = self.attempt(rule) {
                return Some(Node {
                    literal,
                    span: Span::new(start, self.pos),
                });
            }
        }
        self.fail(Expected::Class("value"))
    }

    fn variable(&mut self) -> Option<Literal> {
        self.token("$")?;
        let name = self.identifier()?;
        Some(Literal::Variable(name.to_string()))
    }

    fn date_fields(&mut self) -> Option<DateFields> {
        let year = self.digits_exact(4)?;
        self.token("-")?;
        let month = self.digits_exact(2)?;
        self.token("-")?;
        let day = self.digits_exact(2)?;
        Some(DateFields {
            year: year.to_string(),
            month: month.to_string(),
            day: day.to_string(),
        })
    }

    fn date_time(&mut self) -> Option<Literal> {
        let date = self.date_fields()?;
        self.token(" ")?;
        let hour = self.digits_exact(2)?;
        self.token(":")?;
        let minute = self.digits_exact(2)?;
        let second = self.attempt(|p| {
            p.token(":")?;
            p.digits_exact(2)
        });
        self.word_end()?;
        Some(Literal::DateTime {
            date,
            hour: hour.to_string(),
            minute: minute.to_string(),
            second: second.map(str::to_string),
        })
    }

    fn date(&mut self) -> Option<Literal> {
        let date = self.date_fields()?;
        self.word_end()?;
        Some(Literal::Date(date))
    }

    fn offset(&mut self) -> Option<Literal> {
        let negative = match self.peek() {
            Some('+') => false,
            Some('-') => true,
            _ => return self.fail(Expected::Class("'+' or '-'")),
        };
        self.pos += 1;
        let magnitude = self.digits()?;
        let unit = self.unit(self.grammar.offset_units)?;
        self.word_end()?;
        Some(Literal::Offset {
            negative,
            magnitude: magnitude.to_string(),
            unit: unit.to_string(),
        })
    }

    fn time_frame(&mut self) -> Option<Literal> {
        let count = self.digits()?;
        let unit = self.unit(self.grammar.time_frame_units)?;
        self.word_end()?;
        Some(Literal::TimeFrame {
            count: count.to_string(),
            unit: unit.to_string(),
        })
    }

    /// Two or more uppercase letters and digits, at least one of them a letter.
    fn symbol(&mut self) -> Option<Literal> {
        let start = self.pos;
        let mut has_letter = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_uppercase() {
                has_letter = true;
            } else if !ch.is_ascii_digit() {
                break;
            }
            self.pos += 1;
        }
        if self.pos - start < 2 || !has_letter {
            self.pos = start;
            return self.fail(Expected::Class("symbol"));
        }
        self.word_end()?;
        Some(Literal::Symbol(self.input[start..self.pos].to_string()))
    }

    fn numeric(&mut self) -> Option<Literal> {
        let number = self.number()?;
        Some(Literal::Numeric(number.to_string()))
    }

    fn keyword(&mut self) -> Option<Literal> {
        for word in self.grammar.keywords {
            if self.remaining().starts_with(word)
                && !self.remaining()[word.len()..]
                    .chars()
                    .next()
                    .is_some_and(is_word_char)
            {
                self.pos += word.len();
                return Some(Literal::Keyword(word.to_string()));
            }
        }
        self.fail(Expected::Class("keyword"))
    }

    fn text(&mut self) -> Option<Literal> {
        let text = self.string_lexeme()?;
        Some(Literal::Text(text.to_string()))
    }

    fn array_symbol(&mut self) -> Option<Node> {
        let start = self.pos;
        let literal = self.attempt(Self::symbol).or_else(|| {
            self.attempt(|p| {
                p.token(ALL_SYMBOLS)?;
                p.word_end()?;
                Some(Literal::Keyword(ALL_SYMBOLS.to_string()))
            })
        })?;
        Some(Node {
            literal,
            span: Span::new(start, self.pos),
        })
    }

    fn symbol_array(&mut self) -> Option<Literal> {
        self.token("[")?;
        self.ws_nl();
        let mut elements = vec![ArrayElement {
            separator: Separator::None,
            node: self.array_symbol()?,
        }];
        while let Some(element) = self.attempt(|p| {
            p.ws_nl();
            let separator = if p.token(",").is_some() {
                Separator::Plain
            } else if p.token("|").is_some() {
                Separator::Emphasized
            } else {
                return None;
            };
            p.ws_nl();
            let node = p.array_symbol()?;
            Some(ArrayElement { separator, node })
        }) {
            elements.push(element);
        }
        self.ws_nl();
        self.token("]")?;
        Some(Literal::SymbolArray(elements))
    }

    fn parameters(&mut self) -> Option<Literal> {
        self.token("{")?;
        self.ws_nl();
        let mut entries = Vec::new();
        if let Some(first) = self.attempt(Self::parameter) {
            entries.push(first);
            while let Some(next) = self.attempt(|p| {
                p.ws_nl();
                p.token(",")?;
                p.ws_nl();
                p.parameter()
            }) {
                entries.push(next);
            }
        }
        self.ws_nl();
        self.token("}")?;
        Some(Literal::Parameters(entries))
    }

    fn parameter(&mut self) -> Option<SyntaxParameter> {
        let start = self.pos;
        let name = self.identifier()?;
        self.ws_nl();
        self.token(":")?;
        self.ws_nl();
        let rules: [Rule<'g, 'a, ParameterLiteral>; 6] = [
            Self::range,
            Self::numeric_list,
            Self::string_list,
            Self::text_parameter,
            Self::bool_parameter,
            Self::numeric_parameter,
        ];
        for rule in rules {
            if let Some(value) = self.attempt(rule) {
                return Some(SyntaxParameter {
                    name: name.to_string(),
                    value,
                    span: Span::new(start, self.pos),
                });
            }
        }
        self.fail(Expected::Class("parameter value"))
    }

    /// `low [to high] [step n]` with at least one of `to` and `step`.
    fn range(&mut self) -> Option<ParameterLiteral> {
        let low = self.number()?;
        let high = self.attempt(|p| {
            p.ws1_nl()?;
            p.token("to")?;
            p.word_end()?;
            p.ws1_nl()?;
            p.number()
        });
        let step = self.attempt(|p| {
            p.ws1_nl()?;
            p.token("step")?;
            p.word_end()?;
            p.ws1_nl()?;
            p.number()
        });
        if high.is_none() && step.is_none() {
            return None;
        }
        Some(ParameterLiteral::Range {
            low: low.to_string(),
            high: high.map(str::to_string),
            step: step.map(str::to_string),
        })
    }

    fn bracketed_list(&mut self, item: Rule<'g, 'a, &'a str>) -> Option<Vec<String>> {
        self.token("[")?;
        self.ws_nl();
        let mut items = vec![item(self)?.to_string()];
        while let Some(next) = self.attempt(|p| {
            p.ws_nl();
            p.token(",")?;
            p.ws_nl();
            item(p)
        }) {
            items.push(next.to_string());
        }
        self.ws_nl();
        self.token("]")?;
        Some(items)
    }

    fn numeric_list(&mut self) -> Option<ParameterLiteral> {
        self.bracketed_list(Self::number)
            .map(ParameterLiteral::NumericList)
    }

    fn string_list(&mut self) -> Option<ParameterLiteral> {
        self.bracketed_list(Self::string_lexeme)
            .map(ParameterLiteral::StringList)
    }

    fn text_parameter(&mut self) -> Option<ParameterLiteral> {
        let text = self.string_lexeme()?;
        Some(ParameterLiteral::Text(text.to_string()))
    }

    fn bool_parameter(&mut self) -> Option<ParameterLiteral> {
        let word = if self.remaining().starts_with("true") {
            "true"
        } else if self.remaining().starts_with("false") {
            "false"
        } else {
            return self.fail(Expected::Class("boolean"));
        };
        self.pos += word.len();
        self.word_end()?;
        Some(ParameterLiteral::Bool(word.to_string()))
    }

    fn numeric_parameter(&mut self) -> Option<ParameterLiteral> {
        let number = self.number()?;
        Some(ParameterLiteral::Numeric(number.to_string()))
    }
}
