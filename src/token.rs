//! Tokens and the token cursor
//!
//! The lexer runs eagerly: a command string becomes a fully materialized list
//! of tokens terminated by an `End` token, which the interpreters then walk
//! with a [`TokenStream`] cursor.

use std::fmt;
use std::sync::Arc;

use miette::{NamedSource, SourceSpan};
use pest::Parser;

use crate::decimal::FixedDecimal;
use crate::errors::Error;
use crate::{PatherParser, Rule};

/// Semantic kind of a value: what an argument slot expects, or what an
/// expression is evaluated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    X,
    Y,
    Angle,
    Flag,
    Unit,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::X => "x-coordinate",
            ValueKind::Y => "y-coordinate",
            ValueKind::Angle => "angle",
            ValueKind::Flag => "flag",
            ValueKind::Unit => "unit",
        })
    }
}

/// Path command letters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLetter {
    A,
    C,
    H,
    L,
    M,
    Q,
    S,
    T,
    V,
    Z,
}

impl CommandLetter {
    pub fn from_char(c: char) -> Option<CommandLetter> {
        Some(match c.to_ascii_lowercase() {
            'a' => CommandLetter::A,
            'c' => CommandLetter::C,
            'h' => CommandLetter::H,
            'l' => CommandLetter::L,
            'm' => CommandLetter::M,
            'q' => CommandLetter::Q,
            's' => CommandLetter::S,
            't' => CommandLetter::T,
            'v' => CommandLetter::V,
            'z' => CommandLetter::Z,
            _ => return None,
        })
    }

    /// Lower-case letter
    pub fn as_char(self) -> char {
        match self {
            CommandLetter::A => 'a',
            CommandLetter::C => 'c',
            CommandLetter::H => 'h',
            CommandLetter::L => 'l',
            CommandLetter::M => 'm',
            CommandLetter::Q => 'q',
            CommandLetter::S => 's',
            CommandLetter::T => 't',
            CommandLetter::V => 'v',
            CommandLetter::Z => 'z',
        }
    }

    /// Kinds of the arguments this command takes, in order.
    pub fn arity(self) -> &'static [ValueKind] {
        use ValueKind::*;
        match self {
            CommandLetter::A => &[X, Y, Angle, Flag, Flag, X, Y],
            CommandLetter::C => &[X, Y, X, Y, X, Y],
            CommandLetter::H => &[X],
            CommandLetter::L => &[X, Y],
            CommandLetter::M => &[X, Y],
            CommandLetter::Q => &[X, Y, X, Y],
            CommandLetter::S => &[X, Y, X, Y],
            CommandLetter::T => &[X, Y],
            CommandLetter::V => &[Y],
            CommandLetter::Z => &[],
        }
    }
}

/// A command letter together with its case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub letter: CommandLetter,
    /// Lower-case commands take coordinates relative to the cursor
    pub relative: bool,
}

impl Command {
    pub fn new(letter: CommandLetter, relative: bool) -> Self {
        Self { letter, relative }
    }

    pub fn as_char(self) -> char {
        let c = self.letter.as_char();
        if self.relative {
            c
        } else {
            c.to_ascii_uppercase()
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Command,
    Delimiter,
    Whitespace,
    Identifier,
    OpenBracket,
    CloseBracket,
    Add,
    Subtract,
    Multiply,
    Divide,
    Rotate,
    SkewHorizontal,
    SkewVertical,
    ReverseOrder,
    Fix,
    Measure,
    Assign,
    Repeat,
    End,
}

impl TokenKind {
    /// Distortion operators (`%r`, `%h`, `%v`, `%o`)
    pub fn is_distortion(self) -> bool {
        matches!(
            self,
            TokenKind::Rotate
                | TokenKind::SkewHorizontal
                | TokenKind::SkewVertical
                | TokenKind::ReverseOrder
        )
    }
}

/// Parsed payload of a token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(FixedDecimal),
    Command(Command),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub value: TokenValue,
    /// Offset of the first character in the source text
    pub column: usize,
}

impl Token {
    pub fn number(&self) -> Option<&FixedDecimal> {
        match &self.value {
            TokenValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<Command> {
        match self.value {
            TokenValue::Command(c) => Some(c),
            _ => None,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Lex `source` into tokens, ending with an `End` token.
pub fn tokenize(name: &str, source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    while offset < source.len() {
        let rest = &source[offset..];
        let pair = PatherParser::parse(Rule::token, rest)
            .ok()
            .and_then(|mut pairs| pairs.next())
            .and_then(|token| token.into_inner().next());
        let Some(pair) = pair else {
            let symbol = rest.chars().next().unwrap_or('\0');
            return Err(Error::UnexpectedSymbol {
                symbol,
                column: offset,
                src: NamedSource::new(name, source.to_string()),
                span: (offset, symbol.len_utf8()).into(),
            });
        };

        let lexeme = pair.as_str();
        let (kind, value) = match pair.as_rule() {
            Rule::number => {
                let number = lexeme.parse().map_err(Error::Numeric)?;
                (TokenKind::Number, TokenValue::Number(number))
            }
            Rule::command => {
                let c = lexeme.chars().next().unwrap_or('m');
                let letter = CommandLetter::from_char(c).ok_or_else(|| Error::UnexpectedSymbol {
                    symbol: c,
                    column: offset,
                    src: NamedSource::new(name, source.to_string()),
                    span: (offset, 1).into(),
                })?;
                let command = Command::new(letter, c.is_ascii_lowercase());
                (TokenKind::Command, TokenValue::Command(command))
            }
            Rule::delimiter => (TokenKind::Delimiter, TokenValue::None),
            Rule::blank => (TokenKind::Whitespace, TokenValue::None),
            Rule::identifier => (TokenKind::Identifier, TokenValue::None),
            Rule::open_bracket => (TokenKind::OpenBracket, TokenValue::None),
            Rule::close_bracket => (TokenKind::CloseBracket, TokenValue::None),
            Rule::add => (TokenKind::Add, TokenValue::None),
            Rule::multiply => (TokenKind::Multiply, TokenValue::None),
            Rule::subtract => (TokenKind::Subtract, TokenValue::None),
            Rule::divide => (TokenKind::Divide, TokenValue::None),
            Rule::rotate => (TokenKind::Rotate, TokenValue::None),
            Rule::skew_horizontal => (TokenKind::SkewHorizontal, TokenValue::None),
            Rule::skew_vertical => (TokenKind::SkewVertical, TokenValue::None),
            Rule::reverse_order => (TokenKind::ReverseOrder, TokenValue::None),
            Rule::fix => (TokenKind::Fix, TokenValue::None),
            Rule::measure => (TokenKind::Measure, TokenValue::None),
            Rule::assign => (TokenKind::Assign, TokenValue::None),
            Rule::repeat => (TokenKind::Repeat, TokenValue::None),
            other => {
                crate::log::warn!(?other, "lexer produced a non-token rule");
                let symbol = rest.chars().next().unwrap_or('\0');
                return Err(Error::UnexpectedSymbol {
                    symbol,
                    column: offset,
                    src: NamedSource::new(name, source.to_string()),
                    span: (offset, symbol.len_utf8()).into(),
                });
            }
        };

        crate::log::trace!(?kind, lexeme, offset, "token");
        tokens.push(Token {
            kind,
            lexeme: lexeme.to_string(),
            value,
            column: offset,
        });
        offset += lexeme.len();
    }

    tokens.push(Token {
        kind: TokenKind::End,
        lexeme: String::new(),
        value: TokenValue::None,
        column: source.len(),
    });
    Ok(tokens)
}

/// Cursor over a lexed command string
#[derive(Debug, Clone)]
pub struct TokenStream {
    /// Origin of the text, used to name it in diagnostics
    name: String,
    source: Arc<str>,
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    pub fn new(name: impl Into<String>, source: &str) -> Result<Self, Error> {
        let name = name.into();
        let tokens = tokenize(&name, source)?;
        Ok(Self {
            name,
            source: Arc::from(source),
            tokens,
            cursor: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The token under the cursor (the `End` token once exhausted)
    pub fn current(&self) -> &Token {
        &self.tokens[self.cursor]
    }

    /// Move to the next token, never past `End`.
    pub fn advance(&mut self) -> &Token {
        if self.cursor + 1 < self.tokens.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn peek_next(&self) -> &Token {
        let index = (self.cursor + 1).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    pub fn reset(&mut self) -> &Token {
        self.cursor = 0;
        self.current()
    }

    /// Index of the current token
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn advance_by(&mut self, count: usize) -> &Token {
        for _ in 0..count {
            self.advance();
        }
        self.current()
    }

    /// Longest name accepted by `accept` spelled by adjacent tokens from
    /// `index` on, with the number of tokens it spans.
    ///
    /// A name like `s1` lexes as the command `s` followed by the number `1`;
    /// gluing the tokens back together lets such names be looked up.
    pub fn name_at(&self, index: usize, accept: impl Fn(&str) -> bool) -> Option<(String, usize)> {
        let first = self.tokens.get(index)?;
        if !matches!(first.kind, TokenKind::Identifier | TokenKind::Command) {
            return None;
        }
        let mut text = String::new();
        let mut end = first.column;
        let mut found = None;
        for (count, token) in self.tokens[index..].iter().enumerate() {
            let glues = match token.kind {
                TokenKind::Identifier | TokenKind::Command => true,
                TokenKind::Number => token.lexeme.bytes().all(|b| b.is_ascii_digit()),
                _ => false,
            };
            if !glues || token.column != end {
                break;
            }
            text.push_str(&token.lexeme);
            end = token.column + token.lexeme.len();
            if accept(&text) {
                found = Some((text.clone(), count + 1));
            }
        }
        found
    }

    /// Split the current number token after `at` characters.
    ///
    /// Returns the leading part; the remainder replaces the current token so
    /// it is read next.
    pub fn split_current(&mut self, at: usize) -> Result<FixedDecimal, Error> {
        let token = self.current().clone();
        let (head, tail) = token.lexeme.split_at(at);
        let head_value: FixedDecimal = head.parse().map_err(Error::Numeric)?;
        let tail_value: FixedDecimal = tail.parse().map_err(Error::Numeric)?;
        self.tokens[self.cursor] = Token {
            kind: TokenKind::Number,
            lexeme: tail.to_string(),
            value: TokenValue::Number(tail_value),
            column: token.column + at,
        };
        Ok(head_value)
    }

    /// Source text for diagnostics
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.source.to_string())
    }

    /// Span of a token for diagnostics
    pub fn span(&self, token: &Token) -> SourceSpan {
        (token.column, token.lexeme.len()).into()
    }

    /// Source and span of a token, the two diagnostic fields every located
    /// error carries
    pub(crate) fn locate(&self, token: &Token) -> (NamedSource<String>, SourceSpan) {
        (self.named_source(), self.span(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize("test", source)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_simple_path() {
        use TokenKind::*;
        assert_eq!(
            kinds("m 10,10 l 5 5"),
            vec![
                Command, Whitespace, Number, Delimiter, Number, Whitespace, Command, Whitespace,
                Number, Whitespace, Number, End,
            ]
        );
    }

    #[test]
    fn command_letters_need_a_boundary() {
        use TokenKind::*;
        // "line" is an identifier, "l5" is a command followed by a number
        assert_eq!(kinds("line"), vec![Identifier, End]);
        assert_eq!(kinds("l5"), vec![Command, Number, End]);
        assert_eq!(kinds("M_"), vec![Identifier, End]);
    }

    #[test]
    fn numbers_take_priority_over_identifiers() {
        use TokenKind::*;
        assert_eq!(kinds("3n"), vec![Number, Identifier, End]);
        assert_eq!(kinds("3.2.5"), vec![Number, Number, End]);
        let tokens = tokenize("test", "3.2.5").unwrap();
        assert_eq!(tokens[1].lexeme, ".5");
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("%r%h%v%o@|=#+-*/()"),
            vec![
                Rotate, SkewHorizontal, SkewVertical, ReverseOrder, Fix, Measure, Assign, Repeat,
                Add, Subtract, Multiply, Divide, OpenBracket, CloseBracket, End
            ]
        );
    }

    #[test]
    fn command_values_carry_case_and_arity() {
        let tokens = tokenize("test", "A z").unwrap();
        let arc = tokens[0].command().unwrap();
        assert!(!arc.relative);
        assert_eq!(arc.letter.arity().len(), 7);
        let close = tokens[2].command().unwrap();
        assert!(close.relative);
        assert!(close.letter.arity().is_empty());
    }

    #[test]
    fn unknown_symbol_reports_column() {
        let err = tokenize("test", "m 1,1 ^").unwrap_err();
        match err {
            Error::UnexpectedSymbol { symbol, column, .. } => {
                assert_eq!(symbol, '^');
                assert_eq!(column, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cursor_walks_and_resets() {
        let mut stream = TokenStream::new("test", "a b").unwrap();
        assert_eq!(stream.current().lexeme, "a");
        assert_eq!(stream.peek_next().kind, TokenKind::Whitespace);
        stream.advance();
        assert_eq!(stream.advance().lexeme, "b");
        assert_eq!(stream.advance().kind, TokenKind::End);
        assert_eq!(stream.advance().kind, TokenKind::End);
        assert_eq!(stream.reset().lexeme, "a");
    }

    #[test]
    fn glued_names() {
        let stream = TokenStream::new("test", "s1 s1x q2(").unwrap();
        let known = |name: &str| matches!(name, "s1" | "s1x" | "q2");
        assert_eq!(stream.name_at(0, known), Some(("s1".to_string(), 2)));
        assert_eq!(stream.name_at(3, known), Some(("s1x".to_string(), 3)));
        assert_eq!(stream.name_at(7, known), Some(("q2".to_string(), 2)));
        // a gap ends the name
        assert_eq!(stream.name_at(0, |name| name == "s1s1"), None);
        assert_eq!(stream.name_at(1, known), None);
    }

    #[test]
    fn split_current_leaves_the_remainder() {
        let mut stream = TokenStream::new("test", "1100").unwrap();
        let head = stream.split_current(1).unwrap();
        assert_eq!(head.format(-1), "1");
        assert_eq!(stream.current().lexeme, "100");
        assert_eq!(stream.current().column, 1);
        assert_eq!(stream.current().number().unwrap().format(-1), "100");
    }
}
