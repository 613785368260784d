//! Error types with rich diagnostics using miette
//!
//! Errors raised at a token carry the interpreted text, a span over the
//! offending token, the token text and its column.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::decimal::DecimalError;
use crate::token::ValueKind;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unrecognized character
    Lex,
    /// Malformed expression or command
    Syntax,
    /// Undefined name, self-invocation, circular unit definition
    Reference,
    /// Id defined twice within or across the unit and segment tables
    DuplicateDefinition,
    /// Division by zero, non-finite numbers
    Domain,
}

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    // ========================================================================
    // Lexing
    // ========================================================================
    #[error("unexpected symbol \"{symbol}\" at column {column}")]
    #[diagnostic(code(pather::lex::unexpected_symbol))]
    UnexpectedSymbol {
        symbol: char,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("not part of the path language")]
        span: SourceSpan,
    },

    // ========================================================================
    // Syntax
    // ========================================================================
    #[error("unexpected token \"{token}\" at column {column}")]
    #[diagnostic(code(pather::syntax::unexpected_token))]
    UnexpectedToken {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("unexpected here")]
        span: SourceSpan,
    },

    #[error("unexpected space-delimited value \"{token}\" at column {column}")]
    #[diagnostic(
        code(pather::syntax::space_delimited_value),
        help("join the values with an operator, or drop the space for implicit multiplication")
    )]
    SpaceDelimitedValue {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("separated from the previous value by a space")]
        span: SourceSpan,
    },

    #[error("unexpected delimiter \"{token}\" at column {column}")]
    #[diagnostic(code(pather::syntax::unexpected_delimiter))]
    UnexpectedDelimiter {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("delimiter not allowed here")]
        span: SourceSpan,
    },

    #[error("mismatched bracket at column {column}")]
    #[diagnostic(code(pather::syntax::mismatched_bracket))]
    MismatchedBracket {
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("no matching opening bracket")]
        span: SourceSpan,
    },

    #[error("missing {depth} closing bracket(s) at column {column}")]
    #[diagnostic(code(pather::syntax::missing_closing_bracket))]
    MissingClosingBracket {
        depth: usize,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("expression ends here")]
        span: SourceSpan,
    },

    #[error("expected a segment name at column {column}, found \"{token}\"")]
    #[diagnostic(code(pather::syntax::expected_identifier))]
    ExpectedIdentifier {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("segment name expected")]
        span: SourceSpan,
    },

    #[error("expected \"|\" to close the measurement at column {column}, found \"{token}\"")]
    #[diagnostic(code(pather::syntax::expected_measure_close))]
    ExpectedMeasureClose {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("measurement not closed")]
        span: SourceSpan,
    },

    #[error("a segment measurement cannot produce a {kind} value (column {column})")]
    #[diagnostic(
        code(pather::syntax::incompatible_measure),
        help("measurements yield coordinates and angles only")
    )]
    IncompatibleMeasure {
        kind: ValueKind,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("measurement used here")]
        span: SourceSpan,
    },

    #[error("expected \"=\" after argument name at column {column}, found \"{token}\"")]
    #[diagnostic(code(pather::syntax::expected_assignment))]
    ExpectedAssignment {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("assignment expected")]
        span: SourceSpan,
    },

    #[error("unexpected end of input at column {column}")]
    #[diagnostic(code(pather::syntax::unexpected_end))]
    UnexpectedEnd {
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("input ends here")]
        span: SourceSpan,
    },

    #[error("paths must begin with a move command, found \"{token}\" at column {column}")]
    #[diagnostic(code(pather::syntax::missing_move))]
    MissingMove {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("expected m or M")]
        span: SourceSpan,
    },

    #[error("expected a command, found \"{token}\" at column {column}")]
    #[diagnostic(code(pather::syntax::expected_command))]
    ExpectedCommand {
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("no command to take this value")]
        span: SourceSpan,
    },

    #[error("too few arguments for command {command} at column {column}: expected {expected}, found {found}")]
    #[diagnostic(code(pather::syntax::too_few_arguments))]
    TooFewArguments {
        command: char,
        expected: usize,
        found: usize,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("command started here")]
        span: SourceSpan,
    },

    #[error("too many arguments for command {command}: \"{token}\" at column {column}")]
    #[diagnostic(code(pather::syntax::too_many_arguments))]
    TooManyArguments {
        command: char,
        token: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("extra argument")]
        span: SourceSpan,
    },

    #[error("dangling fix operator after command {command} at column {column}")]
    #[diagnostic(code(pather::syntax::dangling_fix))]
    DanglingFix {
        command: char,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("command has no value left to pin")]
        span: SourceSpan,
    },

    #[error("\"{parameter}\" is specified twice for segment \"{segment}\" (column {column})")]
    #[diagnostic(code(pather::syntax::duplicate_parameter))]
    DuplicateParameter {
        parameter: String,
        segment: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("already specified")]
        span: SourceSpan,
    },

    #[error("the execution count {count} of segment \"{segment}\" must be an integer of at least 1")]
    #[diagnostic(code(pather::syntax::invalid_repeat))]
    InvalidRepeat {
        count: String,
        segment: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("invoked here")]
        span: SourceSpan,
    },

    #[error("more than {limit} value(s), extra value at column {column}")]
    #[diagnostic(code(pather::syntax::too_many_values))]
    TooManyValues {
        limit: usize,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("one value too many")]
        span: SourceSpan,
    },

    #[error("invalid unit override \"{text}\": {reason}")]
    #[diagnostic(
        code(pather::syntax::invalid_override),
        help("overrides are written as name=value, e.g. w=12.5")
    )]
    InvalidOverride { text: String, reason: String },

    #[error("<{element}> element without a \"{attribute}\" attribute")]
    #[diagnostic(code(pather::syntax::missing_attribute))]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    // ========================================================================
    // References
    // ========================================================================
    #[error("reference to undefined unit \"{name}\" at column {column}")]
    #[diagnostic(code(pather::reference::undefined))]
    UndefinedReference {
        name: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("not defined")]
        span: SourceSpan,
    },

    #[error("reference to undefined segment \"{name}\" at column {column}")]
    #[diagnostic(code(pather::reference::undefined_segment))]
    UndefinedSegment {
        name: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("no such segment")]
        span: SourceSpan,
    },

    #[error("argument \"{name}\" at column {column} is already defined as a segment")]
    #[diagnostic(code(pather::reference::argument_is_segment))]
    ArgumentIsSegment {
        name: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("segment name used as argument")]
        span: SourceSpan,
    },

    #[error("segment \"{name}\" cannot invoke itself (column {column})")]
    #[diagnostic(code(pather::reference::self_invocation))]
    SelfInvocation {
        name: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("invoked from its own pattern")]
        span: SourceSpan,
    },

    #[error("recursive invocation of segment \"{name}\" via {chain} (column {column})")]
    #[diagnostic(code(pather::reference::recursive_invocation))]
    RecursiveInvocation {
        name: String,
        chain: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("already being expanded")]
        span: SourceSpan,
    },

    #[error("circular reference to unit \"{name}\" ({chain}) at column {column}")]
    #[diagnostic(code(pather::reference::circular))]
    CircularReference {
        name: String,
        chain: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("refers back to a unit being resolved")]
        span: SourceSpan,
    },

    #[error("unable to resolve unit \"{unit}\": \"{name}\" is undefined at column {column}")]
    #[diagnostic(code(pather::reference::unresolved))]
    UnresolvedReference {
        unit: String,
        name: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("not defined")]
        span: SourceSpan,
    },

    // ========================================================================
    // Duplicate definitions
    // ========================================================================
    #[error("unable to resolve unit \"{unit}\": duplicate id \"{name}\" at column {column}")]
    #[diagnostic(code(pather::duplicate::ambiguous_reference))]
    AmbiguousReference {
        unit: String,
        name: String,
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("defined more than once")]
        span: SourceSpan,
    },

    #[error("duplicate unit id \"{id}\"")]
    #[diagnostic(code(pather::duplicate::unit))]
    DuplicateUnit { id: String },

    #[error("duplicate segment id \"{id}\"")]
    #[diagnostic(code(pather::duplicate::segment))]
    DuplicateSegment { id: String },

    #[error("segment id \"{id}\" is already defined as a unit")]
    #[diagnostic(code(pather::duplicate::segment_is_unit))]
    SegmentIsUnit { id: String },

    // ========================================================================
    // Domain
    // ========================================================================
    #[error("division by zero at column {column}")]
    #[diagnostic(code(pather::domain::division_by_zero))]
    DivisionByZero {
        column: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("divisor is zero")]
        span: SourceSpan,
    },

    #[error(transparent)]
    #[diagnostic(code(pather::domain::numeric))]
    Numeric(#[from] DecimalError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            UnexpectedSymbol { .. } => ErrorKind::Lex,

            UnexpectedToken { .. }
            | SpaceDelimitedValue { .. }
            | UnexpectedDelimiter { .. }
            | MismatchedBracket { .. }
            | MissingClosingBracket { .. }
            | ExpectedIdentifier { .. }
            | ExpectedMeasureClose { .. }
            | IncompatibleMeasure { .. }
            | ExpectedAssignment { .. }
            | UnexpectedEnd { .. }
            | MissingMove { .. }
            | ExpectedCommand { .. }
            | TooFewArguments { .. }
            | TooManyArguments { .. }
            | DanglingFix { .. }
            | DuplicateParameter { .. }
            | InvalidRepeat { .. }
            | TooManyValues { .. }
            | InvalidOverride { .. }
            | MissingAttribute { .. } => ErrorKind::Syntax,

            UndefinedReference { .. }
            | UndefinedSegment { .. }
            | ArgumentIsSegment { .. }
            | SelfInvocation { .. }
            | RecursiveInvocation { .. }
            | CircularReference { .. }
            | UnresolvedReference { .. } => ErrorKind::Reference,

            AmbiguousReference { .. }
            | DuplicateUnit { .. }
            | DuplicateSegment { .. }
            | SegmentIsUnit { .. } => ErrorKind::DuplicateDefinition,

            DivisionByZero { .. } | Numeric(_) => ErrorKind::Domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_category() {
        let err = Error::CircularReference {
            name: "a".into(),
            chain: "a -> b -> a".into(),
            column: 0,
            src: NamedSource::new("b", "a".to_string()),
            span: (0, 1).into(),
        };
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert_eq!(err.to_string(), "circular reference to unit \"a\" (a -> b -> a) at column 0");
        assert_eq!(Error::DuplicateUnit { id: "w".into() }.kind(), ErrorKind::DuplicateDefinition);
        assert_eq!(Error::Numeric(DecimalError::DivisionByZero).kind(), ErrorKind::Domain);
    }

    #[test]
    fn messages_carry_token_and_column() {
        let err = Error::UnexpectedToken {
            token: "*".into(),
            column: 4,
            src: NamedSource::new("d", "m 0 * 1".to_string()),
            span: (4, 1).into(),
        };
        assert_eq!(err.to_string(), "unexpected token \"*\" at column 4");
    }
}
