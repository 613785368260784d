//! Expression evaluation
//!
//! Operator precedence is handled with an explicit stack of
//! `(operator, left operand)` frames. Levels from low to high are bracket,
//! add/subtract, multiply/divide; unwinding folds the frames above a floor
//! level left to right.
//!
//! A value directly followed by a name, a bracket or a measurement multiplies
//! (`2w`, `3(1+2)`, `2|arc|`). Outside brackets whitespace and delimiters end
//! an expression, so `l 5 5` reads two values; a `-` after a value does too,
//! as in `l 5-5`.
//!
//! Segment invocations (`3name%r90(len=2)`) are parsed here as well, since
//! measurements `|name|` expand a segment inside an expression.

use miette::SourceSpan;

use crate::context::Context;
use crate::decimal::{DecimalError, FixedDecimal};
use crate::distortion::{self, Distortion, Point};
use crate::errors::Error;
use crate::path::{Arguments, PathState, Run};
use crate::token::{Token, TokenKind, TokenStream, ValueKind};

/// Operators that may directly follow a distortion parameter
const DISTORTION_OPERATORS: &[TokenKind] = &[
    TokenKind::Rotate,
    TokenKind::SkewHorizontal,
    TokenKind::SkewVertical,
    TokenKind::ReverseOrder,
];

/// Read-only inputs of an expression
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub context: &'a Context,
    /// Arguments of the segment being expanded; they shadow units
    pub arguments: &'a Arguments,
    /// Cursor, the starting point of measurements
    pub position: &'a Point,
    /// Segments being expanded
    pub active: &'a [String],
    /// Bracket depth of the surroundings; whitespace only separates values
    /// while the expression is at this depth
    pub depth: usize,
    /// A `)` at the ambient depth closes the argument list instead of failing
    pub inside_argument_list: bool,
    /// Path data: a command letter after a complete value ends the
    /// expression. Elsewhere command letters are read as names.
    pub commands: bool,
    /// Extra token kinds that end the expression
    pub terminators: &'a [TokenKind],
}

impl<'a> Scope<'a> {
    pub fn new(
        context: &'a Context,
        arguments: &'a Arguments,
        position: &'a Point,
        active: &'a [String],
    ) -> Self {
        Self {
            context,
            arguments,
            position,
            active,
            depth: 0,
            inside_argument_list: false,
            commands: true,
            terminators: &[],
        }
    }

    pub fn at_depth(self, depth: usize) -> Self {
        Self { depth, ..self }
    }

    pub fn in_argument_list(self) -> Self {
        Self {
            inside_argument_list: true,
            commands: false,
            ..self
        }
    }

    /// Outside path data, where no command can follow a value
    pub fn without_commands(self) -> Self {
        Self {
            commands: false,
            ..self
        }
    }

    /// Whether `name` is bound to a value, arguments first
    pub fn names_value(&self, name: &str) -> bool {
        self.arguments.contains_key(name) || self.context.unit(name).is_some()
    }

    pub fn ending_at(self, terminators: &'a [TokenKind]) -> Self {
        Self { terminators, ..self }
    }
}

/// Why an expression stopped. The stopping token is left current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// Whitespace, delimiter or end of input at the ambient depth
    Boundary,
    /// A value directly followed by another value (`3.2.5`, `5-5`)
    NextValue,
    /// A command letter
    Command,
    /// The `)` of an argument list
    CloseArguments,
    /// One of the scope's terminators
    Terminator(TokenKind),
}

/// A value together with the reason the expression ended
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub value: FixedDecimal,
    pub stop: Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Op {
    /// Bracket marker
    Evaluate,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone)]
struct Frame {
    op: Op,
    /// Left operand
    value: FixedDecimal,
    /// Column of the operator
    column: usize,
}

/// Last significant thing read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Nothing,
    Value,
    /// Whitespace after a value, inside brackets
    Space,
    OpenBracket,
    Operator,
}

struct ExpressionState {
    accumulator: FixedDecimal,
    stack: Vec<Frame>,
    /// Bracket depth, starting at the ambient depth
    counter: usize,
    last: Last,
}

impl ExpressionState {
    fn new(depth: usize) -> Self {
        Self {
            accumulator: FixedDecimal::zero(),
            stack: Vec::new(),
            counter: depth,
            last: Last::Nothing,
        }
    }

    fn push(&mut self, op: Op, column: usize) {
        self.stack.push(Frame {
            op,
            value: self.accumulator.clone(),
            column,
        });
    }

    fn has_value(&self) -> bool {
        matches!(self.last, Last::Value | Last::Space)
    }

    /// Fold the frames above the last one at or below `limit`.
    fn unwind(&mut self, limit: Op, stream: &TokenStream) -> Result<(), Error> {
        let start = self
            .stack
            .iter()
            .rposition(|frame| frame.op <= limit)
            .map_or(0, |index| index + 1);
        self.fold(start, stream)
    }

    fn fold(&mut self, start: usize, stream: &TokenStream) -> Result<(), Error> {
        if start >= self.stack.len() {
            return Ok(());
        }
        let mut frames = self.stack.split_off(start);
        frames.push(Frame {
            op: Op::Evaluate,
            value: std::mem::take(&mut self.accumulator),
            column: 0,
        });
        let mut value = frames[0].value.clone();
        for pair in frames.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            value = match left.op {
                Op::Add => &value + &right.value,
                Op::Subtract => &value - &right.value,
                Op::Multiply => value * right.value.clone(),
                Op::Divide => value.checked_div(&right.value).ok_or_else(|| Error::DivisionByZero {
                    column: left.column,
                    src: stream.named_source(),
                    span: (left.column, 1).into(),
                })?,
                Op::Evaluate => value,
            };
        }
        self.accumulator = value;
        Ok(())
    }
}

/// Error for a token that cannot appear where it was found
fn unexpected(stream: &TokenStream, token: &Token) -> Error {
    let (src, span) = stream.locate(token);
    if token.kind == TokenKind::End {
        Error::UnexpectedEnd {
            column: token.column,
            src,
            span,
        }
    } else {
        Error::UnexpectedToken {
            token: token.lexeme.clone(),
            column: token.column,
            src,
            span,
        }
    }
}

fn space_delimited(stream: &TokenStream, token: &Token) -> Error {
    let (src, span) = stream.locate(token);
    Error::SpaceDelimitedValue {
        token: token.lexeme.clone(),
        column: token.column,
        src,
        span,
    }
}

/// Whether `token` can begin an expression in `scope`
fn starts_value(token: &Token, scope: &Scope<'_>) -> bool {
    match token.kind {
        TokenKind::Number
        | TokenKind::Identifier
        | TokenKind::Subtract
        | TokenKind::OpenBracket
        | TokenKind::Measure => true,
        TokenKind::Command => scope.names_value(&token.lexeme),
        _ => false,
    }
}

fn skip_whitespace(stream: &mut TokenStream) {
    while stream.current().kind == TokenKind::Whitespace {
        stream.advance();
    }
}

/// Evaluate the expression starting at the current token.
///
/// `kind` is what the caller needs the value for; it only restricts which
/// constructs are legal.
pub fn evaluate(
    stream: &mut TokenStream,
    scope: &Scope<'_>,
    kind: ValueKind,
) -> Result<Outcome, Error> {
    let mut state = ExpressionState::new(scope.depth);

    let stop = loop {
        let token = stream.current().clone();
        match token.kind {
            TokenKind::Number => {
                match state.last {
                    Last::Space => return Err(space_delimited(stream, &token)),
                    Last::Value if state.counter > 0 => return Err(unexpected(stream, &token)),
                    Last::Value => break Stop::NextValue,
                    _ => {}
                }
                state.accumulator = token.number().cloned().unwrap_or_default();
                state.last = Last::Value;
            }
            TokenKind::Multiply | TokenKind::Divide => {
                if !state.has_value() {
                    return Err(unexpected(stream, &token));
                }
                let op = if token.kind == TokenKind::Multiply { Op::Multiply } else { Op::Divide };
                state.push(op, token.column);
                state.last = Last::Operator;
            }
            TokenKind::Subtract => {
                if state.last == Last::Value && state.counter == 0 {
                    break Stop::NextValue;
                }
                if state.last == Last::Operator {
                    return Err(unexpected(stream, &token));
                }
                state.unwind(Op::Subtract, stream)?;
                state.push(Op::Subtract, token.column);
                state.last = Last::Operator;
            }
            TokenKind::Add => {
                if !state.has_value() {
                    return Err(unexpected(stream, &token));
                }
                state.unwind(Op::Subtract, stream)?;
                state.push(Op::Add, token.column);
                state.last = Last::Operator;
            }
            TokenKind::Measure => {
                if state.last == Last::Space {
                    return Err(space_delimited(stream, &token));
                }
                if matches!(kind, ValueKind::Unit | ValueKind::Flag) {
                    let (src, span) = stream.locate(&token);
                    return Err(Error::IncompatibleMeasure {
                        kind,
                        column: token.column,
                        src,
                        span,
                    });
                }
                if state.last == Last::Value {
                    state.push(Op::Multiply, token.column);
                }
                state.accumulator = measure(stream, scope, kind)?;
                state.last = Last::Value;
            }
            TokenKind::OpenBracket => {
                if state.last == Last::Space {
                    return Err(unexpected(stream, &token));
                }
                state.counter += 1;
                if state.last == Last::Value {
                    state.push(Op::Multiply, token.column);
                }
                state.accumulator = FixedDecimal::zero();
                state.push(Op::Evaluate, token.column);
                state.last = Last::OpenBracket;
            }
            TokenKind::CloseBracket => {
                if state.counter == scope.depth {
                    if scope.inside_argument_list && state.has_value() {
                        break Stop::CloseArguments;
                    }
                    if scope.inside_argument_list {
                        return Err(unexpected(stream, &token));
                    }
                    let (src, span) = stream.locate(&token);
                    return Err(Error::MismatchedBracket {
                        column: token.column,
                        src,
                        span,
                    });
                }
                if !state.has_value() {
                    return Err(unexpected(stream, &token));
                }
                state.unwind(Op::Evaluate, stream)?;
                state.stack.pop();
                state.counter -= 1;
                state.last = Last::Value;
            }
            TokenKind::Command
                if scope.commands && state.counter == scope.depth && state.has_value() =>
            {
                break Stop::Command;
            }
            TokenKind::Identifier | TokenKind::Command => {
                if state.last == Last::Space {
                    return Err(space_delimited(stream, &token));
                }
                let value = scope
                    .arguments
                    .get(&token.lexeme)
                    .or_else(|| scope.context.unit(&token.lexeme))
                    .cloned();
                let Some(value) = value else {
                    let (src, span) = stream.locate(&token);
                    return Err(Error::UndefinedReference {
                        name: token.lexeme,
                        column: token.column,
                        src,
                        span,
                    });
                };
                if state.last == Last::Value {
                    state.push(Op::Multiply, token.column);
                }
                state.accumulator = value;
                state.last = Last::Value;
            }
            TokenKind::Delimiter | TokenKind::Whitespace => {
                if token.kind == TokenKind::Delimiter && state.counter > 0 {
                    let (src, span) = stream.locate(&token);
                    return Err(Error::UnexpectedDelimiter {
                        token: token.lexeme,
                        column: token.column,
                        src,
                        span,
                    });
                }
                if state.counter == 0 && state.last != Last::Nothing {
                    break Stop::Boundary;
                }
                if state.last == Last::Value {
                    state.last = Last::Space;
                }
            }
            TokenKind::End => {
                if state.counter > scope.depth {
                    let (src, span) = stream.locate(&token);
                    return Err(Error::MissingClosingBracket {
                        depth: state.counter - scope.depth,
                        column: token.column,
                        src,
                        span,
                    });
                }
                break Stop::Boundary;
            }
            other if scope.terminators.contains(&other) => break Stop::Terminator(other),
            _ => return Err(unexpected(stream, &token)),
        }
        stream.advance();
    };

    if !state.has_value() {
        return Err(unexpected(stream, stream.current()));
    }
    state.unwind(Op::Subtract, stream)?;
    state.fold(0, stream)?;
    crate::log::trace!(value = %state.accumulator, ?stop, "expression");
    Ok(Outcome {
        value: state.accumulator,
        stop,
    })
}

/// `|name|`: expand a segment from the cursor without emitting it and
/// report its displacement (x or y) or direction (angle).
fn measure(
    stream: &mut TokenStream,
    scope: &Scope<'_>,
    kind: ValueKind,
) -> Result<FixedDecimal, Error> {
    stream.advance();
    skip_whitespace(stream);
    let mut trial = PathState::measuring(scope.position, scope.active);
    invoke(stream, &mut trial, scope.context, scope.arguments, &[])?;
    skip_whitespace(stream);
    let close = stream.current().clone();
    if close.kind != TokenKind::Measure {
        let (src, span) = stream.locate(&close);
        return Err(Error::ExpectedMeasureClose {
            token: close.lexeme,
            column: close.column,
            src,
            span,
        });
    }

    let dx = &trial.cursor.x - &scope.position.x;
    let dy = &trial.cursor.y - &scope.position.y;
    Ok(match kind {
        ValueKind::X => dx,
        ValueKind::Y => dy,
        _ => {
            let radians = FixedDecimal::from_f64(dy.to_f64().atan2(dx.to_f64()))?;
            (radians * FixedDecimal::from_int(180))
                .checked_div(&FixedDecimal::pi())
                .ok_or(DecimalError::DivisionByZero)?
        }
    })
}

/// Parameters collected for one invocation
struct Invocation {
    segment: String,
    count: Option<(FixedDecimal, usize)>,
    distortions: Vec<Distortion>,
    /// Distortion operators already specified
    specified: Vec<TokenKind>,
    arguments: Arguments,
}

impl Invocation {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            count: None,
            distortions: Vec::new(),
            specified: Vec::new(),
            arguments: Arguments::new(),
        }
    }

    fn duplicate(&self, stream: &TokenStream, token: &Token) -> Error {
        let (src, span) = stream.locate(token);
        Error::DuplicateParameter {
            parameter: token.lexeme.clone(),
            segment: self.segment.clone(),
            column: token.column,
            src,
            span,
        }
    }

    /// Reject a parameter given twice.
    fn claim(&mut self, stream: &TokenStream, token: &Token) -> Result<(), Error> {
        let taken = match token.kind {
            TokenKind::Repeat => self.count.is_some(),
            TokenKind::Identifier | TokenKind::Command => {
                self.arguments.contains_key(&token.lexeme)
            }
            kind => self.specified.contains(&kind),
        };
        if taken {
            return Err(self.duplicate(stream, token));
        }
        if token.kind.is_distortion() {
            self.specified.push(token.kind);
        }
        Ok(())
    }

    fn distort(&mut self, operator: TokenKind, value: FixedDecimal) {
        let distortion: Distortion = match operator {
            TokenKind::Rotate => distortion::Rotate { angle: value }.into(),
            TokenKind::SkewHorizontal => distortion::SkewHorizontal { angle: value }.into(),
            TokenKind::SkewVertical => distortion::SkewVertical { angle: value }.into(),
            _ if value.is_zero() => return,
            _ => distortion::ReverseOrder.into(),
        };
        self.distortions.push(distortion);
    }

    /// Validated execution count
    fn count(&self, stream: &TokenStream, name_token: &Token) -> Result<u64, Error> {
        let Some((count, column)) = &self.count else {
            return Ok(1);
        };
        match count.to_integer() {
            Some(count) if count >= 1 => Ok(count as u64),
            _ => Err(Error::InvalidRepeat {
                count: count.to_string(),
                segment: self.segment.clone(),
                column: *column,
                src: stream.named_source(),
                span: stream.span(name_token),
            }),
        }
    }
}

/// Parse an invocation at the current token and expand the segment into
/// `state`.
///
/// Grammar: `[count] name` followed, in any order, by distortion operators
/// with their parameter and at most one `(name=value, ...)` list, where a
/// name may also be `%r`, `%h`, `%v`, `%o` or `#`.
pub(crate) fn invoke(
    stream: &mut TokenStream,
    state: &mut PathState,
    context: &Context,
    arguments: &Arguments,
    inherited: &[Distortion],
) -> Result<(), Error> {
    let mut count = None;
    let first = stream.current().clone();
    if first.kind == TokenKind::Number {
        count = first.number().cloned().map(|value| (value, first.column));
        stream.advance();
    }

    let name_token = stream.current().clone();
    let segment_name = stream.name_at(stream.position(), |name| context.is_segment(name));
    let Some((name, width)) = segment_name else {
        let (src, span) = stream.locate(&name_token);
        return Err(if name_token.kind == TokenKind::Identifier {
            Error::UndefinedSegment {
                name: name_token.lexeme,
                column: name_token.column,
                src,
                span,
            }
        } else {
            Error::ExpectedIdentifier {
                token: name_token.lexeme,
                column: name_token.column,
                src,
                span,
            }
        });
    };
    let span: SourceSpan = (name_token.column, name.len()).into();
    if state.active.last() == Some(&name) {
        return Err(Error::SelfInvocation {
            name,
            column: name_token.column,
            src: stream.named_source(),
            span,
        });
    }
    if state.active.contains(&name) {
        let chain = format!("{} -> {}", state.active.join(" -> "), name);
        return Err(Error::RecursiveInvocation {
            name,
            chain,
            column: name_token.column,
            src: stream.named_source(),
            span,
        });
    }
    let Some(segment) = context.segment(&name) else {
        return Err(Error::UndefinedSegment {
            name,
            column: name_token.column,
            src: stream.named_source(),
            span,
        });
    };
    stream.advance_by(width);

    let mut invocation = Invocation::new(&name);
    invocation.count = count;
    let mut has_argument_list = false;
    loop {
        let token = stream.current().clone();
        match token.kind {
            TokenKind::ReverseOrder => {
                invocation.claim(stream, &token)?;
                invocation.distort(token.kind, FixedDecimal::from_int(1));
                stream.advance();
            }
            kind if kind.is_distortion() => {
                invocation.claim(stream, &token)?;
                stream.advance();
                let scope = Scope::new(context, arguments, &state.cursor, &state.active)
                    .ending_at(DISTORTION_OPERATORS);
                let angle = if starts_value(stream.current(), &scope) {
                    evaluate(stream, &scope, ValueKind::Angle)?.value
                } else {
                    FixedDecimal::zero()
                };
                invocation.distort(kind, angle);
            }
            TokenKind::OpenBracket if !has_argument_list => {
                argument_list(stream, state, context, arguments, &mut invocation)?;
                has_argument_list = true;
                stream.advance();
            }
            TokenKind::Whitespace => {
                let next = stream.peek_next().kind;
                if next.is_distortion() || (next == TokenKind::OpenBracket && !has_argument_list) {
                    stream.advance();
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    let count = invocation.count(stream, &name_token)?;
    let mut stack = inherited.to_vec();
    stack.append(&mut invocation.distortions);
    let pattern = TokenStream::new(&name, &segment.pattern)?;
    let run = Run {
        context,
        arguments: &invocation.arguments,
        distortions: &stack,
    };

    state.active.push(name);
    let mut expanded = Ok(());
    for iteration in 1..=count {
        crate::log::debug!(
            segment = pattern.name(),
            iteration,
            distortions = stack.len(),
            "expanding segment"
        );
        let mut body = pattern.clone();
        expanded = run.interpret(&mut body, state);
        if expanded.is_err() {
            break;
        }
    }
    state.active.pop();
    expanded
}

/// `(name=value, ...)`; leaves the closing bracket current.
fn argument_list(
    stream: &mut TokenStream,
    state: &PathState,
    context: &Context,
    arguments: &Arguments,
    invocation: &mut Invocation,
) -> Result<(), Error> {
    stream.advance();
    let mut delimited = false;
    loop {
        let token = stream.current().clone();
        match token.kind {
            TokenKind::CloseBracket => return Ok(()),
            TokenKind::Identifier | TokenKind::Command if context.is_segment(&token.lexeme) => {
                let (src, span) = stream.locate(&token);
                return Err(Error::ArgumentIsSegment {
                    name: token.lexeme,
                    column: token.column,
                    src,
                    span,
                });
            }
            TokenKind::Identifier
            | TokenKind::Command
            | TokenKind::Rotate
            | TokenKind::SkewHorizontal
            | TokenKind::SkewVertical
            | TokenKind::ReverseOrder
            | TokenKind::Repeat => {
                delimited = false;
                invocation.claim(stream, &token)?;

                stream.advance();
                skip_whitespace(stream);
                let assign = stream.current().clone();
                if assign.kind == TokenKind::End {
                    return Err(unexpected(stream, &assign));
                }
                if assign.kind != TokenKind::Assign {
                    let (src, span) = stream.locate(&assign);
                    return Err(Error::ExpectedAssignment {
                        token: assign.lexeme,
                        column: assign.column,
                        src,
                        span,
                    });
                }
                stream.advance();

                let kind = if token.kind.is_distortion() && token.kind != TokenKind::ReverseOrder {
                    ValueKind::Angle
                } else {
                    ValueKind::Unit
                };
                let scope = Scope::new(context, arguments, &state.cursor, &state.active)
                    .in_argument_list();
                let value = evaluate(stream, &scope, kind)?.value;
                match token.kind {
                    TokenKind::Identifier | TokenKind::Command => {
                        invocation.arguments.insert(token.lexeme, value);
                    }
                    TokenKind::Repeat => invocation.count = Some((value, token.column)),
                    operator => invocation.distort(operator, value),
                }
                continue;
            }
            TokenKind::Delimiter => {
                if delimited {
                    let (src, span) = stream.locate(&token);
                    return Err(Error::UnexpectedDelimiter {
                        token: token.lexeme,
                        column: token.column,
                        src,
                        span,
                    });
                }
                delimited = true;
            }
            TokenKind::Whitespace => {}
            _ => return Err(unexpected(stream, &token)),
        }
        stream.advance();
    }
}

/// Evaluate a standalone expression such as a unit value. Whitespace may
/// separate operands and the whole text must be consumed.
pub fn evaluate_expression(
    name: &str,
    text: &str,
    context: &Context,
) -> Result<FixedDecimal, Error> {
    let mut stream = TokenStream::new(name, text)?;
    let arguments = Arguments::new();
    let origin = Point::zero();
    let scope = Scope::new(context, &arguments, &origin, &[])
        .at_depth(1)
        .without_commands();
    let outcome = evaluate(&mut stream, &scope, ValueKind::Unit)?;
    let rest = stream.current();
    if rest.kind != TokenKind::End {
        return Err(unexpected(&stream, rest));
    }
    Ok(outcome.value)
}

/// Evaluate a whitespace or comma separated list of values, as found in
/// numeric attributes like `viewBox`, and render it at the output precision.
///
/// `limit` caps the number of values; `None` allows any number.
pub fn evaluate_list(
    name: &str,
    text: &str,
    context: &Context,
    limit: Option<usize>,
) -> Result<String, Error> {
    let mut stream = TokenStream::new(name, text)?;
    let arguments = Arguments::new();
    let origin = Point::zero();
    let scope = Scope::new(context, &arguments, &origin, &[]).without_commands();
    let precision = context.options().output_precision();

    let mut values = Vec::new();
    loop {
        let token = stream.current().clone();
        match token.kind {
            TokenKind::Whitespace | TokenKind::Delimiter => {
                stream.advance();
            }
            TokenKind::End => break,
            _ => {
                if let Some(limit) = limit.filter(|limit| values.len() >= *limit) {
                    let (src, span) = stream.locate(&token);
                    return Err(Error::TooManyValues {
                        limit,
                        column: token.column,
                        src,
                        span,
                    });
                }
                let outcome = evaluate(&mut stream, &scope, ValueKind::Unit)?;
                values.push(outcome.value.format(precision));
            }
        }
    }
    Ok(values.join(" "))
}
