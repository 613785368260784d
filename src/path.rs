//! Path command interpreter
//!
//! Walks the tokens of path data, collecting the arguments of each command
//! and flushing finished commands through [`apply_distortion`]. Bare values
//! after a complete command repeat it; names (or a count followed by a name)
//! of segments expand the segment in place.
//!
//! ```text
//! AwaitingCommand --command--> CollectingArguments --arity reached--> flush
//!        ^                              |
//!        +------------ End / command ---+
//! ```

use std::collections::HashMap;

use crate::context::Context;
use crate::decimal::FixedDecimal;
use crate::distortion::{Distortion, Point, apply_distortion};
use crate::errors::Error;
use crate::expr::{self, Scope};
use crate::token::{Command, CommandLetter, TokenKind, TokenStream, ValueKind};

/// Argument values bound for one segment expansion
pub type Arguments = HashMap<String, FixedDecimal>;

/// An argument of the command being collected
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: FixedDecimal,
    /// Set by the `@` prefix: exempt from distortion
    pub pinned: bool,
}

impl Arg {
    pub fn new(value: FixedDecimal, pinned: bool) -> Self {
        Self { value, pinned }
    }
}

/// The in-flight command
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub command: Command,
    pub args: Vec<Arg>,
    /// Pin the next value
    pub fix_next: bool,
    /// Column of the command letter
    pub column: usize,
}

impl PendingCommand {
    pub fn new(command: Command, column: usize) -> Self {
        Self {
            command,
            args: Vec::with_capacity(command.letter.arity().len()),
            fix_next: false,
            column,
        }
    }

    /// Number of arguments still missing
    pub fn pending(&self) -> usize {
        self.command.letter.arity().len().saturating_sub(self.args.len())
    }

    /// Kind of the next argument
    pub fn expected(&self) -> Option<ValueKind> {
        self.command.letter.arity().get(self.args.len()).copied()
    }

    fn push(&mut self, value: FixedDecimal) {
        self.args.push(Arg::new(value, self.fix_next));
        self.fix_next = false;
    }
}

/// A command in the output sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub command: Command,
    pub args: Vec<FixedDecimal>,
}

impl Emitted {
    pub fn new(command: Command, args: Vec<FixedDecimal>) -> Self {
        Self { command, args }
    }

    /// `<letter><args>` with comma-joined arguments
    pub fn render(&self, precision: i32) -> String {
        let args: Vec<String> = self.args.iter().map(|arg| arg.format(precision)).collect();
        format!("{}{}", self.command, args.join(","))
    }
}

/// Running result of interpreting a path
#[derive(Debug, Clone, Default)]
pub struct PathState {
    pub sequence: Vec<Emitted>,
    pub cursor: Point,
    /// Start of the current subpath
    pub origin: Point,
    /// Direction of the last emitted line, for merging collinear lines
    pub last_angle: Option<f64>,
    /// A command has been seen, so the leading move is satisfied
    pub(crate) started: bool,
    /// Segments being expanded, outermost first
    pub(crate) active: Vec<String>,
}

impl PathState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state at `position` used to measure a segment; it keeps the
    /// call chain of the measuring expansion.
    pub(crate) fn measuring(position: &Point, active: &[String]) -> Self {
        Self {
            cursor: position.clone(),
            origin: position.clone(),
            started: true,
            active: active.to_vec(),
            ..Self::default()
        }
    }

    /// Canonical path data: commands joined by single spaces
    pub fn render(&self, precision: i32) -> String {
        let commands: Vec<String> = self
            .sequence
            .iter()
            .map(|emitted| emitted.render(precision))
            .collect();
        commands.join(" ")
    }
}

/// One interpretation pass over a token stream: the top-level path or one
/// iteration of a segment expansion
pub(crate) struct Run<'a> {
    pub context: &'a Context,
    pub arguments: &'a Arguments,
    pub distortions: &'a [Distortion],
}

impl Run<'_> {
    fn flush(
        &self,
        pending: Option<PendingCommand>,
        state: &mut PathState,
        insert_at: usize,
        stream: &TokenStream,
    ) -> Result<(), Error> {
        let Some(pending) = pending else {
            return Ok(());
        };
        crate::log::trace!(command = %pending.command, args = pending.args.len(), "flush");
        apply_distortion(
            &pending,
            state,
            self.distortions,
            self.context.options.combine_commands,
            insert_at,
            stream,
        )
    }

    /// A command letter that names an argument or unit while the in-flight
    /// command still needs values
    fn reads_name(&self, letter: &str, current: Option<&PendingCommand>) -> bool {
        current.is_some_and(|pending| pending.pending() > 0)
            && (self.arguments.contains_key(letter) || self.context.unit(letter).is_some())
    }

    /// A segment name, or a count directly followed by a segment name
    fn starts_invocation(&self, stream: &TokenStream) -> bool {
        let index = match stream.current().kind {
            TokenKind::Identifier | TokenKind::Command => stream.position(),
            TokenKind::Number => stream.position() + 1,
            _ => return false,
        };
        stream
            .name_at(index, |name| self.context.is_segment(name))
            .is_some()
    }

    pub fn interpret(&self, stream: &mut TokenStream, state: &mut PathState) -> Result<(), Error> {
        let insert_at = state.sequence.len();
        let mut current: Option<PendingCommand> = None;

        loop {
            if self.starts_invocation(stream) {
                self.flush(current.take(), state, insert_at, stream)?;
                expr::invoke(stream, state, self.context, self.arguments, self.distortions)?;
                continue;
            }
            let token = stream.current().clone();
            match token.kind {
                TokenKind::Command if self.reads_name(&token.lexeme, current.as_ref()) => {
                    self.argument(stream, state, &mut current, insert_at)?;
                    continue;
                }
                TokenKind::Command => {
                    let Some(command) = token.command() else {
                        let (src, span) = stream.locate(&token);
                        return Err(Error::ExpectedCommand {
                            token: token.lexeme,
                            column: token.column,
                            src,
                            span,
                        });
                    };
                    if !state.started && command.letter != CommandLetter::M {
                        let (src, span) = stream.locate(&token);
                        return Err(Error::MissingMove {
                            token: token.lexeme,
                            column: token.column,
                            src,
                            span,
                        });
                    }
                    state.started = true;
                    self.flush(current.take(), state, insert_at, stream)?;
                    current = Some(PendingCommand::new(command, token.column));
                }
                TokenKind::Fix => match current.as_mut() {
                    Some(pending) => pending.fix_next = true,
                    None => {
                        let (src, span) = stream.locate(&token);
                        return Err(Error::ExpectedCommand {
                            token: token.lexeme,
                            column: token.column,
                            src,
                            span,
                        });
                    }
                },
                TokenKind::Whitespace | TokenKind::Delimiter => {}
                TokenKind::End => {
                    self.flush(current.take(), state, insert_at, stream)?;
                    break;
                }
                _ => {
                    self.argument(stream, state, &mut current, insert_at)?;
                    continue;
                }
            }
            stream.advance();
        }
        Ok(())
    }

    /// Read one argument value for the in-flight command, repeating the
    /// command if it is already complete.
    fn argument(
        &self,
        stream: &mut TokenStream,
        state: &mut PathState,
        current: &mut Option<PendingCommand>,
        insert_at: usize,
    ) -> Result<(), Error> {
        let token = stream.current().clone();
        let Some(mut pending) = current.take() else {
            let (src, span) = stream.locate(&token);
            return Err(Error::ExpectedCommand {
                token: token.lexeme,
                column: token.column,
                src,
                span,
            });
        };

        if pending.pending() == 0 {
            let command = pending.command;
            // a pin after a complete command belongs to its repetition
            let fix_next = std::mem::take(&mut pending.fix_next);
            self.flush(Some(pending), state, insert_at, stream)?;
            pending = PendingCommand::new(command, token.column);
            pending.fix_next = fix_next;
            if pending.pending() == 0 {
                let (src, span) = stream.locate(&token);
                return Err(Error::TooManyArguments {
                    command: command.as_char(),
                    token: token.lexeme,
                    column: token.column,
                    src,
                    span,
                });
            }
        }

        // Arc flags may be glued to what follows them: "a 5 5 0 11100,100"
        let at_flag = pending.expected() == Some(ValueKind::Flag);
        if at_flag
            && pending.command.letter == CommandLetter::A
            && token.kind == TokenKind::Number
            && token.lexeme.len() > 1
            && token.lexeme.starts_with(['0', '1'])
        {
            let flag = stream.split_current(1)?;
            pending.push(flag);
        } else {
            let kind = pending.expected().unwrap_or(ValueKind::Unit);
            let scope = Scope::new(self.context, self.arguments, &state.cursor, &state.active);
            let outcome = expr::evaluate(stream, &scope, kind)?;
            pending.push(outcome.value);
        }
        *current = Some(pending);
        Ok(())
    }
}

/// Interpret path data from scratch.
pub fn interpret_path(name: &str, data: &str, context: &Context) -> Result<PathState, Error> {
    let mut stream = TokenStream::new(name, data)?;
    let mut state = PathState::new();
    let arguments = Arguments::new();
    let run = Run {
        context,
        arguments: &arguments,
        distortions: &[],
    };
    run.interpret(&mut stream, &mut state)?;
    crate::log::debug!(commands = state.sequence.len(), "path interpreted");
    Ok(state)
}

/// Expand path data into canonical path data.
pub fn expand_path(data: &str, context: &Context) -> Result<String, Error> {
    let state = interpret_path("d", data, context)?;
    Ok(state.render(context.options.output_precision()))
}
