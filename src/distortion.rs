//! Geometric distortions of segment invocations
//!
//! A distortion maps a point about an origin. Invocations push distortions on
//! a stack that nested invocations inherit; the stack is applied innermost
//! (last pushed) first.
//!
//! [`apply_distortion`] flushes a finished command: it runs the coordinates
//! through the stack, re-derives line commands, merges with the previous
//! command when asked to, and moves the cursor.

use enum_dispatch::enum_dispatch;

use crate::decimal::{DecimalError, FixedDecimal};
use crate::errors::Error;
use crate::path::{Arg, Emitted, PathState, PendingCommand};
use crate::token::{Command, CommandLetter, TokenStream};

/// A point in path coordinates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Point {
    pub x: FixedDecimal,
    pub y: FixedDecimal,
}

impl Point {
    pub fn new(x: FixedDecimal, y: FixedDecimal) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Componentwise sum
    pub fn offset(&self, delta: &Point) -> Point {
        Point::new(&self.x + &delta.x, &self.y + &delta.y)
    }
}

#[enum_dispatch]
pub trait Distort {
    /// Map `point` about `origin`.
    fn distort(&self, point: &Point, origin: &Point) -> Result<Point, DecimalError>;
}

#[enum_dispatch(Distort)]
#[derive(Debug, Clone, PartialEq)]
pub enum Distortion {
    Rotate,
    SkewHorizontal,
    SkewVertical,
    ReverseOrder,
}

impl Distortion {
    /// Rotation angle in degrees, for rotations
    pub fn rotation(&self) -> Option<&FixedDecimal> {
        match self {
            Distortion::Rotate(rotate) => Some(&rotate.angle),
            _ => None,
        }
    }

    pub fn is_reverse(&self) -> bool {
        matches!(self, Distortion::ReverseOrder(_))
    }
}

/// Angle in radians after reducing degrees mod 360
fn radians(degrees: &FixedDecimal) -> f64 {
    (degrees.to_f64() % 360.0).to_radians()
}

/// Cosine and sine with the 45° family and the axes snapped exactly
fn cos_sin(degrees: &FixedDecimal) -> (f64, f64) {
    let (mut sin, mut cos) = radians(degrees).sin_cos();
    if (cos - sin).abs() < f64::EPSILON * 2.0 {
        sin = cos;
    } else if (cos + sin).abs() < f64::EPSILON * 2.0 {
        cos = -sin;
    }
    if cos.abs() < f64::EPSILON {
        cos = 0.0;
    }
    if sin.abs() < f64::EPSILON {
        sin = 0.0;
    }
    (cos, sin)
}

/// Counter-clockwise rotation (in the y-down frame: clockwise on screen)
#[derive(Debug, Clone, PartialEq)]
pub struct Rotate {
    pub angle: FixedDecimal,
}

impl Distort for Rotate {
    fn distort(&self, point: &Point, origin: &Point) -> Result<Point, DecimalError> {
        let (cos, sin) = cos_sin(&self.angle);
        let dx = &point.x - &origin.x;
        let dy = &point.y - &origin.y;
        Ok(Point::new(
            &origin.x + &(dx.scale_by(cos)? - dy.scale_by(sin)?),
            &origin.y + &(dy.scale_by(cos)? + dx.scale_by(sin)?),
        ))
    }
}

/// Shear along x: `x' = x0 + (x - x0) - (y - y0)·tan θ`
#[derive(Debug, Clone, PartialEq)]
pub struct SkewHorizontal {
    pub angle: FixedDecimal,
}

impl Distort for SkewHorizontal {
    fn distort(&self, point: &Point, origin: &Point) -> Result<Point, DecimalError> {
        let tan = radians(&self.angle).tan();
        let dx = &point.x - &origin.x;
        let dy = &point.y - &origin.y;
        Ok(Point::new(&origin.x + &(dx - dy.scale_by(tan)?), point.y.clone()))
    }
}

/// Shear along y: `y' = y0 + (y - y0) - (x - x0)·tan θ`
#[derive(Debug, Clone, PartialEq)]
pub struct SkewVertical {
    pub angle: FixedDecimal,
}

impl Distort for SkewVertical {
    fn distort(&self, point: &Point, origin: &Point) -> Result<Point, DecimalError> {
        let tan = radians(&self.angle).tan();
        let dx = &point.x - &origin.x;
        let dy = &point.y - &origin.y;
        Ok(Point::new(point.x.clone(), &origin.y + &(dy - dx.scale_by(tan)?)))
    }
}

/// Emits commands in reverse order; coordinates are untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReverseOrder;

impl Distort for ReverseOrder {
    fn distort(&self, point: &Point, _origin: &Point) -> Result<Point, DecimalError> {
        Ok(point.clone())
    }
}

/// Run `point` through the whole stack, last pushed first.
pub fn distort_point(
    point: &Point,
    origin: &Point,
    stack: &[Distortion],
) -> Result<Point, DecimalError> {
    stack
        .iter()
        .rev()
        .try_fold(point.clone(), |point, distortion| distortion.distort(&point, origin))
}

/// Coordinate frame of the command being flushed
struct Frame<'a> {
    origin: Point,
    cursor: &'a Point,
    relative: bool,
    stack: &'a [Distortion],
}

impl Frame<'_> {
    /// A pinned value is an absolute coordinate, re-expressed in the
    /// command's frame.
    fn pin(&self, value: &FixedDecimal, cursor: &FixedDecimal) -> FixedDecimal {
        if self.relative {
            value - cursor
        } else {
            value.clone()
        }
    }

    fn place(&self, x: &Arg, y: &Arg) -> Result<Point, Error> {
        let raw = Point::new(x.value.clone(), y.value.clone());
        let mut point = distort_point(&raw, &self.origin, self.stack)?;
        if x.pinned {
            point.x = self.pin(&x.value, &self.cursor.x);
        }
        if y.pinned {
            point.y = self.pin(&y.value, &self.cursor.y);
        }
        Ok(point)
    }
}

/// How a freshly emitted command may fold into the previous one
enum Merge {
    Never,
    Line(f64),
    Move,
}

fn merge_into_last(state: &mut PathState, emitted: &Emitted, merge: &Merge) -> bool {
    match merge {
        Merge::Never => return false,
        Merge::Line(angle) if state.last_angle != Some(*angle) => return false,
        _ => {}
    }
    let Some(last) = state.sequence.last_mut() else {
        return false;
    };
    if last.command != emitted.command {
        return false;
    }
    if emitted.command.relative {
        for (total, value) in last.args.iter_mut().zip(&emitted.args) {
            *total += value.clone();
        }
    } else {
        last.args = emitted.args.clone();
    }
    true
}

/// Flush a finished command into `state`.
///
/// `insert_at` is where the enclosing invocation started emitting; commands
/// are spliced there when an odd number of order reversals is active.
pub fn apply_distortion(
    pending: &PendingCommand,
    state: &mut PathState,
    stack: &[Distortion],
    combine: bool,
    insert_at: usize,
    stream: &TokenStream,
) -> Result<(), Error> {
    let command = pending.command;
    let arity = command.letter.arity().len();
    let span = (pending.column, 1).into();
    if pending.args.len() < arity {
        return Err(Error::TooFewArguments {
            command: command.as_char(),
            expected: arity,
            found: pending.args.len(),
            column: pending.column,
            src: stream.named_source(),
            span,
        });
    }
    if pending.fix_next {
        return Err(Error::DanglingFix {
            command: command.as_char(),
            column: pending.column,
            src: stream.named_source(),
            span,
        });
    }

    let relative = command.relative;
    let origin = if relative { Point::zero() } else { state.cursor.clone() };
    let frame = Frame {
        origin: origin.clone(),
        cursor: &state.cursor,
        relative,
        stack,
    };

    let mut merge = Merge::Never;
    let mut line_angle = None;
    let (emitted, end) = match (command.letter, pending.args.as_slice()) {
        (CommandLetter::A, [rx, ry, rotation, large, sweep, x, y]) => {
            let end = frame.place(x, y)?;
            let rotation = if rotation.pinned {
                rotation.value.clone()
            } else {
                stack
                    .iter()
                    .filter_map(Distortion::rotation)
                    .fold(rotation.value.clone(), |total, angle| &total + angle)
            };
            let args = vec![
                rx.value.clone(),
                ry.value.clone(),
                rotation,
                large.value.clone(),
                sweep.value.clone(),
                end.x.clone(),
                end.y.clone(),
            ];
            (Some(Emitted::new(command, args)), Some(end))
        }
        (CommandLetter::C, [x1, y1, x2, y2, x, y]) => {
            let first = frame.place(x1, y1)?;
            let second = frame.place(x2, y2)?;
            let end = frame.place(x, y)?;
            let args = vec![first.x, first.y, second.x, second.y, end.x.clone(), end.y.clone()];
            (Some(Emitted::new(command, args)), Some(end))
        }
        (CommandLetter::Q | CommandLetter::S, [x1, y1, x, y]) => {
            let control = frame.place(x1, y1)?;
            let end = frame.place(x, y)?;
            let args = vec![control.x, control.y, end.x.clone(), end.y.clone()];
            (Some(Emitted::new(command, args)), Some(end))
        }
        (CommandLetter::M | CommandLetter::T, [x, y]) => {
            let end = frame.place(x, y)?;
            if command.letter == CommandLetter::M {
                merge = Merge::Move;
            }
            (Some(Emitted::new(command, vec![end.x.clone(), end.y.clone()])), Some(end))
        }
        (CommandLetter::H | CommandLetter::V | CommandLetter::L, args) => {
            let end = match (command.letter, args) {
                (CommandLetter::H, [x]) => {
                    let fixed_y = Arg::new(origin.y.clone(), false);
                    let mut end = frame.place(x, &fixed_y)?;
                    if x.pinned {
                        end.y = origin.y.clone();
                    }
                    end
                }
                (CommandLetter::V, [y]) => {
                    let fixed_x = Arg::new(origin.x.clone(), false);
                    let mut end = frame.place(&fixed_x, y)?;
                    if y.pinned {
                        end.x = origin.x.clone();
                    }
                    end
                }
                (CommandLetter::L, [x, y]) => frame.place(x, y)?,
                _ => return Err(arity_mismatch(pending, stream)),
            };
            let dx = &end.x - &origin.x;
            let dy = &end.y - &origin.y;
            let angle = dy.to_f64().atan2(dx.to_f64()).to_degrees();
            let emitted = match (dx.is_zero(), dy.is_zero()) {
                (true, true) => None,
                (true, false) => Some(Emitted::new(
                    Command::new(CommandLetter::V, relative),
                    vec![end.y.clone()],
                )),
                (false, true) => Some(Emitted::new(
                    Command::new(CommandLetter::H, relative),
                    vec![end.x.clone()],
                )),
                (false, false) => Some(Emitted::new(
                    Command::new(CommandLetter::L, relative),
                    vec![end.x.clone(), end.y.clone()],
                )),
            };
            if emitted.is_some() {
                merge = Merge::Line(angle);
                line_angle = Some(angle);
            }
            (emitted, Some(end))
        }
        (CommandLetter::Z, []) => (Some(Emitted::new(command, Vec::new())), None),
        _ => return Err(arity_mismatch(pending, stream)),
    };

    if let Some(emitted) = emitted {
        let reversed = stack.iter().filter(|d| d.is_reverse()).count() % 2 == 1;
        if reversed {
            let index = insert_at.min(state.sequence.len());
            crate::log::trace!(command = %emitted.command, index, "splicing reversed command");
            state.sequence.insert(index, emitted);
        } else if combine && merge_into_last(state, &emitted, &merge) {
            crate::log::trace!(command = %emitted.command, "merged into previous command");
        } else {
            state.sequence.push(emitted);
        }
    }
    if line_angle.is_some() {
        state.last_angle = line_angle;
    }

    match end {
        Some(end) => {
            state.cursor = if relative { state.cursor.offset(&end) } else { end };
            if command.letter == CommandLetter::M {
                state.origin = state.cursor.clone();
            }
        }
        None => {
            state.cursor = state.origin.clone();
            state.last_angle = None;
        }
    }
    Ok(())
}

fn arity_mismatch(pending: &PendingCommand, stream: &TokenStream) -> Error {
    Error::TooFewArguments {
        command: pending.command.as_char(),
        expected: pending.command.letter.arity().len(),
        found: pending.args.len(),
        column: pending.column,
        src: stream.named_source(),
        span: (pending.column, 1).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> FixedDecimal {
        text.parse().unwrap()
    }

    fn point(x: &str, y: &str) -> Point {
        Point::new(dec(x), dec(y))
    }

    fn rounded(point: &Point) -> (String, String) {
        (point.x.format(3), point.y.format(3))
    }

    #[test]
    fn right_angle_rotation_is_exact() {
        let rotate = Distortion::from(Rotate { angle: dec("90") });
        let turned = rotate.distort(&point("10", "0"), &Point::zero()).unwrap();
        assert_eq!(turned, point("0", "10"));
        let back = Distortion::from(Rotate { angle: dec("-270") });
        assert_eq!(back.distort(&point("10", "0"), &Point::zero()).unwrap(), point("0", "10"));
    }

    #[test]
    fn rotation_about_an_origin() {
        let rotate = Distortion::from(Rotate { angle: dec("180") });
        let turned = rotate
            .distort(&point("15", "5"), &point("10", "5"))
            .unwrap();
        assert_eq!(turned, point("5", "5"));
    }

    #[test]
    fn diagonal_rotations_keep_equal_magnitudes() {
        let quarter = Rotate { angle: dec("45") }
            .distort(&point("1", "0"), &Point::zero())
            .unwrap();
        assert_eq!(quarter.x, quarter.y);
        let three_eighths = Rotate { angle: dec("135") }
            .distort(&point("1", "0"), &Point::zero())
            .unwrap();
        assert_eq!(three_eighths.x, -three_eighths.y.clone());
    }

    #[test]
    fn skews_shear_one_axis() {
        let skewed = SkewHorizontal { angle: dec("45") }
            .distort(&point("0", "10"), &Point::zero())
            .unwrap();
        assert_eq!(rounded(&skewed), ("-10".to_string(), "10".to_string()));
        let skewed = SkewVertical { angle: dec("45") }
            .distort(&point("10", "0"), &Point::zero())
            .unwrap();
        assert_eq!(rounded(&skewed), ("10".to_string(), "-10".to_string()));
    }

    #[test]
    fn stack_applies_innermost_first() {
        let stack = vec![
            Distortion::from(Rotate { angle: dec("90") }),
            Distortion::from(SkewHorizontal { angle: dec("45") }),
        ];
        let moved = distort_point(&point("0", "10"), &Point::zero(), &stack).unwrap();
        assert_eq!(rounded(&moved), ("-10".to_string(), "-10".to_string()));
    }

    #[test]
    fn reverse_order_leaves_points_alone() {
        let stack = vec![Distortion::from(ReverseOrder)];
        assert_eq!(
            distort_point(&point("3", "4"), &Point::zero(), &stack).unwrap(),
            point("3", "4")
        );
        assert!(stack[0].is_reverse());
        assert!(stack[0].rotation().is_none());
    }
}
