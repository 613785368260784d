//! Path syntax preprocessor for vector graphics documents.
//!
//! Path data and numeric attributes may use arithmetic over named units,
//! invoke reusable segments (optionally repeated, rotated, skewed or
//! reversed) and measure segments. Everything is expanded into plain path
//! data with fixed-point arithmetic, so emitted coordinates do not drift.
//!
//! ```
//! use pather::{Context, Options, Segment, UnitDefinition, expand_path};
//!
//! let context = Context::build(
//!     vec![UnitDefinition::new("w", "10")],
//!     vec![Segment::new("step", "h w v w")],
//!     Options::default(),
//! )?;
//! assert_eq!(expand_path("M 0,0 2step%r90", &context)?, "M0,0 v10 h-10 v10 h-10");
//! # Ok::<(), pather::Error>(())
//! ```

use pest_derive::Parser;

pub mod context;
pub mod decimal;
pub mod distortion;
pub mod document;
pub mod errors;
pub mod expr;
pub mod log;
pub mod path;
pub mod token;
pub mod units;

pub use context::{Context, Options};
pub use decimal::{DecimalError, FixedDecimal};
pub use distortion::{Distortion, Point};
pub use document::{DocumentTree, ElementId, ElementTree, transform};
pub use errors::{Error, ErrorKind};
pub use expr::{evaluate_expression, evaluate_list};
pub use path::{PathState, expand_path, interpret_path};
pub use token::{TokenStream, tokenize};
pub use units::{Segment, UnitDefinition, UnitOverride};

#[derive(Parser)]
#[grammar = "pather.pest"]
pub struct PatherParser;

#[cfg(test)]
mod tests {
    use super::*;
    use pest::Parser;

    fn first_rule(input: &str) -> (Rule, &str) {
        let token = PatherParser::parse(Rule::token, input)
            .ok()
            .and_then(|mut pairs| pairs.next())
            .and_then(|token| token.into_inner().next());
        match token {
            Some(pair) => (pair.as_rule(), pair.as_str()),
            None => panic!("no token at the start of {input:?}"),
        }
    }

    #[test]
    fn parse_number_before_identifier() {
        assert_eq!(first_rule("3n"), (Rule::number, "3"));
        assert_eq!(first_rule(".5.5"), (Rule::number, ".5"));
    }

    #[test]
    fn parse_command_letter() {
        assert_eq!(first_rule("l5"), (Rule::command, "l"));
        assert_eq!(first_rule("M 0"), (Rule::command, "M"));
    }

    #[test]
    fn parse_identifier_starting_with_command_letter() {
        assert_eq!(first_rule("loop"), (Rule::identifier, "loop"));
        assert_eq!(first_rule("h_2"), (Rule::identifier, "h_2"));
        assert_eq!(first_rule("$x"), (Rule::identifier, "$x"));
    }

    #[test]
    fn parse_distortion_operators() {
        assert_eq!(first_rule("%r90"), (Rule::rotate, "%r"));
        assert_eq!(first_rule("%o"), (Rule::reverse_order, "%o"));
    }

    #[test]
    fn parse_runs_of_separators() {
        assert_eq!(first_rule(",,1"), (Rule::delimiter, ",,"));
        assert_eq!(first_rule(" \t\n1"), (Rule::blank, " \t\n"));
    }

    #[test]
    fn parse_rejects_unknown_symbol() {
        assert!(PatherParser::parse(Rule::token, "^").is_err());
        assert!(PatherParser::parse(Rule::token, "%x").is_err());
    }
}
