//! Interpretation context
//!
//! The unit and segment tables are built once per document and never change
//! while paths are interpreted; [`Options`] carries the front-end settings.

use std::collections::HashMap;

use crate::decimal::{FixedDecimal, PRECISION};
use crate::errors::Error;
use crate::units::{self, Segment, UnitDefinition, UnitOverride};

pub type UnitTable = HashMap<String, FixedDecimal>;
pub type SegmentTable = HashMap<String, Segment>;

/// Front-end settings
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Fractional digits in emitted numbers (trailing zeros trimmed)
    pub precision: u32,
    /// Merge adjacent collinear `h`/`v`/`l` commands and consecutive moves
    pub combine_commands: bool,
    /// Externally supplied unit values; they win over document definitions
    pub overrides: Vec<UnitOverride>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            precision: 3,
            combine_commands: false,
            overrides: Vec::new(),
        }
    }
}

impl Options {
    /// Precision handed to [`FixedDecimal::format`], clamped to the
    /// internal precision
    pub fn output_precision(&self) -> i32 {
        self.precision.min(PRECISION) as i32
    }
}

/// Frozen unit and segment tables plus options
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub(crate) units: UnitTable,
    pub(crate) segments: SegmentTable,
    pub(crate) options: Options,
}

impl Context {
    /// Assemble a context from already resolved tables.
    ///
    /// Unit and segment ids share one namespace.
    pub fn new(units: UnitTable, segments: SegmentTable, options: Options) -> Result<Self, Error> {
        if let Some(id) = segments.keys().find(|id| units.contains_key(*id)) {
            return Err(Error::SegmentIsUnit { id: id.clone() });
        }
        Ok(Self {
            units,
            segments,
            options,
        })
    }

    /// Resolve unit definitions (with the option overrides) and build the
    /// segment table, both in document order.
    pub fn build(
        units: Vec<UnitDefinition>,
        segments: Vec<Segment>,
        options: Options,
    ) -> Result<Self, Error> {
        let units = units::resolve_units(units, &options.overrides)?;
        let segments = units::segment_table(segments, &units)?;
        Context::new(units, segments, options)
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    pub fn segments(&self) -> &SegmentTable {
        &self.segments
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn unit(&self, name: &str) -> Option<&FixedDecimal> {
        self.units.get(name)
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.get(name)
    }

    pub fn is_segment(&self, name: &str) -> bool {
        self.segments.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_precision_is_three() {
        let options = Options::default();
        assert_eq!(options.precision, 3);
        assert!(!options.combine_commands);
        assert_eq!(Options { precision: 40, ..options }.output_precision(), 18);
    }

    #[test]
    fn unit_and_segment_ids_share_a_namespace() {
        let mut units = UnitTable::new();
        units.insert("w".into(), FixedDecimal::from_int(2));
        let mut segments = SegmentTable::new();
        segments.insert("w".into(), Segment::new("w", "l 1 0"));
        let err = Context::new(units, segments, Options::default()).unwrap_err();
        assert!(matches!(err, Error::SegmentIsUnit { id } if id == "w"));
    }

    #[test]
    fn build_resolves_in_document_order() {
        let context = Context::build(
            vec![UnitDefinition::new("a", "2b"), UnitDefinition::new("b", "3")],
            vec![Segment::new("step", "l a 0")],
            Options::default(),
        )
        .unwrap();
        assert_eq!(context.unit("a").unwrap().format(-1), "6");
        assert!(context.is_segment("step"));
    }
}
