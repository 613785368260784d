//! Fixture-driven interpreter tests
//!
//! Each `tests/cases/*.pather` file describes one document:
//!
//! ```text
//! # comment
//! option precision 2        (also: option combine, option override w=3)
//! unit w 10
//! segment step h w v w
//! path M 0,0 2step
//! expect: M0,0 h10 v10 h10 v10
//! ```
//!
//! `error: Reference` (an error kind) may replace `expect:`.

use datatest_stable::Utf8Path;
use pather::{Context, Options, Segment, UnitDefinition, UnitOverride, expand_path};

/// What a fixture expects from its path
#[derive(Debug)]
enum Expected {
    Output(String),
    ErrorKind(String),
}

#[derive(Debug)]
struct Case {
    units: Vec<UnitDefinition>,
    segments: Vec<Segment>,
    options: Options,
    path: String,
    expected: Expected,
}

fn parse_case(source: &str) -> Result<Case, String> {
    let mut units = Vec::new();
    let mut segments = Vec::new();
    let mut options = Options::default();
    let mut path = None;
    let mut expected = None;

    for (number, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(output) = line.strip_prefix("expect:") {
            expected = Some(Expected::Output(output.trim().to_string()));
            continue;
        }
        if let Some(kind) = line.strip_prefix("error:") {
            expected = Some(Expected::ErrorKind(kind.trim().to_string()));
            continue;
        }

        let (key, rest) = line.split_once(' ').unwrap_or((line, ""));
        match key {
            "unit" | "segment" => {
                let Some((id, body)) = rest.split_once(' ') else {
                    return Err(format!("line {}: {key} needs an id and a value", number + 1));
                };
                if key == "unit" {
                    units.push(UnitDefinition::new(id, body.trim()));
                } else {
                    segments.push(Segment::new(id, body.trim()));
                }
            }
            "path" => path = Some(rest.to_string()),
            "option" => {
                let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                match name {
                    "precision" => {
                        options.precision = value
                            .parse()
                            .map_err(|e| format!("line {}: bad precision: {e}", number + 1))?;
                    }
                    "combine" => options.combine_commands = true,
                    "override" => {
                        let parsed: UnitOverride = value
                            .parse()
                            .map_err(|e| format!("line {}: {e}", number + 1))?;
                        options.overrides.push(parsed);
                    }
                    other => return Err(format!("line {}: unknown option {other:?}", number + 1)),
                }
            }
            other => return Err(format!("line {}: unknown directive {other:?}", number + 1)),
        }
    }

    Ok(Case {
        units,
        segments,
        options,
        path: path.ok_or("missing path line")?,
        expected: expected.ok_or("missing expect: or error: line")?,
    })
}

/// Format a colored inline diff using dissimilar
fn format_inline_diff(expected: &str, actual: &str) -> String {
    use dissimilar::Chunk;

    let mut output = String::new();
    output.push_str("\n=== Inline Diff (expected vs actual) ===\n");
    output.push_str("Legend: [-expected only-] [+actual only+] [unchanged]\n\n");
    for chunk in dissimilar::diff(expected, actual) {
        match chunk {
            Chunk::Equal(s) => output.push_str(s),
            Chunk::Delete(s) => {
                output.push_str("\x1b[31m[-");
                output.push_str(s);
                output.push_str("-]\x1b[0m");
            }
            Chunk::Insert(s) => {
                output.push_str("\x1b[32m[+");
                output.push_str(s);
                output.push_str("+]\x1b[0m");
            }
        }
    }
    output
}

fn run(case: &Case) -> Result<String, pather::Error> {
    let context = Context::build(
        case.units.clone(),
        case.segments.clone(),
        case.options.clone(),
    )?;
    expand_path(&case.path, &context)
}

fn test_case_file(path: &Utf8Path) -> datatest_stable::Result<()> {
    let source = std::fs::read_to_string(path)?;
    let case = parse_case(&source).map_err(|e| format!("{path}: {e}"))?;

    match (&case.expected, run(&case)) {
        (Expected::Output(expected), Ok(actual)) => {
            if expected != &actual {
                panic!(
                    "output mismatch for {}:\n  expected: {expected}\n  actual:   {actual}\n{}",
                    path,
                    format_inline_diff(expected, &actual)
                );
            }
        }
        (Expected::Output(_), Err(err)) => {
            panic!("{} failed: {:?}", path, miette::Report::from(err));
        }
        (Expected::ErrorKind(kind), Ok(actual)) => {
            panic!("{} expected a {kind} error, got {actual:?}", path);
        }
        (Expected::ErrorKind(kind), Err(err)) => {
            let actual = format!("{:?}", err.kind());
            if kind != &actual {
                panic!("{} expected a {kind} error, got {actual}: {err}", path);
            }
        }
    }

    Ok(())
}

datatest_stable::harness! {
    { test = test_case_file, root = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/cases"), pattern = r"\.pather$" },
}
