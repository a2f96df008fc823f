//! The procedural script dialect used by code mode.
//!
//! ```text
//! // genshi procedural script
//! style("#1a1a1a", 2, 1)
//! path {
//!     moveTo(10.000, 20.000)
//!     lineTo(30.000, 40.000)
//! }
//! param("complexity", 0.42)
//! seed(10.000, 20.000, 0.5, 1.5708)
//! ```
//!
//! Parsing is line oriented and lenient: unknown lines are ignored, so
//! hand-written programs that only partially use the dialect still yield
//! whatever path, parameters and seeds they declare.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::entity::{Color, GrowthSeed, Style};
use crate::geometry::Point;

const HEADER: &str = "// genshi procedural script";

/// Structured form of a procedural script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    /// Drawing style, if declared.
    pub style: Option<Style>,
    /// Traced path.
    pub path: Vec<Point>,
    /// Numeric parameters.
    pub params: BTreeMap<String, f64>,
    /// Growth seeds.
    pub seeds: Vec<GrowthSeed>,
}

impl Script {
    /// Render the script as source text.
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        if let Some(style) = &self.style {
            let _ = writeln!(
                out,
                "style(\"{}\", {}, {})",
                style.color.to_hex(),
                style.stroke_width,
                style.opacity
            );
        }
        if !self.path.is_empty() {
            out.push_str("path {\n");
            for (i, p) in self.path.iter().enumerate() {
                let op = if i == 0 { "moveTo" } else { "lineTo" };
                let _ = writeln!(out, "    {op}({:.3}, {:.3})", p.x, p.y);
            }
            out.push_str("}\n");
        }
        for (name, value) in &self.params {
            let _ = writeln!(out, "param(\"{name}\", {value})");
        }
        for seed in &self.seeds {
            let _ = writeln!(
                out,
                "seed({:.3}, {:.3}, {}, {:.4})",
                seed.position.x, seed.position.y, seed.energy, seed.direction
            );
        }
        out
    }

    /// Parse source text.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut script = Self::default();
        for line in source.lines().map(str::trim) {
            if let Some(args) = call_args(line, "moveTo").or_else(|| call_args(line, "lineTo")) {
                if let [x, y] = numbers(&args)[..] {
                    script.path.push(Point::new(x, y));
                }
            } else if let Some(args) = call_args(line, "param") {
                if let [name, value] = &args[..] {
                    if let Ok(v) = value.parse::<f64>() {
                        script.params.insert(unquote(name).to_string(), v);
                    }
                }
            } else if let Some(args) = call_args(line, "seed") {
                if let [x, y, energy, direction] = numbers(&args)[..] {
                    script.seeds.push(GrowthSeed {
                        position: Point::new(x, y),
                        energy,
                        direction,
                    });
                }
            } else if let Some(args) = call_args(line, "style") {
                script.style = parse_style(&args);
            }
        }
        script
    }
}

/// Path traced by `source`.
#[must_use]
pub fn parse_path(source: &str) -> Vec<Point> {
    Script::parse(source).path
}

fn call_args<'a>(line: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let inner = line
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .trim_end()
        .trim_end_matches(';')
        .strip_suffix(')')?;
    Some(inner.split(',').map(str::trim).collect())
}

/// Parse every argument as a finite number, or none at all.
fn numbers(args: &[&str]) -> Vec<f64> {
    let parsed: Option<Vec<f64>> = args
        .iter()
        .map(|a| a.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect();
    parsed.unwrap_or_default()
}

fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

fn parse_style(args: &[&str]) -> Option<Style> {
    let (color, rest) = args.split_first()?;
    let color: Color = unquote(color).parse().ok()?;
    let mut style = Style {
        color,
        ..Style::default()
    };
    let nums = numbers(rest);
    if let Some(width) = nums.first() {
        style.stroke_width = *width;
    }
    if let Some(opacity) = nums.get(1) {
        style.opacity = *opacity;
    }
    Some(style)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_round_trip() {
        let mut params = BTreeMap::new();
        params.insert("scale".to_string(), 5.0);
        let script = Script {
            style: Some(Style::default()),
            path: vec![Point::new(1.0, 2.0), Point::new(3.5, -4.25)],
            params,
            seeds: vec![GrowthSeed {
                position: Point::new(1.0, 2.0),
                energy: 0.75,
                direction: 0.5,
            }],
        };
        let source = script.to_source();
        assert!(source.starts_with(HEADER));
        assert!(source.contains("param(\"scale\", 5)"));
        assert_eq!(Script::parse(&source), script);
    }

    #[test]
    fn test_parse_ignores_unknown_lines() {
        let source = "let x = 3;\nmoveTo(0, 0)\nfoo(1, 2)\nlineTo(10, 5);\nlineTo(oops, 1)\n";
        assert_eq!(
            parse_path(source),
            vec![Point::new(0.0, 0.0), Point::new(10.0, 5.0)]
        );
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(Script::parse(""), Script::default());
    }
}
