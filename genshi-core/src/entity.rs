//! Entities - the unit of editable content, carrying one representation per mode.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::script;
use crate::geometry::{Bounds, Point};

/// Unique identifier for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new unique entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrokeId(Uuid);

impl StrokeId {
    /// Create a new unique stroke ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Stable ID for a stroke synthesized from another mode.
    ///
    /// The same `origin` always yields the same ID, so re-translating a
    /// pattern replaces its stroke instead of stacking a new one.
    #[must_use]
    pub fn derived(origin: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, origin.as_bytes()))
    }
}

impl Default for StrokeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the four parallel representations of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Freehand vector strokes.
    Draw,
    /// Parametric pattern controls.
    Parametric,
    /// Procedural source code.
    Code,
    /// Organic growth simulation.
    Growth,
}

impl EditMode {
    /// Every mode, in declaration order.
    pub const ALL: [Self; 4] = [Self::Draw, Self::Parametric, Self::Code, Self::Growth];

    /// Compositing order, back to front.
    pub const Z_ORDER: [Self; 4] = [Self::Growth, Self::Code, Self::Parametric, Self::Draw];

    /// Dense index for per-mode arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Draw => 0,
            Self::Parametric => 1,
            Self::Code => 2,
            Self::Growth => 3,
        }
    }

    /// Lowercase name, as used in cache keys and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Parametric => "parametric",
            Self::Code => "code",
            Self::Growth => "growth",
        }
    }

    /// The three modes other than this one.
    pub fn others(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |m| *m != self)
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RGBA color, serialized as `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Opaque color from RGB channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Color from RGBA channels.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Hex form, `#rrggbb` when opaque and `#rrggbbaa` otherwise.
    #[must_use]
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("color must start with '#': {s}"))?;
        let channel = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|c| u8::from_str_radix(c, 16).ok())
                .ok_or_else(|| format!("invalid color: {s}"))
        };
        match hex.len() {
            3 => {
                let short = |i: usize| {
                    hex.get(i..=i)
                        .and_then(|c| u8::from_str_radix(c, 16).ok())
                        .map(|v| v * 17)
                        .ok_or_else(|| format!("invalid color: {s}"))
                };
                Ok(Self::rgb(short(0)?, short(1)?, short(2)?))
            }
            6 => Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(format!("invalid color length: {s}")),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// How a layer or stroke combines with what is beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Source over.
    #[default]
    Normal,
    /// Multiply channels.
    Multiply,
    /// Inverse multiply of inverses.
    Screen,
    /// Multiply or screen depending on the backdrop.
    Overlay,
    /// Per-channel minimum.
    Darken,
    /// Per-channel maximum.
    Lighten,
    /// Additive, clamped.
    Add,
}

/// Style shared by all representations of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    /// Stroke and fill color.
    pub color: Color,
    /// Stroke width in world units.
    pub stroke_width: f64,
    /// Blend mode used when drawing the entity.
    pub blend: BlendMode,
    /// Opacity in `0.0..=1.0`.
    pub opacity: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            stroke_width: 2.0,
            blend: BlendMode::Normal,
            opacity: 1.0,
        }
    }
}

/// A sampled pointer position along a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    /// X position in world units.
    pub x: f64,
    /// Y position in world units.
    pub y: f64,
    /// Pen pressure in `0.0..=1.0`.
    #[serde(default = "default_pressure")]
    pub pressure: f64,
    /// Pen tilt along X, in degrees.
    #[serde(default)]
    pub tilt_x: f64,
    /// Pen tilt along Y, in degrees.
    #[serde(default)]
    pub tilt_y: f64,
    /// Sample time in milliseconds.
    #[serde(default)]
    pub timestamp_ms: u64,
}

const fn default_pressure() -> f64 {
    0.5
}

impl StrokePoint {
    /// Point at `(x, y)` with default pressure and no tilt.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            pressure: default_pressure(),
            tilt_x: 0.0,
            tilt_y: 0.0,
            timestamp_ms: 0,
        }
    }

    /// Set the pressure.
    #[must_use]
    pub const fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = pressure;
        self
    }

    /// Set the sample time.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Position without pen data.
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Whether every numeric field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.pressure.is_finite()
            && self.tilt_x.is_finite()
            && self.tilt_y.is_finite()
    }
}

/// An ordered list of sampled points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Stroke identifier.
    pub id: StrokeId,
    /// Samples in drawing order.
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    /// Create a stroke with a fresh ID.
    #[must_use]
    pub fn new(points: Vec<StrokePoint>) -> Self {
        Self {
            id: StrokeId::new(),
            points,
        }
    }

    /// Create a stroke with a known ID.
    #[must_use]
    pub fn with_id(id: StrokeId, points: Vec<StrokePoint>) -> Self {
        Self { id, points }
    }

    /// Bounds of the sampled positions.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.points.iter().map(StrokePoint::position))
    }

    /// Append the points of a continuation of this stroke, keeping them in
    /// sample-time order. Samples with equal times keep arrival order.
    pub fn absorb(&mut self, continuation: Self) {
        self.points.extend(continuation.points);
        self.points.sort_by_key(|p| p.timestamp_ms);
    }

    /// Whether the stroke has fewer than two distinct positions.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        let Some(first) = self.points.first() else {
            return true;
        };
        self.points
            .iter()
            .all(|p| p.position().distance(first.position()) <= f64::EPSILON)
    }
}

/// Vector (draw) representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorRepr {
    /// Strokes in drawing order.
    pub strokes: Vec<Stroke>,
}

impl VectorRepr {
    /// Whether there is nothing to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(|s| s.points.is_empty())
    }

    /// Look up a stroke.
    #[must_use]
    pub fn stroke(&self, id: StrokeId) -> Option<&Stroke> {
        self.strokes.iter().find(|s| s.id == id)
    }

    /// Extend an existing stroke with the same ID, or push a new one.
    pub fn absorb_stroke(&mut self, stroke: Stroke) {
        match self.strokes.iter_mut().find(|s| s.id == stroke.id) {
            Some(existing) => existing.absorb(stroke),
            None => self.strokes.push(stroke),
        }
    }

    /// Replace an existing stroke with the same ID, or push a new one.
    pub fn upsert_stroke(&mut self, stroke: Stroke) {
        match self.strokes.iter_mut().find(|s| s.id == stroke.id) {
            Some(existing) => *existing = stroke,
            None => self.strokes.push(stroke),
        }
    }

    /// Bounds over every stroke.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(
            self.strokes
                .iter()
                .flat_map(|s| s.points.iter().map(StrokePoint::position)),
        )
    }
}

/// A parametric parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Numeric parameter.
    Number(f64),
    /// Color parameter.
    Color(Color),
}

impl ParamValue {
    /// Numeric value, if this is a number.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Color(_) => None,
        }
    }

    /// Color value, if this is a color.
    #[must_use]
    pub const fn as_color(&self) -> Option<Color> {
        match self {
            Self::Color(c) => Some(*c),
            Self::Number(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Color> for ParamValue {
    fn from(value: Color) -> Self {
        Self::Color(value)
    }
}

/// Named parameters of a parametric pattern, ordered by name.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Coarse pattern classification, or a named pattern from the pattern library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternType {
    /// Straight line.
    Linear,
    /// Smooth curve.
    Curve,
    /// Jagged, high-variance path.
    Complex,
    /// Varied but smooth path.
    Organic,
    /// A library pattern referenced by name.
    Named(String),
}

impl PatternType {
    /// Name as serialized.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Linear => "linear",
            Self::Curve => "curve",
            Self::Complex => "complex",
            Self::Organic => "organic",
            Self::Named(name) => name,
        }
    }
}

impl From<String> for PatternType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "linear" => Self::Linear,
            "curve" => Self::Curve,
            "complex" => Self::Complex,
            "organic" => Self::Organic,
            _ => Self::Named(value),
        }
    }
}

impl From<PatternType> for String {
    fn from(value: PatternType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parametric representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricRepr {
    /// Pattern instance identifier.
    pub pattern_id: String,
    /// Pattern classification.
    pub pattern_type: PatternType,
    /// Pattern parameters.
    pub parameters: ParamMap,
    /// World-space region the pattern fills.
    pub region: Bounds,
}

impl ParametricRepr {
    /// Numeric parameter by name.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(ParamValue::as_number)
    }
}

/// Output of running procedural source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Points traced by the program.
    pub points: Vec<Point>,
    /// Error message if execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Vec<Point>> for ExecutionResult {
    fn from(points: Vec<Point>) -> Self {
        Self {
            points,
            error: None,
        }
    }
}

/// Procedural (code) representation.
///
/// The traced path is resolved once when the program is set, since the
/// render loop asks for it every frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProgramRecord", into = "ProgramRecord")]
pub struct ProceduralRepr {
    source: String,
    last_result: Option<ExecutionResult>,
    traced: Vec<Point>,
}

/// Serialized form of [`ProceduralRepr`].
#[derive(Serialize, Deserialize)]
struct ProgramRecord {
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_result: Option<ExecutionResult>,
}

impl From<ProgramRecord> for ProceduralRepr {
    fn from(record: ProgramRecord) -> Self {
        Self::new(record.source, record.last_result)
    }
}

impl From<ProceduralRepr> for ProgramRecord {
    fn from(repr: ProceduralRepr) -> Self {
        Self {
            source: repr.source,
            last_result: repr.last_result,
        }
    }
}

impl ProceduralRepr {
    /// A program and the result of its most recent execution.
    #[must_use]
    pub fn new(source: String, last_result: Option<ExecutionResult>) -> Self {
        let traced = match &last_result {
            Some(result) if !result.points.is_empty() => result.points.clone(),
            _ => script::parse_path(&source),
        };
        Self {
            source,
            last_result,
            traced,
        }
    }

    /// Program source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Result of the most recent execution.
    #[must_use]
    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.last_result.as_ref()
    }

    /// Points the program draws: the last result if it has any, else the
    /// path parsed from the source.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.traced
    }
}

/// A growth seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthSeed {
    /// World position.
    pub position: Point,
    /// Growth energy in `0.0..=1.0`.
    pub energy: f64,
    /// Growth direction in radians.
    pub direction: f64,
}

impl GrowthSeed {
    /// Visual radius of the seed, growing with its energy.
    #[must_use]
    pub fn radius(&self) -> f64 {
        2.0 + self.energy.clamp(0.0, 1.0) * 6.0
    }

    /// Whether every numeric field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.energy.is_finite() && self.direction.is_finite()
    }
}

/// Organic (growth) representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganicRepr {
    /// Seeds of the simulation.
    pub seeds: Vec<GrowthSeed>,
    /// Simulation generation count.
    pub generation: u32,
}

impl OrganicRepr {
    /// Bounds covering every seed disc.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.seeds
            .iter()
            .map(|s| {
                let r = s.radius();
                Bounds::new(
                    s.position.x - r,
                    s.position.y - r,
                    s.position.x + r,
                    s.position.y + r,
                )
            })
            .reduce(|a, b| a.union(&b))
    }
}

/// The four representations of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Representations {
    /// Vector strokes. Empty means absent.
    #[serde(default)]
    pub vector: VectorRepr,
    /// Parametric pattern, if any.
    #[serde(default)]
    pub parametric: Option<ParametricRepr>,
    /// Procedural source, if any.
    #[serde(default)]
    pub procedural: Option<ProceduralRepr>,
    /// Growth seeds. Empty means absent.
    #[serde(default)]
    pub organic: OrganicRepr,
}

/// The unit of editable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier.
    pub id: EntityId,
    /// Per-mode representations.
    pub reprs: Representations,
    /// Shared style.
    pub style: Style,
    /// Bounds of every populated representation.
    pub bounds: Bounds,
    /// Last modification time in milliseconds.
    pub modified_at_ms: u64,
}

impl Entity {
    /// Create an empty entity.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            reprs: Representations::default(),
            style: Style::default(),
            bounds: Bounds::default(),
            modified_at_ms: 0,
        }
    }

    /// Whether the given mode has something to render for this entity.
    #[must_use]
    pub fn has_content(&self, mode: EditMode) -> bool {
        match mode {
            EditMode::Draw => !self.reprs.vector.is_empty(),
            EditMode::Parametric => self
                .reprs
                .parametric
                .as_ref()
                .is_some_and(|p| p.region.width() > 0.0 && p.region.height() > 0.0),
            EditMode::Code => self
                .reprs
                .procedural
                .as_ref()
                .is_some_and(|p| !p.points().is_empty()),
            EditMode::Growth => !self.reprs.organic.seeds.is_empty(),
        }
    }

    /// Modes that currently have content.
    pub fn populated_modes(&self) -> impl Iterator<Item = EditMode> + '_ {
        EditMode::ALL.into_iter().filter(|m| self.has_content(*m))
    }

    /// Whether no mode has content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populated_modes().next().is_none()
    }

    /// Bounds of one mode's representation.
    #[must_use]
    pub fn mode_bounds(&self, mode: EditMode) -> Option<Bounds> {
        if !self.has_content(mode) {
            return None;
        }
        match mode {
            EditMode::Draw => self.reprs.vector.bounds(),
            EditMode::Parametric => self.reprs.parametric.as_ref().map(|p| p.region),
            EditMode::Code => self
                .reprs
                .procedural
                .as_ref()
                .and_then(|p| Bounds::from_points(p.points().iter().copied())),
            EditMode::Growth => self.reprs.organic.bounds(),
        }
    }

    /// Union of the bounds of every populated representation.
    #[must_use]
    pub fn content_bounds(&self) -> Option<Bounds> {
        EditMode::ALL
            .into_iter()
            .filter_map(|m| self.mode_bounds(m))
            .reduce(|a, b| a.union(&b))
    }

    /// Recompute `bounds`, padded by half the stroke width.
    pub fn refresh_bounds(&mut self) {
        self.bounds = self
            .content_bounds()
            .map(|b| b.expand(self.style.stroke_width.max(0.0) / 2.0))
            .unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex_round_trip() {
        let c: Color = "#ff8000".parse().unwrap();
        assert_eq!(c, Color::rgb(255, 128, 0));
        assert_eq!(c.to_hex(), "#ff8000");
        let translucent: Color = "#00000080".parse().unwrap();
        assert_eq!(translucent.a, 128);
        assert_eq!("#fff".parse::<Color>().unwrap(), Color::WHITE);
        assert!("red".parse::<Color>().is_err());
    }

    #[test]
    fn test_param_value_untagged() {
        let map: ParamMap =
            serde_json::from_str(r##"{"scale": 2.5, "color1": "#112233"}"##).unwrap();
        assert_eq!(map["scale"].as_number(), Some(2.5));
        assert_eq!(map["color1"].as_color(), Some(Color::rgb(0x11, 0x22, 0x33)));
    }

    #[test]
    fn test_pattern_type_serde() {
        let json = serde_json::to_string(&PatternType::Curve).unwrap();
        assert_eq!(json, "\"curve\"");
        let named: PatternType = serde_json::from_str("\"seigaiha\"").unwrap();
        assert_eq!(named, PatternType::Named("seigaiha".to_string()));
    }

    #[test]
    fn test_stroke_absorb_orders_by_time() {
        let mut stroke = Stroke::new(vec![
            StrokePoint::new(0.0, 0.0).with_timestamp(0),
            StrokePoint::new(2.0, 0.0).with_timestamp(20),
        ]);
        let tail = Stroke::with_id(
            stroke.id,
            vec![StrokePoint::new(1.0, 0.0).with_timestamp(10)],
        );
        stroke.absorb(tail);
        let xs: Vec<f64> = stroke.points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_degenerate_stroke() {
        assert!(Stroke::new(vec![]).is_degenerate());
        assert!(Stroke::new(vec![StrokePoint::new(1.0, 1.0)]).is_degenerate());
        assert!(Stroke::new(vec![StrokePoint::new(1.0, 1.0), StrokePoint::new(1.0, 1.0)])
            .is_degenerate());
        assert!(!Stroke::new(vec![StrokePoint::new(1.0, 1.0), StrokePoint::new(2.0, 1.0)])
            .is_degenerate());
    }

    #[test]
    fn test_bounds_cover_every_mode() {
        let mut entity = Entity::new(EntityId::new());
        entity.reprs.vector.strokes.push(Stroke::new(vec![
            StrokePoint::new(0.0, 0.0),
            StrokePoint::new(10.0, 10.0),
        ]));
        entity.reprs.organic.seeds.push(GrowthSeed {
            position: Point::new(100.0, 100.0),
            energy: 1.0,
            direction: 0.0,
        });
        entity.refresh_bounds();

        // Seed radius is 8, stroke padding is 1.
        assert_eq!(entity.bounds, Bounds::new(-1.0, -1.0, 109.0, 109.0));
        assert!(entity.has_content(EditMode::Draw));
        assert!(!entity.has_content(EditMode::Parametric));
        assert!(!entity.has_content(EditMode::Code));
        assert!(entity.has_content(EditMode::Growth));
    }

    #[test]
    fn test_program_path_is_traced_once_and_survives_serde() {
        let parsed = ProceduralRepr::new("moveTo(0, 0)\nlineTo(30, 40)".to_string(), None);
        assert_eq!(parsed.points(), &[Point::new(0.0, 0.0), Point::new(30.0, 40.0)]);

        let result = ExecutionResult::from(vec![Point::new(5.0, 5.0), Point::new(6.0, 9.0)]);
        let executed = ProceduralRepr::new("moveTo(0, 0)".to_string(), Some(result.clone()));
        assert_eq!(executed.points(), result.points.as_slice());

        let json = serde_json::to_string(&executed).unwrap();
        assert!(!json.contains("traced"));
        let restored: ProceduralRepr = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, executed);
        assert_eq!(restored.source(), "moveTo(0, 0)");
    }

    #[test]
    fn test_empty_entity_has_default_bounds() {
        let mut entity = Entity::new(EntityId::new());
        entity.refresh_bounds();
        assert!(entity.is_empty());
        assert_eq!(entity.bounds, Bounds::default());
    }

    #[test]
    fn test_derived_stroke_id_is_stable() {
        assert_eq!(StrokeId::derived("pattern:a"), StrokeId::derived("pattern:a"));
        assert_ne!(StrokeId::derived("pattern:a"), StrokeId::derived("pattern:b"));
    }
}
