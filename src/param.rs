//! Typed parameter values for effect instances.
//!
//! A parameter is a named slot on an effect instance holding one of a closed
//! set of value kinds ([`ParameterType`]). [`ParameterValue`] is the matching
//! tagged union. Clamping and equality are type-specific: vectors and colors
//! are clamped channel by channel.

use serde::{Deserialize, Serialize};

/// The closed set of parameter kinds an effect instance can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    Float,
    Int,
    Bool,
    Vector3,
    /// Linear RGBA color.
    Color,
}

impl ParameterType {
    /// All variants in declaration order.
    pub const ALL: [ParameterType; 5] = [
        ParameterType::Float,
        ParameterType::Int,
        ParameterType::Bool,
        ParameterType::Vector3,
        ParameterType::Color,
    ];

    /// Canonical tag used in listings and in the response grammar.
    pub fn tag(self) -> &'static str {
        match self {
            ParameterType::Float => "Float",
            ParameterType::Int => "Int",
            ParameterType::Bool => "Bool",
            ParameterType::Vector3 => "Vector3",
            ParameterType::Color => "Color",
        }
    }

    /// Parse a type tag, case-insensitively, accepting a few common aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "float" => Some(ParameterType::Float),
            "int" | "integer" => Some(ParameterType::Int),
            "bool" | "boolean" => Some(ParameterType::Bool),
            "vector3" | "vector" | "vec3" => Some(ParameterType::Vector3),
            "color" | "linearcolor" => Some(ParameterType::Color),
            _ => None,
        }
    }

    /// Whether a value declared as `self` may be written to a slot of type `target`.
    ///
    /// The only implicit conversion is Int → Float.
    pub fn is_assignable_to(self, target: ParameterType) -> bool {
        self == target || (self == ParameterType::Int && target == ParameterType::Float)
    }

    /// Whether values of this type have numeric channels that a range applies to.
    pub fn is_ranged(self) -> bool {
        !matches!(self, ParameterType::Bool)
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Inclusive bounds applied to every scalar channel of a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Create a range. Returns `None` if the bounds are not finite or `min > max`.
    pub fn new(min: f64, max: f64) -> Option<Self> {
        (min.is_finite() && max.is_finite() && min <= max).then_some(Self { min, max })
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    /// Float channels are stored as `f32`, so they are compared and clamped
    /// against the bounds rounded to `f32`.
    fn contains_f32(&self, v: f32) -> bool {
        v >= self.min as f32 && v <= self.max as f32
    }

    fn clamp_f32(&self, v: f32) -> f32 {
        v.clamp(self.min as f32, self.max as f32)
    }

    fn clamp_i64(&self, v: i64) -> i64 {
        let lo = self.min.ceil();
        let hi = self.max.floor();
        if lo > hi {
            // No integer lies inside the range; settle on the nearest bound.
            return (v as f64).clamp(self.min, self.max).round() as i64;
        }
        (v as f64).clamp(lo, hi) as i64
    }
}

impl std::fmt::Display for ValueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Vector3([f32; 3]),
    Color([f32; 4]),
}

impl ParameterValue {
    /// The type tag of this value.
    pub fn ty(&self) -> ParameterType {
        match self {
            ParameterValue::Float(_) => ParameterType::Float,
            ParameterValue::Int(_) => ParameterType::Int,
            ParameterValue::Bool(_) => ParameterType::Bool,
            ParameterValue::Vector3(_) => ParameterType::Vector3,
            ParameterValue::Color(_) => ParameterType::Color,
        }
    }

    /// Convert to `target`, applying the Int → Float widening.
    ///
    /// Returns `None` for any other type change.
    pub fn coerce_to(self, target: ParameterType) -> Option<Self> {
        match (self, target) {
            (v, t) if v.ty() == t => Some(v),
            (ParameterValue::Int(i), ParameterType::Float) => Some(ParameterValue::Float(i as f32)),
            _ => None,
        }
    }

    /// Clamp every scalar channel into `range`. Booleans pass through unchanged.
    pub fn clamped(self, range: &ValueRange) -> Self {
        match self {
            ParameterValue::Float(v) => ParameterValue::Float(range.clamp_f32(v)),
            ParameterValue::Int(v) => ParameterValue::Int(range.clamp_i64(v)),
            ParameterValue::Bool(b) => ParameterValue::Bool(b),
            ParameterValue::Vector3(v) => ParameterValue::Vector3(v.map(|c| range.clamp_f32(c))),
            ParameterValue::Color(v) => ParameterValue::Color(v.map(|c| range.clamp_f32(c))),
        }
    }

    /// Whether every scalar channel lies inside `range`.
    pub fn within(&self, range: &ValueRange) -> bool {
        match self {
            ParameterValue::Float(v) => range.contains_f32(*v),
            ParameterValue::Int(v) => range.contains(*v as f64),
            ParameterValue::Bool(_) => true,
            ParameterValue::Vector3(v) => v.iter().all(|c| range.contains_f32(*c)),
            ParameterValue::Color(v) => v.iter().all(|c| range.contains_f32(*c)),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    /// Formats values in the same shape the response grammar accepts.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Bool(v) => write!(f, "{v}"),
            ParameterValue::Vector3([x, y, z]) => write!(f, "{x} {y} {z}"),
            ParameterValue::Color([r, g, b, a]) => write!(f, "{r} {g} {b} {a}"),
        }
    }
}

/// Static description of one parameter on an effect instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Case-sensitive, unique per instance.
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: ParameterType) -> Self {
        Self {
            name: name.into(),
            ty,
            range: None,
        }
    }

    /// Attach a range. Ignored for booleans.
    pub fn with_range(mut self, range: ValueRange) -> Self {
        if self.ty.is_ranged() {
            self.range = Some(range);
        }
        self
    }
}
