//! Built-in effect presets.

use crate::param::{ParameterDescriptor, ParameterType, ParameterValue, ValueRange};

type PresetParams = Vec<(ParameterDescriptor, ParameterValue)>;

/// Return the built-in presets as `(label, parameters)` pairs.
pub fn default_presets() -> Vec<(&'static str, PresetParams)> {
    vec![("Fire", fire()), ("Smoke", smoke()), ("Sparks", sparks())]
}

fn ranged(name: &str, ty: ParameterType, min: f64, max: f64) -> ParameterDescriptor {
    let d = ParameterDescriptor::new(name, ty);
    match ValueRange::new(min, max) {
        Some(r) => d.with_range(r),
        None => d,
    }
}

fn unit_color() -> ParameterDescriptor {
    ranged("Color", ParameterType::Color, 0.0, 1.0)
}

fn fire() -> PresetParams {
    vec![
        (
            ranged("SpawnRate", ParameterType::Float, 0.0, 1000.0),
            ParameterValue::Float(80.0),
        ),
        (
            ranged("Lifetime", ParameterType::Float, 0.05, 30.0),
            ParameterValue::Float(1.2),
        ),
        (unit_color(), ParameterValue::Color([1.0, 0.5, 0.1, 0.9])),
        (
            ranged("Size", ParameterType::Vector3, 0.01, 10.0),
            ParameterValue::Vector3([0.25, 0.25, 0.25]),
        ),
        (
            ParameterDescriptor::new("Velocity", ParameterType::Vector3),
            ParameterValue::Vector3([0.0, 3.0, 0.0]),
        ),
        (
            ranged("Capacity", ParameterType::Int, 1.0, 65536.0),
            ParameterValue::Int(512),
        ),
        (
            ParameterDescriptor::new("Looping", ParameterType::Bool),
            ParameterValue::Bool(true),
        ),
    ]
}

fn smoke() -> PresetParams {
    vec![
        (
            ranged("SpawnRate", ParameterType::Float, 0.0, 500.0),
            ParameterValue::Float(15.0),
        ),
        (
            ranged("Lifetime", ParameterType::Float, 0.05, 30.0),
            ParameterValue::Float(6.0),
        ),
        (unit_color(), ParameterValue::Color([0.35, 0.35, 0.35, 0.4])),
        (
            ranged("Size", ParameterType::Vector3, 0.01, 20.0),
            ParameterValue::Vector3([1.0, 1.0, 1.0]),
        ),
        (
            ParameterDescriptor::new("Velocity", ParameterType::Vector3),
            ParameterValue::Vector3([0.0, 0.8, 0.0]),
        ),
        (
            ranged("Capacity", ParameterType::Int, 1.0, 65536.0),
            ParameterValue::Int(256),
        ),
        (
            ParameterDescriptor::new("Looping", ParameterType::Bool),
            ParameterValue::Bool(true),
        ),
    ]
}

fn sparks() -> PresetParams {
    vec![
        (
            ranged("SpawnRate", ParameterType::Float, 0.0, 2000.0),
            ParameterValue::Float(200.0),
        ),
        (
            ranged("Lifetime", ParameterType::Float, 0.05, 10.0),
            ParameterValue::Float(0.6),
        ),
        (unit_color(), ParameterValue::Color([1.0, 0.8, 0.3, 1.0])),
        (
            ranged("Size", ParameterType::Vector3, 0.005, 2.0),
            ParameterValue::Vector3([0.03, 0.03, 0.03]),
        ),
        (
            ParameterDescriptor::new("Velocity", ParameterType::Vector3),
            ParameterValue::Vector3([0.0, 6.0, 0.0]),
        ),
        (
            ranged("Capacity", ParameterType::Int, 1.0, 65536.0),
            ParameterValue::Int(1024),
        ),
        (
            ParameterDescriptor::new("Looping", ParameterType::Bool),
            ParameterValue::Bool(false),
        ),
    ]
}
