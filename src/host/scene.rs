//! Scene files: TOML descriptions of effect instances to load into a
//! [`MemoryHost`].
//!
//! ```toml
//! [[effect]]
//! label = "Campfire"
//!
//! [[effect.param]]
//! name = "SpawnRate"
//! type = "Float"
//! value = 80.0
//! min = 0.0
//! max = 1000.0
//!
//! [[effect.param]]
//! name = "Color"
//! type = "Color"
//! value = [1.0, 0.5, 0.1, 1.0]
//! ```

use std::path::Path;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use super::MemoryHost;
use crate::error::StoreError;
use crate::param::{ParameterDescriptor, ParameterType, ParameterValue, ValueRange};
use crate::store::check_write;

/// Errors from loading a scene file.
#[derive(Debug, Error, Diagnostic)]
pub enum SceneError {
    #[error("failed to read scene file: {path}")]
    #[diagnostic(
        code(tuner::scene::read),
        help("Ensure the scene file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scene file: {message}")]
    #[diagnostic(
        code(tuner::scene::parse),
        help("Check the TOML syntax: effects are `[[effect]]` tables with `[[effect.param]]` entries.")
    )]
    Parse { message: String },

    #[error("invalid parameter \"{param}\" on effect \"{effect}\": {message}")]
    #[diagnostic(
        code(tuner::scene::invalid_param),
        help(
            "Scalar types take a single value, Vector3 takes 3 numbers, \
             Color takes 3 or 4 numbers. `min`/`max` must be given together with min <= max, \
             and the value must lie inside them."
        )
    )]
    InvalidParam {
        effect: String,
        param: String,
        message: String,
    },

    #[error("duplicate parameter \"{param}\" on effect \"{effect}\"")]
    #[diagnostic(
        code(tuner::scene::duplicate_param),
        help("Parameter names must be unique within one effect.")
    )]
    DuplicateParam { effect: String, param: String },

    #[error("effect \"{effect}\" rejected by host: {source}")]
    #[diagnostic(code(tuner::scene::rejected))]
    Rejected {
        effect: String,
        #[source]
        source: StoreError,
    },
}

pub type SceneResult<T> = std::result::Result<T, SceneError>;

#[derive(Debug, Deserialize)]
struct SceneFile {
    #[serde(default)]
    effect: Vec<EffectSpec>,
}

#[derive(Debug, Deserialize)]
struct EffectSpec {
    label: String,
    #[serde(default)]
    param: Vec<ParamSpec>,
}

#[derive(Debug, Deserialize)]
struct ParamSpec {
    name: String,
    #[serde(rename = "type")]
    ty: ParameterType,
    value: RawValue,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<f64>),
}

impl ParamSpec {
    fn resolve(&self) -> Result<(ParameterDescriptor, ParameterValue), String> {
        let value = match (self.ty, &self.value) {
            (ParameterType::Float, RawValue::Float(v)) => ParameterValue::Float(*v as f32),
            (ParameterType::Float, RawValue::Int(v)) => ParameterValue::Float(*v as f32),
            (ParameterType::Int, RawValue::Int(v)) => ParameterValue::Int(*v),
            (ParameterType::Bool, RawValue::Bool(v)) => ParameterValue::Bool(*v),
            (ParameterType::Vector3, RawValue::List(v)) => match v.as_slice() {
                [x, y, z] => ParameterValue::Vector3([*x as f32, *y as f32, *z as f32]),
                _ => return Err(format!("Vector3 needs 3 components, got {}", v.len())),
            },
            (ParameterType::Color, RawValue::List(v)) => match v.as_slice() {
                [r, g, b] => ParameterValue::Color([*r as f32, *g as f32, *b as f32, 1.0]),
                [r, g, b, a] => {
                    ParameterValue::Color([*r as f32, *g as f32, *b as f32, *a as f32])
                }
                _ => return Err(format!("Color needs 3 or 4 components, got {}", v.len())),
            },
            (ty, _) => return Err(format!("value does not match type {ty}")),
        };

        let mut descriptor = ParameterDescriptor::new(self.name.clone(), self.ty);
        match (self.min, self.max) {
            (None, None) => {}
            (Some(min), Some(max)) => {
                let range = ValueRange::new(min, max)
                    .ok_or_else(|| format!("invalid range [{min}, {max}]"))?;
                descriptor = descriptor.with_range(range);
            }
            _ => return Err("min and max must be given together".into()),
        }
        check_write(&descriptor, &value).map_err(|e| e.to_string())?;
        Ok((descriptor, value))
    }
}

/// Parse a scene from TOML text and spawn its effects into `host`.
///
/// Returns the number of effects spawned. The file is fully validated before
/// anything is spawned.
pub fn load_str(host: &MemoryHost, content: &str) -> SceneResult<usize> {
    let scene: SceneFile = toml::from_str(content).map_err(|e| SceneError::Parse {
        message: e.to_string(),
    })?;

    let mut resolved = Vec::with_capacity(scene.effect.len());
    for effect in &scene.effect {
        let mut params: Vec<(ParameterDescriptor, ParameterValue)> = Vec::new();
        for spec in &effect.param {
            if params.iter().any(|(d, _)| d.name == spec.name) {
                return Err(SceneError::DuplicateParam {
                    effect: effect.label.clone(),
                    param: spec.name.clone(),
                });
            }
            let param = spec.resolve().map_err(|message| SceneError::InvalidParam {
                effect: effect.label.clone(),
                param: spec.name.clone(),
                message,
            })?;
            params.push(param);
        }
        resolved.push((effect.label.clone(), params));
    }

    let count = resolved.len();
    for (label, params) in resolved {
        host.spawn(label.clone(), params)
            .map_err(|source| SceneError::Rejected {
                effect: label,
                source,
            })?;
    }
    Ok(count)
}

/// Load a scene file from disk into `host`.
pub fn load(host: &MemoryHost, path: &Path) -> SceneResult<usize> {
    let content = std::fs::read_to_string(path).map_err(|e| SceneError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let count = load_str(host, &content)?;
    tracing::info!(path = %path.display(), effects = count, "loaded scene");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ParameterStore;

    const CAMPFIRE: &str = r#"
[[effect]]
label = "Campfire"

[[effect.param]]
name = "SpawnRate"
type = "Float"
value = 80
min = 0.0
max = 1000.0

[[effect.param]]
name = "Color"
type = "Color"
value = [1.0, 0.5, 0.1]

[[effect.param]]
name = "Looping"
type = "Bool"
value = true

[[effect]]
label = "Embers"

[[effect.param]]
name = "Capacity"
type = "Int"
value = 64
"#;

    #[test]
    fn loads_effects_in_file_order() {
        let host = MemoryHost::new();
        assert_eq!(load_str(&host, CAMPFIRE).unwrap(), 2);

        let handles = host.effects();
        assert_eq!(host.label(handles[0]).as_deref(), Some("Campfire"));
        assert_eq!(host.label(handles[1]).as_deref(), Some("Embers"));

        let color = host.get(handles[0], "Color", ParameterType::Color).unwrap();
        assert_eq!(color, ParameterValue::Color([1.0, 0.5, 0.1, 1.0]));

        let descriptors = host.list(handles[0]).unwrap();
        let rate = descriptors.iter().find(|d| d.name == "SpawnRate").unwrap();
        assert_eq!(rate.range, ValueRange::new(0.0, 1000.0));
    }

    #[test]
    fn rejects_wrong_component_count() {
        let host = MemoryHost::new();
        let bad = r#"
[[effect]]
label = "X"
[[effect.param]]
name = "Size"
type = "Vector3"
value = [1.0, 2.0]
"#;
        assert!(matches!(
            load_str(&host, bad),
            Err(SceneError::InvalidParam { .. })
        ));
        assert!(host.is_empty());
    }

    #[test]
    fn rejects_duplicate_names() {
        let host = MemoryHost::new();
        let bad = r#"
[[effect]]
label = "X"
[[effect.param]]
name = "A"
type = "Bool"
value = true
[[effect.param]]
name = "A"
type = "Bool"
value = false
"#;
        assert!(matches!(
            load_str(&host, bad),
            Err(SceneError::DuplicateParam { .. })
        ));
    }

    #[test]
    fn rejects_initial_value_outside_range() {
        let host = MemoryHost::new();
        let bad = r#"
[[effect]]
label = "X"
[[effect.param]]
name = "Rate"
type = "Float"
value = 5.0
min = 0.0
max = 1.0
"#;
        assert!(matches!(
            load_str(&host, bad),
            Err(SceneError::InvalidParam { .. })
        ));
    }

    #[test]
    fn invalid_later_effect_spawns_nothing() {
        let host = MemoryHost::new();
        let bad = r#"
[[effect]]
label = "Good"
[[effect.param]]
name = "Rate"
type = "Float"
value = 0.5
min = 0.0
max = 1.0

[[effect]]
label = "Bad"
[[effect.param]]
name = "Rate"
type = "Float"
value = 5.0
min = 0.0
max = 1.0
"#;
        let err = load_str(&host, bad).unwrap_err();
        assert!(matches!(
            err,
            SceneError::InvalidParam { ref effect, .. } if effect == "Bad"
        ));
        assert!(host.is_empty());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scene.toml");
        std::fs::write(&path, CAMPFIRE).unwrap();

        let host = MemoryHost::new();
        assert_eq!(load(&host, &path).unwrap(), 2);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load(&host, &missing),
            Err(SceneError::Read { .. })
        ));
    }
}
