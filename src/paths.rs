//! XDG-compliant path resolution for effect-tuner.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(tuner::paths::no_home),
        help("Set the HOME environment variable or pass --config explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(tuner::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// XDG directories for effect-tuner.
#[derive(Debug, Clone)]
pub struct TunerPaths {
    /// `$XDG_CONFIG_HOME/effect-tuner/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/effect-tuner/`
    pub data_dir: PathBuf,
}

impl TunerPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("effect-tuner");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("effect-tuner");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Create the base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Scene loaded when no `--scene` is given, if it exists.
    pub fn default_scene_file(&self) -> PathBuf {
        self.data_dir.join("scene.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_are_namespaced() {
        // Reads the real environment without mutating it (unsafe in edition 2024).
        let Ok(paths) = TunerPaths::resolve() else {
            return;
        };
        assert!(paths.config_dir.ends_with("effect-tuner"));
        assert!(paths.data_dir.ends_with("effect-tuner"));
        assert!(paths.config_file().starts_with(&paths.config_dir));
    }

    #[test]
    fn files_derive_from_dirs() {
        let paths = TunerPaths {
            config_dir: PathBuf::from("/cfg/effect-tuner"),
            data_dir: PathBuf::from("/data/effect-tuner"),
        };
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/cfg/effect-tuner/config.toml")
        );
        assert_eq!(
            paths.default_scene_file(),
            PathBuf::from("/data/effect-tuner/scene.toml")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = TunerPaths {
            config_dir: tmp.path().join("config"),
            data_dir: tmp.path().join("data"),
        };
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.config_dir.is_dir());
        assert!(paths.data_dir.is_dir());
    }
}
