//! Parameter file loading
//!
//! Parameter files are TOML documents deserialised straight into the parameter structs of each
//! module. They live in the `params` directory under the software root.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Name of the parameters directory within the software root.
pub const PARAMS_DIR: &str = "params";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable ({}) is not set", crate::host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot read {path:?}: {source}")]
    FileLoadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse {path:?}: {source}")]
    DeserialiseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The directory holding the parameter files.
pub fn params_dir() -> Result<PathBuf, LoadError> {
    crate::host::get_sw_root()
        .map(|root| root.join(PARAMS_DIR))
        .map_err(|_| LoadError::SwRootNotSet)
}

/// Load a parameter file from the parameters directory.
pub fn load<P>(file_name: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    load_from(params_dir()?.join(file_name))
}

/// Load a parameter (or any other TOML) file from an explicit path.
pub fn load_from<P, F>(file_path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>,
{
    let path = file_path.as_ref();

    let contents = fs::read_to_string(path).map_err(|source| LoadError::FileLoadError {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&contents).map_err(|source| LoadError::DeserialiseError {
        path: path.to_path_buf(),
        source,
    })
}
