// Load-time configuration: where the provider module lives on disk.
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Directory holding the provider module and its bundled dependencies.
    pub lib_dir: PathBuf,
    /// Module name; platform prefix/extension are derived at load.
    pub lib_name: String,
    /// Optional directory for the module's server-list and user-info files.
    #[serde(default)]
    pub server_list_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(lib_dir: impl Into<PathBuf>, lib_name: impl Into<String>) -> Self {
        Self {
            lib_dir: lib_dir.into(),
            lib_name: lib_name.into(),
            server_list_dir: None,
        }
    }

    pub fn with_server_list_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.server_list_dir = Some(dir.into());
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read config {}", path.display()))
                .with_source(err)
        })?;
        serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to parse config {}", path.display()))
                .with_source(err)
        })
    }
}
