//! Command/mode environment threaded through the resolution pipeline.
//!
//! Mode and command travel as explicit values rather than process-wide
//! globals; every function that needs them receives them as data.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The command the tool was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// `vite build`
    Build,
    /// `vite` / `vite serve` (dev server)
    Serve,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Build => "build",
            Command::Serve => "serve",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment passed to plugin `config` hooks and config-file functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEnv {
    pub command: Command,
    pub mode: String,
}

impl ConfigEnv {
    pub fn new(command: Command, mode: impl Into<String>) -> Self {
        Self {
            command,
            mode: mode.into(),
        }
    }
}

/// External collaborator providing the environment mapping for a mode.
///
/// The engine never parses `.env` files itself; it consumes whatever mapping
/// the provider hands back.
pub trait EnvSource {
    fn load(&self, mode: &str, root: &Path) -> BTreeMap<String, String>;
}

/// Env source yielding a fixed mapping. Useful as a default and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv(pub BTreeMap<String, String>);

impl EnvSource for StaticEnv {
    fn load(&self, _mode: &str, _root: &Path) -> BTreeMap<String, String> {
        self.0.clone()
    }
}
