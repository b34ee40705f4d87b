//! Error types for configuration discovery, loading and resolution.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Compile failure in the transient config bundle
    #[error("failed to compile config file {file}: {message}")]
    Parse { file: PathBuf, message: String },

    // Evaluation failure inside the JavaScript engine
    #[error("failed to evaluate config file {file}: {message}")]
    Eval { file: PathBuf, message: String },

    // Config function was invoked and returned something other than an object
    #[error("config file {file} must export an object or a function returning an object")]
    NotAnObject { file: PathBuf },

    #[error(
        "\"{mode}\" cannot be used as a mode name because it conflicts with \
         the .env.{mode} file convention"
    )]
    ReservedMode { mode: String },

    // A plugin `config` or `configResolved` hook failed; aborts resolution
    #[error("plugin \"{plugin}\" failed in {hook} hook: {message}")]
    PluginHook {
        plugin: String,
        hook: &'static str,
        message: String,
    },

    #[error("invalid package.json at {file}: {message}")]
    PackageJson { file: PathBuf, message: String },
}

impl ConfigError {
    /// Attach a config-file path to an engine error message.
    pub(crate) fn eval(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ConfigError::Eval {
            file: file.into(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ConfigError::Parse {
            file: file.into(),
            message: message.into(),
        }
    }
}
