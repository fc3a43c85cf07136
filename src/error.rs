use std::sync::mpsc::RecvError;

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KarakuriError {
    #[error("Task execution failed:\n{0}")]
    Task(#[from] TaskError),

    #[error("Error while compiling styles:\n{0}")]
    Style(#[from] StyleError),

    #[error("Error while processing markup references:\n{0}")]
    Useref(#[from] UserefError),

    #[error("Error while cleaning the output directory:\n{0}")]
    Clean(#[from] CleanError),

    #[error("Error while accessing the build cache:\n{0}")]
    Cache(#[from] CacheError),

    #[error("Error while publishing the output directory:\n{0}")]
    Deploy(#[from] DeployError),

    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error("Error while starting the dev server:\n{0}")]
    Serve(#[from] ServeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task '{0}' is not registered")]
    Unknown(String),

    #[error("Task '{0}' is registered twice")]
    Duplicate(String),

    #[error("Task dependency cycle detected through '{0}'")]
    Cycle(String),

    #[error("Task '{name}':\n{source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum StyleError {
    /// The compiler error already carries file and line context.
    #[error("Couldn't compile stylesheet.\n{0}")]
    Compile(#[from] Box<grass::Error>),

    #[error("Stylesheet entry point '{0}' not found")]
    MissingEntry(Utf8PathBuf),

    #[error("Couldn't write compiled stylesheet.\n{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum UserefError {
    #[error("'{markup}': referenced asset '{asset}' not found")]
    MissingAsset {
        markup: Utf8PathBuf,
        asset: Utf8PathBuf,
    },

    #[error("'{markup}' line {line}: build block without matching endbuild")]
    UnterminatedBlock { markup: Utf8PathBuf, line: usize },

    #[error("'{markup}' line {line}: malformed build block '{header}'")]
    BadBlock {
        markup: Utf8PathBuf,
        line: usize,
        header: String,
    },

    #[error("Couldn't read markup or assets.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

/// Image optimization errors. A decode or encode failure for a single file
/// never aborts the batch.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Couldn't access cache directory.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't read cache manifest.\n{0}")]
    ManifestRead(#[from] ciborium::de::Error<std::io::Error>),

    #[error("Couldn't write cache manifest.\n{0}")]
    ManifestWrite(#[from] ciborium::ser::Error<std::io::Error>),
}

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("Couldn't remove '{path}'.\n{source}")]
    Remove {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Output directory '{0}' is missing or empty, run a build first")]
    NothingToDeploy(Utf8PathBuf),

    #[error("No 'origin' remote configured for this repository")]
    NoRemote,

    #[error("git {op} failed:\n{stderr}")]
    Git { op: &'static str, stderr: String },

    #[error("Couldn't stage the output directory.\n{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Couldn't bind the live reload socket.\n{0}")]
    Bind(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Couldn't bind the HTTP listener.\n{0}")]
    Bind(std::io::Error),

    #[error("Failed to build runtime")]
    RuntimeBuild(#[from] tokio::io::Error),
}
