//! Error types for the site build.
//!
//! Two policies apply across the crate:
//! - loading errors are fatal and bubble up to `run_build`
//! - enrichment errors (graphs, tables, thumbnails) are logged per record and
//!   swallowed by the caller
//!
//! `BuildError` names the failure kinds; `anyhow` adds context at the
//! orchestration layer.

use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("cache file {path:?}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("mesh {id}: {message}")]
    Mesh { id: u64, message: String },

    #[error("no neurons to render for {0}")]
    EmptySelection(String),
}

impl BuildError {
    pub fn decode(what: impl Into<String>, message: impl ToString) -> Self {
        BuildError::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Coarse category used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            BuildError::Http { .. } | BuildError::HttpStatus { .. } => "network",
            BuildError::Decode { .. } => "decode",
            BuildError::Cache { .. } | BuildError::Io { .. } => "io",
            BuildError::Template { .. } => "template",
            BuildError::Config(_) => "config",
            BuildError::Mesh { .. } | BuildError::EmptySelection(_) => "artifact",
        }
    }

    /// Whether a failure of this kind should abort the whole build.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BuildError::Mesh { .. } | BuildError::EmptySelection(_)
        )
    }
}
