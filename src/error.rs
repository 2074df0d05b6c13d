//! Error taxonomy for the runtime's coordination kernel.
//!
//! These are plain `thiserror` enums; conversion to a `boa_engine::JsError`
//! happens only at the engine boundary (see `engine::adapter::throw`), never
//! inside the resolver, loader, VFS or scheduler themselves.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error ({kind:?}): {path}")]
    Io { path: String, kind: std::io::ErrorKind },
}

#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("empty specifier")]
    EmptySpecifier,
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("no export match for subpath '{subpath}' in package '{package}'")]
    NoExportMatch { package: String, subpath: String },
    #[error("cannot import a directory: {0}")]
    UnsupportedDirectoryImport(String),
    #[error("invalid exports field in {package}: {reason}")]
    InvalidExports { package: String, reason: String },
}

#[derive(Debug, Error, Clone)]
pub enum LoaderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error("TypeScript transpilation is unavailable; cannot load {0}")]
    TranspilerUnavailable(String),
    #[error("failed to evaluate module {path}: {message}")]
    Evaluation { path: String, message: String },
    #[error("malformed JSON module {path}: {message}")]
    InvalidJson { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("truncated or corrupt bundle footer")]
    BadFooter,
    #[error("unsupported bundle version {0}")]
    UnsupportedVersion(u32),
    #[error("bundle index is corrupt: {0}")]
    CorruptIndex(String),
    #[error("path '{0}' escapes the bundle root")]
    PathEscapesRoot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by `runtime::Runtime`, one level up from the engine
/// boundary: fatal engine construction failures (spec §7, exit code 1),
/// entry script load failures, and screenshot I/O.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to construct the script engine: {0}")]
    EngineInit(String),
    #[error("failed to load entry script '{path}': {message}")]
    ScriptLoad { path: String, message: String },
    #[error("failed to write screenshot to {path}: {source}")]
    Screenshot { path: String, source: std::io::Error },
    #[error("failed to start the file-watch reactor: {0}")]
    ReactorInit(#[from] std::io::Error),
}
