// src/errors.rs

//! The error taxonomy for the catalog and its cache layer.

use thiserror::Error;

/// Errors surfaced by [`crate::catalog::CachingCatalog`] and its collaborators.
///
/// Cache-unavailable conditions are deliberately absent from this enum: they
/// never reach a caller. [`crate::cache::CacheClient`]'s safe API swallows
/// them (logged at `warn!` only on invalidation paths), turning a dead cache
/// service into a miss or a no-op rather than a propagated error.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Symbolic links limit exceeded: > {limit}")]
    LinkLoopExceeded { limit: u32 },

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("delegate error (code {code}): {source}")]
    Delegate {
        code: i32,
        #[source]
        source: anyhow::Error,
    },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Maps each variant to the POSIX-style errno value named in the error
    /// taxonomy, for callers that need numeric compatibility with the
    /// underlying inode store's convention.
    pub fn errno_like(&self) -> i32 {
        match self {
            CatalogError::NotFound(_) => libc_errno::ENOENT,
            CatalogError::PermissionDenied(_) => libc_errno::EACCES,
            CatalogError::AlreadyExists(_) => libc_errno::EEXIST,
            CatalogError::IsADirectory(_) => libc_errno::EISDIR,
            CatalogError::NotADirectory(_) => libc_errno::ENOTDIR,
            CatalogError::DirectoryNotEmpty(_) => libc_errno::ENOTEMPTY,
            CatalogError::InvalidArgument(_) => libc_errno::EINVAL,
            CatalogError::LinkLoopExceeded { .. } => libc_errno::ELOOP,
            CatalogError::NotSupported(_) => libc_errno::ENOSYS,
            CatalogError::Delegate { code, .. } => *code,
            CatalogError::Internal(_) => libc_errno::EIO,
        }
    }
}

/// A tiny local stand-in for the handful of errno constants this crate
/// needs, avoiding a dependency on the full `libc` crate for seven integers.
mod libc_errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EACCES: i32 = 13;
    pub const EEXIST: i32 = 17;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const ENOTEMPTY: i32 = 39;
    pub const ELOOP: i32 = 40;
    pub const ENOSYS: i32 = 38;
}

pub type CatalogResult<T> = Result<T, CatalogError>;
