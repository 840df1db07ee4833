//! Error types for gridrt

use crate::runtime::{ContextId, MemoryLocation};
use thiserror::Error;

/// Result type alias using gridrt's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`]
///
/// Configuration and resource errors are reported synchronously by the call
/// that triggered them. Execution errors surface at the next
/// `synchronize()` on the context that ran the failing operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid launch dimensions, layout overflow, size mismatch, ...
    Configuration,
    /// Allocation failure
    Resource,
    /// Failure of an operation on the device timeline
    Execution,
}

/// Errors that can occur in gridrt operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Grid or block dimensions are not usable for a launch
    #[error("Invalid launch configuration: {reason}")]
    InvalidLaunchConfiguration {
        /// Why the configuration was rejected
        reason: String,
    },

    /// A tensor layout addresses more elements than its buffer holds
    #[error("Layout {shape:?} needs {required} elements but the buffer holds {available}")]
    LayoutOverflow {
        /// Shape of the rejected layout
        shape: Vec<usize>,
        /// Product of the shape, `usize::MAX` if it overflows
        required: usize,
        /// Element count of the buffer
        available: usize,
    },

    /// Element counts of a copy (or host write) do not match
    #[error("Size mismatch: destination holds {dst} elements, source holds {src}")]
    SizeMismatch {
        /// Destination element count
        dst: usize,
        /// Source element count
        src: usize,
    },

    /// Two device buffers (or a buffer and a context) belong to different contexts
    #[error("Cross-context operation: {lhs} and {rhs} are different device contexts")]
    CrossContext {
        /// Context issuing the operation (or owning the destination)
        lhs: ContextId,
        /// Context owning the other operand
        rhs: ContextId,
    },

    /// Device allocation could not be satisfied
    #[error("Out of device memory: requested {requested} bytes, {available} bytes available")]
    OutOfDeviceMemory {
        /// Requested size in bytes
        requested: usize,
        /// Remaining capacity in bytes
        available: usize,
    },

    /// Host access to a buffer that does not live in host memory
    #[error("Buffer is {location}-resident and cannot be accessed from the host")]
    NotHostAccessible {
        /// Where the buffer lives
        location: MemoryLocation,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A kernel thread panicked while the launch was running
    #[error("Kernel '{kernel}' faulted: {message}")]
    KernelFault {
        /// Name of the faulting kernel
        kernel: String,
        /// Panic payload of the first faulting thread
        message: String,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid launch configuration error
    pub fn invalid_launch(reason: impl Into<String>) -> Self {
        Self::InvalidLaunchConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a layout overflow error
    pub fn layout_overflow(shape: &[usize], available: usize) -> Self {
        Self::LayoutOverflow {
            shape: shape.to_vec(),
            required: crate::tensor::checked_elem_count(shape).unwrap_or(usize::MAX),
            available,
        }
    }

    /// Create a size mismatch error
    pub fn size_mismatch(dst: usize, src: usize) -> Self {
        Self::SizeMismatch { dst, src }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLaunchConfiguration { .. }
            | Self::LayoutOverflow { .. }
            | Self::SizeMismatch { .. }
            | Self::CrossContext { .. }
            | Self::NotHostAccessible { .. }
            | Self::InvalidArgument { .. } => ErrorKind::Configuration,
            Self::OutOfDeviceMemory { .. } => ErrorKind::Resource,
            Self::KernelFault { .. } | Self::Internal(_) => ErrorKind::Execution,
        }
    }
}
