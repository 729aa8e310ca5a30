//! Constants for the download module.

/// Upper bound on the initial body buffer reserved from `Content-Length`.
pub(crate) const MAX_PREALLOCATED_BODY: usize = 1 << 20;
