//! Error types for EmberDB.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write
/// `Result<T>`. This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in EmberDB.
///
/// By having a single error type, error handling stays consistent across
/// the storage and cache layers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from backing-file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page id is outside the allocated range of the heap file
    /// (or is the reserved header page).
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    /// The heap file header did not carry the expected magic number.
    #[error("corrupt heap file header (magic mismatch)")]
    CorruptHeader,

    /// `flush_all_pages` could not write back every dirty page.
    ///
    /// Every dirty page was attempted; `failed` is the number of pages
    /// still dirty afterwards.
    #[error("failed to flush {failed} dirty page(s)")]
    FlushIncomplete { failed: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidPageId(42);
        assert_eq!(format!("{}", err), "invalid page id: 42");

        let err = Error::FlushIncomplete { failed: 3 };
        assert_eq!(format!("{}", err), "failed to flush 3 dirty page(s)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
