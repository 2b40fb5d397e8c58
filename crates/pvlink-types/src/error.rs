//! Unified error interface for PVLink.
//!
//! This module provides the [`ErrorCode`] trait for standardized
//! error handling across all PVLink crates.
//!
//! # Design
//!
//! All PVLink error types should implement [`ErrorCode`] to provide:
//!
//! - **Machine-readable codes**: For programmatic error handling
//! - **Recoverability info**: For retry logic and diagnostics
//!
//! # Example
//!
//! ```
//! use pvlink_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     NotFound(String),
//!     Timeout,
//! }
//!
//! impl ErrorCode for MyError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::NotFound(_) => "NOT_FOUND",
//!             Self::Timeout => "TIMEOUT",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Timeout)
//!     }
//! }
//!
//! let err = MyError::Timeout;
//! assert_eq!(err.code(), "TIMEOUT");
//! assert!(err.is_recoverable());
//! ```

/// Unified error code interface for PVLink errors.
///
/// # Code Format
///
/// Error codes should be:
///
/// - **UPPER_SNAKE_CASE**: e.g., `"TIMEOUT"`, `"UNKNOWN_SCOPE"`
/// - **Namespace-prefixed**: e.g., `"WIRE_REJECTED"`, `"SETUP_INVALID_TYPE"`
/// - **Stable**: Codes should not change once defined (API contract)
///
/// # Recoverability
///
/// An error is recoverable if retrying the operation may succeed or a
/// transient condition (connectivity, timeout) caused it. Misconfiguration
/// and caller-side bugs are not recoverable: retrying cannot fix them.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    ///
    /// # Format
    ///
    /// - UPPER_SNAKE_CASE
    /// - Prefixed with domain (e.g., `"WIRE_"`, `"SETUP_"`, `"REGISTRY_"`)
    /// - Stable across versions (breaking change if modified)
    fn code(&self) -> &'static str;

    /// Returns whether the error is recoverable.
    ///
    /// # Returns
    ///
    /// - `true`: Retry may succeed (transient condition)
    /// - `false`: Retry will not help, requires code/config change
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows PVLink conventions.
///
/// # Checks
///
/// 1. Code is UPPER_SNAKE_CASE
/// 2. Code starts with expected prefix
/// 3. Code is not empty
///
/// # Panics
///
/// Panics with descriptive message if validation fails.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    // Check not empty
    assert!(!code.is_empty(), "Error code must not be empty");

    // Check prefix
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );

    // Check UPPER_SNAKE_CASE
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates multiple error codes at once.
///
/// Use this to verify all variants of an error enum.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    // Must not start or end with underscore
    if s.starts_with('_') || s.ends_with('_') {
        return false;
    }

    // Must not have consecutive underscores
    if s.contains("__") {
        return false;
    }

    // All chars must be uppercase letters, digits, or underscore
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl ErrorCode for TestError {
        fn code(&self) -> &'static str {
            match self {
                Self::Transient => "TEST_TRANSIENT",
                Self::Permanent => "TEST_PERMANENT",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    #[test]
    fn error_code_trait() {
        let transient = TestError::Transient;
        assert_eq!(transient.code(), "TEST_TRANSIENT");
        assert!(transient.is_recoverable());

        let permanent = TestError::Permanent;
        assert_eq!(permanent.code(), "TEST_PERMANENT");
        assert!(!permanent.is_recoverable());
    }

    #[test]
    fn assert_error_codes_all_variants() {
        assert_error_codes(&[TestError::Transient, TestError::Permanent], "TEST_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn assert_error_code_wrong_prefix() {
        let err = TestError::Transient;
        assert_error_code(&err, "WRONG_");
    }

    #[test]
    fn is_upper_snake_case_valid() {
        assert!(is_upper_snake_case("TIMEOUT"));
        assert!(is_upper_snake_case("WIRE_REJECTED"));
        assert!(is_upper_snake_case("SETUP_2_PHASE"));
    }

    #[test]
    fn is_upper_snake_case_invalid() {
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("timeout"));
        assert!(!is_upper_snake_case("Wire_Rejected"));
        assert!(!is_upper_snake_case("_WIRE"));
        assert!(!is_upper_snake_case("WIRE_"));
        assert!(!is_upper_snake_case("WIRE__REJECTED"));
    }
}
