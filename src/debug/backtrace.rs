//! Backtraces for violation reports.

/// Capture the current backtrace as text, when the `backtrace` feature is
/// enabled.
#[cfg(feature = "backtrace")]
pub fn capture() -> Option<String> {
    Some(format!("{:?}", ::backtrace::Backtrace::new()))
}

/// Capture the current backtrace as text, when the `backtrace` feature is
/// enabled.
#[cfg(not(feature = "backtrace"))]
pub fn capture() -> Option<String> {
    None
}
