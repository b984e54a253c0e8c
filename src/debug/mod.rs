//! Debug helpers for violation reports.

pub(crate) mod backtrace;
