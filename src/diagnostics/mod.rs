//! The diagnostic side channel.
//!
//! Poisoning failures and API misuse are reported here as human-readable
//! lines with an address and a dump of the bytes found. Only the triggering
//! conditions are stable; the text is not.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                          |
//! |-------|----------------------------------|
//! | GH0xx | Guard damage                     |
//! | GH1xx | Misuse of a pointer or a block   |
//! | GH2xx | Heap lifecycle                   |
//! | GH3xx | Size overflow                    |

pub mod emit;
pub mod kind;

pub use emit::{CollectingSink, DiagnosticSink, LogSink};
pub use kind::{Diagnostic, DiagnosticCode, DiagnosticKind};
pub use kind::{GH001, GH002, GH101, GH102, GH103, GH104, GH201, GH301};
