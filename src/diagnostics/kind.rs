//! Diagnostic kinds and core types.

use std::fmt;

use crate::allocators::arena::HeapPtr;

/// Diagnostic code wrapper for type-safe code references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode(&'static str);

impl DiagnosticCode {
    /// Create a new diagnostic code.
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    /// Get the code string.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Memory corruption or a broken heap invariant.
    Error,
    /// API misuse or a refused request.
    Warning,
    /// Informational.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// One report sent down the diagnostic side channel.
///
/// Codes follow the pattern:
/// - `GH0xx` - guard damage (memory corruption)
/// - `GH1xx` - misuse of the API or of a block
/// - `GH2xx` - heap lifecycle
/// - `GH3xx` - size arithmetic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code.
    pub code: DiagnosticCode,
    /// Primary message.
    pub message: String,
    /// Address the report is about, if any.
    pub address: Option<HeapPtr>,
    /// Hex dump of the bytes actually found.
    pub dump: Option<String>,
    /// Extra context (a backtrace, for instance).
    pub note: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, code, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, code, message)
    }

    /// Create a new note diagnostic.
    pub fn note(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Note, code, message)
    }

    fn new(kind: DiagnosticKind, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            address: None,
            dump: None,
            note: None,
        }
    }

    /// Attach the address this diagnostic is about.
    pub fn at(mut self, address: HeapPtr) -> Self {
        self.address = Some(address);
        self
    }

    /// Attach a hex dump.
    pub fn with_dump(mut self, dump: String) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Attach a note.
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[guardheap][{}] {}: {}", self.code, self.kind.prefix(), self.message)?;
        if let Some(address) = self.address {
            write!(f, " at: {address}")?;
        }
        if let Some(dump) = &self.dump {
            write!(f, ", actual data:{dump}")?;
        }
        if let Some(note) = &self.note {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Predefined codes
// =============================================================================

/// GH001: The guard before a payload (or the length header) is damaged.
pub const GH001: DiagnosticCode = DiagnosticCode::new("GH001");

/// GH002: The guard after a payload is damaged.
pub const GH002: DiagnosticCode = DiagnosticCode::new("GH002");

/// GH101: A poison check was requested for a free block.
pub const GH101: DiagnosticCode = DiagnosticCode::new("GH101");

/// GH102: A pointer lies outside the arena.
pub const GH102: DiagnosticCode = DiagnosticCode::new("GH102");

/// GH103: An unpoisoned pointer does not start a block payload.
pub const GH103: DiagnosticCode = DiagnosticCode::new("GH103");

/// GH104: The block chain does not advance.
pub const GH104: DiagnosticCode = DiagnosticCode::new("GH104");

/// GH201: The heap is used before initialization.
pub const GH201: DiagnosticCode = DiagnosticCode::new("GH201");

/// GH301: A requested size overflows the padded size or header width.
pub const GH301: DiagnosticCode = DiagnosticCode::new("GH301");
