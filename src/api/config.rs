//! Poisoning configuration.

use crate::poison::codec::HeaderWidth;

/// What `resize` and `release` do after finding damaged guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Report and carry on with the operation.
    #[default]
    Observe,
    /// Report and return [`PoisonError::Corrupted`](crate::PoisonError::Corrupted)
    /// without handing the region to the raw heap.
    Refuse,
    /// Report, then panic.
    Panic,
}

impl ViolationPolicy {
    /// Read the policy from the `GUARDHEAP_POLICY` environment variable:
    /// - "observe" or "0" -> Observe
    /// - "refuse" or "1" -> Refuse
    /// - "panic" or "2" -> Panic
    ///
    /// Anything else, or an unset variable, yields `None`.
    pub fn from_env() -> Option<Self> {
        let val = std::env::var("GUARDHEAP_POLICY").ok()?;
        Self::parse(&val)
    }

    fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "observe" | "0" => Some(Self::Observe),
            "refuse" | "1" => Some(Self::Refuse),
            "panic" | "2" => Some(Self::Panic),
            _ => None,
        }
    }
}

/// Configuration for the poisoned heap.
#[derive(Debug, Clone)]
pub struct PoisonConfig {
    /// Guard bytes between the length header and the payload (default: 4)
    pub guard_before: usize,

    /// Guard bytes after the payload (default: 4)
    pub guard_after: usize,

    /// Width of the length header (default: 16 bits)
    pub header: HeaderWidth,

    /// Byte every guard is filled with (default: 0xA5)
    pub sentinel: u8,

    /// Reaction to damaged guards during resize and release
    pub policy: ViolationPolicy,
}

impl Default for PoisonConfig {
    fn default() -> Self {
        Self {
            guard_before: 4,
            guard_after: 4,
            header: HeaderWidth::U16,
            sentinel: 0xA5,
            policy: ViolationPolicy::Observe,
        }
    }
}

impl PoisonConfig {
    /// Smallest useful guards, for very small arenas.
    pub fn minimal() -> Self {
        Self {
            guard_before: 1,
            guard_after: 1,
            ..Self::default()
        }
    }

    /// Wide guards and a refusing policy.
    pub fn paranoid() -> Self {
        Self {
            guard_before: 16,
            guard_after: 16,
            header: HeaderWidth::U32,
            sentinel: 0xA5,
            policy: ViolationPolicy::Refuse,
        }
    }

    /// Builder pattern: set both guard lengths.
    pub fn with_guards(mut self, before: usize, after: usize) -> Self {
        self.guard_before = before;
        self.guard_after = after;
        self
    }

    /// Builder pattern: set the header width.
    pub fn with_header(mut self, header: HeaderWidth) -> Self {
        self.header = header;
        self
    }

    /// Builder pattern: set the sentinel byte.
    pub fn with_sentinel(mut self, sentinel: u8) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// Builder pattern: set the violation policy.
    pub fn with_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder pattern: take the policy from `GUARDHEAP_POLICY` if set.
    pub fn with_policy_from_env(self) -> Self {
        match ViolationPolicy::from_env() {
            Some(policy) => self.with_policy(policy),
            None => self,
        }
    }
}
