//! Small helpers shared across modules.

pub(crate) mod dump;
pub(crate) mod size;
