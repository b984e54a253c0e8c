//! Stamping guards onto a freshly allocated region.

use crate::allocators::arena::{Arena, HeapPtr};
use crate::error::PoisonError;

use super::codec::GuardCodec;

/// Poison the padded region at `raw` and return the pointer the caller sees.
///
/// A missing region (failed allocation) or a zero `padded` size passes
/// `raw` through untouched.
pub fn stamp(
    codec: &GuardCodec,
    arena: &mut Arena,
    raw: Option<HeapPtr>,
    padded: usize,
) -> Result<Option<HeapPtr>, PoisonError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if padded == 0 {
        return Ok(Some(raw));
    }
    if !arena.contains(raw, padded) {
        return Err(PoisonError::OutOfArena { addr: raw, len: padded });
    }

    let sentinel = codec.sentinel();
    arena
        .bytes_mut(raw.add(codec.header_size()), codec.guard_before())?
        .fill(sentinel);
    arena
        .bytes_mut(raw.add(padded - codec.guard_after()), codec.guard_after())?
        .fill(sentinel);
    codec.write_header(arena, raw, padded)?;

    Ok(Some(raw.add(codec.user_offset())))
}
