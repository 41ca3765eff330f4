//! Moving byte cursor and fixed-width bitfield overlay framework.
//!
//! Grounded on the teacher's [`SliceReader`](../../examples/CirrusNeptune-mpegts-io/src/slice_reader.rs)
//! and its `read_bitfield!` macro: a cursor that tracks its absolute
//! position for informative errors, plus a thin `parse_elements` helper
//! that advances the cursor by the exact size of each overlay type in
//! turn. Each overlay's `from_bytes` closure decodes explicit
//! little-endian reads and mask/shift, not any host language's
//! (implementation-defined) native bitfield layout -- see [`crate::header`]
//! for the canonical example.

use crate::error::{Ch10Error, HeaderErrorKind, Result};

/// A bounds-checked, position-tracking read cursor over an immutable byte
/// range.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    base: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ByteCursor<'a> {
    /// Build a cursor over the entirety of `base`.
    pub fn new(base: &'a [u8]) -> Self {
        let end = base.len();
        Self { base, pos: 0, end }
    }

    /// Absolute byte offset of the cursor within `base`.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Number of bytes remaining before `end`.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// True once the cursor has reached (or passed) `end`.
    pub fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Advance the cursor by `len` bytes without reading them.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read(len).map(|_| ())
    }

    /// Reposition the cursor to an absolute offset within `base`.
    ///
    /// Used by the header dispatcher to resync: on a checksum or sync
    /// failure it rewinds to `header_start + 1` and resumes scanning.
    pub fn seek(&mut self, pos: u64) {
        self.pos = (pos as usize).min(self.end);
    }

    /// Extract a `len`-byte sub-slice at the cursor and advance past it.
    pub fn read(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Ch10Error::HeaderError(HeaderErrorKind::BodyLengthMismatch {
                location: self.position(),
                expected: len as u32,
                actual: self.remaining() as u32,
            }));
        }
        let slice = &self.base[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Same as [`ByteCursor::read`] but without advancing the cursor.
    pub fn peek(&self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Ch10Error::HeaderError(HeaderErrorKind::BodyLengthMismatch {
                location: self.position(),
                expected: len as u32,
                actual: self.remaining() as u32,
            }));
        }
        Ok(&self.base[self.pos..self.pos + len])
    }

    /// Read exactly `N` bytes as a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read two bytes, little-endian.
    pub fn read_le_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    /// Read four bytes, little-endian.
    pub fn read_le_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Take a sub-cursor covering exactly the next `len` bytes, advancing
    /// this cursor past it. Used to scope parsing of a nested, fixed-length
    /// region (a message, a minor frame, TMATS text) without letting it
    /// read past its declared bound.
    pub fn sub_cursor(&mut self, len: usize) -> Result<ByteCursor<'a>> {
        let slice = self.read(len)?;
        Ok(ByteCursor {
            base: slice,
            pos: 0,
            end: slice.len(),
        })
    }
}

/// A typed overlay onto a fixed number of bytes read from a [`ByteCursor`].
///
/// `T` is whatever a caller's `from_bytes` closure decodes an `N`-byte
/// array into. `PacketElement` itself carries no state beyond the
/// decoded value; it exists so call sites read as a declarative list of
/// fields rather than inline byte arithmetic, matching the teacher's
/// `Ch10PacketElement<T>` equivalent (`read_bitfield!`).
pub struct PacketElement<T> {
    value: T,
}

impl<T> PacketElement<T> {
    /// Access the decoded bitfield value.
    pub fn get(&self) -> &T {
        &self.value
    }
}

/// Read one fixed-width bitfield overlay from the cursor, advancing it by
/// exactly `N` bytes -- the overlay's wire size, not necessarily the Rust
/// in-memory size of `T`.
///
/// Fails with a [`HeaderErrorKind::BodyLengthMismatch`]-flavored error if
/// fewer bytes remain than the layout requires -- the `InsufficientBytes`
/// condition named in the component-design spec.
pub fn parse_element<const N: usize, T, F>(cursor: &mut ByteCursor<'_>, from_bytes: F) -> Result<PacketElement<T>>
where
    F: FnOnce([u8; N]) -> T,
{
    let bytes = cursor.read_array::<N>()?;
    Ok(PacketElement { value: from_bytes(bytes) })
}

/// Read a sequence of fixed-width overlays sharing one byte layout type,
/// advancing the cursor by `count * N` bytes in total. Mirrors the
/// spec's `ParseElements(vec, cursor)` for homogeneous runs (e.g. the
/// per-message IPH stream in 1553-F1).
pub fn parse_elements<const N: usize, T, F>(
    cursor: &mut ByteCursor<'_>,
    count: usize,
    from_bytes: F,
) -> Result<Vec<PacketElement<T>>>
where
    F: Fn([u8; N]) -> T,
{
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(parse_element(cursor, &from_bytes)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_array_advances_and_bounds_checks() {
        let data = [1u8, 2, 3, 4, 5];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_array::<2>().unwrap(), [1, 2]);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.remaining(), 3);
        assert!(cursor.read_array::<10>().is_err());
    }

    #[test]
    fn sub_cursor_scopes_to_declared_length() {
        let data = [0xAAu8, 0xBB, 0xCC, 0xDD];
        let mut cursor = ByteCursor::new(&data);
        let mut sub = cursor.sub_cursor(2).unwrap();
        assert_eq!(sub.read_array::<2>().unwrap(), [0xAA, 0xBB]);
        assert!(sub.at_end());
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn seek_rewinds_for_resync() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(5).unwrap();
        cursor.seek(1);
        assert_eq!(cursor.position(), 1);
    }
}
