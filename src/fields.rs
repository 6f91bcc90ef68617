//! Fixed-Capacity Byte Fields
//!
//! Identifiers and wire records in this crate never use heap strings; they use
//! exact-width byte fields with explicit fill padding:
//!
//! - [`FixedKey`] - identifier flavor; the logical view ends at the first NUL
//! - [`FixedCell`] - wire flavor; the logical view is always the full width
//! - [`TrimCell`] - wire flavor whose view strips trailing fill, but never
//!   below a configured minimum payload (keeps aligned record layouts)
//!
//! All three store exactly `N` bytes and are `Copy`. Assignment from a short
//! source pads right with the fill byte; a long source is truncated.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

#[inline]
fn copy_padded<const N: usize>(dst: &mut [u8; N], src: &[u8], fill: u8) {
    if src.len() < N {
        dst[..src.len()].copy_from_slice(src);
        dst[src.len()..].fill(fill);
    } else {
        dst.copy_from_slice(&src[..N]);
    }
}

/// Length of the prefix up to (not including) the first NUL byte.
#[inline]
fn cstr_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

// =============================================================================
// FixedKey - C-string view
// =============================================================================

/// Fixed-capacity identifier field. NUL-filled; comparisons and the logical
/// view stop at the first NUL byte.
#[derive(Clone, Copy)]
pub struct FixedKey<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedKey<N> {
    /// Empty field (all NUL).
    pub const fn new() -> Self {
        Self { bytes: [0u8; N] }
    }

    pub fn from_slice(src: &[u8]) -> Self {
        let mut f = Self::new();
        f.copy_from(src);
        f
    }

    pub fn from_str(src: &str) -> Self {
        Self::from_slice(src.as_bytes())
    }

    /// Assign from `src`: truncate to `N` or pad right with NUL.
    pub fn copy_from(&mut self, src: &[u8]) {
        copy_padded(&mut self.bytes, src, 0);
    }

    /// Assign from a sub-range of this field's own bytes. The ranges may
    /// overlap, which a plain `copy_from` borrow cannot express.
    pub fn assign_within(&mut self, src: Range<usize>) {
        let len = src.len().min(N);
        self.bytes.copy_within(src.start..src.start + len, 0);
        self.bytes[len..].fill(0);
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Raw storage, always `N` bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Logical view: the prefix before the first NUL.
    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.bytes[..cstr_len(&self.bytes)]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    #[inline]
    pub const fn capacity() -> usize {
        N
    }
}

impl<const N: usize> Default for FixedKey<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PartialEq for FixedKey<N> {
    fn eq(&self, other: &Self) -> bool {
        self.view() == other.view()
    }
}
impl<const N: usize> Eq for FixedKey<N> {}

impl<const N: usize> PartialOrd for FixedKey<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<const N: usize> Ord for FixedKey<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.view().cmp(other.view())
    }
}

impl<const N: usize> Hash for FixedKey<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.view().hash(state);
    }
}

impl<const N: usize> fmt::Display for FixedKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.view()))
    }
}

impl<const N: usize> fmt::Debug for FixedKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedKey({:?})", String::from_utf8_lossy(self.view()))
    }
}

impl<const N: usize> From<&str> for FixedKey<N> {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

// Keys serialize as their logical string view, not as raw storage.
impl<const N: usize> serde::Serialize for FixedKey<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(self.view()))
    }
}

impl<'de, const N: usize> serde::Deserialize<'de> for FixedKey<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        Ok(Self::from_str(&s))
    }
}

// =============================================================================
// FixedCell - full-width view
// =============================================================================

/// Fixed-width wire field. The logical view is always all `N` bytes;
/// comparisons are over the full width.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedCell<const N: usize, const FILL: u8 = 0> {
    bytes: [u8; N],
}

impl<const N: usize, const FILL: u8> FixedCell<N, FILL> {
    pub const fn new() -> Self {
        Self { bytes: [FILL; N] }
    }

    pub fn from_slice(src: &[u8]) -> Self {
        let mut f = Self::new();
        f.copy_from(src);
        f
    }

    /// Assign from `src`: truncate to `N` or pad right with the fill byte.
    pub fn copy_from(&mut self, src: &[u8]) {
        copy_padded(&mut self.bytes, src, FILL);
    }

    /// Assign from a sub-range of this field's own bytes (overlap tolerant).
    pub fn assign_within(&mut self, src: Range<usize>) {
        let len = src.len().min(N);
        self.bytes.copy_within(src.start..src.start + len, 0);
        self.bytes[len..].fill(FILL);
    }

    pub fn clear(&mut self) {
        self.bytes.fill(FILL);
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Logical view: the full width.
    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub const fn capacity() -> usize {
        N
    }

    #[inline]
    pub const fn fill_byte() -> u8 {
        FILL
    }
}

impl<const N: usize, const FILL: u8> Default for FixedCell<N, FILL> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const FILL: u8> fmt::Display for FixedCell<N, FILL> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl<const N: usize, const FILL: u8> fmt::Debug for FixedCell<N, FILL> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedCell({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

impl<const N: usize, const FILL: u8> From<&str> for FixedCell<N, FILL> {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

// =============================================================================
// TrimCell - trimmed view with minimum payload
// =============================================================================

/// Fixed-width field whose view strips trailing fill bytes, but never below
/// `MIN` bytes. Comparisons stay full-width so records sort like their wire
/// images.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrimCell<const N: usize, const MIN: usize, const FILL: u8 = 0> {
    bytes: [u8; N],
}

impl<const N: usize, const MIN: usize, const FILL: u8> TrimCell<N, MIN, FILL> {
    pub const fn new() -> Self {
        Self { bytes: [FILL; N] }
    }

    pub fn from_slice(src: &[u8]) -> Self {
        let mut f = Self::new();
        f.copy_from(src);
        f
    }

    pub fn copy_from(&mut self, src: &[u8]) {
        copy_padded(&mut self.bytes, src, FILL);
    }

    pub fn clear(&mut self) {
        self.bytes.fill(FILL);
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Payload length after stripping trailing fill, floored at `MIN`.
    pub fn len(&self) -> usize {
        let mut sz = N;
        while sz > MIN && self.bytes[sz - 1] == FILL {
            sz -= 1;
        }
        sz
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical view: trailing fill removed, at least `MIN` bytes kept.
    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
}

impl<const N: usize, const MIN: usize, const FILL: u8> Default for TrimCell<N, MIN, FILL> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const MIN: usize, const FILL: u8> fmt::Display for TrimCell<N, MIN, FILL> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.view()))
    }
}

impl<const N: usize, const MIN: usize, const FILL: u8> fmt::Debug for TrimCell<N, MIN, FILL> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrimCell({:?})", String::from_utf8_lossy(self.view()))
    }
}

impl<const N: usize, const MIN: usize, const FILL: u8> From<&str> for TrimCell<N, MIN, FILL> {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

/// Lossy UTF-8 rendering of a field view, for log lines.
pub fn view_lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pad_and_truncate() {
        let k: FixedKey<8> = FixedKey::from_str("TXFA4");
        assert_eq!(k.view(), b"TXFA4");
        assert_eq!(k.as_bytes(), b"TXFA4\0\0\0");

        let long: FixedKey<4> = FixedKey::from_str("TOOLONG");
        assert_eq!(long.view(), b"TOOL");
    }

    #[test]
    fn test_key_compare_stops_at_nul() {
        let mut a: FixedKey<8> = FixedKey::from_str("AB");
        let b: FixedKey<8> = FixedKey::from_str("AB");
        assert_eq!(a, b);

        // Garbage after the NUL is invisible to the view.
        a.copy_from(b"AB\0ZZ");
        assert_eq!(a.view(), b"AB");
        assert_eq!(a, b);
        assert!(FixedKey::<8>::from_str("AA") < b);
    }

    #[test]
    fn test_cell_full_width_compare() {
        let a: FixedCell<6, b' '> = FixedCell::from_slice(b"AB");
        let b: FixedCell<6, b' '> = FixedCell::from_slice(b"AB ");
        // Both pad to "AB    " so the full-width images match.
        assert_eq!(a, b);
        assert_eq!(a.view(), b"AB    ");

        let c: FixedCell<6, b' '> = FixedCell::from_slice(b"AB\0");
        assert_ne!(a, c); // NUL vs space is visible in the wire image
    }

    #[test]
    fn test_assign_within_overlap() {
        let mut k: FixedKey<8> = FixedKey::from_str("ABCDEF");
        k.assign_within(2..6);
        assert_eq!(k.view(), b"CDEF");
    }

    #[test]
    fn test_trim_cell_min_payload() {
        let t: TrimCell<8, 3, b' '> = TrimCell::from_slice(b"AB");
        // Trailing fill trimmed, but never below MIN=3.
        assert_eq!(t.view(), b"AB ");
        assert_eq!(t.len(), 3);

        let full: TrimCell<8, 3, b' '> = TrimCell::from_slice(b"ABCDEFGH");
        assert_eq!(full.view(), b"ABCDEFGH");

        let mid: TrimCell<8, 3, b' '> = TrimCell::from_slice(b"ABCDE");
        assert_eq!(mid.view(), b"ABCDE");
    }

    #[test]
    fn test_clear() {
        let mut k: FixedKey<4> = FixedKey::from_str("XX");
        k.clear();
        assert!(k.is_empty());
        assert_eq!(k.view(), b"");

        let mut c: FixedCell<4, b' '> = FixedCell::from_slice(b"XX");
        c.clear();
        assert_eq!(c.view(), b"    ");
    }
}
