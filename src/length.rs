use crate::point::{Point, POINT_ZERO};

/// A byte count paired with the row/column extent it covers.
///
/// Subtrees store their padding and size as `Length`s relative to the end of
/// the previous sibling, which is what lets untouched subtrees be shared across
/// edits without rewriting their positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Length {
    pub bytes: u32,
    pub extent: Point,
}

pub const LENGTH_ZERO: Length = Length {
    bytes: 0,
    extent: POINT_ZERO,
};

/// Byte offsets past `u32::MAX` are clamped; parsing rejects such inputs.
pub(crate) fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl Length {
    #[inline]
    pub const fn new(bytes: u32, extent: Point) -> Self {
        Self { bytes, extent }
    }

    /// The length of `text`.
    pub fn of(text: &[u8]) -> Self {
        Self {
            bytes: saturating_u32(text.len()),
            extent: POINT_ZERO.advance(text),
        }
    }

    #[inline]
    #[must_use]
    pub fn add(self, other: Length) -> Length {
        Length {
            bytes: self.bytes + other.bytes,
            extent: self.extent.add(other.extent),
        }
    }

    #[inline]
    #[must_use]
    pub fn sub(self, other: Length) -> Length {
        Length {
            bytes: self.bytes.saturating_sub(other.bytes),
            extent: self.extent.sub(other.extent),
        }
    }

    /// Like [`Length::sub`], but clamps to zero when `other` is not shorter.
    #[inline]
    #[must_use]
    pub fn saturating_sub(self, other: Length) -> Length {
        if self.bytes > other.bytes {
            self.sub(other)
        } else {
            LENGTH_ZERO
        }
    }

    #[inline]
    #[must_use]
    pub fn min(self, other: Length) -> Length {
        if self.bytes < other.bytes {
            self
        } else {
            other
        }
    }

    #[inline]
    #[must_use]
    pub fn max(self, other: Length) -> Length {
        if self.bytes < other.bytes {
            other
        } else {
            self
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.bytes == 0
    }

    /// The position `other` before `self`, undoing `start.add(other)`.
    ///
    /// When `other` spans rows the column of the start is lost and comes back
    /// as zero. Adding a length that spans rows resets the column anyway.
    #[must_use]
    pub(crate) fn retreat(self, other: Length) -> Length {
        let extent = if other.extent.row > 0 {
            Point::new(self.extent.row.saturating_sub(other.extent.row), 0)
        } else {
            Point::new(
                self.extent.row,
                self.extent.column.saturating_sub(other.extent.column),
            )
        };
        Length {
            bytes: self.bytes.saturating_sub(other.bytes),
            extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retreat_undoes_add() {
        let start = Length::of(b"ab\ncde");
        let same_row = Length::of(b"  ");
        assert_eq!(start.add(same_row).retreat(same_row), start);

        let next_row = Length::of(b"\n  ");
        let retreated = start.add(next_row).retreat(next_row);
        assert_eq!(retreated.bytes, start.bytes);
        assert_eq!(retreated.extent, Point::new(1, 0));
        assert_eq!(retreated.add(next_row), start.add(next_row));
    }

    #[test]
    fn offsets_saturate_at_u32_max() {
        assert_eq!(saturating_u32(7), 7);
        assert_eq!(saturating_u32(u32::MAX as usize), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(saturating_u32(u32::MAX as usize + 1), u32::MAX);
    }

    #[test]
    fn add_and_sub_roundtrip_extent() {
        let a = Length::of(b"foo\nba");
        let b = Length::of(b"r\nbaz");
        let sum = a.add(b);
        assert_eq!(sum, Length::of(b"foo\nbar\nbaz"));
        assert_eq!(sum.sub(a), b);
    }

    #[test]
    fn saturating_sub_clamps() {
        let a = Length::of(b"ab");
        assert_eq!(a.saturating_sub(Length::of(b"abcd")), LENGTH_ZERO);
    }
}
