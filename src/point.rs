use std::cmp::Ordering;
use std::fmt;

/// A position in a text document, as a zero-based row and a byte column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

pub const POINT_ZERO: Point = Point { row: 0, column: 0 };
pub const POINT_MAX: Point = Point {
    row: u32::MAX,
    column: u32::MAX,
};

impl Point {
    #[inline]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Appends the relative extent `other` to this point.
    ///
    /// An extent that spans rows resets the column, so this is not commutative.
    #[inline]
    #[must_use]
    pub fn add(self, other: Point) -> Point {
        if other.row > 0 {
            Point::new(self.row + other.row, other.column)
        } else {
            Point::new(self.row, self.column + other.column)
        }
    }

    /// The extent from `other` to `self`, saturating at zero.
    #[inline]
    #[must_use]
    pub fn sub(self, other: Point) -> Point {
        if self.row > other.row {
            Point::new(self.row - other.row, self.column)
        } else {
            Point::new(0, self.column.saturating_sub(other.column))
        }
    }

    /// Advances the point past `text`, counting `\n` as a line break.
    #[must_use]
    pub fn advance(self, text: &[u8]) -> Point {
        let mut point = self;
        for &byte in text {
            if byte == b'\n' {
                point.row += 1;
                point.column = 0;
            } else {
                point.column += 1;
            }
        }
        point
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}
