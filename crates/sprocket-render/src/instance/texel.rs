//! Row-wrapped writes into fixed-width data textures.
//!
//! A linear texel range `[begin, end)` laid out row-major in a texture `row_width`
//! texels wide is covered by at most three rectangles: the remainder of the first
//! row, a block of whole rows, and the head of the last row.

/// One rectangular texture write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelWrite {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Linear index of the first texel, i.e. where the source bytes start.
    pub first: usize,
}

impl TexelWrite {
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Splits `[begin, end)` into at most three row-aligned rectangles.
///
/// # Panics
/// Panics if `row_width` is zero.
pub fn texel_writes(begin: usize, end: usize, row_width: u32) -> impl Iterator<Item = TexelWrite> {
    assert!(row_width > 0, "data texture width must be non-zero");
    let width = row_width as usize;
    let mut parts = [None; 3];

    if begin < end {
        let mut cursor = begin;

        let column = begin % width;
        if column != 0 {
            let row_end = (begin / width + 1) * width;
            let head_end = end.min(row_end);
            parts[0] = Some(TexelWrite {
                x: column as u32,
                y: (begin / width) as u32,
                width: (head_end - begin) as u32,
                height: 1,
                first: begin,
            });
            cursor = head_end;
        }

        let rows = (end - cursor) / width;
        if rows > 0 {
            parts[1] = Some(TexelWrite {
                x: 0,
                y: (cursor / width) as u32,
                width: row_width,
                height: rows as u32,
                first: cursor,
            });
            cursor += rows * width;
        }

        if cursor < end {
            parts[2] = Some(TexelWrite {
                x: 0,
                y: (cursor / width) as u32,
                width: (end - cursor) as u32,
                height: 1,
                first: cursor,
            });
        }
    }

    parts.into_iter().flatten()
}

/// Rows needed to hold `texels` texels at `row_width` texels per row.
pub fn rows_for(texels: usize, row_width: u32) -> u32 {
    texels.div_ceil(row_width as usize).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(begin: usize, end: usize, width: u32) -> Vec<TexelWrite> {
        texel_writes(begin, end, width).collect()
    }

    /// Every texel of the range is written exactly once, in order.
    fn assert_exact_cover(begin: usize, end: usize, width: u32) {
        let mut expected = begin;
        for write in texel_writes(begin, end, width) {
            assert!(write.x + write.width <= width, "{write:?} overflows row");
            assert_eq!(write.first, expected);
            assert_eq!(
                write.first,
                write.y as usize * width as usize + write.x as usize
            );
            if write.height > 1 {
                assert_eq!(write.x, 0);
                assert_eq!(write.width, width);
            }
            expected += write.texel_count();
        }
        assert_eq!(expected, end.max(begin), "range [{begin}, {end}) width {width}");
    }

    #[test]
    fn test_within_one_row() {
        assert_eq!(
            collect(3, 7, 16),
            vec![TexelWrite {
                x: 3,
                y: 0,
                width: 4,
                height: 1,
                first: 3
            }]
        );
    }

    #[test]
    fn test_ends_exactly_at_row_boundary() {
        let writes = collect(12, 16, 16);
        assert_eq!(writes.len(), 1);
        assert_eq!((writes[0].x, writes[0].width), (12, 4));
    }

    #[test]
    fn test_starts_exactly_at_row_boundary() {
        let writes = collect(16, 20, 16);
        assert_eq!(writes.len(), 1);
        assert_eq!((writes[0].x, writes[0].y, writes[0].width), (0, 1, 4));
    }

    #[test]
    fn test_straddles_one_boundary() {
        let writes = collect(15, 17, 16);
        assert_eq!(writes.len(), 2);
        assert_eq!((writes[0].x, writes[0].y, writes[0].width), (15, 0, 1));
        assert_eq!((writes[1].x, writes[1].y, writes[1].width), (0, 1, 1));
    }

    #[test]
    fn test_head_body_tail() {
        let writes = collect(10, 60, 16);
        assert_eq!(writes.len(), 3);
        assert_eq!((writes[0].x, writes[0].y, writes[0].width), (10, 0, 6));
        assert_eq!(
            (writes[1].y, writes[1].width, writes[1].height),
            (1, 16, 2)
        );
        assert_eq!((writes[2].x, writes[2].y, writes[2].width), (0, 3, 12));
    }

    #[test]
    fn test_whole_rows_only() {
        let writes = collect(32, 64, 16);
        assert_eq!(writes.len(), 1);
        assert_eq!((writes[0].y, writes[0].height), (2, 2));
    }

    #[test]
    fn test_empty_range() {
        assert!(collect(5, 5, 16).is_empty());
    }

    #[test]
    fn test_width_one() {
        let writes = collect(2, 5, 1);
        assert_eq!(writes.len(), 1);
        assert_eq!((writes[0].y, writes[0].height), (2, 3));
    }

    #[test]
    fn test_exhaustive_small_widths() {
        for width in 1..=5u32 {
            for begin in 0..20 {
                for end in begin..24 {
                    assert_exact_cover(begin, end, width);
                }
            }
        }
    }

    #[test]
    fn test_rows_for() {
        assert_eq!(rows_for(0, 16), 1);
        assert_eq!(rows_for(16, 16), 1);
        assert_eq!(rows_for(17, 16), 2);
    }
}
