//! Pure calculation functions for sizes and dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Percentage change from `original` to `compressed`, rounded to the nearest
/// integer.
///
/// Negative means the output is smaller. An empty original yields 0 rather
/// than dividing by zero.
///
/// # Examples
/// ```
/// # use picslim::imaging::compression_ratio;
/// assert_eq!(compression_ratio(1_000_000, 600_000), -40);
/// assert_eq!(compression_ratio(100, 150), 50);
/// assert_eq!(compression_ratio(0, 10), 0);
/// ```
pub fn compression_ratio(original: u64, compressed: u64) -> i32 {
    if original == 0 {
        return 0;
    }
    let change = (compressed as f64 - original as f64) / original as f64 * 100.0;
    change.round() as i32
}

/// Dimensions that fit inside a `max_edge` square while keeping the aspect
/// ratio. Never enlarges, never returns a zero dimension.
///
/// # Examples
/// ```
/// # use picslim::imaging::fit_within;
/// // 1600x1200 into 800 → 800x600
/// assert_eq!(fit_within((1600, 1200), 800), (800, 600));
/// // Already small enough
/// assert_eq!(fit_within((100, 50), 800), (100, 50));
/// ```
pub fn fit_within(source: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (w, h) = source;
    let longer = w.max(h);
    if longer <= max_edge || longer == 0 {
        return (w, h);
    }
    let scale = max_edge as f64 / longer as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    if w >= h {
        (max_edge, scaled(h))
    } else {
        (scaled(w), max_edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // compression_ratio tests
    // =========================================================================

    #[test]
    fn ratio_negative_when_smaller() {
        assert_eq!(compression_ratio(1_000_000, 600_000), -40);
    }

    #[test]
    fn ratio_positive_when_larger() {
        assert_eq!(compression_ratio(1000, 1250), 25);
    }

    #[test]
    fn ratio_zero_when_unchanged() {
        assert_eq!(compression_ratio(4096, 4096), 0);
    }

    #[test]
    fn ratio_zero_for_empty_original() {
        assert_eq!(compression_ratio(0, 0), 0);
        assert_eq!(compression_ratio(0, 500), 0);
    }

    #[test]
    fn ratio_rounds_to_nearest() {
        // -33.33% → -33
        assert_eq!(compression_ratio(3, 2), -33);
        // -66.67% → -67
        assert_eq!(compression_ratio(3, 1), -67);
    }

    #[test]
    fn ratio_fully_compressed() {
        assert_eq!(compression_ratio(500, 0), -100);
    }

    // =========================================================================
    // fit_within tests
    // =========================================================================

    #[test]
    fn fit_landscape() {
        assert_eq!(fit_within((1600, 1200), 800), (800, 600));
    }

    #[test]
    fn fit_portrait() {
        assert_eq!(fit_within((1200, 1600), 800), (600, 800));
    }

    #[test]
    fn fit_square() {
        assert_eq!(fit_within((1000, 1000), 128), (128, 128));
    }

    #[test]
    fn fit_never_enlarges() {
        assert_eq!(fit_within((64, 32), 128), (64, 32));
    }

    #[test]
    fn fit_extreme_aspect_keeps_one_pixel() {
        assert_eq!(fit_within((10_000, 2), 100), (100, 1));
    }
}
