//! Width-multiplier channel rounding.

/// Default divisor that every derived channel count is a multiple of.
pub const DEFAULT_DIVISOR: f32 = 8.0;

/// Scales `filter` by `width_multiplier` and rounds to a multiple of `divisor`.
///
/// The rounded value is clamped to at least one. If it falls below 90% of
/// the unscaled `filter`, one more `divisor` is added.
///
/// # Example
///
/// ```
/// use ml_models::make_divisible;
///
/// assert_eq!(make_divisible(32, 1.0, 8.0), 32);
/// assert_eq!(make_divisible(32, 0.35, 8.0), 16);
/// ```
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn make_divisible(filter: usize, width_multiplier: f32, divisor: f32) -> usize {
    let scaled = filter as f32 * width_multiplier;
    let rounded = ((scaled + divisor / 2.0) / divisor).floor() * divisor;
    let mut result = (rounded as usize).max(1);
    // The floor is the unrounded `0.9 * filter`. Truncating it to an integer
    // first would keep 8 for a filter of 9; this comparison yields 16.
    if (result as f32) < 0.9 * filter as f32 {
        result += divisor as usize;
    }
    result
}

/// Rounds an `(input, output)` channel pair with the default divisor.
#[must_use]
pub fn round_filter_pair(filters: (usize, usize), width_multiplier: f32) -> (usize, usize) {
    (
        make_divisible(filters.0, width_multiplier, DEFAULT_DIVISOR),
        make_divisible(filters.1, width_multiplier, DEFAULT_DIVISOR),
    )
}
