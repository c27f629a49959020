//! Auto-incrementing layer addressing for the foreign dialect.

/// Shared layer counter used by foreign traversals.
///
/// Every node that owns trainable tensors reads its keys from the current
/// value and then calls [`advance`](Self::advance) exactly once. The counter
/// is threaded through a traversal by `&mut`, so numbering is continuous
/// across the whole tree.
///
/// # Example
///
/// ```
/// use ml_checkpoint::LayerCounter;
///
/// let mut counter = LayerCounter::with_prefix("layer_with_weights-0/");
/// assert_eq!(
///     counter.key("kernel"),
///     "layer_with_weights-0/layer_with_weights-0/kernel/.ATTRIBUTES/VARIABLE_VALUE"
/// );
/// counter.advance();
/// assert_eq!(counter.current(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayerCounter {
    prefix: String,
    current: usize,
}

impl LayerCounter {
    /// Creates a counter at zero with no prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counter at zero whose keys start with `prefix`.
    ///
    /// The prefix addresses a sub-model inside the saved top-level model and
    /// must carry its own trailing separator.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            current: 0,
        }
    }

    /// Current layer number.
    #[must_use]
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Foreign key for `attribute` at the current layer number.
    #[must_use]
    pub fn key(&self, attribute: &str) -> String {
        format!(
            "{}{}/{attribute}/.ATTRIBUTES/VARIABLE_VALUE",
            self.prefix,
            Self::layer_segment(self.current)
        )
    }

    /// Moves to the next layer number.
    pub fn advance(&mut self) {
        self.current += 1;
    }

    /// The `layer_with_weights-<n>` path segment.
    #[must_use]
    pub fn layer_segment(number: usize) -> String {
        format!("layer_with_weights-{number}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn key_without_prefix() {
        let counter = LayerCounter::new();
        assert_eq!(
            counter.key("gamma"),
            "layer_with_weights-0/gamma/.ATTRIBUTES/VARIABLE_VALUE"
        );
    }

    #[test]
    fn advance_moves_every_key() {
        let mut counter = LayerCounter::with_prefix("layer_with_weights-0/");
        for _ in 0..5 {
            counter.advance();
        }
        assert_eq!(counter.current(), 5);
        assert_eq!(
            counter.key("moving_variance"),
            "layer_with_weights-0/layer_with_weights-5/moving_variance/.ATTRIBUTES/VARIABLE_VALUE"
        );
    }

    #[test]
    fn layer_segment_format() {
        assert_eq!(LayerCounter::layer_segment(12), "layer_with_weights-12");
    }
}
