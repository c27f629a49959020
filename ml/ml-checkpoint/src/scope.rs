//! Hierarchical key prefixes for the native dialect.

use std::fmt;

/// Position of a node in a model tree, rendered as a `/`-joined path.
///
/// The root carries no leading separator. Repeated children sit under a
/// `blocks/h<index>` segment.
///
/// # Example
///
/// ```
/// use ml_checkpoint::ScopePath;
///
/// let stack = ScopePath::root("model").child("residual1");
/// let block = stack.repeated(2);
/// assert_eq!(block.as_str(), "model/residual1/blocks/h2");
/// assert_eq!(block.child("conv1").param("w"), "model/residual1/blocks/h2/conv1/w");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ScopePath {
    path: String,
}

impl ScopePath {
    /// Creates a root scope.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self { path: name.into() }
    }

    /// Returns the scope of a named child.
    #[must_use]
    pub fn child(&self, role: &str) -> Self {
        if self.path.is_empty() {
            Self::root(role)
        } else {
            Self {
                path: format!("{}/{role}", self.path),
            }
        }
    }

    /// Returns the scope of the `index`-th child of a repeated slot.
    #[must_use]
    pub fn repeated(&self, index: usize) -> Self {
        self.child("blocks").child(&format!("h{index}"))
    }

    /// Key of a parameter owned directly by this scope.
    #[must_use]
    pub fn param(&self, short: &str) -> String {
        self.child(short).path
    }

    /// Candidate keys for a parameter, in probe order.
    #[must_use]
    pub fn candidates(&self, shorts: &[&str]) -> Vec<String> {
        shorts.iter().map(|short| self.param(short)).collect()
    }

    /// The rendered path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Returns `true` for the empty scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
