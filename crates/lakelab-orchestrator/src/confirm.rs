//! Operator confirmation for destructive operations

use lakelab_common::Result;

/// Asks the operator before anything is destroyed
pub trait Confirmer: Send + Sync {
    /// Yes/no question; `true` means proceed
    fn confirm(&self, prompt: &str) -> Result<bool>;

    /// The operator must type `expected` exactly; `true` means it matched
    fn confirm_typed(&self, prompt: &str, expected: &str) -> Result<bool>;
}
