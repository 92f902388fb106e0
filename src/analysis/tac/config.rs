//! Translation configuration
//!
//! This module provides the knobs of the translation pipeline: which optional stages run,
//! whether batches fan out over threads, and the guard against runaway abstract stacks.

/// Configuration for translating method bodies into TAC
///
/// Decoding, exception region import, block construction and stack translation always run.
/// The block graph invariant check and the `finally` inlining pass are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TranslationConfig {
    /// Check the block graph invariants after construction (recommended: always true)
    /// Violations point at decoder or clause import defects and fail the method
    pub verify_block_graph: bool,

    /// Inline `finally` handlers at every exit crossing them and turn `leave` into `goto`
    /// When disabled, `leave` and `endfinally` stay in the output as pseudo-statements
    pub inline_finally: bool,

    /// Translate the methods of a batch in parallel
    pub parallel: bool,

    /// Maximum depth of the abstract operand stack (default: 1024)
    pub max_stack_depth: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            verify_block_graph: true,
            inline_finally: true,
            parallel: true,
            max_stack_depth: 1024,
        }
    }
}

impl TranslationConfig {
    /// Creates a comprehensive configuration running every stage
    #[must_use]
    pub fn comprehensive() -> Self {
        Self::default()
    }

    /// Creates a minimal configuration for single-threaded callers
    ///
    /// Skips the block graph verification and translates batches sequentially.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            verify_block_graph: false,
            parallel: false,
            ..Self::default()
        }
    }

    /// Creates a configuration that keeps the exception handling constructs as emitted
    ///
    /// Useful when a consumer wants to see `leave` and `endfinally` before inlining.
    #[must_use]
    pub fn raw() -> Self {
        Self {
            inline_finally: false,
            ..Self::default()
        }
    }
}
