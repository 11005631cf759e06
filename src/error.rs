//! Error types for rewrites and symbol resolution.
//!
//! Most precondition failures inside a pattern are reported as "no match"
//! (`Ok(false)` from the pattern), not as errors: an unprovable divisibility
//! or an incompatible shape just means the rewrite does not fire. The
//! variants here cover the cases that abort a rewrite outright.

use smol_str::SmolStr;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A call-like operation references a name absent from the symbol table.
    #[error("unresolved symbol `{name}`")]
    UnresolvedSymbol { name: SmolStr },

    /// An aliasing descriptor points past the current operand or result bounds.
    #[error(
        "ill-formed aliasing on `{callee}`: descriptor names operand {operand_index} \
         but the call site has {operand_count} operands"
    )]
    IllFormedAliasing { callee: SmolStr, operand_index: u32, operand_count: usize },

    /// Aliasing descriptor count does not match the result count.
    #[error("aliasing descriptor count {aliases} != result count {results} on `{callee}`")]
    AliasArityMismatch { callee: SmolStr, aliases: usize, results: usize },

    /// A use of a callee could not be classified as a recognized call kind.
    /// Fatal for the call-site liveness optimizer: the whole rewrite for that
    /// callee is abandoned with the graph left untouched.
    #[error("symbol `{name}` has a user that is not a recognized call kind")]
    UnclassifiedCallUse { name: SmolStr },
}
