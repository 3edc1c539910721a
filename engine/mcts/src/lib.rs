//! Monte-Carlo tree search over the `Game` and `Model` abstractions.
//!
//! Each search owns a fresh arena-allocated tree. A simulation selects a
//! leaf by the PUCT rule, evaluates it through the model, expands it with
//! the masked prior, and backs the value up to the root, negating it at
//! every ply. After the configured number of simulations the visit counts
//! at the root are cooled into the improved policy.
//!
//! When the model advertises `ntasks > 1` (the batching wrapper does), the
//! search keeps that many traversals pending at once: each pending path
//! carries a virtual loss so concurrent traversals spread out, and the
//! collected leaves are evaluated in a single batched model call. Tree
//! mutation stays single-threaded throughout; given the same model
//! responses the search is deterministic, ties always resolving to the
//! lowest action index.

pub mod config;
pub mod node;
pub mod search;
pub mod tree;

pub use config::SearchConfig;
pub use node::{Node, NodeId};
pub use search::{run_search, Search, SearchError, SearchOutcome};
pub use tree::{Tree, TreeStats};
