//! Tree edit distance between ordered labeled trees in bracket notation.
//!
//! The pipeline: [`parsing`] turns a bracket string into an arena tree and
//! interns labels into a [`parsing::LabelDictionary`]; [`indexing`] flattens
//! the tree into the struct-of-arrays [`indexing::TedIndex`]; the algorithms
//! in [`ted`] run their dynamic programs over index arrays only. All
//! algorithms agree on the distance for a given cost model; they differ in
//! decomposition strategy and in their bounded (`ted_k`) behavior.

pub mod indexing;
pub mod parsing;
pub mod ted;
