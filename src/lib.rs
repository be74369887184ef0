//! Joint training of word and word-sense ("synset") embeddings.
//!
//! A skip-gram objective with negative sampling is trained together with a
//! sense-selection classifier and a dictionary-pair reward. The training loop
//! is lock-free: worker threads stream disjoint shards of the corpus and
//! update the shared weight matrices in place without synchronization
//! (Hogwild-style SGD).

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

pub mod corpus;
pub mod hogwild;
pub mod math;
pub mod model;
pub mod query;
pub mod sampling;
pub mod vocab;
pub mod weights;
