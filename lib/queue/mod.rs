//! The two pieces of actual logic in this service: the transition engine
//! (legal lifecycle moves for a queue entry) and the segmentation engine
//! (deterministic display bands). Both are pure functions over a snapshot.

pub mod engine;
pub mod segments;
pub mod types;
