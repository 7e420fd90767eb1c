//! cosmindex-rewards — gas-reward accounting handlers.
//!
//! The chain's gas tracking module emits a two-phase event pair in
//! begin-block: a calculation event computing each contract's reward for the
//! PREVIOUS block, and a distribution event finalizing what was paid out.
//! [`RewardEventHandler`] parses both into reward records, applying the
//! height-minus-one correction throughout.

pub mod event;
pub mod handler;

pub use handler::RewardEventHandler;
