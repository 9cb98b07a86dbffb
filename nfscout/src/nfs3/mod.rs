//! Definitions for encoding/decoding NFSv3 calls and replies.
pub mod client;
mod consts;
pub mod procs;
mod types;

pub use consts::*;
pub use types::*;
