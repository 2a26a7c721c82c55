//! Board oracle for the live-game session and the review pipeline.
//!
//! Chess rules are not implemented in this workspace; every legality,
//! conversion, and termination question is delegated to shakmaty. The rest of
//! the workspace treats positions as opaque FEN strings and moves as SAN/UCI
//! text, and goes through this crate for anything that requires a real board.

pub mod error;
pub mod position;

pub use error::OracleError;
pub use position::{Board, GameStatus, PlayedMove};
