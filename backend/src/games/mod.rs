//! Mini-game engines.
//!
//! Pure state machines with no I/O. The API layer loads a user's snapshot,
//! drives the engine, and writes the snapshot back.

pub mod lucky_box;
pub mod puzzle;
pub mod store;

pub use lucky_box::{BoxError, BoxState};
pub use puzzle::{PuzzleGame, PuzzleState};
pub use store::{StoreError, StoreState};
