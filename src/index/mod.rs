pub mod mine;
pub mod rank;
pub mod store;
pub mod types;

pub use mine::{collect_files, MineOutput, Miner, RunSummary};
pub use store::ContentStore;
pub use types::*;
