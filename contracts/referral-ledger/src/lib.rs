pub mod contract;
pub mod directory;
mod error;
pub mod msg;
pub mod state;
pub mod sync;

pub use crate::error::ContractError;
