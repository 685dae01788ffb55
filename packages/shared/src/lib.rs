// Shared types for the referral ledger contracts on CosmWasm

pub mod code;
pub mod directory;
pub mod subscription;

pub use code::{normalize, CodeFormatError, ReferralCode, CODE_LEN};
