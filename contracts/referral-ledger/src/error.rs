use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("Unauthorized")]
    Unauthorized {},

    #[error("Referral code already used by this account")]
    AlreadyUsed {},

    #[error("Invalid referral code format")]
    InvalidFormat {},

    #[error("Referral code not found")]
    CodeNotFound {},

    #[error("Cannot redeem your own referral code")]
    SelfReferral {},

    #[error("Referee account not found")]
    RefereeNotFound {},

    #[error("Account already redeemed a referral code")]
    AlreadyRedeemed {},

    #[error("Insufficient credits")]
    InsufficientCredits {},

    #[error("Amount must be greater than zero")]
    InvalidAmount {},

    #[error("Could not generate a unique referral code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Sync flushed too recently (next allowed at height {next_height})")]
    SyncRateLimited { next_height: u64 },
}
