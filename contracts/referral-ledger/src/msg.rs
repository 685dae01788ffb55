use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::Addr;

use crate::state::{Account, Referral, ReferralStatus};

#[cw_serde]
pub struct InstantiateMsg {
    /// Admin address (defaults to the instantiator)
    pub admin: Option<String>,
    /// Remote directory contract
    pub directory: Option<String>,
    /// Contracts allowed to spend on behalf of accounts
    pub spenders: Option<Vec<String>>,
    pub referrals_per_cycle: Option<u32>,
    pub cycle_reward: Option<u64>,
    pub max_cycles: Option<u32>,
    pub welcome_credit: Option<u64>,
    pub max_code_attempts: Option<u32>,
    pub sync_max_attempts: Option<u32>,
    pub sync_retry_backoff: Option<u64>,
    pub sync_flush_interval: Option<u64>,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Create the sender's account, or return it if it exists
    CreateOrGetAccount {},
    /// Redeem another account's referral code as the sender
    RedeemReferralCode { code: String },
    /// Spend credits (own account, or any account for an approved spender)
    UseCredits {
        account: Option<String>,
        amount: u64,
    },
    /// Update configuration (admin only)
    UpdateConfig {
        /// Some("") clears the directory
        directory: Option<String>,
        spenders: Option<Vec<String>>,
        sync_max_attempts: Option<u32>,
        sync_retry_backoff: Option<u64>,
        sync_flush_interval: Option<u64>,
    },
    /// Deliver queued account snapshots to the directory
    FlushSync { limit: Option<u32> },
    /// Drop queued and pending syncs and zero the counters (admin only)
    ResetSync {},
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// Get configuration
    #[returns(ConfigResponse)]
    Config {},

    /// Get an account by id
    #[returns(Option<AccountResponse>)]
    Account { id: String },

    /// Get the local account owning a referral code
    #[returns(Option<AccountResponse>)]
    AccountByCode { code: String },

    /// Referral progress of a code owner
    #[returns(ReferralStatsResponse)]
    ReferralStats { owner: String },

    /// Referees of the current, still open cycle
    #[returns(ReferredAccountsResponse)]
    ReferredAccounts {
        owner: String,
        start_after: Option<u64>,
        limit: Option<u32>,
    },

    /// Credit balance (0 for unknown accounts)
    #[returns(CreditsResponse)]
    Credits { account: String },

    /// The redemption made by a referee, if any
    #[returns(Option<ReferralResponse>)]
    ReferralOf { referee: String },

    /// Directory sync scheduler state
    #[returns(SyncStatusResponse)]
    SyncStatus {},
}

// Response types

#[cw_serde]
pub struct ConfigResponse {
    pub admin: Addr,
    pub directory: Option<Addr>,
    pub spenders: Vec<Addr>,
    pub referrals_per_cycle: u32,
    pub cycle_reward: u64,
    pub max_cycles: u32,
    pub welcome_credit: u64,
    pub max_code_attempts: u32,
    pub sync_max_attempts: u32,
    pub sync_retry_backoff: u64,
    pub sync_flush_interval: u64,
}

#[cw_serde]
pub struct AccountResponse {
    pub id: String,
    pub referral_code: String,
    pub credits: u64,
    pub used_referral_code: Option<String>,
    pub created_at: u64,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        AccountResponse {
            id: account.id,
            referral_code: account.referral_code,
            credits: account.credits,
            used_referral_code: account.used_referral_code,
            created_at: account.created_at,
        }
    }
}

#[cw_serde]
pub struct RedeemResponse {
    pub success: bool,
    /// Welcome credit granted to the referee
    pub credit_awarded: u64,
}

#[cw_serde]
pub struct UseCreditsResponse {
    pub success: bool,
    pub remaining_credits: u64,
}

#[cw_serde]
pub struct ReferralStatsResponse {
    /// Redemptions in the open cycle
    pub current_progress: u32,
    pub total_credits: u64,
    pub total_referrals: u32,
    pub completed_cycles: u32,
    pub max_cycles: u32,
}

#[cw_serde]
pub struct ReferredAccount {
    pub id: String,
    pub code: String,
    pub redeemed_at: u64,
}

#[cw_serde]
pub struct ReferredAccountsResponse {
    pub accounts: Vec<ReferredAccount>,
}

#[cw_serde]
pub struct CreditsResponse {
    pub credits: u64,
}

#[cw_serde]
pub struct ReferralResponse {
    pub id: u64,
    pub referrer_code: String,
    pub referee_id: String,
    pub referee_code: String,
    pub created_at: u64,
    pub status: ReferralStatus,
}

impl From<Referral> for ReferralResponse {
    fn from(referral: Referral) -> Self {
        ReferralResponse {
            id: referral.id,
            referrer_code: referral.referrer_code,
            referee_id: referral.referee_id,
            referee_code: referral.referee_code,
            created_at: referral.created_at,
            status: referral.status,
        }
    }
}

#[cw_serde]
pub struct SyncStatusResponse {
    pub queued: u32,
    pub pending: u32,
    pub enqueued: u64,
    pub delivered: u64,
    pub failed_deliveries: u64,
    pub dropped: u64,
    pub last_flush_height: Option<u64>,
}
