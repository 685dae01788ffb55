//! Messages understood by the remote referral directory, the cross-device
//! service mapping referral codes to the accounts that own them.

use cosmwasm_schema::{cw_serde, QueryResponses};

#[cw_serde]
pub struct DirectoryAccountData {
    pub referral_code: String,
    pub credits: u64,
    pub created_at: u64,
}

#[cw_serde]
pub struct DirectoryEntry {
    /// Account id as issued by the identity provider
    pub id: String,
    pub data: DirectoryAccountData,
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum DirectoryQueryMsg {
    /// Find the account owning a referral code
    #[returns(Option<DirectoryEntry>)]
    LookupByReferralCode { code: String },
}

#[cw_serde]
pub enum DirectoryExecuteMsg {
    /// Upsert the directory's copy of an account
    SyncAccount {
        id: String,
        referral_code: String,
        credits: u64,
        created_at: u64,
        used_referral_code: Option<String>,
    },
}
