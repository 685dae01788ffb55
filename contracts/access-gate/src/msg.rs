use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::Addr;

#[cw_serde]
pub struct InstantiateMsg {
    pub ledger: String,
    pub subscriptions: String,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Pass the gate: free while subscribed, otherwise one credit
    Consume {},
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// Get configuration
    #[returns(ConfigResponse)]
    Config {},

    /// Whether the account may perform a gated action now
    #[returns(CanCreateResponse)]
    CanCreate { account: String },
}

// Response types

#[cw_serde]
pub struct ConfigResponse {
    pub ledger: Addr,
    pub subscriptions: Addr,
}

#[cw_serde]
pub struct CanCreateResponse {
    pub allowed: bool,
    pub subscribed: bool,
    pub credits: u64,
}

#[cw_serde]
pub struct ConsumeResponse {
    pub success: bool,
    pub via_subscription: bool,
    /// Balance after the debit; None when the subscription covered it
    pub remaining_credits: Option<u64>,
}
