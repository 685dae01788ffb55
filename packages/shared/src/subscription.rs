//! Query contract of the subscription service consulted by the access gate.

use cosmwasm_schema::{cw_serde, QueryResponses};

#[cw_serde]
#[derive(QueryResponses)]
pub enum SubscriptionQueryMsg {
    /// Whether the account currently holds an active subscription
    #[returns(SubscriptionStatusResponse)]
    IsSubscribed { account: String },
}

#[cw_serde]
pub struct SubscriptionStatusResponse {
    pub active: bool,
}
