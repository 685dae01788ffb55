use cosmwasm_schema::cw_serde;
use cosmwasm_std::Addr;
use cw_storage_plus::Item;

#[cw_serde]
pub struct Config {
    /// Referral ledger holding credit balances
    pub ledger: Addr,
    /// Subscription service answering `IsSubscribed`
    pub subscriptions: Addr,
}

/// Configuration storage
pub const CONFIG: Item<Config> = Item::new("config");
