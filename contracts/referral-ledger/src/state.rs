use cosmwasm_schema::cw_serde;
use cosmwasm_std::Addr;
use cw_storage_plus::{Deque, Index, IndexList, IndexedMap, Item, Map, MultiIndex, UniqueIndex};

#[cw_serde]
pub struct Config {
    /// May update config and reset the sync scheduler
    pub admin: Addr,
    /// Remote directory used for cross-device code lookup and sync
    pub directory: Option<Addr>,
    /// Contracts allowed to spend credits on behalf of an account
    pub spenders: Vec<Addr>,
    /// Redemptions that close one cycle
    pub referrals_per_cycle: u32,
    /// Credits paid to the code owner per completed cycle
    pub cycle_reward: u64,
    /// Lifetime cap on rewarded cycles per code
    pub max_cycles: u32,
    /// Credits granted to the referee on every redemption
    pub welcome_credit: u64,
    /// Attempts at generating an unused referral code
    pub max_code_attempts: u32,
    /// Deliveries attempted per sync task before it is dropped
    pub sync_max_attempts: u32,
    /// Base backoff in blocks, doubled on every failed delivery
    pub sync_retry_backoff: u64,
    /// Minimum blocks between two flushes (0 = unlimited)
    pub sync_flush_interval: u64,
}

#[cw_serde]
pub struct Account {
    /// Opaque id from the identity provider
    pub id: String,
    /// Own referral code (unique)
    pub referral_code: String,
    /// Spendable balance
    pub credits: u64,
    /// Code this account redeemed; set once
    pub used_referral_code: Option<String>,
    /// Creation time (seconds)
    pub created_at: u64,
}

#[cw_serde]
pub enum ReferralStatus {
    Completed,
    Rewarded,
    MaxReached,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Completed => "completed",
            ReferralStatus::Rewarded => "rewarded",
            ReferralStatus::MaxReached => "max_reached",
        }
    }
}

#[cw_serde]
pub struct Referral {
    pub id: u64,
    /// Code that was redeemed
    pub referrer_code: String,
    /// Account that redeemed it
    pub referee_id: String,
    /// Referee's own code, kept for reporting
    pub referee_code: String,
    /// Redemption time (seconds)
    pub created_at: u64,
    pub status: ReferralStatus,
}

#[cw_serde]
pub struct SyncTask {
    pub account_id: String,
    /// Failed deliveries so far
    pub attempts: u32,
    /// Earliest block height for the next delivery
    pub not_before: u64,
}

/// Bookkeeping of the out-of-band directory sync worker.
#[cw_serde]
#[derive(Default)]
pub struct SyncScheduler {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed_deliveries: u64,
    pub dropped: u64,
    /// Height of the last flush, None before the first one
    pub last_flush_height: Option<u64>,
}

pub struct AccountIndexes<'a> {
    pub referral_code: UniqueIndex<'a, String, Account, String>,
}

impl<'a> IndexList<Account> for AccountIndexes<'a> {
    fn get_indexes(&'_ self) -> Box<dyn Iterator<Item = &'_ dyn Index<Account>> + '_> {
        let v: Vec<&dyn Index<Account>> = vec![&self.referral_code];
        Box::new(v.into_iter())
    }
}

/// Accounts by id, unique on referral code
pub fn accounts<'a>() -> IndexedMap<'a, &'a str, Account, AccountIndexes<'a>> {
    let indexes = AccountIndexes {
        referral_code: UniqueIndex::new(|a: &Account| a.referral_code.clone(), "accounts__code"),
    };
    IndexedMap::new("accounts", indexes)
}

pub struct ReferralIndexes<'a> {
    pub referee: UniqueIndex<'a, String, Referral, u64>,
    pub code_status: MultiIndex<'a, (String, String), Referral, u64>,
}

impl<'a> IndexList<Referral> for ReferralIndexes<'a> {
    fn get_indexes(&'_ self) -> Box<dyn Iterator<Item = &'_ dyn Index<Referral>> + '_> {
        let v: Vec<&dyn Index<Referral>> = vec![&self.referee, &self.code_status];
        Box::new(v.into_iter())
    }
}

/// Referral rows by id, unique on referee and indexed by (code, status)
pub fn referrals<'a>() -> IndexedMap<'a, u64, Referral, ReferralIndexes<'a>> {
    let indexes = ReferralIndexes {
        referee: UniqueIndex::new(|r: &Referral| r.referee_id.clone(), "referrals__referee"),
        code_status: MultiIndex::new(
            |_pk: &[u8], r: &Referral| (r.referrer_code.clone(), r.status.as_str().to_string()),
            "referrals",
            "referrals__code_status",
        ),
    };
    IndexedMap::new("referrals", indexes)
}

/// Configuration storage
pub const CONFIG: Item<Config> = Item::new("config");

/// Next referral row ID
pub const NEXT_REFERRAL_ID: Item<u64> = Item::new("next_referral_id");

/// Directory sync work queue
pub const SYNC_QUEUE: Deque<SyncTask> = Deque::new("sync_queue");

/// Sync deliveries awaiting a reply, by reply id
pub const PENDING_SYNCS: Map<u64, SyncTask> = Map::new("pending_syncs");

/// Next reply id handed to a sync delivery
pub const NEXT_SYNC_REPLY_ID: Item<u64> = Item::new("next_sync_reply_id");

pub const SYNC_SCHEDULER: Item<SyncScheduler> = Item::new("sync_scheduler");
