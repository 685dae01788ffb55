use cosmwasm_std::{
    entry_point, to_json_binary, Addr, Binary, Deps, DepsMut, Env, MessageInfo, Order, Reply,
    Response, StdError, StdResult, Storage,
};
use cw2::set_contract_version;
use cw_storage_plus::Bound;
use referral_shared::{normalize, ReferralCode};
use sha2::{Digest, Sha256};

use crate::directory::{local_owner, resolve_owner};
use crate::error::ContractError;
use crate::msg::{
    AccountResponse, ConfigResponse, CreditsResponse, ExecuteMsg, InstantiateMsg, QueryMsg,
    RedeemResponse, ReferralResponse, ReferralStatsResponse, ReferredAccount,
    ReferredAccountsResponse, UseCreditsResponse,
};
use crate::state::{
    accounts, referrals, Account, Config, Referral, ReferralStatus, SyncScheduler, CONFIG,
    NEXT_REFERRAL_ID, NEXT_SYNC_REPLY_ID, SYNC_SCHEDULER,
};
use crate::sync;

const CONTRACT_NAME: &str = "crates.io:referral-ledger";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_REFERRALS_PER_CYCLE: u32 = 3;
const DEFAULT_CYCLE_REWARD: u64 = 5;
const DEFAULT_MAX_CYCLES: u32 = 5;
const DEFAULT_WELCOME_CREDIT: u64 = 1;
const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 10;
const DEFAULT_SYNC_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_SYNC_RETRY_BACKOFF: u64 = 10; // blocks
const DEFAULT_SYNC_FLUSH_INTERVAL: u64 = 0;

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 30;

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let admin = match msg.admin {
        Some(admin) => deps.api.addr_validate(&admin)?,
        None => info.sender,
    };
    let directory = msg
        .directory
        .map(|addr| deps.api.addr_validate(&addr))
        .transpose()?;
    let spenders = validate_addrs(deps.as_ref(), msg.spenders.unwrap_or_default())?;

    let config = Config {
        admin,
        directory,
        spenders,
        referrals_per_cycle: msg.referrals_per_cycle.unwrap_or(DEFAULT_REFERRALS_PER_CYCLE),
        cycle_reward: msg.cycle_reward.unwrap_or(DEFAULT_CYCLE_REWARD),
        max_cycles: msg.max_cycles.unwrap_or(DEFAULT_MAX_CYCLES),
        welcome_credit: msg.welcome_credit.unwrap_or(DEFAULT_WELCOME_CREDIT),
        max_code_attempts: msg.max_code_attempts.unwrap_or(DEFAULT_MAX_CODE_ATTEMPTS),
        sync_max_attempts: msg.sync_max_attempts.unwrap_or(DEFAULT_SYNC_MAX_ATTEMPTS),
        sync_retry_backoff: msg.sync_retry_backoff.unwrap_or(DEFAULT_SYNC_RETRY_BACKOFF),
        sync_flush_interval: msg.sync_flush_interval.unwrap_or(DEFAULT_SYNC_FLUSH_INTERVAL),
    };
    validate_config(&config)?;
    CONFIG.save(deps.storage, &config)?;

    NEXT_REFERRAL_ID.save(deps.storage, &1u64)?;
    NEXT_SYNC_REPLY_ID.save(deps.storage, &1u64)?;
    SYNC_SCHEDULER.save(deps.storage, &SyncScheduler::default())?;

    Ok(Response::new()
        .add_attribute("method", "instantiate")
        .add_attribute("admin", config.admin)
        .add_attribute("referrals_per_cycle", config.referrals_per_cycle.to_string())
        .add_attribute("cycle_reward", config.cycle_reward.to_string())
        .add_attribute("max_cycles", config.max_cycles.to_string()))
}

fn validate_addrs(deps: Deps, addrs: Vec<String>) -> StdResult<Vec<Addr>> {
    addrs
        .iter()
        .map(|addr| deps.api.addr_validate(addr))
        .collect()
}

fn validate_config(config: &Config) -> Result<(), ContractError> {
    if config.referrals_per_cycle == 0 {
        return Err(ContractError::InvalidConfig {
            reason: "referrals_per_cycle must be positive".to_string(),
        });
    }
    if config.max_code_attempts == 0 {
        return Err(ContractError::InvalidConfig {
            reason: "max_code_attempts must be positive".to_string(),
        });
    }
    if config.sync_max_attempts == 0 {
        return Err(ContractError::InvalidConfig {
            reason: "sync_max_attempts must be positive".to_string(),
        });
    }
    Ok(())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::CreateOrGetAccount {} => execute_create_or_get_account(deps, env, info),
        ExecuteMsg::RedeemReferralCode { code } => {
            execute_redeem_referral_code(deps, env, info, code)
        }
        ExecuteMsg::UseCredits { account, amount } => {
            execute_use_credits(deps, env, info, account, amount)
        }
        ExecuteMsg::UpdateConfig {
            directory,
            spenders,
            sync_max_attempts,
            sync_retry_backoff,
            sync_flush_interval,
        } => execute_update_config(
            deps,
            info,
            directory,
            spenders,
            sync_max_attempts,
            sync_retry_backoff,
            sync_flush_interval,
        ),
        ExecuteMsg::FlushSync { limit } => sync::execute_flush_sync(deps, env, limit),
        ExecuteMsg::ResetSync {} => sync::execute_reset_sync(deps, info),
    }
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn reply(deps: DepsMut, env: Env, msg: Reply) -> Result<Response, ContractError> {
    sync::handle_sync_reply(deps, env, msg)
}

/// Entropy for the `attempt`-th code tried for `account_id` in this block.
pub fn code_entropy(env: &Env, account_id: &str, attempt: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(account_id.as_bytes());
    hasher.update(env.block.height.to_be_bytes());
    hasher.update(env.block.time.nanos().to_be_bytes());
    if let Some(tx) = &env.transaction {
        hasher.update(tx.index.to_be_bytes());
    }
    hasher.update(attempt.to_be_bytes());
    hasher.finalize().into()
}

/// Generate-and-check loop against the code index, bounded by `max_attempts`.
/// An attempt whose entropy yields no code counts as a collision.
fn generate_unique_code(
    storage: &dyn Storage,
    env: &Env,
    account_id: &str,
    max_attempts: u32,
) -> Result<ReferralCode, ContractError> {
    for attempt in 0..max_attempts {
        let code = match ReferralCode::generate(&code_entropy(env, account_id, attempt)) {
            Some(code) => code,
            None => continue,
        };
        if local_owner(storage, code.as_str())?.is_none() {
            return Ok(code);
        }
    }
    Err(ContractError::CodeGenerationExhausted {
        attempts: max_attempts,
    })
}

fn add_credits(balance: u64, amount: u64) -> StdResult<u64> {
    balance
        .checked_add(amount)
        .ok_or_else(|| StdError::generic_err("Credit balance overflow"))
}

pub fn execute_create_or_get_account(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let id = info.sender.to_string();

    let (account, created) = match accounts().may_load(deps.storage, &id)? {
        Some(account) => (account, false),
        None => {
            let code = generate_unique_code(deps.storage, &env, &id, config.max_code_attempts)
                .map_err(|err| {
                    deps.api
                        .debug(&format!("referral code generation failed for {}: {}", id, err));
                    err
                })?;

            let account = Account {
                id: id.clone(),
                referral_code: code.into_string(),
                credits: 0,
                used_referral_code: None,
                created_at: env.block.time.seconds(),
            };
            // The unique code index rejects a colliding write
            accounts().save(deps.storage, &id, &account)?;
            (account, true)
        }
    };

    let sync_queued = sync::enqueue(deps.storage, &config, &env, &id)?;

    Ok(Response::new()
        .set_data(to_json_binary(&AccountResponse::from(account.clone()))?)
        .add_attribute("method", "create_or_get_account")
        .add_attribute("account", id)
        .add_attribute("referral_code", account.referral_code)
        .add_attribute("created", created.to_string())
        .add_attribute("sync_queued", sync_queued.to_string()))
}

/// Result of closing (or not) the owner's current cycle.
enum CycleOutcome {
    Open,
    Rewarded,
    MaxReached,
}

impl CycleOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Open => "open",
            CycleOutcome::Rewarded => "rewarded",
            CycleOutcome::MaxReached => "max_reached",
        }
    }
}

pub fn execute_redeem_referral_code(
    mut deps: DepsMut,
    env: Env,
    info: MessageInfo,
    code: String,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let referee_id = info.sender.to_string();
    let referee = accounts().may_load(deps.storage, &referee_id)?;

    if let Some(referee) = &referee {
        if referee.used_referral_code.is_some() {
            return Err(ContractError::AlreadyUsed {});
        }
    }

    let code = ReferralCode::parse(&normalize(&code))
        .map_err(|_| ContractError::InvalidFormat {})?
        .into_string();

    let owner = resolve_owner(deps.branch(), &config, &code)?.ok_or(ContractError::CodeNotFound {})?;

    if owner.id == referee_id {
        return Err(ContractError::SelfReferral {});
    }

    let mut referee = match referee {
        Some(referee) => referee,
        None => {
            deps.api
                .debug(&format!("redeem by {} without an account", referee_id));
            return Err(ContractError::RefereeNotFound {});
        }
    };

    if referrals()
        .idx
        .referee
        .item(deps.storage, referee_id.clone())?
        .is_some()
    {
        return Err(ContractError::AlreadyRedeemed {});
    }

    referee.used_referral_code = Some(code.clone());
    referee.credits = add_credits(referee.credits, config.welcome_credit)?;
    accounts().save(deps.storage, &referee_id, &referee)?;

    let referral_id = NEXT_REFERRAL_ID.load(deps.storage)?;
    NEXT_REFERRAL_ID.save(deps.storage, &(referral_id + 1))?;

    let referral = Referral {
        id: referral_id,
        referrer_code: code.clone(),
        referee_id: referee_id.clone(),
        referee_code: referee.referral_code.clone(),
        created_at: env.block.time.seconds(),
        status: ReferralStatus::Completed,
    };
    // The unique referee index rejects a second row for the same account
    referrals().save(deps.storage, referral_id, &referral)?;

    let outcome = close_cycle_if_full(deps.storage, &config, &code, &owner.id)?;

    sync::enqueue(deps.storage, &config, &env, &referee_id)?;
    sync::enqueue(deps.storage, &config, &env, &owner.id)?;

    Ok(Response::new()
        .set_data(to_json_binary(&RedeemResponse {
            success: true,
            credit_awarded: config.welcome_credit,
        })?)
        .add_attribute("method", "redeem_referral_code")
        .add_attribute("referee", referee_id)
        .add_attribute("referrer", owner.id)
        .add_attribute("referral_code", code)
        .add_attribute("credit_awarded", config.welcome_credit.to_string())
        .add_attribute("cycle_outcome", outcome.as_str()))
}

/// Archives the open batch once it holds `referrals_per_cycle` rows, paying
/// the owner while cycles remain.
fn close_cycle_if_full(
    storage: &mut dyn Storage,
    config: &Config,
    code: &str,
    owner_id: &str,
) -> Result<CycleOutcome, ContractError> {
    let open = referrals_with_status(storage, code, &ReferralStatus::Completed)?;
    if (open.len() as u32) < config.referrals_per_cycle {
        return Ok(CycleOutcome::Open);
    }

    let completed_cycles =
        count_with_status(storage, code, &ReferralStatus::Rewarded) / config.referrals_per_cycle;

    let (status, outcome) = if completed_cycles < config.max_cycles {
        accounts().update(storage, owner_id, |maybe_owner| -> Result<_, ContractError> {
            let mut owner = maybe_owner.ok_or(ContractError::CodeNotFound {})?;
            owner.credits = add_credits(owner.credits, config.cycle_reward)?;
            Ok(owner)
        })?;
        (ReferralStatus::Rewarded, CycleOutcome::Rewarded)
    } else {
        (ReferralStatus::MaxReached, CycleOutcome::MaxReached)
    };

    for (id, mut referral) in open {
        referral.status = status.clone();
        referrals().save(storage, id, &referral)?;
    }

    Ok(outcome)
}

fn referrals_with_status(
    storage: &dyn Storage,
    code: &str,
    status: &ReferralStatus,
) -> StdResult<Vec<(u64, Referral)>> {
    referrals()
        .idx
        .code_status
        .prefix((code.to_string(), status.as_str().to_string()))
        .range(storage, None, None, Order::Ascending)
        .collect()
}

fn count_with_status(storage: &dyn Storage, code: &str, status: &ReferralStatus) -> u32 {
    referrals()
        .idx
        .code_status
        .prefix((code.to_string(), status.as_str().to_string()))
        .keys(storage, None, None, Order::Ascending)
        .count() as u32
}

pub fn execute_use_credits(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    account: Option<String>,
    amount: u64,
) -> Result<Response, ContractError> {
    if amount == 0 {
        return Err(ContractError::InvalidAmount {});
    }

    let config = CONFIG.load(deps.storage)?;
    let account_id = match account {
        Some(id) if id != info.sender.as_str() => {
            if !config.spenders.contains(&info.sender) {
                return Err(ContractError::Unauthorized {});
            }
            id
        }
        _ => info.sender.to_string(),
    };

    let balance = accounts()
        .may_load(deps.storage, &account_id)?
        .map(|account| account.credits)
        .unwrap_or(0);
    if balance < amount {
        return Err(ContractError::InsufficientCredits {});
    }

    let remaining = debit_credits(deps.storage, &account_id, amount)?;
    sync::enqueue(deps.storage, &config, &env, &account_id)?;

    Ok(Response::new()
        .set_data(to_json_binary(&UseCreditsResponse {
            success: true,
            remaining_credits: remaining,
        })?)
        .add_attribute("method", "use_credits")
        .add_attribute("account", account_id)
        .add_attribute("spender", info.sender)
        .add_attribute("amount", amount.to_string())
        .add_attribute("remaining_credits", remaining.to_string()))
}

/// Conditional decrement: applies only if the stored balance still covers
/// `amount` at write time. Never retries.
pub fn debit_credits(
    storage: &mut dyn Storage,
    account_id: &str,
    amount: u64,
) -> Result<u64, ContractError> {
    let account = accounts().update(storage, account_id, |maybe_account| {
        let mut account = maybe_account.ok_or(ContractError::InsufficientCredits {})?;
        if account.credits < amount {
            return Err(ContractError::InsufficientCredits {});
        }
        account.credits -= amount;
        Ok(account)
    })?;
    Ok(account.credits)
}

pub fn execute_update_config(
    deps: DepsMut,
    info: MessageInfo,
    directory: Option<String>,
    spenders: Option<Vec<String>>,
    sync_max_attempts: Option<u32>,
    sync_retry_backoff: Option<u64>,
    sync_flush_interval: Option<u64>,
) -> Result<Response, ContractError> {
    let mut config = CONFIG.load(deps.storage)?;
    if info.sender != config.admin {
        return Err(ContractError::Unauthorized {});
    }

    if let Some(directory) = directory {
        config.directory = if directory.is_empty() {
            None
        } else {
            Some(deps.api.addr_validate(&directory)?)
        };
    }
    if let Some(spenders) = spenders {
        config.spenders = validate_addrs(deps.as_ref(), spenders)?;
    }
    if let Some(attempts) = sync_max_attempts {
        config.sync_max_attempts = attempts;
    }
    if let Some(backoff) = sync_retry_backoff {
        config.sync_retry_backoff = backoff;
    }
    if let Some(interval) = sync_flush_interval {
        config.sync_flush_interval = interval;
    }
    validate_config(&config)?;
    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("method", "update_config")
        .add_attribute(
            "directory",
            config
                .directory
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".to_string()),
        )
        .add_attribute("spenders", config.spenders.len().to_string()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Config {} => to_json_binary(&query_config(deps)?),
        QueryMsg::Account { id } => to_json_binary(&query_account(deps, id)?),
        QueryMsg::AccountByCode { code } => to_json_binary(&query_account_by_code(deps, code)?),
        QueryMsg::ReferralStats { owner } => to_json_binary(&query_referral_stats(deps, owner)?),
        QueryMsg::ReferredAccounts {
            owner,
            start_after,
            limit,
        } => to_json_binary(&query_referred_accounts(deps, owner, start_after, limit)?),
        QueryMsg::Credits { account } => to_json_binary(&query_credits(deps, account)?),
        QueryMsg::ReferralOf { referee } => to_json_binary(&query_referral_of(deps, referee)?),
        QueryMsg::SyncStatus {} => to_json_binary(&sync::query_sync_status(deps)?),
    }
}

fn query_config(deps: Deps) -> StdResult<ConfigResponse> {
    let config = CONFIG.load(deps.storage)?;
    Ok(ConfigResponse {
        admin: config.admin,
        directory: config.directory,
        spenders: config.spenders,
        referrals_per_cycle: config.referrals_per_cycle,
        cycle_reward: config.cycle_reward,
        max_cycles: config.max_cycles,
        welcome_credit: config.welcome_credit,
        max_code_attempts: config.max_code_attempts,
        sync_max_attempts: config.sync_max_attempts,
        sync_retry_backoff: config.sync_retry_backoff,
        sync_flush_interval: config.sync_flush_interval,
    })
}

fn query_account(deps: Deps, id: String) -> StdResult<Option<AccountResponse>> {
    Ok(accounts()
        .may_load(deps.storage, &id)?
        .map(AccountResponse::from))
}

fn query_account_by_code(deps: Deps, code: String) -> StdResult<Option<AccountResponse>> {
    Ok(local_owner(deps.storage, &normalize(&code))?.map(AccountResponse::from))
}

fn query_referral_stats(deps: Deps, owner: String) -> StdResult<ReferralStatsResponse> {
    let config = CONFIG.load(deps.storage)?;
    let account = match accounts().may_load(deps.storage, &owner)? {
        Some(account) => account,
        None => {
            return Ok(ReferralStatsResponse {
                current_progress: 0,
                total_credits: 0,
                total_referrals: 0,
                completed_cycles: 0,
                max_cycles: config.max_cycles,
            })
        }
    };
    let code = account.referral_code.as_str();

    let current_progress = count_with_status(deps.storage, code, &ReferralStatus::Completed);
    let rewarded = count_with_status(deps.storage, code, &ReferralStatus::Rewarded);
    let total_referrals = referrals()
        .idx
        .code_status
        .sub_prefix(code.to_string())
        .keys(deps.storage, None, None, Order::Ascending)
        .count() as u32;

    Ok(ReferralStatsResponse {
        current_progress,
        total_credits: account.credits,
        total_referrals,
        completed_cycles: rewarded / config.referrals_per_cycle,
        max_cycles: config.max_cycles,
    })
}

fn query_referred_accounts(
    deps: Deps,
    owner: String,
    start_after: Option<u64>,
    limit: Option<u32>,
) -> StdResult<ReferredAccountsResponse> {
    let account = match accounts().may_load(deps.storage, &owner)? {
        Some(account) => account,
        None => return Ok(ReferredAccountsResponse { accounts: vec![] }),
    };
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start = start_after.map(Bound::exclusive);

    let accounts: Vec<ReferredAccount> = referrals()
        .idx
        .code_status
        .prefix((
            account.referral_code,
            ReferralStatus::Completed.as_str().to_string(),
        ))
        .range(deps.storage, start, None, Order::Ascending)
        .take(limit)
        .map(|item| {
            let (_, referral) = item?;
            Ok(ReferredAccount {
                id: referral.referee_id,
                code: referral.referee_code,
                redeemed_at: referral.created_at,
            })
        })
        .collect::<StdResult<_>>()?;

    Ok(ReferredAccountsResponse { accounts })
}

fn query_credits(deps: Deps, account: String) -> StdResult<CreditsResponse> {
    let credits = accounts()
        .may_load(deps.storage, &account)?
        .map(|account| account.credits)
        .unwrap_or(0);
    Ok(CreditsResponse { credits })
}

fn query_referral_of(deps: Deps, referee: String) -> StdResult<Option<ReferralResponse>> {
    Ok(referrals()
        .idx
        .referee
        .item(deps.storage, referee)?
        .map(|(_, referral)| ReferralResponse::from(referral)))
}
