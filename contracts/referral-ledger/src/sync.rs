//! Out-of-band delivery of account snapshots to the remote directory.
//!
//! Ledger operations only push a [`SyncTask`] onto a storage queue. A
//! separate `FlushSync` call drains the queue, sending one sub-message per
//! task with `reply_always`; the reply handler records the outcome and
//! re-queues failures with exponential backoff. A failed delivery never
//! reverts the flush, and nothing here can fail a ledger operation.

use cosmwasm_std::{
    to_json_binary, Deps, DepsMut, Env, MessageInfo, Order, Reply, Response, StdResult, Storage,
    SubMsg, SubMsgResult, WasmMsg,
};
use referral_shared::directory::DirectoryExecuteMsg;

use crate::error::ContractError;
use crate::msg::SyncStatusResponse;
use crate::state::{
    accounts, Config, SyncScheduler, SyncTask, CONFIG, NEXT_SYNC_REPLY_ID, PENDING_SYNCS,
    SYNC_QUEUE, SYNC_SCHEDULER,
};

const DEFAULT_FLUSH_LIMIT: u32 = 10;
const MAX_FLUSH_LIMIT: u32 = 50;
// Caps the backoff shift so the multiplier stays within u64
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Queue a sync of `account_id`. Does nothing when no directory is set.
pub fn enqueue(
    storage: &mut dyn Storage,
    config: &Config,
    env: &Env,
    account_id: &str,
) -> StdResult<bool> {
    if config.directory.is_none() {
        return Ok(false);
    }

    SYNC_QUEUE.push_back(
        storage,
        &SyncTask {
            account_id: account_id.to_string(),
            attempts: 0,
            not_before: env.block.height,
        },
    )?;
    SYNC_SCHEDULER.update(storage, |mut scheduler| -> StdResult<_> {
        scheduler.enqueued += 1;
        Ok(scheduler)
    })?;

    Ok(true)
}

pub fn execute_flush_sync(
    deps: DepsMut,
    env: Env,
    limit: Option<u32>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let mut scheduler = SYNC_SCHEDULER.load(deps.storage)?;

    if let Some(last) = scheduler.last_flush_height {
        let next_height = last.saturating_add(config.sync_flush_interval);
        if config.sync_flush_interval > 0 && env.block.height < next_height {
            return Err(ContractError::SyncRateLimited { next_height });
        }
    }

    let directory = match config.directory {
        Some(directory) => directory,
        None => {
            return Ok(Response::new()
                .add_attribute("method", "flush_sync")
                .add_attribute("dispatched", "0")
                .add_attribute("skipped", "no_directory"))
        }
    };

    let limit = limit.unwrap_or(DEFAULT_FLUSH_LIMIT).min(MAX_FLUSH_LIMIT) as usize;
    // Every task present now is looked at most once; deferred ones go to the back
    let queued = SYNC_QUEUE.len(deps.storage)?;

    let mut messages: Vec<SubMsg> = vec![];
    let mut deferred = 0u32;
    for _ in 0..queued {
        if messages.len() >= limit {
            break;
        }
        let task = match SYNC_QUEUE.pop_front(deps.storage)? {
            Some(task) => task,
            None => break,
        };

        if task.not_before > env.block.height {
            SYNC_QUEUE.push_back(deps.storage, &task)?;
            deferred += 1;
            continue;
        }

        let account = match accounts().may_load(deps.storage, &task.account_id)? {
            Some(account) => account,
            None => {
                scheduler.dropped += 1;
                deps.api.debug(&format!(
                    "dropping directory sync of {}: account not found",
                    task.account_id
                ));
                continue;
            }
        };

        let reply_id = NEXT_SYNC_REPLY_ID.load(deps.storage)?;
        NEXT_SYNC_REPLY_ID.save(deps.storage, &(reply_id + 1))?;
        PENDING_SYNCS.save(deps.storage, reply_id, &task)?;

        let msg = WasmMsg::Execute {
            contract_addr: directory.to_string(),
            msg: to_json_binary(&DirectoryExecuteMsg::SyncAccount {
                id: account.id,
                referral_code: account.referral_code,
                credits: account.credits,
                created_at: account.created_at,
                used_referral_code: account.used_referral_code,
            })?,
            funds: vec![],
        };
        messages.push(SubMsg::reply_always(msg, reply_id));
    }

    scheduler.last_flush_height = Some(env.block.height);
    SYNC_SCHEDULER.save(deps.storage, &scheduler)?;

    Ok(Response::new()
        .add_attribute("method", "flush_sync")
        .add_attribute("dispatched", messages.len().to_string())
        .add_attribute("deferred", deferred.to_string())
        .add_submessages(messages))
}

/// Records a delivery outcome. Always succeeds so the flush is never reverted.
pub fn handle_sync_reply(deps: DepsMut, env: Env, reply: Reply) -> Result<Response, ContractError> {
    let task = match PENDING_SYNCS.may_load(deps.storage, reply.id)? {
        Some(task) => task,
        None => {
            return Ok(Response::new()
                .add_attribute("method", "sync_reply")
                .add_attribute("outcome", "unknown_reply"))
        }
    };
    PENDING_SYNCS.remove(deps.storage, reply.id);

    let config = CONFIG.load(deps.storage)?;
    let mut scheduler = SYNC_SCHEDULER.load(deps.storage)?;

    let outcome = match reply.result {
        SubMsgResult::Ok(_) => {
            scheduler.delivered += 1;
            "delivered"
        }
        SubMsgResult::Err(err) => {
            scheduler.failed_deliveries += 1;
            let attempts = task.attempts + 1;
            if attempts >= config.sync_max_attempts {
                scheduler.dropped += 1;
                deps.api.debug(&format!(
                    "dropping directory sync of {} after {} attempts: {}",
                    task.account_id, attempts, err
                ));
                "dropped"
            } else {
                let shift = (attempts - 1).min(MAX_BACKOFF_SHIFT);
                let backoff = config.sync_retry_backoff.saturating_mul(1u64 << shift);
                SYNC_QUEUE.push_back(
                    deps.storage,
                    &SyncTask {
                        account_id: task.account_id.clone(),
                        attempts,
                        not_before: env.block.height.saturating_add(backoff),
                    },
                )?;
                "retry"
            }
        }
    };
    SYNC_SCHEDULER.save(deps.storage, &scheduler)?;

    Ok(Response::new()
        .add_attribute("method", "sync_reply")
        .add_attribute("account", task.account_id)
        .add_attribute("outcome", outcome))
}

pub fn execute_reset_sync(deps: DepsMut, info: MessageInfo) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.admin {
        return Err(ContractError::Unauthorized {});
    }

    let mut cleared = 0u32;
    while SYNC_QUEUE.pop_front(deps.storage)?.is_some() {
        cleared += 1;
    }

    let pending: Vec<u64> = PENDING_SYNCS
        .keys(deps.storage, None, None, Order::Ascending)
        .collect::<StdResult<_>>()?;
    for reply_id in &pending {
        PENDING_SYNCS.remove(deps.storage, *reply_id);
    }

    SYNC_SCHEDULER.save(deps.storage, &SyncScheduler::default())?;

    Ok(Response::new()
        .add_attribute("method", "reset_sync")
        .add_attribute("cleared", cleared.to_string())
        .add_attribute("pending_cleared", pending.len().to_string()))
}

pub fn query_sync_status(deps: Deps) -> StdResult<SyncStatusResponse> {
    let scheduler = SYNC_SCHEDULER.load(deps.storage)?;
    let pending = PENDING_SYNCS
        .keys(deps.storage, None, None, Order::Ascending)
        .count() as u32;

    Ok(SyncStatusResponse {
        queued: SYNC_QUEUE.len(deps.storage)?,
        pending,
        enqueued: scheduler.enqueued,
        delivered: scheduler.delivered,
        failed_deliveries: scheduler.failed_deliveries,
        dropped: scheduler.dropped,
        last_flush_height: scheduler.last_flush_height,
    })
}
