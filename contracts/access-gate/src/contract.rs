use cosmwasm_std::{
    entry_point, to_json_binary, Binary, Deps, DepsMut, Env, MessageInfo, Response, StdResult,
    WasmMsg,
};
use cw2::set_contract_version;
use referral_ledger::msg::{
    CreditsResponse, ExecuteMsg as LedgerExecuteMsg, QueryMsg as LedgerQueryMsg,
};
use referral_shared::subscription::{SubscriptionQueryMsg, SubscriptionStatusResponse};

use crate::error::ContractError;
use crate::msg::{
    CanCreateResponse, ConfigResponse, ConsumeResponse, ExecuteMsg, InstantiateMsg, QueryMsg,
};
use crate::state::{Config, CONFIG};

const CONTRACT_NAME: &str = "crates.io:access-gate";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Credits debited per gated action
const CREDITS_PER_ACTION: u64 = 1;

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let config = Config {
        ledger: deps.api.addr_validate(&msg.ledger)?,
        subscriptions: deps.api.addr_validate(&msg.subscriptions)?,
    };
    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("method", "instantiate")
        .add_attribute("ledger", config.ledger)
        .add_attribute("subscriptions", config.subscriptions))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::Consume {} => execute_consume(deps, info),
    }
}

fn is_subscribed(deps: Deps, config: &Config, account: &str) -> StdResult<bool> {
    let status: SubscriptionStatusResponse = deps.querier.query_wasm_smart(
        &config.subscriptions,
        &SubscriptionQueryMsg::IsSubscribed {
            account: account.to_string(),
        },
    )?;
    Ok(status.active)
}

fn ledger_credits(deps: Deps, config: &Config, account: &str) -> StdResult<u64> {
    let res: CreditsResponse = deps.querier.query_wasm_smart(
        &config.ledger,
        &LedgerQueryMsg::Credits {
            account: account.to_string(),
        },
    )?;
    Ok(res.credits)
}

pub fn execute_consume(deps: DepsMut, info: MessageInfo) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let account = info.sender.to_string();

    if is_subscribed(deps.as_ref(), &config, &account)? {
        return Ok(Response::new()
            .set_data(to_json_binary(&ConsumeResponse {
                success: true,
                via_subscription: true,
                remaining_credits: None,
            })?)
            .add_attribute("method", "consume")
            .add_attribute("account", account)
            .add_attribute("via", "subscription"));
    }

    let credits = ledger_credits(deps.as_ref(), &config, &account)?;
    if credits < CREDITS_PER_ACTION {
        return Err(ContractError::InsufficientCredits {});
    }

    // The ledger re-checks the balance when it applies the debit; a failure
    // there aborts this whole call.
    let debit = WasmMsg::Execute {
        contract_addr: config.ledger.to_string(),
        msg: to_json_binary(&LedgerExecuteMsg::UseCredits {
            account: Some(account.clone()),
            amount: CREDITS_PER_ACTION,
        })?,
        funds: vec![],
    };
    let remaining = credits - CREDITS_PER_ACTION;

    Ok(Response::new()
        .add_message(debit)
        .set_data(to_json_binary(&ConsumeResponse {
            success: true,
            via_subscription: false,
            remaining_credits: Some(remaining),
        })?)
        .add_attribute("method", "consume")
        .add_attribute("account", account)
        .add_attribute("via", "credits")
        .add_attribute("remaining_credits", remaining.to_string()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Config {} => to_json_binary(&query_config(deps)?),
        QueryMsg::CanCreate { account } => to_json_binary(&query_can_create(deps, account)?),
    }
}

fn query_config(deps: Deps) -> StdResult<ConfigResponse> {
    let config = CONFIG.load(deps.storage)?;
    Ok(ConfigResponse {
        ledger: config.ledger,
        subscriptions: config.subscriptions,
    })
}

fn query_can_create(deps: Deps, account: String) -> StdResult<CanCreateResponse> {
    let config = CONFIG.load(deps.storage)?;
    let subscribed = is_subscribed(deps, &config, &account)?;
    let credits = ledger_credits(deps, &config, &account)?;

    Ok(CanCreateResponse {
        allowed: subscribed || credits > 0,
        subscribed,
        credits,
    })
}
