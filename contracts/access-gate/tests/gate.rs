use access_gate::msg::{
    CanCreateResponse, ConsumeResponse, ExecuteMsg as GateExecuteMsg,
    InstantiateMsg as GateInstantiateMsg, QueryMsg as GateQueryMsg,
};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{
    to_json_binary, Addr, Binary, Deps, DepsMut, Empty, Env, MessageInfo, Response, StdResult,
};
use cw_multi_test::{App, Contract, ContractWrapper, Executor};
use cw_storage_plus::Map;
use referral_ledger::msg::{
    AccountResponse, CreditsResponse, ExecuteMsg as LedgerExecuteMsg,
    InstantiateMsg as LedgerInstantiateMsg, QueryMsg as LedgerQueryMsg,
};
use referral_shared::subscription::{SubscriptionQueryMsg, SubscriptionStatusResponse};

// Minimal subscription service: a set of active accounts

#[cw_serde]
struct SubscriptionsInit {
    active: Vec<String>,
}

#[cw_serde]
enum SubscriptionsExecute {
    Cancel { account: String },
}

const ACTIVE: Map<&str, bool> = Map::new("active");

fn subscriptions_instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: SubscriptionsInit,
) -> StdResult<Response> {
    for account in msg.active {
        ACTIVE.save(deps.storage, &account, &true)?;
    }
    Ok(Response::new())
}

fn subscriptions_execute(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: SubscriptionsExecute,
) -> StdResult<Response> {
    match msg {
        SubscriptionsExecute::Cancel { account } => ACTIVE.remove(deps.storage, &account),
    }
    Ok(Response::new())
}

fn subscriptions_query(deps: Deps, _env: Env, msg: SubscriptionQueryMsg) -> StdResult<Binary> {
    match msg {
        SubscriptionQueryMsg::IsSubscribed { account } => {
            let active = ACTIVE.has(deps.storage, &account);
            to_json_binary(&SubscriptionStatusResponse { active })
        }
    }
}

fn subscriptions_contract() -> Box<dyn Contract<Empty>> {
    Box::new(ContractWrapper::new(
        subscriptions_execute,
        subscriptions_instantiate,
        subscriptions_query,
    ))
}

fn ledger_contract() -> Box<dyn Contract<Empty>> {
    Box::new(
        ContractWrapper::new(
            referral_ledger::contract::execute,
            referral_ledger::contract::instantiate,
            referral_ledger::contract::query,
        )
        .with_reply(referral_ledger::contract::reply),
    )
}

fn gate_contract() -> Box<dyn Contract<Empty>> {
    Box::new(ContractWrapper::new(
        access_gate::contract::execute,
        access_gate::contract::instantiate,
        access_gate::contract::query,
    ))
}

struct Suite {
    app: App,
    ledger: Addr,
    gate: Addr,
    subscriptions: Addr,
}

impl Suite {
    fn new(active: &[&str]) -> Self {
        let mut app = App::default();
        let admin = Addr::unchecked("admin");

        let subscriptions_code = app.store_code(subscriptions_contract());
        let ledger_code = app.store_code(ledger_contract());
        let gate_code = app.store_code(gate_contract());

        let subscriptions = app
            .instantiate_contract(
                subscriptions_code,
                admin.clone(),
                &SubscriptionsInit {
                    active: active.iter().map(|a| a.to_string()).collect(),
                },
                &[],
                "subscriptions",
                None,
            )
            .unwrap();

        let ledger = app
            .instantiate_contract(
                ledger_code,
                admin.clone(),
                &LedgerInstantiateMsg {
                    admin: None,
                    directory: None,
                    spenders: None,
                    referrals_per_cycle: None,
                    cycle_reward: None,
                    max_cycles: None,
                    welcome_credit: None,
                    max_code_attempts: None,
                    sync_max_attempts: None,
                    sync_retry_backoff: None,
                    sync_flush_interval: None,
                },
                &[],
                "referral-ledger",
                None,
            )
            .unwrap();

        let gate = app
            .instantiate_contract(
                gate_code,
                admin.clone(),
                &GateInstantiateMsg {
                    ledger: ledger.to_string(),
                    subscriptions: subscriptions.to_string(),
                },
                &[],
                "access-gate",
                None,
            )
            .unwrap();

        app.execute_contract(
            admin,
            ledger.clone(),
            &LedgerExecuteMsg::UpdateConfig {
                directory: None,
                spenders: Some(vec![gate.to_string()]),
                sync_max_attempts: None,
                sync_retry_backoff: None,
                sync_flush_interval: None,
            },
            &[],
        )
        .unwrap();

        Suite {
            app,
            ledger,
            gate,
            subscriptions,
        }
    }

    fn create(&mut self, sender: &str) -> AccountResponse {
        let res = self
            .app
            .execute_contract(
                Addr::unchecked(sender),
                self.ledger.clone(),
                &LedgerExecuteMsg::CreateOrGetAccount {},
                &[],
            )
            .unwrap();
        cosmwasm_std::from_json(res.data.unwrap()).unwrap()
    }

    fn redeem(&mut self, sender: &str, code: &str) {
        self.app
            .execute_contract(
                Addr::unchecked(sender),
                self.ledger.clone(),
                &LedgerExecuteMsg::RedeemReferralCode {
                    code: code.to_string(),
                },
                &[],
            )
            .unwrap();
    }

    fn consume(&mut self, sender: &str) -> Result<ConsumeResponse, String> {
        self.app
            .execute_contract(
                Addr::unchecked(sender),
                self.gate.clone(),
                &GateExecuteMsg::Consume {},
                &[],
            )
            .map(|res| cosmwasm_std::from_json(res.data.unwrap()).unwrap())
            .map_err(|err| err.root_cause().to_string())
    }

    fn credits(&self, account: &str) -> u64 {
        let res: CreditsResponse = self
            .app
            .wrap()
            .query_wasm_smart(
                &self.ledger,
                &LedgerQueryMsg::Credits {
                    account: account.to_string(),
                },
            )
            .unwrap();
        res.credits
    }

    fn can_create(&self, account: &str) -> CanCreateResponse {
        self.app
            .wrap()
            .query_wasm_smart(
                &self.gate,
                &GateQueryMsg::CanCreate {
                    account: account.to_string(),
                },
            )
            .unwrap()
    }
}

#[test]
fn referral_credit_pays_for_one_action() {
    let mut suite = Suite::new(&[]);
    let owner = suite.create("owner");
    suite.create("bob");
    suite.redeem("bob", &owner.referral_code);
    assert_eq!(suite.credits("bob"), 1);
    assert!(suite.can_create("bob").allowed);

    let res = suite.consume("bob").unwrap();
    assert!(!res.via_subscription);
    assert_eq!(res.remaining_credits, Some(0));
    assert_eq!(suite.credits("bob"), 0);
    assert!(!suite.can_create("bob").allowed);

    let err = suite.consume("bob").unwrap_err();
    assert_eq!(err, "Insufficient credits");
    assert_eq!(suite.credits("bob"), 0);
}

#[test]
fn subscription_bypasses_credits() {
    let mut suite = Suite::new(&["subscriber"]);
    suite.create("subscriber");

    let res = suite.consume("subscriber").unwrap();
    assert!(res.via_subscription);
    assert_eq!(suite.credits("subscriber"), 0);

    suite
        .app
        .execute_contract(
            Addr::unchecked("admin"),
            suite.subscriptions.clone(),
            &SubscriptionsExecute::Cancel {
                account: "subscriber".to_string(),
            },
            &[],
        )
        .unwrap();

    let err = suite.consume("subscriber").unwrap_err();
    assert_eq!(err, "Insufficient credits");
}

#[test]
fn only_approved_spenders_debit_other_accounts() {
    let mut suite = Suite::new(&[]);
    let owner = suite.create("owner");
    suite.create("bob");
    suite.redeem("bob", &owner.referral_code);

    let err = suite
        .app
        .execute_contract(
            Addr::unchecked("mallory"),
            suite.ledger.clone(),
            &LedgerExecuteMsg::UseCredits {
                account: Some("bob".to_string()),
                amount: 1,
            },
            &[],
        )
        .unwrap_err();
    assert_eq!(err.root_cause().to_string(), "Unauthorized");
    assert_eq!(suite.credits("bob"), 1);
}
