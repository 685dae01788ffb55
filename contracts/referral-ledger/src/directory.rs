use cosmwasm_std::{DepsMut, StdResult, Storage};
use referral_shared::directory::{DirectoryEntry, DirectoryQueryMsg};
use referral_shared::ReferralCode;

use crate::state::{accounts, Account, Config};

/// Local owner of `code`, if any.
pub fn local_owner(storage: &dyn Storage, code: &str) -> StdResult<Option<Account>> {
    Ok(accounts()
        .idx
        .referral_code
        .item(storage, code.to_string())?
        .map(|(_, account)| account))
}

/// Resolves the account owning `code`: local store first, then the remote
/// directory. A remote hit is written to the local store (insert-if-absent)
/// so later lookups stay local.
pub fn resolve_owner(deps: DepsMut, config: &Config, code: &str) -> StdResult<Option<Account>> {
    if let Some(account) = local_owner(deps.storage, code)? {
        return Ok(Some(account));
    }

    let directory = match &config.directory {
        Some(directory) => directory,
        None => return Ok(None),
    };

    let lookup: StdResult<Option<DirectoryEntry>> = deps.querier.query_wasm_smart(
        directory,
        &DirectoryQueryMsg::LookupByReferralCode {
            code: code.to_string(),
        },
    );
    let entry = match lookup {
        Ok(Some(entry)) => entry,
        Ok(None) => return Ok(None),
        Err(err) => {
            deps.api
                .debug(&format!("directory lookup for {} failed: {}", code, err));
            return Ok(None);
        }
    };

    // The directory must agree with what we asked for
    if entry.data.referral_code != code || ReferralCode::parse(&entry.data.referral_code).is_err()
    {
        return Ok(None);
    }

    // Owner already stored locally: resolve to that row, never overwrite it
    if let Some(existing) = accounts().may_load(deps.storage, &entry.id)? {
        return Ok(Some(existing));
    }

    let account = Account {
        id: entry.id,
        referral_code: entry.data.referral_code,
        credits: entry.data.credits,
        used_referral_code: None,
        created_at: entry.data.created_at,
    };
    accounts().save(deps.storage, &account.id, &account)?;

    Ok(Some(account))
}
