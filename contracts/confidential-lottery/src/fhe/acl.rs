//! Access control lattice: per-handle, append-only set of principals allowed
//! to request decryption. Grants are never revoked.

use soroban_sdk::{contractevent, Address, BytesN, Env, Vec};

use super::{store, FheError, FheKey, HANDLE_TTL_LEDGERS};

#[contractevent]
pub struct EvAccessGranted {
    pub handle: BytesN<32>,
    pub principal: Address,
}

/// Record that `principal` may decrypt `handle`. Granting twice is a no-op.
pub(crate) fn allow(env: &Env, handle: &BytesN<32>, principal: &Address) {
    let key = FheKey::Grants(handle.clone());
    let mut principals = grantees(env, handle.clone());
    if !principals.contains(principal) {
        principals.push_back(principal.clone());
        env.storage().persistent().set(&key, &principals);
        EvAccessGranted {
            handle: handle.clone(),
            principal: principal.clone(),
        }
        .publish(env);
    }
    env.storage()
        .persistent()
        .extend_ttl(&key, HANDLE_TTL_LEDGERS, HANDLE_TTL_LEDGERS);
}

pub fn is_allowed(env: &Env, handle: &BytesN<32>, principal: &Address) -> bool {
    grantees(env, handle.clone()).contains(principal)
}

pub fn grantees(env: &Env, handle: BytesN<32>) -> Vec<Address> {
    env.storage()
        .persistent()
        .get(&FheKey::Grants(handle))
        .unwrap_or_else(|| Vec::new(env))
}

/// Extend a grant `owner` holds on `handle` to `grantee`.
pub fn share(
    env: &Env,
    owner: &Address,
    handle: &BytesN<32>,
    grantee: &Address,
) -> Result<(), FheError> {
    store::get(env, handle)?;
    if !is_allowed(env, handle, owner) {
        return Err(FheError::Unauthorized);
    }
    allow(env, handle, grantee);
    Ok(())
}
