//! Ciphertext handle store.
//!
//! ```text
//! handle[0..31) = keccak256("FHE_HANDLE" || engine || principal || sequence_be8)[0..31)
//! handle[31]    = FheType code
//! ```
//!
//! `sequence` is counted per principal and never repeats, so identical
//! plaintexts (or identical payloads) still yield distinct handles. Players
//! never contend on a shared counter.
//!
//! Only granted ciphertexts are written here. Intermediates live in the
//! session that produced them and are dropped with it.

use soroban_sdk::{contracttype, Address, Bytes, BytesN, Env};

use super::{FheError, FheKey, FheType, HANDLE_TTL_LEDGERS};

const HANDLE_TAG: &[u8] = b"FHE_HANDLE";

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredCiphertext {
    pub fhe_type: FheType,
    pub payload: Bytes,
}

pub(crate) fn put(env: &Env, handle: &BytesN<32>, record: &StoredCiphertext) {
    let key = FheKey::Ciphertext(handle.clone());
    env.storage().persistent().set(&key, record);
    env.storage()
        .persistent()
        .extend_ttl(&key, HANDLE_TTL_LEDGERS, HANDLE_TTL_LEDGERS);
}

pub(crate) fn get(env: &Env, handle: &BytesN<32>) -> Result<StoredCiphertext, FheError> {
    env.storage()
        .persistent()
        .get(&FheKey::Ciphertext(handle.clone()))
        .ok_or(FheError::UnknownHandle)
}

/// Reserve the next handle for `principal`.
pub(crate) fn next_handle(env: &Env, principal: &Address, fhe_type: FheType) -> BytesN<32> {
    let key = FheKey::HandleSequence(principal.clone());
    let sequence: u64 = env.storage().persistent().get(&key).unwrap_or(0);
    env.storage().persistent().set(&key, &(sequence + 1));
    env.storage()
        .persistent()
        .extend_ttl(&key, HANDLE_TTL_LEDGERS, HANDLE_TTL_LEDGERS);
    derive_handle(env, principal, fhe_type, sequence)
}

pub(crate) fn derive_handle(
    env: &Env,
    principal: &Address,
    fhe_type: FheType,
    sequence: u64,
) -> BytesN<32> {
    let mut preimage = Bytes::from_slice(env, HANDLE_TAG);
    preimage.append(&env.current_contract_address().to_string().to_bytes());
    preimage.append(&principal.to_string().to_bytes());
    preimage.append(&Bytes::from_array(env, &sequence.to_be_bytes()));
    let digest: BytesN<32> = env.crypto().keccak256(&preimage).into();

    let mut handle = digest.to_array();
    handle[31] = fhe_type.code();
    BytesN::from_array(env, &handle)
}
