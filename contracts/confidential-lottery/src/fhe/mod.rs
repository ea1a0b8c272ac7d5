//! Encrypted-state engine.
//!
//! Handles are opaque references to ciphertexts held in this contract's
//! storage. The engine composes new handles out of old ones by delegating the
//! ciphertext work to the coprocessor. It records who may decrypt what, and
//! admits client ciphertexts only behind a verified input proof.
//!
//! Every mutating flow runs the same sequence inside one [`FheSession`]:
//! create or admit, compute, grant, then store. Granting is what makes a
//! ciphertext durable.

mod acl;
mod coprocessor;
mod input;
mod session;
mod store;
mod types;

pub use acl::{grantees, is_allowed, share, EvAccessGranted};
pub use coprocessor::CoprocessorClient;
pub use input::{Admitted, EvInputAdmitted};
pub use session::{FheSession, Granted};
pub use store::StoredCiphertext;
#[cfg(test)]
pub(crate) use store::derive_handle;
pub use types::{Ebool, Encrypted, EncryptedInput, Euint32, Euint8, FheType, Numeric};

use soroban_sdk::{contracttype, Address, BytesN};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FheError {
    UnknownHandle,
    /// The principal (or the engine itself) holds no grant on the handle
    Unauthorized,
    InvalidProof,
    TypeMismatch,
    EmptyInput,
    InvalidModulus,
}

#[contracttype]
#[derive(Clone)]
pub(crate) enum FheKey {
    HandleSequence(Address),
    Ciphertext(BytesN<32>),
    Grants(BytesN<32>),
}

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Ciphertexts and grants outlive any single game: 120 days
const HANDLE_TTL_SECONDS: u32 = 120 * 24 * 60 * 60;
pub(crate) const HANDLE_TTL_LEDGERS: u32 = HANDLE_TTL_SECONDS / LEDGER_RATE_SECS;
