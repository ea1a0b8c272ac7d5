#![no_std]

//! # FHE Coprocessor (reference network)
//!
//! The computation service that engine contracts delegate all ciphertext
//! work to. Engines keep handles, grants and bookkeeping.
//!
//! This is a development reference network, not a confidential one. The
//! network key sits in instance storage, which anyone can read from the
//! ledger. The arithmetic entry points accept any caller. Only `decrypt` is
//! restricted, to authorized engines. A production network keeps the key
//! off-chain and runs real FHE behind the same interface.
//!
//! | Entry point       | Result                                          |
//! |-------------------|-------------------------------------------------|
//! | `trivial_encrypt` | seal a public constant                          |
//! | `add` / `sub`     | wrapping arithmetic in the operand width        |
//! | `rem`             | remainder by a public modulus                   |
//! | `eq`              | encrypted `Bool`                                |
//! | `select`          | encrypted ternary over a `Bool` condition       |
//! | `random`          | fresh encrypted value from the host PRNG        |
//! | `verify_input`    | check a client input proof against its scope    |
//! | `decrypt`         | open a ciphertext for an authorized engine      |
//!
//! ## Ciphertext layout
//!
//! ```text
//! [0]        type tag   : 0 = Bool, 1 = Uint8, 2 = Uint32
//! [1..33)    nonce      : 32 fresh bytes per ciphertext
//! [33..37)   body       : value_be4 XOR mask
//! mask = keccak256("FHE_MASK" || network_key || nonce)[0..4]
//! ```
//!
//! Every output is resealed under a fresh nonce, so equal plaintexts never
//! produce equal ciphertexts.
//!
//! ## Input proofs
//!
//! Clients encrypt off-path and receive a proof scoped to the contract that
//! will consume the inputs (`target`) and the account submitting them:
//!
//! ```text
//! binding     = keccak256("FHE_INPUT" || target || submitter || count_be4
//!                         || keccak256(ct_1) || ... || keccak256(ct_n))
//! attestation = keccak256("FHE_ATTEST" || network_key || binding)
//! proof       = binding(32) || attestation(32)
//! ```
//!
//! Changing the target, the submitter, or any ciphertext byte changes the
//! binding, so a proof for one scope never verifies in another.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Bytes, BytesN,
    Env, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum FheType {
    Bool = 0,
    Uint8 = 1,
    Uint32 = 2,
}

impl FheType {
    pub fn from_code(code: u8) -> Option<FheType> {
        match code {
            0 => Some(FheType::Bool),
            1 => Some(FheType::Uint8),
            2 => Some(FheType::Uint32),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u32 as u8
    }

    /// Largest plaintext representable in this type.
    pub fn max_value(self) -> u32 {
        match self {
            FheType::Bool => 1,
            FheType::Uint8 => u8::MAX as u32,
            FheType::Uint32 => u32::MAX,
        }
    }

    /// Reduce an arbitrary `u32` into the plaintext domain (wraparound).
    pub fn reduce(self, value: u32) -> u32 {
        match self {
            FheType::Bool => (value != 0) as u32,
            FheType::Uint8 => value & 0xFF,
            FheType::Uint32 => value,
        }
    }

    fn is_numeric(self) -> bool {
        !matches!(self, FheType::Bool)
    }
}

/// One client-encrypted value together with the type it claims to be.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedInput {
    pub fhe_type: FheType,
    pub ciphertext: Bytes,
}

#[contracttype]
#[derive(Clone)]
enum DataKey {
    Admin,
    NetworkKey,
    /// Engine contracts allowed to request decryption
    AuthorizedEngines,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Error codes
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum CoprocessorError {
    MalformedCiphertext = 1,
    TypeMismatch = 2,
    InvalidModulus = 3,
    EngineNotAuthorized = 4,
    AdminNotSet = 5,
    KeyNotSet = 6,
    // Input proof rejection reasons
    ProofWrongLength = 7,
    EmptyInput = 8,
    BindingMismatch = 9,
    AttestationMismatch = 10,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvInputVerified {
    pub target: Address,
    pub submitter: Address,
    pub count: u32,
}

#[contractevent]
pub struct EvInputRejected {
    pub reason: u32,
}

#[contractevent]
pub struct EvEngineAuthorized {
    pub engine: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Domain separators
// ═══════════════════════════════════════════════════════════════════════════════

const MASK_TAG: &[u8] = b"FHE_MASK";
const INPUT_TAG: &[u8] = b"FHE_INPUT";
const ATTEST_TAG: &[u8] = b"FHE_ATTEST";

const NONCE_LEN: u32 = 32;
const BODY_LEN: u32 = 4;
/// tag(1) + nonce(32) + body(4)
pub const CIPHERTEXT_LEN: u32 = 1 + NONCE_LEN + BODY_LEN;
/// binding(32) + attestation(32)
pub const PROOF_LEN: u32 = 64;

// TTL for the instance entry (admin, key, engine list): 120 days
const LEDGER_RATE_SECS: u32 = 5;
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60;
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct FheCoprocessor;

#[contractimpl]
impl FheCoprocessor {
    pub fn __constructor(env: Env, admin: Address, network_key: BytesN<32>) {
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::NetworkKey, &network_key);
        let engines: Vec<Address> = Vec::new(&env);
        env.storage().instance().set(&DataKey::AuthorizedEngines, &engines);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Admin
    // ───────────────────────────────────────────────────────────────────────────

    /// Allow an engine contract to request decryptions.
    pub fn authorize_engine(env: Env, engine: Address) -> Result<(), CoprocessorError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        let mut engines = Self::load_engines(&env);
        if !engines.contains(&engine) {
            engines.push_back(engine.clone());
            env.storage().instance().set(&DataKey::AuthorizedEngines, &engines);
            env.storage().instance().extend_ttl(TTL_LEDGERS, TTL_LEDGERS);
            EvEngineAuthorized { engine }.publish(&env);
        }
        Ok(())
    }

    pub fn is_authorized_engine(env: Env, engine: Address) -> bool {
        Self::load_engines(&env).contains(&engine)
    }

    pub fn get_admin(env: Env) -> Result<Address, CoprocessorError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), CoprocessorError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&DataKey::Admin, &new_admin);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Homomorphic operations
    // ───────────────────────────────────────────────────────────────────────────

    pub fn trivial_encrypt(env: Env, fhe_type: FheType, value: u32) -> Result<Bytes, CoprocessorError> {
        let key = Self::load_key(&env)?;
        Ok(Self::reseal(&env, &key, fhe_type, value))
    }

    pub fn add(env: Env, fhe_type: FheType, lhs: Bytes, rhs: Bytes) -> Result<Bytes, CoprocessorError> {
        Self::require_numeric(fhe_type)?;
        let key = Self::load_key(&env)?;
        let a = open(&env, &key, fhe_type, &lhs)?;
        let b = open(&env, &key, fhe_type, &rhs)?;
        Ok(Self::reseal(&env, &key, fhe_type, a.wrapping_add(b)))
    }

    pub fn sub(env: Env, fhe_type: FheType, lhs: Bytes, rhs: Bytes) -> Result<Bytes, CoprocessorError> {
        Self::require_numeric(fhe_type)?;
        let key = Self::load_key(&env)?;
        let a = open(&env, &key, fhe_type, &lhs)?;
        let b = open(&env, &key, fhe_type, &rhs)?;
        Ok(Self::reseal(&env, &key, fhe_type, a.wrapping_sub(b)))
    }

    pub fn rem(env: Env, fhe_type: FheType, lhs: Bytes, modulus: u32) -> Result<Bytes, CoprocessorError> {
        Self::require_numeric(fhe_type)?;
        if modulus == 0 {
            return Err(CoprocessorError::InvalidModulus);
        }
        let key = Self::load_key(&env)?;
        let a = open(&env, &key, fhe_type, &lhs)?;
        Ok(Self::reseal(&env, &key, fhe_type, a % modulus))
    }

    pub fn eq(env: Env, fhe_type: FheType, lhs: Bytes, rhs: Bytes) -> Result<Bytes, CoprocessorError> {
        let key = Self::load_key(&env)?;
        let a = open(&env, &key, fhe_type, &lhs)?;
        let b = open(&env, &key, fhe_type, &rhs)?;
        Ok(Self::reseal(&env, &key, FheType::Bool, (a == b) as u32))
    }

    pub fn select(
        env: Env,
        fhe_type: FheType,
        condition: Bytes,
        if_true: Bytes,
        if_false: Bytes,
    ) -> Result<Bytes, CoprocessorError> {
        let key = Self::load_key(&env)?;
        let cond = open(&env, &key, FheType::Bool, &condition)?;
        // Both branches are opened so a malformed operand fails regardless of the condition.
        let t = open(&env, &key, fhe_type, &if_true)?;
        let f = open(&env, &key, fhe_type, &if_false)?;
        let chosen = if cond == 1 { t } else { f };
        Ok(Self::reseal(&env, &key, fhe_type, chosen))
    }

    pub fn random(env: Env, fhe_type: FheType) -> Result<Bytes, CoprocessorError> {
        let key = Self::load_key(&env)?;
        let value = env.prng().gen_range::<u64>(0..=(fhe_type.max_value() as u64)) as u32;
        Ok(Self::reseal(&env, &key, fhe_type, value))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Input proofs
    // ───────────────────────────────────────────────────────────────────────────

    /// Verify a client input proof for `(target, submitter)`.
    ///
    /// Returns `true` only if every ciphertext is well formed for its declared
    /// type and the proof binds exactly this batch to this scope. Emits
    /// `EvInputRejected` with the failure reason otherwise. A missing network
    /// key is a configuration fault and fails with `KeyNotSet` instead.
    ///
    /// Checks, in order:
    /// 1. Proof is exactly `PROOF_LEN` bytes
    /// 2. Batch is non-empty and every ciphertext parses as its declared type
    /// 3. `binding` recomputes from the public scope and ciphertexts
    /// 4. `attestation` recomputes from the network key and binding
    pub fn verify_input(
        env: Env,
        target: Address,
        submitter: Address,
        inputs: Vec<EncryptedInput>,
        proof: Bytes,
    ) -> Result<bool, CoprocessorError> {
        let key = Self::load_key(&env)?;
        match Self::check_input(&env, &key, &target, &submitter, &inputs, &proof) {
            Ok(()) => {
                EvInputVerified {
                    target,
                    submitter,
                    count: inputs.len(),
                }
                .publish(&env);
                Ok(true)
            }
            Err(reason) => {
                EvInputRejected { reason: reason as u32 }.publish(&env);
                Ok(false)
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Decryption
    // ───────────────────────────────────────────────────────────────────────────

    /// Open a ciphertext for an authorized engine. The engine is responsible
    /// for checking its own access grants before asking.
    pub fn decrypt(
        env: Env,
        engine: Address,
        fhe_type: FheType,
        ciphertext: Bytes,
    ) -> Result<u32, CoprocessorError> {
        engine.require_auth();
        if !Self::load_engines(&env).contains(&engine) {
            return Err(CoprocessorError::EngineNotAuthorized);
        }
        let key = Self::load_key(&env)?;
        open(&env, &key, fhe_type, &ciphertext)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal
    // ═══════════════════════════════════════════════════════════════════════════

    fn check_input(
        env: &Env,
        key: &BytesN<32>,
        target: &Address,
        submitter: &Address,
        inputs: &Vec<EncryptedInput>,
        proof: &Bytes,
    ) -> Result<(), CoprocessorError> {
        if proof.len() != PROOF_LEN {
            return Err(CoprocessorError::ProofWrongLength);
        }
        if inputs.is_empty() {
            return Err(CoprocessorError::EmptyInput);
        }
        for input in inputs.iter() {
            open(env, key, input.fhe_type, &input.ciphertext)?;
        }

        let binding = input_binding(env, target, submitter, inputs);
        let claimed_binding: BytesN<32> = read_bytes32(env, proof, 0);
        if claimed_binding != binding {
            return Err(CoprocessorError::BindingMismatch);
        }

        let attestation = input_attestation(env, key, &binding);
        let claimed_attestation: BytesN<32> = read_bytes32(env, proof, 32);
        if claimed_attestation != attestation {
            return Err(CoprocessorError::AttestationMismatch);
        }
        Ok(())
    }

    fn reseal(env: &Env, key: &BytesN<32>, fhe_type: FheType, value: u32) -> Bytes {
        let nonce = fresh_nonce(env);
        seal(env, key, fhe_type, value, &nonce)
    }

    fn require_numeric(fhe_type: FheType) -> Result<(), CoprocessorError> {
        if fhe_type.is_numeric() {
            Ok(())
        } else {
            Err(CoprocessorError::TypeMismatch)
        }
    }

    fn load_admin(env: &Env) -> Result<Address, CoprocessorError> {
        env.storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(CoprocessorError::AdminNotSet)
    }

    fn load_key(env: &Env) -> Result<BytesN<32>, CoprocessorError> {
        env.storage()
            .instance()
            .get(&DataKey::NetworkKey)
            .ok_or(CoprocessorError::KeyNotSet)
    }

    fn load_engines(env: &Env) -> Vec<Address> {
        env.storage()
            .instance()
            .get(&DataKey::AuthorizedEngines)
            .unwrap_or(Vec::new(env))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Reference cipher
// ═══════════════════════════════════════════════════════════════════════════════

fn mask(env: &Env, key: &BytesN<32>, nonce: &BytesN<32>) -> u32 {
    let mut preimage = Bytes::from_slice(env, MASK_TAG);
    preimage.append(&Bytes::from_array(env, &key.to_array()));
    preimage.append(&Bytes::from_array(env, &nonce.to_array()));
    let digest: BytesN<32> = env.crypto().keccak256(&preimage).into();
    let d = digest.to_array();
    u32::from_be_bytes([d[0], d[1], d[2], d[3]])
}

/// Seal `value` (reduced into `fhe_type`) under an explicit nonce.
pub fn seal(env: &Env, key: &BytesN<32>, fhe_type: FheType, value: u32, nonce: &BytesN<32>) -> Bytes {
    let body = fhe_type.reduce(value) ^ mask(env, key, nonce);
    let mut ct = Bytes::from_array(env, &[fhe_type.code()]);
    ct.append(&Bytes::from_array(env, &nonce.to_array()));
    ct.append(&Bytes::from_array(env, &body.to_be_bytes()));
    ct
}

/// Open a ciphertext that must be of type `expected`.
pub fn open(env: &Env, key: &BytesN<32>, expected: FheType, ct: &Bytes) -> Result<u32, CoprocessorError> {
    if ct.len() != CIPHERTEXT_LEN {
        return Err(CoprocessorError::MalformedCiphertext);
    }
    let tag = ct.get(0).ok_or(CoprocessorError::MalformedCiphertext)?;
    let actual = FheType::from_code(tag).ok_or(CoprocessorError::MalformedCiphertext)?;
    if actual != expected {
        return Err(CoprocessorError::TypeMismatch);
    }

    let nonce = read_bytes32(env, ct, 1);
    let mut body = [0u8; 4];
    ct.slice(1 + NONCE_LEN..CIPHERTEXT_LEN).copy_into_slice(&mut body);
    let value = u32::from_be_bytes(body) ^ mask(env, key, &nonce);
    if value > expected.max_value() {
        return Err(CoprocessorError::MalformedCiphertext);
    }
    Ok(value)
}

pub fn input_binding(
    env: &Env,
    target: &Address,
    submitter: &Address,
    inputs: &Vec<EncryptedInput>,
) -> BytesN<32> {
    let mut preimage = Bytes::from_slice(env, INPUT_TAG);
    preimage.append(&target.to_string().to_bytes());
    preimage.append(&submitter.to_string().to_bytes());
    preimage.append(&Bytes::from_array(env, &inputs.len().to_be_bytes()));
    for input in inputs.iter() {
        let digest: BytesN<32> = env.crypto().keccak256(&input.ciphertext).into();
        preimage.append(&Bytes::from_array(env, &digest.to_array()));
    }
    env.crypto().keccak256(&preimage).into()
}

pub fn input_attestation(env: &Env, key: &BytesN<32>, binding: &BytesN<32>) -> BytesN<32> {
    let mut preimage = Bytes::from_slice(env, ATTEST_TAG);
    preimage.append(&Bytes::from_array(env, &key.to_array()));
    preimage.append(&Bytes::from_array(env, &binding.to_array()));
    env.crypto().keccak256(&preimage).into()
}

fn read_bytes32(env: &Env, data: &Bytes, offset: u32) -> BytesN<32> {
    let mut arr = [0u8; 32];
    let mut i = 0u32;
    while i < 32 {
        arr[i as usize] = data.get(offset + i).unwrap_or(0);
        i += 1;
    }
    BytesN::from_array(env, &arr)
}

fn fresh_nonce(env: &Env) -> BytesN<32> {
    let mut arr = [0u8; 32];
    let mut chunk = 0usize;
    while chunk < 4 {
        let word = env.prng().gen::<u64>().to_be_bytes();
        arr[chunk * 8..(chunk + 1) * 8].copy_from_slice(&word);
        chunk += 1;
    }
    BytesN::from_array(env, &arr)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Client-side encryption (off-path step performed by wallets and relayers)
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(any(test, feature = "testutils"))]
pub mod client {
    use super::*;

    /// Encrypt `value` the way a wallet does before submission.
    pub fn encrypt(env: &Env, key: &BytesN<32>, fhe_type: FheType, value: u32, nonce: &BytesN<32>) -> Bytes {
        seal(env, key, fhe_type, value, nonce)
    }

    /// Build the input proof for a batch scoped to `(target, submitter)`.
    pub fn prove(
        env: &Env,
        key: &BytesN<32>,
        target: &Address,
        submitter: &Address,
        inputs: &Vec<EncryptedInput>,
    ) -> Bytes {
        let binding = input_binding(env, target, submitter, inputs);
        let attestation = input_attestation(env, key, &binding);
        let mut proof = Bytes::from_array(env, &binding.to_array());
        proof.append(&Bytes::from_array(env, &attestation.to_array()));
        proof
    }
}
