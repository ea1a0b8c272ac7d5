use soroban_sdk::{contractclient, Address, Bytes, Env, Vec};

use super::{EncryptedInput, FheType};

/// Cross-contract interface of the trusted coprocessor. Every operation takes
/// and returns raw ciphertext payloads; handles never leave this contract.
#[contractclient(name = "CoprocessorClient")]
pub trait Coprocessor {
    fn trivial_encrypt(env: Env, fhe_type: FheType, value: u32) -> Bytes;

    fn add(env: Env, fhe_type: FheType, lhs: Bytes, rhs: Bytes) -> Bytes;

    fn sub(env: Env, fhe_type: FheType, lhs: Bytes, rhs: Bytes) -> Bytes;

    fn rem(env: Env, fhe_type: FheType, lhs: Bytes, modulus: u32) -> Bytes;

    fn eq(env: Env, fhe_type: FheType, lhs: Bytes, rhs: Bytes) -> Bytes;

    fn select(
        env: Env,
        fhe_type: FheType,
        condition: Bytes,
        if_true: Bytes,
        if_false: Bytes,
    ) -> Bytes;

    fn random(env: Env, fhe_type: FheType) -> Bytes;

    fn verify_input(
        env: Env,
        target: Address,
        submitter: Address,
        inputs: Vec<EncryptedInput>,
        proof: Bytes,
    ) -> bool;

    fn decrypt(env: Env, engine: Address, fhe_type: FheType, ciphertext: Bytes) -> u32;
}
