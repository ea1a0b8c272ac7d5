use core::marker::PhantomData;

use soroban_sdk::{contractevent, Address, Bytes, BytesN, Env, Vec};

use super::{CoprocessorClient, Encrypted, EncryptedInput, FheError};

#[contractevent]
pub struct EvInputAdmitted {
    pub submitter: Address,
    pub count: u32,
}

/// Handles created for one verified batch, in submission order.
pub struct Admitted<T: Encrypted> {
    handles: Vec<BytesN<32>>,
    _marker: PhantomData<T>,
}

impl<T: Encrypted> Admitted<T> {
    pub(crate) fn new(handles: Vec<BytesN<32>>) -> Self {
        Admitted {
            handles,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, index: u32) -> Option<T> {
        self.handles.get(index).map(T::from_handle)
    }
}

/// Verify a batch of client ciphertexts bound to (this contract, `submitter`).
/// Returns the batch only if every ciphertext in it verifies.
pub(crate) fn verify<T: Encrypted>(
    env: &Env,
    coprocessor: &CoprocessorClient,
    submitter: &Address,
    ciphertexts: &Vec<Bytes>,
    proof: &Bytes,
) -> Result<Vec<EncryptedInput>, FheError> {
    if ciphertexts.is_empty() {
        return Err(FheError::EmptyInput);
    }

    let mut inputs: Vec<EncryptedInput> = Vec::new(env);
    for ciphertext in ciphertexts.iter() {
        inputs.push_back(EncryptedInput {
            fhe_type: T::TYPE,
            ciphertext,
        });
    }

    let target = env.current_contract_address();
    if !coprocessor.verify_input(&target, submitter, &inputs, proof) {
        return Err(FheError::InvalidProof);
    }

    EvInputAdmitted {
        submitter: submitter.clone(),
        count: inputs.len(),
    }
    .publish(env);
    Ok(inputs)
}
