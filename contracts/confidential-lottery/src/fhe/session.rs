use soroban_sdk::{Address, Bytes, BytesN, Env, Map, Vec};

use super::{
    acl, input, store, Admitted, CoprocessorClient, Ebool, Encrypted, Euint32, Euint8, FheError,
    Numeric, StoredCiphertext,
};

/// An encrypted value that both the engine and its owner may decrypt.
///
/// Only [`FheSession::persist`] produces one, so anything built from
/// `Granted` parts can be written to storage without losing access to it.
#[derive(Clone, Debug)]
pub struct Granted<T: Encrypted>(T);

impl<T: Encrypted> Granted<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Scope of one contract invocation acting for one principal.
///
/// Handles created in the session are transiently usable as operands. Their
/// ciphertexts stay in memory until a grant is issued, and anything never
/// granted is dropped with the session. Any other handle must carry a grant
/// to this contract, which is what [`FheSession::allow_this`] records before a
/// value is stored.
pub struct FheSession<'a> {
    env: &'a Env,
    coprocessor: CoprocessorClient<'a>,
    principal: Address,
    pending: Map<BytesN<32>, StoredCiphertext>,
    transient: Vec<BytesN<32>>,
}

impl<'a> FheSession<'a> {
    /// New handles are numbered in `principal`'s own sequence.
    pub fn new(env: &'a Env, coprocessor: &Address, principal: &Address) -> Self {
        FheSession {
            env,
            coprocessor: CoprocessorClient::new(env, coprocessor),
            principal: principal.clone(),
            pending: Map::new(env),
            transient: Vec::new(env),
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────

    /// Trivially encrypt `value`. Values wider than `T` wrap.
    pub fn literal<T: Encrypted>(&mut self, value: u32) -> T {
        let payload = self.coprocessor.trivial_encrypt(&T::TYPE, &value);
        self.bind(payload)
    }

    pub fn as_ebool(&mut self, value: bool) -> Ebool {
        self.literal(value as u32)
    }

    pub fn as_euint8(&mut self, value: u8) -> Euint8 {
        self.literal(value as u32)
    }

    pub fn as_euint32(&mut self, value: u32) -> Euint32 {
        self.literal(value)
    }

    // ── Arithmetic ────────────────────────────────────────────────────────

    /// Wrapping addition at the width of `T`.
    pub fn add<T: Numeric>(&mut self, lhs: &T, rhs: &T) -> Result<T, FheError> {
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;
        let payload = self.coprocessor.add(&T::TYPE, &lhs, &rhs);
        Ok(self.bind(payload))
    }

    /// Wrapping subtraction at the width of `T`. Underflow is not an error.
    pub fn sub<T: Numeric>(&mut self, lhs: &T, rhs: &T) -> Result<T, FheError> {
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;
        let payload = self.coprocessor.sub(&T::TYPE, &lhs, &rhs);
        Ok(self.bind(payload))
    }

    pub fn rem<T: Numeric>(&mut self, lhs: &T, modulus: u32) -> Result<T, FheError> {
        if modulus == 0 {
            return Err(FheError::InvalidModulus);
        }
        let lhs = self.operand(lhs)?;
        let payload = self.coprocessor.rem(&T::TYPE, &lhs, &modulus);
        Ok(self.bind(payload))
    }

    pub fn eq<T: Numeric>(&mut self, lhs: &T, rhs: &T) -> Result<Ebool, FheError> {
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;
        let payload = self.coprocessor.eq(&T::TYPE, &lhs, &rhs);
        Ok(self.bind(payload))
    }

    /// Oblivious choice: `if_true` where `condition` holds, else `if_false`.
    pub fn select<T: Encrypted>(
        &mut self,
        condition: &Ebool,
        if_true: &T,
        if_false: &T,
    ) -> Result<T, FheError> {
        let condition = self.operand(condition)?;
        let if_true = self.operand(if_true)?;
        let if_false = self.operand(if_false)?;
        let payload = self
            .coprocessor
            .select(&T::TYPE, &condition, &if_true, &if_false);
        Ok(self.bind(payload))
    }

    /// Uniform over the full width of `T`. Nobody can decrypt it until a
    /// grant is issued.
    pub fn random<T: Numeric>(&mut self) -> T {
        let payload = self.coprocessor.random(&T::TYPE);
        self.bind(payload)
    }

    // ── Inputs ────────────────────────────────────────────────────────────

    /// Admit client ciphertexts submitted by the session principal. No
    /// handle is created unless the whole batch verifies.
    pub fn admit<T: Encrypted>(
        &mut self,
        ciphertexts: &Vec<Bytes>,
        proof: &Bytes,
    ) -> Result<Admitted<T>, FheError> {
        let inputs =
            input::verify::<T>(self.env, &self.coprocessor, &self.principal, ciphertexts, proof)?;
        let mut handles: Vec<BytesN<32>> = Vec::new(self.env);
        for input in inputs.iter() {
            let value: T = self.bind(input.ciphertext);
            handles.push_back(value.handle().clone());
        }
        Ok(Admitted::new(handles))
    }

    // ── Grants ────────────────────────────────────────────────────────────

    pub fn allow_this<T: Encrypted>(&mut self, value: &T) {
        let engine = self.env.current_contract_address();
        self.allow(value, &engine);
    }

    pub fn allow<T: Encrypted>(&mut self, value: &T, principal: &Address) {
        self.commit(value.handle());
        acl::allow(self.env, value.handle(), principal);
    }

    /// Grant `value` to this contract and to `owner`.
    pub fn persist<T: Encrypted>(&mut self, value: T, owner: &Address) -> Granted<T> {
        self.allow_this(&value);
        self.allow(&value, owner);
        Granted(value)
    }

    // ── Decryption ────────────────────────────────────────────────────────

    pub fn decrypt(&self, requester: &Address, handle: &BytesN<32>) -> Result<u32, FheError> {
        let record = store::get(self.env, handle)?;
        if !acl::is_allowed(self.env, handle, requester) {
            return Err(FheError::Unauthorized);
        }
        Ok(self.coprocessor.decrypt(
            &self.env.current_contract_address(),
            &record.fhe_type,
            &record.payload,
        ))
    }

    fn operand<T: Encrypted>(&self, value: &T) -> Result<Bytes, FheError> {
        let handle = value.handle();
        let record = match self.pending.get(handle.clone()) {
            Some(record) => record,
            None => store::get(self.env, handle)?,
        };
        if record.fhe_type != T::TYPE {
            return Err(FheError::TypeMismatch);
        }
        if !self.transient.contains(handle)
            && !acl::is_allowed(self.env, handle, &self.env.current_contract_address())
        {
            return Err(FheError::Unauthorized);
        }
        Ok(record.payload)
    }

    fn bind<T: Encrypted>(&mut self, payload: Bytes) -> T {
        let handle = store::next_handle(self.env, &self.principal, T::TYPE);
        self.pending.set(
            handle.clone(),
            StoredCiphertext {
                fhe_type: T::TYPE,
                payload,
            },
        );
        self.transient.push_back(handle.clone());
        T::from_handle(handle)
    }

    /// Move a session ciphertext into durable storage. Handles from earlier
    /// invocations are already there.
    fn commit(&mut self, handle: &BytesN<32>) {
        if let Some(record) = self.pending.get(handle.clone()) {
            store::put(self.env, handle, &record);
            self.pending.remove(handle.clone());
        }
    }
}
