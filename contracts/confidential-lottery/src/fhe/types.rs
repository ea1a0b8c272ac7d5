use soroban_sdk::{contracttype, Bytes, BytesN};

/// Plaintext domain of a ciphertext. The code is also stored in the last
/// byte of every handle.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum FheType {
    Bool = 0,
    Uint8 = 1,
    Uint32 = 2,
}

impl FheType {
    pub fn code(self) -> u8 {
        self as u32 as u8
    }
}

/// A client ciphertext with the type it is declared to be, as handed to
/// the coprocessor for input verification.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedInput {
    pub fhe_type: FheType,
    pub ciphertext: Bytes,
}

pub trait Encrypted: Clone {
    const TYPE: FheType;

    fn from_handle(handle: BytesN<32>) -> Self;

    fn handle(&self) -> &BytesN<32>;
}

/// Types that support arithmetic and equality.
pub trait Numeric: Encrypted {}

macro_rules! encrypted_type {
    ($(#[$doc:meta])* $name:ident, $fhe_type:expr) => {
        $(#[$doc])*
        #[contracttype]
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub struct $name(pub BytesN<32>);

        impl Encrypted for $name {
            const TYPE: FheType = $fhe_type;

            fn from_handle(handle: BytesN<32>) -> Self {
                $name(handle)
            }

            fn handle(&self) -> &BytesN<32> {
                &self.0
            }
        }
    };
}

encrypted_type!(
    /// Encrypted boolean, produced by comparisons and consumed by `select`.
    Ebool,
    FheType::Bool
);
encrypted_type!(
    /// Encrypted 8-bit unsigned integer.
    Euint8,
    FheType::Uint8
);
encrypted_type!(
    /// Encrypted 32-bit unsigned integer.
    Euint32,
    FheType::Uint32
);

impl Numeric for Euint8 {}
impl Numeric for Euint32 {}
