#![no_std]

//! # Confidential Lottery
//!
//! A single-player lottery whose balances, picks, winning numbers and rewards
//! are all ciphertexts. The contract never sees a plaintext: arithmetic and
//! comparisons run on the trusted coprocessor, and only principals holding a
//! grant on a handle can have it decrypted.
//!
//! ## Game flow
//! 1. `purchase_points` pays the payment token and credits
//!    `amount * 10_000 / 10^18` points to the encrypted balance.
//! 2. `purchase_ticket` admits two encrypted picks behind an input proof
//!    bound to (this contract, player) and charges 10 points.
//! 3. `play_round` draws two encrypted numbers in `[1, 9]`, counts positional
//!    matches, and credits 0, 100 or 1000 points. The ticket is consumed.
//!
//! ## Confidentiality
//! Nothing branches on a ciphertext. The reward is a nested `select` over
//! the encrypted hit count, and an insufficient balance wraps rather than
//! reverting, so the control flow reveals nothing about plaintexts.
//!
//! Every stored handle is granted to both the contract and the player before
//! it is written, which is what lets later invocations reuse it.

pub mod fhe;

use fhe::{Ebool, Euint32, Euint8, FheError, FheSession, Granted};
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token, vec, Address,
    Bytes, BytesN, Env, IntoVal, Val, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvPointsPurchased {
    pub player: Address,
    pub points: u32,
    pub balance: BytesN<32>,
}

#[contractevent]
pub struct EvTicketPurchased {
    pub player: Address,
    pub balance: BytesN<32>,
}

/// Emitted when a round resolves. The reward handle is only decryptable by the
/// player.
#[contractevent]
pub struct EvRoundPlayed {
    pub player: Address,
    pub reward: BytesN<32>,
}

#[contractevent]
pub struct EvProceedsWithdrawn {
    pub to: Address,
    pub amount: i128,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum LotteryError {
    ZeroPayment = 1,
    NegativePayment = 2,
    /// Payment converts to less than one point
    BelowMinimum = 3,
    /// Payment converts to more points than a balance can hold
    PaymentTooLarge = 4,
    NoActiveTicket = 5,
    InvalidProof = 6,
    UnknownHandle = 7,
    Unauthorized = 8,
    TypeMismatch = 9,
    EmptyInput = 10,
    InvalidModulus = 11,
    AdminNotSet = 12,
    CoprocessorNotSet = 13,
    PaymentTokenNotSet = 14,
    InsufficientProceeds = 15,
}

impl From<FheError> for LotteryError {
    fn from(err: FheError) -> Self {
        match err {
            FheError::UnknownHandle => LotteryError::UnknownHandle,
            FheError::Unauthorized => LotteryError::Unauthorized,
            FheError::InvalidProof => LotteryError::InvalidProof,
            FheError::TypeMismatch => LotteryError::TypeMismatch,
            FheError::EmptyInput => LotteryError::EmptyInput,
            FheError::InvalidModulus => LotteryError::InvalidModulus,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Data Types
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerAccount {
    pub balance: Euint32,
}

impl PlayerAccount {
    pub fn new(balance: Granted<Euint32>) -> Self {
        PlayerAccount {
            balance: balance.into_inner(),
        }
    }
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ticket {
    pub first_pick: Euint8,
    pub second_pick: Euint8,
    pub active: bool,
}

impl Ticket {
    pub fn new(first_pick: Granted<Euint8>, second_pick: Granted<Euint8>) -> Self {
        Ticket {
            first_pick: first_pick.into_inner(),
            second_pick: second_pick.into_inner(),
            active: true,
        }
    }
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrawResult {
    pub winning_first: Euint8,
    pub winning_second: Euint8,
    pub reward: Euint32,
}

impl DrawResult {
    pub fn new(
        winning_first: Granted<Euint8>,
        winning_second: Granted<Euint8>,
        reward: Granted<Euint32>,
    ) -> Self {
        DrawResult {
            winning_first: winning_first.into_inner(),
            winning_second: winning_second.into_inner(),
            reward: reward.into_inner(),
        }
    }
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Admin,
    CoprocessorAddress,
    PaymentToken,
    Account(Address),
    PlayerTicket(Address),
    LastDraw(Address),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Points credited per whole unit of the payment token
pub const POINTS_PER_UNIT: u32 = 10_000;

/// One whole unit of the payment token, in its smallest subdivision
pub const PAYMENT_UNIT: i128 = 1_000_000_000_000_000_000;

pub const TICKET_COST: u32 = 10;

/// Inclusive range of winning numbers
pub const PICK_MIN: u8 = 1;
pub const PICK_MAX: u8 = 9;
const PICK_RANGE: u32 = (PICK_MAX - PICK_MIN + 1) as u32;

pub const ONE_MATCH_REWARD: u32 = 100;
pub const TWO_MATCH_REWARD: u32 = 1000;

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Player records persist for 120 days after the last write
const PLAYER_TTL_SECONDS: u32 = 120 * 24 * 60 * 60;
const PLAYER_TTL_LEDGERS: u32 = PLAYER_TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct ConfidentialLottery;

#[contractimpl]
impl ConfidentialLottery {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Constructor
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, admin: Address, coprocessor: Address, payment_token: Address) {
        env.storage().instance().set(&StorageKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&StorageKey::CoprocessorAddress, &coprocessor);
        env.storage()
            .instance()
            .set(&StorageKey::PaymentToken, &payment_token);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Gameplay
    // ───────────────────────────────────────────────────────────────────────────

    /// Pay `amount` of the payment token and credit the converted points.
    /// Returns the new balance handle.
    pub fn purchase_points(env: Env, player: Address, amount: i128) -> Result<Euint32, LotteryError> {
        player.require_auth();

        let points = Self::points_for(amount)?;
        let coprocessor = Self::load_coprocessor(&env)?;
        let payment_token = Self::load_payment_token(&env)?;

        token::TokenClient::new(&env, &payment_token).transfer(
            &player,
            &env.current_contract_address(),
            &amount,
        );

        let mut fhe = FheSession::new(&env, &coprocessor, &player);
        let credit = fhe.as_euint32(points);
        let balance = match Self::read_account(&env, &player) {
            Some(account) => fhe.add(&account.balance, &credit)?,
            None => credit,
        };
        let account = PlayerAccount::new(fhe.persist(balance, &player));

        Self::write_account(&env, &player, &account);
        EvPointsPurchased {
            player,
            points,
            balance: account.balance.0.clone(),
        }
        .publish(&env);
        Ok(account.balance)
    }

    /// Admit two encrypted picks and charge the ticket cost. Any previous
    /// ticket is replaced.
    ///
    /// The cost is deducted obliviously: a balance below it wraps around.
    pub fn purchase_ticket(
        env: Env,
        player: Address,
        first_pick: Bytes,
        second_pick: Bytes,
        proof: Bytes,
    ) -> Result<Ticket, LotteryError> {
        player.require_auth();

        let coprocessor = Self::load_coprocessor(&env)?;
        let mut fhe = FheSession::new(&env, &coprocessor, &player);

        let picks = fhe.admit::<Euint8>(&vec![&env, first_pick, second_pick], &proof)?;
        let first = picks.get(0).ok_or(LotteryError::EmptyInput)?;
        let second = picks.get(1).ok_or(LotteryError::EmptyInput)?;

        let cost = fhe.as_euint32(TICKET_COST);
        let current = Self::current_balance(&env, &mut fhe, &player);
        let balance = fhe.sub(&current, &cost)?;

        let account = PlayerAccount::new(fhe.persist(balance, &player));
        let ticket = Ticket::new(fhe.persist(first, &player), fhe.persist(second, &player));

        Self::write_account(&env, &player, &account);
        Self::write_ticket(&env, &player, &ticket);
        EvTicketPurchased {
            player,
            balance: account.balance.0.clone(),
        }
        .publish(&env);
        Ok(ticket)
    }

    /// Draw the winning numbers, settle the reward and consume the ticket.
    pub fn play_round(env: Env, player: Address) -> Result<DrawResult, LotteryError> {
        player.require_auth();

        let mut ticket = Self::read_ticket(&env, &player)
            .filter(|ticket| ticket.active)
            .ok_or(LotteryError::NoActiveTicket)?;

        let coprocessor = Self::load_coprocessor(&env)?;
        let mut fhe = FheSession::new(&env, &coprocessor, &player);

        let winning_first = Self::draw_number(&mut fhe)?;
        let winning_second = Self::draw_number(&mut fhe)?;
        let hits = Self::count_hits(&mut fhe, &ticket, &winning_first, &winning_second)?;
        let reward = Self::reward_for(&mut fhe, &hits)?;

        let current = Self::current_balance(&env, &mut fhe, &player);
        let balance = fhe.add(&current, &reward)?;

        let account = PlayerAccount::new(fhe.persist(balance, &player));
        let draw = DrawResult::new(
            fhe.persist(winning_first, &player),
            fhe.persist(winning_second, &player),
            fhe.persist(reward, &player),
        );
        ticket.active = false;

        Self::write_account(&env, &player, &account);
        Self::write_ticket(&env, &player, &ticket);
        Self::write_draw(&env, &player, &draw);
        EvRoundPlayed {
            player,
            reward: draw.reward.0.clone(),
        }
        .publish(&env);
        Ok(draw)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Queries
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_encrypted_balance(env: Env, player: Address) -> Option<Euint32> {
        Self::read_account(&env, &player).map(|account| account.balance)
    }

    pub fn get_ticket(env: Env, player: Address) -> Option<Ticket> {
        Self::read_ticket(&env, &player)
    }

    pub fn get_last_draw(env: Env, player: Address) -> Option<DrawResult> {
        env.storage()
            .persistent()
            .get(&StorageKey::LastDraw(player))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Access Control & Decryption
    // ───────────────────────────────────────────────────────────────────────────

    /// Decrypt a handle for `requester`, who must hold a grant on it.
    pub fn decrypt(env: Env, requester: Address, handle: BytesN<32>) -> Result<u32, LotteryError> {
        requester.require_auth();
        let coprocessor = Self::load_coprocessor(&env)?;
        let fhe = FheSession::new(&env, &coprocessor, &requester);
        Ok(fhe.decrypt(&requester, &handle)?)
    }

    pub fn is_allowed(env: Env, handle: BytesN<32>, principal: Address) -> bool {
        fhe::is_allowed(&env, &handle, &principal)
    }

    pub fn grantees(env: Env, handle: BytesN<32>) -> Vec<Address> {
        fhe::grantees(&env, handle)
    }

    /// Extend a grant held by `owner` to `grantee`.
    pub fn share_access(
        env: Env,
        owner: Address,
        handle: BytesN<32>,
        grantee: Address,
    ) -> Result<(), LotteryError> {
        owner.require_auth();
        fhe::share(&env, &owner, &handle, &grantee)?;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, LotteryError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), LotteryError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&StorageKey::Admin, &new_admin);
        Ok(())
    }

    pub fn get_coprocessor(env: Env) -> Result<Address, LotteryError> {
        Self::load_coprocessor(&env)
    }

    pub fn set_coprocessor(env: Env, new_coprocessor: Address) -> Result<(), LotteryError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::CoprocessorAddress, &new_coprocessor);
        Ok(())
    }

    pub fn get_payment_token(env: Env) -> Result<Address, LotteryError> {
        Self::load_payment_token(&env)
    }

    /// Transfer collected payments to `to` (admin only).
    pub fn withdraw_proceeds(env: Env, to: Address, amount: i128) -> Result<(), LotteryError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        if amount <= 0 {
            return Err(LotteryError::ZeroPayment);
        }

        let payment_token = Self::load_payment_token(&env)?;
        let token = token::TokenClient::new(&env, &payment_token);
        let contract = env.current_contract_address();
        if token.balance(&contract) < amount {
            return Err(LotteryError::InsufficientProceeds);
        }
        token.transfer(&contract, &to, &amount);

        EvProceedsWithdrawn { to, amount }.publish(&env);
        Ok(())
    }

    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) -> Result<(), LotteryError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Round settlement
    // ═══════════════════════════════════════════════════════════════════════════

    /// `random % 9 + 1`, always in `[PICK_MIN, PICK_MAX]`.
    fn draw_number(fhe: &mut FheSession) -> Result<Euint8, LotteryError> {
        let random = fhe.random::<Euint8>();
        let reduced = fhe.rem(&random, PICK_RANGE)?;
        let offset = fhe.as_euint8(PICK_MIN);
        Ok(fhe.add(&reduced, &offset)?)
    }

    /// Number of positional matches, 0 to 2.
    fn count_hits(
        fhe: &mut FheSession,
        ticket: &Ticket,
        winning_first: &Euint8,
        winning_second: &Euint8,
    ) -> Result<Euint8, LotteryError> {
        let one = fhe.as_euint8(1);
        let zero = fhe.as_euint8(0);

        let first_hit: Ebool = fhe.eq(&ticket.first_pick, winning_first)?;
        let second_hit: Ebool = fhe.eq(&ticket.second_pick, winning_second)?;
        let first = fhe.select(&first_hit, &one, &zero)?;
        let second = fhe.select(&second_hit, &one, &zero)?;
        Ok(fhe.add(&first, &second)?)
    }

    fn reward_for(fhe: &mut FheSession, hits: &Euint8) -> Result<Euint32, LotteryError> {
        let one = fhe.as_euint8(1);
        let two = fhe.as_euint8(2);
        let one_hit = fhe.eq(hits, &one)?;
        let two_hits = fhe.eq(hits, &two)?;

        let no_reward = fhe.as_euint32(0);
        let small = fhe.as_euint32(ONE_MATCH_REWARD);
        let large = fhe.as_euint32(TWO_MATCH_REWARD);
        let partial = fhe.select(&one_hit, &small, &no_reward)?;
        Ok(fhe.select(&two_hits, &large, &partial)?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Points
    // ═══════════════════════════════════════════════════════════════════════════

    fn points_for(amount: i128) -> Result<u32, LotteryError> {
        if amount == 0 {
            return Err(LotteryError::ZeroPayment);
        }
        if amount < 0 {
            return Err(LotteryError::NegativePayment);
        }
        let points = amount
            .checked_mul(POINTS_PER_UNIT as i128)
            .ok_or(LotteryError::PaymentTooLarge)?
            / PAYMENT_UNIT;
        if points == 0 {
            return Err(LotteryError::BelowMinimum);
        }
        u32::try_from(points).map_err(|_| LotteryError::PaymentTooLarge)
    }

    /// The stored balance, or an encrypted zero for a player without one.
    fn current_balance(env: &Env, fhe: &mut FheSession, player: &Address) -> Euint32 {
        match Self::read_account(env, player) {
            Some(account) => account.balance,
            None => fhe.as_euint32(0),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn read_account(env: &Env, player: &Address) -> Option<PlayerAccount> {
        env.storage()
            .persistent()
            .get(&StorageKey::Account(player.clone()))
    }

    fn read_ticket(env: &Env, player: &Address) -> Option<Ticket> {
        env.storage()
            .persistent()
            .get(&StorageKey::PlayerTicket(player.clone()))
    }

    fn write_account(env: &Env, player: &Address, account: &PlayerAccount) {
        write_player_record(env, &StorageKey::Account(player.clone()), account);
    }

    fn write_ticket(env: &Env, player: &Address, ticket: &Ticket) {
        write_player_record(env, &StorageKey::PlayerTicket(player.clone()), ticket);
    }

    fn write_draw(env: &Env, player: &Address, draw: &DrawResult) {
        write_player_record(env, &StorageKey::LastDraw(player.clone()), draw);
    }

    fn load_admin(env: &Env) -> Result<Address, LotteryError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(LotteryError::AdminNotSet)
    }

    fn load_coprocessor(env: &Env) -> Result<Address, LotteryError> {
        env.storage()
            .instance()
            .get(&StorageKey::CoprocessorAddress)
            .ok_or(LotteryError::CoprocessorNotSet)
    }

    fn load_payment_token(env: &Env) -> Result<Address, LotteryError> {
        env.storage()
            .instance()
            .get(&StorageKey::PaymentToken)
            .ok_or(LotteryError::PaymentTokenNotSet)
    }
}

fn write_player_record<V>(env: &Env, key: &StorageKey, value: &V)
where
    V: IntoVal<Env, Val>,
{
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, PLAYER_TTL_LEDGERS, PLAYER_TTL_LEDGERS);
    // Keep instance storage (admin, coprocessor, token, handle sequence) alive
    env.storage()
        .instance()
        .extend_ttl(PLAYER_TTL_LEDGERS, PLAYER_TTL_LEDGERS);
}
