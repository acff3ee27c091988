//! Shared test fixtures: a scripted host API and a code builder.
//!
//! `TestApi` plays the blockchain: it hands out heights, balances and
//! canned transactions, and records payments, messages, refunds and fatal
//! errors for assertions. `CodeWriter` builds code segments the way
//! deployment tooling would, one opcode and operand at a time.

use std::collections::BTreeMap;

use crate::api::Api;
use crate::errors::ExecutionError;
use crate::functions::FunctionData;
use crate::isa::OpCode;
use crate::machine::MachineState;
use crate::timestamp::Timestamp;
use crate::utils::log::Logger;
use crate::vm::Vm;

pub const TEST_BLOCK_HEIGHT: u32 = 10;
pub const TEST_INITIAL_BALANCE: u64 = 10_000;
pub const TEST_MAX_STEPS: u32 = 500;

pub const TEST_CODE_PAGES: u16 = 0x200;
pub const TEST_DATA_PAGES: u16 = 0x20;
pub const TEST_CALL_STACK_PAGES: u16 = 0x10;
pub const TEST_USER_STACK_PAGES: u16 = 0x10;

/// A canned incoming transaction, keyed by its packed timestamp.
pub struct TestTransaction {
    pub transaction_type: i64,
    pub amount: i64,
    pub message: [i64; 4],
    pub sender: [i64; 4],
}

/// Scripted host implementation of [`Api`].
pub struct TestApi {
    pub block_height: u32,
    pub balance: u64,
    pub fee_per_step: u64,
    pub max_steps_per_round: u32,
    pub creation_block_height: u32,
    pub previous_block_hash: [i64; 4],
    pub creator_address: [i64; 4],
    pub transactions: BTreeMap<i64, TestTransaction>,
    pub payments: Vec<([i64; 4], u64)>,
    pub messages: Vec<([i64; 4], [i64; 4])>,
    pub finished_refund: Option<u64>,
    pub fatal_error: Option<String>,
    /// When set, random generation defers to the next block once.
    pub defer_random: bool,
    pub random_value: i64,
}

impl TestApi {
    pub fn new() -> Self {
        Self {
            block_height: TEST_BLOCK_HEIGHT,
            balance: TEST_INITIAL_BALANCE,
            fee_per_step: 1,
            max_steps_per_round: TEST_MAX_STEPS,
            creation_block_height: 5,
            previous_block_hash: [0x1111, 0x2222, 0x3333, 0x4444],
            creator_address: [0xc0ffee, 0, 0, 0],
            transactions: BTreeMap::new(),
            payments: Vec::new(),
            messages: Vec::new(),
            finished_refund: None,
            fatal_error: None,
            defer_random: false,
            random_value: 0x5eed,
        }
    }

    fn transaction_in_a(&self, state: &MachineState) -> Option<&TestTransaction> {
        let a = state.a();
        if a[1] != 0 || a[2] != 0 || a[3] != 0 {
            return None;
        }
        self.transactions.get(&a[0])
    }
}

impl Api for TestApi {
    fn current_block_height(&self) -> u32 {
        self.block_height
    }

    fn previous_block_height(&self) -> u32 {
        self.block_height - 1
    }

    fn current_balance(&self, _state: &MachineState) -> u64 {
        self.balance
    }

    fn at_creation_block_height(&self, _state: &MachineState) -> u32 {
        self.creation_block_height
    }

    fn put_previous_block_hash_into_a(&mut self, state: &mut MachineState) {
        state.set_a(self.previous_block_hash);
    }

    fn put_transaction_after_timestamp_into_a(
        &mut self,
        timestamp: Timestamp,
        state: &mut MachineState,
    ) {
        let after = timestamp.as_long();
        match self.transactions.range(after..).next() {
            Some((packed, _)) => state.set_a([*packed, 0, 0, 0]),
            None => state.set_a([0; 4]),
        }
    }

    fn type_from_tx_in_a(&mut self, state: &mut MachineState) -> i64 {
        self.transaction_in_a(state)
            .map(|tx| tx.transaction_type)
            .unwrap_or(-1)
    }

    fn amount_from_tx_in_a(&mut self, state: &mut MachineState) -> i64 {
        self.transaction_in_a(state).map(|tx| tx.amount).unwrap_or(-1)
    }

    fn timestamp_from_tx_in_a(&mut self, state: &mut MachineState) -> i64 {
        let a = state.a();
        if self.transaction_in_a(state).is_some() {
            a[0]
        } else {
            -1
        }
    }

    fn generate_random_using_tx_in_a(&mut self, state: &mut MachineState) -> i64 {
        if self.defer_random && !state.is_first_opcode_after_sleeping() {
            state.set_is_sleeping(true);
            return 0;
        }
        self.random_value
    }

    fn put_message_from_tx_in_a_into_b(&mut self, state: &mut MachineState) {
        let message = self
            .transaction_in_a(state)
            .map(|tx| tx.message)
            .unwrap_or([0; 4]);
        state.set_b(message);
    }

    fn put_address_from_tx_in_a_into_b(&mut self, state: &mut MachineState) {
        let sender = self
            .transaction_in_a(state)
            .map(|tx| tx.sender)
            .unwrap_or([0; 4]);
        state.set_b(sender);
    }

    fn put_creator_address_into_b(&mut self, state: &mut MachineState) {
        state.set_b(self.creator_address);
    }

    fn pay_amount_to_b(&mut self, amount: u64, state: &mut MachineState) {
        self.payments.push((state.b(), amount));
    }

    fn message_a_to_b(&mut self, state: &mut MachineState) {
        self.messages.push((state.b(), state.a()));
    }

    fn add_minutes_to_timestamp(
        &mut self,
        timestamp: Timestamp,
        minutes: i64,
        _state: &mut MachineState,
    ) -> i64 {
        // One block per minute in tests.
        Timestamp::to_long(
            timestamp.block_height + minutes as u32,
            timestamp.transaction_index,
        )
    }

    fn fee_per_step(&self) -> u64 {
        self.fee_per_step
    }

    fn max_steps_per_round(&self) -> u32 {
        self.max_steps_per_round
    }

    fn opcode_steps(&self, _opcode: OpCode) -> u32 {
        1
    }

    fn on_fatal_error(&mut self, _state: &mut MachineState, error: &ExecutionError) {
        self.fatal_error = Some(error.to_string());
    }

    fn on_finished(&mut self, remaining_balance: u64, _state: &mut MachineState) {
        self.finished_refund = Some(remaining_balance);
    }

    fn platform_specific_post_check_execute(
        &mut self,
        function_data: &mut FunctionData,
        _state: &mut MachineState,
        raw_function_code: u16,
    ) -> Result<(), ExecutionError> {
        // Scripted platform function: return the raw code when a return
        // value is expected.
        if function_data.return_value_expected {
            function_data.return_value = Some(raw_function_code as i64);
        }
        Ok(())
    }
}

/// Builds code bytes opcode by opcode, version-2 byte order.
pub struct CodeWriter {
    bytes: Vec<u8>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn op(&mut self, opcode: OpCode) -> &mut Self {
        self.bytes.push(opcode.value());
        self
    }

    pub fn byte(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn int(&mut self, value: i32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn long(&mut self, value: i64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn func(&mut self, raw: u16) -> &mut Self {
        self.bytes.extend_from_slice(&raw.to_be_bytes());
        self
    }

    /// Current write position; handy for asserting handler addresses.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Version-2 test header with the given activation amount.
pub fn test_header_with_activation(min_activation_amount: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(20);
    header.extend_from_slice(&2u16.to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes());
    header.extend_from_slice(&TEST_CODE_PAGES.to_be_bytes());
    header.extend_from_slice(&TEST_DATA_PAGES.to_be_bytes());
    header.extend_from_slice(&TEST_CALL_STACK_PAGES.to_be_bytes());
    header.extend_from_slice(&TEST_USER_STACK_PAGES.to_be_bytes());
    header.extend_from_slice(&min_activation_amount.to_be_bytes());
    header
}

pub fn test_header() -> Vec<u8> {
    test_header_with_activation(0)
}

/// Builds a machine around the given code with empty initial data.
pub fn new_test_machine(code: &[u8], api: &TestApi) -> MachineState {
    MachineState::with_segments(api, Logger::new("test"), &test_header(), code, &[])
        .expect("test machine")
}

/// Runs one execution round.
pub fn execute(state: &mut MachineState, api: &mut TestApi) {
    Vm::new(state, api).execute_round();
}

/// Reads data cell `index`.
pub fn get_data(state: &MachineState, index: usize) -> i64 {
    state.data_value(index)
}
