//! Function codes invoked through the EXT_FUN opcode family.
//!
//! Each function declares a parameter count and whether it returns a value;
//! the invoking opcode's shape is checked against that declaration before
//! anything executes. Codes 0x0500–0x06FF are reserved for platform-specific
//! functions and pass through to the host unchecked.

use md5::Md5;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::api::Api;
use crate::errors::ExecutionError;
use crate::machine::{
    MachineState, ADDRESS_SIZE, FUNCTION_CODE_SIZE, OPCODE_SIZE, VALUE_SIZE,
};
use crate::timestamp::Timestamp;

/// First platform-specific function code.
pub const API_PASSTHROUGH_FIRST: u16 = 0x0500;
/// Last platform-specific function code.
pub const API_PASSTHROUGH_LAST: u16 = 0x06ff;

/// Parameters and return slot for one function invocation.
///
/// Values are read from the data segment by the invoking opcode before the
/// call; `return_value` is written back afterwards when the opcode shape
/// expects one.
#[derive(Debug, Default)]
pub struct FunctionData {
    pub value1: Option<i64>,
    pub value2: Option<i64>,
    pub return_value: Option<i64>,
    pub param_count: u8,
    pub return_value_expected: bool,
}

impl FunctionData {
    pub(crate) fn no_params(return_value_expected: bool) -> Self {
        Self {
            return_value_expected,
            ..Self::default()
        }
    }

    pub(crate) fn one_param(value1: i64, return_value_expected: bool) -> Self {
        Self {
            value1: Some(value1),
            param_count: 1,
            return_value_expected,
            ..Self::default()
        }
    }

    pub(crate) fn two_params(value1: i64, value2: i64, return_value_expected: bool) -> Self {
        Self {
            value1: Some(value1),
            value2: Some(value2),
            param_count: 2,
            return_value_expected,
            ..Self::default()
        }
    }

    fn value1(&self) -> i64 {
        self.value1.unwrap_or(0)
    }

    fn value2(&self) -> i64 {
        self.value2.unwrap_or(0)
    }
}

macro_rules! define_function_codes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $wire_name:literal, ($params:expr, $returns:expr)
        ),* $(,)?
    ) => {
        /// Two-byte function codes reachable through the EXT_FUN opcodes.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u16)]
        pub enum FunctionCode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl FunctionCode {
            /// Resolves a raw two-byte code. The platform range maps to
            /// [`FunctionCode::ApiPassthrough`] wholesale.
            pub fn from_raw(raw: u16) -> Option<FunctionCode> {
                if (API_PASSTHROUGH_FIRST..=API_PASSTHROUGH_LAST).contains(&raw) {
                    return Some(FunctionCode::ApiPassthrough);
                }
                match raw {
                    $( $code => Some(FunctionCode::$name), )*
                    _ => None,
                }
            }

            /// Returns the wire code.
            pub const fn code(self) -> u16 {
                self as u16
            }

            /// Returns the canonical function name.
            pub const fn name(self) -> &'static str {
                match self {
                    $( FunctionCode::$name => $wire_name, )*
                }
            }

            /// Declared number of value parameters.
            pub const fn param_count(self) -> u8 {
                match self {
                    $( FunctionCode::$name => $params, )*
                }
            }

            /// Whether this function produces a return value.
            pub const fn returns_value(self) -> bool {
                match self {
                    $( FunctionCode::$name => $returns, )*
                }
            }
        }
    };
}

define_function_codes! {
    /// Logs value1 through the machine logger.
    Echo = 0x0001, "ECHO", (1, false),
    GetA1 = 0x0100, "GET_A1", (0, true),
    GetA2 = 0x0101, "GET_A2", (0, true),
    GetA3 = 0x0102, "GET_A3", (0, true),
    GetA4 = 0x0103, "GET_A4", (0, true),
    GetB1 = 0x0104, "GET_B1", (0, true),
    GetB2 = 0x0105, "GET_B2", (0, true),
    GetB3 = 0x0106, "GET_B3", (0, true),
    GetB4 = 0x0107, "GET_B4", (0, true),
    /// Copies A into cells addr..addr+3.
    GetAInd = 0x0108, "GET_A_IND", (1, false),
    /// Copies B into cells addr..addr+3.
    GetBInd = 0x0109, "GET_B_IND", (1, false),
    /// Copies A into cells addr..addr+3, destination passed as a value.
    GetADat = 0x010a, "GET_A_DAT", (1, false),
    /// Copies B into cells addr..addr+3, destination passed as a value.
    GetBDat = 0x010b, "GET_B_DAT", (1, false),
    SetA1 = 0x0110, "SET_A1", (1, false),
    SetA2 = 0x0111, "SET_A2", (1, false),
    SetA3 = 0x0112, "SET_A3", (1, false),
    SetA4 = 0x0113, "SET_A4", (1, false),
    SetA1A2 = 0x0114, "SET_A1_A2", (2, false),
    SetA3A4 = 0x0115, "SET_A3_A4", (2, false),
    SetB1 = 0x0116, "SET_B1", (1, false),
    SetB2 = 0x0117, "SET_B2", (1, false),
    SetB3 = 0x0118, "SET_B3", (1, false),
    SetB4 = 0x0119, "SET_B4", (1, false),
    SetB1B2 = 0x011a, "SET_B1_B2", (2, false),
    SetB3B4 = 0x011b, "SET_B3_B4", (2, false),
    /// Loads A from cells addr..addr+3.
    SetAInd = 0x011c, "SET_A_IND", (1, false),
    /// Loads B from cells addr..addr+3.
    SetBInd = 0x011d, "SET_B_IND", (1, false),
    /// Loads A from cells addr..addr+3, source passed as a value.
    SetADat = 0x011e, "SET_A_DAT", (1, false),
    /// Loads B from cells addr..addr+3, source passed as a value.
    SetBDat = 0x011f, "SET_B_DAT", (1, false),
    ClearA = 0x0120, "CLEAR_A", (0, false),
    ClearB = 0x0121, "CLEAR_B", (0, false),
    ClearAAndB = 0x0122, "CLEAR_A_AND_B", (0, false),
    CopyAFromB = 0x0123, "COPY_A_FROM_B", (0, false),
    CopyBFromA = 0x0124, "COPY_B_FROM_A", (0, false),
    CheckAIsZero = 0x0125, "CHECK_A_IS_ZERO", (0, true),
    CheckBIsZero = 0x0126, "CHECK_B_IS_ZERO", (0, true),
    CheckAEqualsB = 0x0127, "CHECK_A_EQUALS_B", (0, true),
    SwapAAndB = 0x0128, "SWAP_A_AND_B", (0, false),
    OrAWithB = 0x0129, "OR_A_WITH_B", (0, false),
    OrBWithA = 0x012a, "OR_B_WITH_A", (0, false),
    AndAWithB = 0x012b, "AND_A_WITH_B", (0, false),
    AndBWithA = 0x012c, "AND_B_WITH_A", (0, false),
    XorAWithB = 0x012d, "XOR_A_WITH_B", (0, false),
    XorBWithA = 0x012e, "XOR_B_WITH_A", (0, false),
    /// Returns -1, 0 or 1 comparing A against B, unsigned.
    UnsignedCompareAWithB = 0x0130, "UNSIGNED_COMPARE_A_WITH_B", (0, true),
    /// Returns -1, 0 or 1 comparing A against B, signed.
    SignedCompareAWithB = 0x0131, "SIGNED_COMPARE_A_WITH_B", (0, true),
    /// MD5 of a data region into B1..B2; B3/B4 zeroed.
    Md5IntoB = 0x0200, "MD5_INTO_B", (2, false),
    /// Compares the MD5 of a data region against B1..B2.
    CheckMd5WithB = 0x0201, "CHECK_MD5_WITH_B", (2, true),
    /// RIPEMD-160 of a data region into B1..B3; B4 zeroed.
    Rmd160IntoB = 0x0202, "RMD160_INTO_B", (2, false),
    /// Compares the RIPEMD-160 of a data region against B1..B3.
    CheckRmd160WithB = 0x0203, "CHECK_RMD160_WITH_B", (2, true),
    /// SHA-256 of a data region into B1..B4.
    Sha256IntoB = 0x0204, "SHA256_INTO_B", (2, false),
    /// Compares the SHA-256 of a data region against B1..B4.
    CheckSha256WithB = 0x0205, "CHECK_SHA256_WITH_B", (2, true),
    /// RIPEMD-160 of SHA-256 of a data region into B1..B3; B4 zeroed.
    Hash160IntoB = 0x0206, "HASH160_INTO_B", (2, false),
    /// Compares the HASH160 of a data region against B1..B3.
    CheckHash160WithB = 0x0207, "CHECK_HASH160_WITH_B", (2, true),
    GetBlockTimestamp = 0x0300, "GET_BLOCK_TIMESTAMP", (0, true),
    GetCreationTimestamp = 0x0301, "GET_CREATION_TIMESTAMP", (0, true),
    GetPreviousBlockTimestamp = 0x0302, "GET_PREVIOUS_BLOCK_TIMESTAMP", (0, true),
    PutPreviousBlockHashIntoA = 0x0303, "PUT_PREVIOUS_BLOCK_HASH_INTO_A", (0, false),
    PutTxAfterTimestampIntoA = 0x0304, "PUT_TX_AFTER_TIMESTAMP_INTO_A", (1, false),
    GetTypeFromTxInA = 0x0305, "GET_TYPE_FROM_TX_IN_A", (0, true),
    GetAmountFromTxInA = 0x0306, "GET_AMOUNT_FROM_TX_IN_A", (0, true),
    GetTimestampFromTxInA = 0x0307, "GET_TIMESTAMP_FROM_TX_IN_A", (0, true),
    /// May sleep one block to use the next block as its entropy source.
    GenerateRandomUsingTxInA = 0x0308, "GENERATE_RANDOM_USING_TX_IN_A", (0, true),
    PutMessageFromTxInAIntoB = 0x0309, "PUT_MESSAGE_FROM_TX_IN_A_INTO_B", (0, false),
    PutAddressFromTxInAIntoB = 0x030a, "PUT_ADDRESS_FROM_TX_IN_A_INTO_B", (0, false),
    PutCreatorIntoB = 0x030b, "PUT_CREATOR_INTO_B", (0, false),
    GetCurrentBalance = 0x0400, "GET_CURRENT_BALANCE", (0, true),
    GetPreviousBalance = 0x0401, "GET_PREVIOUS_BALANCE", (0, true),
    /// Pays value1 (clamped to the balance) to the address in B.
    PayToAddressInB = 0x0402, "PAY_TO_ADDRESS_IN_B", (1, false),
    /// Pays all remaining funds to the address in B and finishes.
    PayAllToAddressInB = 0x0403, "PAY_ALL_TO_ADDRESS_IN_B", (0, false),
    /// Pays the previous balance (clamped) to the address in B.
    PayPreviousToAddressInB = 0x0404, "PAY_PREVIOUS_TO_ADDRESS_IN_B", (0, false),
    MessageAToAddressInB = 0x0405, "MESSAGE_A_TO_ADDRESS_IN_B", (0, false),
    AddMinutesToTimestamp = 0x0406, "ADD_MINUTES_TO_TIMESTAMP", (2, true),
    /// Platform-specific range, handed to the host with the raw code.
    ApiPassthrough = 0x0500, "API_PASSTHROUGH", (0, false),
}

impl FunctionCode {
    /// Verifies an invocation shape against this function's declaration.
    /// Platform functions skip the check; the host knows their shapes.
    pub(crate) fn pre_execute_check(
        self,
        param_count: u8,
        return_value_expected: bool,
    ) -> Result<(), ExecutionError> {
        if self == FunctionCode::ApiPassthrough {
            return Ok(());
        }

        if param_count != self.param_count() {
            return Err(ExecutionError::IllegalOperation(format!(
                "passed param count ({param_count}) does not match {} required param count ({})",
                self.name(),
                self.param_count()
            )));
        }

        if return_value_expected != self.returns_value() {
            return Err(ExecutionError::IllegalOperation(format!(
                "passed return expectation ({return_value_expected}) does not match {} return signature ({})",
                self.name(),
                self.returns_value()
            )));
        }

        Ok(())
    }

    /// Checks the invocation shape, then performs the operation. May modify
    /// registers, the data segment, balances and the sleep state.
    pub(crate) fn execute<A: Api + ?Sized>(
        self,
        function_data: &mut FunctionData,
        state: &mut MachineState,
        api: &mut A,
        raw_function_code: u16,
    ) -> Result<(), ExecutionError> {
        self.pre_execute_check(function_data.param_count, function_data.return_value_expected)?;

        if function_data.param_count >= 1 && function_data.value1.is_none() {
            return Err(ExecutionError::IllegalOperation(format!(
                "value1 missing but {} has param count {}",
                self.name(),
                function_data.param_count
            )));
        }
        if function_data.param_count == 2 && function_data.value2.is_none() {
            return Err(ExecutionError::IllegalOperation(format!(
                "value2 missing but {} has param count {}",
                self.name(),
                function_data.param_count
            )));
        }

        if state.logger().debug_enabled() {
            state.logger().debug(&format!("function \"{}\"", self.name()));
        }

        self.post_check_execute(function_data, state, api, raw_function_code)
    }

    fn post_check_execute<A: Api + ?Sized>(
        self,
        function_data: &mut FunctionData,
        state: &mut MachineState,
        api: &mut A,
        raw_function_code: u16,
    ) -> Result<(), ExecutionError> {
        use FunctionCode::*;

        match self {
            Echo => {
                let message = function_data.value1().to_string();
                state.logger().echo(&message);
            }

            GetA1 => function_data.return_value = Some(state.a[0]),
            GetA2 => function_data.return_value = Some(state.a[1]),
            GetA3 => function_data.return_value = Some(state.a[2]),
            GetA4 => function_data.return_value = Some(state.a[3]),
            GetB1 => function_data.return_value = Some(state.b[0]),
            GetB2 => function_data.return_value = Some(state.b[1]),
            GetB3 => function_data.return_value = Some(state.b[2]),
            GetB4 => function_data.return_value = Some(state.b[3]),

            GetAInd | GetADat => {
                let offset = state.check_data_cell(function_data.value1(), 4)?;
                for (i, word) in state.a.into_iter().enumerate() {
                    state.set_data_value_at(offset + i * VALUE_SIZE, word);
                }
            }
            GetBInd | GetBDat => {
                let offset = state.check_data_cell(function_data.value1(), 4)?;
                for (i, word) in state.b.into_iter().enumerate() {
                    state.set_data_value_at(offset + i * VALUE_SIZE, word);
                }
            }

            SetA1 => state.a[0] = function_data.value1(),
            SetA2 => state.a[1] = function_data.value1(),
            SetA3 => state.a[2] = function_data.value1(),
            SetA4 => state.a[3] = function_data.value1(),
            SetA1A2 => {
                state.a[0] = function_data.value1();
                state.a[1] = function_data.value2();
            }
            SetA3A4 => {
                state.a[2] = function_data.value1();
                state.a[3] = function_data.value2();
            }
            SetB1 => state.b[0] = function_data.value1(),
            SetB2 => state.b[1] = function_data.value1(),
            SetB3 => state.b[2] = function_data.value1(),
            SetB4 => state.b[3] = function_data.value1(),
            SetB1B2 => {
                state.b[0] = function_data.value1();
                state.b[1] = function_data.value2();
            }
            SetB3B4 => {
                state.b[2] = function_data.value1();
                state.b[3] = function_data.value2();
            }

            SetAInd | SetADat => {
                let offset = state.check_data_cell(function_data.value1(), 4)?;
                for i in 0..4 {
                    state.a[i] = state.data_value_at(offset + i * VALUE_SIZE);
                }
            }
            SetBInd | SetBDat => {
                let offset = state.check_data_cell(function_data.value1(), 4)?;
                for i in 0..4 {
                    state.b[i] = state.data_value_at(offset + i * VALUE_SIZE);
                }
            }

            ClearA => state.a = [0; 4],
            ClearB => state.b = [0; 4],
            ClearAAndB => {
                state.a = [0; 4];
                state.b = [0; 4];
            }
            CopyAFromB => state.a = state.b,
            CopyBFromA => state.b = state.a,

            CheckAIsZero => {
                function_data.return_value = Some((state.a == [0; 4]) as i64);
            }
            CheckBIsZero => {
                function_data.return_value = Some((state.b == [0; 4]) as i64);
            }
            CheckAEqualsB => {
                function_data.return_value = Some((state.a == state.b) as i64);
            }
            SwapAAndB => {
                let a = state.a;
                state.a = state.b;
                state.b = a;
            }

            OrAWithB => {
                for i in 0..4 {
                    state.a[i] |= state.b[i];
                }
            }
            OrBWithA => {
                for i in 0..4 {
                    state.b[i] |= state.a[i];
                }
            }
            AndAWithB => {
                for i in 0..4 {
                    state.a[i] &= state.b[i];
                }
            }
            AndBWithA => {
                for i in 0..4 {
                    state.b[i] &= state.a[i];
                }
            }
            XorAWithB => {
                for i in 0..4 {
                    state.a[i] ^= state.b[i];
                }
            }
            XorBWithA => {
                for i in 0..4 {
                    state.b[i] ^= state.a[i];
                }
            }

            UnsignedCompareAWithB => {
                // Words 3 and 4 compare against themselves; consensus
                // requires keeping the comparison exactly like this.
                let mut ordering = (state.a[0] as u64).cmp(&(state.b[0] as u64));
                if ordering.is_eq() {
                    ordering = (state.a[1] as u64).cmp(&(state.b[1] as u64));
                }
                if ordering.is_eq() {
                    ordering = (state.a[2] as u64).cmp(&(state.a[2] as u64));
                }
                if ordering.is_eq() {
                    ordering = (state.a[3] as u64).cmp(&(state.a[3] as u64));
                }
                function_data.return_value = Some(ordering as i64);
            }
            SignedCompareAWithB => {
                // Same self-comparison on words 3 and 4 as the unsigned form.
                let mut ordering = state.a[0].cmp(&state.b[0]);
                if ordering.is_eq() {
                    ordering = state.a[1].cmp(&state.b[1]);
                }
                if ordering.is_eq() {
                    ordering = state.a[2].cmp(&state.a[2]);
                }
                if ordering.is_eq() {
                    ordering = state.a[3].cmp(&state.a[3]);
                }
                function_data.return_value = Some(ordering as i64);
            }

            Md5IntoB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Md5::digest(&message);
                state.b[0] = word_from_be(&digest[0..8]);
                state.b[1] = word_from_be(&digest[8..16]);
                state.b[2] = 0;
                state.b[3] = 0;
            }
            CheckMd5WithB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Md5::digest(&message);
                let mut expected = [0u8; 16];
                expected[0..8].copy_from_slice(&state.b[0].to_be_bytes());
                expected[8..16].copy_from_slice(&state.b[1].to_be_bytes());
                // B3 and B4 are ignored.
                function_data.return_value = Some((digest[..] == expected) as i64);
            }

            Rmd160IntoB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Ripemd160::digest(&message);
                put_digest20_into_b(state, &digest);
            }
            CheckRmd160WithB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Ripemd160::digest(&message);
                function_data.return_value =
                    Some((digest[..] == expected_digest20_from_b(state)) as i64);
            }

            Sha256IntoB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Sha256::digest(&message);
                for i in 0..4 {
                    state.b[i] = word_from_be(&digest[i * 8..i * 8 + 8]);
                }
            }
            CheckSha256WithB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Sha256::digest(&message);
                let mut expected = [0u8; 32];
                for i in 0..4 {
                    expected[i * 8..i * 8 + 8].copy_from_slice(&state.b[i].to_be_bytes());
                }
                function_data.return_value = Some((digest[..] == expected) as i64);
            }

            Hash160IntoB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Ripemd160::digest(Sha256::digest(&message));
                put_digest20_into_b(state, &digest);
            }
            CheckHash160WithB => {
                let message = self.hash_data(function_data, state)?;
                let digest = Ripemd160::digest(Sha256::digest(&message));
                function_data.return_value =
                    Some((digest[..] == expected_digest20_from_b(state)) as i64);
            }

            GetBlockTimestamp => {
                function_data.return_value =
                    Some(Timestamp::to_long(api.current_block_height(), 0));
            }
            GetCreationTimestamp => {
                function_data.return_value =
                    Some(Timestamp::to_long(api.at_creation_block_height(state), 0));
            }
            GetPreviousBlockTimestamp => {
                function_data.return_value =
                    Some(Timestamp::to_long(api.previous_block_height(), 0));
            }
            PutPreviousBlockHashIntoA => api.put_previous_block_hash_into_a(state),
            PutTxAfterTimestampIntoA => {
                let timestamp = Timestamp::from_long(function_data.value1());
                api.put_transaction_after_timestamp_into_a(timestamp, state);
            }
            GetTypeFromTxInA => {
                function_data.return_value = Some(api.type_from_tx_in_a(state));
            }
            GetAmountFromTxInA => {
                function_data.return_value = Some(api.amount_from_tx_in_a(state));
            }
            GetTimestampFromTxInA => {
                function_data.return_value = Some(api.timestamp_from_tx_in_a(state));
            }
            GenerateRandomUsingTxInA => {
                function_data.return_value = Some(api.generate_random_using_tx_in_a(state));

                // The host may have deferred to the next block for entropy.
                // Rewind past EXT_FUN_RET + function code + address so this
                // call re-executes after waking.
                if state.is_sleeping() {
                    state.rewind_code_position(OPCODE_SIZE + FUNCTION_CODE_SIZE + ADDRESS_SIZE);

                    if state.sleep_until_height().is_none() {
                        state.set_sleep_until_height(Some(state.current_block_height() + 1));
                    }
                }
            }
            PutMessageFromTxInAIntoB => api.put_message_from_tx_in_a_into_b(state),
            PutAddressFromTxInAIntoB => api.put_address_from_tx_in_a_into_b(state),
            PutCreatorIntoB => api.put_creator_address_into_b(state),

            GetCurrentBalance => {
                function_data.return_value = Some(state.current_balance as i64);
            }
            GetPreviousBalance => {
                function_data.return_value = Some(state.previous_balance as i64);
            }
            PayToAddressInB => {
                // Clamp to the current balance instead of failing on
                // insufficient funds.
                let amount = (function_data.value1().max(0) as u64).min(state.current_balance);

                api.pay_amount_to_b(amount, state);
                state.current_balance -= amount;

                // With no balance left this machine is effectively done.
                if state.current_balance == 0 {
                    state.is_finished = true;
                }
            }
            PayAllToAddressInB => {
                api.pay_amount_to_b(state.current_balance, state);
                state.current_balance = 0;
                state.is_finished = true;
            }
            PayPreviousToAddressInB => {
                let amount = state.previous_balance.min(state.current_balance);

                api.pay_amount_to_b(amount, state);
                state.current_balance -= amount;

                if state.current_balance == 0 {
                    state.is_finished = true;
                }
            }
            MessageAToAddressInB => api.message_a_to_b(state),
            AddMinutesToTimestamp => {
                let timestamp = Timestamp::from_long(function_data.value1());
                function_data.return_value =
                    Some(api.add_minutes_to_timestamp(timestamp, function_data.value2(), state));
            }

            ApiPassthrough => {
                api.platform_specific_post_check_execute(function_data, state, raw_function_code)?;
            }
        }

        Ok(())
    }

    /// Collects the byte region `data[start*8 .. start*8 + length)` for the
    /// hash functions, validating both the start cell and the length.
    fn hash_data(
        self,
        function_data: &FunctionData,
        state: &MachineState,
    ) -> Result<Vec<u8>, ExecutionError> {
        let start = function_data.value1();
        state.check_data_cell(start, 1)?;

        let length = function_data.value2();
        if length < 0
            || length > i32::MAX as i64
            || start + byte_length_to_cell_count(length) > state.num_data_cells()
        {
            return Err(ExecutionError::Execution(format!(
                "{} data length invalid",
                self.name()
            )));
        }

        let offset = start as usize * VALUE_SIZE;
        Ok(state.data_bytes()[offset..offset + length as usize].to_vec())
    }
}

/// Number of data cells needed to contain `byte_length` bytes.
fn byte_length_to_cell_count(byte_length: i64) -> i64 {
    (VALUE_SIZE as i64 - 1 + byte_length) / VALUE_SIZE as i64
}

fn word_from_be(bytes: &[u8]) -> i64 {
    i64::from_be_bytes(bytes.try_into().expect("8 bytes"))
}

/// Places a 20-byte digest into B: bytes 0..16 fill B1 and B2, bytes 16..20
/// land in the high 32 bits of B3, and B4 is zeroed.
fn put_digest20_into_b(state: &mut MachineState, digest: &[u8]) {
    state.b[0] = word_from_be(&digest[0..8]);
    state.b[1] = word_from_be(&digest[8..16]);
    state.b[2] =
        (u32::from_be_bytes(digest[16..20].try_into().expect("4 bytes")) as i64) << 32;
    state.b[3] = 0;
}

/// Rebuilds the 20-byte digest a check expects from B1..B3; B4 is ignored.
fn expected_digest20_from_b(state: &MachineState) -> [u8; 20] {
    let mut expected = [0u8; 20];
    expected[0..8].copy_from_slice(&state.b[0].to_be_bytes());
    expected[8..16].copy_from_slice(&state.b[1].to_be_bytes());
    expected[16..20].copy_from_slice(&(((state.b[2] as u64) >> 32) as u32).to_be_bytes());
    expected
}
