//! Machine-state container and its byte-exact serialization.
//!
//! A [`MachineState`] bundles everything a validator must agree on: the
//! header, the read-only code segment, the data segment, both
//! downward-growing stacks, the program counter, the A/B registers, balances
//! and the execution flags. Between rounds the volatile portion serializes
//! to bytes via [`MachineState::to_bytes`] and re-inflates with
//! [`MachineState::from_bytes`]; code bytes are invariant and stored
//! separately.
//!
//! All multi-byte scalars follow the version byte order (version 1
//! little-endian, version 2 big-endian), except data-segment cells which are
//! little-endian in every version.

use crate::api::Api;
use crate::errors::StateError;
use crate::utils::log::Logger;

/// Size of one opcode on the wire.
pub const OPCODE_SIZE: usize = 1;
/// Size of one function code on the wire.
pub const FUNCTION_CODE_SIZE: usize = 2;
/// Size of one data-segment cell.
pub const VALUE_SIZE: usize = 8;
/// Size of a code or data address operand.
pub const ADDRESS_SIZE: usize = 4;
/// Size of the A or B register block.
pub const AB_REGISTER_SIZE: usize = 32;

/// Byte order of header fields, code operands, stack entries and serialized
/// state scalars. Selected once from the version at the first decode step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn u16_from(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u32_from(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    pub(crate) fn i32_from(self, bytes: [u8; 4]) -> i32 {
        self.u32_from(bytes) as i32
    }

    pub(crate) fn u64_from(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        }
    }

    pub(crate) fn i64_from(self, bytes: [u8; 8]) -> i64 {
        self.u64_from(bytes) as i64
    }

    pub(crate) fn put_u16(self, out: &mut Vec<u8>, value: u16) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn put_u32(self, out: &mut Vec<u8>, value: u32) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn put_i32(self, out: &mut Vec<u8>, value: i32) {
        self.put_u32(out, value as u32);
    }

    pub(crate) fn put_u64(self, out: &mut Vec<u8>, value: u64) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn put_i64(self, out: &mut Vec<u8>, value: i64) {
        self.put_u64(out, value as u64);
    }

    pub(crate) fn write_u32(self, buf: &mut [u8], value: u32) {
        match self {
            ByteOrder::Little => buf.copy_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => buf.copy_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn write_i64(self, buf: &mut [u8], value: i64) {
        match self {
            ByteOrder::Little => buf.copy_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => buf.copy_from_slice(&value.to_be_bytes()),
        }
    }
}

/// Per-version layout constants.
#[derive(Debug)]
pub struct VersionedConstants {
    /// Bytes per code page.
    pub code_page_size: usize,
    /// Bytes per data page.
    pub data_page_size: usize,
    /// Bytes per call-stack page.
    pub call_stack_page_size: usize,
    /// Bytes per user-stack page.
    pub user_stack_page_size: usize,
    /// Maximum value for an address into the code segment.
    pub max_code_address: u32,
    /// Fixed header length in bytes.
    pub header_length: usize,
    /// Byte order of scalars (headers, code operands, stacks, state).
    pub byte_order: ByteOrder,
}

const V1_CONSTANTS: VersionedConstants = VersionedConstants {
    code_page_size: 256,
    data_page_size: 256,
    call_stack_page_size: 256,
    user_stack_page_size: 256,
    max_code_address: 0x1fff_ffff,
    header_length: 12,
    byte_order: ByteOrder::Little,
};

const V2_CONSTANTS: VersionedConstants = VersionedConstants {
    code_page_size: OPCODE_SIZE,
    data_page_size: VALUE_SIZE,
    call_stack_page_size: ADDRESS_SIZE,
    user_stack_page_size: VALUE_SIZE,
    max_code_address: 0x0000_ffff,
    header_length: 20,
    byte_order: ByteOrder::Big,
};

impl VersionedConstants {
    /// Returns the constants in effect for `version`, or `None` if the
    /// version is unsupported.
    pub fn for_version(version: u16) -> Option<&'static VersionedConstants> {
        match version {
            1 => Some(&V1_CONSTANTS),
            2 => Some(&V2_CONSTANTS),
            _ => None,
        }
    }
}

/// Reads the version from the first two header bytes and resolves its
/// constants. Version 2 headers are big-endian; version 1 predates that and
/// is little-endian, so both readings are tried, big-endian first.
fn version_from_header(bytes: &[u8]) -> Result<(u16, &'static VersionedConstants), StateError> {
    if bytes.len() < 2 {
        return Err(StateError::Truncated);
    }
    let raw = [bytes[0], bytes[1]];

    let big = u16::from_be_bytes(raw);
    if let Some(constants) = VersionedConstants::for_version(big) {
        return Ok((big, constants));
    }

    let little = u16::from_le_bytes(raw);
    if let Some(constants) = VersionedConstants::for_version(little) {
        return Ok((little, constants));
    }

    Err(StateError::UnsupportedVersion(big))
}

/// Boolean flags packed into a `u32`: `push` shifts left and ORs the flag
/// into the low bit, `pop` reverses that, so restore pops in the opposite
/// order to serialization pushes.
struct Flags(u32);

impl Flags {
    fn new() -> Self {
        Flags(0)
    }

    fn from_value(value: u32) -> Self {
        Flags(value)
    }

    fn push(&mut self, flag: bool) {
        self.0 = (self.0 << 1) | flag as u32;
    }

    fn pop(&mut self) -> bool {
        let flag = self.0 & 1 != 0;
        self.0 >>= 1;
        flag
    }

    fn value(&self) -> u32 {
        self.0
    }
}

/// Bounded reader over serialized state bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], position: usize) -> Self {
        Self { bytes, position }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], StateError> {
        let end = self
            .position
            .checked_add(count)
            .ok_or(StateError::Truncated)?;
        let slice = self
            .bytes
            .get(self.position..end)
            .ok_or(StateError::Truncated)?;
        self.position = end;
        Ok(slice)
    }

    fn read_u32(&mut self, order: ByteOrder) -> Result<u32, StateError> {
        let bytes = self.take(4)?;
        Ok(order.u32_from(bytes.try_into().expect("4 bytes")))
    }

    fn read_i32(&mut self, order: ByteOrder) -> Result<i32, StateError> {
        Ok(self.read_u32(order)? as i32)
    }

    fn read_i64(&mut self, order: ByteOrder) -> Result<i64, StateError> {
        let bytes = self.take(8)?;
        Ok(order.i64_from(bytes.try_into().expect("8 bytes")))
    }
}

/// The complete state of one automated-transaction machine.
pub struct MachineState {
    version: u16,
    reserved: u16,
    num_code_pages: u16,
    num_data_pages: u16,
    num_call_stack_pages: u16,
    num_user_stack_pages: u16,
    min_activation_amount: u64,

    header_bytes: Vec<u8>,
    pub(crate) constants: &'static VersionedConstants,

    /// Offset into code of the next opcode to execute.
    pub(crate) program_counter: u32,
    /// Program counter to restart from after a stop.
    pub(crate) on_stop_address: u32,
    /// Program counter to divert to on execution errors; fatal when unset.
    pub(crate) on_error_address: Option<u32>,

    pub(crate) is_sleeping: bool,
    pub(crate) sleep_until_height: Option<u32>,
    pub(crate) is_stopped: bool,
    pub(crate) is_frozen: bool,
    pub(crate) frozen_balance: Option<u64>,
    pub(crate) is_finished: bool,
    pub(crate) had_fatal_error: bool,

    // 256-bit pseudo-registers, four 64-bit words each.
    pub(crate) a: [i64; 4],
    pub(crate) b: [i64; 4],

    pub(crate) current_block_height: u32,
    pub(crate) current_balance: u64,
    /// Balance after the end of the last execution round.
    pub(crate) previous_balance: u64,
    /// Opcodes processed this round, weighted by their step cost.
    pub(crate) steps: u32,
    pub(crate) is_first_opcode_after_sleeping: bool,

    logger: Logger,

    pub(crate) code: Vec<u8>,
    /// Read position within code; the program counter is synchronized from
    /// this after each opcode completes.
    pub(crate) code_position: usize,
    pub(crate) data: Vec<u8>,
    pub(crate) call_stack: Vec<u8>,
    pub(crate) call_stack_position: usize,
    pub(crate) user_stack: Vec<u8>,
    pub(crate) user_stack_position: usize,
}

impl MachineState {
    /// Allocates a machine from header bytes alone; segments are zeroed.
    fn from_header(header_bytes: &[u8], logger: Logger) -> Result<Self, StateError> {
        let (version, constants) = version_from_header(header_bytes)?;
        if header_bytes.len() != constants.header_length {
            return Err(StateError::HeaderLength {
                actual: header_bytes.len(),
                expected: constants.header_length,
            });
        }

        let order = constants.byte_order;
        let field = |at: usize| order.u16_from([header_bytes[at], header_bytes[at + 1]]);

        let reserved = field(2);

        let num_code_pages = field(4);
        if num_code_pages < 1 {
            return Err(StateError::PageCount("code"));
        }

        let num_data_pages = field(6);
        if num_data_pages < 1 {
            return Err(StateError::PageCount("data"));
        }

        let num_call_stack_pages = field(8);
        let num_user_stack_pages = field(10);

        let min_activation_amount = if constants.header_length > 12 {
            order.u64_from(header_bytes[12..20].try_into().expect("8 bytes"))
        } else {
            0
        };

        let call_stack = vec![0; num_call_stack_pages as usize * constants.call_stack_page_size];
        let user_stack = vec![0; num_user_stack_pages as usize * constants.user_stack_page_size];
        let call_stack_position = call_stack.len();
        let user_stack_position = user_stack.len();

        Ok(Self {
            version,
            reserved,
            num_code_pages,
            num_data_pages,
            num_call_stack_pages,
            num_user_stack_pages,
            min_activation_amount,
            header_bytes: header_bytes.to_vec(),
            constants,
            program_counter: 0,
            on_stop_address: 0,
            on_error_address: None,
            is_sleeping: false,
            sleep_until_height: None,
            is_stopped: false,
            is_frozen: false,
            frozen_balance: None,
            is_finished: false,
            had_fatal_error: false,
            a: [0; 4],
            b: [0; 4],
            current_block_height: 0,
            current_balance: 0,
            previous_balance: 0,
            steps: 0,
            is_first_opcode_after_sleeping: false,
            logger,
            code: vec![0; num_code_pages as usize * constants.code_page_size],
            code_position: 0,
            data: vec![0; num_data_pages as usize * constants.data_page_size],
            call_stack,
            call_stack_position,
            user_stack,
            user_stack_position,
        })
    }

    /// Creates a new machine from creation bytes (`header ‖ code ‖ data`).
    pub fn new(
        api: &dyn Api,
        logger: Logger,
        creation_bytes: &[u8],
    ) -> Result<Self, StateError> {
        let (_, constants) = version_from_header(creation_bytes)?;
        if creation_bytes.len() < constants.header_length {
            return Err(StateError::Truncated);
        }

        let mut state = Self::from_header(&creation_bytes[..constants.header_length], logger)?;

        let code_length = state.code.len();
        let data_length = Self::creation_data_length(creation_bytes.len(), &state)?;

        let code_start = constants.header_length;
        let data_start = code_start + code_length;
        state.code.copy_from_slice(&creation_bytes[code_start..data_start]);
        state.data[..data_length]
            .copy_from_slice(&creation_bytes[data_start..data_start + data_length]);

        state.common_final_construction(api);
        Ok(state)
    }

    /// Validates creation-bytes length against the header page counts and
    /// returns how many data bytes to load.
    ///
    /// The version-1 implementation summed instead of multiplying when
    /// sizing the data segment; that layout is accepted only with the
    /// `legacy-v1-creation` feature, and only the bytes that fit the
    /// allocated segment are loaded.
    fn creation_data_length(
        creation_length: usize,
        state: &MachineState,
    ) -> Result<usize, StateError> {
        let constants = state.constants;
        let code_length = state.code.len();
        let data_length = state.data.len();

        if creation_length == constants.header_length + code_length + data_length {
            return Ok(data_length);
        }

        #[cfg(feature = "legacy-v1-creation")]
        {
            let legacy_data_length =
                state.num_data_pages as usize + constants.data_page_size;
            let legacy = constants.header_length + code_length + legacy_data_length;
            if state.version == 1 && creation_length == legacy {
                return Ok(legacy_data_length.min(data_length));
            }
        }

        Err(StateError::CreationLength)
    }

    /// Creates a machine from separate header, code and data bytes. Code and
    /// data may be shorter than their allocated pages; the remainder stays
    /// zeroed.
    pub fn with_segments(
        api: &dyn Api,
        logger: Logger,
        header_bytes: &[u8],
        code_bytes: &[u8],
        data_bytes: &[u8],
    ) -> Result<Self, StateError> {
        let mut state = Self::from_header(header_bytes, logger)?;

        if code_bytes.len() > state.code.len() {
            return Err(StateError::SegmentOverflow("code"));
        }
        if data_bytes.len() > state.data.len() {
            return Err(StateError::SegmentOverflow("data"));
        }

        state.code[..code_bytes.len()].copy_from_slice(code_bytes);
        state.data[..data_bytes.len()].copy_from_slice(data_bytes);

        state.common_final_construction(api);
        Ok(state)
    }

    fn common_final_construction(&mut self, api: &dyn Api) {
        self.program_counter = 0;
        self.on_stop_address = 0;
        self.on_error_address = None;
        self.is_sleeping = false;
        self.sleep_until_height = None;
        self.is_stopped = false;
        self.is_frozen = false;
        self.frozen_balance = None;
        self.is_finished = false;
        self.had_fatal_error = false;

        // Initial previous balance is the deployment balance.
        self.previous_balance = api.current_balance(self);

        // A minimum activation amount creates the machine frozen; the
        // current balance must exceed frozen_balance to unfreeze, hence the
        // minus one.
        if self.min_activation_amount > 0 {
            self.is_frozen = true;
            self.frozen_balance = Some(self.min_activation_amount - 1);
        }
    }

    /// Builds creation bytes for deploying a new machine. Page counts are
    /// derived from the byte lengths; code and data are zero-padded to whole
    /// pages. Version 1 headers have no activation amount field, so
    /// `min_activation_amount` only applies to version 2.
    pub fn to_creation_bytes(
        version: u16,
        code_bytes: &[u8],
        data_bytes: &[u8],
        num_call_stack_pages: u16,
        num_user_stack_pages: u16,
        min_activation_amount: u64,
    ) -> Result<Vec<u8>, StateError> {
        let constants = VersionedConstants::for_version(version)
            .ok_or(StateError::UnsupportedVersion(version))?;

        if code_bytes.is_empty() {
            return Err(StateError::EmptySegment("code"));
        }
        if data_bytes.is_empty() {
            return Err(StateError::EmptySegment("data"));
        }

        let num_code_pages = ((code_bytes.len() - 1) / constants.code_page_size + 1) as u16;
        let num_data_pages = ((data_bytes.len() - 1) / constants.data_page_size + 1) as u16;

        let code_length = num_code_pages as usize * constants.code_page_size;
        let data_length = num_data_pages as usize * constants.data_page_size;

        let order = constants.byte_order;
        let mut bytes =
            Vec::with_capacity(constants.header_length + code_length + data_length);

        order.put_u16(&mut bytes, version);
        order.put_u16(&mut bytes, 0); // reserved
        order.put_u16(&mut bytes, num_code_pages);
        order.put_u16(&mut bytes, num_data_pages);
        order.put_u16(&mut bytes, num_call_stack_pages);
        order.put_u16(&mut bytes, num_user_stack_pages);
        if constants.header_length > 12 {
            order.put_u64(&mut bytes, min_activation_amount);
        }

        bytes.extend_from_slice(code_bytes);
        bytes.resize(constants.header_length + code_length, 0);
        bytes.extend_from_slice(data_bytes);
        bytes.resize(constants.header_length + code_length + data_length, 0);

        Ok(bytes)
    }

    /// Serializes the volatile state. Code bytes are not included; they are
    /// invariant and supplied again on restore.
    pub fn to_bytes(&self) -> Vec<u8> {
        let order = self.constants.byte_order;
        let mut bytes = self.header_bytes.clone();

        bytes.extend_from_slice(&self.data);

        // Stacks: only the bytes actually in use.
        let call_stack_length = self.call_stack.len() - self.call_stack_position;
        order.put_u32(&mut bytes, call_stack_length as u32);
        bytes.extend_from_slice(&self.call_stack[self.call_stack_position..]);

        let user_stack_length = self.user_stack.len() - self.user_stack_position;
        order.put_u32(&mut bytes, user_stack_length as u32);
        bytes.extend_from_slice(&self.user_stack[self.user_stack_position..]);

        order.put_i32(&mut bytes, self.program_counter as i32);
        order.put_i32(&mut bytes, self.on_stop_address as i32);
        if self.version >= 2 {
            order.put_i64(&mut bytes, self.previous_balance as i64);
        }

        let has_non_zero_a = self.a != [0; 4];
        let has_non_zero_b = self.b != [0; 4];

        let mut flags = Flags::new();
        flags.push(self.is_sleeping);
        flags.push(self.is_stopped);
        flags.push(self.is_finished);
        flags.push(self.had_fatal_error);
        flags.push(self.is_frozen);
        flags.push(self.on_error_address.is_some());
        flags.push(self.sleep_until_height.is_some());
        flags.push(self.frozen_balance.is_some());
        flags.push(has_non_zero_a);
        flags.push(has_non_zero_b);
        order.put_u32(&mut bytes, flags.value());

        // Optional flag-indicated extras, in the same order as the pushes.
        if let Some(address) = self.on_error_address {
            order.put_i32(&mut bytes, address as i32);
        }
        if let Some(height) = self.sleep_until_height {
            order.put_i32(&mut bytes, height as i32);
        }
        if let Some(balance) = self.frozen_balance {
            order.put_i64(&mut bytes, balance as i64);
        }
        if has_non_zero_a {
            for word in self.a {
                order.put_i64(&mut bytes, word);
            }
        }
        if has_non_zero_b {
            for word in self.b {
                order.put_i64(&mut bytes, word);
            }
        }

        bytes
    }

    /// Restores a machine from serialized state plus its invariant code
    /// bytes.
    pub fn from_bytes(
        state_bytes: &[u8],
        code_bytes: &[u8],
        logger: Logger,
    ) -> Result<Self, StateError> {
        let (_, constants) = version_from_header(state_bytes)?;
        if state_bytes.len() < constants.header_length {
            return Err(StateError::Truncated);
        }

        let mut state = Self::from_header(&state_bytes[..constants.header_length], logger)?;
        let order = state.constants.byte_order;

        if code_bytes.len() != state.code.len() {
            return Err(StateError::CodeLength);
        }
        state.code.copy_from_slice(code_bytes);

        let mut reader = Reader::new(state_bytes, constants.header_length);

        let data_length = state.data.len();
        state.data.copy_from_slice(reader.take(data_length)?);

        let call_stack_length = reader.read_u32(order)? as usize;
        if call_stack_length > state.call_stack.len() {
            return Err(StateError::StackLength("call"));
        }
        state.call_stack_position = state.call_stack.len() - call_stack_length;
        let position = state.call_stack_position;
        state.call_stack[position..].copy_from_slice(reader.take(call_stack_length)?);

        let user_stack_length = reader.read_u32(order)? as usize;
        if user_stack_length > state.user_stack.len() {
            return Err(StateError::StackLength("user"));
        }
        state.user_stack_position = state.user_stack.len() - user_stack_length;
        let position = state.user_stack_position;
        state.user_stack[position..].copy_from_slice(reader.take(user_stack_length)?);

        state.program_counter = reader.read_i32(order)? as u32;
        state.on_stop_address = reader.read_i32(order)? as u32;
        if state.version >= 2 {
            state.previous_balance = reader.read_i64(order)? as u64;
        }

        // Flags pop in reverse push order.
        let mut flags = Flags::from_value(reader.read_u32(order)?);
        let has_non_zero_b = flags.pop();
        let has_non_zero_a = flags.pop();
        let has_frozen_balance = flags.pop();
        let has_sleep_until_height = flags.pop();
        let has_on_error_address = flags.pop();
        state.is_frozen = flags.pop();
        state.had_fatal_error = flags.pop();
        state.is_finished = flags.pop();
        state.is_stopped = flags.pop();
        state.is_sleeping = flags.pop();

        if has_on_error_address {
            state.on_error_address = Some(reader.read_i32(order)? as u32);
        }
        if has_sleep_until_height {
            state.sleep_until_height = Some(reader.read_i32(order)? as u32);
        }
        if has_frozen_balance {
            state.frozen_balance = Some(reader.read_i64(order)? as u64);
        }
        if has_non_zero_a {
            for word in state.a.iter_mut() {
                *word = reader.read_i64(order)?;
            }
        }
        if has_non_zero_b {
            for word in state.b.iter_mut() {
                *word = reader.read_i64(order)?;
            }
        }

        Ok(state)
    }

    /// Pulls just the data segment out of serialized state bytes, for
    /// external analysis such as confirming expected payouts.
    pub fn extract_data_bytes(state_bytes: &[u8]) -> Result<Vec<u8>, StateError> {
        let (_, constants) = version_from_header(state_bytes)?;
        if state_bytes.len() < constants.header_length {
            return Err(StateError::Truncated);
        }

        let order = constants.byte_order;
        let num_data_pages = order.u16_from([state_bytes[6], state_bytes[7]]);
        let data_length = num_data_pages as usize * constants.data_page_size;

        let start = constants.header_length;
        state_bytes
            .get(start..start + data_length)
            .map(|bytes| bytes.to_vec())
            .ok_or(StateError::Truncated)
    }

    // Header accessors.

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn reserved(&self) -> u16 {
        self.reserved
    }

    pub fn num_code_pages(&self) -> u16 {
        self.num_code_pages
    }

    pub fn num_data_pages(&self) -> u16 {
        self.num_data_pages
    }

    pub fn num_call_stack_pages(&self) -> u16 {
        self.num_call_stack_pages
    }

    pub fn num_user_stack_pages(&self) -> u16 {
        self.num_user_stack_pages
    }

    pub fn min_activation_amount(&self) -> u64 {
        self.min_activation_amount
    }

    // Execution-state accessors.

    pub fn program_counter(&self) -> u32 {
        self.program_counter
    }

    pub fn on_stop_address(&self) -> u32 {
        self.on_stop_address
    }

    pub fn on_error_address(&self) -> Option<u32> {
        self.on_error_address
    }

    pub fn is_sleeping(&self) -> bool {
        self.is_sleeping
    }

    /// For host API use: a function such as random generation may defer the
    /// machine to the next block by putting it to sleep.
    pub fn set_is_sleeping(&mut self, is_sleeping: bool) {
        self.is_sleeping = is_sleeping;
    }

    pub fn sleep_until_height(&self) -> Option<u32> {
        self.sleep_until_height
    }

    pub fn set_sleep_until_height(&mut self, height: Option<u32>) {
        self.sleep_until_height = height;
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    pub fn is_frozen(&self) -> bool {
        self.is_frozen
    }

    pub fn frozen_balance(&self) -> Option<u64> {
        self.frozen_balance
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub fn had_fatal_error(&self) -> bool {
        self.had_fatal_error
    }

    pub fn current_block_height(&self) -> u32 {
        self.current_block_height
    }

    /// Steps consumed this round; the host uses this to settle the final
    /// execution fee.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn current_balance(&self) -> u64 {
        self.current_balance
    }

    pub fn previous_balance(&self) -> u64 {
        self.previous_balance
    }

    /// True while executing the first opcode after waking from sleep;
    /// queried by hosts that defer work across blocks.
    pub fn is_first_opcode_after_sleeping(&self) -> bool {
        self.is_first_opcode_after_sleeping
    }

    pub fn a(&self) -> [i64; 4] {
        self.a
    }

    pub fn set_a(&mut self, words: [i64; 4]) {
        self.a = words;
    }

    pub fn b(&self) -> [i64; 4] {
        self.b
    }

    pub fn set_b(&mut self, words: [i64; 4]) {
        self.b = words;
    }

    /// Code bytes are read-only and stored separately from state bytes.
    pub fn code_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn data_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads the data cell at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the data segment; host-side inspection
    /// should stay within `num_data_pages`.
    pub fn data_value(&self, index: usize) -> i64 {
        let offset = index * VALUE_SIZE;
        i64::from_le_bytes(self.data[offset..offset + VALUE_SIZE].try_into().expect("8 bytes"))
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Rewinds the code read position, so the opcode at `position - offset`
    /// re-executes. The program counter itself is synchronized from the code
    /// position after each opcode.
    pub(crate) fn rewind_code_position(&mut self, offset: usize) {
        self.code_position -= offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        execute, get_data, test_header, TestApi, TEST_DATA_PAGES, TEST_INITIAL_BALANCE,
    };

    fn logger() -> Logger {
        Logger::new("machine-test")
    }

    #[test]
    fn version_detection_tries_big_endian_first() {
        let (version, constants) = version_from_header(&[0x00, 0x02]).unwrap();
        assert_eq!(version, 2);
        assert_eq!(constants.byte_order, ByteOrder::Big);
        assert_eq!(constants.header_length, 20);

        let (version, constants) = version_from_header(&[0x01, 0x00]).unwrap();
        assert_eq!(version, 1);
        assert_eq!(constants.byte_order, ByteOrder::Little);
        assert_eq!(constants.header_length, 12);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        assert!(matches!(
            version_from_header(&[0x00, 0x09]),
            Err(StateError::UnsupportedVersion(9))
        ));
        assert!(matches!(
            MachineState::to_creation_bytes(9, &[0x28], &[0; 8], 1, 1, 0),
            Err(StateError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn flags_pop_in_reverse_push_order() {
        let mut flags = Flags::new();
        flags.push(true);
        flags.push(false);
        flags.push(true);
        assert_eq!(flags.value(), 0b101);

        let mut flags = Flags::from_value(flags.value());
        assert!(flags.pop());
        assert!(!flags.pop());
        assert!(flags.pop());
    }

    #[test]
    fn creation_bytes_round_trip() {
        let api = TestApi::new();
        let code = [OPCODE_SIZE as u8; 3]; // content is irrelevant here
        let data = 7i64.to_le_bytes();

        let creation =
            MachineState::to_creation_bytes(2, &code, &data, 4, 8, 250).unwrap();
        assert_eq!(creation.len(), 20 + 3 + 8);

        let state = MachineState::new(&api, logger(), &creation).unwrap();
        assert_eq!(state.version(), 2);
        assert_eq!(state.num_code_pages(), 3);
        assert_eq!(state.num_data_pages(), 1);
        assert_eq!(state.num_call_stack_pages(), 4);
        assert_eq!(state.num_user_stack_pages(), 8);
        assert_eq!(state.min_activation_amount(), 250);
        assert_eq!(state.code_bytes(), &code);
        assert_eq!(state.data_value(0), 7);

        // Deployment balance becomes the initial previous balance.
        assert_eq!(state.previous_balance(), TEST_INITIAL_BALANCE);
        // A non-zero activation amount deploys the machine frozen.
        assert!(state.is_frozen());
        assert_eq!(state.frozen_balance(), Some(249));
    }

    #[test]
    fn creation_bytes_pad_segments_to_whole_pages() {
        // Version 1 pages are 256 bytes.
        let creation =
            MachineState::to_creation_bytes(1, &[0x28; 10], &[0xff; 20], 1, 1, 0).unwrap();
        assert_eq!(creation.len(), 12 + 256 + 256);
        assert_eq!(creation[12 + 10], 0);
        assert_eq!(creation[12 + 256 + 19], 0xff);
        assert_eq!(creation[12 + 256 + 20], 0);
    }

    #[test]
    fn creation_length_mismatch_is_rejected() {
        let mut creation =
            MachineState::to_creation_bytes(2, &[0x28], &[0; 8], 1, 1, 0).unwrap();
        creation.push(0xff);

        let api = TestApi::new();
        assert!(matches!(
            MachineState::new(&api, logger(), &creation),
            Err(StateError::CreationLength)
        ));
    }

    #[test]
    fn v1_additive_creation_length_is_rejected() {
        // The historical version-1 length check summed the data page count
        // and page size instead of multiplying them.
        let legacy_length = 12 + 256 + 1 + 256;
        let mut creation = vec![0u8; legacy_length];
        creation[0] = 1; // version, little-endian
        creation[4] = 1; // one code page
        creation[6] = 1; // one data page

        let api = TestApi::new();
        let result = MachineState::new(&api, logger(), &creation);
        #[cfg(not(feature = "legacy-v1-creation"))]
        assert!(matches!(result, Err(StateError::CreationLength)));
        #[cfg(feature = "legacy-v1-creation")]
        assert!(result.is_ok());
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!(matches!(
            MachineState::to_creation_bytes(2, &[], &[0; 8], 1, 1, 0),
            Err(StateError::EmptySegment("code"))
        ));
        assert!(matches!(
            MachineState::to_creation_bytes(2, &[0x28], &[], 1, 1, 0),
            Err(StateError::EmptySegment("data"))
        ));
    }

    #[test]
    fn zero_page_counts_are_rejected() {
        let api = TestApi::new();
        let mut header = test_header();
        header[4] = 0;
        header[5] = 0; // zero code pages
        assert!(matches!(
            MachineState::with_segments(&api, logger(), &header, &[0x28], &[]),
            Err(StateError::PageCount("code"))
        ));
    }

    #[test]
    fn header_length_must_match_version() {
        let api = TestApi::new();
        let mut header = test_header();
        header.pop();
        assert!(matches!(
            MachineState::with_segments(&api, logger(), &header, &[0x28], &[]),
            Err(StateError::HeaderLength {
                actual: 19,
                expected: 20
            })
        ));
    }

    #[test]
    fn oversized_segments_are_rejected() {
        let api = TestApi::new();
        let header = test_header();
        let too_much_data = vec![0; (TEST_DATA_PAGES as usize + 1) * VALUE_SIZE];
        assert!(matches!(
            MachineState::with_segments(&api, logger(), &header, &[0x28], &too_much_data),
            Err(StateError::SegmentOverflow("data"))
        ));
    }

    #[test]
    fn fresh_state_serializes_to_fixed_length() {
        let api = TestApi::new();
        let state =
            MachineState::with_segments(&api, logger(), &test_header(), &[0x28], &[]).unwrap();

        // header + data + two empty stacks + pc + stop + previous balance
        // + flags, with no optional extras.
        let expected = 20 + TEST_DATA_PAGES as usize * VALUE_SIZE + 4 + 4 + 4 + 4 + 8 + 4;
        assert_eq!(state.to_bytes().len(), expected);
    }

    #[test]
    fn from_bytes_requires_matching_code_length() {
        let api = TestApi::new();
        let state =
            MachineState::with_segments(&api, logger(), &test_header(), &[0x28], &[]).unwrap();
        let serialized = state.to_bytes();

        assert!(matches!(
            MachineState::from_bytes(&serialized, &[0x28], logger()),
            Err(StateError::CodeLength)
        ));
    }

    #[test]
    fn truncated_state_bytes_are_rejected() {
        let api = TestApi::new();
        let state =
            MachineState::with_segments(&api, logger(), &test_header(), &[0x28], &[]).unwrap();
        let serialized = state.to_bytes();

        assert!(matches!(
            MachineState::from_bytes(&serialized[..serialized.len() - 1], state.code_bytes(), logger()),
            Err(StateError::Truncated)
        ));
    }

    #[test]
    fn extract_data_bytes_returns_the_data_segment() {
        let api = TestApi::new();
        let data = 0x1122334455667788i64.to_le_bytes();
        let state =
            MachineState::with_segments(&api, logger(), &test_header(), &[0x28], &data).unwrap();

        let extracted = MachineState::extract_data_bytes(&state.to_bytes()).unwrap();
        assert_eq!(extracted, state.data_bytes());
        assert_eq!(&extracted[..8], &data);
    }

    #[test]
    fn v1_machine_runs_and_round_trips_little_endian() {
        // SET_VAL @2, 2222 then FIN_IMD, with little-endian operands.
        let mut code = vec![0x01];
        code.extend_from_slice(&2i32.to_le_bytes());
        code.extend_from_slice(&2222i64.to_le_bytes());
        code.push(0x28);

        // version 1, one page of everything.
        let header: Vec<u8> = [1u16, 0, 1, 1, 1, 1]
            .iter()
            .flat_map(|field| field.to_le_bytes())
            .collect();

        let mut api = TestApi::new();
        let mut state =
            MachineState::with_segments(&api, logger(), &header, &code, &[]).unwrap();
        assert_eq!(state.version(), 1);
        assert_eq!(state.data_bytes().len(), 256);

        execute(&mut state, &mut api);
        assert!(state.is_finished());
        assert!(!state.had_fatal_error());
        assert_eq!(get_data(&state, 2), 2222);

        // Data cells stay little-endian regardless of version.
        assert_eq!(state.data_bytes()[16], 0xae);
        assert_eq!(state.data_bytes()[17], 0x08);

        let serialized = state.to_bytes();
        // Version 1 omits the previous balance from serialized state.
        assert_eq!(serialized.len(), 12 + 256 + 4 + 4 + 4 + 4 + 4);

        let restored =
            MachineState::from_bytes(&serialized, state.code_bytes(), logger()).unwrap();
        assert_eq!(restored.to_bytes(), serialized);
        assert!(restored.is_finished());
        assert_eq!(restored.data_value(2), 2222);
    }

    #[test]
    fn v2_data_cells_are_little_endian_within_big_endian_state() {
        let api = TestApi::new();
        let data = 0x0102030405060708i64.to_le_bytes();
        let state =
            MachineState::with_segments(&api, logger(), &test_header(), &[0x28], &data).unwrap();

        assert_eq!(state.data_value(0), 0x0102030405060708);
        assert_eq!(state.data_bytes()[0], 0x08);

        // The serialized form carries the data segment verbatim.
        let serialized = state.to_bytes();
        assert_eq!(serialized[20], 0x08);
        assert_eq!(serialized[27], 0x01);
    }
}
