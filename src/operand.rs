//! Operand fetching and address validation.
//!
//! Operands are consumed from the code segment at the machine's read
//! position, which advances with each fetch; the program counter is only
//! synchronized afterwards, so a failed fetch never commits a partial
//! decode to the PC. Every address is validated here before any handler can
//! touch memory through it.

use crate::errors::ExecutionError;
use crate::machine::{MachineState, ADDRESS_SIZE, VALUE_SIZE};

impl MachineState {
    /// Consumes `count` code bytes at the read position.
    fn fetch(&mut self, count: usize, what: &'static str) -> Result<&[u8], ExecutionError> {
        let start = self.code_position;
        let end = start + count;
        if end > self.code.len() {
            return Err(ExecutionError::CodeSegment(what));
        }
        self.code_position = end;
        Ok(&self.code[start..end])
    }

    /// Consumes the next raw opcode byte.
    pub(crate) fn fetch_opcode_byte(&mut self) -> Result<u8, ExecutionError> {
        Ok(self.fetch(1, "no code bytes left to fetch opcode")?[0])
    }

    /// Consumes a two-byte raw function code.
    pub(crate) fn fetch_function_code(&mut self) -> Result<u16, ExecutionError> {
        let order = self.constants.byte_order;
        let bytes = self.fetch(2, "no code bytes left to fetch function code")?;
        Ok(order.u16_from(bytes.try_into().expect("2 bytes")))
    }

    /// Consumes a code address and validates it against both
    /// `MAX_CODE_ADDRESS` and the code segment length.
    pub(crate) fn fetch_code_address(&mut self) -> Result<u32, ExecutionError> {
        let address = self.fetch_raw_code_address()?;
        self.check_code_address(address)
    }

    /// Consumes a code address without validating it; used by ERR_ADR,
    /// whose all-ones sentinel is not an address.
    pub(crate) fn fetch_raw_code_address(&mut self) -> Result<i32, ExecutionError> {
        let order = self.constants.byte_order;
        let bytes = self.fetch(ADDRESS_SIZE, "no code bytes left to fetch code address")?;
        Ok(order.i32_from(bytes.try_into().expect("4 bytes")))
    }

    /// Validates a code address fetched or computed elsewhere.
    pub(crate) fn check_code_address(&self, address: i32) -> Result<u32, ExecutionError> {
        if address < 0
            || address as u32 > self.constants.max_code_address
            || address as usize >= self.code.len()
        {
            return Err(ExecutionError::InvalidAddress(format!(
                "code address {address:#06x} out of bounds"
            )));
        }
        Ok(address as u32)
    }

    /// Consumes a data address operand and returns the validated byte
    /// offset of its cell.
    pub(crate) fn fetch_data_offset(&mut self) -> Result<usize, ExecutionError> {
        let order = self.constants.byte_order;
        let bytes = self.fetch(ADDRESS_SIZE, "no code bytes left to fetch data address")?;
        let index = order.i32_from(bytes.try_into().expect("4 bytes")) as i64;
        self.check_data_cell(index, 1)
    }

    /// Consumes a one-byte signed branch offset.
    pub(crate) fn fetch_code_offset(&mut self) -> Result<i8, ExecutionError> {
        Ok(self.fetch(1, "no code bytes left to fetch branch offset")?[0] as i8)
    }

    /// Consumes an eight-byte immediate value.
    pub(crate) fn fetch_code_value(&mut self) -> Result<i64, ExecutionError> {
        let order = self.constants.byte_order;
        let bytes = self.fetch(VALUE_SIZE, "no code bytes left to fetch immediate value")?;
        Ok(order.i64_from(bytes.try_into().expect("8 bytes")))
    }

    /// Number of addressable cells in the data segment.
    pub(crate) fn num_data_cells(&self) -> i64 {
        (self.data.len() / VALUE_SIZE) as i64
    }

    /// Validates that cells `index .. index + count` lie inside the data
    /// segment and returns the byte offset of the first. Indirect indices
    /// pass through here as well, so computed addresses (including sums that
    /// wrapped negative) are caught before use.
    pub(crate) fn check_data_cell(&self, index: i64, count: u32) -> Result<usize, ExecutionError> {
        let max = self.num_data_cells() - count as i64;
        if index < 0 || index > max {
            return Err(ExecutionError::InvalidAddress(format!(
                "data address {index} out of bounds: 0 to {max}"
            )));
        }
        Ok(index as usize * VALUE_SIZE)
    }

    /// Reads the data cell at a validated byte offset.
    pub(crate) fn data_value_at(&self, offset: usize) -> i64 {
        i64::from_le_bytes(
            self.data[offset..offset + VALUE_SIZE]
                .try_into()
                .expect("8 bytes"),
        )
    }

    /// Writes the data cell at a validated byte offset.
    pub(crate) fn set_data_value_at(&mut self, offset: usize, value: i64) {
        self.data[offset..offset + VALUE_SIZE].copy_from_slice(&value.to_le_bytes());
    }

    /// Pushes a return address onto the call stack.
    pub(crate) fn push_call_stack(&mut self, address: u32) -> Result<(), ExecutionError> {
        if self.call_stack_position < ADDRESS_SIZE {
            return Err(ExecutionError::StackBounds("call stack overflow"));
        }
        self.call_stack_position -= ADDRESS_SIZE;
        let order = self.constants.byte_order;
        let position = self.call_stack_position;
        order.write_u32(
            &mut self.call_stack[position..position + ADDRESS_SIZE],
            address,
        );
        Ok(())
    }

    /// Pops a return address from the call stack.
    pub(crate) fn pop_call_stack(&mut self) -> Result<i32, ExecutionError> {
        let position = self.call_stack_position;
        if position + ADDRESS_SIZE > self.call_stack.len() {
            return Err(ExecutionError::StackBounds("call stack underflow"));
        }
        let order = self.constants.byte_order;
        let address = order.i32_from(
            self.call_stack[position..position + ADDRESS_SIZE]
                .try_into()
                .expect("4 bytes"),
        );
        self.call_stack_position = position + ADDRESS_SIZE;
        Ok(address)
    }

    /// Pushes a value onto the user stack.
    pub(crate) fn push_user_stack(&mut self, value: i64) -> Result<(), ExecutionError> {
        if self.user_stack_position < VALUE_SIZE {
            return Err(ExecutionError::StackBounds("user stack overflow"));
        }
        self.user_stack_position -= VALUE_SIZE;
        let order = self.constants.byte_order;
        let position = self.user_stack_position;
        order.write_i64(&mut self.user_stack[position..position + VALUE_SIZE], value);
        Ok(())
    }

    /// Pops a value from the user stack.
    pub(crate) fn pop_user_stack(&mut self) -> Result<i64, ExecutionError> {
        let position = self.user_stack_position;
        if position + VALUE_SIZE > self.user_stack.len() {
            return Err(ExecutionError::StackBounds("user stack underflow"));
        }
        let order = self.constants.byte_order;
        let value = order.i64_from(
            self.user_stack[position..position + VALUE_SIZE]
                .try_into()
                .expect("8 bytes"),
        );
        self.user_stack_position = position + VALUE_SIZE;
        Ok(value)
    }

    /// Synchronizes the program counter from the code read position; called
    /// after each opcode so branches and jumps take effect.
    pub(crate) fn sync_program_counter(&mut self) {
        self.program_counter = self.code_position as u32;
    }
}
