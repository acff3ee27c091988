//! The round driver: opcode fetch, step metering and execution.
//!
//! A [`Vm`] borrows one machine and its host API for the duration of a
//! single execution round. Rounds are bounded by the host's step budget and
//! the machine's balance; execution yields only between opcodes, by raising
//! one of the sleeping/stopped/frozen/finished flags.
//!
//! During an opcode the program counter still points at the opcode byte;
//! operand decoding advances the machine's code position, which is
//! synchronized back into the program counter only after the opcode
//! completes. Branches and jumps work by moving the code position.

use crate::api::Api;
use crate::errors::ExecutionError;
use crate::functions::{FunctionCode, FunctionData};
use crate::isa::OpCode;
use crate::machine::MachineState;

/// Executes rounds for one machine against one host API.
pub struct Vm<'a, A: Api + ?Sized> {
    state: &'a mut MachineState,
    api: &'a mut A,
}

enum RoundControl {
    Continue,
    Break,
}

impl<'a, A: Api + ?Sized> Vm<'a, A> {
    pub fn new(state: &'a mut MachineState, api: &'a mut A) -> Self {
        Self { state, api }
    }

    /// Performs one round of execution.
    ///
    /// On return the caller is expected to read
    /// [`MachineState::current_balance`] to update its account records and
    /// [`MachineState::steps`] to settle the final execution fee.
    pub fn execute_round(&mut self) {
        self.state.steps = 0;
        self.state.current_block_height = self.api.current_block_height();
        self.state.current_balance = self.api.current_balance(self.state);
        self.state.is_first_opcode_after_sleeping = false;

        // Pre-round gates.
        if self.state.is_finished {
            self.state.logger().debug("not executing as already finished");
            return;
        }

        if self.state.is_frozen {
            if let Some(frozen_balance) = self.state.frozen_balance {
                if self.state.current_balance <= frozen_balance {
                    self.state.logger().debug(&format!(
                        "not executing as current balance [{}] hasn't increased since being frozen at [{}]",
                        self.state.current_balance, frozen_balance
                    ));
                    return;
                }
            }
        }

        if self.state.is_sleeping {
            if let Some(height) = self.state.sleep_until_height {
                if self.state.current_block_height < height {
                    self.state.logger().debug(&format!(
                        "not executing as block height [{}] hasn't reached sleep-until height [{}]",
                        self.state.current_block_height, height
                    ));
                    return;
                }
            }
        }

        // Waking from sleep is observable by function codes that deferred
        // work to this block.
        if self.state.is_sleeping {
            self.state.is_first_opcode_after_sleeping = true;
        }

        // Reset for this round.
        self.state.is_sleeping = false;
        self.state.sleep_until_height = None;
        self.state.is_stopped = false;
        self.state.is_frozen = false;
        self.state.frozen_balance = None;

        let fee_per_step = self.api.fee_per_step();
        let max_steps = self.api.max_steps_per_round();

        self.state.code_position = self.state.program_counter as usize;

        while !self.state.is_sleeping
            && !self.state.is_stopped
            && !self.state.is_finished
            && !self.state.is_frozen
        {
            match self.execute_next_opcode(fee_per_step, max_steps) {
                Ok(RoundControl::Continue) => {}
                Ok(RoundControl::Break) => break,
                Err(error) => {
                    self.state.logger().error(&format!(
                        "error at PC {:04x}: {error}",
                        self.state.program_counter
                    ));

                    match self.state.on_error_address {
                        None => {
                            self.state.is_finished = true;
                            self.state.had_fatal_error = true;
                            self.api.on_fatal_error(self.state, &error);
                            break;
                        }
                        Some(address) => {
                            // The step and fee charge for the faulting
                            // opcode are retained.
                            self.state.program_counter = address;
                            self.state.code_position = address as usize;
                        }
                    }
                }
            }

            self.state.is_first_opcode_after_sleeping = false;
        }

        if self.state.is_sleeping {
            match self.state.sleep_until_height {
                Some(height) => self
                    .state
                    .logger()
                    .debug(&format!("sleeping until block {height}")),
                None => self.state.logger().debug("sleeping until next block"),
            }
        }

        if self.state.is_stopped {
            self.state.logger().debug(&format!(
                "setting program counter to stop address {:04x}",
                self.state.on_stop_address
            ));
            self.state.program_counter = self.state.on_stop_address;
        }

        if self.state.is_finished {
            self.state
                .logger()
                .debug("finished - refunding remaining funds back to creator");
            let remaining_balance = self.state.current_balance;
            self.api.on_finished(remaining_balance, self.state);
            self.state.current_balance = 0;
        }

        // Ready for the next round.
        self.state.previous_balance = self.state.current_balance;
    }

    /// Fetches, meters, charges and executes a single opcode.
    fn execute_next_opcode(
        &mut self,
        fee_per_step: u64,
        max_steps: u32,
    ) -> Result<RoundControl, ExecutionError> {
        let raw_opcode = self.state.fetch_opcode_byte()?;
        let opcode = OpCode::from_byte(raw_opcode).ok_or_else(|| {
            ExecutionError::IllegalOperation(format!("opcode 0x{raw_opcode:02x} not recognised"))
        })?;

        if self.state.logger().debug_enabled() {
            self.state.logger().debug(&format!(
                "[PC: {:04x}] {}",
                self.state.program_counter,
                opcode.mnemonic()
            ));
        }

        let opcode_steps = self.api.opcode_steps(opcode);
        let opcode_fee = opcode_steps as u64 * fee_per_step;

        if self.state.steps.saturating_add(opcode_steps) > max_steps {
            self.state.logger().debug(&format!(
                "enforced sleep due to exceeding maximum of {max_steps} steps per round"
            ));
            self.state.is_sleeping = true;
            return Ok(RoundControl::Break);
        }

        if self.state.current_balance < opcode_fee {
            self.state.logger().debug("frozen due to lack of balance");
            self.state.is_frozen = true;
            self.state.frozen_balance = Some(self.state.current_balance);
            return Ok(RoundControl::Break);
        }

        self.state.current_balance -= opcode_fee;
        self.state.steps += opcode_steps;

        self.execute_opcode(opcode)?;

        // Pick up branches and jumps.
        self.state.sync_program_counter();
        Ok(RoundControl::Continue)
    }

    fn execute_opcode(&mut self, opcode: OpCode) -> Result<(), ExecutionError> {
        match opcode {
            OpCode::Nop => Ok(()),

            OpCode::SetVal => {
                let dest = self.state.fetch_data_offset()?;
                let value = self.state.fetch_code_value()?;
                self.state.set_data_value_at(dest, value);
                Ok(())
            }
            OpCode::SetDat => self.binary_op(|_, source| source),
            OpCode::ClrDat => self.unary_op(|_| 0),
            OpCode::IncDat => self.unary_op(|value| value.wrapping_add(1)),
            OpCode::DecDat => self.unary_op(|value| value.wrapping_sub(1)),
            OpCode::AddDat => self.binary_op(|dest, source| dest.wrapping_add(source)),
            OpCode::SubDat => self.binary_op(|dest, source| dest.wrapping_sub(source)),
            OpCode::MulDat => self.binary_op(|dest, source| dest.wrapping_mul(source)),
            OpCode::DivDat => self.checked_binary_op(|dest, source| {
                if source == 0 {
                    return Err(ExecutionError::DivisionByZero);
                }
                Ok(dest.wrapping_div(source))
            }),
            OpCode::ModDat => self.checked_binary_op(|dest, source| {
                if source == 0 {
                    return Err(ExecutionError::DivisionByZero);
                }
                Ok(dest.wrapping_rem(source))
            }),
            OpCode::BorDat => self.binary_op(|dest, source| dest | source),
            OpCode::AndDat => self.binary_op(|dest, source| dest & source),
            OpCode::XorDat => self.binary_op(|dest, source| dest ^ source),
            OpCode::NotDat => self.unary_op(|value| !value),
            OpCode::ShlDat => self.binary_op(shift_left),
            OpCode::ShrDat => self.binary_op(shift_right),

            OpCode::SetInd => {
                let dest = self.state.fetch_data_offset()?;
                let address = self.state.fetch_data_offset()?;
                let index = self.state.data_value_at(address);
                let indirect = self.state.check_data_cell(index, 1)?;
                let value = self.state.data_value_at(indirect);
                self.state.set_data_value_at(dest, value);
                Ok(())
            }
            OpCode::SetIdx => {
                let dest = self.state.fetch_data_offset()?;
                let base = self.state.fetch_data_offset()?;
                let index_address = self.state.fetch_data_offset()?;
                let index = self
                    .state
                    .data_value_at(base)
                    .wrapping_add(self.state.data_value_at(index_address));
                let indirect = self.state.check_data_cell(index, 1)?;
                let value = self.state.data_value_at(indirect);
                self.state.set_data_value_at(dest, value);
                Ok(())
            }
            OpCode::IndDat => {
                let address = self.state.fetch_data_offset()?;
                let source = self.state.fetch_data_offset()?;
                let index = self.state.data_value_at(address);
                let indirect = self.state.check_data_cell(index, 1)?;
                let value = self.state.data_value_at(source);
                self.state.set_data_value_at(indirect, value);
                Ok(())
            }
            OpCode::IdxDat => {
                let base = self.state.fetch_data_offset()?;
                let index_address = self.state.fetch_data_offset()?;
                let source = self.state.fetch_data_offset()?;
                let index = self
                    .state
                    .data_value_at(base)
                    .wrapping_add(self.state.data_value_at(index_address));
                let indirect = self.state.check_data_cell(index, 1)?;
                let value = self.state.data_value_at(source);
                self.state.set_data_value_at(indirect, value);
                Ok(())
            }

            OpCode::PshDat => {
                let source = self.state.fetch_data_offset()?;
                let value = self.state.data_value_at(source);
                self.state.push_user_stack(value)
            }
            OpCode::PopDat => {
                let dest = self.state.fetch_data_offset()?;
                let value = self.state.pop_user_stack()?;
                self.state.set_data_value_at(dest, value);
                Ok(())
            }
            OpCode::JmpSub => {
                let address = self.state.fetch_code_address()?;
                let return_address = self.state.code_position as u32;
                self.state.push_call_stack(return_address)?;
                self.state.code_position = address as usize;
                Ok(())
            }
            OpCode::RetSub => {
                let raw_address = self.state.pop_call_stack()?;
                let address = self.state.check_code_address(raw_address)?;
                self.state.code_position = address as usize;
                Ok(())
            }

            OpCode::JmpAdr => {
                let address = self.state.fetch_code_address()?;
                self.state.code_position = address as usize;
                Ok(())
            }

            OpCode::BzrDat => self.branch_unary(|value| value == 0),
            OpCode::BnzDat => self.branch_unary(|value| value != 0),
            OpCode::BgtDat => self.branch_binary(|a, b| a > b),
            OpCode::BltDat => self.branch_binary(|a, b| a < b),
            OpCode::BgeDat => self.branch_binary(|a, b| a >= b),
            OpCode::BleDat => self.branch_binary(|a, b| a <= b),
            OpCode::BeqDat => self.branch_binary(|a, b| a == b),
            OpCode::BneDat => self.branch_binary(|a, b| a != b),

            OpCode::SlpDat => {
                let source = self.state.fetch_data_offset()?;
                let height = self.state.data_value_at(source);
                self.state.sleep_until_height = Some(height as u32);
                self.state.is_sleeping = true;
                Ok(())
            }
            OpCode::SlpImd => {
                self.state.is_sleeping = true;
                Ok(())
            }
            OpCode::FizDat => {
                let source = self.state.fetch_data_offset()?;
                if self.state.data_value_at(source) == 0 {
                    self.state.is_finished = true;
                }
                Ok(())
            }
            OpCode::StzDat => {
                let source = self.state.fetch_data_offset()?;
                if self.state.data_value_at(source) == 0 {
                    self.state.is_stopped = true;
                }
                Ok(())
            }
            OpCode::FinImd => {
                self.state.is_finished = true;
                Ok(())
            }
            OpCode::StpImd => {
                self.state.is_stopped = true;
                Ok(())
            }
            OpCode::ErrAdr => {
                // The all-ones sentinel uninstalls the handler; anything
                // else must be a valid code address.
                let raw_address = self.state.fetch_raw_code_address()?;
                if raw_address == -1 {
                    self.state.on_error_address = None;
                } else {
                    let address = self.state.check_code_address(raw_address)?;
                    self.state.on_error_address = Some(address);
                }
                Ok(())
            }
            OpCode::SetPcs => {
                self.state.on_stop_address = self.state.code_position as u32;
                Ok(())
            }

            OpCode::ExtFun => {
                let (raw, function) = self.fetch_function()?;
                let mut function_data = FunctionData::no_params(false);
                function.execute(&mut function_data, self.state, self.api, raw)
            }
            OpCode::ExtFunDat => {
                let (raw, function) = self.fetch_function()?;
                let source = self.state.fetch_data_offset()?;
                let mut function_data =
                    FunctionData::one_param(self.state.data_value_at(source), false);
                function.execute(&mut function_data, self.state, self.api, raw)
            }
            OpCode::ExtFunDat2 => {
                let (raw, function) = self.fetch_function()?;
                let source1 = self.state.fetch_data_offset()?;
                let source2 = self.state.fetch_data_offset()?;
                let mut function_data = FunctionData::two_params(
                    self.state.data_value_at(source1),
                    self.state.data_value_at(source2),
                    false,
                );
                function.execute(&mut function_data, self.state, self.api, raw)
            }
            OpCode::ExtFunRet => {
                let (raw, function) = self.fetch_function()?;
                let dest = self.state.fetch_data_offset()?;
                let mut function_data = FunctionData::no_params(true);
                function.execute(&mut function_data, self.state, self.api, raw)?;
                self.store_return_value(raw, dest, &function_data)
            }
            OpCode::ExtFunRetDat => {
                let (raw, function) = self.fetch_function()?;
                let dest = self.state.fetch_data_offset()?;
                let source = self.state.fetch_data_offset()?;
                let mut function_data =
                    FunctionData::one_param(self.state.data_value_at(source), true);
                function.execute(&mut function_data, self.state, self.api, raw)?;
                self.store_return_value(raw, dest, &function_data)
            }
            OpCode::ExtFunRetDat2 => {
                let (raw, function) = self.fetch_function()?;
                let dest = self.state.fetch_data_offset()?;
                let source1 = self.state.fetch_data_offset()?;
                let source2 = self.state.fetch_data_offset()?;
                let mut function_data = FunctionData::two_params(
                    self.state.data_value_at(source1),
                    self.state.data_value_at(source2),
                    true,
                );
                function.execute(&mut function_data, self.state, self.api, raw)?;
                self.store_return_value(raw, dest, &function_data)
            }
        }
    }

    /// Writes a function's return value into its destination cell.
    fn store_return_value(
        &mut self,
        raw: u16,
        dest: usize,
        function_data: &FunctionData,
    ) -> Result<(), ExecutionError> {
        let value = function_data.return_value.ok_or_else(|| {
            ExecutionError::Execution(format!("no return value from function 0x{raw:04x}"))
        })?;
        self.state.set_data_value_at(dest, value);
        Ok(())
    }

    fn fetch_function(&mut self) -> Result<(u16, FunctionCode), ExecutionError> {
        let raw = self.state.fetch_function_code()?;
        let function = FunctionCode::from_raw(raw).ok_or_else(|| {
            ExecutionError::IllegalOperation(format!("function code 0x{raw:04x} not recognised"))
        })?;
        Ok((raw, function))
    }

    /// Reads and rewrites a single destination cell.
    fn unary_op(&mut self, operation: impl Fn(i64) -> i64) -> Result<(), ExecutionError> {
        let dest = self.state.fetch_data_offset()?;
        let value = self.state.data_value_at(dest);
        self.state.set_data_value_at(dest, operation(value));
        Ok(())
    }

    /// Combines a destination cell with a source cell.
    fn binary_op(&mut self, operation: impl Fn(i64, i64) -> i64) -> Result<(), ExecutionError> {
        self.checked_binary_op(|dest, source| Ok(operation(dest, source)))
    }

    fn checked_binary_op(
        &mut self,
        operation: impl Fn(i64, i64) -> Result<i64, ExecutionError>,
    ) -> Result<(), ExecutionError> {
        let dest = self.state.fetch_data_offset()?;
        let source = self.state.fetch_data_offset()?;
        let dest_value = self.state.data_value_at(dest);
        let source_value = self.state.data_value_at(source);
        self.state
            .set_data_value_at(dest, operation(dest_value, source_value)?);
        Ok(())
    }

    /// Conditional branch on one cell.
    fn branch_unary(&mut self, take: impl Fn(i64) -> bool) -> Result<(), ExecutionError> {
        let source = self.state.fetch_data_offset()?;
        let offset = self.state.fetch_code_offset()?;
        if take(self.state.data_value_at(source)) {
            self.branch_to(offset)?;
        }
        Ok(())
    }

    /// Conditional branch comparing two cells.
    fn branch_binary(&mut self, take: impl Fn(i64, i64) -> bool) -> Result<(), ExecutionError> {
        let first = self.state.fetch_data_offset()?;
        let second = self.state.fetch_data_offset()?;
        let offset = self.state.fetch_code_offset()?;
        if take(
            self.state.data_value_at(first),
            self.state.data_value_at(second),
        ) {
            self.branch_to(offset)?;
        }
        Ok(())
    }

    /// Branches relative to the start of the current opcode.
    fn branch_to(&mut self, offset: i8) -> Result<(), ExecutionError> {
        let target = self.state.program_counter as i64 + offset as i64;
        if target < 0 || target as usize >= self.state.code.len() {
            return Err(ExecutionError::InvalidAddress(format!(
                "branch target {target} out of bounds"
            )));
        }
        self.state.code_position = target as usize;
        Ok(())
    }
}

/// Shifts where counts of 64 or more yield zero; shifts are logical.
fn shift_left(value: i64, shift: i64) -> i64 {
    if (shift as u64) >= 64 {
        0
    } else {
        ((value as u64) << shift) as i64
    }
}

fn shift_right(value: i64, shift: i64) -> i64 {
    if (shift as u64) >= 64 {
        0
    } else {
        ((value as u64) >> shift) as i64
    }
}
