//! The host-facing API seam.
//!
//! The machine core is chain-agnostic: everything it needs from the
//! surrounding blockchain (heights, balances, transactions, payments,
//! entropy, fee schedule) arrives through the [`Api`] trait. Implementations
//! must be pure functions of committed chain state, or determinism across
//! validators is lost.

use crate::errors::ExecutionError;
use crate::functions::FunctionData;
use crate::isa::OpCode;
use crate::machine::MachineState;
use crate::timestamp::Timestamp;

/// Host services consumed by the VM.
///
/// Methods that take `&mut MachineState` may write the A/B registers or, for
/// [`Api::generate_random_using_tx_in_a`], put the machine to sleep to defer
/// one block for entropy. Transaction queries return `-1` when A does not
/// hold a valid transaction reference.
pub trait Api {
    /// Height of the block currently being processed.
    fn current_block_height(&self) -> u32;

    /// Height of the block before the one currently being processed.
    fn previous_block_height(&self) -> u32;

    /// Balance of this machine's account.
    fn current_balance(&self, state: &MachineState) -> u64;

    /// Height of the block that deployed this machine.
    fn at_creation_block_height(&self, state: &MachineState) -> u32;

    /// Writes the previous block's hash into A.
    fn put_previous_block_hash_into_a(&mut self, state: &mut MachineState);

    /// Writes a reference to the first transaction sent to this machine
    /// after `timestamp` into A, or zeroes A if there is none.
    fn put_transaction_after_timestamp_into_a(
        &mut self,
        timestamp: Timestamp,
        state: &mut MachineState,
    );

    /// Type of the transaction referenced by A, or `-1`.
    fn type_from_tx_in_a(&mut self, state: &mut MachineState) -> i64;

    /// Amount carried by the transaction referenced by A, or `-1`.
    fn amount_from_tx_in_a(&mut self, state: &mut MachineState) -> i64;

    /// Timestamp of the transaction referenced by A, or `-1`.
    fn timestamp_from_tx_in_a(&mut self, state: &mut MachineState) -> i64;

    /// Deterministic random number derived from the transaction referenced
    /// by A. May set the machine sleeping to use the next block as its
    /// entropy source; the VM then rewinds so the call re-executes after
    /// waking.
    fn generate_random_using_tx_in_a(&mut self, state: &mut MachineState) -> i64;

    /// Writes the message attached to the transaction referenced by A into
    /// B, or zeroes B if there is none.
    fn put_message_from_tx_in_a_into_b(&mut self, state: &mut MachineState);

    /// Writes the sender address of the transaction referenced by A into B.
    fn put_address_from_tx_in_a_into_b(&mut self, state: &mut MachineState);

    /// Writes this machine's creator address into B.
    fn put_creator_address_into_b(&mut self, state: &mut MachineState);

    /// Pays `amount` from this machine's account to the address in B.
    fn pay_amount_to_b(&mut self, amount: u64, state: &mut MachineState);

    /// Sends the contents of A as a message to the address in B.
    fn message_a_to_b(&mut self, state: &mut MachineState);

    /// Returns `timestamp` advanced by `minutes`, in packed form.
    fn add_minutes_to_timestamp(
        &mut self,
        timestamp: Timestamp,
        minutes: i64,
        state: &mut MachineState,
    ) -> i64;

    /// Fee charged per execution step.
    fn fee_per_step(&self) -> u64;

    /// Step budget for one execution round.
    fn max_steps_per_round(&self) -> u32;

    /// Step cost of one opcode.
    fn opcode_steps(&self, opcode: OpCode) -> u32;

    /// Called when execution fails with no on-error handler installed; the
    /// host is expected to refund the remaining balance to the creator.
    fn on_fatal_error(&mut self, state: &mut MachineState, error: &ExecutionError);

    /// Called when the machine finishes, with the balance to refund.
    fn on_finished(&mut self, remaining_balance: u64, state: &mut MachineState);

    /// Executes a platform-specific function code (0x0500–0x06FF). The raw
    /// code is passed through untouched; the host performs its own shape
    /// checks and fills `function_data.return_value` where expected.
    fn platform_specific_post_check_execute(
        &mut self,
        function_data: &mut FunctionData,
        state: &mut MachineState,
        raw_function_code: u16,
    ) -> Result<(), ExecutionError>;
}
