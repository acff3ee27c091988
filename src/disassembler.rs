//! Static disassembly of code bytes.
//!
//! Walks a code segment from offset zero, skipping runs of zero padding,
//! and emits one line per instruction in the form
//! `[PC: 0000] MNEMONIC operands`. Data addresses render as `@N` for the
//! first (usually the destination) and `$N` for the rest, immediate values
//! as `#` followed by sixteen hex digits, code addresses as four hex
//! digits, branch offsets as signed decimal and function codes by name
//! where known.

use crate::errors::ExecutionError;
use crate::functions::FunctionCode;
use crate::isa::{OpCode, OperandKind};
use crate::machine::{VersionedConstants, ADDRESS_SIZE, VALUE_SIZE};

/// Returns the textual disassembly of `code_bytes`.
///
/// `data_byte_length` is the size of the data segment the code was built
/// against; data addresses are validated against it, as they would be at
/// execution time. `version` selects the operand byte order.
pub fn disassemble(
    version: u16,
    code_bytes: &[u8],
    data_byte_length: usize,
) -> Result<String, ExecutionError> {
    let constants = VersionedConstants::for_version(version).ok_or_else(|| {
        ExecutionError::IllegalOperation(format!("version {version} unsupported"))
    })?;

    let mut walker = Walker {
        constants,
        code: code_bytes,
        position: 0,
        data_byte_length,
    };

    let mut output = String::new();

    while walker.position < walker.code.len() {
        let opcode_position = walker.position;
        let raw_opcode = walker.code[walker.position];
        walker.position += 1;

        // Zero padding between instructions is skipped, not decoded.
        if raw_opcode == 0 {
            continue;
        }

        let opcode = OpCode::from_byte(raw_opcode).ok_or_else(|| {
            ExecutionError::IllegalOperation(format!("opcode 0x{raw_opcode:02x} not recognised"))
        })?;

        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!("[PC: {opcode_position:04x}] {}", opcode.mnemonic()));

        let mut data_addresses_seen = 0;
        for kind in opcode.operands() {
            output.push(' ');
            walker.render_operand(*kind, &mut data_addresses_seen, &mut output)?;
        }
    }

    Ok(output)
}

struct Walker<'a> {
    constants: &'static VersionedConstants,
    code: &'a [u8],
    position: usize,
    data_byte_length: usize,
}

impl Walker<'_> {
    fn take(&mut self, count: usize) -> Result<&[u8], ExecutionError> {
        let end = self.position + count;
        if end > self.code.len() {
            return Err(ExecutionError::CodeSegment(
                "no code bytes left to disassemble operand",
            ));
        }
        let bytes = &self.code[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn render_operand(
        &mut self,
        kind: OperandKind,
        data_addresses_seen: &mut u32,
        output: &mut String,
    ) -> Result<(), ExecutionError> {
        let order = self.constants.byte_order;
        match kind {
            OperandKind::Value => {
                let value = order.i64_from(self.take(VALUE_SIZE)?.try_into().expect("8 bytes"));
                output.push_str(&format!("#{:016x}", value as u64));
            }
            OperandKind::DataAddr => {
                let index = order.i32_from(self.take(ADDRESS_SIZE)?.try_into().expect("4 bytes"));
                let max = self.data_byte_length as i64 / VALUE_SIZE as i64 - 1;
                if index < 0 || index as i64 > max {
                    return Err(ExecutionError::InvalidAddress(format!(
                        "data address {index} out of bounds: 0 to {max}"
                    )));
                }
                let sigil = if *data_addresses_seen == 0 { '@' } else { '$' };
                *data_addresses_seen += 1;
                output.push_str(&format!("{sigil}{index}"));
            }
            OperandKind::CodeAddr => {
                let address =
                    order.i32_from(self.take(ADDRESS_SIZE)?.try_into().expect("4 bytes"));
                output.push_str(&format!("{:04x}", address as u32));
            }
            OperandKind::Offset => {
                let offset = self.take(1)?[0] as i8;
                output.push_str(&format!("{offset:+}"));
            }
            OperandKind::FuncCode => {
                let raw = order.u16_from(self.take(2)?.try_into().expect("2 bytes"));
                match FunctionCode::from_raw(raw) {
                    Some(FunctionCode::ApiPassthrough) | None => {
                        output.push_str(&format!("0x{raw:04x}"));
                    }
                    Some(function) => output.push_str(function.name()),
                }
            }
        }
        Ok(())
    }
}
