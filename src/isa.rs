//! Instruction set definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode table and invokes a callback macro for code generation, so the
//! enum, the byte decoder and the disassembler all draw from one definition.
//!
//! # Encoding
//!
//! Instructions are variable-length:
//! - Opcode: 1 byte
//! - Data address: 4 bytes, an index of an 8-byte cell in the data segment
//! - Code address: 4 bytes, a byte offset into the code segment
//! - Immediate value: 8 bytes
//! - Branch offset: 1 signed byte, relative to the start of the opcode
//! - Function code: 2 bytes
//!
//! Multi-byte operands use the machine's version byte order (big-endian for
//! version 2, little-endian for version 1).

/// Invokes a callback macro with the complete opcode table.
///
/// Each row is `Variant = byte, "MNEMONIC" => [operand kinds]`.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// SET_VAL @dest, #value ; @dest = value
            SetVal = 0x01, "SET_VAL" => [DataAddr, Value],
            /// SET_DAT @dest, $src ; @dest = $src
            SetDat = 0x02, "SET_DAT" => [DataAddr, DataAddr],
            /// CLR_DAT @dest ; @dest = 0
            ClrDat = 0x03, "CLR_DAT" => [DataAddr],
            /// INC_DAT @dest ; @dest += 1 (wrapping)
            IncDat = 0x04, "INC_DAT" => [DataAddr],
            /// DEC_DAT @dest ; @dest -= 1 (wrapping)
            DecDat = 0x05, "DEC_DAT" => [DataAddr],
            /// ADD_DAT @dest, $src ; @dest += $src (wrapping)
            AddDat = 0x06, "ADD_DAT" => [DataAddr, DataAddr],
            /// SUB_DAT @dest, $src ; @dest -= $src (wrapping)
            SubDat = 0x07, "SUB_DAT" => [DataAddr, DataAddr],
            /// MUL_DAT @dest, $src ; @dest *= $src (wrapping)
            MulDat = 0x08, "MUL_DAT" => [DataAddr, DataAddr],
            /// DIV_DAT @dest, $src ; @dest /= $src (error on zero divisor)
            DivDat = 0x09, "DIV_DAT" => [DataAddr, DataAddr],
            /// BOR_DAT @dest, $src ; @dest |= $src
            BorDat = 0x0a, "BOR_DAT" => [DataAddr, DataAddr],
            /// AND_DAT @dest, $src ; @dest &= $src
            AndDat = 0x0b, "AND_DAT" => [DataAddr, DataAddr],
            /// XOR_DAT @dest, $src ; @dest ^= $src
            XorDat = 0x0c, "XOR_DAT" => [DataAddr, DataAddr],
            /// NOT_DAT @dest ; @dest = !@dest (bitwise complement)
            NotDat = 0x0d, "NOT_DAT" => [DataAddr],
            /// SET_IND @dest, $addr ; @dest = $($addr)
            SetInd = 0x0e, "SET_IND" => [DataAddr, DataAddr],
            /// SET_IDX @dest, $base, $idx ; @dest = $($base + $idx)
            SetIdx = 0x0f, "SET_IDX" => [DataAddr, DataAddr, DataAddr],
            /// PSH_DAT @src ; push $src onto the user stack
            PshDat = 0x10, "PSH_DAT" => [DataAddr],
            /// POP_DAT @dest ; pop the user stack into @dest
            PopDat = 0x11, "POP_DAT" => [DataAddr],
            /// JMP_SUB addr ; push the return address, branch to addr
            JmpSub = 0x12, "JMP_SUB" => [CodeAddr],
            /// RET_SUB ; pop the call stack into the program counter
            RetSub = 0x13, "RET_SUB" => [],
            /// IND_DAT @addr, $src ; @($addr) = $src
            IndDat = 0x14, "IND_DAT" => [DataAddr, DataAddr],
            /// IDX_DAT @base, $idx, $src ; @($base + $idx) = $src
            IdxDat = 0x15, "IDX_DAT" => [DataAddr, DataAddr, DataAddr],
            /// MOD_DAT @dest, $src ; @dest %= $src (error on zero divisor)
            ModDat = 0x16, "MOD_DAT" => [DataAddr, DataAddr],
            /// SHL_DAT @dest, $src ; @dest <<= $src (counts >= 64 yield 0)
            ShlDat = 0x17, "SHL_DAT" => [DataAddr, DataAddr],
            /// SHR_DAT @dest, $src ; @dest >>= $src, logical (counts >= 64 yield 0)
            ShrDat = 0x18, "SHR_DAT" => [DataAddr, DataAddr],
            /// JMP_ADR addr ; unconditional branch
            JmpAdr = 0x1a, "JMP_ADR" => [CodeAddr],
            /// BZR_DAT $val, offset ; branch if $val == 0
            BzrDat = 0x1b, "BZR_DAT" => [DataAddr, Offset],
            /// BNZ_DAT $val, offset ; branch if $val != 0
            BnzDat = 0x1e, "BNZ_DAT" => [DataAddr, Offset],
            /// BGT_DAT $a, $b, offset ; branch if $a > $b (signed)
            BgtDat = 0x1f, "BGT_DAT" => [DataAddr, DataAddr, Offset],
            /// BLT_DAT $a, $b, offset ; branch if $a < $b (signed)
            BltDat = 0x20, "BLT_DAT" => [DataAddr, DataAddr, Offset],
            /// BGE_DAT $a, $b, offset ; branch if $a >= $b (signed)
            BgeDat = 0x21, "BGE_DAT" => [DataAddr, DataAddr, Offset],
            /// BLE_DAT $a, $b, offset ; branch if $a <= $b (signed)
            BleDat = 0x22, "BLE_DAT" => [DataAddr, DataAddr, Offset],
            /// BEQ_DAT $a, $b, offset ; branch if $a == $b
            BeqDat = 0x23, "BEQ_DAT" => [DataAddr, DataAddr, Offset],
            /// BNE_DAT $a, $b, offset ; branch if $a != $b
            BneDat = 0x24, "BNE_DAT" => [DataAddr, DataAddr, Offset],
            /// SLP_DAT $height ; sleep until block $height
            SlpDat = 0x25, "SLP_DAT" => [DataAddr],
            /// FIZ_DAT $val ; finish if $val == 0
            FizDat = 0x26, "FIZ_DAT" => [DataAddr],
            /// STZ_DAT $val ; stop if $val == 0
            StzDat = 0x27, "STZ_DAT" => [DataAddr],
            /// FIN_IMD ; finish immediately (terminal)
            FinImd = 0x28, "FIN_IMD" => [],
            /// STP_IMD ; stop immediately
            StpImd = 0x29, "STP_IMD" => [],
            /// SLP_IMD ; sleep until the next block
            SlpImd = 0x2a, "SLP_IMD" => [],
            /// ERR_ADR addr ; install the on-error handler (-1 clears)
            ErrAdr = 0x2b, "ERR_ADR" => [CodeAddr],
            /// SET_PCS ; on-stop address = address after this opcode
            SetPcs = 0x30, "SET_PCS" => [],
            /// EXT_FUN fn ; invoke function code, no params, no return
            ExtFun = 0x32, "EXT_FUN" => [FuncCode],
            /// EXT_FUN_DAT fn, $v1 ; invoke with one value parameter
            ExtFunDat = 0x33, "EXT_FUN_DAT" => [FuncCode, DataAddr],
            /// EXT_FUN_DAT_2 fn, $v1, $v2 ; invoke with two value parameters
            ExtFunDat2 = 0x34, "EXT_FUN_DAT_2" => [FuncCode, DataAddr, DataAddr],
            /// EXT_FUN_RET fn, @ret ; invoke and store the return value
            ExtFunRet = 0x35, "EXT_FUN_RET" => [FuncCode, DataAddr],
            /// EXT_FUN_RET_DAT fn, @ret, $v1 ; invoke with one parameter and a return
            ExtFunRetDat = 0x36, "EXT_FUN_RET_DAT" => [FuncCode, DataAddr, DataAddr],
            /// EXT_FUN_RET_DAT_2 fn, @ret, $v1, $v2 ; invoke with two parameters and a return
            ExtFunRetDat2 = 0x37, "EXT_FUN_RET_DAT_2" => [FuncCode, DataAddr, DataAddr, DataAddr],
            /// NOP ; no operation
            Nop = 0x7f, "NOP" => [],
        }
    };
}

/// Shape of one operand consumed after an opcode byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// 8-byte immediate value.
    Value,
    /// 4-byte data-segment cell index.
    DataAddr,
    /// 4-byte code-segment byte offset.
    CodeAddr,
    /// 1-byte signed branch offset.
    Offset,
    /// 2-byte function code.
    FuncCode,
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:literal, $mnemonic:literal => [
                $( $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// One-byte operation codes of the AT instruction set.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $(
                $(#[$doc])*
                $name = $byte,
            )*
        }

        impl OpCode {
            /// Resolves a raw opcode byte, or `None` if unassigned.
            pub fn from_byte(value: u8) -> Option<OpCode> {
                match value {
                    $( $byte => Some(OpCode::$name), )*
                    _ => None,
                }
            }

            /// Returns the wire byte for this opcode.
            pub const fn value(self) -> u8 {
                self as u8
            }

            /// Returns the assembly mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand shape consumed after the opcode byte.
            pub const fn operands(self) -> &'static [OperandKind] {
                match self {
                    $( OpCode::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_byte_rejects_unassigned() {
        assert!(OpCode::from_byte(0x00).is_none());
        assert!(OpCode::from_byte(0x19).is_none());
        assert!(OpCode::from_byte(0xff).is_none());
    }

    #[test]
    fn from_byte_round_trips() {
        for byte in 0..=0xffu8 {
            if let Some(op) = OpCode::from_byte(byte) {
                assert_eq!(op.value(), byte);
            }
        }
    }

    #[test]
    fn operand_shapes() {
        assert_eq!(
            OpCode::SetVal.operands(),
            &[OperandKind::DataAddr, OperandKind::Value]
        );
        assert_eq!(OpCode::RetSub.operands(), &[]);
        assert_eq!(
            OpCode::BeqDat.operands(),
            &[OperandKind::DataAddr, OperandKind::DataAddr, OperandKind::Offset]
        );
        assert_eq!(
            OpCode::ExtFunRetDat2.operands(),
            &[
                OperandKind::FuncCode,
                OperandKind::DataAddr,
                OperandKind::DataAddr,
                OperandKind::DataAddr
            ]
        );
    }

    #[test]
    fn mnemonics_match_wire_names() {
        assert_eq!(OpCode::Nop.mnemonic(), "NOP");
        assert_eq!(OpCode::SetVal.mnemonic(), "SET_VAL");
        assert_eq!(OpCode::ExtFunRetDat2.mnemonic(), "EXT_FUN_RET_DAT_2");
    }
}
