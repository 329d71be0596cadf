//! The translation loop: guest words in, SSA IR out.
//!
//! One pass over the guest stream. Each 32-bit word is classified by the
//! decoder, its operand fields are sliced out per the metadata recipe, and
//! the per-opcode handler emits zero or more packed IR words while keeping
//! the SSA register map current. Only the move-wide family (MOVZ/MOVN/MOVK)
//! emits IR today; every other decoded instruction is skipped with a trace
//! note while the opcode handlers are staged in.

use log::{error, trace, warn};

use crate::decode::{decode, InstructionMetadata};
use crate::engine::Engine;
use crate::error::Error;
use crate::ir::Opcode;
use crate::memory::{Allocator, MemoryInterface};

/// Register 31: reads as zero, writes are discarded.
const XZR: usize = 31;

/// Translate up to `byte_count / 4` guest words starting at
/// `guest_address` into IR appended to `engine`.
///
/// Stops when the guest range is exhausted, the IR buffer is full, or an
/// error latches; the engine status after the batch is returned either way.
/// The engine must be freshly initialized or reset, and the guest address
/// must be 4-byte aligned and mapped by `memory`.
pub fn translate<A: Allocator, M: MemoryInterface>(
    engine: &mut Engine<A>,
    memory: &M,
    guest_address: u64,
    byte_count: usize,
) -> Result<(), Error> {
    if engine.status().is_err() {
        return Err(Error::EngineStateInvalid);
    }
    if guest_address % 4 != 0 {
        return Err(Error::MemoryAlignment);
    }
    let code = memory
        .translate(guest_address)
        .ok_or(Error::InvalidArgument)?;
    let limit = byte_count.min(code.len());

    for chunk in code[..limit].chunks_exact(4) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let Some(metadata) = decode(word) else {
            error!("unknown instruction {word:#010x}");
            engine.latch(Error::UnknownInstruction);
            break;
        };
        let operands = metadata.extract_operands(word);
        match metadata.ir_opcode {
            Opcode::Const => mov_wide(engine, metadata, operands),
            skipped => trace!("skipping {} (ir {skipped:?}), no handler yet", metadata.name),
        }
        if engine.status().is_err() {
            break;
        }
    }

    engine.status()
}

/// The MOVZ/MOVN/MOVK family, dispatched on the fourth byte of the
/// mnemonic. Operand 0 is rd, operand 1 is imm16, operand 2 is the shift
/// amount in units of 16 bits.
fn mov_wide<A: Allocator>(
    engine: &mut Engine<A>,
    metadata: &'static InstructionMetadata,
    operands: [u32; 4],
) {
    let rd = operands[0] as usize;
    let shift = operands[2] * 16;
    let register_width = metadata.operands[0].kind().register_width();
    let value_mask = if register_width == 32 {
        u64::from(u32::MAX)
    } else {
        u64::MAX
    };
    let value = (u64::from(operands[1]) << shift) & value_mask;

    match metadata.name.as_bytes()[3] {
        b'Z' => mov_constant(engine, metadata.name, rd, value, register_width),
        b'N' => mov_constant(engine, metadata.name, rd, !value & value_mask, register_width),
        b'K' => mov_keep(engine, metadata.name, rd, shift, value, value_mask, register_width),
        _ => warn!("move-wide dispatch on unexpected mnemonic {}", metadata.name),
    }
}

/// MOVZ and (with the immediate pre-inverted) MOVN: intern the value and
/// define rd as a fresh CONST.
fn mov_constant<A: Allocator>(
    engine: &mut Engine<A>,
    name: &str,
    rd: usize,
    value: u64,
    register_width: u8,
) {
    let Some(constant) = engine.intern(value) else {
        return;
    };
    let Some(ssa_index) = engine.emit(Opcode::Const, constant, 0, 0, register_width) else {
        return;
    };
    if rd != XZR {
        engine.define_register(rd, ssa_index);
    }
    trace!("v{ssa_index} <- CONST {value:#x} ({name} r{rd})");
}

/// MOVK: read-modify-write of the prior definition of rd. Clears the
/// 16-bit lane with an AND, then merges the new immediate with an ADD.
fn mov_keep<A: Allocator>(
    engine: &mut Engine<A>,
    name: &str,
    rd: usize,
    shift: u32,
    value: u64,
    value_mask: u64,
    register_width: u8,
) {
    let prior = if rd == XZR {
        // XZR reads as zero; its prior value is the constant 0
        match engine.intern(0) {
            Some(handle) => handle,
            None => return,
        }
    } else {
        match engine.register(rd) {
            Some(ssa_index) => ssa_index,
            None => {
                // Cold start: materialize the incoming register value as a
                // definition of its own before the lane update.
                let Some(ssa_index) =
                    engine.emit(Opcode::GetRegister, rd as u32, 0, 0, register_width)
                else {
                    return;
                };
                engine.record_original(rd, ssa_index);
                trace!("v{ssa_index} <- GET_REGISTER r{rd}");
                ssa_index
            }
        }
    };

    let clear_mask = !(0xFFFFu64 << shift) & value_mask;
    let Some(clear) = engine.intern(clear_mask) else {
        return;
    };
    let Some(cleared) = engine.emit(Opcode::And, prior, clear, 0, register_width) else {
        return;
    };
    let Some(constant) = engine.intern(value) else {
        return;
    };
    let Some(combined) = engine.emit(Opcode::Add, cleared, constant, 0, register_width) else {
        return;
    };
    if rd != XZR {
        engine.define_register(rd, combined);
    }
    trace!("v{cleared} <- AND, v{combined} <- ADD {value:#x} ({name} r{rd})");
}
