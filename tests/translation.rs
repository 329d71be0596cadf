//! End-to-end translation scenarios: assemble guest words, run them
//! through a flat mapping and a fresh engine, and check the exact IR,
//! constant pool and SSA map that come out.

use ballistic::assembler::Assembler;
use ballistic::engine::{SOURCE_VARIABLE_CAPACITY, UNDEFINED_SSA_INDEX};
use ballistic::ir::{self, Opcode};
use ballistic::memory::{AlignedBuffer, FlatMemory};
use ballistic::{translate, Engine, Error};

const GUEST_BASE: u64 = 0x40;

/// Stage guest words behind a flat mapping and translate them all.
fn run(engine: &mut Engine, words: &[u32]) -> Result<(), Error> {
    let mut buffer = AlignedBuffer::new(GUEST_BASE as usize + words.len() * 4).unwrap();
    for (index, word) in words.iter().enumerate() {
        let at = GUEST_BASE as usize + index * 4;
        buffer.as_mut_slice()[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
    let memory = FlatMemory::new(buffer.as_slice()).unwrap();
    translate(engine, &memory, GUEST_BASE, words.len() * 4)
}

/// The interned value behind a source operand, which must carry the
/// constant flag.
fn constant_of(engine: &Engine, source: ir::Source) -> u64 {
    assert!(source.is_constant(), "{source:?} is not a constant operand");
    engine.constants()[source.index() as usize]
}

#[test]
fn movz_x0_42() {
    let mut engine = Engine::new().unwrap();
    run(&mut engine, &[0xD2800540]).unwrap();

    assert_eq!(engine.constants(), &[42]);
    assert_eq!(engine.instruction_count(), 1);
    let word = engine.instructions()[0];
    assert_eq!(ir::opcode(word), Some(Opcode::Const));
    assert_eq!(constant_of(&engine, ir::source1(word)), 42);
    assert_eq!(engine.register(0), Some(0));
}

#[test]
fn movz_x0_0() {
    let mut engine = Engine::new().unwrap();
    run(&mut engine, &[0xD2800000]).unwrap();

    assert_eq!(engine.constants(), &[0]);
    let word = engine.instructions()[0];
    assert_eq!(ir::opcode(word), Some(Opcode::Const));
    assert_eq!(constant_of(&engine, ir::source1(word)), 0);
}

#[test]
fn movz_twice_same_register() {
    let mut engine = Engine::new().unwrap();
    // MOVZ X0, #42 ; MOVZ X0, #1
    run(&mut engine, &[0xD2800540, 0xD2800020]).unwrap();

    assert_eq!(engine.constants(), &[42, 1]);
    assert_eq!(engine.instruction_count(), 2);
    assert_eq!(ir::opcode(engine.instructions()[0]), Some(Opcode::Const));
    assert_eq!(ir::opcode(engine.instructions()[1]), Some(Opcode::Const));
    // The second definition shadows the first
    assert_eq!(engine.register(0), Some(1));
}

#[test]
fn movn_inverts_the_shifted_immediate() {
    let mut engine = Engine::new().unwrap();
    let mut words = [0u32; 1];
    let mut assembler = Assembler::new(&mut words);
    assembler.emit_movn(0, 0, 0);
    assembler.status().unwrap();
    run(&mut engine, &words).unwrap();

    assert_eq!(engine.constants(), &[u64::MAX]);
    assert_eq!(engine.register(0), Some(0));
}

#[test]
fn movk_after_movz_clears_and_merges_the_lane() {
    let mut engine = Engine::new().unwrap();
    let mut words = [0u32; 2];
    let mut assembler = Assembler::new(&mut words);
    assembler.emit_movz(0, 0x1234, 0);
    assembler.emit_movk(0, 0xAAAA, 0);
    assembler.status().unwrap();
    run(&mut engine, &words).unwrap();

    assert_eq!(engine.constants(), &[0x1234, 0xFFFF_FFFF_FFFF_0000, 0xAAAA]);
    assert_eq!(engine.instruction_count(), 3);

    let [movz, and, add] = engine.instructions().try_into().unwrap();
    assert_eq!(ir::opcode(movz), Some(Opcode::Const));

    assert_eq!(ir::opcode(and), Some(Opcode::And));
    assert!(!ir::source1(and).is_constant());
    assert_eq!(ir::source1(and).index(), 0);
    assert_eq!(constant_of(&engine, ir::source2(and)), 0xFFFF_FFFF_FFFF_0000);

    assert_eq!(ir::opcode(add), Some(Opcode::Add));
    assert!(!ir::source1(add).is_constant());
    assert_eq!(ir::source1(add).index(), 1);
    assert_eq!(constant_of(&engine, ir::source2(add)), 0xAAAA);

    assert_eq!(engine.register(0), Some(2));
}

#[test]
fn movk_on_undefined_register_materializes_it() {
    let mut engine = Engine::new().unwrap();
    let mut words = [0u32; 1];
    let mut assembler = Assembler::new(&mut words);
    assembler.emit_movk(5, 0xBEEF, 16);
    assembler.status().unwrap();
    run(&mut engine, &words).unwrap();

    assert_eq!(engine.instruction_count(), 3);
    let [get, and, add] = engine.instructions().try_into().unwrap();

    // The incoming register value becomes a definition of its own
    assert_eq!(ir::opcode(get), Some(Opcode::GetRegister));
    assert_eq!(ir::source1(get).index(), 5);

    assert_eq!(ir::opcode(and), Some(Opcode::And));
    assert_eq!(ir::source1(and).index(), 0);
    assert_eq!(
        constant_of(&engine, ir::source2(and)),
        !(0xFFFFu64 << 16)
    );

    assert_eq!(ir::opcode(add), Some(Opcode::Add));
    assert_eq!(constant_of(&engine, ir::source2(add)), 0xBEEF_0000);

    assert_eq!(engine.register(5), Some(2));
    assert_eq!(engine.source_variables()[5].original_variable_index, 0);
}

#[test]
fn movz_grid() {
    let registers = [0u32, 1, 15, 30, 31];
    let immediates = [0u16, 1, 0xFFFF, 0xAAAA, 0x5555, 0x1234];
    let shifts = [0u32, 16, 32, 48];

    let mut words = vec![0u32; registers.len() * immediates.len() * shifts.len()];
    let mut assembler = Assembler::new(&mut words);
    for rd in registers {
        for imm16 in immediates {
            for shift in shifts {
                assembler.emit_movz(rd, imm16, shift);
            }
        }
    }
    assembler.status().unwrap();

    let mut engine = Engine::new().unwrap();
    run(&mut engine, &words).unwrap();

    let mut ir_index = 0;
    for _rd in registers {
        for imm16 in immediates {
            for shift in shifts {
                let word = engine.instructions()[ir_index];
                assert_eq!(ir::opcode(word), Some(Opcode::Const), "inst {ir_index}");
                let expected = u64::from(imm16) << shift;
                assert_eq!(
                    constant_of(&engine, ir::source1(word)),
                    expected,
                    "inst {ir_index}"
                );
                ir_index += 1;
            }
        }
    }
    assert_eq!(engine.instruction_count(), ir_index);
}

#[test]
fn movk_grid() {
    let registers = [0u32, 1, 15, 30, 31];
    let immediates = [0u16, 1, 0xFFFF, 0xAAAA, 0x5555, 0x1234];
    let shifts = [0u32, 16, 32, 48];

    let mut words = vec![0u32; registers.len() * immediates.len() * shifts.len()];
    let mut assembler = Assembler::new(&mut words);
    for rd in registers {
        for imm16 in immediates {
            for shift in shifts {
                assembler.emit_movk(rd, imm16, shift);
            }
        }
    }
    assembler.status().unwrap();

    let mut engine = Engine::new().unwrap();
    run(&mut engine, &words).unwrap();

    let instructions = engine.instructions();
    let mut cursor = 0;
    for rd in registers {
        for imm16 in immediates {
            for shift in shifts {
                // A register's very first MOVK loads it from guest state
                if ir::opcode(instructions[cursor]) == Some(Opcode::GetRegister) {
                    assert_ne!(rd, 31, "XZR must never be materialized");
                    cursor += 1;
                }

                // MOVK emits AND then ADD
                let and = instructions[cursor];
                assert_eq!(ir::opcode(and), Some(Opcode::And), "inst {cursor}");
                assert_eq!(
                    constant_of(&engine, ir::source2(and)),
                    !(0xFFFFu64 << shift),
                    "inst {cursor}: wrong clear mask for shift {shift}"
                );
                cursor += 1;

                let add = instructions[cursor];
                assert_eq!(ir::opcode(add), Some(Opcode::Add), "inst {cursor}");
                assert_eq!(
                    constant_of(&engine, ir::source2(add)),
                    u64::from(imm16) << shift,
                    "inst {cursor}"
                );
                cursor += 1;
            }
        }
    }
    assert_eq!(engine.instruction_count(), cursor);
}

#[test]
fn emitted_sources_refer_backwards_only() {
    // SSA monotonicity over a mixed stream: every non-constant source of an
    // AND/ADD refers to an earlier definition, every constant source to an
    // already-interned slot.
    let mut words = vec![0u32; 64];
    let mut assembler = Assembler::new(&mut words);
    for index in 0..16u32 {
        let rd = index % 8;
        assembler.emit_movz(rd, 0x11 * index as u16, 0);
        assembler.emit_movk(rd, 0x2200, 16);
        assembler.emit_movk((rd + 8) % 32, 0x33, 48);
        assembler.emit_movn(rd, 0x4444, 32);
    }
    assembler.status().unwrap();

    let mut engine = Engine::new().unwrap();
    run(&mut engine, &words).unwrap();

    for (index, &word) in engine.instructions().iter().enumerate() {
        let opcode = ir::opcode(word).unwrap();
        if !matches!(opcode, Opcode::And | Opcode::Add) {
            continue;
        }
        for source in [ir::source1(word), ir::source2(word)] {
            if source.is_constant() {
                assert!((source.index() as usize) < engine.constant_count());
            } else {
                assert!(
                    (source.index() as usize) < index,
                    "inst {index} reads a definition from the future"
                );
            }
        }
    }
}

#[test]
fn xzr_writes_are_silent() {
    let mut engine = Engine::new().unwrap();
    let mut words = [0u32; 3];
    let mut assembler = Assembler::new(&mut words);
    assembler.emit_movz(31, 7, 0);
    assembler.emit_movn(31, 7, 16);
    assembler.emit_movk(31, 7, 32);
    assembler.status().unwrap();
    run(&mut engine, &words).unwrap();

    // IR is still emitted, but no slot of the SSA map moves
    assert!(engine.instruction_count() > 0);
    for register in 0..SOURCE_VARIABLE_CAPACITY {
        let entry = engine.source_variables()[register];
        assert_eq!(entry.current_ssa_index, UNDEFINED_SSA_INDEX);
        assert_eq!(entry.original_variable_index, UNDEFINED_SSA_INDEX);
    }
}

#[test]
fn instruction_overflow_latches_at_capacity() {
    // One more MOVZ than the engine holds
    let count = 65536 + 1;
    let words = vec![0xD2800540u32; count];

    let mut engine = Engine::new().unwrap();
    let result = run(&mut engine, &words);
    assert_eq!(result, Err(Error::InstructionOverflow));
    assert_eq!(engine.instruction_count(), 65536);
    assert_eq!(engine.status(), Err(Error::InstructionOverflow));

    // Latched: nothing changes on a retry
    let retry = run(&mut engine, &[0xD2800540]);
    assert_eq!(retry, Err(Error::EngineStateInvalid));
    assert_eq!(engine.instruction_count(), 65536);
}

#[test]
fn reset_round_trip_reproduces_identical_ir() {
    let mut words = [0u32; 6];
    let mut assembler = Assembler::new(&mut words);
    assembler.emit_movz(0, 0x1234, 0);
    assembler.emit_movk(0, 0xAAAA, 16);
    assembler.emit_movn(3, 0x5555, 32);
    assembler.emit_movk(7, 0x9999, 48);
    assembler.emit_movz(30, 0xFFFF, 0);
    assembler.emit_movk(30, 0x0001, 0);
    assembler.status().unwrap();

    let mut engine = Engine::new().unwrap();
    run(&mut engine, &words).unwrap();
    let first_ir = engine.instructions().to_vec();
    let first_constants = engine.constants().to_vec();
    let first_widths = engine.bit_widths().to_vec();

    engine.reset();
    run(&mut engine, &words).unwrap();
    assert_eq!(engine.instructions(), first_ir);
    assert_eq!(engine.constants(), first_constants);
    assert_eq!(engine.bit_widths(), first_widths);
}

#[test]
fn bit_widths_track_the_register_form() {
    let mut engine = Engine::new().unwrap();
    // 64-bit MOVZ X1 then 32-bit MOVZ W2
    let movz_w2 = 0x52800000 | 21 << 5 | 2;
    run(&mut engine, &[0xD2800541, movz_w2]).unwrap();
    assert_eq!(engine.bit_widths(), &[64, 32]);
    // The 32-bit form masks the value to 32 bits
    assert_eq!(engine.constants(), &[42, 21]);
}
