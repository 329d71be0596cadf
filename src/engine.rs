//! The translation engine: owner of the arena that backs every hot array.
//!
//! One 64-byte-aligned allocation is carved into four sub-arrays (SSA map,
//! IR buffer, bit-width sidecar, constant pool), each sub-range re-aligned
//! to a cache line. The allocation happens once in [`Engine::with_allocator`]
//! and is reused across [`Engine::reset`] calls; the hot emit/intern paths
//! never allocate.
//!
//! Failures on the hot paths latch into the engine status: after the first
//! error every emit and intern is a silent no-op until the next reset.

use std::alloc::Layout;
use std::ptr::NonNull;

use log::debug;

use crate::error::Error;
use crate::ir::{self, Opcode};
use crate::memory::{Allocator, SystemAllocator};

/// Slots in the SSA source-variable map. 32 cover X0..X30 plus XZR; the
/// rest of the pool leaves room for system registers.
pub const SOURCE_VARIABLE_CAPACITY: usize = 128;
/// IR instructions one engine can hold, sized to one compilation unit.
pub const INSTRUCTION_CAPACITY: usize = 65536;
/// Constant-pool slots. Shares the IR capacity because MOVK pessimistically
/// interns two constants per guest instruction.
pub const CONSTANT_CAPACITY: usize = 65536;
/// Pattern written over freshly-carved arena memory so reads of
/// uninitialized slots are recognizable.
pub const POISON_BYTE: u8 = 0xFF;

/// Sentinel meaning a guest register has no SSA definition yet in this
/// unit. Identical to the poison pattern, so a freshly-reset map reads as
/// all-undefined without a separate pass.
pub const UNDEFINED_SSA_INDEX: u32 = u32::MAX;

const CACHE_LINE: usize = 64;

const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

const SOURCE_VARIABLES_SIZE: usize =
    SOURCE_VARIABLE_CAPACITY * std::mem::size_of::<SourceVariable>();
const INSTRUCTIONS_SIZE: usize = INSTRUCTION_CAPACITY * std::mem::size_of::<u64>();
const BIT_WIDTHS_SIZE: usize = INSTRUCTION_CAPACITY;
const CONSTANTS_SIZE: usize = CONSTANT_CAPACITY * std::mem::size_of::<u64>();

const SOURCE_VARIABLES_OFFSET: usize = 0;
const INSTRUCTIONS_OFFSET: usize = align_up(SOURCE_VARIABLES_SIZE, CACHE_LINE);
const BIT_WIDTHS_OFFSET: usize = align_up(INSTRUCTIONS_OFFSET + INSTRUCTIONS_SIZE, CACHE_LINE);
const CONSTANTS_OFFSET: usize = align_up(BIT_WIDTHS_OFFSET + BIT_WIDTHS_SIZE, CACHE_LINE);
const ARENA_SIZE: usize = align_up(CONSTANTS_OFFSET + CONSTANTS_SIZE, CACHE_LINE);

/// The mapping of one guest register to its SSA state during construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SourceVariable {
    /// The most recent SSA definition, or [`UNDEFINED_SSA_INDEX`].
    pub current_ssa_index: u32,
    /// The definition live at the start of the current block. Written when
    /// a register is first materialized; reserved for block-merge logic.
    pub original_variable_index: u32,
}

/// Lifecycle bookkeeping, touched only at init/reset/drop. The alignment
/// pushes it onto its own cache line so per-emit traffic never shares a
/// line with it.
#[repr(C, align(64))]
struct Lifecycle<A> {
    layout: Layout,
    allocator: A,
}

/// Owner of the translation arena and the SSA construction state.
///
/// Field order matters: the leading cluster is touched on every emitted IR
/// word, the trailing [`Lifecycle`] only at init/reset/drop, and the two
/// live on separate cache lines.
#[repr(C, align(64))]
pub struct Engine<A: Allocator = SystemAllocator> {
    // Hot: per-emit state.
    arena: NonNull<u8>,
    instruction_count: u32,
    constant_count: u32,
    status: Option<Error>,
    // Cold.
    lifecycle: Lifecycle<A>,
}

// SAFETY: the arena is exclusively owned heap memory; nothing is shared.
unsafe impl<A: Allocator + Send> Send for Engine<A> {}

impl Engine<SystemAllocator> {
    /// Build an engine over the process heap. One large allocation; do it
    /// sparingly and reuse through [`Engine::reset`].
    pub fn new() -> Result<Engine<SystemAllocator>, Error> {
        Engine::with_allocator(SystemAllocator)
    }
}

impl<A: Allocator> Engine<A> {
    pub fn with_allocator(allocator: A) -> Result<Engine<A>, Error> {
        let layout =
            Layout::from_size_align(ARENA_SIZE, CACHE_LINE).map_err(|_| Error::InvalidArgument)?;
        let arena = allocator.allocate(layout).ok_or(Error::AllocationFailed)?;
        // SAFETY: arena is valid for ARENA_SIZE bytes per the allocator
        // contract.
        unsafe { std::ptr::write_bytes(arena.as_ptr(), POISON_BYTE, ARENA_SIZE) };
        debug!("engine arena initialized ({ARENA_SIZE} bytes)");
        Ok(Engine {
            arena,
            instruction_count: 0,
            constant_count: 0,
            status: None,
            lifecycle: Lifecycle { layout, allocator },
        })
    }

    /// Prepare for the next compilation unit: clear the counters and any
    /// latched error, re-poison the SSA map and the constant pool. The IR
    /// buffer is left as-is; emission overwrites it. No memory is released.
    pub fn reset(&mut self) {
        self.instruction_count = 0;
        self.constant_count = 0;
        self.status = None;
        // SAFETY: both ranges lie inside the ARENA_SIZE allocation.
        unsafe {
            std::ptr::write_bytes(
                self.arena.as_ptr().add(SOURCE_VARIABLES_OFFSET),
                POISON_BYTE,
                SOURCE_VARIABLES_SIZE,
            );
            std::ptr::write_bytes(
                self.arena.as_ptr().add(CONSTANTS_OFFSET),
                POISON_BYTE,
                CONSTANTS_SIZE,
            );
        }
    }

    /// Ok while no error is latched.
    pub fn status(&self) -> Result<(), Error> {
        match self.status {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Latch an error. The first one wins; later calls are ignored.
    pub(crate) fn latch(&mut self, error: Error) {
        self.status.get_or_insert(error);
    }

    pub fn instruction_count(&self) -> usize {
        self.instruction_count as usize
    }

    pub fn constant_count(&self) -> usize {
        self.constant_count as usize
    }

    /// The IR emitted so far.
    pub fn instructions(&self) -> &[u64] {
        // SAFETY: the offset is 64-byte aligned within the arena and the
        // range holds INSTRUCTION_CAPACITY u64 slots owned by self.
        let all = unsafe {
            std::slice::from_raw_parts(
                self.arena.as_ptr().add(INSTRUCTIONS_OFFSET).cast::<u64>(),
                INSTRUCTION_CAPACITY,
            )
        };
        &all[..self.instruction_count as usize]
    }

    /// Bit widths of the SSA definitions emitted so far.
    pub fn bit_widths(&self) -> &[u8] {
        // SAFETY: as instructions(), for the u8 sidecar range.
        let all = unsafe {
            std::slice::from_raw_parts(
                self.arena.as_ptr().add(BIT_WIDTHS_OFFSET),
                INSTRUCTION_CAPACITY,
            )
        };
        &all[..self.instruction_count as usize]
    }

    /// The constants interned so far.
    pub fn constants(&self) -> &[u64] {
        // SAFETY: as instructions(), for the constant-pool range.
        let all = unsafe {
            std::slice::from_raw_parts(
                self.arena.as_ptr().add(CONSTANTS_OFFSET).cast::<u64>(),
                CONSTANT_CAPACITY,
            )
        };
        &all[..self.constant_count as usize]
    }

    /// The whole SSA source-variable map.
    pub fn source_variables(&self) -> &[SourceVariable] {
        // SAFETY: the map starts at the (64-byte aligned) arena base and
        // holds SOURCE_VARIABLE_CAPACITY entries; SourceVariable is two
        // u32s, so the all-0xFF poison is a valid bit pattern.
        unsafe {
            std::slice::from_raw_parts(
                self.arena.as_ptr().cast::<SourceVariable>(),
                SOURCE_VARIABLE_CAPACITY,
            )
        }
    }

    fn source_variables_mut(&mut self) -> &mut [SourceVariable] {
        // SAFETY: as source_variables(), and &mut self grants exclusivity.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.arena.as_ptr().cast::<SourceVariable>(),
                SOURCE_VARIABLE_CAPACITY,
            )
        }
    }

    /// The current SSA definition of a guest register, or None while the
    /// register is undefined in this unit.
    pub fn register(&self, register: usize) -> Option<u32> {
        let index = self.source_variables()[register].current_ssa_index;
        (index != UNDEFINED_SSA_INDEX).then_some(index)
    }

    /// Point a guest register at a new SSA definition.
    pub(crate) fn define_register(&mut self, register: usize, ssa_index: u32) {
        self.source_variables_mut()[register].current_ssa_index = ssa_index;
    }

    /// Record the definition that materialized a register's value at the
    /// start of the block.
    pub(crate) fn record_original(&mut self, register: usize, ssa_index: u32) {
        self.source_variables_mut()[register].original_variable_index = ssa_index;
    }

    /// Append one packed IR word and its bit width. Returns the SSA id of
    /// the new definition, or None if the engine is (or just became)
    /// latched.
    pub(crate) fn emit(
        &mut self,
        opcode: Opcode,
        source1: u32,
        source2: u32,
        source3: u32,
        bit_width: u8,
    ) -> Option<u32> {
        if self.status.is_some() {
            return None;
        }
        let index = self.instruction_count as usize;
        if index >= INSTRUCTION_CAPACITY {
            self.status = Some(Error::InstructionOverflow);
            return None;
        }
        let word = ir::pack(opcode, source1, source2, source3);
        // SAFETY: index < INSTRUCTION_CAPACITY; both sub-arrays are owned
        // by self and properly aligned.
        unsafe {
            *self
                .arena
                .as_ptr()
                .add(INSTRUCTIONS_OFFSET)
                .cast::<u64>()
                .add(index) = word;
            *self.arena.as_ptr().add(BIT_WIDTHS_OFFSET).add(index) = bit_width;
        }
        self.instruction_count += 1;
        Some(index as u32)
    }

    /// Intern a constant. Append-only, no deduplication. Returns the pool
    /// index with the is-constant flag already set, or None if the engine
    /// is (or just became) latched.
    pub(crate) fn intern(&mut self, value: u64) -> Option<u32> {
        if self.status.is_some() {
            return None;
        }
        let index = self.constant_count as usize;
        if index >= CONSTANT_CAPACITY {
            self.status = Some(Error::InstructionOverflow);
            return None;
        }
        // SAFETY: index < CONSTANT_CAPACITY within the owned pool range.
        unsafe {
            *self
                .arena
                .as_ptr()
                .add(CONSTANTS_OFFSET)
                .cast::<u64>()
                .add(index) = value;
        }
        self.constant_count += 1;
        Some(index as u32 | ir::IS_CONSTANT_BIT)
    }

    #[cfg(test)]
    fn arena_bytes(&self) -> &[u8] {
        // SAFETY: the whole allocation is owned and initialized (poisoned).
        unsafe { std::slice::from_raw_parts(self.arena.as_ptr(), ARENA_SIZE) }
    }
}

impl<A: Allocator> Drop for Engine<A> {
    fn drop(&mut self) {
        // SAFETY: the arena came from this allocator with this layout and
        // is not referenced past this point.
        unsafe { self.lifecycle.allocator.free(self.arena, self.lifecycle.layout) };
    }
}
