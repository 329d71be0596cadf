//! Ballistic: the frontend of a dynamic binary translator. Decodes an
//! AArch64 instruction stream and emits linear SSA IR packed into 64-bit
//! words, ready for downstream optimization and code generation.

pub mod assembler;
pub mod bits;
pub mod decode;
pub mod elf_utils;
pub mod engine;
pub mod error;
pub mod ir;
pub mod logging;
pub mod memory;
pub mod translate;

pub use decode::decode;
pub use engine::Engine;
pub use error::Error;
pub use translate::translate;
