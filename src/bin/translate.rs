use std::path::PathBuf;

use clap::Parser;

use ballistic::elf_utils::read_code;
use ballistic::ir;
use ballistic::memory::{AlignedBuffer, FlatMemory};
use ballistic::Engine;

/// Guest image base inside the flat mapping; address zero is unmapped.
const GUEST_BASE: usize = 0x1000;

/// Worst case three IR words per guest instruction keeps a chunk of this
/// size safely inside one engine's IR capacity.
const CHUNK_WORDS: usize = 4096;

/// Translate an ARM64 binary to SSA IR
///
/// Drives a translation engine over the input in chunks, resetting between
/// chunks. Accepts a raw ARM64 image or an ELF executable (the .text
/// section is used). Exits non-zero on the first latched error.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to input binary
    input: PathBuf,

    /// Print every emitted IR instruction
    #[arg(short, long)]
    dump_ir: bool,
}

fn dump(engine: &Engine, base_ssa: usize) {
    for (offset, &word) in engine.instructions().iter().enumerate() {
        let sources = [ir::source1(word), ir::source2(word), ir::source3(word)]
            .map(|source| {
                if source.is_constant() {
                    format!("c{}={:#x}", source.index(), engine.constants()[source.index() as usize])
                } else {
                    format!("v{}", source.index())
                }
            });
        println!(
            "v{:<6} {:<14} {} {} {}",
            base_ssa + offset,
            format!("{:?}", ir::opcode(word).expect("engine emits valid opcodes")),
            sources[0],
            sources[1],
            sources[2],
        );
    }
}

fn main() {
    ballistic::logging::init();
    let args = Args::parse();

    let code = match read_code(&args.input) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    let mut staging = match AlignedBuffer::new(GUEST_BASE + code.len() * 4) {
        Ok(staging) => staging,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };
    for (index, word) in code.iter().enumerate() {
        let at = GUEST_BASE + index * 4;
        staging.as_mut_slice()[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
    let memory = match FlatMemory::new(staging.as_slice()) {
        Ok(memory) => memory,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    let mut engine = match Engine::new() {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    let mut translated_ir = 0usize;
    let mut interned = 0usize;
    for (chunk_index, chunk) in code.chunks(CHUNK_WORDS).enumerate() {
        let guest_address = (GUEST_BASE + chunk_index * CHUNK_WORDS * 4) as u64;
        if let Err(error) = ballistic::translate(&mut engine, &memory, guest_address, chunk.len() * 4)
        {
            eprintln!("translation failed at guest {guest_address:#x}: {error}");
            std::process::exit(u8::try_from(-error.code()).map_or(1, i32::from));
        }
        if args.dump_ir {
            dump(&engine, translated_ir);
        }
        translated_ir += engine.instruction_count();
        interned += engine.constant_count();
        engine.reset();
    }

    println!(
        "translated {} guest instructions into {} IR instructions ({} constants)",
        code.len(),
        translated_ir,
        interned
    );
}
