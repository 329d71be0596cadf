use clap::Parser;
use clap_num::maybe_hex;

/// Decode a single ARM64 instruction word
///
/// Prints the mnemonic and the mask/expected pattern of the matching
/// encoding, or UNDEFINED if the decoder rejects the word.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Instruction word (use 0x prefix for hexadecimal)
    #[arg(value_parser=maybe_hex::<u32>)]
    instruction: u32,
}

fn main() {
    ballistic::logging::init();
    let args = Args::parse();

    match ballistic::decode(args.instruction) {
        Some(metadata) => {
            println!(
                "Mnemonic: {} - Mask: {:#010X} - Expected: {:#010X}",
                metadata.name, metadata.mask, metadata.expected
            );
        }
        None => {
            println!("UNDEFINED");
            std::process::exit(1);
        }
    }
}
