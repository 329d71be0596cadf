use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use itertools::Itertools;

use ballistic::elf_utils::read_code;

/// Measure decoder coverage over an ARM64 binary
///
/// Streams every instruction word of the input through the decoder and
/// tallies mnemonic frequencies. Accepts a raw ARM64 image or an ELF
/// executable (the .text section is used).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to input binary
    input: PathBuf,

    /// How many mnemonics to list
    #[arg(short, long, default_value_t = 20)]
    top: usize,
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

    let mut tally: HashMap<&'static str, u64> = HashMap::new();
    let mut unknown: u64 = 0;
    for &word in &code {
        match ballistic::decode(word) {
            Some(metadata) => *tally.entry(metadata.name).or_default() += 1,
            None => unknown += 1,
        }
    }

    println!("Top {} most common instructions:", args.top);
    for (mnemonic, count) in tally
        .into_iter()
        .sorted_by_key(|&(mnemonic, count)| (std::cmp::Reverse(count), mnemonic))
        .take(args.top)
    {
        println!("{count:>10}  {mnemonic}");
    }
    println!("Decoded {} words, {} unknown", code.len(), unknown);
}
