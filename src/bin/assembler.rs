use std::{env, process};

use asm24::assembler;
use asm24::logging;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <base name>...", args[0]);
        process::exit(1);
    }

    let mut io_failure = false;
    for base in &args[1..] {
        logging::status(format!("Processing file: {}", base));
        match assembler::assemble_base(base) {
            Ok(true) => logging::status(format!(
                "No errors in the input file: {}, generating its output files.",
                base
            )),
            Ok(false) => logging::status(format!(
                "Errors in the input file: {}, not generating its output files.",
                base
            )),
            Err(error) => {
                logging::error(error.to_string());
                io_failure = true;
            }
        }
    }

    if io_failure {
        process::exit(2);
    }
}
