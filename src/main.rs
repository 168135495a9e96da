use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use flint::pipeline::{CompileOptions, Compiler};

#[derive(Parser, Debug)]
#[command(name = "flintc", version, about = "Compiler for the Flint programming language")]
struct Cli {
    /// Output name; defaults to `out` (or `out.o` with -c)
    #[arg(short = 'o', value_name = "OUTPUT")]
    output: Option<String>,

    /// Emit an object file only; skip linking
    #[arg(short = 'c')]
    object_only: bool,

    /// Write the textual IR to PATH before emission
    #[arg(long = "dump-ir", value_name = "PATH")]
    dump_ir: Option<PathBuf>,

    /// Source files
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init();

    let cli = Cli::parse();
    let mut compiler = Compiler::new(CompileOptions {
        target: cli.output,
        run_linker: !cli.object_only,
        dump_ir: cli.dump_ir,
    });

    for file in &cli.files {
        if let Err(e) = compiler.add_file(file) {
            eprintln!("{e}");
            exit(3);
        }
    }

    exit(compiler.compile());
}
