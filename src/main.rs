use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use log::Level;

use minipascal::PipelineError;
use minipascal::console::StdConsole;
use minipascal::interp::Interpreter;
use minipascal::lexer::Lexer;
use minipascal::parser::Parser;
use minipascal::polir::Generator;
use minipascal::vocab::Vocabulary;

/// Vocabulary configuration looked up in the working directory; the built-in
/// defaults apply when the file is absent.
const DEFAULT_CONFIG: &str = "minipascal.yaml";

struct Args {
    verbose: bool,
    lexeme_file: Option<PathBuf>,
    polir_file: Option<PathBuf>,
    source: PathBuf,
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let level = if args.verbose { Level::Debug } else { Level::Warn };
    simple_logger::init_with_level(level).context("Initializing logger")?;

    let vocab = load_vocabulary()?;
    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("Reading {}", args.source.display()))?;

    let lexer = Lexer::new(&vocab);
    let mut stream = match lexer.tokenize(&source) {
        Ok(stream) => stream,
        Err(error) => exit_with(error.into()),
    };
    if let Some(path) = &args.lexeme_file {
        stream.save_lexeme_file(path)?;
    }

    let artifacts = match Parser::new(&vocab, &mut stream).parse() {
        Ok(artifacts) => artifacts,
        Err(error) => exit_with(error.into()),
    };

    let polir = Generator::new(&mut stream).generate();
    if let Some(path) = &args.polir_file {
        polir.save_to_file(path)?;
    }

    let mut console = StdConsole;
    if let Err(error) = Interpreter::new(&artifacts, &polir, &mut console).run() {
        exit_with(error.into());
    }
    Ok(())
}

fn exit_with(error: PipelineError) -> ! {
    log::error!("{error}");
    process::exit(error.exit_code());
}

/// Hand-rolled flag loop; returns `None` when help was requested.
fn parse_args() -> Result<Option<Args>> {
    let mut args = env::args().skip(1);
    let mut verbose = false;
    let mut lexeme_file = None;
    let mut polir_file = None;
    let mut source: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "-v" | "--verbose" => verbose = true,
            "-l" | "--lexeme-file" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing file name after {arg}"))?;
                lexeme_file = Some(PathBuf::from(path));
            }
            "-p" | "--polir-file" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing file name after {arg}"))?;
                polir_file = Some(PathBuf::from(path));
            }
            _ => {
                if source.is_some() {
                    bail!("Only one source file is supported");
                }
                source = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(source) = source else {
        bail!("Pascal source code file was not specified");
    };
    Ok(Some(Args {
        verbose,
        lexeme_file,
        polir_file,
        source,
    }))
}

fn print_usage() {
    println!("Usage: minipascal [options] <source.pas>");
    println!();
    println!("Interpreter of a very limited subset of the famous Pascal language.");
    println!();
    println!("Options:");
    println!("  -h, --help             display this help and exit");
    println!("  -v, --verbose          extended output for every pipeline stage");
    println!("  -l, --lexeme-file F    save the token table to F after lexing");
    println!("  -p, --polir-file F     save the POLIR instruction stream to F");
}

fn load_vocabulary() -> Result<Vocabulary> {
    let path = Path::new(DEFAULT_CONFIG);
    if path.exists() {
        log::debug!("Loading vocabulary from {}", path.display());
        Vocabulary::from_file(path)
    } else {
        Ok(Vocabulary::default())
    }
}
