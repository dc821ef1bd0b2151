use std::process::ExitCode;

use color_print::cprintln;
use indexmap::IndexMap;
use tracing::{warn, Level};
use x86asm::label::EXTERN_SUFFIX;
use x86asm::{Compiler, CompilerConfig, Diagnostic, Error};

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {author}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(author, version, about, help_template = HELP_TEMPLATE)]
struct Args {
    /// Input file
    #[clap(default_value = "main.asm")]
    input: String,

    /// Output file
    #[clap(short, long, default_value = "main.bin")]
    output: String,

    /// Dump assembly listing
    #[clap(short, long)]
    dump: bool,

    /// Write the label table as YAML
    #[clap(short, long)]
    symbols: Option<String>,

    /// Relaxation passes before giving up
    #[clap(long, default_value_t = x86asm::compiler::DEFAULT_MAX_PASSES)]
    max_passes: usize,

    /// YAML map of `name@extern` symbols to addresses
    #[clap(short, long)]
    externals: Option<String>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[clap(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    use clap::Parser;

    let args: Args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    cprintln!("<s>x86 Assembler</> by kanade-k-1228");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(diags) => {
            let source = std::fs::read_to_string(&args.input).unwrap_or_default();
            for diag in &diags {
                diag.print_diag(&args.input, &source);
            }
            cprintln!("<r,s>{} error(s)</>", diags.len());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Vec<Diagnostic>> {
    println!("1. Read File and Parse Lines");
    println!("  < {}", args.input);
    let source = std::fs::read_to_string(&args.input)
        .map_err(|e| vec![Error::FileOpen(args.input.clone(), e).into()])?;
    let nodes = x86asm::parse(&source)?;

    println!("2. Resolve Labels & Generate Binary");
    let config = CompilerConfig {
        max_passes: args.max_passes,
        external_linker: match &args.externals {
            Some(path) => Some(load_externals(path).map_err(|e| vec![e.into()])?),
            None => None,
        },
    };
    let binary = Compiler::new(config).compile(&nodes)?;
    println!(
        "  {} byte(s), {} label(s), {} pass(es)",
        binary.byte_size,
        binary.labels.len(),
        binary.total_passes
    );

    println!("  > {}", args.output);
    std::fs::write(&args.output, binary.to_bytes())
        .map_err(|e| vec![Error::FileWrite(args.output.clone(), e).into()])?;

    if let Some(path) = &args.symbols {
        println!("  > {}", path);
        let yaml = binary.symbols_yaml().map_err(|e| vec![e.into()])?;
        std::fs::write(path, yaml).map_err(|e| vec![Error::FileWrite(path.clone(), e).into()])?;
    }

    if args.dump {
        print!("{}", binary.dump(&nodes, &source));
    }
    Ok(())
}

/// Addresses may be keyed with or without the `@extern` suffix.
fn load_externals(path: &str) -> Result<Box<x86asm::compiler::ExternalLinker>, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::FileOpen(path.to_string(), e))?;
    let table: IndexMap<String, i64> =
        serde_yaml::from_str(&text).map_err(|e| Error::SymbolFile(path.to_string(), e))?;
    Ok(Box::new(move |name: &str, _offset: i64| {
        let bare = name.strip_suffix(EXTERN_SUFFIX).unwrap_or(name);
        match table.get(name).or_else(|| table.get(bare)) {
            Some(address) => *address,
            None => {
                warn!(name, "external symbol missing from the table, linked at 0");
                0
            }
        }
    }))
}
