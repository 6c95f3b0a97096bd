use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;

mod bom;

#[derive(Parser)]
#[command(name = "bomgen")]
#[command(about = "Bill of Materials generation for EDA projects", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a Bill of Materials from a netlist export
    #[command(alias = "b")]
    Bom(bom::BomArgs),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e}", "Error:".red());
        for cause in e.chain().skip(1) {
            eprintln!("  {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Data-quality warnings are part of the output contract, so they are
    // on by default (overridden by RUST_LOG).
    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("warn")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::Bom(args) => bom::execute(args),
    }
}
