use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use bomgen_bom::{generate, writer, BomConfig};
use bomgen_sch::netlist;
use clap::{Args, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Default)]
pub enum BomFormat {
    #[default]
    Csv,
    Json,
    Table,
}

impl std::fmt::Display for BomFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BomFormat::Csv => write!(f, "csv"),
            BomFormat::Json => write!(f, "json"),
            BomFormat::Table => write!(f, "table"),
        }
    }
}

#[derive(Args, Debug)]
pub struct BomArgs {
    /// Netlist export (.net) to process
    #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// YAML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value_t = BomFormat::Csv)]
    pub format: BomFormat,

    /// Board variant to build
    #[arg(long)]
    pub variant: Option<String>,

    /// Number of boards to build (components multiplier)
    #[arg(short, long)]
    pub number: Option<f64>,
}

pub fn execute(args: BomArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config `{}`", path.display()))?;
            BomConfig::from_yaml(&text)?
        }
        None => BomConfig::default(),
    };
    if let Some(variant) = args.variant {
        config.variant = variant;
    }
    if let Some(number) = args.number {
        config.number = number;
    }
    let ctx = config.resolve()?;

    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read `{}`", args.file.display()))?;
    let project = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let comps = netlist::parse_netlist(&text, &project)?;
    log::debug!("{} components loaded from `{}`", comps.len(), args.file.display());

    let table = generate(comps, &project, &ctx)?;

    match &args.output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("failed to create `{}`", path.display()))?;
            write_table(&table, &args.format, &ctx, file)
        }
        None => write_table(&table, &args.format, &ctx, io::stdout().lock()),
    }
}

fn write_table<W: Write>(
    table: &bomgen_bom::BomTable,
    format: &BomFormat,
    ctx: &bomgen_bom::RunContext,
    out: W,
) -> Result<()> {
    match format {
        BomFormat::Csv => writer::write_csv(table, &ctx.csv, out)?,
        BomFormat::Json => writer::write_json(table, out)?,
        BomFormat::Table => table.write_console(out)?,
    }
    Ok(())
}
