// ========================================================================================
//
//                      THE COMMAND-LINE FRONT END: DEMODECOMP
//
// ========================================================================================
//
// This binary is a thin shell around the library. It resolves inputs into aligned rate
// vectors, resolves the decomposition settings, runs one decomposition per group, and
// prints the contributions. It owns no numerical logic of its own.
//
// ### Conventions ###
//
// 1.  **Inputs:** either two comma-separated vectors (`--from`, `--to`) or a TSV file
//     with an ordering column, two rate columns, and an optional group column.
//
// 2.  **Settings:** an optional TOML file (`--config`) supplies the base settings.
//     Any flag given explicitly on the command line overrides the file.
//
// 3.  **Output:** a TSV on stdout with one row per group and parameter, in input order.
//     Diagnostics go to stderr through the logger (`RUST_LOG` controls verbosity).

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use demodecomp::config::{Decomposition, DecompositionConfig, Method, decompose_life_expectancy};
use demodecomp::data::{ColumnSpec, GroupRates, SINGLE_GROUP, load_rate_table};
use demodecomp::lifetable::rates_to_life_expectancy_at_birth;
use demodecomp::stepwise::Direction;
use ndarray::Array1;
use rayon::prelude::*;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

// ========================================================================================
//                         COMMAND-LINE INTERFACE DEFINITION
// ========================================================================================

#[derive(Parser)]
#[command(
    name = "demodecomp",
    version,
    about = "Decompose differences in life expectancy into age-specific contributions."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose the difference in life expectancy at birth between two rate schedules
    #[command(about = "Decompose a life-expectancy difference (outputs: TSV on stdout)")]
    Decompose(DecomposeArgs),

    /// Display version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodCli {
    Arriaga,
    Horiuchi,
    Stepwise,
    Ltre,
}

impl From<MethodCli> for Method {
    fn from(value: MethodCli) -> Self {
        match value {
            MethodCli::Arriaga => Method::Arriaga,
            MethodCli::Horiuchi => Method::Horiuchi,
            MethodCli::Stepwise => Method::Stepwise,
            MethodCli::Ltre => Method::Ltre,
        }
    }
}

#[derive(Args)]
struct DecomposeArgs {
    /// Rates of the first state, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, conflicts_with = "input")]
    from: Option<Vec<f64>>,

    /// Rates of the second state, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, requires = "from")]
    to: Option<Vec<f64>>,

    /// Tab-separated input file with an ordering column and two rate columns
    #[arg(long)]
    input: Option<PathBuf>,

    /// Column holding the group key (optional)
    #[arg(long, requires = "input")]
    group_column: Option<String>,

    /// Column holding the ordering index, e.g. age
    #[arg(long, default_value = "age")]
    index_column: String,

    /// Column holding the rates of the first state
    #[arg(long, default_value = "mx1")]
    from_column: String,

    /// Column holding the rates of the second state
    #[arg(long, default_value = "mx2")]
    to_column: String,

    /// TOML file with decomposition settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the resolved settings to this TOML file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Decomposition method [default: horiuchi]
    #[arg(long, value_enum)]
    method: Option<MethodCli>,

    /// Number of integration steps for horiuchi [default: 20]
    #[arg(long, value_name = "N")]
    resolution: Option<usize>,

    /// Replacement order for stepwise: up, down, both, full, or an index list [default: both]
    #[arg(long, value_parser = parse_direction)]
    direction: Option<Direction>,

    /// Number of random orders averaged by the full direction [default: 100]
    #[arg(long)]
    permutations: Option<usize>,

    /// Seed for the full direction's permutations [default: 0]
    #[arg(long)]
    seed: Option<u64>,

    /// Relative step for numerical derivatives in ltre [default: 1e-6]
    #[arg(long)]
    derivative_step: Option<f64>,

    /// Number of path points at which ltre averages sensitivities [default: 1]
    #[arg(long)]
    ltre_resolution: Option<usize>,

    /// Maximum number of function evaluations per decomposition
    #[arg(long)]
    max_evaluations: Option<usize>,
}

fn parse_direction(value: &str) -> Result<Direction, demodecomp::DecompositionError> {
    value.parse()
}

// ========================================================================================
//                                  THE COMMANDS
// ========================================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Decompose(args)) => decompose(args),
        Some(Commands::Version) => {
            println!("demodecomp {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn decompose(args: DecomposeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("Settings saved to {}", path.display());
    }

    let groups = resolve_groups(&args)?;
    log::info!(
        "Decomposing {} group(s) with the {} method.",
        groups.len(),
        config.method
    );

    // Groups are independent; results come back in input order.
    let results: Vec<_> = groups
        .par_iter()
        .map(|group| decompose_life_expectancy(group.from.view(), group.to.view(), &config))
        .collect();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_header(&mut out, config.method)?;
    for (group, result) in groups.iter().zip(results) {
        let decomposition = result.map_err(|e| format!("group '{}': {e}", group.group))?;
        let difference = rates_to_life_expectancy_at_birth(group.to.view())
            - rates_to_life_expectancy_at_birth(group.from.view());
        log::info!(
            "Group '{}': e0 difference {:.6}, sum of contributions {:.6}",
            group.group,
            difference,
            decomposition.contributions().total()
        );
        write_group(&mut out, group, &decomposition)?;
    }
    out.flush()?;
    Ok(())
}

fn resolve_config(args: &DecomposeArgs) -> Result<DecompositionConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => DecompositionConfig::load(path)?,
        None => DecompositionConfig::default(),
    };
    if let Some(method) = args.method {
        config.method = method.into();
    }
    if let Some(resolution) = args.resolution {
        config.horiuchi.resolution = resolution;
    }
    if let Some(direction) = &args.direction {
        config.stepwise.direction = direction.clone();
    }
    if let Some(permutations) = args.permutations {
        config.stepwise.permutations = permutations;
    }
    if let Some(seed) = args.seed {
        config.stepwise.seed = seed;
    }
    if let Some(step) = args.derivative_step {
        config.ltre.derivative_step = step;
    }
    if let Some(resolution) = args.ltre_resolution {
        config.ltre.resolution = resolution;
    }
    if args.max_evaluations.is_some() {
        config.max_evaluations = args.max_evaluations;
    }
    Ok(config)
}

fn resolve_groups(args: &DecomposeArgs) -> Result<Vec<GroupRates>, Box<dyn std::error::Error>> {
    if let Some(path) = &args.input {
        let columns = ColumnSpec {
            group: args.group_column.clone(),
            index: args.index_column.clone(),
            from: args.from_column.clone(),
            to: args.to_column.clone(),
        };
        return Ok(load_rate_table(path, &columns)?);
    }

    match (&args.from, &args.to) {
        (Some(from), Some(to)) => {
            let n = from.len();
            Ok(vec![GroupRates {
                group: SINGLE_GROUP.to_string(),
                index: Array1::from_iter((0..n).map(|i| i as f64)),
                from: Array1::from(from.clone()),
                to: Array1::from(to.clone()),
            }])
        }
        _ => Err("provide either --input or both --from and --to".into()),
    }
}

// ========================================================================================
//                                     OUTPUT
// ========================================================================================

fn write_header(out: &mut impl Write, method: Method) -> io::Result<()> {
    match method {
        Method::Arriaga => writeln!(out, "group\tindex\tcontribution\tdirect\tindirect"),
        _ => writeln!(out, "group\tindex\tcontribution"),
    }
}

fn write_group(
    out: &mut impl Write,
    group: &GroupRates,
    decomposition: &Decomposition,
) -> io::Result<()> {
    let mut value_buffer = ryu::Buffer::new();
    let contributions = decomposition.contributions();
    for (position, &value) in contributions.iter().enumerate() {
        let index = group.index.get(position).copied().unwrap_or(position as f64);
        write!(
            out,
            "{}\t{}\t{}",
            group.group,
            index,
            value_buffer.format(value)
        )?;
        if let Decomposition::Arriaga(parts) = decomposition {
            let mut part_buffer = ryu::Buffer::new();
            write!(out, "\t{}", part_buffer.format(parts.direct[position]))?;
            write!(out, "\t{}", part_buffer.format(parts.indirect[position]))?;
        }
        writeln!(out)?;
    }
    Ok(())
}
