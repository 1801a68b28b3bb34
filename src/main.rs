use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use cellmap::backmap::{Condition, OutputRange};
use cellmap::color::{ColorLookup, Colormap};
use cellmap::config::Config;
use cellmap::data::filter::parse_selections;
use cellmap::data::loader::load_table;
use cellmap::data::mask::LabelMask;
use cellmap::render;
use cellmap::state::ViewSession;

#[derive(Debug, Parser)]
#[command(name = "cellmap", version, about = "Backmap single-cell features onto label masks")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (column names, range, colormap, alpha)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List images and feature columns of a table
    Columns {
        /// Feature table (.csv, .json, .parquet)
        table: PathBuf,
    },
    /// Paint one feature of one image onto its label mask
    Backmap(BackmapArgs),
}

#[derive(Debug, Args)]
struct BackmapArgs {
    /// Feature table (.csv, .json, .parquet)
    table: PathBuf,

    /// Label mask of the image (8/16-bit grayscale PNG or TIFF)
    #[arg(long)]
    mask: PathBuf,

    /// Image id in the table
    #[arg(long)]
    image: i64,

    /// Feature column to paint
    #[arg(long)]
    feature: String,

    /// Output PNG
    #[arg(short, long)]
    output: PathBuf,

    /// Intensity image to draw the feature layer over
    #[arg(long)]
    base: Option<PathBuf>,

    #[arg(long, value_enum)]
    colormap: Option<Colormap>,

    /// Low end of the display range
    #[arg(long)]
    low: Option<u8>,

    /// High end of the display range
    #[arg(long)]
    high: Option<u8>,

    /// Opacity of the feature layer over --base
    #[arg(long)]
    alpha: Option<f32>,

    /// Only paint objects with column=value (repeatable)
    #[arg(long = "where", value_name = "COLUMN=VALUE")]
    selections: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = Config::load(cli.config.as_deref())
        .context("loading configuration")
        .and_then(|config| match cli.command {
            Command::Columns { table } => run_columns(&config, table),
            Command::Backmap(args) => run_backmap(&config, args),
        });

    if let Err(e) = result {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run_columns(config: &Config, path: PathBuf) -> Result<()> {
    let table = load_table(&path, &config.loader_options())
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let images = table.image_ids();
    println!("{} objects in {} images", table.len(), images.len());
    println!("Numeric features (complete rows):");
    for col in table.numeric_columns() {
        let complete = table.drop_incomplete(&[col.as_str()]).len();
        println!("  {col} ({complete}/{})", table.len());
    }
    println!("Categorical columns:");
    for (col, values) in &table.unique_values {
        let shown: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        println!("  {col}: {}", shown.join(", "));
    }
    Ok(())
}

fn run_backmap(config: &Config, args: BackmapArgs) -> Result<()> {
    let table = load_table(&args.table, &config.loader_options())
        .with_context(|| format!("Failed to load {}", args.table.display()))?;
    let mask = LabelMask::open(&args.mask)
        .with_context(|| format!("Failed to load mask {}", args.mask.display()))?;

    let range = OutputRange::new(
        args.low.unwrap_or(config.output_range[0]),
        args.high.unwrap_or(config.output_range[1]),
    )?;
    let colormap = args.colormap.unwrap_or(config.colormap);
    let filters = parse_selections(&table, &args.selections)?;

    let mut session = ViewSession::new(table);
    session.add_mask(args.image, mask);
    session.set_range(range);
    session.set_filters(filters);
    session.select_image(args.image);
    session.select_feature(&args.feature);

    let Some(raster) = session.raster.as_ref() else {
        bail!(
            "Nothing rendered: {}",
            session.status_message.as_deref().unwrap_or("unknown reason")
        );
    };
    match raster.condition() {
        Condition::EmptyMask => log::info!("Mask has no objects; output is fully transparent"),
        Condition::DegenerateRange => {
            log::info!("'{}' is constant for image {}", args.feature, args.image)
        }
        Condition::Normal => {}
    }
    if colormap == Colormap::Categorical {
        for (value, color) in ColorLookup::new(colormap, raster).legend_entries() {
            log::info!("  {value}: #{:02x}{:02x}{:02x}", color[0], color[1], color[2]);
        }
    }

    let layer = render::colorize(raster, colormap)?;
    let rendered = match &args.base {
        Some(base_path) => {
            let base = image::open(base_path)
                .with_context(|| format!("Failed to load base image {}", base_path.display()))?;
            render::overlay(&base, &layer, args.alpha.unwrap_or(config.overlay_alpha))?
        }
        None => layer,
    };
    render::save_png(&rendered, &args.output)
}
