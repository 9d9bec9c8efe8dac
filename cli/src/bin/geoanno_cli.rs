use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use geoanno::{
    batch_shapefiles, batch_stats, AnnotationSession, BatchOutcome, Crs, GeoAnnoConfig, SessionCommand,
    SessionOutcome,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional TOML or JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute area and perimeter of every polygon in a folder of annotation files
    Stats {
        /// Folder containing annotation JSON files
        folder: PathBuf,
        /// Output file name inside the folder (overrides the config)
        #[arg(short, long)]
        output_name: Option<String>,
    },
    /// Convert every annotation file in a folder to a WGS84 polygon shapefile
    Shp {
        /// Folder containing annotation JSON files
        folder: PathBuf,
        /// EPSG code of projected annotation coordinates
        #[arg(long)]
        epsg: Option<u32>,
        /// Take the CRS from this GeoTIFF instead of --epsg
        #[arg(long)]
        raster: Option<PathBuf>,
    },
    /// Snap polygon vertices of an image's annotations to local gradient maxima
    Refine {
        /// Raster the annotations were drawn on
        image: PathBuf,
        /// Annotation file (defaults to <image>.json)
        #[arg(short, long)]
        annotations: Option<PathBuf>,
        /// Where to write the refined annotations (defaults to the input file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export polygon bounding boxes of an image's annotations
    Bbox {
        /// Raster the annotations were drawn on
        image: PathBuf,
        /// Annotation file (defaults to <image>.json)
        #[arg(short, long)]
        annotations: Option<PathBuf>,
        /// Output file (defaults to <image>_bbox.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print size, georeferencing and CRS of a raster
    Info {
        image: PathBuf,
    },
    /// Run a JSON array of session commands in order
    Run {
        script: PathBuf,
    },
    /// Print the JSON schema of session commands
    Schema,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GeoAnnoConfig::from_file(path)?,
        None => GeoAnnoConfig::default(),
    };

    match &cli.command {
        Commands::Stats { folder, output_name } => {
            let name = output_name.as_deref().unwrap_or(&config.stats_file_name);
            report_batch(batch_stats(folder, name)?);
        }
        Commands::Shp { folder, epsg, raster } => {
            let crs = match raster {
                Some(path) => geoanno::raster::read_geotiff_info(path)?.crs,
                None => epsg.map(Crs::from_epsg).or_else(|| config.source_crs()),
            };
            if crs.is_none() {
                warn!("No source CRS given; projected coordinates are written unchanged");
            }
            report_batch(batch_shapefiles(folder, crs)?);
        }
        Commands::Refine { image, annotations, output } => {
            let mut session = open_session(config, image, annotations.as_deref())?;
            print_outcome(&session.refine()?)?;
            let output = output.clone().or_else(|| annotations.clone());
            print_outcome(&session.save(output)?)?;
        }
        Commands::Bbox { image, annotations, output } => {
            let session = open_session(config, image, annotations.as_deref())?;
            print_outcome(&session.export_bbox(output.clone())?)?;
        }
        Commands::Info { image } => {
            let mut session = AnnotationSession::new(config);
            let outcome = session.execute(SessionCommand::LoadRaster { path: image.clone() })?;
            print_outcome(&outcome)?;
        }
        Commands::Run { script } => {
            run_script(config, script)?;
        }
        Commands::Schema => {
            let schema = SessionCommand::schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn open_session(config: GeoAnnoConfig, image: &Path, annotations: Option<&Path>) -> Result<AnnotationSession> {
    let mut session = AnnotationSession::new(config);
    session.load_raster(image)?;
    let count = session.load(annotations.map(Path::to_path_buf))?;
    info!("Loaded {} annotations for {:?}", count, image);
    Ok(session)
}

fn run_script(config: GeoAnnoConfig, script: &Path) -> Result<()> {
    let content = std::fs::read_to_string(script)?;
    let commands: Vec<SessionCommand> = serde_json::from_str(&content)?;
    let mut session = AnnotationSession::new(config);

    for command in commands {
        info!("▶ {}: {}", command, command.description());
        let outcome = session.execute(command)?;
        print_outcome(&outcome)?;
    }
    Ok(())
}

fn print_outcome(outcome: &SessionOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

fn report_batch(outcome: BatchOutcome) {
    match outcome {
        BatchOutcome::Completed(summary) => {
            info!(
                "✅ {} polygons from {} files ({} skipped)",
                summary.polygons, summary.files_scanned, summary.files_skipped
            );
            for output in &summary.outputs {
                println!("{}", output.display());
            }
        }
        BatchOutcome::NothingFound => info!("No polygon annotations found"),
    }
}
