//! Parsing of pipeline stages from the command line.
//!
//! A pipeline is written as stage names each followed by its own options:
//!
//! ```text
//! geoproc cat -i roads.geojson buffer --dist 10 load -o out.geojson
//! ```
//!
//! The arguments are split at every stage name and each segment is parsed
//! with its own [`clap`] definition.

use clap::{Args, Parser, Subcommand};

use geoproc_core::geometry::{BufferParams, CapStyle, JoinStyle};
use geoproc_core::stages::{
    BufferSpec, CatSpec, CentroidSpec, Distance, FilterSpec, LoadSpec, ReprojectSpec, SimplifySpec,
};
use geoproc_core::{Crs, GeometryType, StageSpec};

/// Names that start a new stage.
pub const STAGE_NAMES: &[&str] = &[
    "cat",
    "buffer",
    "centroid",
    "simplify",
    "reproject",
    "filter",
    "load",
];

#[derive(Parser)]
#[command(name = "geoproc", no_binary_name = true)]
struct StageLine {
    #[command(subcommand)]
    stage: StageCommand,
}

#[derive(Subcommand)]
enum StageCommand {
    /// Streams the features of a dataset into the pipeline.
    Cat(CatArgs),
    /// Replaces every geometry with its buffer.
    Buffer(BufferArgs),
    /// Replaces every geometry with its centroid.
    Centroid(JobsArgs),
    /// Reduces the vertex count of lines and polygons.
    Simplify(SimplifyArgs),
    /// Transforms every geometry to another CRS.
    Reproject(ReprojectArgs),
    /// Keeps the features that match expressions and a bounding box.
    Filter(FilterArgs),
    /// Writes the stream to a dataset.
    Load(LoadArgs),
}

#[derive(Args)]
struct JobsArgs {
    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    jobs: usize,
}

#[derive(Args)]
struct CatArgs {
    /// Input dataset, `-` for stdin.
    #[arg(short, long, value_name = "DATASET", default_value = "-")]
    input: String,

    /// Driver to read with instead of detecting it from the extension.
    #[arg(short = 'f', long, value_name = "DRIVER")]
    driver: Option<String>,

    /// Read the input as a GeoJSON text sequence.
    #[arg(long)]
    sequence: bool,

    /// CRS to assign to the features, e.g. `EPSG:3857`.
    #[arg(long, value_name = "CRS")]
    crs: Option<Crs>,
}

#[derive(Args)]
struct BufferArgs {
    /// Buffer distance, or the name of a property holding it.
    #[arg(long, value_name = "DIST|FIELD", allow_negative_numbers = true)]
    dist: Distance,

    #[arg(long, default_value_t = CapStyle::default())]
    cap_style: CapStyle,

    #[arg(long, default_value_t = JoinStyle::default())]
    join_style: JoinStyle,

    /// Segments per quarter circle.
    #[arg(long, default_value_t = 16)]
    res: u32,

    #[arg(long, default_value_t = 5.0)]
    mitre_limit: f64,

    /// CRS of the input features.
    #[arg(long, value_name = "CRS")]
    src_crs: Option<Crs>,

    /// CRS to buffer in; defaults to the source CRS.
    #[arg(long, value_name = "CRS")]
    buf_crs: Option<Crs>,

    /// CRS of the output features; defaults to the buffer CRS.
    #[arg(long, value_name = "CRS")]
    dst_crs: Option<Crs>,

    /// Output geometry type, `Polygon` or `MultiPolygon`.
    #[arg(long, value_name = "TYPE", default_value = "MultiPolygon")]
    otype: GeometryType,

    #[command(flatten)]
    jobs: JobsArgs,
}

#[derive(Args)]
struct SimplifyArgs {
    /// Maximum distance between the original and simplified geometry.
    #[arg(long)]
    tolerance: f64,

    /// Keep rings valid (Visvalingam-Whyatt).
    #[arg(long, overrides_with = "no_preserve_topology")]
    preserve_topology: bool,

    /// Use plain Douglas-Peucker.
    #[arg(long, overrides_with = "preserve_topology")]
    no_preserve_topology: bool,

    #[command(flatten)]
    jobs: JobsArgs,
}

#[derive(Args)]
struct ReprojectArgs {
    #[arg(long, value_name = "CRS")]
    dst_crs: Crs,

    /// Overrides the CRS declared by the input.
    #[arg(long, value_name = "CRS")]
    src_crs: Option<Crs>,

    /// Split geometries crossing the antimeridian.
    #[arg(long)]
    clip_antimeridian: bool,

    /// Decimal places to round coordinates to.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    precision: i32,

    #[command(flatten)]
    jobs: JobsArgs,
}

#[derive(Args)]
struct FilterArgs {
    /// Expression every kept feature satisfies; repeatable.
    #[arg(long = "expr", value_name = "EXPR")]
    expressions: Vec<String>,

    #[arg(
        long,
        num_args = 4,
        value_names = ["XMIN", "YMIN", "XMAX", "YMAX"],
        allow_negative_numbers = true
    )]
    bbox: Option<Vec<f64>>,

    #[command(flatten)]
    jobs: JobsArgs,
}

#[derive(Args)]
struct LoadArgs {
    /// Output dataset, `-` for stdout.
    #[arg(short, long, value_name = "DATASET", default_value = "-")]
    output: String,

    /// Output driver; defaults to the input's.
    #[arg(short = 'f', long, value_name = "DRIVER")]
    driver: Option<String>,

    /// Geometry type to declare for the output.
    #[arg(long, value_name = "TYPE")]
    gtype: Option<GeometryType>,

    /// Write a GeoJSON text sequence.
    #[arg(long)]
    sequence: bool,

    /// Prefix sequence records with an RS character.
    #[arg(long)]
    rs: bool,

    /// Add to an existing dataset.
    #[arg(long)]
    append: bool,
}

impl From<StageCommand> for StageSpec {
    fn from(command: StageCommand) -> Self {
        match command {
            StageCommand::Cat(args) => Self::Cat(CatSpec {
                input: args.input,
                driver: args.driver,
                sequence: args.sequence,
                crs: args.crs,
            }),
            StageCommand::Buffer(args) => Self::Buffer(BufferSpec {
                distance: args.dist,
                params: BufferParams {
                    cap_style: args.cap_style,
                    join_style: args.join_style,
                    resolution: args.res,
                    mitre_limit: args.mitre_limit,
                },
                src_crs: args.src_crs,
                buf_crs: args.buf_crs,
                dst_crs: args.dst_crs,
                otype: args.otype,
                jobs: args.jobs.jobs,
            }),
            StageCommand::Centroid(args) => Self::Centroid(CentroidSpec { jobs: args.jobs }),
            StageCommand::Simplify(args) => {
                // The flags override each other, so at most one is set.
                debug_assert!(!(args.preserve_topology && args.no_preserve_topology));
                Self::Simplify(SimplifySpec {
                    tolerance: args.tolerance,
                    preserve_topology: !args.no_preserve_topology,
                    jobs: args.jobs.jobs,
                })
            },
            StageCommand::Reproject(args) => Self::Reproject(ReprojectSpec {
                dst_crs: args.dst_crs,
                src_crs: args.src_crs,
                clip_antimeridian: args.clip_antimeridian,
                precision: args.precision,
                jobs: args.jobs.jobs,
            }),
            StageCommand::Filter(args) => Self::Filter(FilterSpec {
                expressions: args.expressions,
                bbox: args
                    .bbox
                    .and_then(|b| <[f64; 4]>::try_from(b.as_slice()).ok()),
                jobs: args.jobs.jobs,
            }),
            StageCommand::Load(args) => Self::Load(LoadSpec {
                output: args.output,
                driver: args.driver,
                gtype: args.gtype,
                sequence: args.sequence,
                use_rs: args.rs,
                append: args.append,
            }),
        }
    }
}

/// Splits `args` at stage names and parses every segment.
///
/// # Errors
///
/// Returns the [`clap::Error`] of the first segment that does not parse,
/// including the help and version requests.
pub fn parse_stages(args: &[String]) -> Result<Vec<StageSpec>, clap::Error> {
    let mut segments: Vec<Vec<&str>> = Vec::new();
    for arg in args {
        match segments.last_mut() {
            Some(segment) if !STAGE_NAMES.contains(&arg.as_str()) => segment.push(arg.as_str()),
            _ => segments.push(vec![arg.as_str()]),
        }
    }

    segments
        .into_iter()
        .map(|segment| StageLine::try_parse_from(segment).map(|line| line.stage.into()))
        .collect()
}
