use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mythshade",
    author,
    version,
    about = "Layered mythic shader compositor",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Stack file to load instead of `$CONFIG/mythshade/stack.toml`.
    #[arg(long, value_name = "PATH", env = "MYTHSHADE_STACK", global = true)]
    pub stack: Option<PathBuf>,

    /// Preset to render; defaults to the stack's `default_preset`.
    #[arg(long, value_name = "NAME", global = true)]
    pub preset: Option<String>,

    /// Freeze all animation (time stays at zero).
    #[arg(long, global = true)]
    pub reduced_motion: bool,

    /// Preview window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Present without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,

    /// Prefer a discrete GPU when more than one adapter is present.
    #[arg(long)]
    pub high_performance: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether GPU layering is available on this machine.
    Probe,
    /// List registered effects and the presets of the active stack.
    List,
    /// Rasterise the selected preset on the CPU and write it as a PNG.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Output image path.
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Seconds since mount to render.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Image size (e.g. `640x360`).
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_surface_size,
        default_value = "640x360"
    )]
    pub size: (u32, u32),
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{trimmed}'"))?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}
