use anyhow::{Context, Result};
use renderer::{
    detect_wgpu, render_preview, Capability, CapabilityProbe, EngineOptions, FallbackPanel,
    PreviewOptions, Renderer, RendererConfig, ShaderRegistry,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, PreviewArgs, RunArgs};
use crate::paths::AppPaths;
use crate::stack::{load_stack, select_preset};

const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 720);

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Some(Command::Probe) => probe(),
        Some(Command::List) => list(&cli.run),
        Some(Command::Preview(ref args)) => preview(&cli.run, args),
        None => run_window(&cli.run),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn probe() -> Result<()> {
    let mut probe = CapabilityProbe::new();
    match probe.run(detect_wgpu) {
        Capability::Ready(profile) => {
            println!("ready");
            println!("  adapter:     {}", profile.name);
            println!("  backend:     {:?}", profile.backend);
            println!("  device type: {:?}", profile.device_type);
            println!("  max texture: {}", profile.max_texture_dimension);
            if profile.is_software() {
                println!("  note:        software rasterizer; preview frame rate is capped");
            }
        }
        Capability::Unavailable(reason) => {
            println!("unavailable");
            println!("  {}", FallbackPanel::unavailable(reason.clone()));
        }
        Capability::Unknown => println!("unknown"),
    }
    Ok(())
}

fn list(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (stack, origin) = load_stack(args.stack.as_deref(), &paths)?;
    let registry = ShaderRegistry::global();

    println!("effects:");
    for definition in registry.definitions() {
        println!(
            "  {:<34} {:<16} blend={:<8} strength={:.2} aliases={}",
            definition.key,
            definition.display_name,
            definition.blend,
            definition.default_strength,
            definition.aliases.join(",")
        );
    }

    println!("presets ({origin}):");
    let default = stack.default_preset_name();
    for (id, preset) in &stack.presets {
        let marker = if Some(id.as_str()) == default { "*" } else { " " };
        println!(
            "{marker} {:<20} {} ({} layers)",
            id,
            preset.title(id),
            preset.layers.len()
        );
        if let Some(description) = &preset.description {
            println!("    {description}");
        }
    }
    Ok(())
}

fn preview(args: &RunArgs, preview: &PreviewArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (stack, origin) = load_stack(args.stack.as_deref(), &paths)?;
    let selection = select_preset(&stack, args.preset.as_deref())?;
    let motion_reduced = args.reduced_motion || stack.motion_reduced;

    let (width, height) = preview.size;
    let options = PreviewOptions {
        width,
        height,
        time: preview.time,
        motion_reduced,
    };
    tracing::info!(
        preset = %selection.id,
        stack = %origin,
        width,
        height,
        time = preview.time,
        motion_reduced,
        "rendering preview image"
    );

    let image = render_preview(&ShaderRegistry::global(), &selection.layers, &options);
    image
        .save(&preview.out)
        .with_context(|| format!("failed to write preview to {}", preview.out.display()))?;
    tracing::info!(path = %preview.out.display(), "preview written");
    Ok(())
}

fn run_window(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (stack, origin) = load_stack(args.stack.as_deref(), &paths)?;
    let selection = select_preset(&stack, args.preset.as_deref())?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved mythshade paths");
    tracing::info!(
        preset = %selection.id,
        stack = %origin,
        layers = selection.layers.len(),
        "starting mythshade preview"
    );

    let mut engine = EngineOptions::default();
    if let Some(max_frame_delta) = stack.max_frame_delta {
        engine.max_frame_delta = max_frame_delta;
    }

    let config = RendererConfig {
        surface_size: args.size.unwrap_or(DEFAULT_WINDOW_SIZE),
        title: format!("MythShade | {}", selection.title),
        vsync: !args.no_vsync,
        high_performance: args.high_performance,
        engine,
        layers: selection.layers,
        motion_reduced: args.reduced_motion || stack.motion_reduced,
    };
    Renderer::new(config).run()
}
