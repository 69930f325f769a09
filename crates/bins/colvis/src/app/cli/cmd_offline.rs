use crate::app::{
    cli::ansi,
    scene::SceneDesc,
    Config, ColvisError,
};
use base::{
    sampling::SamplingPattern,
    settings::{CollisionSettings, VisualisationType},
};
use std::{path::PathBuf, sync::Arc};
use trace::offline::{
    OfflineDriver, OfflineSettings, OfflineState, DEFAULT_RAYS_PER_TICK, DEFAULT_RESOLUTION,
};

#[derive(clap::Args, Debug, Clone)]
#[clap(about = "Traces a complete image or cube map of a scene and writes it to disk.")]
pub struct OfflineOptions {
    /// Scene to trace. Falls back to the configured scene, then to the
    /// built-in demo scene.
    #[arg(short, long)]
    pub scene: Option<PathBuf>,

    /// Width and height of the image, or of each cube face.
    #[arg(short, long, default_value_t = DEFAULT_RESOLUTION)]
    pub resolution: u32,

    /// Number of rays dispatched per batch.
    #[arg(long, default_value_t = DEFAULT_RAYS_PER_TICK)]
    pub max_rays_per_frame: u32,

    /// Allows batches of up to 65536 rays.
    #[arg(long)]
    pub large_batches: bool,

    /// Renders a cube map instead of a single image.
    #[arg(long)]
    pub cubemap: bool,

    #[clap(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        help = "Index of the scene viewpoint to trace from. A negative index\ntraces from \
                the origin."
    )]
    pub viewpoint: i32,

    /// Overrides the configured visualisation mode.
    #[arg(long)]
    pub vis_type: Option<VisualisationType>,

    /// Overrides the configured sampling pattern.
    #[arg(long)]
    pub sampling: Option<SamplingPattern>,

    /// Directory where the result is written. Defaults to the configured
    /// output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn offline(opts: OfflineOptions, config: Config) -> Result<(), ColvisError> {
    let scene = SceneDesc::load_or_demo(opts.scene.as_deref().or(config.scene()))?;
    let world = Arc::new(scene.build()?);

    let mut options = config.settings();
    if let Some(vis_type) = opts.vis_type {
        options.vis_type = vis_type;
    }
    if let Some(sampling) = opts.sampling {
        options.sampling = sampling;
    }

    let viewpoint = scene.viewpoints.resolve(opts.viewpoint);
    let settings = OfflineSettings::new(
        CollisionSettings::new(&options, 0),
        opts.resolution,
        opts.max_rays_per_frame,
        opts.large_batches,
    )
    .with_viewpoint(viewpoint.origin, viewpoint.rotation)
    .with_cubemap(opts.cubemap);

    println!(
        "  {}>{} Tracing {} rays with {} mode from {}",
        ansi::BRIGHT_YELLOW,
        ansi::RESET,
        settings.num_rays(),
        settings.settings.vis_type,
        viewpoint.origin
    );

    let output_dir = opts.output.unwrap_or_else(|| config.output_dir());
    let mut driver = OfflineDriver::new(world, settings, output_dir);
    match driver.run_to_completion() {
        OfflineState::Done => match driver.output_path() {
            Some(path) => {
                println!("  {} Written to {}", ansi::CYAN_CHECK, path.display());
                Ok(())
            },
            None => Err(ColvisError::new("Failed to write the offline trace", None)),
        },
        state => Err(ColvisError::new(
            format!("Offline trace stopped in state {:?}", state),
            None,
        )),
    }
}
