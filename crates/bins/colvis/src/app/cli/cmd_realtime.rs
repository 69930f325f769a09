use crate::app::{cli::ansi, scene::SceneDesc, Config, ColvisError};
use base::{
    math::UVec2,
    query::CollisionWorld,
    sampling::SamplingPattern,
    settings::VisualisationType,
    view::ViewMatrices,
};
use chrono::Local;
use std::{path::PathBuf, sync::Arc, time::Instant};
use trace::{
    output::{map_stem, timestamped_path, FileOutputWriter, OutputWriter},
    realtime::{RealtimeDriver, ViewKey},
};

/// Near plane of the realtime views.
const NEAR_PLANE: f32 = 10.0;

#[derive(clap::Args, Debug, Clone)]
#[clap(
    about = "Runs the progressive visualisation of a scene for a number of frames and saves \
             the accumulated image of each view."
)]
pub struct RealtimeOptions {
    /// Scene to trace. Falls back to the configured scene, then to the
    /// built-in demo scene.
    #[arg(short, long)]
    pub scene: Option<PathBuf>,

    /// Number of frames to run.
    #[arg(short, long, default_value_t = 120)]
    pub frames: u32,

    #[clap(
        long,
        value_name = "WIDTH HEIGHT",
        num_args(2),
        default_values_t = [1280, 720],
        help = "Size of the viewport in pixels."
    )]
    pub viewport: Vec<u32>,

    #[clap(
        long,
        num_args(1..),
        default_values_t = [0],
        allow_negative_numbers = true,
        help = "Indices of the scene viewpoints, one view is rendered per\nviewpoint."
    )]
    pub viewpoints: Vec<i32>,

    /// Vertical field of view in degrees.
    #[arg(long, default_value_t = 60.0)]
    pub fov: f32,

    /// Overrides the configured visualisation mode.
    #[arg(long)]
    pub vis_type: Option<VisualisationType>,

    /// Overrides the configured sampling pattern.
    #[arg(long)]
    pub sampling: Option<SamplingPattern>,

    /// Overrides the configured tile size.
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Overrides the configured resolution scale.
    #[arg(long)]
    pub scale: Option<f32>,

    /// Directory where the images are written. Defaults to the configured
    /// output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn realtime(opts: RealtimeOptions, config: Config) -> Result<(), ColvisError> {
    let viewport = match opts.viewport.as_slice() {
        [width, height] => UVec2::new(*width, *height),
        _ => return Err(ColvisError::new("Viewport needs a width and a height", None)),
    };
    let scene = SceneDesc::load_or_demo(opts.scene.as_deref().or(config.scene()))?;
    let world = Arc::new(scene.build()?);

    let mut options = config.settings();
    if let Some(vis_type) = opts.vis_type {
        options.vis_type = vis_type;
    }
    if let Some(sampling) = opts.sampling {
        options.sampling = sampling;
    }
    if let Some(tile_size) = opts.tile_size {
        options.tile_size = tile_size;
    }
    if let Some(scale) = opts.scale {
        options.scale = scale;
    }

    let aspect = viewport.x as f32 / viewport.y.max(1) as f32;
    let views: Vec<ViewMatrices> = opts
        .viewpoints
        .iter()
        .map(|&index| {
            let viewpoint = scene.viewpoints.resolve(index);
            ViewMatrices::from_rotation(
                viewpoint.origin,
                viewpoint.rotation,
                opts.fov.to_radians(),
                aspect,
                NEAR_PLANE,
            )
        })
        .collect();

    println!(
        "  {}>{} Running {} frames of {} views with {} mode and {} sampling",
        ansi::BRIGHT_YELLOW,
        ansi::RESET,
        opts.frames,
        views.len(),
        options.resolved_vis_type(),
        options.sampling
    );

    let output_dir = opts.output.clone().unwrap_or_else(|| config.output_dir());
    let stem = map_stem(world.map_name().as_deref());
    let now = Local::now();
    let mut driver = RealtimeDriver::new(options);
    let mut skipped = 0u32;
    let start = Instant::now();
    for frame in 0..opts.frames {
        driver.advance_frame();
        let states: Vec<_> = views
            .iter()
            .enumerate()
            .map(|(key, view)| driver.begin_frame(&world, key as ViewKey, view, viewport, true))
            .collect();
        for state in states {
            if state.is_none() {
                skipped += 1;
            }
            let completed = driver
                .end_frame(state)
                .map_err(|err| ColvisError::from_trace_error(err, "Realtime frame failed"))?;
            let Some(completed) = completed else {
                continue;
            };
            if frame + 1 == opts.frames {
                let path = timestamped_path(
                    &output_dir,
                    &format!("{}_view{}", stem, completed.view_key()),
                    "png",
                    &now,
                );
                FileOutputWriter.write_image(&completed, &path).map_err(|err| {
                    ColvisError::from_trace_error(
                        err,
                        format!("Failed to write view {}", completed.view_key()),
                    )
                })?;
                println!(
                    "  {} View {} written to {}",
                    ansi::CYAN_CHECK,
                    completed.view_key(),
                    path.display()
                );
            }
        }
        driver.prune_stale_views();
        if frame % 32 == 0 {
            log::info!("{} [{} / {}]", ansi::YELLOW_GT, frame, opts.frames);
        }
    }
    driver.shutdown();

    let elapsed = start.elapsed();
    println!(
        "  {}{} frames in {:.2}s ({:.2} ms per frame, {} skipped views){}",
        ansi::BRIGHT_CYAN,
        opts.frames,
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / opts.frames.max(1) as f64,
        skipped,
        ansi::RESET
    );
    Ok(())
}
