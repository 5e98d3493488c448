use clap::{Parser, Subcommand};
use glq_core::config::{GlqConfig, HostLayer, SurfaceMode};
use glq_protocol::gl;
use glq_protocol::handle::SurfaceSize;
use glq_renderer::{Context, HeadlessDriver, RenderScheduler};
use tracing::info;

#[derive(Parser)]
#[command(name = "glq")]
#[command(about = "GLQ - deferred graphics command queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a demo scene through the queue on the headless driver
    Run {
        /// Number of frames to submit
        #[arg(short, long, default_value_t = 60)]
        frames: u32,

        /// Surface width (defaults to the configured width)
        #[arg(long)]
        width: Option<u32>,

        /// Surface height (defaults to the configured height)
        #[arg(long)]
        height: Option<u32>,

        /// Draw into a host-owned surface instead of the swap chain
        #[arg(long)]
        shared: bool,

        /// In shared mode, draw over the host's colour instead of clearing it
        #[arg(long)]
        foreground: bool,

        /// Run the execution plane on the calling thread
        #[arg(long)]
        inline: bool,

        /// Override the queue's hard maximum
        #[arg(long)]
        queue_max: Option<usize>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,
    },
}

const VERTEX_SOURCE: &str = "attribute vec2 pos; void main() { gl_Position = vec4(pos, 0.0, 1.0); }";
const FRAGMENT_SOURCE: &str = "uniform vec4 tint; void main() { gl_FragColor = tint; }";

fn load_config(path: Option<String>) -> GlqConfig {
    let path = path.unwrap_or_else(glq_core::config::default_config_path);
    GlqConfig::load_or_default(&path)
}

fn main() -> anyhow::Result<()> {
    glq_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            frames,
            width,
            height,
            shared,
            foreground,
            inline,
            queue_max,
            config,
        } => {
            let mut config = load_config(config);
            if shared {
                config.surface.mode = SurfaceMode::Shared;
            }
            if foreground {
                config.surface.layer = HostLayer::Foreground;
            }
            if let Some(max) = queue_max {
                config.queue.max_capacity = max.max(1);
                config.queue.initial_capacity = config.queue.initial_capacity.min(max.max(1));
            }
            let size = SurfaceSize::new(
                width.unwrap_or(config.surface.width),
                height.unwrap_or(config.surface.height),
            );

            info!(
                frames,
                width = size.width,
                height = size.height,
                mode = ?config.surface.mode,
                inline,
                "starting demo scene"
            );

            let driver = HeadlessDriver::with_host_surface(size);
            if inline {
                let mut ctx = Context::inline(driver, &config);
                run_scene(&mut ctx, size, frames, |ctx| ctx.scheduler().host_frame())?;
                report(&mut ctx, size)?;
                ctx.scheduler().shutdown();
            } else {
                let mut ctx = Context::threaded(driver, &config)?;
                run_scene(&mut ctx, size, frames, |ctx| ctx.scheduler().host_frame())?;
                report(&mut ctx, size)?;
            }
        }

        Commands::Config { config } => {
            let config = load_config(config);
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Submit `frames` frames of a tinted clear plus one draw. In shared mode
/// `host_frame` stands in for the host's frame loop after each submission.
fn run_scene<S: RenderScheduler>(
    ctx: &mut Context<S>,
    size: SurfaceSize,
    frames: u32,
    host_frame: impl Fn(&Context<S>),
) -> anyhow::Result<()> {
    ctx.activate(size)?;
    let shared = ctx.config().surface.mode == SurfaceMode::Shared;

    let vertex = ctx.create_shader(gl::VERTEX_SHADER)?;
    ctx.shader_source(&vertex, VERTEX_SOURCE)?;
    ctx.compile_shader(&vertex)?;
    let fragment = ctx.create_shader(gl::FRAGMENT_SHADER)?;
    ctx.shader_source(&fragment, FRAGMENT_SOURCE)?;
    ctx.compile_shader(&fragment)?;

    let program = ctx.create_program()?;
    ctx.attach_shader(&program, &vertex)?;
    ctx.attach_shader(&program, &fragment)?;
    ctx.link_program(&program)?;
    let tint = ctx.get_uniform_location(&program, "tint")?;

    let buffer = ctx.create_buffer()?;
    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(&buffer))?;
    let triangle: [f32; 6] = [-1.0, -1.0, 1.0, -1.0, 0.0, 1.0];
    let bytes = triangle.iter().flat_map(|v| v.to_le_bytes()).collect();
    ctx.buffer_data(gl::ARRAY_BUFFER, bytes, gl::STATIC_DRAW)?;

    let texture = ctx.create_texture()?;
    ctx.bind_texture(gl::TEXTURE_2D, Some(&texture))?;
    let checker: Vec<u8> = (0..16u32)
        .flat_map(|i| {
            let v = if (i + i / 4) % 2 == 0 { 255 } else { 0 };
            [v, v, v, 255]
        })
        .collect();
    ctx.tex_image_2d(4, 4, Some(checker))?;

    for frame in 0..frames {
        let phase = frame as f32 / frames.max(1) as f32;
        ctx.begin_frame();
        ctx.viewport(0, 0, size.width as i32, size.height as i32)?;
        ctx.clear_color(phase, 0.2, 1.0 - phase, 1.0)?;
        ctx.clear(gl::COLOR_BUFFER_BIT)?;
        ctx.use_program(Some(&program))?;
        ctx.uniform4f(tint.as_ref(), [1.0, 1.0, 1.0, 1.0])?;
        ctx.draw_arrays(gl::TRIANGLES, 0, 3)?;
        ctx.end_frame();
        if shared {
            host_frame(ctx);
        }
    }

    ctx.finish()?;
    Ok(())
}

fn report<S: RenderScheduler>(ctx: &mut Context<S>, size: SurfaceSize) -> anyhow::Result<()> {
    let centre = ctx.read_pixels(size.width as i32 / 2, size.height as i32 / 2, 1, 1)?;
    let error = ctx.get_error();
    let stats = ctx.stats().snapshot();

    println!("GLQ demo finished");
    println!();
    println!("  records enqueued:   {}", stats.records_enqueued);
    println!("  records dispatched: {}", stats.records_dispatched);
    println!("  records dropped:    {}", stats.records_dropped);
    println!("  queue-full flushes: {}", stats.queue_full_signals);
    println!("  frames finalized:   {}", stats.frames_finalized);
    println!("  sync jobs:          {}", stats.sync_jobs);
    println!("  payloads held:      {}", stats.payloads_outstanding);
    println!("  last frame:         {:?}", stats.last_frame_time);
    println!("  fps:                {}", ctx.fps());
    println!("  centre pixel:       {:?}", centre);
    println!("  error state:        {:?}", error);
    Ok(())
}
