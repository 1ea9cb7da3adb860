use clap::{Parser, ValueEnum};
use fluid_sim_core::overlay::{FlowField, ParticleOverlay};
use fluid_sim_core::timeline::{draw_obstacle, load_forces, save_forces, SceneElement};
use fluid_sim_core::{
    create_engine, AnyEngine, Backend, Color, Force, GridConfig, ObstacleCanvas, Property, Rect,
    ScalePreset, Sequencer, SimulationParameters, Vec2,
};
use rand::Rng;
use std::cell::Cell;
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Frames per second the sequencer and overlays advance at
const FRAME_RATE: f32 = 60.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Quality {
    Low,
    Medium,
    High,
    Full,
}

impl From<Quality> for ScalePreset {
    fn from(q: Quality) -> Self {
        match q {
            Quality::Low => ScalePreset::Low,
            Quality::Medium => ScalePreset::Medium,
            Quality::High => ScalePreset::High,
            Quality::Full => ScalePreset::Full,
        }
    }
}

/// Headless smoke simulation run
#[derive(Parser, Debug)]
#[command(name = "fluid-sim-demo")]
#[command(about = "Run the smoke simulation without a window and report statistics", long_about = None)]
struct Args {
    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Grid resolution relative to the window
    #[arg(short, long, value_enum, default_value_t = Quality::Medium)]
    quality: Quality,

    /// Compute backend (cpu or gpu)
    #[arg(short, long, default_value = "gpu")]
    backend: Backend,

    /// Number of simulation ticks to run
    #[arg(short, long, default_value_t = 600)]
    ticks: u32,

    /// Scene file with elements and events
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Force file replacing the default ring of forces
    #[arg(short, long)]
    forces: Option<PathBuf>,

    /// Write the constant forces to this file before running
    #[arg(long)]
    save_forces: Option<PathBuf>,

    /// Solid strip on the left and right edges, in grid texels
    #[arg(long, default_value_t = 4)]
    edge_inset: u32,

    /// Particle grid is 2^N × 2^N
    #[arg(long, default_value_t = 7)]
    particle_power: u32,

    /// Report interval in ticks
    #[arg(short, long, default_value_t = 60)]
    report_interval: u32,
}

/// Eight constant forces on an ellipse at 0.4 of the window, blowing inward
fn force_ring(size: Vec2) -> Vec<Force> {
    let mut rng = rand::rng();
    (0..8)
        .map(|i| {
            let angle = i as f32 * TAU / 8.0;
            let offset = Vec2::new(angle.cos() * size.x * 0.4, angle.sin() * size.y * 0.4);
            let color = Color::new(
                rng.random_range(0.1..0.8),
                rng.random_range(0.1..0.8),
                rng.random_range(0.1..0.8),
            );
            Force::new(size * 0.5 + offset, -offset.normalize(), color, 16.0)
        })
        .collect()
}

/// Obstacles drawn each time the engine asks: scene obstacles plus the edge strips
fn install_obstacles(
    engine: &mut AnyEngine,
    obstacles: Vec<SceneElement>,
    time: Rc<Cell<f32>>,
    edge_inset: u32,
) {
    let scale = engine.scale();
    engine.set_obstacle_callback(Box::new(
        move |bounds: Rect, display: bool, canvas: &mut ObstacleCanvas| {
            let overhang = if display { 1.035 } else { 1.0 };
            for element in &obstacles {
                draw_obstacle(element, time.get(), canvas, overhang, scale);
            }

            if !display && edge_inset > 0 {
                let inset = edge_inset as f32;
                canvas.fill_rect(Rect::new(0.0, 0.0, inset - 1.0, bounds.height()));
                canvas.fill_rect(Rect::new(
                    bounds.width() - inset,
                    0.0,
                    bounds.width(),
                    bounds.height(),
                ));
            }
        },
    ));
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    println!("=== Fluid Simulation Demo ===\n");

    let grid = GridConfig::from_preset(args.width, args.height, args.quality.into());
    let params = SimulationParameters {
        density_dissipation: 0.995,
        gravity: Property::new(Vec2::zeros()),
        ..SimulationParameters::default()
    };

    let mut engine = match create_engine(args.backend, grid, params) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to create {} engine: {}", args.backend, e);
            return ExitCode::FAILURE;
        }
    };
    let (gw, gh) = engine.grid_size();
    println!(
        "Window {}x{} at scale {} -> {}x{} grid on {}",
        args.width,
        args.height,
        engine.scale(),
        gw,
        gh,
        engine.backend()
    );

    let mut sequencer = Sequencer::new();
    if let Some(path) = &args.scene {
        // A bad scene is reported and the run continues with an empty one
        if sequencer.load(path).is_err() {
            warn!("Continuing with an empty scene");
        }
    }

    let size = engine.size();
    let forces = match &args.forces {
        Some(path) => match load_forces(path, size) {
            Ok(forces) => forces,
            Err(e) => {
                warn!("Failed to load forces {}: {}, using the default ring", path.display(), e);
                force_ring(size)
            }
        },
        None => force_ring(size),
    };
    if let Some(path) = &args.save_forces {
        match save_forces(path, &forces, size) {
            Ok(()) => info!("Saved {} forces to {}", forces.len(), path.display()),
            Err(e) => warn!("Failed to save forces {}: {}", path.display(), e),
        }
    }
    for force in forces {
        engine.add_constant_force(force);
    }

    let obstacle_time = Rc::new(Cell::new(sequencer.time()));
    install_obstacles(
        &mut engine,
        sequencer.obstacles().cloned().collect(),
        Rc::clone(&obstacle_time),
        args.edge_inset,
    );

    let mut particles = ParticleOverlay::new(args.particle_power, size);
    let mut flow_field = FlowField::new();
    flow_field.alpha = Property::new(0.6);
    flow_field.color_weight = Property::new(0.85);

    println!(
        "{} emitters, {} attractors, {} obstacles, {} particles\n",
        sequencer.emitters().count(),
        sequencer.attractors().count(),
        sequencer.obstacles().count(),
        particles.particles().len()
    );
    println!("  Tick |  Time(s) | Tick(ms) | Avg(ms) | Density mass | Max |v| | Segments");
    println!("-------|----------|----------|---------|--------------|--------|---------");

    let dt = 1.0 / FRAME_RATE;
    for tick in 1..=args.ticks {
        // Everything this frame is sampled before the clock advances
        let t = sequencer.time();
        let frame = sequencer.frame_context();
        for force in sequencer.emitter_forces() {
            engine.add_temporal_force(force);
        }
        let report = sequencer.step_by(dt);
        for name in &report.fired {
            info!("Event '{}' at tick {}", name, tick);
        }

        // Obstacles may be keyframed, so they are redrawn every frame
        obstacle_time.set(t);
        engine.mark_obstacles_dirty();

        let velocity = match engine.read_velocity() {
            Ok(v) => v,
            Err(e) => {
                error!("Velocity readback failed: {}", e);
                return ExitCode::FAILURE;
            }
        };
        particles.update(t, dt, &velocity, engine.grid_size(), engine.scale());

        engine.tick(&frame);

        if tick % args.report_interval.max(1) == 0 || tick == args.ticks {
            let (density, velocity) = match (engine.read_density(), engine.read_velocity()) {
                (Ok(d), Ok(v)) => (d, v),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Readback failed: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let mass: f64 = density.iter().map(|d| f64::from(d.w)).sum();
            let max_speed = velocity
                .iter()
                .map(|v| v.x.hypot(v.y))
                .fold(0.0_f32, f32::max);
            let segments =
                flow_field.segments(t, &velocity, &density, engine.grid_size(), engine.scale());

            println!(
                "{:6} | {:8.2} | {:8.2} | {:7.2} | {:12.1} | {:6.2} | {:8}",
                tick,
                sequencer.time(),
                engine.timer().last_tick_ms(),
                engine.timer().average_tick_ms(),
                mass,
                max_speed,
                segments.len()
            );
        }
    }

    println!("\n=== Simulation Complete ===");
    println!("Ticks: {}", engine.timer().ticks());
    println!("Average tick: {:.2} ms", engine.timer().average_tick_ms());
    match engine.density_edge(0.0, 1.0) {
        Ok(edge) => println!("Right edge strip: {} bytes", edge.len()),
        Err(e) => warn!("Edge readback failed: {}", e),
    }

    ExitCode::SUCCESS
}
