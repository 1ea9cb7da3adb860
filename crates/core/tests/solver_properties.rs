//! Numerical properties of the CPU stage kernels
//!
//! - Projection removes most of the divergence of a smooth, walled-in flow
//! - The default solver settings cut mean |div| by at least ten
//! - More Jacobi iterations leave less divergence behind
//! - Dissipation decays a resting field geometrically
//! - A solid column stops both flow and advected density
//! - Backtraces longer than a texel do not skip a one-texel wall
//!
//! Run tests with: cargo test --test `solver_properties`

use fluid_sim_core::solver::{
    CpuKernels, FieldData, FieldFormat, PingPong, SimulationParameters, StageConstants,
    StageKernels,
};
use fluid_sim_core::Texel;
use std::f32::consts::PI;

const N: usize = 64;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn constants() -> StageConstants {
    StageConstants::new(1.0, 0.125)
}

/// Curl-free bump: gradient of `cos(kx) cos(ky)` windowed by `cos²(πr/48)` inside r < 24
fn divergent_velocity() -> FieldData {
    let k = 2.0 * PI / 16.0;
    let c = 31.5;
    let phi = |x: f32, y: f32| {
        let r = ((x - c).powi(2) + (y - c).powi(2)).sqrt();
        if r >= 24.0 {
            return 0.0;
        }
        let w = (PI * r / 48.0).cos().powi(2);
        (k * x).cos() * (k * y).cos() * w
    };

    let mut v = FieldData::new(N, N, FieldFormat::RGB32F);
    let e = 0.01;
    for y in 0..N {
        for x in 0..N {
            let (fx, fy) = (x as f32, y as f32);
            let gx = (phi(fx + e, fy) - phi(fx - e, fy)) / (2.0 * e);
            let gy = (phi(fx, fy + e) - phi(fx, fy - e)) / (2.0 * e);
            v.set(x, y, Texel::new(gx, gy, 0.0, 0.0));
        }
    }
    v
}

fn divergence_energy(kernels: &CpuKernels, velocity: &FieldData, obstacles: &FieldData) -> f64 {
    let mut div = FieldData::new(N, N, FieldFormat::R32F);
    kernels.compute_divergence(&constants(), velocity, obstacles, &mut div);
    div.data.iter().map(|t| f64::from(t.x).powi(2)).sum()
}

fn mean_abs_divergence(
    kernels: &CpuKernels,
    c: &StageConstants,
    velocity: &FieldData,
    obstacles: &FieldData,
) -> f64 {
    let mut div = FieldData::new(N, N, FieldFormat::R32F);
    kernels.compute_divergence(c, velocity, obstacles, &mut div);
    div.data.iter().map(|t| f64::from(t.x.abs())).sum::<f64>() / (N * N) as f64
}

fn project(
    kernels: &CpuKernels,
    velocity: &FieldData,
    obstacles: &FieldData,
    iterations: usize,
) -> FieldData {
    project_with(kernels, &constants(), velocity, obstacles, iterations)
}

fn project_with(
    kernels: &CpuKernels,
    c: &StageConstants,
    velocity: &FieldData,
    obstacles: &FieldData,
    iterations: usize,
) -> FieldData {
    let mut div = FieldData::new(N, N, FieldFormat::R32F);
    kernels.compute_divergence(c, velocity, obstacles, &mut div);

    let mut pressure = PingPong::from_pair(
        FieldData::new(N, N, FieldFormat::R32F),
        FieldData::new(N, N, FieldFormat::R32F),
    );
    for _ in 0..iterations {
        {
            let (src, mut dst) = pressure.stage();
            kernels.jacobi(c, &src, &div, obstacles, dst.target());
        }
        pressure.swap();
    }

    let mut out = FieldData::new(N, N, FieldFormat::RGB32F);
    kernels.subtract_gradient(c, velocity, pressure.source(), obstacles, &mut out);
    out
}

#[test]
fn test_projection_removes_divergence() {
    let kernels = CpuKernels::new();
    let obstacles = FieldData::new(N, N, FieldFormat::RGB32F);
    let velocity = divergent_velocity();

    let before = divergence_energy(&kernels, &velocity, &obstacles);
    assert!(before > 1.0, "test field should be strongly divergent: {before}");

    let projected = project(&kernels, &velocity, &obstacles, 200);
    let after = divergence_energy(&kernels, &projected, &obstacles);

    assert!(
        after < 0.1 * before,
        "projection left too much divergence: before {before}, after {after}"
    );
}

#[test]
fn test_default_settings_reduce_mean_divergence() {
    let kernels = CpuKernels::new();
    let params = SimulationParameters::default();
    assert_eq!(params.jacobi_iterations, 40);
    let c = params.stage_constants();
    let obstacles = FieldData::new(N, N, FieldFormat::RGB32F);
    let velocity = divergent_velocity();

    let before = mean_abs_divergence(&kernels, &c, &velocity, &obstacles);
    let projected =
        project_with(&kernels, &c, &velocity, &obstacles, params.jacobi_iterations as usize);
    let after = mean_abs_divergence(&kernels, &c, &projected, &obstacles);

    assert!(
        after < 0.1 * before,
        "mean |div| went from {before} to {after} with the default solver"
    );
}

#[test]
fn test_more_iterations_converge_further() {
    let kernels = CpuKernels::new();
    let obstacles = FieldData::new(N, N, FieldFormat::RGB32F);
    let velocity = divergent_velocity();

    let coarse = divergence_energy(&kernels, &project(&kernels, &velocity, &obstacles, 10), &obstacles);
    let fine = divergence_energy(&kernels, &project(&kernels, &velocity, &obstacles, 160), &obstacles);

    assert!(fine < coarse, "160 iterations ({fine}) should beat 10 ({coarse})");
}

#[test]
fn test_dissipation_decays_resting_field() {
    let kernels = CpuKernels::new();
    let c = constants();
    let velocity = FieldData::new(N, N, FieldFormat::RGB32F);
    let obstacles = FieldData::new(N, N, FieldFormat::RGB32F);
    let mut density = PingPong::from_pair(
        FieldData::with_value(N, N, FieldFormat::RGBA32F, Texel::new(1.0, 0.5, 0.25, 1.0)),
        FieldData::new(N, N, FieldFormat::RGBA32F),
    );

    for _ in 0..10 {
        {
            let (src, mut dst) = density.stage();
            kernels.advect(&c, &velocity, &src, &obstacles, dst.target(), 0.99);
        }
        density.swap();
    }

    let expected = 0.99_f32.powi(10);
    for t in density.source().as_slice() {
        assert!((t.x - expected).abs() < 1e-5);
        assert!((t.w - expected).abs() < 1e-5);
        assert!((t.y - 0.5 * expected).abs() < 1e-5);
    }
}

#[test]
fn test_solid_column_blocks_flow_and_density() {
    let kernels = CpuKernels::new();
    let c = constants();
    let wall = 20;

    let mut obstacles = FieldData::new(N, N, FieldFormat::RGB32F);
    for y in 0..N {
        obstacles.set(wall, y, Texel::new(1.0, 0.0, 0.0, 0.0));
    }

    let mut velocity = FieldData::new(N, N, FieldFormat::RGB32F);
    let mut density = FieldData::new(N, N, FieldFormat::RGBA32F);
    for y in 0..N {
        for x in 0..N {
            if x != wall {
                velocity.set(x, y, Texel::new(4.0, 0.0, 0.0, 0.0));
            }
            if x < wall {
                density.set(x, y, Texel::new(1.0, 1.0, 1.0, 1.0));
            }
        }
    }

    // Components facing the wall take the wall's (zero) velocity
    let projected = project(&kernels, &velocity, &obstacles, 40);
    for y in 0..N {
        assert_eq!(projected.get(wall - 1, y).x, 0.0);
        assert_eq!(projected.get(wall, y), Texel::zeros());
        assert_eq!(projected.get(wall + 1, y).x, 0.0);
    }

    let mut pair = PingPong::from_pair(density, FieldData::new(N, N, FieldFormat::RGBA32F));
    for _ in 0..20 {
        {
            let (src, mut dst) = pair.stage();
            kernels.advect(&c, &velocity, &src, &obstacles, dst.target(), 1.0);
        }
        pair.swap();
    }

    let result = pair.source();
    for y in 0..N {
        assert_eq!(result.get(wall, y), Texel::zeros());
        for x in wall + 1..N {
            assert_eq!(result.get(x, y), Texel::zeros(), "density leaked to ({x}, {y})");
        }
        assert!(result.get(wall - 1, y).w > 0.99, "density should pile up at the wall");
    }
}

#[test]
fn test_long_backtrace_does_not_jump_thin_wall() {
    let kernels = CpuKernels::new();
    let c = constants();
    let wall = 20;

    let mut obstacles = FieldData::new(N, N, FieldFormat::RGB32F);
    let mut density = FieldData::new(N, N, FieldFormat::RGBA32F);
    for y in 0..N {
        obstacles.set(wall, y, Texel::new(1.0, 0.0, 0.0, 0.0));
        for x in 0..18 {
            density.set(x, y, Texel::new(1.0, 1.0, 1.0, 1.0));
        }
    }
    // 32 × 0.125 = 4 texels per step, so cells up to x = 21 trace back to x < 18
    let velocity =
        FieldData::with_value(N, N, FieldFormat::RGB32F, Texel::new(32.0, 0.0, 0.0, 0.0));

    let mut out = FieldData::new(N, N, FieldFormat::RGBA32F);
    kernels.advect(&c, &velocity, &density, &obstacles, &mut out, 1.0);

    for y in 0..N {
        for x in wall..N {
            assert_eq!(out.get(x, y), Texel::zeros(), "density jumped the wall to ({x}, {y})");
        }
        // Open cells still advect normally
        assert_eq!(out.get(19, y), Texel::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(out.get(17, y), Texel::new(1.0, 1.0, 1.0, 1.0));
    }
}
