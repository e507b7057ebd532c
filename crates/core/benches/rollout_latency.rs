//! Latency benchmarks for a single closed-loop rollout and a PSO tuning pass,
//! the two hot paths on the engine's critical path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dip_control_core::config::{ControllerConfig, ControllerVariant, CostConfig, PsoConfig, SimulationConfig, SwitchMethod};
use dip_control_core::controller::Controller;
use dip_control_core::cost::CostEvaluator;
use dip_control_core::plant::{Plant, PlantModel, PlantParams};
use dip_control_core::pso::Pso;
use dip_control_core::simulation::Simulation;

fn classical_cfg(gains: Vec<f64>) -> ControllerConfig {
    ControllerConfig {
        variant: ControllerVariant::Classical,
        gains,
        max_force: 100.0,
        boundary_layer: 0.05,
        switch_method: SwitchMethod::Tanh,
        dead_zone: 0.0,
        k_init: 10.0,
        k_min: 1.0,
        k_max: 100.0,
        leak: 0.1,
        rate_limit: 50.0,
        recenter_low: 0.2,
        recenter_high: 0.8,
        k_x: 0.0,
        k_v: 0.0,
        enable_equivalent: false,
    }
}

fn bench_single_rollout(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollout");
    let plant = Plant::new(PlantModel::Full, PlantParams::default()).unwrap();
    let x0 = [0.0, 0.1, 0.05, 0.0, 0.0, 0.0];

    for t_final in [1.0, 5.0, 10.0].iter() {
        let cfg = SimulationConfig {
            dt: 0.01,
            t_final: *t_final,
            ..SimulationConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("classical", t_final), t_final, |b, _| {
            let mut controller = Controller::new(&classical_cfg(vec![10.0, 8.0, 15.0, 12.0, 50.0, 5.0])).unwrap();
            b.iter(|| black_box(Simulation::run(&mut controller, &plant, &cfg, x0)))
        });
    }

    group.finish();
}

fn bench_pso_tuning_pass(c: &mut Criterion) {
    let plant = Plant::new(PlantModel::Full, PlantParams::default()).unwrap();
    let sim_cfg = SimulationConfig {
        dt: 0.02,
        t_final: 1.0,
        ..SimulationConfig::default()
    };
    let x0 = [0.0, 0.1, 0.05, 0.0, 0.0, 0.0];
    let mut baseline_controller = Controller::new(&classical_cfg(vec![10.0, 8.0, 15.0, 12.0, 50.0, 5.0])).unwrap();
    let baseline = Simulation::run(&mut baseline_controller, &plant, &sim_cfg, x0);
    let evaluator = CostEvaluator::new(CostConfig::default(), &baseline, sim_cfg.dt);

    let pso_cfg = PsoConfig {
        n_particles: 10,
        iters: 10,
        bounds: vec![(1.0, 30.0), (1.0, 30.0), (1.0, 30.0), (1.0, 30.0), (1.0, 80.0), (0.0, 20.0)],
        seed: 1,
        w: (0.9, 0.4),
        c1: (2.5, 0.5),
        c2: (1.5, 2.5),
        velocity_clamp_fraction: 0.2,
        adaptive: true,
        clamp: true,
        tol: 1e-9,
    };

    c.bench_function("pso_10x10", |b| {
        b.iter(|| {
            let objective = |gains: &[f64]| -> f64 {
                let cfg = classical_cfg(gains.to_vec());
                let Ok(mut controller) = Controller::new(&cfg) else {
                    return 1.0e9;
                };
                let result = Simulation::run(&mut controller, &plant, &sim_cfg, x0);
                evaluator.evaluate(&result, sim_cfg.dt, sim_cfg.t_final)
            };
            black_box(Pso::optimize(objective, &pso_cfg))
        })
    });
}

criterion_group!(benches, bench_single_rollout, bench_pso_tuning_pass);
criterion_main!(benches);
