use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use dip_control_core::config::{
    ControllerConfig, ControllerVariant as CoreControllerVariant, CostConfig, PsoConfig,
    SimulationConfig, SwitchMethod as CoreSwitchMethod,
};
use dip_control_core::controller::Controller;
use dip_control_core::cost::CostEvaluator;
use dip_control_core::error::EngineError;
use dip_control_core::plant::{Plant, PlantModel, PlantParams};
use dip_control_core::pso::{ConvergenceStatus, Pso};
use dip_control_core::simulation::{ExitReason, RolloutResult, Simulation};
use miette::{IntoDiagnostic, Result};
use rand::Rng;
use serde::Serialize;

/// Exit codes per the CLI contract: 0 success, 2 configuration error, 3
/// instability during a run, 4 PSO failed to converge under `--strict`.
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_INSTABILITY: u8 = 3;
const EXIT_PSO_NOT_CONVERGED: u8 = 4;

#[derive(Parser)]
#[command(name = "dip-control", version, about = "Double-inverted-pendulum SMC/PSO engine")]
struct Cli {
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum ControllerVariantArg {
    Classical,
    SuperTwisting,
    Adaptive,
    Hybrid,
}

impl From<ControllerVariantArg> for CoreControllerVariant {
    fn from(v: ControllerVariantArg) -> Self {
        match v {
            ControllerVariantArg::Classical => CoreControllerVariant::Classical,
            ControllerVariantArg::SuperTwisting => CoreControllerVariant::SuperTwisting,
            ControllerVariantArg::Adaptive => CoreControllerVariant::Adaptive,
            ControllerVariantArg::Hybrid => CoreControllerVariant::Hybrid,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a single rollout and prints (or saves) its trajectory.
    Simulate {
        #[arg(long, value_enum)]
        ctrl: ControllerVariantArg,
        #[arg(long, value_delimiter = ',')]
        gains: Vec<f64>,
        #[arg(long, default_value_t = 100.0)]
        max_force: f64,
        #[arg(long, default_value_t = 0.01)]
        dt: f64,
        #[arg(long, default_value_t = 5.0)]
        t: f64,
        #[arg(long, value_delimiter = ',', num_args = 6)]
        x0: Option<Vec<f64>>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Tunes a controller's gains with particle swarm optimization.
    Tune {
        #[arg(long, value_enum)]
        ctrl: ControllerVariantArg,
        #[arg(long, default_value_t = 30)]
        iters: usize,
        #[arg(long, default_value_t = 20)]
        particles: usize,
        /// Repeatable `lo:hi` bound, one per gain, in gain order.
        #[arg(long = "bound", required = true)]
        bounds: Vec<String>,
        #[arg(long, default_value_t = 0.01)]
        dt: f64,
        #[arg(long, default_value_t = 5.0)]
        t: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Exit with code 4 if the swarm collapses prematurely instead of
        /// running out its full budget.
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Evaluates a fixed gain vector over a batch of initial conditions.
    Evaluate {
        #[arg(long, value_enum)]
        ctrl: ControllerVariantArg,
        #[arg(long, value_delimiter = ',')]
        gains: Vec<f64>,
        #[arg(long, default_value_t = 100.0)]
        max_force: f64,
        #[arg(long, default_value_t = 0.01)]
        dt: f64,
        #[arg(long, default_value_t = 5.0)]
        t: f64,
        #[arg(long, default_value_t = 10)]
        runs: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(log_format: LogFormat, log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .into_diagnostic()?;
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match log_format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Pretty => fmt.init(),
    }
    Ok(())
}

fn default_controller_config(ctrl: ControllerVariantArg, gains: Vec<f64>, max_force: f64) -> ControllerConfig {
    ControllerConfig {
        variant: ctrl.into(),
        gains,
        max_force,
        boundary_layer: 0.05,
        switch_method: CoreSwitchMethod::Tanh,
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

fn default_plant() -> Plant {
    Plant::new(PlantModel::Full, PlantParams::default()).expect("default plant params are always valid")
}

/// Prints a configuration error to stderr and returns the code-2 exit the
/// CLI contract reserves for it.
fn config_error(err: impl std::fmt::Display) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(EXIT_CONFIG_ERROR)
}

fn rollout_exit_code(result: &RolloutResult) -> u8 {
    match result.exit_reason {
        ExitReason::Completed | ExitReason::Timeout => 0,
        ExitReason::SafetyViolation | ExitReason::IntegratorFailure => EXIT_INSTABILITY,
    }
}

/// Config echo embedded alongside every persisted run, per the CLI's
/// "time series + scalar metrics + config echo + seed + final gains +
/// fitness history" record contract.
#[derive(Serialize)]
struct RunConfig<'a> {
    controller: &'a ControllerConfig,
    simulation: &'a SimulationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pso: Option<&'a PsoConfig>,
}

#[derive(Serialize)]
struct PersistedRun<'a, T: Serialize> {
    seed: Option<u64>,
    config: RunConfig<'a>,
    #[serde(flatten)]
    result: T,
}

fn write_output<T: Serialize>(path: Option<&PathBuf>, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value).into_diagnostic()?;
    if let Some(path) = path {
        std::fs::write(path, data).into_diagnostic()?;
    } else {
        println!("{}", data);
    }
    Ok(())
}

fn parse_bound(spec: &str) -> std::result::Result<(f64, f64), String> {
    let (lo, hi) = spec
        .split_once(':')
        .ok_or_else(|| format!("bound '{spec}' must be formatted 'lo:hi'"))?;
    let lo: f64 = lo.trim().parse().map_err(|_| format!("bound '{spec}' has a non-numeric lower value"))?;
    let hi: f64 = hi.trim().parse().map_err(|_| format!("bound '{spec}' has a non-numeric upper value"))?;
    Ok((lo, hi))
}

fn simulate_command(
    ctrl: ControllerVariantArg,
    gains: Vec<f64>,
    max_force: f64,
    dt: f64,
    t: f64,
    x0: Option<Vec<f64>>,
    out: Option<PathBuf>,
) -> Result<ExitCode> {
    tracing::info!(command = "simulate", ctrl = ?ctrl, t, dt);
    let controller_cfg = default_controller_config(ctrl, gains, max_force);
    if let Err(e) = controller_cfg.validate() {
        return Ok(config_error(e));
    }
    let sim_cfg = SimulationConfig {
        dt,
        t_final: t,
        ..SimulationConfig::default()
    };
    if let Err(e) = sim_cfg.validate() {
        return Ok(config_error(e));
    }

    let x0: [f64; 6] = match x0 {
        Some(v) if v.len() == 6 => v.try_into().unwrap(),
        Some(v) => return Ok(config_error(format!("--x0 expects exactly 6 values, got {}", v.len()))),
        None => [0.0, 0.1, 0.05, 0.0, 0.0, 0.0],
    };

    let mut controller = match Controller::new(&controller_cfg) {
        Ok(c) => c,
        Err(e) => return Ok(config_error(e)),
    };
    let plant = default_plant();
    let result = Simulation::run(&mut controller, &plant, &sim_cfg, x0);
    let code = rollout_exit_code(&result);
    let persisted = PersistedRun {
        seed: None,
        config: RunConfig {
            controller: &controller_cfg,
            simulation: &sim_cfg,
            pso: None,
        },
        result,
    };
    write_output(out.as_ref(), &persisted)?;
    Ok(ExitCode::from(code))
}

fn tune_command(
    ctrl: ControllerVariantArg,
    iters: usize,
    particles: usize,
    bound_specs: Vec<String>,
    dt: f64,
    t: f64,
    seed: u64,
    strict: bool,
    out: Option<PathBuf>,
) -> Result<ExitCode> {
    tracing::info!(command = "tune", ctrl = ?ctrl, iters, particles, strict);
    let bounds = match bound_specs.iter().map(|s| parse_bound(s)).collect::<std::result::Result<Vec<_>, _>>() {
        Ok(b) => b,
        Err(e) => return Ok(config_error(e)),
    };

    let pso_cfg = PsoConfig {
        n_particles: particles,
        iters,
        bounds,
        seed,
        w: (0.9, 0.4),
        c1: (2.5, 0.5),
        c2: (1.5, 2.5),
        velocity_clamp_fraction: 0.2,
        adaptive: true,
        clamp: true,
        tol: 1e-6,
    };
    if let Err(e) = pso_cfg.validate() {
        return Ok(config_error(e));
    }

    let sim_cfg = SimulationConfig {
        dt,
        t_final: t,
        ..SimulationConfig::default()
    };
    if let Err(e) = sim_cfg.validate() {
        return Ok(config_error(e));
    }
    let x0 = [0.0, 0.12, -0.08, 0.0, 0.0, 0.0];
    let plant = default_plant();

    let baseline_gains = vec![10.0, 8.0, 15.0, 12.0, 50.0, 5.0];
    let baseline_cfg = default_controller_config(ctrl, baseline_gains, 100.0);
    let mut baseline_controller = match Controller::new(&baseline_cfg) {
        Ok(c) => c,
        Err(e) => return Ok(config_error(e)),
    };
    let baseline_rollout = Simulation::run(&mut baseline_controller, &plant, &sim_cfg, x0);
    let evaluator = CostEvaluator::new(CostConfig::default(), &baseline_rollout, sim_cfg.dt);

    let objective = |gains: &[f64]| -> f64 {
        let cfg = default_controller_config(ctrl, gains.to_vec(), 100.0);
        let Ok(mut controller) = Controller::new(&cfg) else {
            return 1.0e9;
        };
        let result = Simulation::run(&mut controller, &plant, &sim_cfg, x0);
        evaluator.evaluate(&result, sim_cfg.dt, sim_cfg.t_final)
    };

    let result = Pso::optimize(objective, &pso_cfg);
    let code = tune_exit_code(strict, result.convergence_status);
    let persisted = PersistedRun {
        seed: Some(seed),
        config: RunConfig {
            controller: &baseline_cfg,
            simulation: &sim_cfg,
            pso: Some(&pso_cfg),
        },
        result,
    };
    write_output(out.as_ref(), &persisted)?;
    Ok(ExitCode::from(code))
}

/// Only `--strict` turns a swarm collapse into a failure; an ordinary
/// iteration-budget exhaustion or tolerance-based stall both still count as
/// the optimizer having found and confirmed an answer.
fn tune_exit_code(strict: bool, status: ConvergenceStatus) -> u8 {
    if strict && status == ConvergenceStatus::PrematureConvergence {
        EXIT_PSO_NOT_CONVERGED
    } else {
        0
    }
}

#[derive(Serialize)]
struct EvaluateReport {
    mean_cost: f64,
    costs: Vec<f64>,
    exit_reasons: Vec<ExitReason>,
}

fn evaluate_command(
    ctrl: ControllerVariantArg,
    gains: Vec<f64>,
    max_force: f64,
    dt: f64,
    t: f64,
    runs: usize,
    seed: u64,
    out: Option<PathBuf>,
) -> Result<ExitCode> {
    tracing::info!(command = "evaluate", ctrl = ?ctrl, runs);
    if runs == 0 {
        return Ok(config_error(EngineError::ConfigError("--runs must be > 0".to_string())));
    }
    let controller_cfg = default_controller_config(ctrl, gains, max_force);
    if let Err(e) = controller_cfg.validate() {
        return Ok(config_error(e));
    }
    let sim_cfg = SimulationConfig {
        dt,
        t_final: t,
        ..SimulationConfig::default()
    };
    if let Err(e) = sim_cfg.validate() {
        return Ok(config_error(e));
    }
    let plant = default_plant();

    let mut rng = dip_control_core::rng::get_rng(seed);
    let initial_conditions: Vec<[f64; 6]> = (0..runs)
        .map(|_| {
            [
                0.0,
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.2..0.2),
                0.0,
                0.0,
                0.0,
            ]
        })
        .collect();

    let results = Simulation::run_batch(
        || Controller::new(&controller_cfg).expect("validated above"),
        &plant,
        &sim_cfg,
        &initial_conditions,
    );

    let baseline = results[0].clone();
    let evaluator = CostEvaluator::new(CostConfig::default(), &baseline, sim_cfg.dt);
    let costs: Vec<f64> = results
        .iter()
        .map(|r| evaluator.evaluate(r, sim_cfg.dt, sim_cfg.t_final))
        .collect();
    let mean_cost = costs.iter().sum::<f64>() / costs.len() as f64;
    let exit_reasons: Vec<ExitReason> = results.iter().map(|r| r.exit_reason).collect();
    let any_instability = results.iter().any(|r| rollout_exit_code(r) == EXIT_INSTABILITY);

    let persisted = PersistedRun {
        seed: Some(seed),
        config: RunConfig {
            controller: &controller_cfg,
            simulation: &sim_cfg,
            pso: None,
        },
        result: EvaluateReport {
            mean_cost,
            costs,
            exit_reasons,
        },
    };
    write_output(out.as_ref(), &persisted)?;
    Ok(ExitCode::from(if any_instability { EXIT_INSTABILITY } else { 0 }))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level)?;

    match cli.command {
        Commands::Simulate {
            ctrl,
            gains,
            max_force,
            dt,
            t,
            x0,
            out,
        } => simulate_command(ctrl, gains, max_force, dt, t, x0, out),
        Commands::Tune {
            ctrl,
            iters,
            particles,
            bounds,
            dt,
            t,
            seed,
            strict,
            out,
        } => tune_command(ctrl, iters, particles, bounds, dt, t, seed, strict, out),
        Commands::Evaluate {
            ctrl,
            gains,
            max_force,
            dt,
            t,
            runs,
            seed,
            out,
        } => evaluate_command(ctrl, gains, max_force, dt, t, runs, seed, out),
    }
}
