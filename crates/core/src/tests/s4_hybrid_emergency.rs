//! S4: a state excursion far beyond the operating envelope forces the
//! hybrid controller into emergency mode (zero control, gains reset to
//! their floor) within a single step, and it recovers within one further
//! safe step, satisfying invariant 11 (recovery is never delayed).

use crate::config::{ControllerConfig, ControllerVariant, SwitchMethod};
use crate::controller::{Controller, HybridMode};

fn hybrid_cfg() -> ControllerConfig {
    ControllerConfig {
        variant: ControllerVariant::Hybrid,
        gains: vec![5.0, 3.0, 4.0, 3.0],
        max_force: 100.0,
        boundary_layer: 0.05,
        switch_method: SwitchMethod::Tanh,
        dead_zone: 0.0,
        k_init: 10.0,
        k_min: 1.0,
        k_max: 50.0,
        leak: 0.1,
        rate_limit: 50.0,
        recenter_low: 0.2,
        recenter_high: 0.8,
        k_x: 0.0,
        k_v: 0.0,
        enable_equivalent: false,
    }
}

#[test]
fn emergency_engages_on_excursion_and_clears_within_one_step() {
    let cfg = hybrid_cfg();
    let mut controller = Controller::new(&cfg).unwrap();

    let (u_emergency, diag_emergency) = controller.compute(&[0.0, 50.0, -50.0, 0.0, 0.0, 0.0], 0.01, None);
    assert_eq!(u_emergency, 0.0);
    assert_eq!(diag_emergency.mode, Some(HybridMode::Emergency));

    let (u_recovered, diag_recovered) = controller.compute(&[0.0, 0.05, 0.02, 0.0, 0.0, 0.0], 0.01, None);
    assert_eq!(diag_recovered.mode, Some(HybridMode::Normal));
    assert!(u_recovered.is_finite());
    assert!(u_recovered.abs() <= cfg.max_force + 1e-9);
}

#[test]
fn non_finite_state_also_triggers_emergency() {
    let cfg = hybrid_cfg();
    let mut controller = Controller::new(&cfg).unwrap();
    let (u, diag) = controller.compute(&[0.0, f64::NAN, 0.0, 0.0, 0.0, 0.0], 0.01, None);
    assert_eq!(u, 0.0);
    assert_eq!(diag.mode, Some(HybridMode::Emergency));
}
