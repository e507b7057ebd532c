//! Named scenario and cross-cutting invariant tests (spec.md §7/§8), kept
//! separate from the per-module unit tests that sit alongside their code.

mod s4_hybrid_emergency;
mod s6_pso_containment_determinism;
