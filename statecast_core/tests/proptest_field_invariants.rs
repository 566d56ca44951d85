//! Property-based invariant tests for the record, field and trajectory.
//!
//! 1. Field generation is a pure function of its inputs.
//! 2. Field generation never panics on extreme scalars.
//! 3. Decoding a wrong-size buffer leaves the record untouched.
//! 4. The change detector fires iff the counter differs.
//! 5. Zero steps yields exactly the initial point.
//! 6. Zero step size pins the trajectory to the initial point.
//! 7. Parameter writes always land inside the declared range.

use statecast_core::change::{Change, ChangeDetector};
use statecast_core::field::{self, FieldInputs};
use statecast_core::params::{find_spec, TrajectoryParams, PARAM_SPECS};
use statecast_core::record::{Resolution, StateRecord};
use statecast_core::trajectory::{integrate, Variant};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn inputs_strategy() -> impl Strategy<Value = FieldInputs> {
    (0.0f64..1e4, 0.0f32..360.0, any::<u32>()).prop_map(|(sim_time, rotation_angle, tick_counter)| {
        FieldInputs {
            sim_time,
            rotation_angle,
            tick_counter,
        }
    })
}

fn resolution_strategy() -> impl Strategy<Value = Resolution> {
    (1u32..=24, 1u32..=24).prop_map(|(w, h)| Resolution::new(w, h).unwrap())
}

fn variant_strategy() -> impl Strategy<Value = Variant> {
    (0i64..4).prop_map(Variant::from_index)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Determinism
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn field_is_deterministic(inputs in inputs_strategy(), res in resolution_strategy()) {
        let a = field::generate(&inputs, res);
        let b = field::generate(&inputs, res);
        prop_assert_eq!(a.len(), res.payload_len());
        prop_assert_eq!(a, b);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Extreme scalars
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn field_survives_extreme_inputs(
        sim_time in prop_oneof![Just(1e6f64), Just(-1e6f64), Just(f64::MAX), 0.0f64..1e9],
        rotation_angle in prop_oneof![Just(-720.0f32), Just(1e7f32), -1e3f32..1e3],
        tick_counter in any::<u32>(),
    ) {
        let inputs = FieldInputs { sim_time, rotation_angle, tick_counter };
        let res = Resolution::square(5).unwrap();
        let out = field::generate(&inputs, res);
        prop_assert_eq!(out.len(), res.payload_len());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Failed decode is a no-op
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn wrong_size_decode_keeps_record(
        tick in any::<u32>(),
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let res = Resolution::square(4).unwrap();
        prop_assume!(bytes.len() != res.record_len());

        let mut record = StateRecord::new(res);
        record.tick_counter = tick;
        record.sim_time = 3.25;
        let before = record.clone();

        prop_assert!(record.decode_from(&bytes).is_err());
        prop_assert_eq!(record, before);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Change detector
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn change_iff_counter_differs(a in any::<u32>(), b in any::<u32>()) {
        let mut detector = ChangeDetector::new();
        prop_assert_eq!(detector.observe(a), Change::Changed);

        let expected = if a != b { Change::Changed } else { Change::Unchanged };
        prop_assert_eq!(detector.observe(b), expected);
        prop_assert_eq!(detector.last_seen(), Some(b));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5-6. Degenerate integration
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn zero_steps_is_initial_point(
        variant in variant_strategy(),
        x in -20.0f64..20.0, y in -20.0f64..20.0, z in -20.0f64..20.0,
    ) {
        let params = TrajectoryParams {
            step_count: 0.0,
            initial_x: x,
            initial_y: y,
            initial_z: z,
            ..TrajectoryParams::default()
        };
        let points = integrate(variant, &params);
        prop_assert_eq!(points.len(), 1);
        prop_assert_eq!(points[0], params.initial_point());
    }

    #[test]
    fn zero_step_size_is_constant(
        variant in variant_strategy(),
        steps in 1.0f64..200.0,
        x in -20.0f64..20.0, y in -20.0f64..20.0, z in -20.0f64..20.0,
    ) {
        let params = TrajectoryParams {
            step_count: steps,
            step_size: 0.0,
            initial_x: x,
            initial_y: y,
            initial_z: z,
            ..TrajectoryParams::default()
        };
        let points = integrate(variant, &params);
        prop_assert_eq!(points.len(), params.steps() + 1);
        for p in &points {
            prop_assert_eq!(*p, params.initial_point());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Parameter clamping
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn set_param_stays_in_range(index in 0usize..PARAM_SPECS.len(), value in -1e6f64..1e6) {
        let name = PARAM_SPECS[index].name;
        let spec = find_spec(name).unwrap();

        let mut params = TrajectoryParams::default();
        let stored = params.set(name, value).unwrap();
        prop_assert!(stored >= spec.min && stored <= spec.max);
        prop_assert_eq!(params.get(name), Some(stored));
    }
}
