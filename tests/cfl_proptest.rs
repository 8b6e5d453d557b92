//! Property tests for the adaptive time step controller.

use std::sync::Arc;

use proptest::prelude::*;

use hc_rs::basis::{Basis, ChebyshevBasis, FourierBasis};
use hc_rs::{Cfl, CflConfig, Domain, SerialCommunicator};

fn domain() -> Arc<Domain> {
    let bases: Vec<Basis> = vec![
        FourierBasis::new("x", 8, (0.0, 4.0)).unwrap().into(),
        ChebyshevBasis::new("z", 8, (0.0, 1.0)).unwrap().into(),
    ];
    Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap())
}

proptest! {
    #[test]
    fn dt_sequence_respects_bounds(
        frequencies in prop::collection::vec(0.0f64..1e3, 1..30),
        safety in 0.2f64..1.5,
        initial in 1e-3f64..0.125,
    ) {
        let d = domain();
        let base = CflConfig::default().with_safety(safety);
        let mut dt = initial;
        for &f in &frequencies {
            let cfl = Cfl::new(Arc::clone(&d), base.clone().with_initial_dt(dt)).unwrap();
            let next = cfl.update(f);

            prop_assert!(next <= base.max_dt * (1.0 + 1e-12));
            prop_assert!(next >= base.min_change * dt * (1.0 - 1e-12));
            prop_assert!(next <= base.max_change * dt * (1.0 + 1e-12));

            // Either the step is safe up to the hysteresis band, or the
            // controller is shrinking as fast as it may.
            let floored = (next - base.min_change * dt).abs() <= 1e-12 * dt;
            let safe = next * f <= safety / (1.0 - base.threshold) * (1.0 + 1e-12);
            prop_assert!(safe || floored, "dt {} -> {} at frequency {}", dt, next, f);
            dt = next;
        }
    }

    #[test]
    fn still_flow_never_shrinks(initial in 1e-3f64..0.125) {
        let cfl = Cfl::new(domain(), CflConfig::default().with_initial_dt(initial)).unwrap();
        prop_assert!(cfl.update(0.0) >= initial);
    }
}
