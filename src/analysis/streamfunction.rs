//! Streamfunction recovery from a (time-averaged) velocity field.
//!
//! With `u = -∂zψ` and `w = ∂xψ`, the streamfunction solves
//!
//! ```text
//! ∂xx ψ + ∂zz ψ = ∂x w - ∂z u,    ψ = 0 on both walls
//! ```
//!
//! written in first-order form with `ψz = ∂z ψ` and solved once per mode.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::domain::Domain;
use crate::equations::{ModeCondition, ProblemBuilder, constant, diff, field};
use crate::error::{Result, SolverError};
use crate::field::Field;
use crate::io::{Cadence, Container, Evaluator, SnapshotError};
use crate::solver::BoundaryValueSolver;
use crate::types::{GridScale, Side};

use super::metrics::ComparisonMetrics;

/// Solve for ψ given u and w on a 2D domain (collective).
///
/// The result is only defined up to the wall values; callers that want a
/// zero-mean streamfunction apply [`remove_mean`].
pub fn solve_streamfunction(u: &Field, w: &Field) -> Result<Field> {
    let domain = Arc::clone(u.domain());
    if domain.dim() != 2 {
        return Err(SolverError::configuration(
            "streamfunction recovery needs a 2D domain",
        ));
    }
    let x = domain.basis(0).name().to_string();
    let z = domain.basis(1).name().to_string();
    let dx = |e| diff(x.as_str(), e);
    let dz = |e| diff(z.as_str(), e);

    let problem = ProblemBuilder::new(Arc::clone(&domain), &["psi", "psiz"])
        .parameter_field("u", u)
        .parameter_field("w", w)
        .dirichlet(&["psi"])
        .declare_auxiliary("psiz", dz(field("psi")))
        .equation(
            dz(field("psiz")) + dx(dx(field("psi"))),
            -dz(field("u")) + dx(field("w")),
        )
        .equation(field("psiz") - dz(field("psi")), constant(0.0))
        .boundary(Side::Left, field("psi"), constant(0.0), ModeCondition::Always)
        .boundary(Side::Right, field("psi"), constant(0.0), ModeCondition::Always)
        .build()?;

    let mut solver = BoundaryValueSolver::new(problem)?;
    solver.solve()?;
    solver
        .into_fields()
        .into_iter()
        .find(|f| f.name() == "psi")
        .ok_or_else(|| SolverError::configuration("streamfunction missing from solution"))
}

/// Subtract the volume average (collective).
pub fn remove_mean(f: &mut Field) -> Result<f64> {
    f.to_coefficient()?;
    let mean = f.integrate()? / f.domain().volume();
    f.to_grid()?;
    let shifted = f.grid()?.iter().map(|v| v - mean).collect();
    f.set_grid_values(shifted)?;
    f.to_coefficient()?;
    Ok(mean)
}

/// Velocities implied by ψ: `(-∂zψ, ∂xψ)`, coefficients current.
pub fn velocities_from_streamfunction(psi: &Field) -> Result<(Field, Field)> {
    let mut u = psi.differentiate(1)?;
    let coeffs = u.coefficients()?.iter().map(|c| -c).collect();
    u.set_coefficient_values(coeffs)?;
    let w = psi.differentiate(0)?;
    Ok((u.with_name("u"), w.with_name("w")))
}

/// Largest velocity mismatch of ψ against `(u, w)`, relative to the
/// velocity magnitude. Collective; the value is only computed on rank 0.
pub fn velocity_mismatch(psi: &Field, u: &Field, w: &Field) -> Result<Option<f64>> {
    let (mut u_psi, mut w_psi) = velocities_from_streamfunction(psi)?;
    let mut worst: Option<f64> = None;
    for (computed, reference) in [(&mut u_psi, u), (&mut w_psi, w)] {
        computed.to_grid()?;
        let mut reference = reference.clone();
        reference.to_coefficient()?;
        reference.set_scale(computed.scale())?;
        reference.to_grid()?;
        let a = computed.gather_grid()?;
        let b = reference.gather_grid()?;
        if let (Some(a), Some(b)) = (a, b) {
            let m = ComparisonMetrics::compute(&a, &b).ok_or_else(|| {
                SolverError::configuration("velocity grids differ in size")
            })?;
            worst = Some(worst.unwrap_or(0.0).max(m.relative_max_error()));
        }
    }
    Ok(worst)
}

/// Time means of named grid tasks over every record of the given
/// containers, in global unit-scale layout.
pub fn time_average(
    paths: &[impl AsRef<Path>],
    tasks: &[&str],
) -> std::result::Result<(BTreeMap<String, Vec<f64>>, f64), SnapshotError> {
    let mut sums: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut count = 0usize;
    let mut time = 0.0;
    for path in paths {
        let container = Container::read(path)?;
        for record in &container.records {
            for &name in tasks {
                let task = record.task(name).ok_or_else(|| {
                    SnapshotError::Format(format!("record without task '{}'", name))
                })?;
                let sum = sums
                    .entry(name.to_string())
                    .or_insert_with(|| vec![0.0; task.data.len()]);
                if sum.len() != task.data.len() {
                    return Err(SnapshotError::Format(format!(
                        "task '{}' changes size between records",
                        name
                    )));
                }
                sum.iter_mut().zip(&task.data).for_each(|(s, v)| *s += v);
            }
            time += record.sim_time;
            count += 1;
        }
    }
    if count == 0 {
        return Err(SnapshotError::Format("no records to average".to_string()));
    }
    for sum in sums.values_mut() {
        sum.iter_mut().for_each(|s| *s /= count as f64);
    }
    Ok((sums, time / count as f64))
}

/// Shape of task `name` in the first record of the first container.
pub fn task_shape(
    paths: &[impl AsRef<Path>],
    name: &str,
) -> std::result::Result<Vec<usize>, SnapshotError> {
    let first = paths
        .first()
        .ok_or_else(|| SnapshotError::Format("no containers given".to_string()))?;
    Container::read(first)?
        .records
        .first()
        .and_then(|r| r.task(name))
        .map(|t| t.shape.clone())
        .ok_or_else(|| SnapshotError::Format(format!("no record with task '{}'", name)))
}

/// Mean along `axis` of a row-major array of `shape`.
pub fn mean_over_axis(data: &[f64], shape: &[usize], axis: usize) -> Vec<f64> {
    let n = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();
    data.chunks(n * inner)
        .flat_map(|block| {
            (0..inner).map(move |i| (0..n).map(|k| block[k * inner + i]).sum::<f64>() / n as f64)
        })
        .collect()
}

/// Field on `domain` from a global unit-scale grid array.
pub fn field_from_global(domain: &Arc<Domain>, name: &str, global: &[f64]) -> Result<Field> {
    let mut f = Field::new(Arc::clone(domain), name);
    f.set_grid_values(domain.local_block(global, GridScale::Unit)?)?;
    f.to_coefficient()?;
    Ok(f)
}

/// Average u and w over the given snapshot containers, recover the
/// zero-mean streamfunction and write it to `out_dir` as handler
/// `streamfunction` (collective).
///
/// Records of a 3D run (`[x, y, z]` tasks, including the collapsed
/// `2d_averages`) are first averaged over y; `domain` is the 2D (x, z)
/// domain either way.
pub fn recover_streamfunction(
    domain: &Arc<Domain>,
    containers: &[impl AsRef<Path>],
    out_dir: impl AsRef<Path>,
) -> Result<Field> {
    let (means, time) = time_average(containers, &["u", "w"])?;
    let shape = task_shape(containers, "u")?;
    let get = |name: &str| {
        let mean = means
            .get(name)
            .ok_or_else(|| SolverError::configuration(format!("no averaged '{}'", name)))?;
        Ok::<_, SolverError>(match shape.len() {
            3 => mean_over_axis(mean, &shape, 1),
            _ => mean.clone(),
        })
    };
    let u = field_from_global(domain, "u", &get("u")?)?;
    let w = field_from_global(domain, "w", &get("w")?)?;

    let mut psi = solve_streamfunction(&u, &w)?;
    let offset = remove_mean(&mut psi)?;
    info!("Recovered streamfunction, removed mean {:.6e}", offset);

    let mut output = Evaluator::new(Arc::clone(domain), out_dir);
    output
        .add_file_handler("streamfunction", Cadence::Iteration(1), 1)
        .add_task("psi", field("psi"));
    output.evaluate_scheduled(std::slice::from_ref(&psi), &BTreeMap::new(), 0, time, 0.0, true)?;
    output.flush()?;
    Ok(psi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
    use crate::parallel::SerialCommunicator;
    use std::f64::consts::PI;

    #[test]
    fn test_remove_mean() {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 2.0)).unwrap().into(),
            ChebyshevBasis::new("z", 8, (0.0, 1.0)).unwrap().into(),
        ];
        let d = Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap());
        let mut f = Field::new(Arc::clone(&d), "f");
        f.set_grid_fn(|p| 3.0 + (PI * p[0]).cos() * p[1]).unwrap();
        let mean = remove_mean(&mut f).unwrap();
        assert!((mean - 3.0).abs() < 1e-12);
        assert!(f.integrate().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_mean_over_axis() {
        // shape [2, 3, 2]: value = 10 i + k + y offset that averages out
        let mut data = Vec::new();
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..2 {
                    data.push(10.0 * i as f64 + k as f64 + (j as f64 - 1.0));
                }
            }
        }
        assert_eq!(mean_over_axis(&data, &[2, 3, 2], 1), [0.0, 1.0, 10.0, 11.0]);
        assert_eq!(mean_over_axis(&[1.0, 2.0], &[2, 1, 1], 1), [1.0, 2.0]);
    }
}
