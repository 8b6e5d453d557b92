//! Scheduled output streams.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::equations::Expr;
use crate::error::{Result, SolverError};
use crate::evaluate::{GridEvaluator, Value};
use crate::field::Field;
use crate::types::GridScale;

use super::container::{AxisCoordinates, ContainerWriter, Record, TaskData};
use super::SnapshotError;

/// When a handler writes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every `n` iterations.
    Iteration(u64),
    /// Whenever the simulation time crosses a multiple of `dt`.
    SimTime(f64),
}

/// A named output stream: tasks, a cadence and a rolling container.
pub struct FileHandler {
    name: String,
    cadence: Cadence,
    max_writes: usize,
    tasks: Vec<(String, Expr)>,
    writer: Option<ContainerWriter>,
    last_division: Option<i64>,
    writes: u64,
}

impl FileHandler {
    pub fn new(name: impl Into<String>, cadence: Cadence, max_writes: usize) -> Self {
        Self {
            name: name.into(),
            cadence,
            max_writes,
            tasks: Vec::new(),
            writer: None,
            last_division: None,
            writes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Add a task; expressions with a volume integral are written as
    /// scalars, everything else as a unit-scale grid.
    pub fn add_task(&mut self, name: impl Into<String>, expr: Expr) -> &mut Self {
        self.tasks.push((name.into(), expr));
        self
    }

    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = (String, Expr)>) -> &mut Self {
        self.tasks.extend(tasks);
        self
    }

    /// Whether a write is due after reaching `iteration` / `sim_time`.
    /// The first call is always due, so the initial state is written.
    fn due(&self, iteration: u64, sim_time: f64) -> bool {
        match self.cadence {
            Cadence::Iteration(n) => self.writes == 0 || iteration % n.max(1) == 0,
            Cadence::SimTime(dt) => self
                .last_division
                .is_none_or(|last| (sim_time / dt).floor() as i64 > last),
        }
    }

    fn mark_written(&mut self, sim_time: f64) {
        self.writes += 1;
        if let Cadence::SimTime(dt) = self.cadence {
            self.last_division = Some((sim_time / dt).floor() as i64);
        }
    }
}

/// Owns the file handlers of a run and evaluates them on schedule.
pub struct Evaluator {
    domain: Arc<Domain>,
    dir: PathBuf,
    handlers: Vec<FileHandler>,
}

impl Evaluator {
    pub fn new(domain: Arc<Domain>, dir: impl AsRef<Path>) -> Self {
        Self {
            domain,
            dir: dir.as_ref().to_path_buf(),
            handlers: Vec::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    pub fn add_file_handler(
        &mut self,
        name: impl Into<String>,
        cadence: Cadence,
        max_writes: usize,
    ) -> &mut FileHandler {
        self.handlers.push(FileHandler::new(name, cadence, max_writes));
        let last = self.handlers.len() - 1;
        &mut self.handlers[last]
    }

    pub fn handlers(&self) -> &[FileHandler] {
        &self.handlers
    }

    /// Write every handler that is due, or all of them when `force` is set
    /// (collective).
    pub fn evaluate_scheduled(
        &mut self,
        fields: &[Field],
        parameters: &BTreeMap<String, f64>,
        iteration: u64,
        sim_time: f64,
        wall_time: f64,
        force: bool,
    ) -> Result<()> {
        let domain = Arc::clone(&self.domain);
        let root = domain.distributor().rank() == 0;
        let mut ev = GridEvaluator::new(Arc::clone(&domain), fields, parameters, GridScale::Dealias);

        for handler in &mut self.handlers {
            if !(force || handler.due(iteration, sim_time)) {
                continue;
            }
            let mut tasks = Vec::with_capacity(handler.tasks.len());
            for (name, expr) in &handler.tasks {
                if let Some(task) = evaluate_task(&domain, &mut ev, name, expr)? {
                    tasks.push(task);
                }
            }
            let result = if root {
                write_record(&self.dir, &domain, handler, tasks, iteration, sim_time, wall_time)
            } else {
                Ok(())
            };
            let failed = domain
                .comm()
                .all_reduce_max(if result.is_err() { 1.0 } else { 0.0 })?;
            result?;
            if failed > 0.0 {
                return Err(SnapshotError::Format(format!(
                    "'{}' write failed on the writing worker",
                    handler.name
                ))
                .into());
            }
            handler.mark_written(sim_time);
        }
        Ok(())
    }

    /// Flush every open container.
    pub fn flush(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            if let Some(w) = handler.writer.as_mut() {
                w.flush()?;
            }
        }
        Ok(())
    }
}

/// Evaluate one task; grids are gathered on rank 0 and `None` elsewhere.
fn evaluate_task(
    domain: &Arc<Domain>,
    ev: &mut GridEvaluator<'_>,
    name: &str,
    expr: &Expr,
) -> Result<Option<TaskData>> {
    match ev.evaluate(expr)? {
        Value::Scalar(v) => Ok(Some(TaskData::scalar(name, v))),
        Value::Grid(g) => {
            let coeffs = domain.forward(&g, ev.scale())?;
            let unit = domain.backward(&coeffs, GridScale::Unit)?;
            let Some(mut data) = domain.gather_grid(&unit, GridScale::Unit)? else {
                return Ok(None);
            };
            let mut shape = domain.global_grid_shape(GridScale::Unit);
            for axis in integrated_axes(domain, expr) {
                data = collapse_axis(&data, &shape, axis);
                shape[axis] = 1;
            }
            Ok(Some(TaskData {
                name: name.to_string(),
                shape,
                data,
            }))
        }
    }
}

/// Axes of the outer `integ(.., axis)` wrappers of a task; the result is
/// constant along them.
fn integrated_axes(domain: &Domain, mut expr: &Expr) -> Vec<usize> {
    let mut axes = Vec::new();
    while let Expr::IntegrateAxis { axis, arg } = expr {
        if let Some(index) = domain.axis_index(axis) {
            axes.push(index);
        }
        expr = arg;
    }
    axes
}

/// Keep the first slice along `axis` of a row-major array.
fn collapse_axis(data: &[f64], shape: &[usize], axis: usize) -> Vec<f64> {
    let inner: usize = shape[axis + 1..].iter().product();
    let n = shape[axis];
    data.chunks(n * inner)
        .flat_map(|block| block[..inner].iter().copied())
        .collect()
}

fn write_record(
    dir: &Path,
    domain: &Domain,
    handler: &mut FileHandler,
    tasks: Vec<TaskData>,
    iteration: u64,
    sim_time: f64,
    wall_time: f64,
) -> Result<()> {
    if handler.writer.is_none() {
        let axes = (0..domain.dim())
            .map(|axis| AxisCoordinates {
                name: domain.basis(axis).name().to_string(),
                grid: domain.global_grid(axis, GridScale::Unit),
            })
            .collect();
        let names = handler.tasks.iter().map(|(n, _)| n.clone()).collect();
        handler.writer = Some(ContainerWriter::new(
            dir,
            handler.name.clone(),
            handler.max_writes,
            axes,
            names,
        )?);
        info!("Writing '{}' to {}", handler.name, dir.display());
    }
    let writer = handler
        .writer
        .as_mut()
        .ok_or_else(|| SolverError::configuration("snapshot writer missing"))?;
    writer.write(Record {
        write_number: 0,
        iteration,
        sim_time,
        wall_time,
        tasks,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
    use crate::equations::{field, integrate, integrate_axis};
    use crate::io::{Container, list_containers};
    use crate::parallel::SerialCommunicator;

    fn domain() -> Arc<Domain> {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 4.0)).unwrap().into(),
            ChebyshevBasis::new("z", 8, (0.0, 1.0)).unwrap().into(),
        ];
        Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap())
    }

    #[test]
    fn test_sim_time_cadence() {
        let mut h = FileHandler::new("s", Cadence::SimTime(2.0), 10);
        assert!(h.due(0, 0.0));
        h.mark_written(0.0);
        assert!(!h.due(1, 1.9));
        assert!(h.due(2, 2.1));
        h.mark_written(2.1);
        assert!(!h.due(3, 3.9));
        assert!(h.due(4, 6.5));
    }

    #[test]
    fn test_iteration_cadence() {
        let mut h = FileHandler::new("d", Cadence::Iteration(10), 10);
        assert!(h.due(0, 0.0));
        h.mark_written(0.0);
        assert!(!h.due(5, 0.0));
        assert!(h.due(20, 0.0));
    }

    #[test]
    fn test_scalar_and_grid_tasks() {
        let d = domain();
        let dir = tempfile::tempdir().unwrap();
        let mut b = Field::new(Arc::clone(&d), "b");
        b.set_grid_fn(|p| p[1]).unwrap();
        b.to_coefficient().unwrap();

        let mut ev = Evaluator::new(Arc::clone(&d), dir.path());
        ev.add_file_handler("snapshots", Cadence::Iteration(1), 2)
            .add_task("b", field("b"))
            .add_task("mean", integrate(field("b")) / 4.0);
        let params = BTreeMap::new();
        for it in 0..3 {
            ev.evaluate_scheduled(&[b.clone()], &params, it, it as f64, 0.0, false)
                .unwrap();
        }
        ev.flush().unwrap();

        let paths = list_containers(dir.path(), "snapshots").unwrap();
        assert_eq!(paths.len(), 2);
        let c = Container::read(&paths[0]).unwrap();
        assert_eq!(c.header.tasks, ["b", "mean"]);
        let rec = &c.records[1];
        assert_eq!(rec.iteration, 1);
        assert!((rec.task("mean").unwrap().as_scalar().unwrap() - 0.5).abs() < 1e-12);
        let grid = rec.task("b").unwrap();
        assert_eq!(grid.shape, [8, 8]);
        let z = c.axis("z").unwrap();
        for (i, v) in grid.data.iter().enumerate() {
            assert!((v - z[i % 8]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_y_integral_task_drops_axis() {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 4.0)).unwrap().into(),
            FourierBasis::new("y", 4, (0.0, 2.0)).unwrap().into(),
            ChebyshevBasis::new("z", 6, (0.0, 1.0)).unwrap().into(),
        ];
        let d = Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let mut b = Field::new(Arc::clone(&d), "b");
        b.set_grid_fn(|p| p[2] + (std::f64::consts::PI * p[1]).cos()).unwrap();
        b.to_coefficient().unwrap();

        let mut ev = Evaluator::new(Arc::clone(&d), dir.path());
        ev.add_file_handler("2d_averages", Cadence::Iteration(1), 5)
            .add_task("b", integrate_axis("y", field("b")));
        ev.evaluate_scheduled(&[b], &BTreeMap::new(), 0, 0.0, 0.0, false)
            .unwrap();
        ev.flush().unwrap();

        let paths = list_containers(dir.path(), "2d_averages").unwrap();
        let c = Container::read(&paths[0]).unwrap();
        let task = c.records[0].task("b").unwrap();
        assert_eq!(task.shape, [8, 1, 6]);
        let z = c.axis("z").unwrap();
        for (i, v) in task.data.iter().enumerate() {
            assert!((v - 2.0 * z[i % 6]).abs() < 1e-12);
        }
    }
}
