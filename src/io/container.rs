//! CBOR snapshot containers.
//!
//! A container is a CBOR sequence: one [`ContainerHeader`] followed by one
//! [`Record`] per write. Writers append and roll over to a new set file
//! after `max_writes` records.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::SnapshotError;

/// Coordinates of one grid axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisCoordinates {
    pub name: String,
    pub grid: Vec<f64>,
}

/// First item of every container file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub handler: String,
    pub set_number: u32,
    pub axes: Vec<AxisCoordinates>,
    pub tasks: Vec<String>,
}

/// One evaluated task. Scalars have an empty shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TaskData {
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        if self.shape.is_empty() {
            self.data.first().copied()
        } else {
            None
        }
    }
}

/// One write of a handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based, counted across all sets of the handler.
    pub write_number: u64,
    pub iteration: u64,
    pub sim_time: f64,
    pub wall_time: f64,
    pub tasks: Vec<TaskData>,
}

impl Record {
    pub fn task(&self, name: &str) -> Option<&TaskData> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Path of set `set` of handler `name` in `dir`.
pub fn container_path(dir: &Path, name: &str, set: u32) -> PathBuf {
    dir.join(format!("{}_s{}.cbor", name, set))
}

/// Appends records, rolling over to a new set file every `max_writes`.
pub struct ContainerWriter {
    dir: PathBuf,
    handler: String,
    max_writes: usize,
    axes: Vec<AxisCoordinates>,
    tasks: Vec<String>,
    set: u32,
    writes_in_set: usize,
    total_writes: u64,
    file: Option<BufWriter<File>>,
}

impl ContainerWriter {
    /// Prepare a writer; the first set file is created on the first write.
    pub fn new(
        dir: impl AsRef<Path>,
        handler: impl Into<String>,
        max_writes: usize,
        axes: Vec<AxisCoordinates>,
        tasks: Vec<String>,
    ) -> Result<Self, SnapshotError> {
        if max_writes == 0 {
            return Err(SnapshotError::Format("max_writes must be at least 1".to_string()));
        }
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            handler: handler.into(),
            max_writes,
            axes,
            tasks,
            set: 0,
            writes_in_set: 0,
            total_writes: 0,
            file: None,
        })
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes
    }

    /// Current set number (0 before the first write).
    pub fn set_number(&self) -> u32 {
        self.set
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        (self.set > 0).then(|| container_path(&self.dir, &self.handler, self.set))
    }

    /// Append a record; its write number is assigned here.
    pub fn write(&mut self, mut record: Record) -> Result<u64, SnapshotError> {
        if self.file.is_none() || self.writes_in_set >= self.max_writes {
            self.roll_over()?;
        }
        self.total_writes += 1;
        record.write_number = self.total_writes;
        let Some(file) = self.file.as_mut() else {
            return Err(SnapshotError::Format("container file not open".to_string()));
        };
        ciborium::into_writer(&record, &mut *file)?;
        file.flush()?;
        self.writes_in_set += 1;
        Ok(self.total_writes)
    }

    pub fn flush(&mut self) -> Result<(), SnapshotError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn roll_over(&mut self) -> Result<(), SnapshotError> {
        self.flush()?;
        self.set += 1;
        self.writes_in_set = 0;
        let path = container_path(&self.dir, &self.handler, self.set);
        debug!("opening container {}", path.display());
        let mut file = BufWriter::new(File::create(&path)?);
        let header = ContainerHeader {
            handler: self.handler.clone(),
            set_number: self.set,
            axes: self.axes.clone(),
            tasks: self.tasks.clone(),
        };
        ciborium::into_writer(&header, &mut file)?;
        self.file = Some(file);
        Ok(())
    }
}

/// Decoded contents of one container file.
#[derive(Clone, Debug)]
pub struct Container {
    pub header: ContainerHeader,
    pub records: Vec<Record>,
    /// The file ended inside a record, which was dropped.
    pub truncated: bool,
}

impl Container {
    /// Read a container, keeping every complete record.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
        let mut cursor = std::io::Cursor::new(bytes.as_slice());
        let header: ContainerHeader = ciborium::from_reader(&mut cursor)?;

        let mut records = Vec::new();
        let mut truncated = false;
        while (cursor.position() as usize) < bytes.len() {
            match ciborium::from_reader::<Record, _>(&mut cursor) {
                Ok(r) => records.push(r),
                Err(e) => {
                    warn!(
                        "{}: dropping incomplete final record after {} records ({})",
                        path.display(),
                        records.len(),
                        e
                    );
                    truncated = true;
                    break;
                }
            }
        }
        Ok(Self {
            header,
            records,
            truncated,
        })
    }

    /// Coordinates of a named axis.
    pub fn axis(&self, name: &str) -> Option<&[f64]> {
        self.header
            .axes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.grid.as_slice())
    }
}

/// All set files of handler `name` in `dir`, ordered by set number.
pub fn list_containers(dir: impl AsRef<Path>, name: &str) -> Result<Vec<PathBuf>, SnapshotError> {
    let prefix = format!("{}_s", name);
    let mut sets: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?;
            let ext = p.extension()?.to_str()?;
            let set = stem.strip_prefix(&prefix)?.parse().ok()?;
            (ext == "cbor").then_some((set, p))
        })
        .collect();
    sets.sort_by_key(|(s, _)| *s);
    Ok(sets.into_iter().map(|(_, p)| p).collect())
}
