//! Storage Backend for Experiment Tracking
//!
//! Layout under the store root:
//! `<experiment_id>/meta.json`, `<experiment_id>/<run_id>/run.json` and
//! `<experiment_id>/<run_id>/artifacts/`.

use std::fs;
use std::path::{Path, PathBuf};

use super::tracker::{Experiment, Run};
use crate::error::{HorizonError, Result};

const EXPERIMENT_FILE: &str = "meta.json";
const RUN_FILE: &str = "run.json";
const ARTIFACT_DIR: &str = "artifacts";

/// Storage backend trait
pub trait StorageBackend: Send + Sync {
    fn save_experiment(&self, experiment: &Experiment) -> Result<()>;

    fn load_experiments(&self) -> Result<Vec<Experiment>>;

    fn save_run(&self, run: &Run) -> Result<()>;

    fn load_runs(&self, experiment_id: &str) -> Result<Vec<Run>>;

    fn delete_run(&self, experiment_id: &str, run_id: &str) -> Result<()>;

    /// Copy a file into the run's artifact area; returns its run-relative path
    fn store_artifact(&self, run: &Run, source: &Path) -> Result<String>;

    /// Write text into the run's artifact area; returns its run-relative path
    fn store_text(&self, run: &Run, name: &str, content: &str) -> Result<String>;

    fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf;

    fn is_available(&self) -> bool;
}

/// Local file system storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.base_dir.join(experiment_id)
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        // Write then rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn artifact_path(&self, run: &Run, name: &str) -> Result<(PathBuf, String)> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HorizonError::TrackingError(format!("invalid artifact name '{}'", name)))?;
        let relative = format!("{}/{}", ARTIFACT_DIR, file_name);
        let dir = self.run_dir(&run.experiment_id, &run.run_id).join(ARTIFACT_DIR);
        fs::create_dir_all(&dir)?;
        Ok((dir.join(file_name), relative))
    }
}

impl StorageBackend for LocalStorage {
    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        let path = self.experiment_dir(&experiment.experiment_id).join(EXPERIMENT_FILE);
        Self::write_json(&path, experiment)
    }

    fn load_experiments(&self) -> Result<Vec<Experiment>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let meta = entry?.path().join(EXPERIMENT_FILE);
            if meta.is_file() {
                let contents = fs::read_to_string(&meta)?;
                experiments.push(serde_json::from_str(&contents)?);
            }
        }
        Ok(experiments)
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        let path = self.run_dir(&run.experiment_id, &run.run_id).join(RUN_FILE);
        Self::write_json(&path, run)
    }

    fn load_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        let exp_dir = self.experiment_dir(experiment_id);
        if !exp_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&exp_dir)? {
            let run_file = entry?.path().join(RUN_FILE);
            if run_file.is_file() {
                let contents = fs::read_to_string(&run_file)?;
                runs.push(serde_json::from_str(&contents)?);
            }
        }
        Ok(runs)
    }

    fn delete_run(&self, experiment_id: &str, run_id: &str) -> Result<()> {
        let dir = self.run_dir(experiment_id, run_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn store_artifact(&self, run: &Run, source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(HorizonError::TrackingError(format!(
                "artifact '{}' does not exist",
                source.display()
            )));
        }
        let (target, relative) = self.artifact_path(run, &source.to_string_lossy())?;
        fs::copy(source, target)?;
        Ok(relative)
    }

    fn store_text(&self, run: &Run, name: &str, content: &str) -> Result<String> {
        let (target, relative) = self.artifact_path(run, name)?;
        fs::write(target, content)?;
        Ok(relative)
    }

    fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id).join(run_id)
    }

    fn is_available(&self) -> bool {
        fs::create_dir_all(&self.base_dir).is_ok()
    }
}
