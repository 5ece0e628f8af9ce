// ============================================================
// Layer 4 — Sample and Task Loaders
// ============================================================
// Reads user samples from a JSON Lines file (one JSON object
// per line) and prompt tasks from a JSON task file.
//
// Task file layout:
//   {
//     "train": [ {"name": ..., "pairs": [...]}, ... ],
//     "eval":  {"name": ..., "pairs": [...]}
//   }
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::domain::sample::Sample;
use crate::domain::template::PromptTemplate;
use crate::domain::traits::{SampleSource, Task};

/// Loads samples from a `.jsonl` file.
pub struct JsonlSampleLoader {
    path: PathBuf,
}

impl JsonlSampleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SampleSource for JsonlSampleLoader {
    fn load_all(&self) -> Result<Vec<Sample>> {
        let file = fs::File::open(&self.path)
            .with_context(|| format!("Cannot open samples file '{}'", self.path.display()))?;

        let mut samples = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let sample: Sample = serde_json::from_str(&line).with_context(|| {
                format!("Malformed sample at {}:{}", self.path.display(), line_no + 1)
            })?;
            samples.push(sample);
        }

        tracing::info!("Loaded {} samples from '{}'", samples.len(), self.path.display());
        Ok(samples)
    }
}

/// Training tasks plus the optional single evaluation task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSet {
    pub train: Vec<PromptTemplate>,
    #[serde(default)]
    pub eval:  Option<PromptTemplate>,
}

impl TaskSet {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read task file '{}'", path.display()))?;
        let set: TaskSet = serde_json::from_str(&json)
            .with_context(|| format!("Invalid task file '{}'", path.display()))?;

        tracing::info!(
            "Loaded {} training task(s){} from '{}'",
            set.train.len(),
            set.eval.as_ref().map(|t| format!(", eval task '{}'", t.name)).unwrap_or_default(),
            path.display(),
        );
        Ok(set)
    }

    pub fn training_tasks(&self) -> Vec<Arc<dyn Task>> {
        self.train
            .iter()
            .cloned()
            .map(|t| Arc::new(t) as Arc<dyn Task>)
            .collect()
    }

    pub fn eval_task(&self) -> Option<Arc<dyn Task>> {
        self.eval.clone().map(|t| Arc::new(t) as Arc<dyn Task>)
    }
}
