use std::collections::HashMap;
use std::sync::Arc;

/// Overrides for one named stage. `None` falls back to the run defaults.
#[derive(Clone, Copy, Default, Debug)]
struct Overrides {
    buffer: Option<usize>,
    workers: Option<usize>,
}

/// Per-stage settings shared by every [`StageContext`](super::stage::StageContext)
/// of a run. Cloning is cheap; updates copy the map.
#[derive(Clone, Default, Debug)]
pub(crate) struct StageConfig {
    stages: Arc<HashMap<&'static str, Overrides>>,
}

impl StageConfig {
    pub fn buffer_for(&self, stage: &'static str, global: usize) -> usize {
        self.stages
            .get(stage)
            .and_then(|o| o.buffer)
            .unwrap_or(global)
            .max(1)
    }

    pub fn concurrency_for(&self, stage: &'static str) -> usize {
        self.stages
            .get(stage)
            .and_then(|o| o.workers)
            .unwrap_or(1)
            .max(1)
    }

    pub fn with_buffer(&self, stage: &'static str, buffer: usize) -> Self {
        self.update(stage, |o| o.buffer = Some(buffer))
    }

    pub fn with_concurrency(&self, stage: &'static str, workers: usize) -> Self {
        self.update(stage, |o| o.workers = Some(workers))
    }

    fn update(&self, stage: &'static str, f: impl FnOnce(&mut Overrides)) -> Self {
        let mut stages = (*self.stages).clone();
        f(stages.entry(stage).or_default());
        Self {
            stages: Arc::new(stages),
        }
    }
}
