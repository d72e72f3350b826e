use crate::{
    checkpoint::CheckpointState,
    config::{Config, RunMode},
};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOrdering {
    Ascending,
    /// Random draw order, as sampled.
    Sampled,
}

/// The unit of work for one run. Computed fresh every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub mode: RunMode,
    pub total_rows: usize,
    pub start_index: usize,
    /// Inclusive; `None` when the batch is empty.
    pub end_index: Option<usize>,
    pub ordering: BatchOrdering,
    pub indices: Vec<usize>,
}

impl BatchPlan {
    pub fn compute(cfg: &Config, total_rows: usize, checkpoint: Option<&CheckpointState>) -> Self {
        match cfg.run.mode {
            RunMode::Production => {
                let start = checkpoint.map(CheckpointState::next_index).unwrap_or(0);
                Self::production(total_rows, start, cfg.batch_size())
            }
            RunMode::Test => Self::test(
                total_rows,
                cfg.batch.sample_size,
                cfg.batch.random_sample,
                cfg.batch.random_seed,
            ),
        }
    }

    /// Contiguous `[start, start + batch_size - 1]`, clipped to the input.
    pub fn production(total_rows: usize, start: usize, batch_size: Option<usize>) -> Self {
        let indices: Vec<usize> = if start >= total_rows {
            Vec::new()
        } else {
            let end_excl = match batch_size {
                Some(n) => start.saturating_add(n).min(total_rows),
                None => total_rows,
            };
            (start..end_excl).collect()
        };
        Self {
            mode: RunMode::Production,
            total_rows,
            start_index: start,
            end_index: indices.last().copied(),
            ordering: BatchOrdering::Ascending,
            indices,
        }
    }

    /// First `n` rows, or `n` rows drawn without replacement.
    pub fn test(total_rows: usize, n: usize, random: bool, seed: Option<u64>) -> Self {
        let n = n.min(total_rows);
        let (indices, ordering) = if random && n > 0 {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let drawn = rand::seq::index::sample(&mut rng, total_rows, n).into_vec();
            (drawn, BatchOrdering::Sampled)
        } else {
            ((0..n).collect(), BatchOrdering::Ascending)
        };
        Self {
            mode: RunMode::Test,
            total_rows,
            start_index: indices.first().copied().unwrap_or(0),
            end_index: indices.last().copied(),
            ordering,
            indices,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
