//! Group samples by source so each source is decoded once per run.

use crate::manifest::Sample;

/// Samples that share one source file, in manifest order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub source_name: String,
    pub samples: Vec<Sample>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Partition `samples` into batches keyed by `source_name`.
///
/// Batches appear in first-occurrence order of their source, and samples keep
/// their relative order inside a batch, even when same-source entries are not
/// adjacent in the input.
pub fn plan_batches(samples: Vec<Sample>) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();

    for sample in samples {
        match batches
            .iter_mut()
            .find(|b| b.source_name == sample.source_name)
        {
            Some(batch) => batch.samples.push(sample),
            None => batches.push(Batch {
                source_name: sample.source_name.clone(),
                samples: vec![sample],
            }),
        }
    }

    batches
}
