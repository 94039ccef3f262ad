use crate::minibatch::MiniBatch;
use crate::sample::Sample;
use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet};
use tch::Tensor;

/// A `Collator` defines how to combine multiple [`Sample`]s into a [`MiniBatch`].
pub trait Collator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch>;
}

/// Stacks same-shaped features along a new batch dimension (dim 0).
///
/// Image datasets always produce `[3, S, S]` images and `[n_targets]`
/// labels, so no padding is needed. Samples with differing feature sets
/// (e.g. a test-mode sample next to a labeled one) or shapes are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackCollator;

impl Collator for StackCollator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch> {
        let Some(first) = samples.first() else {
            bail!("Cannot collate empty sample list");
        };

        let first_keys: HashSet<&String> = first.features.keys().collect();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            let keys: HashSet<&String> = sample.features.keys().collect();
            if keys != first_keys {
                bail!(
                    "Sample #{} has mismatched features:\n -Missing: {:?}\n -Extra: {:?}",
                    i,
                    first_keys.difference(&keys).collect::<Vec<_>>(),
                    keys.difference(&first_keys).collect::<Vec<_>>()
                );
            }
        }

        let mut tensors = HashMap::with_capacity(first_keys.len());
        for key in first_keys {
            let to_stack = samples
                .iter()
                .map(|s| {
                    s.features
                        .get(key)
                        .ok_or_else(|| anyhow!("Feature '{}' vanished during collation", key))
                })
                .collect::<Result<Vec<&Tensor>>>()?;

            let reference_shape = to_stack[0].size();
            for (i, tensor) in to_stack.iter().enumerate() {
                if tensor.size() != reference_shape {
                    bail!(
                        "Shape mismatch in sample {} for feature '{}': expected {:?}, got {:?}",
                        i,
                        key,
                        reference_shape,
                        tensor.size()
                    );
                }
            }
            tensors.insert(key.clone(), Tensor::stack(&to_stack, 0));
        }
        Ok(MiniBatch { tensors })
    }
}
