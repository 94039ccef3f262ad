use crate::collator::Collator;
use crate::sample::{Sample, IMAGE, LABEL};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tch::{Device, Tensor};

/// A batch of samples stacked along dim 0.
///
/// For a batch of `B` image samples of side `S`:
/// - `"image"` -> shape `[B, 3, S, S]`
/// - `"label"` -> shape `[B, n_targets]` (absent in test mode)
#[derive(Debug)]
pub struct MiniBatch {
    pub tensors: HashMap<String, Tensor>,
}

impl MiniBatch {
    /// Constructs a `MiniBatch` by applying the given [`Collator`] to a
    /// list of individual [`Sample`]s.
    ///
    /// Example:
    /// ```ignore
    /// let batch = MiniBatch::collate(samples, StackCollator)?;
    /// ```
    pub fn collate(samples: Vec<Sample>, collator: impl Collator) -> Result<Self> {
        collator.collate(&samples)
    }

    /// Returns the number of samples in the batch.
    pub fn batch_size(&self) -> Result<i64> {
        self.tensors
            .values()
            .next()
            .map(|t| t.size()[0])
            .ok_or(anyhow!("Empty mini-batch"))
    }

    /// Returns a reference to the tensor for a given feature key.
    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.tensors
            .get(feature)
            .ok_or_else(|| anyhow!("Feature '{}' not found in mini-batch", feature))
    }

    pub fn images(&self) -> Result<&Tensor> {
        self.get(IMAGE)
    }

    pub fn labels(&self) -> Option<&Tensor> {
        self.tensors.get(LABEL)
    }

    /// Returns an iterator over all feature keys in the batch.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Transfers all tensors to the target device (CPU/GPU)
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            tensors: self
                .tensors
                .iter()
                .map(|(feature_name, tensor)| (feature_name.clone(), tensor.to_device(device)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod minibatch_test {
    use super::*;
    use crate::collator::StackCollator;
    use tch::Kind;

    fn make_sample(value: f32) -> Sample {
        Sample::from_single(IMAGE, Tensor::full([3, 2, 2], value as f64, (Kind::Float, Device::Cpu)))
            .with_feature(LABEL, Tensor::from_slice(&[value, value * 2.0]))
    }

    #[test]
    fn test_minibatch_collate() -> Result<()> {
        let batch = MiniBatch::collate(vec![make_sample(1.0), make_sample(2.0)], StackCollator)?;
        assert_eq!(batch.batch_size()?, 2);
        assert_eq!(batch.images()?.size(), vec![2, 3, 2, 2]);

        let labels = batch.labels().map(|t| t.double_value(&[1, 1]));
        assert_eq!(labels, Some(4.0));
        Ok(())
    }

    #[test]
    fn test_minibatch_to_device() -> Result<()> {
        let cpu_batch = MiniBatch::collate(vec![make_sample(9.0)], StackCollator)?;
        let target_device = Device::cuda_if_available();
        let moved_batch = cpu_batch.to_device(target_device);

        for feature in moved_batch.features() {
            assert_eq!(moved_batch.get(feature)?.device(), target_device);
            assert_eq!(cpu_batch.get(feature)?.device(), Device::Cpu);
        }
        Ok(())
    }
}
