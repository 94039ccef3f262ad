use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tch::Tensor;

/// Feature key of the channel-first image tensor.
pub const IMAGE: &str = "image";
/// Feature key of the target vector.
pub const LABEL: &str = "label";

/// One dataset access: feature names mapped to tensors.
///
/// Image datasets produce `{"image": [3, S, S]}` in test mode and
/// `{"image": [3, S, S], "label": [n_targets]}` otherwise.
#[derive(Debug)]
pub struct Sample {
    pub features: HashMap<String, Tensor>,
}

/// Creates a shallow clone of the `Sample`
impl Clone for Sample {
    fn clone(&self) -> Self {
        let features = self
            .features
            .iter()
            .map(|(k, v)| (k.clone(), v.shallow_clone()))
            .collect();
        Self { features }
    }
}

/// Safety:
/// `tch::Tensor` is `Send` in tch-rs and a `HashMap<String, Tensor>` only
/// composes `Send` parts. Mutation needs `&mut self`, so shared references
/// only ever read.
unsafe impl Send for Sample {}
unsafe impl Sync for Sample {}

impl Sample {
    pub fn new(features: HashMap<String, Tensor>) -> Self {
        Self { features }
    }

    /// Creates a `Sample` from a single `(feature_name, tensor)` pair.
    ///
    /// Chain with [`with_feature`](Self::with_feature) to add more features.
    pub fn from_single(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            features: HashMap::from([(name.into(), tensor)]),
        }
    }

    /// Adds or overwrites a feature in the `Sample`.
    pub fn with_feature(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.features.insert(name.into(), tensor);
        self
    }

    /// Returns a reference to the tensor by feature name.
    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.features
            .get(feature)
            .ok_or_else(|| anyhow!("Feature {} not found", feature))
    }

    pub fn image(&self) -> Result<&Tensor> {
        self.get(IMAGE)
    }

    /// `None` for unlabeled (test mode) samples.
    pub fn label(&self) -> Option<&Tensor> {
        self.features.get(LABEL)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns an iterator over all feature names in this `Sample`.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod sample_test {
    use super::*;
    use tch::{Device, Kind};

    fn make_sample(value: f32) -> Sample {
        Sample::from_single(IMAGE, Tensor::full([3, 2, 2], value as f64, (Kind::Float, Device::Cpu)))
            .with_feature(LABEL, Tensor::from_slice(&[value, 0.0]))
    }

    #[test]
    fn test_sample_basic_construction() -> Result<()> {
        let sample = make_sample(0.5);

        assert_eq!(sample.image()?.size(), vec![3, 2, 2]);
        assert_eq!(sample.label().map(|t| t.size()), Some(vec![2]));
        assert!(sample.get("missing").is_err());
        assert_eq!(sample.len(), 2);

        let features: Vec<_> = sample.features().collect();
        assert!(features.contains(&IMAGE));
        assert!(features.contains(&LABEL));
        Ok(())
    }

    #[test]
    fn test_unlabeled_sample() {
        let sample = Sample::from_single(IMAGE, Tensor::zeros([3, 1, 1], (Kind::Float, Device::Cpu)));
        assert!(sample.label().is_none());
        assert_eq!(sample.clone().len(), 1);
    }
}
