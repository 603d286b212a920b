//! Weighted random sampling of image records.
//!
//! Draws with replacement, proportionally to each record's weight, so images
//! holding rare classes are presented more often than under uniform sampling.
//! One epoch is `len` draws.

use log::debug;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::records::ImageRecord;
use crate::types::{DatasetError, DatasetResult};

pub struct WeightedSampler {
    dist: WeightedIndex<f64>,
    probabilities: Vec<f64>,
    rng: StdRng,
}

impl WeightedSampler {
    pub fn new(records: &[ImageRecord], seed: u64) -> DatasetResult<Self> {
        let weights: Vec<f64> = records.iter().map(|r| r.weight).collect();
        Self::from_weights(&weights, seed)
    }

    pub fn from_weights(weights: &[f64], seed: u64) -> DatasetResult<Self> {
        if weights.is_empty() {
            return Err(DatasetError::Sampler("no records to sample from".into()));
        }
        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(DatasetError::Sampler(format!(
                "weight[{i}] = {w} is not a finite non-negative number"
            )));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(DatasetError::Sampler("all weights are zero".into()));
        }
        let dist =
            WeightedIndex::new(weights.iter().copied()).map_err(|e| DatasetError::Sampler(e.to_string()))?;
        let probabilities = weights.iter().map(|w| w / total).collect();
        debug!("weighted sampler over {} records (total weight {total:.4})", weights.len());
        Ok(Self {
            dist,
            probabilities,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Selection probability of each record.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn sample_one(&mut self) -> usize {
        self.dist.sample(&mut self.rng)
    }

    /// One epoch of record indices, drawn with replacement.
    pub fn sample_epoch(&mut self) -> Vec<usize> {
        (0..self.len()).map(|_| self.sample_one()).collect()
    }

    /// One epoch split into minibatches; the last batch may be short.
    pub fn batches(&mut self, batch_size: usize) -> impl Iterator<Item = Vec<usize>> {
        let batch_size = batch_size.max(1);
        let epoch = self.sample_epoch();
        let mut start = 0;
        std::iter::from_fn(move || {
            if start >= epoch.len() {
                return None;
            }
            let end = (start + batch_size).min(epoch.len());
            let batch = epoch[start..end].to_vec();
            start = end;
            Some(batch)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probabilities_are_normalized_weights() {
        let sampler = WeightedSampler::from_weights(&[0.25, 0.75, 0.0], 1).unwrap();
        assert_eq!(sampler.probabilities(), &[0.25, 0.75, 0.0]);
    }

    #[test]
    fn heavy_records_are_drawn_more_often() {
        let mut sampler = WeightedSampler::from_weights(&[0.9, 0.1], 42).unwrap();
        let draws = 20_000;
        let heavy = (0..draws).filter(|_| sampler.sample_one() == 0).count();
        let share = heavy as f64 / draws as f64;
        assert!((share - 0.9).abs() < 0.02, "share {share}");
    }

    #[test]
    fn zero_weight_records_are_never_drawn() {
        let mut sampler = WeightedSampler::from_weights(&[1.0, 0.0, 1.0], 7).unwrap();
        assert!(sampler.sample_epoch().iter().all(|&i| i != 1));
    }

    #[test]
    fn seeded_sampler_is_reproducible() {
        let mut a = WeightedSampler::from_weights(&[0.2, 0.3, 0.5], 42).unwrap();
        let mut b = WeightedSampler::from_weights(&[0.2, 0.3, 0.5], 42).unwrap();
        assert_eq!(
            a.batches(2).collect::<Vec<_>>(),
            b.batches(2).collect::<Vec<_>>()
        );
    }

    #[test]
    fn batches_cover_one_epoch() {
        let mut sampler = WeightedSampler::from_weights(&[1.0; 7], 3).unwrap();
        let batches: Vec<_> = sampler.batches(5).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        assert!(WeightedSampler::from_weights(&[], 0).is_err());
        assert!(WeightedSampler::from_weights(&[0.0, 0.0], 0).is_err());
        assert!(WeightedSampler::from_weights(&[1.0, f64::NAN], 0).is_err());
        assert!(WeightedSampler::from_weights(&[1.0, -0.5], 0).is_err());
    }
}
