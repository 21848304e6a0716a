//! Per-parameter value generators.
//!
//! Every swept parameter carries one [`Sampling`] variant. Deterministic grids
//! (linear, geometric) and predetermined fixed values are combined as a full
//! mesh; random draws are stacked column-wise; Latin hypercube parameters only
//! report their bounds and the joint design is built by the combination
//! builder.
//!
//! Samples are single-use per round: the recursive controller calls
//! [`SweepParams::reprime`] with the next round's count before sampling again.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::model::Locator;

/// How the combination builder treats a set of sweep parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingType {
    Fixed,
    Random,
    RandomLhs,
}

impl FromStr for SamplingType {
    type Err = SweepError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "fixed" => Ok(SamplingType::Fixed),
            "random" => Ok(SamplingType::Random),
            "random_lhs" | "randomlhs" => Ok(SamplingType::RandomLhs),
            _ => Err(SweepError::UnknownSamplingType(tag.to_string())),
        }
    }
}

impl fmt::Display for SamplingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingType::Fixed => f.write_str("fixed"),
            SamplingType::Random => f.write_str("random"),
            SamplingType::RandomLhs => f.write_str("random_lhs"),
        }
    }
}

/// How a sampled value is pushed into the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetMode {
    /// Fix a variable at the value, or set a parameter's value
    #[default]
    FixValue,
    SetLowerBound,
    SetUpperBound,
    /// Fix (non-zero) or unfix (zero) the variable
    SetFixedState,
}

/// Value generator for one sweep parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sampling {
    Linear {
        lower: f64,
        upper: f64,
        num_samples: usize,
    },
    /// Dense toward the lower bound
    Geometric {
        lower: f64,
        upper: f64,
        num_samples: usize,
    },
    /// Dense toward the upper bound
    ReverseGeometric {
        lower: f64,
        upper: f64,
        num_samples: usize,
    },
    Uniform {
        lower: f64,
        upper: f64,
        num_samples: usize,
    },
    Normal {
        mean: f64,
        std_dev: f64,
        num_samples: usize,
    },
    LatinHypercube {
        lower: f64,
        upper: f64,
        num_samples: usize,
    },
    PredeterminedFixed {
        values: Vec<f64>,
    },
    PredeterminedRandom {
        values: Vec<f64>,
    },
}

impl Sampling {
    #[must_use]
    pub fn sampling_type(&self) -> SamplingType {
        match self {
            Sampling::Linear { .. }
            | Sampling::Geometric { .. }
            | Sampling::ReverseGeometric { .. }
            | Sampling::PredeterminedFixed { .. } => SamplingType::Fixed,
            Sampling::Uniform { .. }
            | Sampling::Normal { .. }
            | Sampling::PredeterminedRandom { .. } => SamplingType::Random,
            Sampling::LatinHypercube { .. } => SamplingType::RandomLhs,
        }
    }

    /// Number of rows this parameter contributes
    #[must_use]
    pub fn num_samples(&self) -> usize {
        match self {
            Sampling::Linear { num_samples, .. }
            | Sampling::Geometric { num_samples, .. }
            | Sampling::ReverseGeometric { num_samples, .. }
            | Sampling::Uniform { num_samples, .. }
            | Sampling::Normal { num_samples, .. }
            | Sampling::LatinHypercube { num_samples, .. } => *num_samples,
            Sampling::PredeterminedFixed { values } | Sampling::PredeterminedRandom { values } => {
                values.len()
            }
        }
    }

    /// Set the sample count for the next round. Predetermined values keep
    /// their literal sequence.
    pub fn reprime(&mut self, count: usize) {
        match self {
            Sampling::Linear { num_samples, .. }
            | Sampling::Geometric { num_samples, .. }
            | Sampling::ReverseGeometric { num_samples, .. }
            | Sampling::Uniform { num_samples, .. }
            | Sampling::Normal { num_samples, .. }
            | Sampling::LatinHypercube { num_samples, .. } => *num_samples = count,
            Sampling::PredeterminedFixed { .. } | Sampling::PredeterminedRandom { .. } => {}
        }
    }

    /// Produce this parameter's values. Latin hypercube parameters return
    /// `[lower, upper]`.
    pub fn sample<R: Rng + ?Sized>(&self, name: &str, rng: &mut R) -> Result<Vec<f64>> {
        match self {
            Sampling::Linear {
                lower,
                upper,
                num_samples,
            } => Ok(linspace(*lower, *upper, *num_samples)),
            Sampling::Geometric {
                lower,
                upper,
                num_samples,
            } => geomspace(name, *lower, *upper, *num_samples),
            Sampling::ReverseGeometric {
                lower,
                upper,
                num_samples,
            } => {
                let forward = geomspace(name, *lower, *upper, *num_samples)?;
                Ok(forward.iter().rev().map(|g| lower + upper - g).collect())
            }
            Sampling::Uniform {
                lower,
                upper,
                num_samples,
            } => {
                if lower == upper {
                    return Ok(vec![*lower; *num_samples]);
                }
                let dist = Uniform::new(*lower, *upper).map_err(|_| {
                    SweepError::InvalidDistribution {
                        parameter: name.to_string(),
                        reason: "uniform bounds must be finite with lower < upper",
                    }
                })?;
                Ok((0..*num_samples).map(|_| dist.sample(rng)).collect())
            }
            Sampling::Normal {
                mean,
                std_dev,
                num_samples,
            } => {
                // Normal::new only rejects a non-finite std_dev
                if *std_dev < 0.0 {
                    return Err(SweepError::InvalidDistribution {
                        parameter: name.to_string(),
                        reason: "std_dev must be non-negative and finite",
                    });
                }
                let dist = rand_distr::Normal::new(*mean, *std_dev).map_err(|_| {
                    SweepError::InvalidDistribution {
                        parameter: name.to_string(),
                        reason: "std_dev must be non-negative and finite",
                    }
                })?;
                Ok((0..*num_samples).map(|_| dist.sample(rng)).collect())
            }
            Sampling::LatinHypercube { lower, upper, .. } => Ok(vec![*lower, *upper]),
            Sampling::PredeterminedFixed { values } | Sampling::PredeterminedRandom { values } => {
                Ok(values.clone())
            }
        }
    }
}

fn linspace(lower: f64, upper: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lower],
        _ => {
            let step = (upper - lower) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| lower + step * i as f64).collect();
            values[n - 1] = upper;
            values
        }
    }
}

fn geomspace(name: &str, lower: f64, upper: f64, n: usize) -> Result<Vec<f64>> {
    if lower == 0.0 || upper == 0.0 || lower.signum() != upper.signum() {
        return Err(SweepError::InvalidDistribution {
            parameter: name.to_string(),
            reason: "geometric bounds must be non-zero and share a sign",
        });
    }
    let log_lower = lower.abs().ln();
    let log_upper = upper.abs().ln();
    Ok(linspace(log_lower, log_upper, n)
        .into_iter()
        .enumerate()
        .map(|(i, exponent)| {
            if i == 0 {
                lower
            } else if i == n - 1 {
                upper
            } else {
                lower.signum() * exponent.exp()
            }
        })
        .collect())
}

/// One swept parameter: where it goes in the model and how it is sampled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub locator: Locator,
    #[serde(flatten)]
    pub sampling: Sampling,
    #[serde(default)]
    pub set_mode: SetMode,
    /// Applied before fixing or unfixing in [`SetMode::SetFixedState`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_fixed_value: Option<f64>,
}

impl SampleSpec {
    pub fn new(locator: impl Into<Locator>, sampling: Sampling) -> Self {
        Self {
            locator: locator.into(),
            sampling,
            set_mode: SetMode::FixValue,
            default_fixed_value: None,
        }
    }

    /// Evenly spaced grid with inclusive bounds
    pub fn linear(locator: impl Into<Locator>, lower: f64, upper: f64, num_samples: usize) -> Self {
        Self::new(
            locator,
            Sampling::Linear {
                lower,
                upper,
                num_samples,
            },
        )
    }

    pub fn geometric(
        locator: impl Into<Locator>,
        lower: f64,
        upper: f64,
        num_samples: usize,
    ) -> Self {
        Self::new(
            locator,
            Sampling::Geometric {
                lower,
                upper,
                num_samples,
            },
        )
    }

    pub fn reverse_geometric(
        locator: impl Into<Locator>,
        lower: f64,
        upper: f64,
        num_samples: usize,
    ) -> Self {
        Self::new(
            locator,
            Sampling::ReverseGeometric {
                lower,
                upper,
                num_samples,
            },
        )
    }

    pub fn uniform(locator: impl Into<Locator>, lower: f64, upper: f64, num_samples: usize) -> Self {
        Self::new(
            locator,
            Sampling::Uniform {
                lower,
                upper,
                num_samples,
            },
        )
    }

    pub fn normal(locator: impl Into<Locator>, mean: f64, std_dev: f64, num_samples: usize) -> Self {
        Self::new(
            locator,
            Sampling::Normal {
                mean,
                std_dev,
                num_samples,
            },
        )
    }

    pub fn latin_hypercube(
        locator: impl Into<Locator>,
        lower: f64,
        upper: f64,
        num_samples: usize,
    ) -> Self {
        Self::new(
            locator,
            Sampling::LatinHypercube {
                lower,
                upper,
                num_samples,
            },
        )
    }

    pub fn predetermined_fixed(locator: impl Into<Locator>, values: Vec<f64>) -> Self {
        Self::new(locator, Sampling::PredeterminedFixed { values })
    }

    pub fn predetermined_random(locator: impl Into<Locator>, values: Vec<f64>) -> Self {
        Self::new(locator, Sampling::PredeterminedRandom { values })
    }

    #[must_use]
    pub fn with_set_mode(mut self, set_mode: SetMode) -> Self {
        self.set_mode = set_mode;
        self
    }

    #[must_use]
    pub fn with_default_fixed_value(mut self, value: f64) -> Self {
        self.default_fixed_value = Some(value);
        self
    }

    #[must_use]
    pub fn sampling_type(&self) -> SamplingType {
        self.sampling.sampling_type()
    }
}

/// Sweep parameters in declaration order. Declaration order is column order
/// in every combination matrix and result array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepParams {
    entries: Vec<(String, SampleSpec)>,
}

impl SweepParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, replacing any earlier one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, spec: SampleSpec) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = spec;
        } else {
            self.entries.push((name, spec));
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, spec: SampleSpec) -> Self {
        self.insert(name, spec);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SampleSpec> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SampleSpec)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn specs(&self) -> impl Iterator<Item = &SampleSpec> {
        self.entries.iter().map(|(_, s)| s)
    }

    /// Validate the set and return its common sampling type.
    pub fn process(&self) -> Result<SamplingType> {
        let Some((_, first)) = self.entries.first() else {
            return Err(SweepError::Config(
                "At least one sweep parameter required".to_string(),
            ));
        };
        let sampling_type = first.sampling_type();
        if self
            .specs()
            .any(|spec| spec.sampling_type() != sampling_type)
        {
            return Err(SweepError::MixedSamplingTypes);
        }

        // Random and LHS rows are formed by position, so counts must agree
        if sampling_type != SamplingType::Fixed {
            let expected = first.sampling.num_samples();
            for (name, spec) in self.iter() {
                let found = spec.sampling.num_samples();
                if found != expected {
                    return Err(SweepError::SampleCountMismatch {
                        parameter: name.to_string(),
                        expected,
                        found,
                    });
                }
            }
        }

        Ok(sampling_type)
    }

    /// Set every parameter's count for the next round.
    pub fn reprime(&mut self, count: usize) {
        for (_, spec) in &mut self.entries {
            spec.sampling.reprime(count);
        }
    }
}

impl FromIterator<(String, SampleSpec)> for SweepParams {
    fn from_iter<I: IntoIterator<Item = (String, SampleSpec)>>(iter: I) -> Self {
        let mut params = SweepParams::new();
        for (name, spec) in iter {
            params.insert(name, spec);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_linear_inclusive_bounds() {
        let s = SampleSpec::linear("fs.a", 0.0, 10.0, 3);
        assert_close(&s.sampling.sample("a", &mut rng()).unwrap(), &[0.0, 5.0, 10.0]);

        let s = SampleSpec::linear("fs.b", 100.0, 200.0, 2);
        assert_close(&s.sampling.sample("b", &mut rng()).unwrap(), &[100.0, 200.0]);

        let s = SampleSpec::linear("fs.c", 3.0, 9.0, 1);
        assert_close(&s.sampling.sample("c", &mut rng()).unwrap(), &[3.0]);
    }

    #[test]
    fn test_geometric_and_reverse() {
        let g = SampleSpec::geometric("fs.a", 1.0, 100.0, 3);
        assert_close(&g.sampling.sample("a", &mut rng()).unwrap(), &[1.0, 10.0, 100.0]);

        let r = SampleSpec::reverse_geometric("fs.a", 1.0, 100.0, 3);
        assert_close(&r.sampling.sample("a", &mut rng()).unwrap(), &[1.0, 91.0, 100.0]);
    }

    #[test]
    fn test_geometric_rejects_zero_bound() {
        let g = SampleSpec::geometric("fs.a", 0.0, 100.0, 3);
        assert!(matches!(
            g.sampling.sample("a", &mut rng()),
            Err(SweepError::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn test_uniform_within_bounds_and_seeded() {
        let s = SampleSpec::uniform("fs.a", 2.0, 4.0, 50);
        let first = s.sampling.sample("a", &mut rng()).unwrap();
        let second = s.sampling.sample("a", &mut rng()).unwrap();
        assert_eq!(first, second);
        assert!(first.iter().all(|v| (2.0..4.0).contains(v)));
    }

    #[test]
    fn test_normal_rejects_negative_std_dev() {
        let s = SampleSpec::normal("fs.a", 0.0, -1.0, 5);
        assert!(s.sampling.sample("a", &mut rng()).is_err());
    }

    #[test]
    fn test_latin_hypercube_reports_bounds() {
        let s = SampleSpec::latin_hypercube("fs.a", -1.0, 1.0, 20);
        assert_eq!(s.sampling.sample("a", &mut rng()).unwrap(), vec![-1.0, 1.0]);
        assert_eq!(s.sampling_type(), SamplingType::RandomLhs);
    }

    #[test]
    fn test_predetermined_tags() {
        let f = SampleSpec::predetermined_fixed("fs.a", vec![3.0, 1.0]);
        let r = SampleSpec::predetermined_random("fs.a", vec![3.0, 1.0]);
        assert_eq!(f.sampling_type(), SamplingType::Fixed);
        assert_eq!(r.sampling_type(), SamplingType::Random);
        assert_eq!(f.sampling.sample("a", &mut rng()).unwrap(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_mixed_sampling_types_rejected() {
        let params = SweepParams::new()
            .with("a", SampleSpec::linear("fs.a", 0.0, 1.0, 3))
            .with("b", SampleSpec::uniform("fs.b", 0.0, 1.0, 3));
        let err = params.process().unwrap_err();
        assert!(matches!(err, SweepError::MixedSamplingTypes));
        assert_eq!(err.to_string(), "cannot mix sampling types");
    }

    #[test]
    fn test_random_count_mismatch_rejected() {
        let params = SweepParams::new()
            .with("a", SampleSpec::uniform("fs.a", 0.0, 1.0, 3))
            .with("b", SampleSpec::uniform("fs.b", 0.0, 1.0, 4));
        assert!(matches!(
            params.process(),
            Err(SweepError::SampleCountMismatch { found: 4, .. })
        ));
    }

    #[test]
    fn test_empty_params_rejected() {
        assert!(matches!(SweepParams::new().process(), Err(SweepError::Config(_))));
    }

    #[test]
    fn test_reprime_changes_count() {
        let mut params = SweepParams::new()
            .with("a", SampleSpec::uniform("fs.a", 0.0, 1.0, 3))
            .with("b", SampleSpec::predetermined_random("fs.b", vec![1.0, 2.0]));
        params.reprime(7);
        assert_eq!(params.get("a").unwrap().sampling.num_samples(), 7);
        assert_eq!(params.get("b").unwrap().sampling.num_samples(), 2);

        let values = params
            .get("a")
            .unwrap()
            .sampling
            .sample("a", &mut rng())
            .unwrap();
        assert_eq!(values.len(), 7);
    }

    #[test]
    fn test_unknown_sampling_type_tag() {
        assert_eq!("fixed".parse::<SamplingType>().unwrap(), SamplingType::Fixed);
        assert_eq!(
            "RANDOM_LHS".parse::<SamplingType>().unwrap(),
            SamplingType::RandomLhs
        );
        assert!(matches!(
            "sobol".parse::<SamplingType>(),
            Err(SweepError::UnknownSamplingType(_))
        ));
    }

    #[test]
    fn test_insert_keeps_declaration_order() {
        let params = SweepParams::new()
            .with("z", SampleSpec::linear("fs.z", 0.0, 1.0, 2))
            .with("a", SampleSpec::linear("fs.a", 0.0, 1.0, 2))
            .with("z", SampleSpec::linear("fs.z", 0.0, 5.0, 2));
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["z", "a"]);
    }

    #[test]
    fn test_spec_deserializes_with_flattened_sampling() {
        let spec: SampleSpec = serde_json::from_str(
            r#"{"locator": "fs.a", "kind": "linear", "lower": 0.0, "upper": 1.0, "num_samples": 4}"#,
        )
        .unwrap();
        assert_eq!(spec.set_mode, SetMode::FixValue);
        assert_eq!(spec.sampling.num_samples(), 4);
    }
}
