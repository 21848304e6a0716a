//! YAML sweep files.
//!
//! ```yaml
//! options:
//!   seed: 7
//!   number_of_workers: 2
//! num_samples: 40
//! sampling_type: fixed
//! model:
//!   target_outlet: 0.1
//! parameters:
//!   - name: flow
//!     locator: tank.inlet_flow
//!     kind: linear
//!     lower: 0.5
//!     upper: 4.0
//!     num_samples: 8
//! outputs:
//!   - name: volume
//!     locator: tank.volume
//!   - name: load
//!     derived: mass_load
//! ```

use std::path::Path;

use color_eyre::eyre::{Context, bail, eyre};
use paramsweep_core::{
    Locator, OutputSource, OutputSpecs, SampleSpec, SamplingType, SweepDefinition, SweepOptions,
    SweepParams,
};
use serde::{Deserialize, Serialize};

use crate::demo_model::{DerivedQuantity, TankModel, TankSettings, optimize_fn, probe_fn};

/// One swept parameter; the sample spec fields sit beside the name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    #[serde(flatten)]
    pub spec: SampleSpec,
}

/// One requested output: either a model component or a derived quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedQuantity>,
}

/// Everything needed to run a sweep from the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFile {
    #[serde(default)]
    pub options: SweepOptions,
    /// Re-primes every parameter to this count for a single-round sweep.
    /// Recursive runs take their target from the command line instead.
    #[serde(default)]
    pub num_samples: Option<usize>,
    /// `fixed`, `random` or `random_lhs`; when set, the parameters must agree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_type: Option<String>,
    #[serde(default)]
    pub model: TankSettings,
    pub parameters: Vec<ParameterEntry>,
    /// Empty captures every active component
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
}

impl SweepFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_saphyr::Error> {
        serde_saphyr::from_str(yaml)
    }

    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read sweep file {}", path.display()))?;
        let file = Self::from_yaml(&content)
            .wrap_err_with(|| format!("Failed to parse sweep file {}", path.display()))?;
        file.check()?;
        Ok(file)
    }

    /// Reject definitions that cannot describe a sweep.
    pub fn check(&self) -> color_eyre::Result<()> {
        if self.parameters.is_empty() {
            bail!("sweep file declares no parameters");
        }
        for entry in &self.outputs {
            match (&entry.locator, &entry.derived) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => bail!(
                    "output {} needs exactly one of `locator` or `derived`",
                    entry.name
                ),
            }
        }
        if let Some(tag) = &self.sampling_type {
            let declared: SamplingType = tag.parse().map_err(|e| eyre!("{e}"))?;
            let found = self.sweep_params().process().map_err(|e| eyre!("{e}"))?;
            if declared != found {
                bail!("sweep file declares {declared} sampling but its parameters are {found}");
            }
        }
        Ok(())
    }

    pub fn sweep_params(&self) -> SweepParams {
        self.parameters
            .iter()
            .map(|entry| (entry.name.clone(), entry.spec.clone()))
            .collect()
    }

    /// `None` when no outputs are listed
    pub fn output_specs(&self) -> Option<OutputSpecs<TankModel>> {
        if self.outputs.is_empty() {
            return None;
        }
        let specs = self
            .outputs
            .iter()
            .filter_map(|entry| {
                let source = match (&entry.locator, entry.derived) {
                    (Some(locator), _) => OutputSource::Component(locator.clone()),
                    (None, Some(quantity)) => {
                        OutputSource::Derived(std::sync::Arc::new(move |model: &TankModel| {
                            quantity.evaluate(model)
                        }))
                    }
                    (None, None) => return None,
                };
                Some((entry.name.clone(), source))
            })
            .collect();
        Some(specs)
    }

    /// Sweep definition over the demo tank model
    pub fn definition(&self) -> SweepDefinition<TankModel> {
        let settings = self.model.clone();
        let params = self.sweep_params();
        let outputs = self.output_specs();

        let mut definition = SweepDefinition::new(
            move || TankModel::new(&settings),
            move |_: &TankModel| params.clone(),
            optimize_fn(),
        )
        .outputs(move |_: &TankModel| outputs.clone())
        .options(self.options.clone());
        definition.probe = probe_fn(&self.model);
        definition
    }
}
