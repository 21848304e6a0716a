//! Per-sample output records.
//!
//! A [`ResultSet`] holds one record per swept input and one per requested
//! output, each with a value per row, plus the success flag of every row.
//! Record order is fixed when the skeleton is created and is the column order
//! of every aggregated array.

use rustc_hash::FxHashMap;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::model::{Component, DerivedFn, OutputSource, OutputSpecs, SweepModel};
use crate::sampling::SweepParams;

/// Namespace that derived outputs are registered under
pub const DERIVED_OUTPUT_PREFIX: &str = "_parameter_sweep_expressions";

/// Values and metadata of one input or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub value: Vec<f64>,
    #[serde(rename = "lower bound", default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
    #[serde(rename = "upper bound", default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
    /// `"None"` when the component carries no units
    pub units: String,
    /// Resolution key on the model; never persisted
    #[serde(skip_serializing, default)]
    pub full_name: String,
}

impl OutputRecord {
    fn from_component(component: &Component, rows: usize) -> Self {
        Self {
            value: vec![0.0; rows],
            lower_bound: component.lower_bound,
            upper_bound: component.upper_bound,
            units: component.units.clone().unwrap_or_else(|| "None".to_string()),
            full_name: component.name.clone(),
        }
    }

    fn derived(label: &str, rows: usize) -> Self {
        Self {
            value: vec![0.0; rows],
            lower_bound: None,
            upper_bound: None,
            units: "None".to_string(),
            full_name: format!("{DERIVED_OUTPUT_PREFIX}[{label}]"),
        }
    }

    /// Copy of this record with `rows` zeroed values
    #[must_use]
    pub fn resized(&self, rows: usize) -> Self {
        Self {
            value: vec![0.0; rows],
            ..self.clone()
        }
    }
}

/// Ordered name to record map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    entries: Vec<(String, OutputRecord)>,
    index: FxHashMap<String, usize>,
}

impl RecordTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, record: OutputRecord) {
        let name = name.into();
        if let Some(&i) = self.index.get(&name) {
            self.entries[i].1 = record;
        } else {
            self.index.insert(name.clone(), self.entries.len());
            self.entries.push((name, record));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OutputRecord> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut OutputRecord> {
        self.index.get(name).map(|&i| &mut self.entries[i].1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputRecord)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn records(&self) -> impl Iterator<Item = &OutputRecord> {
        self.entries.iter().map(|(_, r)| r)
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut OutputRecord> {
        self.entries.iter_mut().map(|(_, r)| r)
    }

    /// Same names and metadata, with `rows` zeroed values per record
    #[must_use]
    pub fn resized(&self, rows: usize) -> Self {
        let mut table = RecordTable::new();
        for (name, record) in self.iter() {
            table.insert(name, record.resized(rows));
        }
        table
    }
}

impl Serialize for RecordTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, record) in &self.entries {
            map.serialize_entry(name, record)?;
        }
        map.end()
    }
}

/// Success flags plus input and output records for a block of rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub sweep_params: RecordTable,
    pub outputs: RecordTable,
    pub solve_successful: Vec<bool>,
}

/// Rows run by one worker
pub type WorkerResultSet = ResultSet;

/// Rows of every worker concatenated in rank order (authoritative on root)
pub type GlobalResultSet = ResultSet;

impl ResultSet {
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.solve_successful.len()
    }

    #[must_use]
    pub fn num_successful(&self) -> usize {
        self.solve_successful.iter().filter(|s| **s).count()
    }

    /// Same structure with `rows` zeroed values and no success flags
    #[must_use]
    pub fn resized(&self, rows: usize) -> Self {
        Self {
            sweep_params: self.sweep_params.resized(rows),
            outputs: self.outputs.resized(rows),
            solve_successful: Vec::new(),
        }
    }

    /// Keep only rows whose solve succeeded, in order.
    #[must_use]
    pub fn successful_rows(&self) -> Self {
        let keep: Vec<usize> = self
            .solve_successful
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.then_some(i))
            .collect();
        let mut filtered = self.resized(0);
        for (dst, src) in filtered
            .sweep_params
            .records_mut()
            .chain(filtered.outputs.records_mut())
            .zip(self.sweep_params.records().chain(self.outputs.records()))
        {
            dst.value = keep.iter().map(|&i| src.value[i]).collect();
        }
        filtered.solve_successful = vec![true; keep.len()];
        filtered
    }

    /// Append `other`'s rows. Both sets must share one structure.
    pub fn append(&mut self, other: &ResultSet) {
        for (dst, src) in self
            .sweep_params
            .records_mut()
            .chain(self.outputs.records_mut())
            .zip(other.sweep_params.records().chain(other.outputs.records()))
        {
            dst.value.extend_from_slice(&src.value);
        }
        self.solve_successful
            .extend_from_slice(&other.solve_successful);
    }

    /// Keep the first `rows` rows.
    pub fn truncate(&mut self, rows: usize) {
        for record in self
            .sweep_params
            .records_mut()
            .chain(self.outputs.records_mut())
        {
            record.value.truncate(rows);
        }
        self.solve_successful.truncate(rows);
    }

    /// Sweep-input values as row-major `[rows x params]`
    #[must_use]
    pub fn input_rows(&self) -> Vec<Vec<f64>> {
        let rows = self
            .sweep_params
            .records()
            .next()
            .map_or(0, |r| r.value.len());
        (0..rows)
            .map(|i| self.sweep_params.records().map(|r| r.value[i]).collect())
            .collect()
    }
}

enum Harvest<M> {
    Component(String),
    Derived(DerivedFn<M>),
}

/// How to read each output back from the model, aligned with the output
/// records of the skeleton it was created with
pub struct OutputPlan<M> {
    inputs: Vec<String>,
    outputs: Vec<(Harvest<M>, bool)>,
}

impl<M: SweepModel> OutputPlan<M> {
    /// Fill row `k` of `set` from the model.
    ///
    /// After a successful solve every output is evaluated; an output that
    /// cannot be evaluated keeps its previous value. After a failure only
    /// outputs that are themselves sweep parameters are read, all others
    /// become NaN.
    pub fn record_sample(&self, model: &M, set: &mut ResultSet, k: usize, success: bool) {
        for (record, name) in set.sweep_params.records_mut().zip(&self.inputs) {
            record.value[k] = model.value(name).unwrap_or(f64::NAN);
        }

        for (record, (harvest, is_input)) in set.outputs.records_mut().zip(&self.outputs) {
            if success {
                if let Ok(v) = harvest.evaluate(model) {
                    record.value[k] = v;
                }
            } else if *is_input {
                record.value[k] = harvest.evaluate(model).unwrap_or(f64::NAN);
            } else {
                record.value[k] = f64::NAN;
            }
        }
    }
}

impl<M: SweepModel> Harvest<M> {
    fn evaluate(&self, model: &M) -> std::result::Result<f64, ModelError> {
        match self {
            Harvest::Component(name) => model.value(name),
            Harvest::Derived(f) => f(model),
        }
    }
}

/// Create the zeroed skeleton for `rows` rows and the plan that fills it.
///
/// Without output specs every active component is captured, keyed by its
/// full name, or by the short name when it is also a sweep parameter.
pub fn create_local_skeleton<M: SweepModel>(
    model: &M,
    params: &SweepParams,
    outputs: Option<&OutputSpecs<M>>,
    rows: usize,
) -> Result<(WorkerResultSet, OutputPlan<M>)> {
    let mut set = ResultSet::default();
    let mut inputs = Vec::with_capacity(params.len());
    for (name, spec) in params.iter() {
        let component = spec.locator.resolve(model)?;
        inputs.push(component.name.clone());
        set.sweep_params
            .insert(name, OutputRecord::from_component(&component, rows));
    }

    let mut harvest = Vec::new();
    match outputs {
        None => {
            for component in model.active_components() {
                let label = params
                    .names()
                    .zip(&inputs)
                    .find(|(_, full)| **full == component.name)
                    .map_or_else(|| component.name.clone(), |(short, _)| short.to_string());
                let is_input = inputs.contains(&component.name);
                set.outputs
                    .insert(label, OutputRecord::from_component(&component, rows));
                harvest.push((Harvest::Component(component.name), is_input));
            }
        }
        Some(specs) => {
            for (label, source) in specs {
                match source {
                    OutputSource::Component(locator) => {
                        let component = locator.resolve(model)?;
                        let is_input = inputs.contains(&component.name);
                        set.outputs
                            .insert(label.clone(), OutputRecord::from_component(&component, rows));
                        harvest.push((Harvest::Component(component.name), is_input));
                    }
                    OutputSource::Derived(f) => {
                        set.outputs
                            .insert(label.clone(), OutputRecord::derived(label, rows));
                        harvest.push((Harvest::Derived(f.clone()), false));
                    }
                }
            }
        }
    }

    Ok((
        set,
        OutputPlan {
            inputs,
            outputs: harvest,
        },
    ))
}
