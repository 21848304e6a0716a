//! Analytic mixing-tank model used by the command-line front end.
//!
//! A feed of flow `Q` and concentration `c` passes through a tank of volume
//! `V`. First-order decay gives an outlet concentration of
//! `c / (1 + k * V / Q)`. Solving sizes the tank: with the volume unfixed the
//! smallest volume that meets the outlet target is chosen; with it fixed the
//! target is checked. The solve fails when the volume bounds or the pump
//! capacity cannot be met.

use std::sync::Arc;

use paramsweep_core::{
    Component, ComponentKind, ModelError, OptimizeFn, ProbeFn, SolverOptions, SweepModel,
    TerminationCondition,
};
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

pub const INLET_FLOW: &str = "tank.inlet_flow";
pub const CONCENTRATION: &str = "tank.concentration";
pub const DECAY_RATE: &str = "tank.decay_rate";
pub const VOLUME: &str = "tank.volume";
pub const OUTLET_CONCENTRATION: &str = "tank.outlet_concentration";
pub const RESIDENCE_TIME: &str = "tank.residence_time";
pub const REMOVAL: &str = "tank.removal";
pub const COST: &str = "tank.cost";
/// Indexed parameter holding only a `None` element
pub const PUMP_CAPACITY: &str = "tank.pump_capacity";

/// Knobs of the demo model read from the sweep file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankSettings {
    /// Outlet concentration the solve has to reach
    pub target_outlet: f64,
    /// Maximum feed flow the pump handles
    pub pump_capacity: f64,
    /// Feeds below this flow are rejected before solving
    pub min_probe_flow: Option<f64>,
    /// Cost per unit of volume
    pub volume_cost: f64,
    /// Cost per unit of feed flow
    pub flow_cost: f64,
}

impl Default for TankSettings {
    fn default() -> Self {
        Self {
            target_outlet: 0.1,
            pump_capacity: 5.0,
            min_probe_flow: None,
            volume_cost: 2.0,
            flow_cost: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    component: Component,
    value: f64,
    fixed: bool,
}

#[derive(Debug, Clone)]
pub struct TankModel {
    slots: Vec<Slot>,
    volume_cost: f64,
    flow_cost: f64,
}

impl Default for TankModel {
    fn default() -> Self {
        Self::new(&TankSettings::default())
    }
}

impl TankModel {
    pub fn new(settings: &TankSettings) -> Self {
        let param = |name: &str, units: &str, value: f64| Slot {
            component: Component {
                units: Some(units.to_string()),
                ..Component::new(name, ComponentKind::Parameter)
            },
            value,
            fixed: true,
        };
        let var = |name: &str, units: &str, value: f64, bounds: (f64, f64)| Slot {
            component: Component {
                units: Some(units.to_string()),
                lower_bound: Some(bounds.0),
                upper_bound: Some(bounds.1),
                ..Component::new(name, ComponentKind::Variable)
            },
            value,
            fixed: false,
        };

        Self {
            slots: vec![
                param(INLET_FLOW, "m^3/s", 1.0),
                param(CONCENTRATION, "kg/m^3", 1.0),
                param(DECAY_RATE, "1/s", 0.05),
                param(
                    &format!("{PUMP_CAPACITY}[None]"),
                    "m^3/s",
                    settings.pump_capacity,
                ),
                var(VOLUME, "m^3", 10.0, (0.1, 1000.0)),
                var(
                    OUTLET_CONCENTRATION,
                    "kg/m^3",
                    settings.target_outlet,
                    (0.0, settings.target_outlet),
                ),
            ],
            volume_cost: settings.volume_cost,
            flow_cost: settings.flow_cost,
        }
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.component.name == name)
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut Slot, ModelError> {
        self.slots
            .iter_mut()
            .find(|s| s.component.name == name)
            .ok_or_else(|| ModelError::ComponentNotFound(name.to_string()))
    }

    fn raw(&self, name: &str) -> Result<f64, ModelError> {
        self.slot(name)
            .map(|s| s.value)
            .ok_or_else(|| ModelError::ComponentNotFound(name.to_string()))
    }

    fn bounds(&self, name: &str) -> (f64, f64) {
        self.slot(name).map_or((f64::NEG_INFINITY, f64::INFINITY), |s| {
            (
                s.component.lower_bound.unwrap_or(f64::NEG_INFINITY),
                s.component.upper_bound.unwrap_or(f64::INFINITY),
            )
        })
    }

    fn is_fixed(&self, name: &str) -> bool {
        self.slot(name).is_some_and(|s| s.fixed)
    }

    fn derived() -> [Component; 3] {
        [
            Component {
                units: Some("s".to_string()),
                ..Component::new(RESIDENCE_TIME, ComponentKind::Expression)
            },
            Component::new(REMOVAL, ComponentKind::Expression),
            Component::new(COST, ComponentKind::Objective),
        ]
    }

    /// Size the tank for the current feed.
    pub fn solve(&mut self) -> Result<TerminationCondition, ModelError> {
        let flow = self.raw(INLET_FLOW)?;
        let conc = self.raw(CONCENTRATION)?;
        let k = self.raw(DECAY_RATE)?;
        let capacity = self.raw(&format!("{PUMP_CAPACITY}[None]"))?;
        let (v_lo, v_hi) = self.bounds(VOLUME);
        let (out_lo, out_hi) = self.bounds(OUTLET_CONCENTRATION);

        if flow <= 0.0 || k <= 0.0 {
            return Err(ModelError::Solve(format!(
                "feed flow {flow} and decay rate {k} must be positive"
            )));
        }
        if flow > capacity {
            return Ok(TerminationCondition::Infeasible);
        }

        let volume = if self.is_fixed(VOLUME) {
            self.raw(VOLUME)?
        } else {
            // Smallest volume that reaches the outlet limit
            let required = flow * (conc / out_hi - 1.0) / k;
            required.max(v_lo)
        };
        if volume < v_lo || volume > v_hi {
            trace!(volume, v_lo, v_hi, "Tank volume outside bounds");
            return Ok(TerminationCondition::Infeasible);
        }

        let outlet = conc / (1.0 + k * volume / flow);
        if outlet < out_lo || outlet > out_hi * (1.0 + 1e-9) {
            return Ok(TerminationCondition::Infeasible);
        }

        self.slot_mut(VOLUME)?.value = volume;
        self.slot_mut(OUTLET_CONCENTRATION)?.value = outlet;
        Ok(TerminationCondition::Optimal)
    }
}

impl SweepModel for TankModel {
    fn find_component(&self, name: &str) -> Option<Component> {
        if name.starts_with(PUMP_CAPACITY) {
            return None;
        }
        self.slot(name)
            .map(|s| s.component.clone())
            .or_else(|| Self::derived().into_iter().find(|c| c.name == name))
    }

    fn find_indexed(&self, name: &str, index: Option<&str>) -> Option<Component> {
        let key = format!("{name}[{}]", index.unwrap_or("None"));
        self.slot(&key).map(|s| s.component.clone())
    }

    fn value(&self, name: &str) -> Result<f64, ModelError> {
        if let Some(slot) = self.slot(name) {
            return Ok(slot.value);
        }
        match name {
            RESIDENCE_TIME => Ok(self.raw(VOLUME)? / self.raw(INLET_FLOW)?),
            REMOVAL => {
                let conc = self.raw(CONCENTRATION)?;
                if conc == 0.0 {
                    return Err(ModelError::NotEvaluable(name.to_string()));
                }
                Ok(1.0 - self.raw(OUTLET_CONCENTRATION)? / conc)
            }
            COST => Ok(self.volume_cost * self.raw(VOLUME)? + self.flow_cost * self.raw(INLET_FLOW)?),
            _ => Err(ModelError::ComponentNotFound(name.to_string())),
        }
    }

    fn set_value(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        self.slot_mut(name)?.value = value;
        Ok(())
    }

    fn fix(&mut self, name: &str, value: Option<f64>) -> Result<(), ModelError> {
        let slot = self.slot_mut(name)?;
        if let Some(v) = value {
            slot.value = v;
        }
        slot.fixed = true;
        Ok(())
    }

    fn unfix(&mut self, name: &str) -> Result<(), ModelError> {
        self.slot_mut(name)?.fixed = false;
        Ok(())
    }

    fn set_lower_bound(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        self.slot_mut(name)?.component.lower_bound = Some(value);
        Ok(())
    }

    fn set_upper_bound(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        self.slot_mut(name)?.component.upper_bound = Some(value);
        Ok(())
    }

    fn active_components(&self) -> Vec<Component> {
        self.slots
            .iter()
            .map(|s| s.component.clone())
            .chain(Self::derived())
            .collect()
    }
}

pub fn optimize_fn() -> OptimizeFn<TankModel> {
    Arc::new(
        |model: &mut TankModel,
         _: &SolverOptions,
         tee: bool|
         -> Result<TerminationCondition, ModelError> {
            let outcome = model.solve();
            if tee {
                info!(?outcome, "Tank solve");
            }
            outcome
        },
    )
}

/// Probe rejecting feeds below `settings.min_probe_flow`, if one is set
pub fn probe_fn(settings: &TankSettings) -> Option<ProbeFn<TankModel>> {
    let min_flow = settings.min_probe_flow?;
    Some(Arc::new(move |model: &TankModel| {
        model.value(INLET_FLOW).is_ok_and(|q| q >= min_flow)
    }))
}

/// Quantities the sweep file can request as derived outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedQuantity {
    /// `Q * c`
    MassLoad,
    /// `Q * c_out`
    OutletLoad,
    /// `V / capacity`
    VolumePerCapacity,
}

impl DerivedQuantity {
    pub fn evaluate(self, model: &TankModel) -> Result<f64, ModelError> {
        match self {
            DerivedQuantity::MassLoad => Ok(model.value(INLET_FLOW)? * model.value(CONCENTRATION)?),
            DerivedQuantity::OutletLoad => {
                Ok(model.value(INLET_FLOW)? * model.value(OUTLET_CONCENTRATION)?)
            }
            DerivedQuantity::VolumePerCapacity => {
                let capacity = model.raw(&format!("{PUMP_CAPACITY}[None]"))?;
                if capacity == 0.0 {
                    return Err(ModelError::NotEvaluable(PUMP_CAPACITY.to_string()));
                }
                Ok(model.value(VOLUME)? / capacity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solved(flow: f64, conc: f64) -> (TankModel, TerminationCondition) {
        let mut model = TankModel::default();
        model.set_value(INLET_FLOW, flow).unwrap();
        model.set_value(CONCENTRATION, conc).unwrap();
        let outcome = model.solve().unwrap();
        (model, outcome)
    }

    #[test]
    fn test_sizes_volume_to_hit_target() {
        let (model, outcome) = solved(1.0, 1.0);
        assert!(outcome.is_optimal());
        // (1 / 0.1 - 1) / 0.05
        assert!((model.value(VOLUME).unwrap() - 180.0).abs() < 1e-9);
        assert!((model.value(OUTLET_CONCENTRATION).unwrap() - 0.1).abs() < 1e-9);
        assert!((model.value(REMOVAL).unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_pump_capacity_limits_flow() {
        let (_, outcome) = solved(6.0, 1.0);
        assert_eq!(outcome, TerminationCondition::Infeasible);
    }

    #[test]
    fn test_oversized_tank_is_infeasible() {
        // Requires 5 * (10 - 1) / 0.05 = 900 m^3, then 1100 with c = 1.2
        let (_, ok) = solved(5.0, 1.0);
        assert!(ok.is_optimal());
        let (_, too_big) = solved(5.0, 1.2);
        assert_eq!(too_big, TerminationCondition::Infeasible);
    }

    #[test]
    fn test_fixed_volume_is_checked_not_sized() {
        let mut model = TankModel::default();
        model.fix(VOLUME, Some(50.0)).unwrap();
        assert_eq!(model.solve().unwrap(), TerminationCondition::Infeasible);
        model.fix(VOLUME, Some(500.0)).unwrap();
        assert!(model.solve().unwrap().is_optimal());
        assert_eq!(model.value(VOLUME).unwrap(), 500.0);
    }

    #[test]
    fn test_non_positive_flow_raises() {
        let mut model = TankModel::default();
        model.set_value(INLET_FLOW, 0.0).unwrap();
        assert!(model.solve().is_err());
    }

    #[test]
    fn test_pump_capacity_only_via_none_index() {
        let model = TankModel::default();
        assert!(model.find_component(PUMP_CAPACITY).is_none());
        assert!(model.find_indexed(PUMP_CAPACITY, None).is_some());
    }

    #[test]
    fn test_probe_rejects_low_flow() {
        let settings = TankSettings {
            min_probe_flow: Some(0.5),
            ..Default::default()
        };
        let probe = probe_fn(&settings).unwrap();
        let mut model = TankModel::new(&settings);
        assert!(probe(&model));
        model.set_value(INLET_FLOW, 0.2).unwrap();
        assert!(!probe(&model));
        assert!(probe_fn(&TankSettings::default()).is_none());
    }
}
