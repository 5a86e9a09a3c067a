//! On-disk shape of the grid configuration.
//!
//! Every section is optional and falls back to the built-in default. Fuel
//! types are keyed by name and resolved against the closed [`FuelType`]
//! set, so a typo fails loudly instead of silently using a default.

use eitrgrid_core::config::{ConduitConfig, FuelTable, FuelType, GridConfig, ReplicationConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::loader::DataLoadError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfigData {
    pub fuel_types: BTreeMap<String, f64>,
    pub conduit: ConduitConfig,
    pub replication: ReplicationConfig,
    pub fuel_request_timeout_seconds: f64,
}

impl Default for GridConfigData {
    fn default() -> Self {
        let defaults = GridConfig::default();
        Self {
            fuel_types: BTreeMap::new(),
            conduit: defaults.conduit,
            replication: defaults.replication,
            fuel_request_timeout_seconds: defaults.fuel_request_timeout_seconds,
        }
    }
}

impl GridConfigData {
    /// Resolve names and check ranges.
    pub fn resolve(self, file: &Path) -> Result<GridConfig, DataLoadError> {
        let fuel_types = resolve_fuels(&self.fuel_types, file)?;
        let GridConfigData {
            conduit,
            replication,
            fuel_request_timeout_seconds,
            ..
        } = self;

        let invalid = |field: &'static str, detail: String| DataLoadError::Invalid {
            file: file.to_path_buf(),
            field,
            detail,
        };
        let positive = |field: &'static str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(invalid(field, format!("{v} must be greater than zero")))
            }
        };
        positive("conduit.energy_per_interval", conduit.energy_per_interval)?;
        positive("conduit.regen_cost", conduit.regen_cost)?;
        positive("conduit.interval_seconds", conduit.interval_seconds)?;
        positive("replication.interval_seconds", replication.interval_seconds)?;
        positive("fuel_request_timeout_seconds", fuel_request_timeout_seconds)?;
        if conduit.noise_floor.is_nan() || conduit.noise_floor < 0.0 {
            return Err(invalid(
                "conduit.noise_floor",
                format!("{} must not be negative", conduit.noise_floor),
            ));
        }
        if conduit.max_fill_ratio.is_nan()
            || conduit.max_fill_ratio <= 0.0
            || conduit.max_fill_ratio > 1.0
        {
            return Err(invalid(
                "conduit.max_fill_ratio",
                format!("{} must be in (0, 1]", conduit.max_fill_ratio),
            ));
        }
        if replication.radius.is_nan() || replication.radius < 0.0 {
            return Err(invalid(
                "replication.radius",
                format!("{} must not be negative", replication.radius),
            ));
        }

        Ok(GridConfig {
            fuel_types,
            conduit,
            replication,
            fuel_request_timeout_seconds,
        })
    }
}

fn resolve_fuels(raw: &BTreeMap<String, f64>, file: &Path) -> Result<FuelTable, DataLoadError> {
    let mut table = FuelTable::default();
    let mut seen: BTreeMap<FuelType, &str> = BTreeMap::new();
    for (name, &efficiency) in raw {
        let fuel: FuelType = name.parse().map_err(|_| DataLoadError::UnresolvedRef {
            file: file.to_path_buf(),
            name: name.clone(),
            expected_kind: "fuel type",
        })?;
        if seen.insert(fuel, name).is_some() {
            return Err(DataLoadError::DuplicateName {
                file: file.to_path_buf(),
                name: name.clone(),
            });
        }
        if !efficiency.is_finite() || efficiency <= 0.0 {
            return Err(DataLoadError::Invalid {
                file: file.to_path_buf(),
                field: "fuel_types",
                detail: format!("efficiency of {name} is {efficiency}"),
            });
        }
        match fuel {
            FuelType::Coal => table.coal = efficiency,
            FuelType::SurtlingCore => table.surtling_core = efficiency,
            FuelType::Eitr => table.eitr = efficiency,
        }
    }
    Ok(table)
}
