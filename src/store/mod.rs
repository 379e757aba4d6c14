use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::{Account, Profile};

const DEFAULT_SCENARIO_NAME: &str = "Default";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scenario `{0}` not found")]
    NotFound(String),
    #[error("cannot delete the last remaining scenario")]
    LastScenario,
    #[error("scenario name cannot be empty")]
    EmptyName,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupt scenario store: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One saved (profile, accounts) pair. Serialized with the profile fields at
/// the top level, matching the engine's input wire shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub data: Snapshot,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    active: String,
    scenarios: Vec<Scenario>,
}

/// JSON-file-backed collection of named scenarios with one active at a time.
/// Every mutating operation persists immediately. The projection engine never
/// touches this; the HTTP layer owns it.
pub struct ScenarioStore {
    path: PathBuf,
    active: String,
    scenarios: Vec<Scenario>,
}

impl ScenarioStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if !path.exists() {
            let scenario = Scenario {
                id: Uuid::new_v4().to_string(),
                name: DEFAULT_SCENARIO_NAME.to_string(),
                data: Snapshot::default(),
            };
            let store = Self {
                path,
                active: scenario.id.clone(),
                scenarios: vec![scenario],
            };
            store.save()?;
            info!(path = %store.path.display(), "created scenario store");
            return Ok(store);
        }

        let raw = fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&raw)?;

        let (active, scenarios) = if value.get("scenarios").is_some() {
            let file: StoreFile = serde_json::from_value(value)?;
            (file.active, file.scenarios)
        } else {
            // Legacy format: the file is a single bare snapshot.
            warn!(path = %path.display(), "migrating legacy single-snapshot store");
            let snapshot = snapshot_from_legacy(value)?;
            let scenario = Scenario {
                id: Uuid::new_v4().to_string(),
                name: DEFAULT_SCENARIO_NAME.to_string(),
                data: snapshot,
            };
            (scenario.id.clone(), vec![scenario])
        };

        let mut store = Self {
            path,
            active,
            scenarios,
        };
        if store.scenarios.is_empty() {
            let scenario = Scenario {
                id: Uuid::new_v4().to_string(),
                name: DEFAULT_SCENARIO_NAME.to_string(),
                data: Snapshot::default(),
            };
            store.active = scenario.id.clone();
            store.scenarios.push(scenario);
        }
        if !store.scenarios.iter().any(|s| s.id == store.active) {
            store.active = store.scenarios[0].id.clone();
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn active_snapshot(&self) -> &Snapshot {
        &self.active_scenario().data
    }

    pub fn snapshot(&self, id: &str) -> Result<&Snapshot, StoreError> {
        self.scenarios
            .iter()
            .find(|s| s.id == id)
            .map(|s| &s.data)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Replace the active scenario's snapshot and persist.
    pub fn update_active(&mut self, snapshot: Snapshot) -> Result<(), StoreError> {
        let active = self.active.clone();
        let scenario = self
            .scenarios
            .iter_mut()
            .find(|s| s.id == active)
            .ok_or(StoreError::NotFound(active))?;
        scenario.data = snapshot;
        self.save()
    }

    /// Create a copy of the active snapshot under a new name and switch to it.
    pub fn create(&mut self, name: &str) -> Result<String, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let scenario = Scenario {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            data: self.active_snapshot().clone(),
        };
        let id = scenario.id.clone();
        self.scenarios.push(scenario);
        self.active = id.clone();
        self.save()?;
        Ok(id)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let scenario = self
            .scenarios
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        scenario.name = name.to_string();
        self.save()
    }

    /// Deleting the active scenario switches to the first remaining one.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if self.scenarios.len() == 1 {
            return Err(StoreError::LastScenario);
        }

        let index = self
            .scenarios
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.scenarios.remove(index);
        if self.active == id {
            self.active = self.scenarios[0].id.clone();
        }
        self.save()
    }

    pub fn set_active(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.scenarios.iter().any(|s| s.id == id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.active = id.to_string();
        self.save()
    }

    fn active_scenario(&self) -> &Scenario {
        self.scenarios
            .iter()
            .find(|s| s.id == self.active)
            .unwrap_or_else(|| {
                self.scenarios
                    .first()
                    .expect("store always holds at least one scenario")
            })
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = StoreFile {
            active: self.active.clone(),
            scenarios: self.scenarios.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

/// Parse a legacy bare snapshot, converting accounts that still carry the
/// flat `yearlyContribution` field into a single contribution plan spanning
/// the working years.
fn snapshot_from_legacy(mut value: Value) -> Result<Snapshot, StoreError> {
    let current_age = value
        .get("currentAge")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(Profile::default().current_age)) as u32;
    let retirement_age = value
        .get("retirementAge")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(Profile::default().retirement_age)) as u32;

    if let Some(accounts) = value.get_mut("accounts").and_then(Value::as_array_mut) {
        for account in accounts {
            let Some(object) = account.as_object_mut() else {
                continue;
            };
            if object.contains_key("contributionPlans") {
                continue;
            }
            let Some(yearly) = object.get("yearlyContribution").and_then(Value::as_f64) else {
                continue;
            };
            let plans = if yearly > 0.0 {
                serde_json::json!([{
                    "yearlyAmount": yearly,
                    "startAge": current_age,
                    "endAge": retirement_age,
                }])
            } else {
                serde_json::json!([])
            };
            object.insert("contributionPlans".to_string(), plans);
            object.remove("yearlyContribution");
        }
    }

    Ok(serde_json::from_value(value)?)
}
