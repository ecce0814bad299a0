use crate::error::{StateError, StateResult};
use crate::schedule::ScheduleState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a sub-application. The set is closed: unknown keys are
/// rejected when a document is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubApp {
    Schedule,
    Taxes,
    Trading,
    YieldFarming,
    Budgeting,
}

impl SubApp {
    pub const ALL: [SubApp; 5] = [
        SubApp::Schedule,
        SubApp::Taxes,
        SubApp::Trading,
        SubApp::YieldFarming,
        SubApp::Budgeting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubApp::Schedule => "Schedule",
            SubApp::Taxes => "Taxes",
            SubApp::Trading => "Trading",
            SubApp::YieldFarming => "YieldFarming",
            SubApp::Budgeting => "Budgeting",
        }
    }
}

impl fmt::Display for SubApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque state of one sub-application.
///
/// Only `version` is interpreted here; everything else is kept verbatim so
/// that a client built against an older payload schema never drops fields it
/// does not understand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: u32,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl VersionedState {
    /// A state with a version and no payload, e.g. `{"version": 1}`.
    pub fn empty(version: u32) -> Self {
        Self {
            version,
            payload: Map::new(),
        }
    }

    /// Converts a typed sub-application state into its opaque form.
    pub fn encode<T: Serialize>(app: SubApp, value: &T) -> StateResult<Self> {
        match serde_json::to_value(value)? {
            obj @ Value::Object(_) => {
                serde_json::from_value(obj).map_err(|_| StateError::NotVersioned {
                    app: app.to_string(),
                })
            }
            _ => Err(StateError::NotVersioned {
                app: app.to_string(),
            }),
        }
    }

    /// Converts back into a typed state, checking the version first.
    pub fn decode<T: DeserializeOwned>(&self, app: SubApp, expected_version: u32) -> StateResult<T> {
        if self.version != expected_version {
            return Err(StateError::VersionMismatch {
                app: app.to_string(),
                expected: expected_version,
                found: self.version,
            });
        }
        let mut obj = self.payload.clone();
        obj.insert("version".to_string(), Value::from(self.version));
        Ok(serde_json::from_value(Value::Object(obj))?)
    }
}

/// The full application state stored inside an encrypted document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubAppsState(BTreeMap<SubApp, VersionedState>);

impl SubAppsState {
    /// The state written into a freshly created document.
    pub fn blank() -> Self {
        let mut apps = BTreeMap::new();
        for app in SubApp::ALL {
            let state = match app {
                SubApp::Schedule => ScheduleState::blank().to_versioned(),
                _ => VersionedState::empty(1),
            };
            apps.insert(app, state);
        }
        Self(apps)
    }

    pub fn get(&self, app: SubApp) -> Option<&VersionedState> {
        self.0.get(&app)
    }

    pub fn get_mut(&mut self, app: SubApp) -> Option<&mut VersionedState> {
        self.0.get_mut(&app)
    }

    pub fn insert(&mut self, app: SubApp, state: VersionedState) -> Option<VersionedState> {
        self.0.insert(app, state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubApp, &VersionedState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed view of the schedule, if present.
    pub fn schedule(&self) -> StateResult<Option<ScheduleState>> {
        self.get(SubApp::Schedule)
            .map(ScheduleState::from_versioned)
            .transpose()
    }

    pub fn set_schedule(&mut self, schedule: &ScheduleState) -> StateResult<()> {
        let state = VersionedState::encode(SubApp::Schedule, schedule)?;
        self.insert(SubApp::Schedule, state);
        Ok(())
    }
}
