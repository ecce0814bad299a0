use crate::error::StateResult;
use crate::sub_app::{SubApp, VersionedState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Length of one schedule block in minutes.
pub const TIME_BLOCK_LENGTH_MINUTES: u32 = 15;

/// Current payload version of the schedule sub-application.
pub const SCHEDULE_VERSION: u32 = 2;

const DEFAULT_CATEGORIES: [(&str, &str); 7] = [
    ("Deep Work", "rgb(0, 255, 255)"),
    ("Exercise", "rgb(191, 144, 0)"),
    ("Education", "rgb(204, 204, 204)"),
    ("Contemplation", "rgb(100, 126, 107)"),
    ("Maintenance", "rgb(255, 242, 204)"),
    ("Social", "rgb(180, 167, 214)"),
    ("Trading", "rgb(0, 255, 0)"),
];

/// Typed view of the schedule sub-application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    pub version: u32,
    /// Template name -> day -> block -> option name (`None` for an empty block).
    pub templates: BTreeMap<String, Vec<Vec<Option<String>>>>,
    /// Repeating order in which templates are applied.
    pub template_repetition: Vec<String>,
    /// Option name -> category.
    pub options_by_name: BTreeMap<String, String>,
    /// First block of the day, counted in `TIME_BLOCK_LENGTH_MINUTES` units.
    pub wake_up_at: u32,
    /// Category -> CSS color.
    pub categories: BTreeMap<String, String>,
    pub default_category: String,
}

impl ScheduleState {
    pub fn blank() -> Self {
        Self {
            version: SCHEDULE_VERSION,
            templates: BTreeMap::new(),
            template_repetition: Vec::new(),
            options_by_name: BTreeMap::new(),
            // 5AM
            wake_up_at: (60 / TIME_BLOCK_LENGTH_MINUTES) * 5,
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|(name, color)| (name.to_string(), color.to_string()))
                .collect(),
            default_category: "Deep Work".to_string(),
        }
    }

    pub fn from_versioned(state: &VersionedState) -> StateResult<Self> {
        state.decode(SubApp::Schedule, SCHEDULE_VERSION)
    }

    pub fn to_versioned(&self) -> VersionedState {
        let templates = self
            .templates
            .iter()
            .map(|(name, days)| {
                let days = days
                    .iter()
                    .map(|blocks| {
                        Value::Array(
                            blocks
                                .iter()
                                .map(|b| b.clone().map_or(Value::Null, Value::String))
                                .collect(),
                        )
                    })
                    .collect();
                (name.clone(), Value::Array(days))
            })
            .collect();

        let mut payload = Map::new();
        payload.insert("templates".into(), Value::Object(templates));
        payload.insert(
            "templateRepetition".into(),
            Value::Array(
                self.template_repetition
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        payload.insert("optionsByName".into(), string_map(&self.options_by_name));
        payload.insert("wakeUpAt".into(), Value::from(self.wake_up_at));
        payload.insert("categories".into(), string_map(&self.categories));
        payload.insert(
            "defaultCategory".into(),
            Value::String(self.default_category.clone()),
        );

        VersionedState {
            version: self.version,
            payload,
        }
    }
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self::blank()
    }
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
