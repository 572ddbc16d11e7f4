use crate::error::Result;
use crate::host::{ConfigStore, CustomField, PLUGIN};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const SECONDS_PER_WEEK: i64 = 604_800;
pub const MAX_WEEKS_DELAY: i64 = 10;

pub const WEEKS_DELAY: &str = "weeks_delay";
pub const CLC_FIELD: &str = "clcfield";
pub const ENABLED_SCHEDULED_TASK: &str = "enabled_scheduled_task";
pub const ACADEMIC_YEAR_START_DATE: &str = "academic_year_start_date";
pub const LSA_END_PREFIX: &str = "late_summer_assessment_end_";

pub const MSG_REQUIRED: &str = "Required";
pub const MSG_DATE_FORMAT: &str = "Date must be in format YYYY-MM-DD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (m, d) = s.trim().split_once('-')?;
        if m.len() != 2 || d.len() != 2 {
            return None;
        }
        let month: u32 = m.parse().ok()?;
        let day: u32 = d.parse().ok()?;
        // 2000 is a leap year, so 02-29 is accepted.
        NaiveDate::from_ymd_opt(2000, month, day)?;
        Some(Self { month, day })
    }

    /// This month/day in `year`, falling back to the last day of the month
    /// (02-29 in a non-leap year).
    pub fn in_year(self, year: i32) -> NaiveDate {
        let mut day = self.day;
        loop {
            if let Some(d) = NaiveDate::from_ymd_opt(year, self.month, day) {
                return d;
            }
            day -= 1;
        }
    }
}

impl std::fmt::Display for MonthDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

pub const DEFAULT_ACADEMIC_YEAR_START: MonthDay = MonthDay::new(8, 1);

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub weeks_delay: i64,
    pub academic_year_start: MonthDay,
    pub clc_field_id: Option<i64>,
    pub scheduled_task_enabled: bool,
    pub deadlines: BTreeMap<String, NaiveDate>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            weeks_delay: 0,
            academic_year_start: DEFAULT_ACADEMIC_YEAR_START,
            clc_field_id: None,
            scheduled_task_enabled: false,
            deadlines: BTreeMap::new(),
        }
    }
}

impl LifecycleConfig {
    pub fn load(store: &impl ConfigStore) -> Result<Self> {
        Ok(Self::from_entries(&store.plugin_config(PLUGIN)?))
    }

    pub fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        let mut config = Self::default();
        for (name, value) in entries {
            let value = value.trim();
            match name.as_str() {
                WEEKS_DELAY => match value.parse::<i64>() {
                    Ok(n) if (0..=MAX_WEEKS_DELAY).contains(&n) => config.weeks_delay = n,
                    _ => warn!(value, "ignoring invalid weeks_delay"),
                },
                CLC_FIELD => config.clc_field_id = value.parse::<i64>().ok().filter(|id| *id > 0),
                ENABLED_SCHEDULED_TASK => config.scheduled_task_enabled = parse_flag(value),
                ACADEMIC_YEAR_START_DATE => match MonthDay::parse(value) {
                    Some(md) => config.academic_year_start = md,
                    None => warn!(value, "ignoring invalid academic_year_start_date"),
                },
                _ => {
                    if let Some(year) = name.strip_prefix(LSA_END_PREFIX) {
                        match parse_config_date(value) {
                            Some(date) => {
                                config.deadlines.insert(year.to_string(), date);
                            }
                            None => warn!(year, value, "ignoring invalid late summer assessment end date"),
                        }
                    }
                }
            }
        }
        config
    }

    pub fn delay_seconds(&self) -> i64 {
        self.weeks_delay * SECONDS_PER_WEEK
    }

    pub fn deadline_for(&self, academic_year: &str) -> Option<NaiveDate> {
        self.deadlines.get(academic_year).copied()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}

pub fn parse_config_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn default_lsa_end(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year + 1, 11, 30).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingDef {
    pub name: String,
    pub kind: &'static str,
    pub value: Value,
    pub default: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

pub fn settings_catalogue(
    stored: &BTreeMap<String, String>,
    clc_fields: &[CustomField],
    potential_years: &[String],
) -> Vec<SettingDef> {
    let current = |name: &str| stored.get(name).map(|v| json!(v)).unwrap_or(Value::Null);

    let mut defs = vec![
        SettingDef {
            name: ENABLED_SCHEDULED_TASK.into(),
            kind: "checkbox",
            value: current(ENABLED_SCHEDULED_TASK),
            default: json!("0"),
            options: vec![],
        },
        SettingDef {
            name: WEEKS_DELAY.into(),
            kind: "select",
            value: current(WEEKS_DELAY),
            default: json!("0"),
            options: (0..=MAX_WEEKS_DELAY).map(|i| json!(i.to_string())).collect(),
        },
        SettingDef {
            name: CLC_FIELD.into(),
            kind: "select",
            value: current(CLC_FIELD),
            default: json!(""),
            options: clc_fields
                .iter()
                .map(|f| json!({ "id": f.id.to_string(), "label": f.shortname }))
                .collect(),
        },
        SettingDef {
            name: ACADEMIC_YEAR_START_DATE.into(),
            kind: "text",
            value: current(ACADEMIC_YEAR_START_DATE),
            default: json!(DEFAULT_ACADEMIC_YEAR_START.to_string()),
            options: vec![],
        },
    ];

    for year in potential_years {
        if !crate::academic::is_academic_year_tag(year) {
            continue;
        }
        let Ok(y) = year.parse::<i32>() else {
            continue;
        };
        let name = format!("{LSA_END_PREFIX}{year}");
        defs.push(SettingDef {
            value: current(&name),
            name,
            kind: "date",
            default: json!(default_lsa_end(y).format("%Y-%m-%d").to_string()),
            options: vec![],
        });
    }
    defs
}

pub fn validate_setting(name: &str, value: &str) -> std::result::Result<String, String> {
    let value = value.trim();
    match name {
        WEEKS_DELAY => match value.parse::<i64>() {
            Ok(n) if (0..=MAX_WEEKS_DELAY).contains(&n) => Ok(n.to_string()),
            _ => Err(format!("weeks_delay must be in 0..={MAX_WEEKS_DELAY}")),
        },
        CLC_FIELD => {
            if value.is_empty() {
                return Ok(String::new());
            }
            match value.parse::<i64>() {
                Ok(id) if id > 0 => Ok(id.to_string()),
                _ => Err("clcfield must be a custom field id".into()),
            }
        }
        ENABLED_SCHEDULED_TASK => Ok(if parse_flag(value) { "1" } else { "0" }.into()),
        ACADEMIC_YEAR_START_DATE => MonthDay::parse(value)
            .map(|md| md.to_string())
            .ok_or_else(|| "Date must be in format MM-DD".to_string()),
        _ => match name.strip_prefix(LSA_END_PREFIX) {
            Some(year) if crate::academic::is_academic_year_tag(year) => {
                if value.is_empty() {
                    return Err(MSG_REQUIRED.into());
                }
                parse_config_date(value)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .ok_or_else(|| MSG_DATE_FORMAT.to_string())
            }
            _ => Err(format!("unknown setting: {name}")),
        },
    }
}

pub fn academic_year_of(date: NaiveDate, start: MonthDay) -> i32 {
    if date < start.in_year(date.year()) {
        date.year() - 1
    } else {
        date.year()
    }
}
