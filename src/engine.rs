use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::host::{Course, CourseCatalog, FreezePreference, PreferenceStore};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undeterminable {
    NoEndDate,
    NoAcademicYear,
    NoDeadline { academic_year: String },
    InvalidEndDate,
    InvalidFreezeDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FurthestDefaultDate {
    Known(DateTime<Utc>),
    Undeterminable(Undeterminable),
}

impl FurthestDefaultDate {
    pub fn known(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known(d) => Some(*d),
            Self::Undeterminable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    DefaultDateInFuture(DateTime<Utc>),
    Excluded,
    OverrideInFuture(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotEligible(Ineligible),
    Undeterminable(Undeterminable),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    Default,
    /// The default already passed; tomorrow is shown instead.
    ClampedDefault,
    Override,
}

impl ScheduleSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::ClampedDefault => "clamped",
            Self::Override => "override",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFreezeDate {
    pub default_freeze_date: DateTime<Utc>,
    pub scheduled_freeze_date: DateTime<Utc>,
    pub source: ScheduleSource,
}

impl ScheduledFreezeDate {
    pub fn default_date_string(&self) -> String {
        self.default_freeze_date.format("%Y-%m-%d").to_string()
    }

    pub fn scheduled_date_string(&self) -> String {
        self.scheduled_freeze_date.format("%d/%m/%Y").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Scheduled(ScheduledFreezeDate),
    Undeterminable(Undeterminable),
}

pub fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

pub fn date_to_datetime(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn tomorrow(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    date_to_datetime(today.checked_add_days(Days::new(1)).unwrap_or(today))
}

pub struct EligibilityEngine<'a> {
    config: &'a LifecycleConfig,
    now: DateTime<Utc>,
}

impl<'a> EligibilityEngine<'a> {
    pub fn new(config: &'a LifecycleConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn compute_furthest_default_date(&self, course: &Course) -> FurthestDefaultDate {
        let Some(academic_year) = course.academic_year() else {
            return FurthestDefaultDate::Undeterminable(Undeterminable::NoAcademicYear);
        };
        let Some(enddate) = course.end_date() else {
            return FurthestDefaultDate::Undeterminable(Undeterminable::NoEndDate);
        };
        let Some(deadline) = self.config.deadline_for(academic_year) else {
            return FurthestDefaultDate::Undeterminable(Undeterminable::NoDeadline {
                academic_year: academic_year.to_string(),
            });
        };

        let deadline = date_to_datetime(deadline).timestamp();
        match deadline
            .max(enddate)
            .checked_add(self.config.delay_seconds())
            .and_then(timestamp_to_datetime)
        {
            Some(furthest) => FurthestDefaultDate::Known(furthest),
            None => FurthestDefaultDate::Undeterminable(Undeterminable::InvalidEndDate),
        }
    }

    fn stored_override(
        preference: Option<&FreezePreference>,
    ) -> std::result::Result<Option<DateTime<Utc>>, Undeterminable> {
        match preference.and_then(|p| p.freezedate) {
            Some(ts) => timestamp_to_datetime(ts)
                .map(Some)
                .ok_or(Undeterminable::InvalidFreezeDate),
            None => Ok(None),
        }
    }

    pub fn is_eligible_for_auto_freeze(
        &self,
        course: &Course,
        preference: Option<&FreezePreference>,
    ) -> Eligibility {
        let default_date = match self.compute_furthest_default_date(course) {
            FurthestDefaultDate::Known(d) => d,
            FurthestDefaultDate::Undeterminable(reason) => {
                return Eligibility::Undeterminable(reason)
            }
        };
        if default_date > self.now {
            return Eligibility::NotEligible(Ineligible::DefaultDateInFuture(default_date));
        }

        if preference.is_some_and(|p| p.freezeexcluded) {
            return Eligibility::NotEligible(Ineligible::Excluded);
        }
        match Self::stored_override(preference) {
            Ok(Some(freezedate)) if freezedate > self.now => {
                return Eligibility::NotEligible(Ineligible::OverrideInFuture(freezedate));
            }
            Ok(_) => {}
            Err(reason) => return Eligibility::Undeterminable(reason),
        }

        Eligibility::Eligible
    }

    /// A past default is displayed as tomorrow. A stored override later than
    /// the unclamped default wins.
    pub fn scheduled_freeze_date(
        &self,
        course: &Course,
        preference: Option<&FreezePreference>,
    ) -> Schedule {
        let default_date = match self.compute_furthest_default_date(course) {
            FurthestDefaultDate::Known(d) => d,
            FurthestDefaultDate::Undeterminable(reason) => return Schedule::Undeterminable(reason),
        };

        let override_date = match Self::stored_override(preference) {
            Ok(d) => d.filter(|d| *d > default_date),
            Err(reason) => return Schedule::Undeterminable(reason),
        };

        let (scheduled, source) = match override_date {
            Some(d) => (d, ScheduleSource::Override),
            None if default_date <= self.now => (tomorrow(self.now), ScheduleSource::ClampedDefault),
            None => (default_date, ScheduleSource::Default),
        };

        Schedule::Scheduled(ScheduledFreezeDate {
            default_freeze_date: default_date,
            scheduled_freeze_date: scheduled,
            source,
        })
    }

    pub fn list_courses_eligible_now<H>(&self, host: &H, year_field: Option<i64>) -> Result<Vec<Course>>
    where
        H: CourseCatalog + PreferenceStore,
    {
        let cutoff = self.now.timestamp() - self.config.delay_seconds();
        let mut eligible = Vec::new();
        for course in host.freeze_candidates(cutoff, year_field)? {
            let preference = host.get_preference(course.id)?;
            if self
                .is_eligible_for_auto_freeze(&course, preference.as_ref())
                .is_eligible()
            {
                eligible.push(course);
            }
        }
        Ok(eligible)
    }
}
