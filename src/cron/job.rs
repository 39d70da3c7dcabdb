use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Jid, MessageSnapshot};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CronError {
    #[error("Invalid {field} value {value} (allowed {min}-{max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Empty {0} field")]
    EmptyField(&'static str),

    #[error("Cron job \"{0}\" overlaps with existing cron job")]
    Duplicate(JobId),
}

/// One date/time field of a recurring schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronField {
    Any,
    Values(BTreeSet<u32>),
}

impl CronField {
    pub fn new(
        field: &'static str,
        values: Option<&[u32]>,
        min: u32,
        max: u32,
    ) -> Result<Self, CronError> {
        let values = match values {
            None => return Ok(CronField::Any),
            Some([]) => return Err(CronError::EmptyField(field)),
            Some(v) => v,
        };

        let mut set = BTreeSet::new();
        for &value in values {
            if value < min || value > max {
                return Err(CronError::OutOfRange { field, value, min, max });
            }
            set.insert(value);
        }
        Ok(CronField::Values(set))
    }

    pub fn contains(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Values(set) => set.contains(&value),
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => write!(f, "*"),
            CronField::Values(set) => {
                let joined = set.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
                write!(f, "{}", joined)
            }
        }
    }
}

/// Field lists for a recurring job as plugins and the config file declare
/// them. A missing field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CronSpec {
    #[serde(default)]
    pub minute: Option<Vec<u32>>,
    #[serde(default)]
    pub hour: Option<Vec<u32>>,
    #[serde(default)]
    pub day: Option<Vec<u32>>,
    #[serde(default)]
    pub month: Option<Vec<u32>>,
    #[serde(default)]
    pub dow: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Recurring {
        minutes: CronField,
        hours: CronField,
        days: CronField,
        months: CronField,
        /// 0 = Monday.
        dow: CronField,
    },
    OneTime {
        at: NaiveDateTime,
    },
}

impl Schedule {
    pub fn recurring(spec: &CronSpec) -> Result<Self, CronError> {
        Ok(Schedule::Recurring {
            minutes: CronField::new("minute", spec.minute.as_deref(), 0, 59)?,
            hours: CronField::new("hour", spec.hour.as_deref(), 0, 23)?,
            days: CronField::new("day", spec.day.as_deref(), 1, 31)?,
            months: CronField::new("month", spec.month.as_deref(), 1, 12)?,
            dow: CronField::new("dow", spec.dow.as_deref(), 0, 6)?,
        })
    }

    pub fn matches(&self, dt: NaiveDateTime) -> bool {
        match self {
            Schedule::OneTime { at } => dt >= *at,
            Schedule::Recurring {
                minutes,
                hours,
                days,
                months,
                dow,
            } => {
                minutes.contains(dt.minute())
                    && hours.contains(dt.hour())
                    && days.contains(dt.day())
                    && months.contains(dt.month())
                    && dow.contains(dt.weekday().num_days_from_monday())
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::OneTime { at } => write!(f, "{}", at.format(TIME_FORMAT)),
            Schedule::Recurring {
                minutes,
                hours,
                days,
                months,
                dow,
            } => write!(f, "{} {} {} {} {}", minutes, hours, days, months, dow),
        }
    }
}

/// Key in the cron table: declared names for recurring jobs, sequence
/// numbers for one-time jobs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Seq(u64),
    Named(String),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Seq(n) => write!(f, "{}", n),
            JobId::Named(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<u64>() {
            Ok(n) => JobId::Seq(n),
            Err(_) => JobId::Named(s.to_string()),
        })
    }
}

/// A command invocation captured at schedule time and replayed later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredCommand {
    pub command: String,
    pub args: Vec<String>,
    pub snapshot: MessageSnapshot,
    pub notify_owner: bool,
}

impl DeferredCommand {
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.command.as_str());
        words.extend(self.args.iter().map(|s| s.as_str()));
        shell_words::join(words)
    }
}

/// What runs when a job fires. Plugin jobs are looked up by name at fire
/// time, never held as a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobAction {
    Plugin {
        plugin: String,
        function: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Command(DeferredCommand),
    Reminder {
        text: String,
    },
}

impl JobAction {
    /// Plugin that owns the job; deferred commands and reminders belong to
    /// the bot itself.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            JobAction::Plugin { plugin, .. } => Some(plugin),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            JobAction::Plugin { plugin, function, .. } => format!("{}.{}", plugin, function),
            JobAction::Command(cmd) => cmd.command_line(),
            JobAction::Reminder { text } => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronJob {
    pub name: JobId,
    pub action: JobAction,
    pub schedule: Schedule,
    #[serde(default)]
    pub owner: Option<Jid>,
}

impl CronJob {
    pub fn is_onetime(&self) -> bool {
        matches!(self.schedule, Schedule::OneTime { .. })
    }

    pub fn is_deferred_command(&self) -> bool {
        matches!(self.action, JobAction::Command(_))
    }

    pub fn is_owned_by(&self, user: &Jid) -> bool {
        self.owner.as_ref().map(|o| o.bare() == user.bare()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_wildcard_matches_every_minute() {
        let schedule = Schedule::recurring(&CronSpec::default()).unwrap();
        let mut t = dt(2026, 1, 1, 0, 0);
        for _ in 0..(60 * 24 * 3) {
            assert!(schedule.matches(t));
            t += chrono::Duration::minutes(1);
        }
    }

    #[test]
    fn test_minute_and_hour() {
        let spec = CronSpec {
            minute: Some(vec![30]),
            hour: Some(vec![14]),
            ..Default::default()
        };
        let schedule = Schedule::recurring(&spec).unwrap();

        assert!(schedule.matches(dt(2026, 3, 2, 14, 30)));
        assert!(schedule.matches(dt(2026, 12, 25, 14, 30)));
        assert!(!schedule.matches(dt(2026, 3, 2, 14, 31)));
        assert!(!schedule.matches(dt(2026, 3, 2, 15, 30)));
    }

    #[test]
    fn test_day_of_week_starts_monday() {
        let spec = CronSpec {
            dow: Some(vec![0]),
            ..Default::default()
        };
        let schedule = Schedule::recurring(&spec).unwrap();

        // 2026-10-12 is a Monday
        assert!(schedule.matches(dt(2026, 10, 12, 9, 0)));
        assert!(!schedule.matches(dt(2026, 10, 13, 9, 0)));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let spec = CronSpec {
            hour: Some(vec![24]),
            ..Default::default()
        };
        assert_eq!(
            Schedule::recurring(&spec),
            Err(CronError::OutOfRange {
                field: "hour",
                value: 24,
                min: 0,
                max: 23
            })
        );

        let spec = CronSpec {
            day: Some(vec![0]),
            ..Default::default()
        };
        assert!(Schedule::recurring(&spec).is_err());

        let spec = CronSpec {
            month: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(Schedule::recurring(&spec), Err(CronError::EmptyField("month")));
    }

    #[test]
    fn test_onetime_matches_at_or_after() {
        let schedule = Schedule::OneTime {
            at: dt(2026, 10, 15, 12, 0),
        };
        assert!(!schedule.matches(dt(2026, 10, 15, 11, 59)));
        assert!(schedule.matches(dt(2026, 10, 15, 12, 0)));
        assert!(schedule.matches(dt(2026, 10, 15, 12, 7)));
    }

    #[test]
    fn test_schedule_display() {
        let spec = CronSpec {
            minute: Some(vec![15, 0]),
            hour: Some(vec![8]),
            ..Default::default()
        };
        assert_eq!(Schedule::recurring(&spec).unwrap().to_string(), "0,15 8 * * *");

        let onetime = Schedule::OneTime {
            at: dt(2026, 10, 15, 9, 5),
        };
        assert_eq!(onetime.to_string(), "2026-10-15 09:05");
    }

    #[test]
    fn test_job_id_parse() {
        assert_eq!("12".parse::<JobId>().unwrap(), JobId::Seq(12));
        assert_eq!("daily-report".parse::<JobId>().unwrap(), JobId::Named("daily-report".into()));
        assert!(JobId::Seq(2) < JobId::Seq(10));
    }
}
