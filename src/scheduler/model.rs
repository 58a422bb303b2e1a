//! Core types for scheduled jobs.
//!
//! A job is a named, client-owned unit of work made of ordered steps and a
//! recurrence spec. The client persists jobs; the scheduler only reads them
//! when arming a timer. Wire payloads arrive loosely typed and are validated
//! into these types once, at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// One step of a job. `order` defines execution sequence, not array index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub name: String,
    pub content: String,
    pub order: i64,
}

/// Unit of an interval recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
}

impl IntervalUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            Self::Minute => 60_000,
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => Some(Self::Minute),
            "hour" | "hours" => Some(Self::Hour),
            "day" | "days" => Some(Self::Day),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        };
        write!(f, "{s}")
    }
}

/// How often a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceSpec {
    /// Fire every `value` units, measured from the previous dispatch.
    Interval { unit: IntervalUnit, value: u32 },
    /// Cron expression. Modeled but not scheduled.
    Cron { expression: String },
}

impl RecurrenceSpec {
    /// The string tag used on the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Interval { .. } => "interval",
            Self::Cron { .. } => "cron",
        }
    }

    /// Whether a fired timer re-arms itself.
    pub fn rearms(&self) -> bool {
        matches!(self, Self::Interval { .. })
    }
}

/// A validated job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
    pub schedule: RecurrenceSpec,
    pub enabled: bool,
}

impl JobDefinition {
    /// The dispatch payload for this job.
    pub fn dispatch_job(&self) -> DispatchJob {
        DispatchJob {
            job_id: self.id.clone(),
            name: self.name.clone(),
            steps: self.steps.clone(),
        }
    }
}

/// What `dispatch` needs to run a job: identity, name and steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub job_id: String,
    pub name: String,
    pub steps: Vec<Step>,
}

impl DispatchJob {
    /// Render the steps into a single instruction: sorted by `order`,
    /// numbered from 1, newline-joined.
    pub fn instruction(&self) -> String {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A job waiting for a free worker slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub job_id: String,
    pub job_name: String,
    pub steps: Vec<Step>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job: DispatchJob) -> Self {
        Self {
            job_id: job.job_id,
            job_name: job.name,
            steps: job.steps,
            enqueued_at: Utc::now(),
        }
    }

    pub fn into_dispatch(self) -> DispatchJob {
        DispatchJob {
            job_id: self.job_id,
            name: self.job_name,
            steps: self.steps,
        }
    }
}

// ── Wire payloads ───────────────────────────────────────────────────────

/// Job as sent by a client. Every field is optional so that shape errors
/// become `InvalidJob`/`InvalidSchedule` instead of deserialization noise.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepPayload>,
    pub schedule: Option<SchedulePayload>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub unit: Option<String>,
    pub value: Option<i64>,
    pub expression: Option<String>,
}

impl TryFrom<SchedulePayload> for RecurrenceSpec {
    type Error = SchedulerError;

    fn try_from(payload: SchedulePayload) -> Result<Self, Self::Error> {
        let kind = payload.kind.as_deref().unwrap_or("interval");
        match kind {
            "interval" => {
                let unit_raw = payload
                    .unit
                    .ok_or_else(|| SchedulerError::invalid_schedule("interval missing 'unit'"))?;
                let unit = IntervalUnit::parse(&unit_raw).ok_or_else(|| {
                    SchedulerError::invalid_schedule(format!("unknown interval unit: {unit_raw}"))
                })?;
                let value = payload
                    .value
                    .ok_or_else(|| SchedulerError::invalid_schedule("interval missing 'value'"))?;
                let value = u32::try_from(value)
                    .ok()
                    .filter(|v| *v >= 1)
                    .ok_or_else(|| {
                        SchedulerError::invalid_schedule(format!(
                            "interval value must be a positive integer, got {value}"
                        ))
                    })?;
                Ok(Self::Interval { unit, value })
            }
            "cron" => {
                let expression = payload
                    .expression
                    .filter(|e| !e.trim().is_empty())
                    .ok_or_else(|| SchedulerError::invalid_schedule("cron missing 'expression'"))?;
                Ok(Self::Cron { expression })
            }
            other => Err(SchedulerError::invalid_schedule(format!(
                "unknown schedule type: {other}"
            ))),
        }
    }
}

impl JobPayload {
    /// Validate identity and steps, ignoring the schedule. Used by on-demand
    /// execution, which bypasses timers.
    pub fn into_dispatch(self) -> Result<DispatchJob, SchedulerError> {
        let (job_id, name) = Self::identity(self.id, self.name)?;
        Ok(DispatchJob {
            job_id,
            name,
            steps: Self::steps(self.steps),
        })
    }

    fn identity(
        id: Option<String>,
        name: Option<String>,
    ) -> Result<(String, String), SchedulerError> {
        let id = id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SchedulerError::invalid_job("missing 'id'"))?;
        let name = name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.clone());
        Ok((id, name))
    }

    fn steps(steps: Vec<StepPayload>) -> Vec<Step> {
        steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| Step {
                id: s.id.unwrap_or_else(|| format!("step-{}", i + 1)),
                name: s.name.unwrap_or_default(),
                content: s.content.unwrap_or_default(),
                order: s.order.unwrap_or(i as i64),
            })
            .collect()
    }
}

impl TryFrom<JobPayload> for JobDefinition {
    type Error = SchedulerError;

    fn try_from(payload: JobPayload) -> Result<Self, Self::Error> {
        let (id, name) = JobPayload::identity(payload.id, payload.name)?;
        let schedule = payload
            .schedule
            .ok_or_else(|| SchedulerError::invalid_schedule("missing 'schedule'"))?
            .try_into()?;
        Ok(Self {
            id,
            name,
            steps: JobPayload::steps(payload.steps),
            schedule,
            enabled: payload.enabled.unwrap_or(true),
        })
    }
}
