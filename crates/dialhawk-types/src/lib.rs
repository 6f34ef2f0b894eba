//! Shared domain types for the Dialhawk platform.
//!
//! This crate provides the foundational types used across all Dialhawk
//! crates: the agent calling policy, lead/contact records, call attempt
//! and call log rows, dashboard counters, and the dial job payload that
//! flows through the dispatch queue.
//!
//! No crate in the workspace depends on anything *except* `dialhawk-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent's dialing bot.
///
/// Mutated by the start/pause/stop control operations and read by
/// admission control: only `Running` agents may be dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    /// Not dialing; queued jobs for this agent are dropped at dequeue.
    #[default]
    Stopped,
    /// Actively dialing leads.
    Running,
    /// Temporarily suspended; jobs stay queued but are not dialed.
    Paused,
}

impl BotStatus {
    /// Returns the stored string form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }

    /// Parses a stored string form. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stopped" => Some(Self::Stopped),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// Terminal and intermediate status of a call attempt.
///
/// The telephony provider reports terminal statuses in kebab-case
/// (`no-answer`); the stored form is snake_case. `parse` accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Pending,
    Initiated,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initiated => "initiated",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
        }
    }

    /// Parses either the stored snake_case form or the provider's
    /// kebab-case callback form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "initiated" => Some(Self::Initiated),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" | "busy" | "canceled" => Some(Self::Failed),
            "no_answer" | "no-answer" => Some(Self::NoAnswer),
            _ => None,
        }
    }

    /// Whether this status ends the attempt (nothing further will arrive
    /// from the telephony provider for this call).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NoAnswer)
    }
}

/// An agent and its calling policy.
///
/// Created via the configuration API, mutated by the start/pause/stop
/// operations and the usage reset scheduler, never deleted while a
/// session references it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    /// Internal database ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Instruction profile: the system prompt given to the reply generator.
    pub prompt_script: String,
    /// Maximum calls placed per day.
    pub dial_limit: u32,
    /// Maximum attempts against a single (agent, phone) pair.
    pub max_calls_per_contact: u32,
    /// First hour of day (inclusive) calls may be placed.
    pub call_time_start: u32,
    /// Hour of day (exclusive) after which calls may not be placed.
    pub call_time_end: u32,
    /// Weekdays on which calls may be placed, lowercase names.
    pub call_days: Vec<String>,
    /// Re-dial a lead once after a no-answer.
    pub double_dial_no_answer: bool,
    /// Bot lifecycle status.
    pub bot_status: BotStatus,
    /// Voice identifier passed to speech synthesis.
    pub voice_id: Option<String>,
    /// Synthesis/call minutes consumed this month.
    pub minutes_used: u32,
    /// Monthly minutes cap.
    pub minutes_cap: u32,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last modification timestamp (ISO 8601).
    pub modified_at: String,
}

impl Agent {
    /// Whether the agent's `call_days` set contains the given weekday.
    pub fn allows_weekday(&self, day: Weekday) -> bool {
        let name = weekday_name(day);
        self.call_days.iter().any(|d| d == name)
    }

    /// Whether the given hour of day falls inside
    /// `[call_time_start, call_time_end)`.
    pub fn allows_hour(&self, hour: u32) -> bool {
        hour >= self.call_time_start && hour < self.call_time_end
    }
}

/// Lowercase English name for a weekday, matching the stored
/// `call_days` representation.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// A lead (contact) to be dialed. Read-only to the core; rows are
/// supplied by external list/CRM collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: i64,
    /// Phone number in E.164 form. Required, never empty.
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// One row of dial history for an (agent, phone) pair.
///
/// `attempt_count` never exceeds the agent's `max_calls_per_contact`
/// once enforcement is active; the increment and the bound check are a
/// single atomic statement in `dialhawk-dispatch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallAttempt {
    pub id: i64,
    pub agent_id: i64,
    pub lead_phone: String,
    pub attempt_count: u32,
    pub last_attempt_time: Option<String>,
    pub status: CallStatus,
    pub created_at: String,
    pub modified_at: String,
}

/// Audit record for a finished call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallLog {
    pub id: i64,
    pub agent_id: i64,
    pub call_date: String,
    pub call_duration_seconds: u32,
    pub call_outcome: CallStatus,
    pub contact_phone: String,
    pub contact_name: Option<String>,
    pub notes: Option<String>,
}

/// Per-agent per-day dashboard counters. At most one row per
/// (agent, date); updated via upsert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardStat {
    pub id: i64,
    pub agent_id: i64,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub dials_count: u32,
    pub conversation_count: u32,
    pub appointments_set: u32,
}

/// A queued request to dial one lead for one agent.
///
/// Lives in the `dial_jobs` table until a call worker claims it.
/// Delivery is at-least-once; the atomic attempt-count gate makes
/// duplicate consumption harmless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialJob {
    /// Unique job ID (UUID).
    pub job_id: String,
    pub agent_id: i64,
    pub lead: Lead,
    /// True when this job is the single no-answer retry. A redial job is
    /// never re-enqueued again, bounding total attempts per decision.
    #[serde(default)]
    pub redial: bool,
    /// Enqueue timestamp (ISO 8601).
    pub enqueued_at: String,
}

/// Structured side-channel intent emitted by the reply generator when
/// the model asks to book an appointment. Forwarded verbatim to the
/// calendar collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingIntent {
    pub email: Option<String>,
    pub time: Option<String>,
    pub details: Option<String>,
}

/// Terminal call status report delivered by the telephony collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCallback {
    pub call_status: String,
    pub agent_id: i64,
    pub contact_id: Option<i64>,
    pub to_phone: String,
    #[serde(default)]
    pub call_duration_seconds: u32,
}
