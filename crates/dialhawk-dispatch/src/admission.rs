//! Admission control: the checks that decide whether a dial attempt
//! may proceed.
//!
//! Admission runs twice per job. The coarse pass here filters at
//! enqueue time; the call worker repeats it right before dialing and
//! then takes the *atomic* per-contact gate
//! ([`crate::attempts::try_claim_attempt`]), which closes the
//! check-then-act window the read-only pass necessarily has.
//!
//! A skip is not an error — it is a normal outcome, logged for
//! observability and otherwise silent.

use crate::error::DispatchError;
use crate::{attempts, history};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use dialhawk_types::Agent;
use rusqlite::Connection;

/// The agent-local wall clock, derived from UTC once per decision so
/// every check in one pass sees the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalClock {
    pub weekday: Weekday,
    pub hour: u32,
    /// Local calendar date, `YYYY-MM-DD`. Daily counters key on this.
    pub date: String,
}

/// Converts a UTC instant into the agent's local clock. Unknown
/// timezone names fall back to Eastern, matching the platform default.
pub fn agent_local_clock(agent: &Agent, utc_now: DateTime<Utc>) -> LocalClock {
    let tz: chrono_tz::Tz = agent
        .timezone
        .parse()
        .unwrap_or(chrono_tz::America::New_York);
    let local = utc_now.with_timezone(&tz);
    LocalClock {
        weekday: local.weekday(),
        hour: local.hour(),
        date: local.format("%Y-%m-%d").to_string(),
    }
}

/// Why a dial candidate was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BotNotRunning,
    OutsideCallDays,
    OutsideCallHours,
    DailyLimitReached,
    ContactLimitReached,
    MinutesExhausted,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BotNotRunning => "bot_not_running",
            Self::OutsideCallDays => "outside_call_days",
            Self::OutsideCallHours => "outside_call_hours",
            Self::DailyLimitReached => "daily_limit_reached",
            Self::ContactLimitReached => "contact_limit_reached",
            Self::MinutesExhausted => "minutes_exhausted",
        }
    }
}

/// Admission verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Skip(SkipReason),
}

/// The policy-only checks: status, calling window, and monthly minutes.
/// No database access; counters are checked separately.
pub fn check_policy(agent: &Agent, clock: &LocalClock) -> Admission {
    if agent.bot_status != dialhawk_types::BotStatus::Running {
        return Admission::Skip(SkipReason::BotNotRunning);
    }
    if !agent.allows_weekday(clock.weekday) {
        return Admission::Skip(SkipReason::OutsideCallDays);
    }
    if !agent.allows_hour(clock.hour) {
        return Admission::Skip(SkipReason::OutsideCallHours);
    }
    if agent.minutes_used >= agent.minutes_cap {
        return Admission::Skip(SkipReason::MinutesExhausted);
    }
    Admission::Admit
}

/// The full read-only admission pass: policy plus the day's dial count
/// and the pair's attempt count.
///
/// This is the coarse filter. The worker's authoritative pass re-runs
/// `check_policy` and the dial-count check against fresh rows, then
/// replaces the attempt-count read with the atomic claim.
pub fn check_admission(
    conn: &Connection,
    agent: &Agent,
    lead_phone: &str,
    clock: &LocalClock,
) -> Result<Admission, DispatchError> {
    if let Admission::Skip(reason) = check_policy(agent, clock) {
        return Ok(Admission::Skip(reason));
    }
    if history::dials_on(conn, agent.id, &clock.date)? >= agent.dial_limit {
        return Ok(Admission::Skip(SkipReason::DailyLimitReached));
    }
    if attempts::attempt_count(conn, agent.id, lead_phone)? >= agent.max_calls_per_contact {
        return Ok(Admission::Skip(SkipReason::ContactLimitReached));
    }
    Ok(Admission::Admit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialhawk_db::run_migrations;
    use dialhawk_types::BotStatus;

    fn weekday_agent() -> Agent {
        Agent {
            id: 1,
            name: "a".into(),
            prompt_script: String::new(),
            dial_limit: 10,
            max_calls_per_contact: 2,
            call_time_start: 9,
            call_time_end: 17,
            call_days: vec!["monday".into()],
            double_dial_no_answer: false,
            bot_status: BotStatus::Running,
            voice_id: None,
            minutes_used: 0,
            minutes_cap: 500,
            timezone: "America/New_York".into(),
            created_at: String::new(),
            modified_at: String::new(),
        }
    }

    fn clock(weekday: Weekday, hour: u32) -> LocalClock {
        LocalClock {
            weekday,
            hour,
            date: "2025-06-02".into(),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn.execute("INSERT INTO agents (name) VALUES ('a')", [])
            .unwrap();
        conn
    }

    #[test]
    fn tuesday_is_rejected_regardless_of_counters() {
        let conn = test_conn();
        let agent = weekday_agent();
        let verdict =
            check_admission(&conn, &agent, "+15550001", &clock(Weekday::Tue, 10)).unwrap();
        assert_eq!(verdict, Admission::Skip(SkipReason::OutsideCallDays));
    }

    #[test]
    fn monday_just_before_close_is_admitted() {
        let conn = test_conn();
        let agent = weekday_agent();
        let verdict =
            check_admission(&conn, &agent, "+15550001", &clock(Weekday::Mon, 16)).unwrap();
        assert_eq!(verdict, Admission::Admit);
    }

    #[test]
    fn closing_hour_is_exclusive() {
        let agent = weekday_agent();
        assert_eq!(
            check_policy(&agent, &clock(Weekday::Mon, 17)),
            Admission::Skip(SkipReason::OutsideCallHours)
        );
        assert_eq!(
            check_policy(&agent, &clock(Weekday::Mon, 8)),
            Admission::Skip(SkipReason::OutsideCallHours)
        );
    }

    #[test]
    fn daily_dial_limit_rejects_at_cap() {
        let conn = test_conn();
        let agent = weekday_agent();
        for _ in 0..10 {
            history::record_dial(&conn, agent.id, "2025-06-02").unwrap();
        }
        let verdict =
            check_admission(&conn, &agent, "+15550001", &clock(Weekday::Mon, 10)).unwrap();
        assert_eq!(verdict, Admission::Skip(SkipReason::DailyLimitReached));
    }

    #[test]
    fn contact_cap_rejects_after_attempts() {
        let conn = test_conn();
        let agent = weekday_agent();
        attempts::try_claim_attempt(&conn, agent.id, "+15550001", 2, "now").unwrap();
        attempts::try_claim_attempt(&conn, agent.id, "+15550001", 2, "now").unwrap();

        let verdict =
            check_admission(&conn, &agent, "+15550001", &clock(Weekday::Mon, 10)).unwrap();
        assert_eq!(verdict, Admission::Skip(SkipReason::ContactLimitReached));
    }

    #[test]
    fn paused_and_exhausted_agents_are_skipped() {
        let mut agent = weekday_agent();
        agent.bot_status = BotStatus::Paused;
        assert_eq!(
            check_policy(&agent, &clock(Weekday::Mon, 10)),
            Admission::Skip(SkipReason::BotNotRunning)
        );

        let mut agent = weekday_agent();
        agent.minutes_used = 500;
        assert_eq!(
            check_policy(&agent, &clock(Weekday::Mon, 10)),
            Admission::Skip(SkipReason::MinutesExhausted)
        );
    }

    #[test]
    fn local_clock_respects_timezone() {
        let agent = weekday_agent();
        // 02:30 UTC on Tuesday is 22:30 Monday in New York (EDT).
        let utc = DateTime::parse_from_rfc3339("2025-06-03T02:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = agent_local_clock(&agent, utc);
        assert_eq!(clock.weekday, Weekday::Mon);
        assert_eq!(clock.hour, 22);
        assert_eq!(clock.date, "2025-06-02");
    }
}
