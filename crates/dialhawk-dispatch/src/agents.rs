//! Agent persistence: row mapping, CRUD, and the mutations the
//! control API and reset scheduler perform.

use crate::error::DispatchError;
use dialhawk_types::{Agent, BotStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Parameters for creating a new agent.
#[derive(Debug, Clone)]
pub struct CreateAgentParams {
    pub name: String,
    pub prompt_script: String,
    pub dial_limit: u32,
    pub max_calls_per_contact: u32,
    pub call_time_start: u32,
    pub call_time_end: u32,
    pub call_days: Vec<String>,
    pub double_dial_no_answer: bool,
    pub voice_id: Option<String>,
    pub minutes_cap: u32,
    pub timezone: String,
}

impl Default for CreateAgentParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            prompt_script: String::new(),
            dial_limit: 50,
            max_calls_per_contact: 2,
            call_time_start: 9,
            call_time_end: 17,
            call_days: Vec::new(),
            double_dial_no_answer: false,
            voice_id: None,
            minutes_cap: 500,
            timezone: "America/New_York".to_string(),
        }
    }
}

const AGENT_COLUMNS: &str = "id, name, prompt_script, dial_limit, max_calls_per_contact,
    call_time_start, call_time_end, call_days, double_dial_no_answer,
    bot_status, voice_id, minutes_used, minutes_cap, timezone,
    created_at, modified_at";

fn map_row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let call_days_json: String = row.get(7)?;
    let bot_status_text: String = row.get(9)?;
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        prompt_script: row.get(2)?,
        dial_limit: row.get(3)?,
        max_calls_per_contact: row.get(4)?,
        call_time_start: row.get(5)?,
        call_time_end: row.get(6)?,
        call_days: serde_json::from_str(&call_days_json).unwrap_or_default(),
        double_dial_no_answer: row.get(8)?,
        bot_status: BotStatus::parse(&bot_status_text).unwrap_or_default(),
        voice_id: row.get(10)?,
        minutes_used: row.get(11)?,
        minutes_cap: row.get(12)?,
        timezone: row.get(13)?,
        created_at: row.get(14)?,
        modified_at: row.get(15)?,
    })
}

/// Creates a new agent and returns it.
pub fn create_agent(conn: &Connection, params: &CreateAgentParams) -> Result<Agent, DispatchError> {
    let call_days_json = serde_json::to_string(&params.call_days)?;
    conn.execute(
        "INSERT INTO agents (
            name, prompt_script, dial_limit, max_calls_per_contact,
            call_time_start, call_time_end, call_days, double_dial_no_answer,
            voice_id, minutes_cap, timezone
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            params.name,
            params.prompt_script,
            params.dial_limit,
            params.max_calls_per_contact,
            params.call_time_start,
            params.call_time_end,
            call_days_json,
            params.double_dial_no_answer,
            params.voice_id,
            params.minutes_cap,
            params.timezone,
        ],
    )?;
    get_agent(conn, conn.last_insert_rowid())
}

/// Retrieves one agent by ID.
pub fn get_agent(conn: &Connection, agent_id: i64) -> Result<Agent, DispatchError> {
    conn.query_row(
        &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
        [agent_id],
        map_row_to_agent,
    )
    .optional()?
    .ok_or(DispatchError::AgentNotFound(agent_id))
}

/// Lists every agent.
pub fn list_agents(conn: &Connection) -> Result<Vec<Agent>, DispatchError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY id ASC"))?;
    let rows = stmt.query_map([], map_row_to_agent)?;
    let mut agents = Vec::new();
    for row in rows {
        agents.push(row?);
    }
    Ok(agents)
}

/// Lists agents whose bot is currently running — the autopilot sweep's
/// candidate set.
pub fn list_running_agents(conn: &Connection) -> Result<Vec<Agent>, DispatchError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AGENT_COLUMNS} FROM agents WHERE bot_status = 'running' ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([], map_row_to_agent)?;
    let mut agents = Vec::new();
    for row in rows {
        agents.push(row?);
    }
    Ok(agents)
}

/// Updates an agent's bot lifecycle status (start / pause / stop).
pub fn set_bot_status(
    conn: &Connection,
    agent_id: i64,
    status: BotStatus,
) -> Result<(), DispatchError> {
    let changed = conn.execute(
        "UPDATE agents SET bot_status = ?1, modified_at = datetime('now') WHERE id = ?2",
        params![status.as_str(), agent_id],
    )?;
    if changed == 0 {
        return Err(DispatchError::AgentNotFound(agent_id));
    }
    Ok(())
}

/// Adds consumed minutes to the agent's monthly usage counter. A single
/// atomic statement — workers race on this row.
pub fn add_minutes_used(
    conn: &Connection,
    agent_id: i64,
    minutes: u32,
) -> Result<(), DispatchError> {
    conn.execute(
        "UPDATE agents SET minutes_used = minutes_used + ?1, modified_at = datetime('now')
         WHERE id = ?2",
        params![minutes, agent_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialhawk_db::run_migrations;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn
    }

    fn sample_params() -> CreateAgentParams {
        CreateAgentParams {
            name: "Ava".into(),
            prompt_script: "Hi, this is Ava.".into(),
            call_days: vec!["monday".into(), "friday".into()],
            ..CreateAgentParams::default()
        }
    }

    #[test]
    fn create_and_fetch_round_trip() {
        let conn = test_conn();
        let created = create_agent(&conn, &sample_params()).expect("create");
        assert_eq!(created.name, "Ava");
        assert_eq!(created.bot_status, BotStatus::Stopped);
        assert_eq!(created.call_days, vec!["monday", "friday"]);

        let fetched = get_agent(&conn, created.id).expect("get");
        assert_eq!(fetched, created);
    }

    #[test]
    fn get_unknown_agent_is_not_found() {
        let conn = test_conn();
        match get_agent(&conn, 42) {
            Err(DispatchError::AgentNotFound(42)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn running_filter_tracks_status_changes() {
        let conn = test_conn();
        let a = create_agent(&conn, &sample_params()).unwrap();
        let b = create_agent(&conn, &sample_params()).unwrap();

        assert!(list_running_agents(&conn).unwrap().is_empty());

        set_bot_status(&conn, a.id, BotStatus::Running).unwrap();
        set_bot_status(&conn, b.id, BotStatus::Paused).unwrap();

        let running = list_running_agents(&conn).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a.id);
    }

    #[test]
    fn minutes_accumulate() {
        let conn = test_conn();
        let agent = create_agent(&conn, &sample_params()).unwrap();
        add_minutes_used(&conn, agent.id, 3).unwrap();
        add_minutes_used(&conn, agent.id, 2).unwrap();
        assert_eq!(get_agent(&conn, agent.id).unwrap().minutes_used, 5);
    }
}
