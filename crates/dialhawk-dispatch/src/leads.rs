//! Lead storage and the lead source seam.
//!
//! Leads are read-only to the dispatch engine. External list/CRM
//! adapters fill the `leads` table; the engine reads it through the
//! [`LeadSource`] trait so tests (and alternative adapters) can supply
//! leads without a database.

use crate::error::DispatchError;
use async_trait::async_trait;
use dialhawk_db::DbPool;
use dialhawk_types::Lead;
use rusqlite::{params, Connection, Row};

fn map_row_to_lead(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
    })
}

/// Inserts one lead for an agent. Used by the list-loading API.
pub fn insert_lead(
    conn: &Connection,
    agent_id: i64,
    phone: &str,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<Lead, DispatchError> {
    conn.execute(
        "INSERT INTO leads (agent_id, phone, name, email) VALUES (?1, ?2, ?3, ?4)",
        params![agent_id, phone, name, email],
    )?;
    conn.query_row(
        "SELECT id, phone, name, email FROM leads WHERE id = ?1",
        [conn.last_insert_rowid()],
        map_row_to_lead,
    )
    .map_err(DispatchError::from)
}

/// All leads loaded for an agent, oldest first.
pub fn leads_for_agent(conn: &Connection, agent_id: i64) -> Result<Vec<Lead>, DispatchError> {
    let mut stmt = conn.prepare(
        "SELECT id, phone, name, email FROM leads WHERE agent_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([agent_id], map_row_to_lead)?;
    let mut leads = Vec::new();
    for row in rows {
        leads.push(row?);
    }
    Ok(leads)
}

/// Supplies the leads an agent should dial.
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn fetch_leads(&self, agent_id: i64) -> Result<Vec<Lead>, DispatchError>;
}

/// The default lead source: the `leads` table.
pub struct DbLeadSource {
    pool: DbPool,
}

impl DbLeadSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadSource for DbLeadSource {
    async fn fetch_leads(&self, agent_id: i64) -> Result<Vec<Lead>, DispatchError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            leads_for_agent(&conn, agent_id)
        })
        .await
        .map_err(|e| DispatchError::Pool(format!("lead fetch task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialhawk_db::run_migrations;

    #[test]
    fn insert_and_list() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn.execute("INSERT INTO agents (name) VALUES ('a')", [])
            .unwrap();

        insert_lead(&conn, 1, "+15550001", Some("Pat"), None).unwrap();
        insert_lead(&conn, 1, "+15550002", None, Some("lee@example.com")).unwrap();

        let leads = leads_for_agent(&conn, 1).unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].phone, "+15550001");
        assert_eq!(leads[0].name.as_deref(), Some("Pat"));
        assert_eq!(leads[1].email.as_deref(), Some("lee@example.com"));
        assert!(leads_for_agent(&conn, 99).unwrap().is_empty());
    }
}
