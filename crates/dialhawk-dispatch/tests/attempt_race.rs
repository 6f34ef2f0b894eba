//! Concurrency test for the per-contact admission gate: racing workers
//! must never push an (agent, phone) pair past `max_calls_per_contact`.

use dialhawk_db::{create_pool, run_migrations, DbRuntimeSettings};
use dialhawk_dispatch::attempts::{attempt_count, try_claim_attempt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn concurrent_claims_admit_exactly_the_cap() {
    // A file-backed database: every pooled connection must see the
    // same rows (a `:memory:` pool gives each connection its own db).
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("race.db");
    let pool = create_pool(
        db_path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("pool");

    {
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrations");
        conn.execute("INSERT INTO agents (name) VALUES ('a')", [])
            .unwrap();
    }

    const MAX_CALLS: u32 = 2;
    const RACERS: usize = 8;

    let admitted = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..RACERS {
        let pool = pool.clone();
        let admitted = admitted.clone();
        handles.push(std::thread::spawn(move || {
            let conn = pool.get().expect("conn");
            let ok = try_claim_attempt(&conn, 1, "+15550001", MAX_CALLS, "2025-06-02 10:00:00")
                .expect("claim should not error");
            if ok {
                admitted.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    for handle in handles {
        handle.join().expect("racer should not panic");
    }

    assert_eq!(
        admitted.load(Ordering::SeqCst),
        MAX_CALLS as usize,
        "exactly max_calls_per_contact claims may win the race"
    );

    let conn = pool.get().expect("conn");
    assert_eq!(
        attempt_count(&conn, 1, "+15550001").expect("count"),
        MAX_CALLS,
        "exactly two increments persist"
    );
}
