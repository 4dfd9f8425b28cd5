//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Appointments table
            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                provider_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                date TEXT NOT NULL,
                -- JSON array of "HH:MM-HH:MM" strings, sorted
                slots_json TEXT NOT NULL,
                status TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                price_per_slot REAL NOT NULL,
                total_amount REAL NOT NULL,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            -- One row per claimed slot. The primary key is the conditional-write
            -- guard: a second booking for the same (provider, date, slot) fails
            -- at commit time instead of double-booking.
            CREATE TABLE IF NOT EXISTS slot_claims (
                provider_id TEXT NOT NULL,
                date TEXT NOT NULL,
                slot TEXT NOT NULL,
                appointment_id TEXT NOT NULL,
                PRIMARY KEY (provider_id, date, slot),
                FOREIGN KEY (appointment_id) REFERENCES appointments(id) ON DELETE CASCADE
            );

            -- Consultation rooms, id shared with the bound appointment
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                FOREIGN KEY (id) REFERENCES appointments(id)
            );

            -- Messages table. sequence is the per-room publish counter used to
            -- break timestamp ties deterministically.
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sender_role TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            -- Presence records, one per (room, participant)
            CREATE TABLE IF NOT EXISTS presence (
                room_id TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                online INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL,
                PRIMARY KEY (room_id, participant_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for query performance",
        sql: r#"
            -- Appointment indexes
            CREATE INDEX IF NOT EXISTS idx_appointments_provider_date
                ON appointments(provider_id, date);
            CREATE INDEX IF NOT EXISTS idx_appointments_client ON appointments(client_id);
            CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);

            -- Claim lookups by appointment (release on cancel)
            CREATE INDEX IF NOT EXISTS idx_slot_claims_appointment
                ON slot_claims(appointment_id);

            -- Message ordering and pagination
            CREATE INDEX IF NOT EXISTS idx_messages_room_seq ON messages(room_id, sequence);
            CREATE INDEX IF NOT EXISTS idx_messages_room_created
                ON messages(room_id, created_at);
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }
}
