use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            kind        TEXT NOT NULL CHECK (kind IN ('business', 'consumer')),
            name        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS businesses (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL UNIQUE REFERENCES users(id),
            description TEXT NOT NULL,
            category    TEXT NOT NULL,
            location    TEXT NOT NULL,
            services    TEXT NOT NULL DEFAULT '[]'
        );

        -- No foreign keys on from_id/to_id: the reserved assistant id 0 never
        -- has a users row.
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id         INTEGER NOT NULL,
            to_id           INTEGER NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            is_ai_assistant INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(from_id, to_id, timestamp);

        -- Seed the sample directory so a fresh install has something to
        -- search against.
        INSERT OR IGNORE INTO users (id, username, kind, name) VALUES
            (1, 'techhub',    'business', 'TechHub Solutions'),
            (2, 'homefix',    'business', 'HomeFix Pro'),
            (3, 'healthplus', 'business', 'HealthPlus Services');

        INSERT OR IGNORE INTO businesses (id, user_id, description, category, location, services) VALUES
            (1, 1, 'Expert IT consulting and software development services. Specializing in web applications, mobile apps, and cloud solutions.',
             'Technology', 'New York, NY',
             '["Web Development","Mobile Apps","Cloud Computing","IT Consulting"]'),
            (2, 2, 'Professional home repair and maintenance services. From basic repairs to major renovations, we do it all.',
             'Home Services', 'New York, NY',
             '["Home Repairs","Renovation","Plumbing","Electrical","HVAC"]'),
            (3, 3, 'Comprehensive healthcare services including preventive care, wellness programs, and specialized treatments.',
             'Healthcare', 'New York, NY',
             '["Primary Care","Wellness Programs","Specialized Care","Telemedicine"]');
        "#,
    )?;

    info!("Database migrations complete");
    Ok(())
}
