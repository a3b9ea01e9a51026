//! Schema and ETL statements for the song play star schema
//!
//! Raw JSON event and song logs are bulk loaded into two staging tables, then
//! transformed into a `songplays` fact table surrounded by `users`, `songs`,
//! `artists` and `time` dimension tables.
//!
//! The catalog is ordered data: statements are grouped by [`StatementKind`] and
//! must be executed kind by kind in [`StatementKind::PIPELINE`] order, each kind in
//! the order listed. Nothing here checks that an earlier kind has been run.
use std::fmt;

use crate::config::Settings;

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIME: &str = "time";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
  Drop,
  Create,
  Copy,
  Insert,
}

impl StatementKind {
  /// Execution order of the full pipeline
  pub const PIPELINE: [StatementKind; 4] = [Self::Drop, Self::Create, Self::Copy, Self::Insert];
}

impl fmt::Display for StatementKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Drop => write!(f, "drop"),
      Self::Create => write!(f, "create"),
      Self::Copy => write!(f, "copy"),
      Self::Insert => write!(f, "insert"),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
  pub kind: StatementKind,
  pub target_table: &'static str,
  pub sql: String,
}

const DROP_TABLES: &[(&str, &str)] = &[
  (STAGING_EVENTS, "DROP TABLE IF EXISTS staging_events"),
  (STAGING_SONGS, "DROP TABLE IF EXISTS staging_songs"),
  (SONGPLAYS, "DROP TABLE IF EXISTS songplays"),
  (USERS, "DROP TABLE IF EXISTS users"),
  (SONGS, "DROP TABLE IF EXISTS songs"),
  (ARTISTS, "DROP TABLE IF EXISTS artists"),
  (TIME, "DROP TABLE IF EXISTS time"),
];

// Staging tables, then the fact table, then dimensions. No foreign keys are declared.
const CREATE_TABLES: &[(&str, &str)] = &[
  (
    STAGING_EVENTS,
    "CREATE TABLE IF NOT EXISTS staging_events
(
    artist          TEXT,
    auth            TEXT,
    first_name      TEXT,
    gender          TEXT,
    item_in_session INTEGER,
    last_name       TEXT,
    length          FLOAT4,
    level           TEXT,
    location        TEXT,
    method          TEXT,
    page            TEXT,
    registration    FLOAT8,
    session_id      INTEGER,
    song            TEXT,
    status          INTEGER,
    ts              BIGINT,
    user_agent      TEXT,
    user_id         TEXT
)",
  ),
  (
    STAGING_SONGS,
    "CREATE TABLE IF NOT EXISTS staging_songs
(
    song_id             TEXT,
    title               TEXT,
    duration            FLOAT4,
    year                SMALLINT,
    artist_id           TEXT,
    artist_name         TEXT,
    artist_latitude     REAL,
    artist_longitude    REAL,
    artist_location     TEXT,
    num_songs           INTEGER
)",
  ),
  (
    SONGPLAYS,
    "CREATE TABLE IF NOT EXISTS songplays
(
    songplay_id    BIGINT IDENTITY(1, 1) PRIMARY KEY,
    start_time     TIMESTAMP NOT NULL SORTKEY,
    user_id        TEXT NOT NULL DISTKEY,
    level          TEXT,
    song_id        TEXT,
    artist_id      TEXT,
    session_id     INTEGER,
    location       TEXT,
    user_agent     TEXT
) DISTSTYLE KEY",
  ),
  (
    USERS,
    "CREATE TABLE IF NOT EXISTS users
(
    user_id     TEXT PRIMARY KEY SORTKEY,
    first_name  TEXT,
    last_name   TEXT,
    gender      TEXT,
    level       TEXT
) DISTSTYLE ALL",
  ),
  (
    SONGS,
    "CREATE TABLE IF NOT EXISTS songs
(
    song_id     TEXT PRIMARY KEY SORTKEY,
    title       TEXT,
    artist_id   TEXT DISTKEY,
    year        SMALLINT,
    duration    FLOAT4
) DISTSTYLE KEY",
  ),
  (
    ARTISTS,
    "CREATE TABLE IF NOT EXISTS artists
(
    artist_id   TEXT PRIMARY KEY SORTKEY,
    name        TEXT,
    location    TEXT,
    latitude    FLOAT4,
    longitude   FLOAT4
) DISTSTYLE ALL",
  ),
  (
    TIME,
    "CREATE TABLE IF NOT EXISTS time
(
    start_time  TIMESTAMP PRIMARY KEY SORTKEY,
    hour        SMALLINT,
    day         SMALLINT,
    week        SMALLINT,
    month       SMALLINT,
    year        SMALLINT DISTKEY,
    weekday     SMALLINT
) DISTSTYLE KEY",
  ),
];

// `ts` is milliseconds since the epoch. Redshift has no from_unixtime(), so the timestamp
// is the epoch plus `ts / 1000.0` seconds; the float division keeps the milliseconds.
const INSERT_TABLES: &[(&str, &str)] = &[
  (
    SONGPLAYS,
    "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT
    TIMESTAMP 'epoch' + (e.ts / 1000.0) * INTERVAL '1 second',
    e.user_id,
    e.level,
    s.song_id,
    s.artist_id,
    e.session_id,
    e.location,
    e.user_agent
FROM staging_events e
LEFT JOIN staging_songs s ON
    e.song = s.title AND
    e.artist = s.artist_name AND
    ABS(e.length - s.duration) < 2
WHERE
    e.page = 'NextSong'",
  ),
  (
    USERS,
    "INSERT INTO users
SELECT DISTINCT
    user_id,
    first_name,
    last_name,
    gender,
    level
FROM staging_events
WHERE user_id IS NOT NULL",
  ),
  (
    SONGS,
    "INSERT INTO songs
SELECT DISTINCT
    song_id,
    title,
    artist_id,
    year,
    duration
FROM staging_songs
WHERE song_id IS NOT NULL",
  ),
  (
    ARTISTS,
    "INSERT INTO artists
SELECT DISTINCT
    artist_id,
    artist_name,
    artist_location,
    artist_latitude,
    artist_longitude
FROM staging_songs
WHERE artist_id IS NOT NULL",
  ),
  (
    TIME,
    "INSERT INTO time
WITH temporary_time AS (
    SELECT TIMESTAMP 'epoch' + (ts / 1000.0) * INTERVAL '1 second' AS ts
    FROM staging_events
    WHERE ts IS NOT NULL
)
SELECT DISTINCT
    ts,
    EXTRACT(hour FROM ts),
    EXTRACT(day FROM ts),
    EXTRACT(week FROM ts),
    EXTRACT(month FROM ts),
    EXTRACT(year FROM ts),
    EXTRACT(weekday FROM ts)
FROM temporary_time",
  ),
];

/// Values interpolated into the `COPY` statements
///
/// Values are trusted configuration and are not escaped
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopySources {
  pub log_data: String,
  pub log_jsonpath: String,
  pub song_data: String,
  pub iam_role_arn: String,
  pub region: String,
}

impl CopySources {
  pub fn new(settings: &Settings, iam_role_arn: &str) -> Self {
    CopySources {
      log_data: settings.s3.log_data.clone(),
      log_jsonpath: settings.s3.log_jsonpath.clone(),
      song_data: settings.s3.song_data.clone(),
      iam_role_arn: iam_role_arn.to_owned(),
      region: settings.dwh.dwh_region.clone(),
    }
  }

  /// Events are mapped to columns through the JSONPaths document
  fn staging_events_copy(&self) -> String {
    format!(
      "COPY staging_events FROM '{}'
IAM_ROLE '{}'
JSON '{}' REGION '{}'",
      self.log_data, self.iam_role_arn, self.log_jsonpath, self.region
    )
  }

  /// Songs are mapped to columns by matching JSON keys to column names
  fn staging_songs_copy(&self) -> String {
    format!(
      "COPY staging_songs FROM '{}'
IAM_ROLE '{}'
JSON 'auto' REGION '{}'",
      self.song_data, self.iam_role_arn, self.region
    )
  }
}

/// The ordered statement set with its `COPY` statements filled in
#[derive(Clone, Debug)]
pub struct Catalog {
  statements: Vec<Statement>,
}

impl Catalog {
  pub fn new(sources: &CopySources) -> Self {
    let fixed = |kind: StatementKind, entries: &[(&'static str, &'static str)]| {
      entries
        .iter()
        .map(move |&(table, sql)| Statement {
          kind,
          target_table: table,
          sql: sql.to_owned(),
        })
        .collect::<Vec<_>>()
    };

    let mut statements = Vec::new();
    statements.extend(fixed(StatementKind::Drop, DROP_TABLES));
    statements.extend(fixed(StatementKind::Create, CREATE_TABLES));
    statements.push(Statement {
      kind: StatementKind::Copy,
      target_table: STAGING_EVENTS,
      sql: sources.staging_events_copy(),
    });
    statements.push(Statement {
      kind: StatementKind::Copy,
      target_table: STAGING_SONGS,
      sql: sources.staging_songs_copy(),
    });
    statements.extend(fixed(StatementKind::Insert, INSERT_TABLES));

    Catalog { statements }
  }

  /// Statements of one kind, in execution order
  pub fn statements(&self, kind: StatementKind) -> impl Iterator<Item = &Statement> {
    self.statements.iter().filter(move |statement| statement.kind == kind)
  }

  /// Every statement in pipeline order
  pub fn pipeline(&self) -> impl Iterator<Item = &Statement> {
    StatementKind::PIPELINE
      .into_iter()
      .flat_map(move |kind| self.statements(kind))
  }
}
