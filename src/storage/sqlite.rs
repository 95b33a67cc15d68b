//! Relational backend on top of `SQLite`.
//!
//! # Schema
//!
//! The `channel` table has columns `key` (case-folded name, primary key),
//! `name` and `owners` (a JSON array). The `endpoint` table holds one row
//! per endpoint keyed by its case-folded world and coordinates, with
//! `channel_key` pointing back at its channel.

use std::path::PathBuf;

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{ChannelRecord, EndpointRecord, StorageBackend, StorageError};
use crate::channel::{Channel, ChannelKey};
use crate::endpoint::Location;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS channel (
    key    TEXT PRIMARY KEY,
    name   TEXT NOT NULL,
    owners TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS endpoint (
    channel_key  TEXT NOT NULL,
    channel_name TEXT NOT NULL,
    world        TEXT NOT NULL,
    world_key    TEXT NOT NULL,
    x            INTEGER NOT NULL,
    y            INTEGER NOT NULL,
    z            INTEGER NOT NULL,
    wall_mounted INTEGER NOT NULL,
    facing       TEXT NOT NULL,
    owner_id     TEXT NOT NULL,
    role         TEXT NOT NULL,
    delay        INTEGER,
    PRIMARY KEY (world_key, x, y, z)
);
CREATE INDEX IF NOT EXISTS endpoint_channel ON endpoint (channel_key);
";

#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    Memory,
}

/// Stores channels and endpoints in two `SQLite` tables.
#[derive(Debug)]
pub struct SqliteBackend {
    target: Target,
    conn: Option<Connection>,
}

/// Endpoint columns before enum decoding.
struct EndpointRow {
    channel_name: String,
    world: String,
    x: i32,
    y: i32,
    z: i32,
    wall_mounted: bool,
    facing: String,
    owner_id: String,
    role: String,
    delay: Option<u32>,
}

impl EndpointRow {
    fn into_record(self) -> Result<EndpointRecord, StorageError> {
        Ok(EndpointRecord {
            channel_name: self.channel_name,
            world: self.world,
            x: self.x,
            y: self.y,
            z: self.z,
            wall_mounted: self.wall_mounted,
            facing: from_text(self.facing)?,
            owner_id: self.owner_id,
            role: from_text(self.role)?,
            delay: self.delay,
        })
    }
}

fn to_text<T: Serialize>(value: &T) -> Result<String, StorageError> {
    match serde_json::to_value(value)? {
        Value::String(text) => Ok(text),
        other => Err(StorageError::InvalidRecord(format!(
            "expected a string tag, got {other}"
        ))),
    }
}

fn from_text<T: DeserializeOwned>(text: String) -> Result<T, StorageError> {
    Ok(serde_json::from_value(Value::String(text))?)
}

impl SqliteBackend {
    /// Creates a backend storing its tables in the database file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::File(path.into()),
            conn: None,
        }
    }

    /// Creates a backend whose tables vanish on close.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            target: Target::Memory,
            conn: None,
        }
    }

    fn conn(&mut self) -> Result<&mut Connection, StorageError> {
        self.conn.as_mut().ok_or(StorageError::NotOpen)
    }

    fn endpoints_of(
        conn: &Connection,
        key: &ChannelKey,
    ) -> Result<Vec<EndpointRecord>, StorageError> {
        let mut stmt = conn.prepare(
            "SELECT channel_name, world, x, y, z, wall_mounted, facing, owner_id, role, delay
             FROM endpoint WHERE channel_key = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![key.as_str()], |row| {
            Ok(EndpointRow {
                channel_name: row.get(0)?,
                world: row.get(1)?,
                x: row.get(2)?,
                y: row.get(3)?,
                z: row.get(4)?,
                wall_mounted: row.get(5)?,
                facing: row.get(6)?,
                owner_id: row.get(7)?,
                role: row.get(8)?,
                delay: row.get(9)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn load(
        conn: &Connection,
        key: &ChannelKey,
        name: String,
        owners: &str,
    ) -> Result<Channel, StorageError> {
        let endpoints = Self::endpoints_of(conn, key)?
            .into_iter()
            .map(EndpointRecord::into_endpoint)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Channel {
            name,
            owners: serde_json::from_str(owners)?,
            endpoints,
        })
    }
}

impl StorageBackend for SqliteBackend {
    fn init(&mut self) -> Result<(), StorageError> {
        let conn = match &self.target {
            Target::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|err| StorageError::io(parent, err))?;
                }
                debug!("opening sqlite store at {}", path.display());
                Connection::open(path)?
            }
            Target::Memory => Connection::open_in_memory()?,
        };
        conn.execute_batch(SCHEMA)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn list_channels(&mut self) -> Result<Vec<Channel>, StorageError> {
        let conn: &Connection = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, name, owners FROM channel ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(key, name, owners)| Self::load(conn, &ChannelKey::new(&key), name, &owners))
            .collect()
    }

    fn channel(&mut self, key: &ChannelKey) -> Result<Option<Channel>, StorageError> {
        let conn: &Connection = self.conn()?;
        let row = conn
            .query_row(
                "SELECT name, owners FROM channel WHERE key = ?1",
                params![key.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(name, owners)| Self::load(conn, key, name, &owners))
            .transpose()
    }

    fn insert_channel(&mut self, record: &ChannelRecord) -> Result<(), StorageError> {
        let owners = serde_json::to_string(&record.owners)?;
        let key = ChannelKey::new(&record.name);
        self.conn()?.execute(
            "INSERT OR REPLACE INTO channel (key, name, owners) VALUES (?1, ?2, ?3)",
            params![key.as_str(), record.name, owners],
        )?;
        Ok(())
    }

    fn update_channel(
        &mut self,
        key: &ChannelKey,
        record: &ChannelRecord,
    ) -> Result<(), StorageError> {
        let owners = serde_json::to_string(&record.owners)?;
        let changed = self.conn()?.execute(
            "UPDATE channel SET name = ?2, owners = ?3 WHERE key = ?1",
            params![key.as_str(), record.name, owners],
        )?;
        if changed == 0 {
            return Err(StorageError::MissingChannel(key.to_string()));
        }
        Ok(())
    }

    fn delete_channel(&mut self, key: &ChannelKey) -> Result<(), StorageError> {
        let tx = self.conn()?.transaction()?;
        tx.execute(
            "DELETE FROM endpoint WHERE channel_key = ?1",
            params![key.as_str()],
        )?;
        tx.execute("DELETE FROM channel WHERE key = ?1", params![key.as_str()])?;
        tx.commit()?;
        Ok(())
    }

    fn insert_endpoint(
        &mut self,
        key: &ChannelKey,
        record: &EndpointRecord,
    ) -> Result<(), StorageError> {
        let facing = to_text(&record.facing)?;
        let role = to_text(&record.role)?;
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM channel WHERE key = ?1",
                params![key.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::MissingChannel(key.to_string()));
        }
        conn.execute(
            "INSERT OR REPLACE INTO endpoint
             (channel_key, channel_name, world, world_key, x, y, z, wall_mounted, facing,
              owner_id, role, delay)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                key.as_str(),
                record.channel_name,
                record.world,
                record.world.to_ascii_lowercase(),
                record.x,
                record.y,
                record.z,
                record.wall_mounted,
                facing,
                record.owner_id,
                role,
                record.delay,
            ],
        )?;
        Ok(())
    }

    fn delete_endpoint(
        &mut self,
        key: &ChannelKey,
        location: &Location,
    ) -> Result<(), StorageError> {
        self.conn()?.execute(
            "DELETE FROM endpoint
             WHERE channel_key = ?1 AND world_key = ?2 AND x = ?3 AND y = ?4 AND z = ?5",
            params![
                key.as_str(),
                location.world.to_ascii_lowercase(),
                location.x,
                location.y,
                location.z,
            ],
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StorageError::Sqlite(err))?;
        }
        Ok(())
    }
}
