//! Schema Store: a read-only relational lookup over `heatpump.sqlite`,
//! produced offline by the (out-of-scope) Access-to-schema converter.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::WpuError;

#[derive(Debug, Clone, Default)]
pub struct VersionSet {
    pub datalabel: u32,
    pub parameterlijst: u32,
    pub handbed: u32,
    pub counters: u32,
}

#[derive(Debug, Clone)]
pub struct DataLabelRow {
    pub name: String,
    pub title: String,
    pub tooltip: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CounterRow {
    pub id: u32,
    pub name: String,
    pub title: String,
    pub tooltip: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingRow {
    pub id: u32,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub title: String,
    pub description: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ManualRow {
    pub id: u32,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub title: String,
    pub tooltip: Option<String>,
    pub unit: Option<String>,
}

pub struct SchemaStore {
    conn: Connection,
}

impl SchemaStore {
    pub fn open(path: &str) -> Result<Self, WpuError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        Ok(SchemaStore { conn })
    }

    pub fn resolve_versions(&self, list_version: u8) -> Result<VersionSet, WpuError> {
        self.conn
            .query_row(
                "SELECT datalabel, parameterlist, handbed, counters \
                 FROM versiebeheer WHERE version = ?1",
                [list_version],
                |row: &Row| {
                    Ok(VersionSet {
                        datalabel: row.get(0)?,
                        parameterlijst: row.get(1)?,
                        handbed: row.get(2)?,
                        counters: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or(WpuError::VersionNotFound(list_version))
    }

    pub fn datalabels(&self, version: u32) -> Result<Vec<DataLabelRow>, WpuError> {
        let query = format!(
            "SELECT name, title, tooltip, unit FROM datalabel_v{version} ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DataLabelRow {
                    name: row.get(0)?,
                    title: row.get(1)?,
                    tooltip: row.get(2)?,
                    unit: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn counters(&self, version: u32) -> Result<Vec<CounterRow>, WpuError> {
        let query = format!(
            "SELECT id, name, title, tooltip, unit FROM counters_v{version} ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CounterRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    title: row.get(2)?,
                    tooltip: row.get(3)?,
                    unit: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn settings(&self, version: u32) -> Result<Vec<SettingRow>, WpuError> {
        let query = format!(
            "SELECT id, name, min, max, def, title, description, unit \
             FROM parameterlijst_v{version} ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map([], Self::map_setting_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn setting_by_id(&self, version: u32, id: u32) -> Result<SettingRow, WpuError> {
        let query = format!(
            "SELECT id, name, min, max, def, title, description, unit \
             FROM parameterlijst_v{version} WHERE id = ?1"
        );
        self.conn
            .query_row(&query, [id], Self::map_setting_row)
            .optional()?
            .ok_or_else(|| WpuError::NotFound(format!("setting id {id} not in version {version}")))
    }

    pub fn manual_by_id(&self, version: u32, id: u32) -> Result<ManualRow, WpuError> {
        let query = format!(
            "SELECT id, name, min, max, def, title, tooltip, unit \
             FROM handbed_v{version} WHERE id = ?1"
        );
        self.conn
            .query_row(&query, [id], |row: &Row| {
                Ok(ManualRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    min: row.get(2)?,
                    max: row.get(3)?,
                    default: row.get(4)?,
                    title: row.get(5)?,
                    tooltip: row.get(6)?,
                    unit: row.get(7)?,
                })
            })
            .optional()?
            .ok_or_else(|| WpuError::NotFound(format!("manual id {id} not in version {version}")))
    }

    fn map_setting_row(row: &Row) -> rusqlite::Result<SettingRow> {
        Ok(SettingRow {
            id: row.get(0)?,
            name: row.get(1)?,
            min: row.get(2)?,
            max: row.get(3)?,
            default: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            unit: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> SchemaStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE versiebeheer (version INTEGER PRIMARY KEY, datalabel INTEGER, \
                 parameterlist INTEGER, handbed INTEGER, counters INTEGER);
             INSERT INTO versiebeheer VALUES (5, 1, 1, 1, 1);
             CREATE TABLE datalabel_v1 (id INTEGER, name TEXT, title TEXT, tooltip TEXT, unit TEXT);
             INSERT INTO datalabel_v1 VALUES (0, 'outside_temp', 'Outside temperature', NULL, 'C');
             CREATE TABLE parameterlijst_v1 (id INTEGER, name TEXT, name_factory TEXT, min REAL, \
                 max REAL, def REAL, title TEXT, description TEXT, unit TEXT);
             INSERT INTO parameterlijst_v1 VALUES (5, 'setpoint', 'sp', 10, 90, 50, 'Setpoint', 'desc', 'C');
             ",
        )
        .unwrap();
        SchemaStore { conn }
    }

    #[test]
    fn resolve_versions_hits() {
        let store = seeded_store();
        let v = store.resolve_versions(5).unwrap();
        assert_eq!(v.datalabel, 1);
    }

    #[test]
    fn resolve_versions_miss_is_version_not_found() {
        let store = seeded_store();
        assert!(matches!(store.resolve_versions(99), Err(WpuError::VersionNotFound(99))));
    }

    #[test]
    fn datalabels_ordered() {
        let store = seeded_store();
        let rows = store.datalabels(1).unwrap();
        assert_eq!(rows[0].name, "outside_temp");
    }

    #[test]
    fn setting_by_id_range() {
        let store = seeded_store();
        let row = store.setting_by_id(1, 5).unwrap();
        assert_eq!(row.min, 10.0);
        assert_eq!(row.max, 90.0);
    }

    #[test]
    fn setting_by_id_miss_is_not_found() {
        let store = seeded_store();
        assert!(matches!(store.setting_by_id(1, 999), Err(WpuError::NotFound(_))));
    }
}
