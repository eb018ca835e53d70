use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

/// Offset added to schema versions stored in `PRAGMA user_version`, so that a
/// database created by some other tool (user_version = 0) is never mistaken
/// for one of ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
        }
    }

    fn from_sql(declared: &str) -> Option<&'static SqlType> {
        match declared {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            _ => None,
        }
    }
}

pub enum ForeignKeyOnChange {
    Restrict,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<&'static str>,
    pub foreign_key: Option<&'static ForeignKey>,
}

/// A table definition. Composite keys are expressed as `unique_constraints`
/// since a `Column` can only mark itself as the single primary key.
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    fn create_sql(&self) -> String {
        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    definition.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    definition.push_str(" NOT NULL");
                }
                if let Some(default_value) = column.default_value {
                    definition.push_str(&format!(" DEFAULT {}", default_value));
                }
                if let Some(foreign_key) = column.foreign_key {
                    definition.push_str(&format!(
                        " REFERENCES {}({}) ON DELETE {}",
                        foreign_key.foreign_table,
                        foreign_key.foreign_column,
                        foreign_key.on_delete.as_sql()
                    ));
                }
                definition
            })
            .collect();
        definitions.extend(
            self.unique_constraints
                .iter()
                .map(|columns| format!("UNIQUE ({})", columns.join(", "))),
        );
        format!("CREATE TABLE {} ({});", self.name, definitions.join(", "))
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])
            .with_context(|| format!("Failed to create table {}", self.name))?;
        for (index_name, column_names) in self.indices {
            self.create_index(conn, index_name, column_names)?;
        }
        Ok(())
    }

    pub fn create_index(&self, conn: &Connection, index_name: &str, columns: &str) -> Result<()> {
        conn.execute(
            &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
            params![],
        )
        .with_context(|| format!("Failed to create index {}", index_name))?;
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        struct ActualColumn {
            name: String,
            sql_type: String,
            non_null: bool,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns = stmt
            .query_map(params![], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has columns ({}), expected ({})",
                self.name,
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if SqlType::from_sql(&actual.sql_type) != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null
                || actual.is_primary_key != expected.is_primary_key
            {
                bail!(
                    "Table {} column {} constraint mismatch (non_null {} / primary key {})",
                    self.name,
                    expected.name,
                    actual.non_null,
                    actual.is_primary_key
                );
            }
        }

        for (index_name, _) in self.indices {
            let index_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2)",
                params![index_name, self.name],
                |row| row.get(0),
            )?;
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }

        let unique_column_sets = self.unique_column_sets(conn)?;
        for expected in self.unique_constraints {
            let mut expected: Vec<&str> = expected.to_vec();
            expected.sort_unstable();
            if !unique_column_sets.iter().any(|actual| *actual == expected) {
                bail!(
                    "Table {} is missing unique constraint on ({})",
                    self.name,
                    expected.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Sorted column lists of every unique index on the table.
    fn unique_column_sets(&self, conn: &Connection) -> Result<Vec<Vec<String>>> {
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let unique_indices = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(_, unique)| *unique == 1)
            .map(|(name, _)| name);

        let mut column_sets = Vec::new();
        for index_name in unique_indices {
            let mut stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut columns = stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .collect::<Result<Vec<_>, _>>()?;
            columns.sort_unstable();
            column_sets.push(columns);
        }
        Ok(column_sets)
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", (BASE_DB_VERSION + self.version) as i64)?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Reads the schema version of an existing database. Returns `None` for a
/// database that has no tables yet.
pub fn read_schema_version(conn: &Connection) -> Result<Option<usize>> {
    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    if table_count == 0 {
        return Ok(None);
    }
    let user_version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to read database version")?;
    if user_version < BASE_DB_VERSION as i64 {
        bail!(
            "Database version {} does not contain base db version {}",
            user_version,
            BASE_DB_VERSION
        );
    }
    Ok(Some(user_version as usize - BASE_DB_VERSION))
}
