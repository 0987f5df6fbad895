//! Keyword equality filters with automatic joins
//!
//! A filter key names either a column of the queried entity, a column of the
//! host row it hangs off (ports and urls only), or a column of the owning
//! target. Keys are resolved against fixed column tables, so nothing supplied
//! by the caller is ever spliced into SQL text.

use rusqlite::types::{ToSql, ToSqlOutput, Value};

use crate::error::{CacheError, Result};

/// Right-hand side of an equality filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    /// Matches rows where the column is NULL
    Null,
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for FilterValue {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<u16> for FilterValue {
    fn from(v: u16) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl ToSql for FilterValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Text(s) => Value::Text(s.clone()),
            Self::Integer(n) => Value::Integer(*n),
            Self::Real(f) => Value::Real(*f),
            Self::Bool(b) => Value::Integer(i64::from(*b)),
            Self::Null => Value::Null,
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// Ordered set of `key = value` conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    items: Vec<(String, FilterValue)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.items.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Filters
where
    K: Into<String>,
    V: Into<FilterValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

const TARGET_COLUMNS: &[&str] = &[
    "slug",
    "codename",
    "average_payout",
    "category",
    "organization",
    "date_updated",
    "end_date",
    "start_date",
    "is_active",
    "is_new",
    "is_registered",
    "is_updated",
    "last_submitted",
    "vulnerability_discovery",
    "workspace_access_missing",
];

const IP_COLUMNS: &[&str] = &["id", "ip", "target"];

/// `ip` is left out: on ports and urls it resolves to the host address
const PORT_COLUMNS: &[&str] = &["id", "port", "protocol", "source", "open", "service", "updated"];

const URL_COLUMNS: &[&str] = &["id", "url", "screenshot_url"];

/// Host columns reachable from ports and urls
const HOST_COLUMNS: &[&str] = &["ip", "target"];

/// Cached entity types that support keyword lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Target,
    Ip,
    Port,
    Url,
}

impl Entity {
    pub fn name(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Ip => "ip",
            Self::Port => "port",
            Self::Url => "url",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Target => "targets",
            Self::Ip => "ips",
            Self::Port => "ports",
            Self::Url => "urls",
        }
    }

    fn own_columns(self) -> &'static [&'static str] {
        match self {
            Self::Target => TARGET_COLUMNS,
            Self::Ip => IP_COLUMNS,
            Self::Port => PORT_COLUMNS,
            Self::Url => URL_COLUMNS,
        }
    }

    /// Whether rows of this entity hang off an `ips` row
    fn via_host(self) -> bool {
        matches!(self, Self::Port | Self::Url)
    }

    fn resolve(self, key: &str) -> Result<Column> {
        if let Some(col) = self.own_columns().iter().find(|c| **c == key) {
            return Ok(Column::Own(col));
        }
        if self.via_host() {
            if let Some(col) = HOST_COLUMNS.iter().find(|c| **c == key) {
                return Ok(Column::Host(col));
            }
        }
        if self != Self::Target {
            if let Some(col) = TARGET_COLUMNS.iter().find(|c| **c == key) {
                return Ok(Column::Target(col));
            }
        }
        Err(CacheError::UnknownFilter {
            entity: self.name(),
            key: key.to_string(),
        })
    }

    /// Build the FROM/WHERE part of a query for this entity
    pub(crate) fn select(self, filters: &Filters) -> Result<Selection> {
        let table = self.table();
        let mut conditions = Vec::with_capacity(filters.len());
        let mut params = Vec::with_capacity(filters.len());
        let mut join_target = false;

        for (key, value) in filters.iter() {
            let qualified = match self.resolve(key)? {
                Column::Own(col) => format!("{table}.{col}"),
                Column::Host(col) => format!("ips.{col}"),
                Column::Target(col) => {
                    join_target = true;
                    format!("targets.{col}")
                }
            };
            if *value == FilterValue::Null {
                conditions.push(format!("{qualified} IS NULL"));
            } else {
                params.push(value.clone());
                conditions.push(format!("{qualified} = ?{}", params.len()));
            }
        }

        let mut from = table.to_string();
        if self.via_host() {
            from.push_str(&format!(" JOIN ips ON ips.id = {table}.ip"));
        }
        if join_target {
            from.push_str(" JOIN targets ON targets.slug = ips.target");
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        Ok(Selection {
            table,
            from,
            clause,
            params,
        })
    }
}

enum Column {
    Own(&'static str),
    Host(&'static str),
    Target(&'static str),
}

/// Resolved query pieces; column names come only from the static tables above
#[derive(Debug)]
pub(crate) struct Selection {
    table: &'static str,
    from: String,
    clause: String,
    pub params: Vec<FilterValue>,
}

impl Selection {
    /// `SELECT` over the entity table with `columns` qualified by the caller
    pub fn query(&self, columns: &str, order_by: &str) -> String {
        format!(
            "SELECT {columns} FROM {}{} ORDER BY {order_by}",
            self.from, self.clause
        )
    }

    /// `DELETE` of the matching rows of the entity table
    pub fn delete(&self) -> String {
        if self.from == self.table {
            format!("DELETE FROM {}{}", self.table, self.clause)
        } else {
            format!(
                "DELETE FROM {table} WHERE rowid IN (SELECT {table}.rowid FROM {}{})",
                self.from,
                self.clause,
                table = self.table
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filters_select_everything() {
        let sel = Entity::Target.select(&Filters::new()).unwrap();
        assert_eq!(
            sel.query("targets.slug", "targets.rowid"),
            "SELECT targets.slug FROM targets ORDER BY targets.rowid"
        );
        assert!(sel.params.is_empty());
    }

    #[test]
    fn test_port_filters_join_through_host_to_target() {
        let filters = Filters::new()
            .eq("port", 25)
            .eq("ip", "1.2.3.4")
            .eq("codename", "SLEEPYPUPPY");
        let sel = Entity::Port.select(&filters).unwrap();
        let sql = sel.query("ports.id", "ports.id");

        assert!(sql.contains("JOIN ips ON ips.id = ports.ip"));
        assert!(sql.contains("JOIN targets ON targets.slug = ips.target"));
        assert!(sql.contains("ports.port = ?1"));
        assert!(sql.contains("ips.ip = ?2"));
        assert!(sql.contains("targets.codename = ?3"));
        assert_eq!(
            sel.params,
            vec![
                FilterValue::Integer(25),
                FilterValue::Text("1.2.3.4".into()),
                FilterValue::Text("SLEEPYPUPPY".into()),
            ]
        );
    }

    #[test]
    fn test_target_join_only_when_needed() {
        let sel = Entity::Ip.select(&Filters::new().eq("ip", "1.2.3.4")).unwrap();
        assert!(!sel.query("ips.id", "ips.id").contains("JOIN"));

        let sel = Entity::Ip.select(&Filters::new().eq("codename", "X")).unwrap();
        let sql = sel.query("ips.id", "ips.id");
        assert!(sql.contains("JOIN targets ON targets.slug = ips.target"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Entity::Url
            .select(&Filters::new().eq("colour", "red"))
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::UnknownFilter { entity: "url", ref key } if key == "colour"
        ));

        // targets do not join anything, so host columns are unknown there
        assert!(Entity::Target.select(&Filters::new().eq("ip", "1.2.3.4")).is_err());
    }

    #[test]
    fn test_null_filter() {
        let sel = Entity::Target
            .select(&Filters::new().eq("codename", None::<String>))
            .unwrap();
        assert!(sel.query("slug", "rowid").contains("targets.codename IS NULL"));
        assert!(sel.params.is_empty());
    }

    #[test]
    fn test_delete_sql() {
        let sel = Entity::Target
            .select(&Filters::new().eq("codename", "BADCAT"))
            .unwrap();
        assert_eq!(sel.delete(), "DELETE FROM targets WHERE targets.codename = ?1");
    }

    #[test]
    fn test_filters_from_pairs() {
        let filters: Filters = [("codename", "X"), ("slug", "abc")].into_iter().collect();
        assert_eq!(filters.len(), 2);
    }
}
