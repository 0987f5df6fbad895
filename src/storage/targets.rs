//! Targets, organizations and categories

use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::Cache;
use crate::error::{CacheError, Result};
use crate::filter::{Entity, Filters};
use crate::models::{Category, Organization, Target};
use crate::records::AssessmentRecord;

/// Platform field names stamped onto their canonical columns after the
/// canonical keys have been copied, so the platform spelling wins
const PLATFORM_FIELDS: &[(&str, &str)] = &[
    ("dateUpdated", "date_updated"),
    ("isActive", "is_active"),
    ("isNew", "is_new"),
    ("isRegistered", "is_registered"),
    ("isUpdated", "is_updated"),
    ("lastSubmitted", "last_submitted"),
];

impl Cache {
    // ========================================================================
    // ORGANIZATIONS
    // ========================================================================

    /// Make sure every organization referenced by `targets` exists.
    ///
    /// Accepts both the registered-summary shape (`organization.slug`) and
    /// the listing shape (`organization_id`). Returns how many were created.
    pub fn upsert_organizations(&self, targets: &[Value]) -> Result<usize> {
        self.with_tx(|tx| {
            let mut created = 0;
            for raw in targets {
                if let Some(slug) = organization_slug(raw) {
                    if ensure_organization(tx, &slug)? {
                        created += 1;
                    }
                }
            }
            Ok(created)
        })
    }

    pub fn organizations(&self) -> Result<Vec<Organization>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("SELECT slug FROM organizations ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| Ok(Organization { slug: row.get(0)? }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ========================================================================
    // CATEGORIES
    // ========================================================================

    /// Create or refresh categories from a qualification-assessment sync
    pub fn upsert_categories(&self, categories: &[AssessmentRecord]) -> Result<()> {
        self.with_tx(|tx| {
            for c in categories {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM categories WHERE id = ?1",
                        params![c.category_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                if exists.is_some() {
                    tx.execute(
                        "UPDATE categories SET name = ?2, passed_practical = ?3, passed_written = ?4
                         WHERE id = ?1",
                        params![
                            c.category_id,
                            c.category_name,
                            c.practical_assessment.passed,
                            c.written_assessment.passed,
                        ],
                    )?;
                } else {
                    tx.execute(
                        "INSERT INTO categories (id, name, passed_practical, passed_written)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            c.category_id,
                            c.category_name,
                            c.practical_assessment.passed,
                            c.written_assessment.passed,
                        ],
                    )?;
                    debug!("Created category {} ({})", c.category_id, c.category_name);
                }
            }
            Ok(())
        })
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, name, passed_practical, passed_written FROM categories ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        passed_practical: row.get(2)?,
                        passed_written: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ========================================================================
    // TARGETS
    // ========================================================================

    /// Create or refresh targets from raw platform records.
    ///
    /// Every recognised key of the raw record is copied onto the row, then
    /// `category` is taken from `category.id`, then the platform's camelCase
    /// fields are stamped, and `extra_fields` is applied last so it wins.
    /// The whole batch is written in one transaction: a record without a
    /// category, or pointing at an unknown one, aborts it.
    pub fn upsert_targets(
        &self,
        targets: &[Value],
        extra_fields: &Map<String, Value>,
    ) -> Result<usize> {
        self.with_tx(|tx| {
            for raw in targets {
                upsert_target(tx, raw, extra_fields)?;
            }
            Ok(targets.len())
        })
    }

    /// Targets matching every filter; no filters returns all of them
    pub fn find_targets(&self, filters: &Filters) -> Result<Vec<Target>> {
        let sel = Entity::Target.select(filters)?;
        self.with_tx(|tx| {
            let columns = qualified_target_columns();
            let mut stmt = tx.prepare(&sel.query(&columns, "targets.rowid"))?;
            let rows = stmt
                .query_map(params_from_iter(sel.params.iter()), Target::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn targets(&self) -> Result<Vec<Target>> {
        self.find_targets(&Filters::new())
    }

    /// Delete matching targets. Hosts, ports and urls that referenced them
    /// are left in place.
    pub fn remove_targets(&self, filters: &Filters) -> Result<usize> {
        let sel = Entity::Target.select(filters)?;
        let removed = self.with_tx(|tx| {
            Ok(tx.execute(&sel.delete(), params_from_iter(sel.params.iter()))?)
        })?;
        info!("Removed {} target(s)", removed);
        Ok(removed)
    }
}

fn upsert_target(tx: &Transaction<'_>, raw: &Value, extra_fields: &Map<String, Value>) -> Result<()> {
    let organization = organization_slug(raw);

    let slug = raw
        .get("slug")
        .or_else(|| raw.get("id"))
        .and_then(as_text)
        .ok_or(CacheError::MissingField {
            record: "target",
            field: "slug",
        })?;
    let category = raw
        .get("category")
        .and_then(|c| c.get("id"))
        .and_then(as_int)
        .ok_or(CacheError::MissingField {
            record: "target",
            field: "category",
        })?;

    let existing = find_target(tx, &slug)?;
    let is_new = existing.is_none();
    let mut row = existing.unwrap_or_else(|| Target::new(slug.clone()));

    if let Some(fields) = raw.as_object() {
        for (key, value) in fields {
            apply_field(&mut row, key, value);
        }
    }
    row.category = Some(category);
    if organization.is_some() {
        row.organization = organization;
    }
    for (platform, canonical) in PLATFORM_FIELDS {
        if let Some(value) = raw.get(*platform) {
            apply_field(&mut row, canonical, value);
        }
    }
    for (key, value) in extra_fields {
        apply_field(&mut row, key, value);
    }

    if let Some(org) = &row.organization {
        ensure_organization(tx, org)?;
    }

    if let Some(id) = row.category {
        let known: Option<i64> = tx
            .query_row("SELECT id FROM categories WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;
        if known.is_none() {
            return Err(CacheError::UnknownCategory(id));
        }
    }

    write_target(tx, &row)?;
    debug!(
        "{} target {} ({})",
        if is_new { "Created" } else { "Refreshed" },
        row.slug,
        row.codename.as_deref().unwrap_or("?")
    );
    Ok(())
}

/// Copy one raw field onto the row. Unknown keys and values of the wrong
/// shape are skipped.
fn apply_field(row: &mut Target, key: &str, value: &Value) {
    if value.is_null() {
        if key == "codename" {
            row.codename = None;
        }
        return;
    }

    let applied = match key {
        "codename" => as_text(value).map(|v| row.codename = Some(v)),
        "average_payout" => as_float(value).map(|v| row.average_payout = v),
        "category" => value
            .get("id")
            .or(Some(value))
            .and_then(as_int)
            .map(|v| row.category = Some(v)),
        "organization" => value
            .get("slug")
            .or(Some(value))
            .and_then(as_text)
            .map(|v| row.organization = Some(v)),
        "date_updated" => as_int(value).map(|v| row.date_updated = v),
        "end_date" => as_int(value).map(|v| row.end_date = v),
        "start_date" => as_int(value).map(|v| row.start_date = v),
        "last_submitted" => as_int(value).map(|v| row.last_submitted = v),
        "is_active" => as_bool(value).map(|v| row.is_active = v),
        "is_new" => as_bool(value).map(|v| row.is_new = v),
        "is_registered" => as_bool(value).map(|v| row.is_registered = v),
        "is_updated" => as_bool(value).map(|v| row.is_updated = v),
        "vulnerability_discovery" => as_bool(value).map(|v| row.vulnerability_discovery = v),
        "workspace_access_missing" => as_bool(value).map(|v| row.workspace_access_missing = v),
        _ => return,
    };

    if applied.is_none() {
        warn!("Ignoring {} = {} on target {}", key, value, row.slug);
    }
}

fn write_target(tx: &Transaction<'_>, t: &Target) -> Result<()> {
    tx.execute(
        "INSERT INTO targets (slug, codename, average_payout, category, organization,
             date_updated, end_date, start_date, is_active, is_new, is_registered, is_updated,
             last_submitted, vulnerability_discovery, workspace_access_missing)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(slug) DO UPDATE SET
             codename = excluded.codename,
             average_payout = excluded.average_payout,
             category = excluded.category,
             organization = excluded.organization,
             date_updated = excluded.date_updated,
             end_date = excluded.end_date,
             start_date = excluded.start_date,
             is_active = excluded.is_active,
             is_new = excluded.is_new,
             is_registered = excluded.is_registered,
             is_updated = excluded.is_updated,
             last_submitted = excluded.last_submitted,
             vulnerability_discovery = excluded.vulnerability_discovery,
             workspace_access_missing = excluded.workspace_access_missing",
        params![
            t.slug,
            t.codename,
            t.average_payout,
            t.category,
            t.organization,
            t.date_updated,
            t.end_date,
            t.start_date,
            t.is_active,
            t.is_new,
            t.is_registered,
            t.is_updated,
            t.last_submitted,
            t.vulnerability_discovery,
            t.workspace_access_missing,
        ],
    )?;
    Ok(())
}

fn find_target(tx: &Transaction<'_>, slug: &str) -> Result<Option<Target>> {
    let sql = format!("SELECT {} FROM targets WHERE slug = ?1", Target::COLUMNS);
    Ok(tx
        .query_row(&sql, params![slug], Target::from_row)
        .optional()?)
}

fn qualified_target_columns() -> String {
    Target::COLUMNS
        .split(',')
        .map(|c| format!("targets.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Returns true when the organization row had to be created
fn ensure_organization(tx: &Transaction<'_>, slug: &str) -> Result<bool> {
    let found: Option<String> = tx
        .query_row(
            "SELECT slug FROM organizations WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )
        .optional()?;
    if found.is_some() {
        return Ok(false);
    }
    tx.execute("INSERT INTO organizations (slug) VALUES (?1)", params![slug])?;
    debug!("Created organization {}", slug);
    Ok(true)
}

fn organization_slug(raw: &Value) -> Option<String> {
    match raw.get("organization") {
        Some(Value::Object(org)) => org.get("slug"),
        Some(flat @ Value::String(_)) => Some(flat),
        _ => None,
    }
    .or_else(|| raw.get("organization_id"))
    .and_then(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
