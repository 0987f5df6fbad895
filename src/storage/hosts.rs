//! Discovered hosts, open ports and web endpoints

use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};
use tracing::debug;

use super::Cache;
use crate::error::{CacheError, Result};
use crate::filter::{Entity, Filters};
use crate::models::{HostPorts, HostUrls, Ip, Port, Url};
use crate::records::{IpRecord, PortBatch, UrlBatch};

impl Cache {
    /// Find-or-create each `(ip, target)` pair. Returns how many were new.
    pub fn upsert_ips(&self, records: &[IpRecord]) -> Result<usize> {
        self.with_tx(|tx| {
            let mut created = 0;
            for r in records {
                let (_, is_new) = ensure_ip(tx, "ip", &r.ip, &r.target)?;
                if is_new {
                    created += 1;
                }
            }
            Ok(created)
        })
    }

    /// Record port discovery results, creating host rows as needed.
    ///
    /// Ports are keyed by `(host, port, protocol, source)`. A refresh only
    /// touches the fields present in the incoming record.
    pub fn upsert_ports(&self, batches: &[PortBatch]) -> Result<()> {
        self.with_tx(|tx| {
            for batch in batches {
                let (ip_id, _) = ensure_ip(tx, "port", &batch.ip, &batch.target)?;

                for p in &batch.ports {
                    let existing: Option<i64> = tx
                        .query_row(
                            "SELECT id FROM ports
                             WHERE ip = ?1 AND port = ?2 AND protocol = ?3 AND source = ?4",
                            params![ip_id, p.port, p.protocol, batch.source],
                            |row| row.get(0),
                        )
                        .optional()?;

                    match existing {
                        Some(id) => {
                            tx.execute(
                                "UPDATE ports SET
                                     service = COALESCE(?2, service),
                                     open = COALESCE(?3, open),
                                     updated = COALESCE(?4, updated)
                                 WHERE id = ?1",
                                params![id, p.service, p.open, p.updated],
                            )?;
                        }
                        None => {
                            tx.execute(
                                "INSERT INTO ports (ip, port, protocol, source, open, service, updated)
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                                params![
                                    ip_id,
                                    p.port,
                                    p.protocol,
                                    batch.source,
                                    p.open.unwrap_or(false),
                                    p.service.as_deref().unwrap_or(""),
                                    p.updated.unwrap_or(0),
                                ],
                            )?;
                            debug!(
                                "New port {}/{} on {} ({})",
                                p.port, p.protocol, batch.ip, batch.source
                            );
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Record web endpoints, keyed by `(host, url)`
    pub fn upsert_urls(&self, batches: &[UrlBatch]) -> Result<()> {
        self.with_tx(|tx| {
            for batch in batches {
                let (ip_id, _) = ensure_ip(tx, "url", &batch.ip, &batch.target)?;

                for u in &batch.urls {
                    let existing: Option<i64> = tx
                        .query_row(
                            "SELECT id FROM urls WHERE ip = ?1 AND url = ?2",
                            params![ip_id, u.url],
                            |row| row.get(0),
                        )
                        .optional()?;

                    match existing {
                        Some(id) => {
                            tx.execute(
                                "UPDATE urls SET screenshot_url = COALESCE(?2, screenshot_url)
                                 WHERE id = ?1",
                                params![id, u.screenshot_url],
                            )?;
                        }
                        None => {
                            tx.execute(
                                "INSERT INTO urls (ip, url, screenshot_url) VALUES (?1, ?2, ?3)",
                                params![ip_id, u.url, u.screenshot_url.as_deref().unwrap_or("")],
                            )?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    pub fn find_ips(&self, filters: &Filters) -> Result<Vec<Ip>> {
        let sel = Entity::Ip.select(filters)?;
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(&sel.query("ips.id, ips.ip, ips.target", "ips.id"))?;
            let rows = stmt
                .query_map(params_from_iter(sel.params.iter()), Ip::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Ports matching the filters, grouped by host in insertion order
    pub fn find_ports(&self, filters: &Filters) -> Result<Vec<HostPorts>> {
        let sel = Entity::Port.select(filters)?;
        let sql = sel.query(
            "ports.id, ports.ip, ports.port, ports.protocol, ports.source, ports.open, \
             ports.service, ports.updated, ips.ip, ips.target",
            "ports.ip, ports.id",
        );
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(sel.params.iter()), |row| {
                    Ok((Port::from_row(row)?, row.get::<_, String>(8)?, row.get::<_, String>(9)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut hosts: Vec<HostPorts> = Vec::new();
            for (port, ip, target) in rows {
                if let Some(h) = hosts.last_mut().filter(|h| h.ports[0].ip == port.ip) {
                    h.ports.push(port);
                    continue;
                }
                hosts.push(HostPorts {
                    ip,
                    target,
                    ports: vec![port],
                });
            }
            Ok(hosts)
        })
    }

    /// URLs matching the filters, grouped by host in insertion order
    pub fn find_urls(&self, filters: &Filters) -> Result<Vec<HostUrls>> {
        let sel = Entity::Url.select(filters)?;
        let sql = sel.query(
            "urls.id, urls.ip, urls.url, urls.screenshot_url, ips.ip, ips.target",
            "urls.ip, urls.id",
        );
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(sel.params.iter()), |row| {
                    Ok((Url::from_row(row)?, row.get::<_, String>(4)?, row.get::<_, String>(5)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut hosts: Vec<HostUrls> = Vec::new();
            for (url, ip, target) in rows {
                if let Some(h) = hosts.last_mut().filter(|h| h.urls[0].ip == url.ip) {
                    h.urls.push(url);
                    continue;
                }
                hosts.push(HostUrls {
                    ip,
                    target,
                    urls: vec![url],
                });
            }
            Ok(hosts)
        })
    }

    pub fn ips(&self) -> Result<Vec<Ip>> {
        self.find_ips(&Filters::new())
    }

    pub fn ports(&self) -> Result<Vec<HostPorts>> {
        self.find_ports(&Filters::new())
    }

    pub fn urls(&self) -> Result<Vec<HostUrls>> {
        self.find_urls(&Filters::new())
    }
}

/// Row id of the `(ip, target)` host, plus whether it was just created
fn ensure_ip(
    tx: &Transaction<'_>,
    record: &'static str,
    ip: &str,
    target: &str,
) -> Result<(i64, bool)> {
    if ip.trim().is_empty() {
        return Err(CacheError::MissingField { record, field: "ip" });
    }
    if target.trim().is_empty() {
        return Err(CacheError::MissingField {
            record,
            field: "target",
        });
    }

    let found: Option<i64> = tx
        .query_row(
            "SELECT id FROM ips WHERE ip = ?1 AND target = ?2",
            params![ip, target],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = found {
        return Ok((id, false));
    }

    tx.execute(
        "INSERT INTO ips (ip, target) VALUES (?1, ?2)",
        params![ip, target],
    )?;
    Ok((tx.last_insert_rowid(), true))
}
