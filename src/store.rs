use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, ErrorCode};
use tracing::{debug, warn};

pub const SEARCH_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkElement {
    pub name: String,
    pub ip: String,
}

/// Outcome of a bulk import: how many rows landed and which duplicate
/// names were skipped.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub inserted: usize,
    pub skipped: Vec<String>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("failed to open database {}", path.as_ref().display()))?;
        Ok(Self { conn })
    }

    /// Substring lookup on the element name, ascending, capped at
    /// [`SEARCH_LIMIT`] rows. An empty term matches nothing rather than
    /// everything.
    pub fn search(&self, term: &str) -> Result<Vec<NetworkElement>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        // escape LIKE wildcards so the term matches as a literal substring
        let pattern = format!("%{}%", escape_like(term));
        let mut stmt = self.conn.prepare(
            "SELECT name, ip FROM network_elements \
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, SEARCH_LIMIT as i64], |row| {
            Ok(NetworkElement {
                name: row.get(0)?,
                ip: row.get(1)?,
            })
        })?;

        let mut elements = Vec::new();
        for row in rows {
            elements.push(row?);
        }
        debug!(term, hits = elements.len(), "search");
        Ok(elements)
    }

    /// Rebuilds the database from a `name, ip` text list. The first line is
    /// a header and is skipped; rows whose name is already present are
    /// skipped and reported, never overwritten.
    pub fn build_from_text<P: AsRef<Path>, Q: AsRef<Path>>(
        db_path: P,
        list_path: Q,
    ) -> Result<ImportReport> {
        let list_path = list_path.as_ref();
        if !list_path.is_file() {
            bail!("list file not found: {}", list_path.display());
        }

        let db_path = db_path.as_ref();
        if db_path.exists() {
            fs::remove_file(db_path).with_context(|| {
                format!("failed to remove old database {}", db_path.display())
            })?;
        }

        let mut conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE network_elements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                ip TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX idx_name ON network_elements (name)", [])?;

        let file = fs::File::open(list_path)?;
        let mut report = ImportReport::default();

        let tx = conn.transaction()?;
        {
            let mut insert =
                tx.prepare("INSERT INTO network_elements (name, ip) VALUES (?1, ?2)")?;
            for line in BufReader::new(file).lines().skip(1) {
                let line = line?;
                let Some((name, ip)) = line.split_once(',') else {
                    continue;
                };
                let (name, ip) = (name.trim(), ip.trim());
                if name.is_empty() || ip.is_empty() {
                    continue;
                }
                match insert.execute(params![name, ip]) {
                    Ok(_) => report.inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        warn!(name, "duplicate element name, skipping");
                        report.skipped.push(name.to_string());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;

        Ok(report)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(lines: &str) -> (tempfile::TempDir, Store, ImportReport) {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, lines).unwrap();
        let db = dir.path().join("ne.db");
        let report = Store::build_from_text(&db, &list).unwrap();
        let store = Store::open(&db).unwrap();
        (dir, store, report)
    }

    #[test]
    fn import_skips_header_and_duplicates() {
        let (_dir, store, report) = build("name, ip\nA,1.1.1.1\nB,2.2.2.2\nA,3.3.3.3\n");

        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, vec!["A".to_string()]);
        assert_eq!(
            store.search("A").unwrap(),
            vec![NetworkElement {
                name: "A".into(),
                ip: "1.1.1.1".into(),
            }]
        );
    }

    #[test]
    fn import_ignores_malformed_lines() {
        let (_dir, store, report) =
            build("name, ip\nno-comma-here\n, 1.2.3.4\nC ,\n D , 4.4.4.4 \n");

        assert_eq!(report.inserted, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(
            store.search("D").unwrap(),
            vec![NetworkElement {
                name: "D".into(),
                ip: "4.4.4.4".into(),
            }]
        );
    }

    #[test]
    fn import_fails_without_list() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(Store::build_from_text(dir.path().join("ne.db"), &missing).is_err());
    }

    #[test]
    fn import_replaces_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        let db = dir.path().join("ne.db");

        fs::write(&list, "name, ip\nOLD,1.1.1.1\n").unwrap();
        Store::build_from_text(&db, &list).unwrap();

        fs::write(&list, "name, ip\nNEW,2.2.2.2\n").unwrap();
        Store::build_from_text(&db, &list).unwrap();

        let store = Store::open(&db).unwrap();
        assert!(store.search("OLD").unwrap().is_empty());
        assert_eq!(store.search("NEW").unwrap().len(), 1);
    }

    #[test]
    fn search_is_substring_ordered_and_capped() {
        let mut lines = String::from("name, ip\nother,9.9.9.9\n");
        for i in 0..120 {
            lines.push_str(&format!("edge-{i:03},10.0.0.{i}\n"));
        }
        let (_dir, store, report) = build(&lines);
        assert_eq!(report.inserted, 121);

        let hits = store.search("edge").unwrap();
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert!(hits.iter().all(|e| e.name.contains("edge")));
        let mut sorted = hits.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(hits, sorted);
        assert_eq!(hits[0].name, "edge-000");

        assert_eq!(store.search("dge-00").unwrap().len(), 10);
    }

    #[test]
    fn search_empty_term_returns_nothing() {
        let (_dir, store, _) = build("name, ip\nA,1.1.1.1\n");
        assert!(store.search("").unwrap().is_empty());
        assert!(store.search("   ").unwrap().is_empty());
    }

    #[test]
    fn search_escapes_like_wildcards() {
        let (_dir, store, _) = build("name, ip\na%b,1.1.1.1\naxb,2.2.2.2\na_b,3.3.3.3\n");

        let hits = store.search("a%b").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "a%b");

        let hits = store.search("a_b").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "a_b");
    }
}
