//! Kiosk persistence: a SQLite-backed document store.
//! One table holds every collection; document bodies are JSON and orderable
//! fields are read with `json_extract`.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{Context, Result};
use kiosk_core::{
    now_millis, Collection, Cursor, Document, Fields, KioskError, KioskResult, Record, RecordId, SortOrder, SortSpec,
    SortValue, CREATED_AT, UPDATED_AT,
};
use kiosk_source::{strip_reserved, CursorKey, DocumentStore, ListPage};
use metrics::{counter, histogram};
use rusqlite::types::Value as SqlValue;
use tracing::debug;

struct Db {
    conn: rusqlite::Connection,
    /// Last timestamp handed out; keeps stamps strictly increasing.
    clock: i64,
}

impl Db {
    fn tick(&mut self) -> i64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }
}

/// SQLite-backed store. Synchronous under the hood; calls are short and the
/// connection is serialized behind a mutex.
pub struct SqliteStore {
    db: std::sync::Mutex<Db>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("KIOSK_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = Instant::now();
        let conn = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                body       TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )
        .context("creating documents table")?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(collection, created_at, id)", [])
            .ok();
        let clock: i64 = conn
            .query_row("SELECT COALESCE(MAX(updated_at), 0) FROM documents", [], |r| r.get(0))
            .context("reading store clock")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: std::sync::Mutex::new(Db { conn, clock }) })
    }

    fn lock(&self) -> KioskResult<std::sync::MutexGuard<'_, Db>> {
        self.db.lock().map_err(|_| KioskError::Internal("sqlite connection lock poisoned".into()))
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".kiosk");
        let _ = std::fs::create_dir_all(&p);
        p.push("kiosk.db");
        return p.to_string_lossy().to_string();
    }
    "kiosk.db".to_string()
}

fn query_err(e: impl std::fmt::Display) -> KioskError { KioskError::Query(e.to_string()) }
fn mutation_err(e: impl std::fmt::Display) -> KioskError { KioskError::Mutation(e.to_string()) }

/// SQL expression yielding the sort value of `key`. Only keys registered as
/// orderable reach this point, so interpolating them is safe.
fn sort_expr(key: &str) -> String {
    match key {
        CREATED_AT => "created_at".to_string(),
        UPDATED_AT => "updated_at".to_string(),
        "id" => "id".to_string(),
        other => format!("json_extract(body, '$.{}')", other),
    }
}

fn sort_value_sql(v: &SortValue) -> SqlValue {
    match v {
        SortValue::Bool(b) => SqlValue::Integer(*b as i64),
        SortValue::Number(n) => SqlValue::Real(*n),
        SortValue::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn json_sql(v: &serde_json::Value) -> Option<SqlValue> {
    match v {
        serde_json::Value::Bool(b) => Some(SqlValue::Integer(*b as i64)),
        serde_json::Value::Number(n) => n.as_f64().map(SqlValue::Real),
        serde_json::Value::String(s) => Some(SqlValue::Text(s.clone())),
        _ => None,
    }
}

fn row_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, i64, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_document((id, created_at, updated_at, body): (String, i64, i64, String)) -> KioskResult<Document> {
    let fields: Fields = serde_json::from_str(&body).map_err(|e| query_err(format!("corrupt document {}: {}", id, e)))?;
    Ok(Document { id, created_at, updated_at, fields })
}

fn find(conn: &rusqlite::Connection, collection: Collection, id: &str) -> KioskResult<Option<Document>> {
    let mut stmt = conn
        .prepare_cached("SELECT id, created_at, updated_at, body FROM documents WHERE collection = ?1 AND id = ?2")
        .map_err(query_err)?;
    let mut rows = stmt.query((collection.name(), id)).map_err(query_err)?;
    let raw = match rows.next().map_err(query_err)? {
        Some(row) => Some(row_document(row).map_err(query_err)?),
        None => None,
    };
    raw.map(decode_document).transpose()
}

fn check_unique(
    conn: &rusqlite::Connection,
    collection: Collection,
    fields: &Fields,
    except: Option<&str>,
) -> KioskResult<()> {
    for field in collection.spec().unique {
        let Some(value) = fields.get(*field).and_then(json_sql) else { continue };
        let sql = format!(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND {} = ?2 AND id != ?3",
            sort_expr(field)
        );
        let clashes: i64 = conn
            .query_row(&sql, rusqlite::params![collection.name(), value, except.unwrap_or("")], |r| r.get(0))
            .map_err(mutation_err)?;
        if clashes > 0 {
            return Err(KioskError::Mutation(format!("{} {} must be unique", collection, field)));
        }
    }
    Ok(())
}

fn write_body(fields: &Fields) -> KioskResult<String> { serde_json::to_string(fields).map_err(mutation_err) }

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn list_page(
        &self,
        collection: Collection,
        sort: &SortSpec,
        after: Option<&Cursor>,
        limit: usize,
    ) -> KioskResult<ListPage> {
        let started = Instant::now();
        if !collection.spec().is_orderable(&sort.key) {
            return Err(KioskError::Query(format!("{} is not orderable on {}", sort.key, collection)));
        }
        let after = after.map(|c| CursorKey::decode(c, collection, sort)).transpose()?;
        let expr = sort_expr(&sort.key);
        let (cmp, dir) = match sort.order {
            SortOrder::Asc => (">", "ASC"),
            SortOrder::Desc => ("<", "DESC"),
        };
        let mut params: Vec<SqlValue> = vec![SqlValue::Text(collection.name().to_string())];
        let mut sql = format!(
            "SELECT id, created_at, updated_at, body FROM documents WHERE collection = ?1 AND {expr} IS NOT NULL"
        );
        if let Some(k) = &after {
            sql.push_str(&format!(" AND ({expr} {cmp} ?2 OR ({expr} = ?2 AND id {cmp} ?3))"));
            params.push(sort_value_sql(&k.value));
            params.push(SqlValue::Text(k.id.clone()));
        }
        sql.push_str(&format!(" ORDER BY {expr} {dir}, id {dir} LIMIT {limit}"));

        let db = self.lock()?;
        let mut stmt = db.conn.prepare(&sql).map_err(query_err)?;
        let raw = stmt
            .query_map(rusqlite::params_from_iter(params), row_document)
            .map_err(query_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err)?;
        let docs = raw.into_iter().map(decode_document).collect::<KioskResult<Vec<_>>>()?;
        let last = docs
            .last()
            .and_then(|d| d.sort_value(&sort.key).map(|sv| CursorKey::new(collection, sort, sv, &d.id).encode()));
        histogram!("persist_list_ms", started.elapsed().as_secs_f64() * 1000.0, "collection" => collection.name());
        debug!(collection = %collection, sort = %sort, returned = docs.len(), "sqlite: list_page");
        Ok(ListPage { docs, last })
    }

    async fn count(&self, collection: Collection) -> KioskResult<u64> {
        let db = self.lock()?;
        let n: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM documents WHERE collection = ?1", [collection.name()], |r| r.get(0))
            .map_err(query_err)?;
        Ok(n.max(0) as u64)
    }

    async fn get(&self, collection: Collection, id: &str) -> KioskResult<Document> {
        let db = self.lock()?;
        find(&db.conn, collection, id)?.ok_or_else(|| KioskError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> KioskResult<Document> {
        let started = Instant::now();
        let fields = strip_reserved(fields);
        let mut db = self.lock()?;
        check_unique(&db.conn, collection, &fields, None)?;
        let ts = db.tick();
        let doc = Document { id: uuid::Uuid::new_v4().simple().to_string(), created_at: ts, updated_at: ts, fields };
        db.conn
            .execute(
                "INSERT INTO documents(collection, id, created_at, updated_at, body) VALUES (?1, ?2, ?3, ?4, ?5)",
                (collection.name(), &doc.id, ts, ts, write_body(&doc.fields)?),
            )
            .map_err(mutation_err)?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64, "op" => "insert");
        Ok(doc)
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> KioskResult<Document> {
        let started = Instant::now();
        let fields = strip_reserved(fields);
        let mut db = self.lock()?;
        let mut doc = find(&db.conn, collection, id)?.ok_or_else(|| KioskError::NotFound(format!("{}/{}", collection, id)))?;
        check_unique(&db.conn, collection, &fields, Some(id))?;
        doc.fields.extend(fields);
        doc.updated_at = db.tick();
        db.conn
            .execute(
                "UPDATE documents SET updated_at = ?3, body = ?4 WHERE collection = ?1 AND id = ?2",
                (collection.name(), id, doc.updated_at, write_body(&doc.fields)?),
            )
            .map_err(mutation_err)?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64, "op" => "update");
        Ok(doc)
    }

    async fn delete(&self, collection: Collection, id: &str) -> KioskResult<RecordId> {
        let db = self.lock()?;
        let n = db
            .conn
            .execute("DELETE FROM documents WHERE collection = ?1 AND id = ?2", (collection.name(), id))
            .map_err(mutation_err)?;
        if n == 0 {
            return Err(KioskError::NotFound(format!("{}/{}", collection, id)));
        }
        counter!("persist_put_total", 1u64, "op" => "delete");
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_source::{CollectionSource, PageRequest, PagedQuerySource};
    use std::sync::Arc;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        let f = format!("kiosk-test-{}.db", uuid::Uuid::new_v4().simple());
        dir.join(f).to_string_lossy().to_string()
    }

    fn fields(v: serde_json::Value) -> Fields { v.as_object().cloned().unwrap_or_default() }

    #[tokio::test]
    async fn cursor_pages_match_sort_order() {
        let s = Arc::new(SqliteStore::open(&temp_db()).unwrap());
        for (name, price) in [("mug", 4.0), ("cap", 12.5), ("pen", 1.0), ("bag", 4.0), ("hat", 30.0)] {
            s.insert(Collection::Products, fields(serde_json::json!({ "name": name, "price": price }))).await.unwrap();
        }
        let src = CollectionSource::new(s.clone(), Collection::Products);
        let sort = SortSpec::parse("price-desc").unwrap();
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = src.fetch_page(PageRequest { cursor, page_size: 2, sort: sort.clone() }).await.unwrap();
            assert_eq!(page.total_count, 5);
            seen.extend(page.records.iter().map(|d| d.label()));
            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(&seen[..2], &["hat".to_string(), "cap".to_string()]);
        assert_eq!(seen[4], "pen");
    }

    #[tokio::test]
    async fn newest_first_by_default_and_survives_reopen() {
        let path = temp_db();
        {
            let s = SqliteStore::open(&path).unwrap();
            for name in ["a", "b", "c"] {
                s.insert(Collection::Tags, fields(serde_json::json!({ "name": name }))).await.unwrap();
            }
        }
        let s = SqliteStore::open(&path).unwrap();
        let page = s.list_page(Collection::Tags, &SortSpec::default(), None, 10).await.unwrap();
        assert_eq!(page.docs.iter().map(|d| d.label()).collect::<Vec<_>>(), vec!["c", "b", "a"]);

        // Stamps keep increasing across reopen
        let d = s.insert(Collection::Tags, fields(serde_json::json!({ "name": "d" }))).await.unwrap();
        assert!(d.created_at > page.docs[0].created_at);
    }

    #[tokio::test]
    async fn missing_sort_field_is_excluded_but_counted() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.insert(Collection::Orders, fields(serde_json::json!({ "customerName": "Ann", "total": 3 }))).await.unwrap();
        s.insert(Collection::Orders, fields(serde_json::json!({ "customerName": "Bob" }))).await.unwrap();
        let page = s.list_page(Collection::Orders, &SortSpec::parse("total-asc").unwrap(), None, 10).await.unwrap();
        assert_eq!(page.docs.len(), 1);
        assert_eq!(s.count(Collection::Orders).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn crud_round_trip_with_uniqueness() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        let a = s.insert(Collection::Categories, fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap();
        let err = s.insert(Collection::Categories, fields(serde_json::json!({ "name": "Shoes" }))).await.unwrap_err();
        assert!(matches!(err, KioskError::Mutation(_)));

        let u = s
            .update(Collection::Categories, &a.id, fields(serde_json::json!({ "name": "Shoes", "featured": true })))
            .await
            .unwrap();
        assert_eq!(u.fields["featured"], true);
        assert!(u.updated_at > a.updated_at);
        assert_eq!(s.get(Collection::Categories, &a.id).await.unwrap(), u);

        assert_eq!(s.delete(Collection::Categories, &a.id).await.unwrap(), a.id);
        assert!(matches!(s.get(Collection::Categories, &a.id).await, Err(KioskError::NotFound(_))));
        assert!(matches!(s.delete(Collection::Categories, &a.id).await, Err(KioskError::NotFound(_))));
        assert!(matches!(
            s.update(Collection::Categories, "nope", Fields::new()).await,
            Err(KioskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn foreign_cursor_is_refused() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.insert(Collection::Products, fields(serde_json::json!({ "name": "x", "price": 1 }))).await.unwrap();
        s.insert(Collection::Products, fields(serde_json::json!({ "name": "y", "price": 2 }))).await.unwrap();
        let p = s.list_page(Collection::Products, &SortSpec::parse("name-asc").unwrap(), None, 1).await.unwrap();
        let err = s
            .list_page(Collection::Products, &SortSpec::parse("price-asc").unwrap(), p.last.as_ref(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::Query(_)));
    }
}
