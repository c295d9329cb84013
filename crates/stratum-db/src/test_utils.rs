use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde_json::{Number, Value};

use crate::{
    connection::{open_in_memory, SharedConnection},
    error::Result,
    executor::{QueryExecutor, SqliteExecutor},
    expr::{Col, Operator},
    helpers::Row,
    query::{InsertQuery, Query},
    repository::Repository,
    traits::Predicates,
    transform::FieldTransform,
};

crate::define_entity!(
    pub Member {
        table: "members",
        soft_delete: "deleted_at",
        timestamps: true,
        transform_key: "k1",
        fields: {
            id: Integer,
            name: Text,
            ssn: Text [nullable, transformed],
            age: Integer [nullable],
            score: Real [nullable],
            active: Boolean [nullable],
            tags: Json [nullable],
            created_at: Timestamp [nullable],
            updated_at: Timestamp [nullable],
            deleted_at: Timestamp [nullable],
        }
    }
);

crate::define_entity!(
    pub Note {
        table: "notes",
        fields: {
            id: Integer,
            title: Text,
            body: Text [nullable],
        }
    }
);

crate::define_entity!(
    pub Token {
        table: "tokens",
        primary_key: "code",
        fields: {
            code: Text,
            label: Text [nullable],
        }
    }
);

pub fn member_transform() -> Arc<FieldTransform> {
    Arc::new(FieldTransform::new(["ssn"], "k1").unwrap())
}

pub fn setup_db() -> SharedConnection {
    let db = open_in_memory().unwrap();
    db.lock()
        .unwrap()
        .execute_batch(
            "CREATE TABLE members (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ssn TEXT,
                age INTEGER,
                score REAL,
                active INTEGER,
                tags TEXT,
                created_at TEXT,
                updated_at TEXT,
                deleted_at TEXT
            );
            CREATE TABLE notes (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT
            );
            CREATE TABLE tokens (
                code TEXT PRIMARY KEY,
                label TEXT
            );",
        )
        .unwrap();
    db
}

pub fn member_repo(db: &SharedConnection) -> Repository<Member> {
    Repository::new(SqliteExecutor::new(db.clone())).unwrap()
}

pub fn note_repo(db: &SharedConnection) -> Repository<Note> {
    Repository::new(SqliteExecutor::new(db.clone())).unwrap()
}

/// The raw stored row, bypassing the repository.
pub fn raw_row(db: &SharedConnection, table: &'static str, id: i64) -> Option<Row> {
    let mut query = Query::from(table);
    query.where_cmp(Col::new("id").unwrap(), Operator::Eq, Value::from(id));
    SqliteExecutor::new(db.clone()).first(query).unwrap()
}

/// Delegates to a [`SqliteExecutor`] and counts every call.
pub struct CountingExecutor {
    inner: SqliteExecutor,
    calls: AtomicUsize,
}

impl CountingExecutor {
    pub fn new(db: &SharedConnection) -> Self {
        Self {
            inner: SqliteExecutor::new(db.clone()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl QueryExecutor for CountingExecutor {
    fn get(&self, query: &Query) -> Result<Vec<Row>> {
        self.tick();
        self.inner.get(query)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        self.tick();
        self.inner.count(query)
    }

    fn sum(&self, query: &Query, column: &Col) -> Result<Number> {
        self.tick();
        self.inner.sum(query, column)
    }

    fn insert(&self, query: &InsertQuery) -> Result<Option<i64>> {
        self.tick();
        self.inner.insert(query)
    }

    fn update(&self, query: &Query, patch: &Row) -> Result<u64> {
        self.tick();
        self.inner.update(query, patch)
    }

    fn delete(&self, query: &Query) -> Result<u64> {
        self.tick();
        self.inner.delete(query)
    }
}
