use serde_json::Value;
use tracing::{debug, info, warn};

use super::Repository;
use crate::{
    entity::{Entity, FieldKind, CREATED_AT, UPDATED_AT},
    error::{DbError, Result},
    executor::QueryExecutor,
    expr::Operator,
    filter::Filter,
    helpers::{is_truthy, Row},
    query::{InsertQuery, Query},
    record::{now_timestamp, Record},
    traits::Predicates,
};

impl<E: Entity, X: QueryExecutor> Repository<E, X> {
    /// Inserts or updates one row and returns its caller-facing mapping.
    ///
    /// A truthy primary key in `data` selects the update path unless
    /// `force_insert` is set: the live row is loaded, `data` is assigned over
    /// it and only changed columns are written. If no such row exists an
    /// empty map is returned. Otherwise a new row is inserted with every
    /// given column; a truthy primary key is kept, a falsy one is dropped so
    /// storage assigns the key.
    pub fn save_data(&self, mut data: Row, force_insert: bool) -> Result<Row> {
        let id = data
            .get(E::PRIMARY_KEY)
            .filter(|id| is_truthy(id))
            .cloned();

        match id {
            Some(id) if !force_insert => {
                data.remove(E::PRIMARY_KEY);
                let Some(row) = self.executor.find(self.base_query(), &self.primary_key, &id)? else {
                    warn!(table = E::TABLE, id = %id, "update target not found");
                    return Ok(Row::new());
                };

                let mut record = Record::<E>::from_row(row, self.transform.clone());
                record.fill(data)?;
                self.persist_update(&mut record, &id)?;
                self.forget(&id)?;
                record.to_map()
            }
            _ => {
                if data.get(E::PRIMARY_KEY).is_some_and(|id| !is_truthy(id)) {
                    data.remove(E::PRIMARY_KEY);
                }
                let mut record = self.new_record();
                record.fill(data)?;
                self.persist_insert(&mut record)?;
                if let Some(id) = record.key().cloned() {
                    self.forget(&id)?;
                }
                record.to_map()
            }
        }
    }

    /// Inserts `rows` in one statement. Values are written as given: no
    /// casts, no transform, no timestamps.
    pub fn save_many_data(&self, rows: &[Row]) -> Result<bool> {
        if rows.is_empty() {
            debug!(table = E::TABLE, "nothing to insert");
            return Ok(true);
        }
        let query = InsertQuery::rows(E::TABLE, rows)?;
        self.executor.insert(&query)?;
        info!(table = E::TABLE, rows = rows.len(), "bulk insert");
        Ok(true)
    }

    /// Assigns `data` to the first live row matching `filter` and writes the
    /// changed columns. Returns the updated mapping, or an empty map when
    /// nothing matches.
    pub fn update_one_by(&self, filter: &Filter, data: Row) -> Result<Row> {
        let Some(row) = self.executor.first(self.filtered(self.base_query(), filter)?)? else {
            warn!(table = E::TABLE, "no row matched for update");
            return Ok(Row::new());
        };

        let mut record = Record::<E>::from_row(row, self.transform.clone());
        let id = record.key().cloned().ok_or_else(|| {
            DbError::configuration(E::TABLE, "matched row has no primary key value")
        })?;
        record.fill(data)?;
        self.persist_update(&mut record, &id)?;
        self.forget(&id)?;
        record.to_map()
    }

    /// Applies `data` to every live row matching `filter` in one statement.
    /// Transformed columns are encoded and `updated_at` is set when the
    /// entity keeps timestamps. Returns the number of rows changed.
    ///
    /// Cached rows are not evicted.
    pub fn update_by(&self, filter: &Filter, data: Row) -> Result<u64> {
        let mut scratch = self.new_record();
        scratch.fill(data)?;
        let mut patch = scratch.attributes().clone();
        if patch.is_empty() {
            debug!(table = E::TABLE, "empty patch");
            return Ok(0);
        }
        if E::TIMESTAMPS && !patch.contains_key(UPDATED_AT) {
            patch.insert(UPDATED_AT.to_string(), Value::String(now_timestamp()));
        }

        let changed = self.executor.update(&self.filtered(self.base_query(), filter)?, &patch)?;
        info!(table = E::TABLE, changed, "bulk update");
        Ok(changed)
    }

    /// Permanently removes the rows with the given primary keys, trashed or
    /// not.
    pub fn delete_by_ids<I, V>(&self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            warn!(table = E::TABLE, "delete_by_ids called without ids");
            return Ok(0);
        }

        let mut query = Query::from(E::TABLE);
        query.where_in(self.primary_key.clone(), ids.clone());
        let deleted = self.executor.delete(&query)?;
        for id in &ids {
            self.forget(id)?;
        }
        info!(table = E::TABLE, deleted, "deleted by id");
        Ok(deleted)
    }

    /// Permanently removes every row matching `filter`, trashed or not. An
    /// empty filter deletes nothing.
    pub fn delete_by_where(&self, filter: &Filter) -> Result<u64> {
        if filter.is_empty() {
            warn!(table = E::TABLE, "refusing to delete without conditions");
            return Ok(0);
        }
        let deleted = self.executor.delete(&self.filtered(Query::from(E::TABLE), filter)?)?;
        info!(table = E::TABLE, deleted, "deleted by filter");
        Ok(deleted)
    }

    /// Clears the soft-delete column on trashed rows matching `filter`.
    /// Returns the number restored. An empty filter restores nothing.
    pub fn soft_delete_restore_by_where(&self, filter: &Filter) -> Result<u64> {
        if filter.is_empty() {
            warn!(table = E::TABLE, "refusing to restore without conditions");
            return Ok(0);
        }
        let column = self.soft_delete_column()?;
        let query = self.filtered(self.base_query().only_trashed(), filter)?;
        let restored = self.executor.restore(query, column)?;
        info!(table = E::TABLE, restored, "restored");
        Ok(restored)
    }

    /// Marks the live rows with the given primary keys as deleted.
    pub fn soft_delete_by_ids<I, V>(&self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            warn!(table = E::TABLE, "soft_delete_by_ids called without ids");
            return Ok(0);
        }
        self.soft_delete_column()?;

        let mut query = self.base_query();
        query.where_in(self.primary_key.clone(), ids.clone());
        let trashed = self.executor.update(&query, &self.trash_patch()?)?;
        for id in &ids {
            self.forget(id)?;
        }
        info!(table = E::TABLE, trashed, "soft deleted by id");
        Ok(trashed)
    }

    /// Marks the live rows matching `filter` as deleted. An empty filter
    /// trashes nothing.
    pub fn soft_delete_by_where(&self, filter: &Filter) -> Result<u64> {
        if filter.is_empty() {
            warn!(table = E::TABLE, "refusing to soft delete without conditions");
            return Ok(0);
        }
        self.soft_delete_column()?;

        let query = self.filtered(self.base_query(), filter)?;
        let trashed = self.executor.update(&query, &self.trash_patch()?)?;
        info!(table = E::TABLE, trashed, "soft deleted by filter");
        Ok(trashed)
    }

    fn trash_patch(&self) -> Result<Row> {
        let column = self.soft_delete_column()?;
        let now = Value::String(now_timestamp());
        let mut patch = Row::new();
        patch.insert(column.name().to_string(), now.clone());
        if E::TIMESTAMPS {
            patch.insert(UPDATED_AT.to_string(), now);
        }
        Ok(patch)
    }

    fn persist_update(&self, record: &mut Record<E>, id: &Value) -> Result<()> {
        if !record.is_dirty() {
            debug!(table = E::TABLE, id = %id, "no changes");
            return Ok(());
        }
        if E::TIMESTAMPS && !record.dirty().contains_key(UPDATED_AT) {
            record.set_raw(UPDATED_AT, Value::String(now_timestamp()));
        }

        let dirty = record.dirty();
        let mut query = Query::from(E::TABLE);
        query.where_cmp(self.primary_key.clone(), Operator::Eq, id.clone());
        self.executor.update(&query, &dirty)?;
        record.mark_persisted();

        info!(table = E::TABLE, id = %id, columns = dirty.len(), "updated");
        Ok(())
    }

    fn persist_insert(&self, record: &mut Record<E>) -> Result<()> {
        if E::TIMESTAMPS {
            let now = now_timestamp();
            for column in [CREATED_AT, UPDATED_AT] {
                if record.get_raw(column).is_none_or(Value::is_null) {
                    record.set_raw(column, Value::String(now.clone()));
                }
            }
        }

        let query = InsertQuery::rows(E::TABLE, std::slice::from_ref(record.attributes()))?;
        let rowid = self.executor.insert(&query)?;

        let integer_key = E::field(E::PRIMARY_KEY).is_some_and(|f| f.kind == FieldKind::Integer);
        if record.key().is_none() && integer_key {
            if let Some(rowid) = rowid {
                record.set_raw(E::PRIMARY_KEY, Value::from(rowid));
            }
        }
        record.mark_persisted();

        info!(table = E::TABLE, id = ?record.key(), "inserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        cache::MemoryCache,
        executor::SqliteExecutor,
        filter::Condition,
        repository::Columns,
        test_utils::{
            member_repo, note_repo, raw_row, setup_db, CountingExecutor, Member, Note, Token,
        },
        helpers::row_from_json,
        transform,
    };

    fn counting_members(db: &crate::connection::SharedConnection) -> Repository<Member, CountingExecutor> {
        Repository::new(CountingExecutor::new(db)).unwrap()
    }

    #[test]
    fn test_insert_encodes_and_returns_plaintext() {
        let db = setup_db();
        let repo = member_repo(&db);

        let saved = repo
            .save_data(
                row_from_json(json!({"name": "ann", "ssn": "123-45-6789", "active": true})),
                false,
            )
            .unwrap();
        assert_eq!(saved["id"], json!(1));
        assert_eq!(saved["name"], json!("ann"));
        assert_eq!(saved["ssn"], json!("123-45-6789"));
        assert_eq!(saved["active"], json!(true));
        assert!(saved["created_at"].is_string());
        assert_eq!(saved["created_at"], saved["updated_at"]);

        let stored = raw_row(&db, "members", 1).unwrap();
        assert_eq!(stored["ssn"], json!(transform::encode("123-45-6789", "k1")));
        assert_ne!(stored["ssn"], json!("123-45-6789"));
        assert_eq!(stored["name"], json!("ann"));
        assert_eq!(stored["active"], json!(1));
    }

    #[test]
    fn test_update_writes_only_changed_columns() {
        let db = setup_db();
        let repo = member_repo(&db);
        repo.save_data(row_from_json(json!({"name": "ann", "ssn": "1", "age": 30})), false)
            .unwrap();
        db.lock()
            .unwrap()
            .execute("UPDATE members SET age = 99 WHERE id = 1", [])
            .unwrap();

        let updated = repo
            .save_data(row_from_json(json!({"id": 1, "name": "anne"})), false)
            .unwrap();
        assert_eq!(updated["name"], json!("anne"));
        assert_eq!(updated["age"], json!(99));
        assert_eq!(updated["ssn"], json!("1"));

        let stored = raw_row(&db, "members", 1).unwrap();
        assert_eq!(stored["name"], json!("anne"));
        assert_eq!(stored["age"], json!(99));
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 1);
    }

    #[test]
    fn test_update_of_missing_row_is_empty() {
        let db = setup_db();
        let repo = member_repo(&db);
        let result = repo
            .save_data(row_from_json(json!({"id": 7, "name": "ghost"})), false)
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 0);
    }

    #[test]
    fn test_force_insert_keeps_given_key() {
        let db = setup_db();
        let repo = note_repo(&db);
        let saved = repo
            .save_data(row_from_json(json!({"id": 5, "title": "five"})), true)
            .unwrap();
        assert_eq!(saved["id"], json!(5));
        assert_eq!(raw_row(&db, "notes", 5).unwrap()["title"], json!("five"));

        let next = repo
            .save_data(row_from_json(json!({"title": "six"})), false)
            .unwrap();
        assert_eq!(next["id"], json!(6));
    }

    #[test]
    fn test_falsy_key_inserts() {
        let db = setup_db();
        let repo = note_repo(&db);
        for (expected, id) in [json!(0), json!(""), json!("0"), Value::Null]
            .into_iter()
            .enumerate()
        {
            let saved = repo
                .save_data(row_from_json(json!({"id": id, "title": "t"})), false)
                .unwrap();
            assert_eq!(saved["id"], json!(expected + 1));
        }
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 4);
    }

    #[test]
    fn test_text_key_is_not_replaced_by_rowid() {
        let db = setup_db();
        let repo: Repository<Token> = Repository::new(SqliteExecutor::new(db.clone())).unwrap();
        let saved = repo
            .save_data(row_from_json(json!({"code": "abc", "label": "x"})), true)
            .unwrap();
        assert_eq!(saved["code"], json!("abc"));

        let updated = repo
            .save_data(row_from_json(json!({"code": "abc", "label": "y"})), false)
            .unwrap();
        assert_eq!(updated["label"], json!("y"));
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let db = setup_db();
        let repo = note_repo(&db);
        let err = repo
            .save_data(row_from_json(json!({"title": "t", "nope": 1})), false)
            .unwrap_err();
        assert!(matches!(err, DbError::UnknownColumn { .. }));
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 0);
    }

    #[test]
    fn test_save_many_data_is_raw() {
        let db = setup_db();
        let repo = member_repo(&db);
        let rows = vec![
            row_from_json(json!({"name": "a", "ssn": "plain"})),
            row_from_json(json!({"name": "b"})),
        ];
        assert!(repo.save_many_data(&rows).unwrap());
        assert!(repo.save_many_data(&[]).unwrap());

        let stored = raw_row(&db, "members", 1).unwrap();
        assert_eq!(stored["ssn"], json!("plain"));
        assert_eq!(stored["created_at"], Value::Null);
        assert_eq!(raw_row(&db, "members", 2).unwrap()["ssn"], Value::Null);
    }

    #[test]
    fn test_update_one_by() {
        let db = setup_db();
        let repo = member_repo(&db);
        repo.save_data(row_from_json(json!({"name": "ann", "age": 30})), false)
            .unwrap();
        repo.save_data(row_from_json(json!({"name": "bob", "age": 40})), false)
            .unwrap();

        let updated = repo
            .update_one_by(
                &Filter::new().with("name", Condition::eq("bob")),
                row_from_json(json!({"ssn": "999"})),
            )
            .unwrap();
        assert_eq!(updated["id"], json!(2));
        assert_eq!(updated["ssn"], json!("999"));
        assert_eq!(
            raw_row(&db, "members", 2).unwrap()["ssn"],
            json!(transform::encode("999", "k1"))
        );

        let none = repo
            .update_one_by(
                &Filter::new().with("name", Condition::eq("zed")),
                row_from_json(json!({"age": 1})),
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_update_by_encodes_and_touches_updated_at() {
        let db = setup_db();
        let repo = member_repo(&db);
        for name in ["a", "b", "c"] {
            repo.save_data(row_from_json(json!({"name": name, "age": 20})), false)
                .unwrap();
        }
        db.lock()
            .unwrap()
            .execute("UPDATE members SET updated_at = '2000-01-01 00:00:00'", [])
            .unwrap();

        let changed = repo
            .update_by(
                &Filter::new().with("name", Condition::is_in(["a", "b"])),
                row_from_json(json!({"ssn": "s", "age": 21})),
            )
            .unwrap();
        assert_eq!(changed, 2);

        let stored = raw_row(&db, "members", 1).unwrap();
        assert_eq!(stored["ssn"], json!(transform::encode("s", "k1")));
        assert_eq!(stored["age"], json!(21));
        assert_ne!(stored["updated_at"], json!("2000-01-01 00:00:00"));
        assert_eq!(
            raw_row(&db, "members", 3).unwrap()["updated_at"],
            json!("2000-01-01 00:00:00")
        );

        assert_eq!(repo.update_by(&Filter::new(), Row::new()).unwrap(), 0);
    }

    #[test]
    fn test_empty_input_guards_skip_the_executor() {
        let db = setup_db();
        let repo = counting_members(&db);

        assert_eq!(repo.delete_by_ids(Vec::<i64>::new()).unwrap(), 0);
        assert_eq!(repo.delete_by_where(&Filter::new()).unwrap(), 0);
        assert_eq!(repo.soft_delete_restore_by_where(&Filter::new()).unwrap(), 0);
        assert_eq!(repo.soft_delete_by_ids(Vec::<i64>::new()).unwrap(), 0);
        assert_eq!(repo.soft_delete_by_where(&Filter::new()).unwrap(), 0);
        assert_eq!(repo.executor().calls(), 0);

        let notes: Repository<Note, CountingExecutor> =
            Repository::new(CountingExecutor::new(&db)).unwrap();
        assert_eq!(notes.soft_delete_restore_by_where(&Filter::new()).unwrap(), 0);
        assert_eq!(notes.soft_delete_by_ids(Vec::<i64>::new()).unwrap(), 0);
        assert_eq!(notes.soft_delete_by_where(&Filter::new()).unwrap(), 0);
        assert_eq!(notes.executor().calls(), 0);
    }

    #[test]
    fn test_misspelled_filter_column_deletes_nothing() {
        let db = setup_db();
        let repo = member_repo(&db);
        for name in ["a", "b", "c"] {
            repo.save_data(row_from_json(json!({"name": name})), false)
                .unwrap();
        }

        let filter = Filter::from_json(&json!({"nmae": ["not_in", ["a"]]})).unwrap();
        assert!(matches!(
            repo.delete_by_where(&filter),
            Err(DbError::UnknownColumn { ref column, .. }) if column == "nmae"
        ));
        assert!(matches!(
            repo.soft_delete_by_where(&filter),
            Err(DbError::UnknownColumn { .. })
        ));
        assert!(matches!(
            repo.update_by(&filter, row_from_json(json!({"age": 1}))),
            Err(DbError::UnknownColumn { .. })
        ));
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 3);
    }

    #[test]
    fn test_delete_by_ids_and_where() {
        let db = setup_db();
        let repo = member_repo(&db);
        for name in ["a", "b", "c", "d"] {
            repo.save_data(row_from_json(json!({"name": name})), false)
                .unwrap();
        }
        repo.soft_delete_by_ids([4]).unwrap();

        assert_eq!(repo.delete_by_ids([1, 2, 99]).unwrap(), 2);
        assert_eq!(
            repo.delete_by_where(&Filter::new().with("name", Condition::eq("d")))
                .unwrap(),
            1
        );
        assert_eq!(
            repo.get_list_with_trashed(&Filter::new(), &Columns::from(["name"]), 0, 0, &[], false)
                .unwrap()
                .list,
            vec![row_from_json(json!({"name": "c"}))]
        );
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let db = setup_db();
        let repo = member_repo(&db);
        for name in ["a", "b", "c"] {
            repo.save_data(row_from_json(json!({"name": name})), false)
                .unwrap();
        }

        assert_eq!(repo.soft_delete_by_ids([1]).unwrap(), 1);
        assert_eq!(repo.soft_delete_by_ids([1]).unwrap(), 0);
        assert_eq!(
            repo.soft_delete_by_where(&Filter::new().with("name", Condition::eq("b")))
                .unwrap(),
            1
        );
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 1);
        assert!(raw_row(&db, "members", 1).unwrap()["deleted_at"].is_string());

        let restore_a = Filter::new().with("name", Condition::is_in(["a", "c"]));
        assert_eq!(repo.soft_delete_restore_by_where(&restore_a).unwrap(), 1);
        assert_eq!(raw_row(&db, "members", 1).unwrap()["deleted_at"], Value::Null);
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 2);
    }

    #[test]
    fn test_restore_keeps_or_inside_trashed_scope() {
        let db = setup_db();
        let repo = member_repo(&db);
        for (name, age) in [("a", 1), ("b", 2), ("c", 3)] {
            repo.save_data(row_from_json(json!({"name": name, "age": age})), false)
                .unwrap();
        }
        repo.soft_delete_by_ids([1]).unwrap();

        let filter = Filter::new()
            .with("name", Condition::eq("c"))
            .with("age", Condition::or(Operator::Eq, 1));
        assert_eq!(repo.soft_delete_restore_by_where(&filter).unwrap(), 1);
        assert_eq!(repo.get_count(&Filter::new()).unwrap(), 3);
    }

    #[test]
    fn test_soft_delete_unsupported() {
        let db = setup_db();
        let repo = note_repo(&db);
        let filter = Filter::new().with("id", Condition::eq(1));

        assert!(matches!(
            repo.soft_delete_by_ids([1]),
            Err(DbError::SoftDeleteUnsupported(_))
        ));
        assert!(matches!(
            repo.soft_delete_by_where(&filter),
            Err(DbError::SoftDeleteUnsupported(_))
        ));
        assert!(matches!(
            repo.soft_delete_restore_by_where(&filter),
            Err(DbError::SoftDeleteUnsupported(_))
        ));
    }

    #[test]
    fn test_writes_evict_cached_rows() {
        let db = setup_db();
        let cache = std::sync::Arc::new(MemoryCache::new());
        let repo = member_repo(&db).with_cache(cache.clone());
        repo.save_data(row_from_json(json!({"name": "a"})), false)
            .unwrap();
        repo.save_data(row_from_json(json!({"name": "b"})), false)
            .unwrap();

        repo.find(1, &Columns::All, true).unwrap();
        repo.find(2, &Columns::All, true).unwrap();
        assert_eq!(cache.len(), 2);

        repo.save_data(row_from_json(json!({"id": 1, "name": "a2"})), false)
            .unwrap();
        assert!(!cache.contains("members", &json!(1)));
        assert_eq!(repo.find(1, &Columns::All, true).unwrap()["name"], json!("a2"));

        repo.soft_delete_by_ids([2]).unwrap();
        assert!(!cache.contains("members", &json!(2)));
        assert!(repo.find(2, &Columns::All, true).unwrap().is_empty());
    }

    #[test]
    fn test_notes_have_no_timestamps() {
        let db = setup_db();
        let saved = note_repo(&db)
            .save_data(row_from_json(json!({"title": "t"})), false)
            .unwrap();
        assert_eq!(saved, row_from_json(json!({"title": "t", "id": 1})));
    }
}
