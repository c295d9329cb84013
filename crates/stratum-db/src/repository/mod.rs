//! The generic entity repository.
//!
//! A [`Repository`] binds an [`Entity`] to a [`QueryExecutor`] and an
//! optional [`EntityCache`]. It translates [`crate::filter::Filter`]s into queries, runs
//! every row it returns through [`Record::to_map`], and routes writes
//! through [`Record`] so transformed columns are encoded before they reach
//! storage.
//!
//! - `read` - find, find one, list, count and sum.
//! - `write` - save, bulk insert, update, delete, soft delete and restore.

use std::{marker::PhantomData, sync::Arc};

use serde::Serialize;
use serde_json::Value;
use stratum_config::Config;
use tracing::{debug, warn};

use crate::{
    cache::EntityCache,
    entity::Entity,
    error::{DbError, Result},
    executor::{QueryExecutor, SqliteExecutor},
    expr::Col,
    filter::Filter,
    helpers::Row,
    query::{OrderDirection, Query},
    record::Record,
    transform::FieldTransform,
};

mod read;
mod write;

/// Which columns a read returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Columns {
    #[default]
    All,
    Only(Vec<String>),
}

impl Columns {
    /// A projection. An empty list or one containing `*` selects everything.
    pub fn only<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() || columns.iter().any(|c| c == "*") {
            Columns::All
        } else {
            Columns::Only(columns)
        }
    }

    /// Applies the projection to an already materialized row.
    fn project(&self, row: Row) -> Row {
        match self {
            Columns::All => row,
            Columns::Only(columns) => {
                let mut row = row;
                columns
                    .iter()
                    .filter_map(|c| row.remove(c).map(|v| (c.clone(), v)))
                    .collect()
            }
        }
    }
}

impl<const N: usize> From<[&str; N]> for Columns {
    fn from(columns: [&str; N]) -> Self {
        Columns::only(columns)
    }
}

impl From<&[&str]> for Columns {
    fn from(columns: &[&str]) -> Self {
        Columns::only(columns.iter().copied())
    }
}

impl From<Vec<String>> for Columns {
    fn from(columns: Vec<String>) -> Self {
        Columns::only(columns)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListResult {
    pub list: Vec<Row>,
    /// Total matches across all pages, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// Ordering as `(column, direction)` pairs, applied in order.
pub type OrderBy<'a> = &'a [(&'a str, OrderDirection)];

/// Data access for one entity type.
///
/// Reads exclude soft-deleted rows unless the method says otherwise. Every
/// returned row is the entity's caller-facing mapping: read casts applied,
/// appended fields added, transformed columns decoded.
pub struct Repository<E: Entity, X: QueryExecutor = SqliteExecutor> {
    executor: X,
    cache: Option<Arc<dyn EntityCache>>,
    transform: Arc<FieldTransform>,
    primary_key: Col,
    soft_delete: Option<Col>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, X: QueryExecutor> Repository<E, X> {
    /// Validates the entity definition and builds its field transform from
    /// the entity's own key.
    pub fn new(executor: X) -> Result<Self> {
        E::validate()?;

        let primary_key = Col::new(E::PRIMARY_KEY)?;
        let soft_delete = E::SOFT_DELETE.map(Col::new).transpose()?;
        let transform = build_transform::<E>(E::TRANSFORM_KEY)?;

        debug!(
            table = E::TABLE,
            transform = transform.is_enabled(),
            soft_delete = soft_delete.is_some(),
            "repository ready"
        );

        Ok(Self {
            executor,
            cache: None,
            transform: Arc::new(transform),
            primary_key,
            soft_delete,
            _entity: PhantomData,
        })
    }

    /// Replaces the transform key.
    pub fn with_transform_key(mut self, key: &str) -> Result<Self> {
        self.transform = Arc::new(build_transform::<E>(Some(key))?);
        Ok(self)
    }

    /// Uses the `[transform.keys]` entry for this table, if there is one.
    pub fn with_config(self, config: &Config) -> Result<Self> {
        match config.transform_key(E::TABLE) {
            Some(key) => self.with_transform_key(key),
            None => Ok(self),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn EntityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn table_name(&self) -> &'static str {
        E::TABLE
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    pub fn transform(&self) -> &FieldTransform {
        &self.transform
    }

    /// An unsaved record sharing this repository's transform.
    pub fn new_record(&self) -> Record<E> {
        Record::new(self.transform.clone())
    }

    fn base_query(&self) -> Query {
        let query = Query::from(E::TABLE);
        match &self.soft_delete {
            Some(column) => query.soft_deletes(column.clone()),
            None => query,
        }
    }

    /// A column the entity declares. Anything else is rejected before it
    /// reaches SQL.
    fn column(&self, name: &str) -> Result<Col> {
        if E::field(name).is_none() {
            return Err(DbError::UnknownColumn {
                table: E::TABLE.to_string(),
                column: name.to_string(),
            });
        }
        Ok(Col::new(name)?)
    }

    fn projection(&self, columns: &Columns) -> Result<Vec<Col>> {
        match columns {
            Columns::All => Ok(Vec::new()),
            Columns::Only(names) => names.iter().map(|name| self.column(name)).collect(),
        }
    }

    fn filtered(&self, query: Query, filter: &Filter) -> Result<Query> {
        for (column, _) in filter.iter() {
            self.column(column)?;
        }
        Ok(query.filter(filter)?)
    }

    fn ordered(&self, mut query: Query, order_by: OrderBy<'_>) -> Result<Query> {
        for (column, direction) in order_by {
            query = query.order_by(self.column(column)?, *direction);
        }
        Ok(query)
    }

    fn soft_delete_column(&self) -> Result<&Col> {
        self.soft_delete
            .as_ref()
            .ok_or_else(|| DbError::SoftDeleteUnsupported(E::TABLE.to_string()))
    }

    fn materialize(&self, row: Row) -> Result<Row> {
        Record::<E>::from_row(row, self.transform.clone()).to_map()
    }

    fn forget(&self, id: &Value) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.forget(E::TABLE, id),
            None => Ok(()),
        }
    }
}

fn build_transform<E: Entity>(key: Option<&str>) -> Result<FieldTransform> {
    let columns = E::transform_columns();
    if columns.is_empty() {
        return Ok(FieldTransform::disabled());
    }
    match key {
        Some(key) => FieldTransform::new(columns, key)
            .map_err(|e| DbError::configuration(E::TABLE, e.to_string())),
        None => {
            warn!(
                table = E::TABLE,
                "transformed fields declared without a key; values are stored as given"
            );
            Ok(FieldTransform::disabled())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        entity::Field,
        test_utils::{member_repo, setup_db, Note},
    };

    #[test]
    fn test_columns_star_means_all() {
        assert_eq!(Columns::only(["*"]), Columns::All);
        assert_eq!(Columns::only(Vec::<String>::new()), Columns::All);
        assert_eq!(Columns::from(["id", "*"]), Columns::All);
        assert_eq!(
            Columns::from(["id", "name"]),
            Columns::Only(vec!["id".into(), "name".into()])
        );
    }

    #[test]
    fn test_columns_project_keeps_requested_order() {
        let row: Row = [("id", json!(1)), ("name", json!("a")), ("age", json!(3))]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let projected = Columns::from(["age", "id", "missing"]).project(row);
        let keys: Vec<_> = projected.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["age", "id"]);
    }

    #[test]
    fn test_columns_reject_bad_identifiers() {
        let db = setup_db();
        let repo = member_repo(&db);
        assert!(matches!(
            repo.projection(&Columns::from(["name; DROP TABLE x"])),
            Err(DbError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_undeclared_columns_are_rejected() {
        let db = setup_db();
        let repo = member_repo(&db);

        assert_eq!(repo.projection(&Columns::from(["id", "name"])).unwrap().len(), 2);
        assert!(matches!(
            repo.projection(&Columns::from(["id", "nmae"])),
            Err(DbError::UnknownColumn { ref column, .. }) if column == "nmae"
        ));

        let filter = Filter::new().with("agee", crate::filter::Condition::eq(3));
        assert!(matches!(
            repo.filtered(repo.base_query(), &filter),
            Err(DbError::UnknownColumn { .. })
        ));

        let order: OrderBy<'_> = &[("age", OrderDirection::Asc), ("sscore", OrderDirection::Desc)];
        assert!(matches!(
            repo.ordered(repo.base_query(), order),
            Err(DbError::UnknownColumn { ref column, .. }) if column == "sscore"
        ));
    }

    #[test]
    fn test_new_builds_transform_from_entity_key() {
        let db = setup_db();
        let repo = member_repo(&db);
        assert_eq!(repo.table_name(), "members");
        assert!(repo.transform().is_enabled());
        assert!(repo.transform().applies_to("ssn"));

        let notes: Repository<Note> = Repository::new(SqliteExecutor::new(db)).unwrap();
        assert!(!notes.transform().is_enabled());
    }

    #[test]
    fn test_with_transform_key_rejects_empty_key() {
        let db = setup_db();
        let err = member_repo(&db).with_transform_key("").err().unwrap();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[test]
    fn test_with_config_overrides_key() {
        let db = setup_db();
        let mut config = Config::default_config();
        config
            .transform
            .keys
            .insert("members".to_string(), "other".to_string());

        let repo = member_repo(&db).with_config(&config).unwrap();
        let mut record = repo.new_record();
        record.set_attribute("ssn", json!("ab")).unwrap();
        assert_eq!(
            record.get_raw("ssn"),
            Some(&json!(crate::transform::encode("ab", "other")))
        );
    }

    struct Keyless;

    impl Entity for Keyless {
        const TABLE: &'static str = "keyless";
        const FIELDS: &'static [Field] = &[
            Field::new("id", crate::entity::FieldKind::Integer),
            Field::new("secret", crate::entity::FieldKind::Text).transformed(),
        ];
    }

    #[test]
    fn test_transformed_fields_without_key_are_disabled() {
        let db = setup_db();
        let repo: Repository<Keyless> = Repository::new(SqliteExecutor::new(db)).unwrap();
        assert!(!repo.transform().is_enabled());

        let repo = repo.with_transform_key("k").unwrap();
        assert!(repo.transform().applies_to("secret"));
    }

    #[test]
    fn test_invalid_entity_is_rejected() {
        struct Broken;
        impl Entity for Broken {
            const TABLE: &'static str = "broken";
            const FIELDS: &'static [Field] = &[Field::new("name", crate::entity::FieldKind::Text)];
        }

        let db = setup_db();
        let result: Result<Repository<Broken>> = Repository::new(SqliteExecutor::new(db));
        assert!(matches!(result, Err(DbError::Configuration { .. })));
    }
}
