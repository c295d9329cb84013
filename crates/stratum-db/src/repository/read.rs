use std::collections::HashMap;

use serde_json::{Number, Value};
use tracing::debug;

use super::{Columns, ListResult, OrderBy, Repository};
use crate::{
    entity::Entity,
    error::Result,
    executor::QueryExecutor,
    filter::Filter,
    helpers::{key_string, Row},
    query::Query,
    traits::Predicates,
};

impl<E: Entity, X: QueryExecutor> Repository<E, X> {
    /// The row with primary key `id`, or an empty map when there is none.
    ///
    /// With `use_cache` and a cache attached, the cache is consulted first
    /// and filled on a miss.
    pub fn find(&self, id: impl Into<Value>, columns: &Columns, use_cache: bool) -> Result<Row> {
        let id = id.into();
        let projection = self.projection(columns)?;

        if use_cache {
            if let Some(cache) = &self.cache {
                let row = match cache.find_from_cache(E::TABLE, &id)? {
                    Some(row) => {
                        debug!(table = E::TABLE, id = %id, "cache hit");
                        row
                    }
                    None => {
                        let Some(row) = self.executor.find(self.base_query(), &self.primary_key, &id)?
                        else {
                            return Ok(Row::new());
                        };
                        cache.put(E::TABLE, &id, row.clone())?;
                        row
                    }
                };
                return Ok(columns.project(self.materialize(row)?));
            }
        }

        let query = self.base_query().select(&projection);
        match self.executor.find(query, &self.primary_key, &id)? {
            Some(row) => self.materialize(row),
            None => Ok(Row::new()),
        }
    }

    /// Rows for several primary keys. Missing keys are skipped.
    ///
    /// Cached lookups return rows in the order of `ids`; uncached lookups
    /// return them in storage order.
    pub fn find_many<I, V>(&self, ids: I, columns: &Columns, use_cache: bool) -> Result<Vec<Row>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let projection = self.projection(columns)?;

        if use_cache {
            if let Some(cache) = &self.cache {
                let mut found: HashMap<String, Row> = cache
                    .find_many_from_cache(E::TABLE, &ids)?
                    .into_iter()
                    .filter_map(|row| {
                        let key = key_string(row.get(E::PRIMARY_KEY)?);
                        Some((key, row))
                    })
                    .collect();

                let missing: Vec<Value> = ids
                    .iter()
                    .filter(|id| !found.contains_key(&key_string(id)))
                    .cloned()
                    .collect();
                debug!(
                    table = E::TABLE,
                    hits = found.len(),
                    misses = missing.len(),
                    "cached lookup"
                );

                if !missing.is_empty() {
                    let mut query = self.base_query();
                    query.where_in(self.primary_key.clone(), missing);
                    for row in self.executor.get(&query)? {
                        let Some(id) = row.get(E::PRIMARY_KEY).cloned() else {
                            continue;
                        };
                        cache.put(E::TABLE, &id, row.clone())?;
                        found.insert(key_string(&id), row);
                    }
                }

                let mut rows = Vec::with_capacity(ids.len());
                for id in &ids {
                    if let Some(row) = found.remove(&key_string(id)) {
                        rows.push(columns.project(self.materialize(row)?));
                    }
                }
                return Ok(rows);
            }
        }

        let mut query = self.base_query().select(&projection);
        query.where_in(self.primary_key.clone(), ids);
        self.collect(&query)
    }

    /// The first row matching `filter`, or an empty map.
    pub fn find_one_by(&self, filter: &Filter, columns: &Columns, order_by: OrderBy<'_>) -> Result<Row> {
        self.first_in(self.base_query(), filter, columns, order_by)
    }

    /// Like [`Repository::find_one_by`], soft-deleted rows included.
    pub fn find_one_by_with_trashed(
        &self,
        filter: &Filter,
        columns: &Columns,
        order_by: OrderBy<'_>,
    ) -> Result<Row> {
        self.first_in(self.base_query().with_trashed(), filter, columns, order_by)
    }

    /// One page of rows matching `filter`.
    ///
    /// `page` starts at 1; `page == 0` returns every match. The total is
    /// counted only when `with_total` is set.
    #[allow(clippy::too_many_arguments)]
    pub fn get_list(
        &self,
        filter: &Filter,
        columns: &Columns,
        page: u64,
        page_size: u64,
        order_by: OrderBy<'_>,
        with_total: bool,
    ) -> Result<ListResult> {
        self.list_in(self.base_query(), filter, columns, page, page_size, order_by, with_total)
    }

    /// Like [`Repository::get_list`], soft-deleted rows included in both the
    /// page and the total.
    #[allow(clippy::too_many_arguments)]
    pub fn get_list_with_trashed(
        &self,
        filter: &Filter,
        columns: &Columns,
        page: u64,
        page_size: u64,
        order_by: OrderBy<'_>,
        with_total: bool,
    ) -> Result<ListResult> {
        self.list_in(
            self.base_query().with_trashed(),
            filter,
            columns,
            page,
            page_size,
            order_by,
            with_total,
        )
    }

    pub fn get_count(&self, filter: &Filter) -> Result<u64> {
        self.executor.count(&self.filtered(self.base_query(), filter)?)
    }

    /// `SUM(column)` over the matching rows; `0` when nothing matches.
    pub fn get_sum(&self, filter: &Filter, column: &str) -> Result<Number> {
        let column = self.column(column)?;
        self.executor.sum(&self.filtered(self.base_query(), filter)?, &column)
    }

    fn first_in(
        &self,
        scope: Query,
        filter: &Filter,
        columns: &Columns,
        order_by: OrderBy<'_>,
    ) -> Result<Row> {
        let scope = self.filtered(scope, filter)?;
        let query = self.ordered(scope.select(&self.projection(columns)?), order_by)?;
        match self.executor.first(query)? {
            Some(row) => self.materialize(row),
            None => Ok(Row::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn list_in(
        &self,
        scope: Query,
        filter: &Filter,
        columns: &Columns,
        page: u64,
        page_size: u64,
        order_by: OrderBy<'_>,
        with_total: bool,
    ) -> Result<ListResult> {
        let scope = self.filtered(scope, filter)?;
        let total_count = if with_total {
            Some(self.executor.count(&scope)?)
        } else {
            None
        };

        let mut query = self.ordered(scope.select(&self.projection(columns)?), order_by)?;
        if page > 0 {
            query = query.page(page, page_size);
        }

        Ok(ListResult {
            list: self.collect(&query)?,
            total_count,
        })
    }

    fn collect(&self, query: &Query) -> Result<Vec<Row>> {
        self.executor
            .get(query)?
            .into_iter()
            .map(|row| self.materialize(row))
            .collect()
    }
}
