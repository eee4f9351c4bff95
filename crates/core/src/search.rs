//! Tag membership queries.
//!
//! [`TagQuery`] turns a tag set, a match mode and a sort spec into a
//! parameterized statement. Tag names are always bound, never spliced; the
//! ORDER BY clause only ever comes from the closed [`SortBy`] enum.

use crate::catalog::FILE_VIEW_SELECT;
use crate::error::{CatalogError, Result};
use crate::models::{MatchMode, SortBy, SortOrder};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct TagQuery {
    tags: Vec<String>,
    mode: MatchMode,
    sort_by: SortBy,
    order: SortOrder,
}

impl TagQuery {
    /// Fails with `InvalidArgument` on an empty tag list; duplicate names
    /// are collapsed.
    pub fn new(tags: &[String], mode: MatchMode) -> Result<Self> {
        let unique: BTreeSet<&String> = tags.iter().collect();
        if unique.is_empty() {
            return Err(CatalogError::InvalidArgument(
                "tag search needs at least one tag".into(),
            ));
        }
        Ok(Self {
            tags: unique.into_iter().cloned().collect(),
            mode,
            sort_by: SortBy::default(),
            order: SortOrder::default(),
        })
    }

    pub fn sort(mut self, sort_by: SortBy, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Statement selecting matching file rows joined with their metadata.
    pub fn build(&self) -> QueryBuilder<'_, Sqlite> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(FILE_VIEW_SELECT);
        qb.push(
            " WHERE f.id IN (SELECT ft.file_id FROM file_tags ft JOIN tags t ON t.id = ft.tag_id WHERE t.name IN (",
        );
        let mut separated = qb.separated(", ");
        for tag in &self.tags {
            separated.push_bind(tag.as_str());
        }
        separated.push_unseparated(")");
        if self.mode == MatchMode::All {
            // Superset: the file must hold every distinct requested tag.
            qb.push(" GROUP BY ft.file_id HAVING COUNT(DISTINCT t.id) = ");
            qb.push_bind(self.tags.len() as i64);
        }
        qb.push(")");
        qb.push(" ORDER BY ");
        qb.push(order_column(self.sort_by));
        qb.push(match self.order {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        });
        qb.push(", f.id ASC");
        qb
    }
}

fn order_column(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Path => "f.path",
        SortBy::LastModified => "f.mtime",
        SortBy::Duration => "COALESCE(m.duration, 0)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn empty_tag_list_is_rejected() {
        let err = TagQuery::new(&[], MatchMode::Any).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[test]
    fn match_any_is_plain_membership() {
        let query = TagQuery::new(&names(&["x", "y"]), MatchMode::Any).unwrap();
        let qb = query.build();
        let sql = qb.sql();
        assert!(sql.contains("t.name IN (?, ?)"), "{sql}");
        assert!(!sql.contains("HAVING"));
        assert_eq!(placeholders(sql), 2);
    }

    #[test]
    fn match_all_requires_every_distinct_tag() {
        let query = TagQuery::new(&names(&["x", "y", "x"]), MatchMode::All).unwrap();
        assert_eq!(query.tags(), &names(&["x", "y"])[..]);
        let qb = query.build();
        let sql = qb.sql();
        assert!(sql.contains("HAVING COUNT(DISTINCT t.id) = ?"), "{sql}");
        // two names plus the required count
        assert_eq!(placeholders(sql), 3);
    }

    #[test]
    fn ordering_uses_whitelisted_columns_and_id_tiebreak() {
        let query = TagQuery::new(&names(&["loop"]), MatchMode::Any)
            .unwrap()
            .sort(SortBy::Duration, SortOrder::Desc);
        let qb = query.build();
        assert!(qb
            .sql()
            .ends_with("ORDER BY COALESCE(m.duration, 0) DESC, f.id ASC"));

        let query = TagQuery::new(&names(&["loop"]), MatchMode::Any)
            .unwrap()
            .sort(SortBy::LastModified, SortOrder::Asc);
        assert!(query.build().sql().ends_with("ORDER BY f.mtime ASC, f.id ASC"));
    }

    #[test]
    fn tag_names_never_reach_the_sql_text() {
        let hostile = names(&["'); DROP TABLE files; --"]);
        let query = TagQuery::new(&hostile, MatchMode::All).unwrap();
        assert!(!query.build().sql().contains("DROP"));
    }
}
