//! Listing options: exact-match filters, multi-field sort, and limit.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use kart_types::{Build, BuildField};

use crate::error::{CatalogError, CatalogResult};

/// Direction of a sort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl TryFrom<i8> for SortOrder {
    type Error = i8;

    /// `1` is ascending, `-1` is descending.
    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ascending),
            -1 => Ok(Self::Descending),
            other => Err(other),
        }
    }
}

/// Sort over one or more fields, compared lexicographically in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub key: Vec<String>,
    pub order: SortOrder,
}

/// Options for [`Catalog::list`](crate::Catalog::list).
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Field name to exact value. All entries must match.
    pub filter: BTreeMap<String, String>,
    pub sort: Option<SortSpec>,
    /// Keep only the first N entries after sorting.
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn sort_by<I, S>(mut self, key: I, order: SortOrder) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort = Some(SortSpec {
            key: key.into_iter().map(Into::into).collect(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resolve filter field names. `None` means some name is unknown, and
    /// therefore nothing can match.
    pub(crate) fn compiled_filter(&self) -> Option<Vec<(BuildField, &str)>> {
        self.filter
            .iter()
            .map(|(name, value)| name.parse().ok().map(|f| (f, value.as_str())))
            .collect()
    }

    /// Resolve sort field names; unknown names are an error.
    pub(crate) fn compiled_sort(&self) -> CatalogResult<Option<(Vec<BuildField>, SortOrder)>> {
        let Some(spec) = &self.sort else {
            return Ok(None);
        };
        let fields = spec
            .key
            .iter()
            .map(|name| {
                name.parse::<BuildField>()
                    .map_err(|_| CatalogError::UnknownSortField(name.clone()))
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Some((fields, spec.order)))
    }
}

/// Filter, sort, and truncate `builds` in place.
pub(crate) fn apply(
    builds: &mut Vec<Build>,
    filter: &[(BuildField, &str)],
    sort: Option<(Vec<BuildField>, SortOrder)>,
    limit: Option<usize>,
) {
    builds.retain(|b| filter.iter().all(|(field, value)| b.field_matches(field, value)));

    if let Some((fields, order)) = sort {
        builds.sort_by(|a, b| {
            fields
                .iter()
                .fold(Ordering::Equal, |acc, f| acc.then_with(|| a.cmp_field(b, f)))
        });
        if order == SortOrder::Descending {
            builds.reverse();
        }
    }

    if let Some(limit) = limit {
        builds.truncate(limit);
    }
}
