use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

use log::debug;
use lru::LruCache;

use crate::processor::dataset::CollisionDataset;
use crate::processor::engine::{AggregationRequest, AggregationResult, YearPolicy};
use crate::processor::{AnalysisError, Field, FilterPredicate, Statistic};

/// Cache key: which dataset, the request, and the year policy it ran under
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct QueryKey {
    dataset_id: u64,
    request: AggregationRequest,
    policy: YearPolicy,
}

impl QueryKey {
    pub fn new(dataset: &CollisionDataset, request: AggregationRequest) -> Self {
        QueryKey {
            dataset_id: dataset.id(),
            request,
            policy: dataset.year_policy(),
        }
    }
}

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(n) => n,
    None => unreachable!(),
};

/// LRU cache of aggregation results; may be shared between datasets
#[derive(Debug)]
pub struct QueryCache {
    cache: RefCell<LruCache<QueryKey, AggregationResult>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<AggregationResult> {
        self.cache.borrow_mut().get(key).cloned()
    }

    pub fn put(&self, key: QueryKey, value: AggregationResult) {
        self.cache.borrow_mut().put(key, value);
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for [`AggregationRequest`]s against a shared dataset
#[derive(Debug)]
pub struct QueryBuilder {
    dataset: Rc<CollisionDataset>,
    cache: Option<Rc<QueryCache>>,
    filters: Vec<FilterPredicate>,
    group_by_fields: Vec<Field>,
    statistic: Statistic,
    limit: Option<usize>,
}

impl Clone for QueryBuilder {
    fn clone(&self) -> Self {
        QueryBuilder {
            dataset: Rc::clone(&self.dataset), // reuse same dataset
            cache: self.cache.as_ref().map(Rc::clone), // reuse same cache if present
            filters: self.filters.clone(),
            group_by_fields: self.group_by_fields.clone(),
            statistic: self.statistic,
            limit: self.limit,
        }
    }
}

impl QueryBuilder {
    pub fn new(dataset: Rc<CollisionDataset>, cache: Option<Rc<QueryCache>>) -> Self {
        Self {
            dataset,
            cache,
            filters: Vec::new(),
            group_by_fields: Vec::new(),
            statistic: Statistic::Count,
            limit: None,
        }
    }

    /// Add a filter condition; repeated calls must all match
    pub fn filter(mut self, predicate: FilterPredicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Add a single group-by field
    pub fn group_by(mut self, field: Field) -> Self {
        self.group_by_fields.push(field);
        self
    }

    /// Add multiple group-by fields, outermost first
    pub fn group_by_multi(mut self, fields: Vec<Field>) -> Self {
        self.group_by_fields.extend(fields);
        self
    }

    /// Statistic per group, `Count` unless set
    pub fn statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Keep only the top `n` groups
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Disable caching
    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// The request this builder describes
    pub fn build(&self) -> AggregationRequest {
        let filter = match self.filters.len() {
            0 => None,
            1 => Some(self.filters[0].clone()),
            _ => Some(FilterPredicate::All(self.filters.clone())),
        };
        AggregationRequest {
            group_by: self.group_by_fields.clone(),
            filter,
            statistic: self.statistic,
            limit: self.limit,
        }
    }

    /// Execute the query, consulting the cache when one is attached
    pub fn execute(self) -> Result<AggregationResult, AnalysisError> {
        let request = self.build();

        match &self.cache {
            Some(lru) => {
                let key = QueryKey::new(&self.dataset, request);
                if let Some(result) = lru.get(&key) {
                    debug!("cache hit for {:?}", key.request.group_by);
                    Ok(result)
                } else {
                    let result = self.dataset.aggregate(&key.request)?;
                    lru.put(key, result.clone());
                    Ok(result)
                }
            }
            None => self.dataset.aggregate(&request),
        }
    }
}

impl CollisionDataset {
    pub fn query(self: &Rc<Self>) -> QueryBuilder {
        QueryBuilder::new(self.clone(), None)
    }

    pub fn query_with_cache(self: &Rc<Self>, cache: &Rc<QueryCache>) -> QueryBuilder {
        QueryBuilder::new(self.clone(), Some(cache.clone()))
    }
}
