use crate::core::{AttributeValue, EventLogError, Item, Key, Result};
use crate::query::{KeyQuery, Projection};
use crate::storage::engine::{KeySchema, QueryPage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One table of the in-memory store: partitions of items ordered by sort key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: KeySchema,
    partitions: BTreeMap<String, BTreeMap<String, Item>>,
}

impl Table {
    pub fn new(schema: KeySchema) -> Self {
        Self {
            schema,
            partitions: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn item_count(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    /// Inserts or replaces the item with the same key.
    pub fn put(&mut self, item: Item) -> Result<()> {
        let (partition, sort) = self.locate(&item)?;
        self.partitions.entry(partition).or_default().insert(sort, item);
        Ok(())
    }

    pub fn get(&self, key: &Key) -> Result<Option<Item>> {
        let (partition, sort) = self.locate(key)?;
        Ok(self
            .partitions
            .get(&partition)
            .and_then(|items| items.get(&sort))
            .cloned())
    }

    /// Evaluates one page of `query`, returning at most `page_size` items.
    pub fn query(&self, query: &KeyQuery, page_size: usize) -> Result<QueryPage> {
        if query.partition_key_name != self.schema.partition_key {
            return Err(EventLogError::store(format!(
                "table '{}' is keyed by '{}', not '{}'",
                query.table, self.schema.partition_key, query.partition_key_name
            )));
        }
        if query.sort_condition.is_some()
            && self.schema.sort_key.as_deref() != Some(query.sort_key_name.as_str())
        {
            return Err(EventLogError::store(format!(
                "table '{}' has no sort key '{}'",
                query.table, query.sort_key_name
            )));
        }

        let Some(partition) = self.partitions.get(&query.partition_key_value) else {
            return Ok(QueryPage::default());
        };

        let start_after = match &query.exclusive_start_key {
            Some(key) => Some(self.locate(key)?.1),
            None => None,
        };
        let forward = query.scan_forward;
        let after_start = |sort: &str| match &start_after {
            Some(start) if forward => sort > start.as_str(),
            Some(start) => sort < start.as_str(),
            None => true,
        };
        let in_range = |sort: &str| {
            query
                .sort_condition
                .as_ref()
                .is_none_or(|condition| condition.matches(sort))
        };

        let entries: Box<dyn Iterator<Item = (&String, &Item)>> = if forward {
            Box::new(partition.iter())
        } else {
            Box::new(partition.iter().rev())
        };

        let cap = query.limit.unwrap_or(usize::MAX).min(page_size).max(1);
        let mut selected: Vec<&Item> = entries
            .filter(|(sort, _)| after_start(sort.as_str()) && in_range(sort.as_str()))
            .map(|(_, item)| item)
            .take(cap.saturating_add(1))
            .collect();

        let more = selected.len() > cap;
        selected.truncate(cap);

        let last_evaluated_key = if more {
            selected.last().map(|item| self.key_of(item))
        } else {
            None
        };

        let count = selected.len();
        let items = match &query.projection {
            Projection::All => selected.into_iter().cloned().collect(),
            Projection::Count => Vec::new(),
            Projection::Attributes(attributes) => selected
                .into_iter()
                .map(|item| {
                    item.iter()
                        .filter(|(name, _)| attributes.contains(name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                })
                .collect(),
        };

        Ok(QueryPage {
            items,
            count,
            last_evaluated_key,
        })
    }

    fn key_of(&self, item: &Item) -> Key {
        let mut key = Key::new();
        for name in std::iter::once(&self.schema.partition_key).chain(self.schema.sort_key.as_ref()) {
            if let Some(value) = item.get(name) {
                key.insert(name.clone(), value.clone());
            }
        }
        key
    }

    /// Partition and sort position of an item or key.
    fn locate(&self, item: &Item) -> Result<(String, String)> {
        let partition = item
            .get(&self.schema.partition_key)
            .ok_or_else(|| {
                EventLogError::store(format!(
                    "missing partition key attribute '{}'",
                    self.schema.partition_key
                ))
            })?
            .to_string();

        let sort = match &self.schema.sort_key {
            Some(name) => match item.get(name) {
                Some(AttributeValue::S(value)) => value.clone(),
                Some(other) => {
                    return Err(EventLogError::store(format!(
                        "sort key attribute '{}' must be a string, got {}",
                        name,
                        other.type_name()
                    )));
                }
                None => {
                    return Err(EventLogError::store(format!(
                        "missing sort key attribute '{}'",
                        name
                    )));
                }
            },
            None => String::new(),
        };

        Ok((partition, sort))
    }
}
