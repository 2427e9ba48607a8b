use crate::core::{AttributeValue, Key};
use std::collections::BTreeMap;

/// Range condition on a string sort key. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    Between(String, String),
    GreaterOrEqual(String),
    LessOrEqual(String),
}

impl SortKeyCondition {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Between(from, to) => from.as_str() <= value && value <= to.as_str(),
            Self::GreaterOrEqual(from) => from.as_str() <= value,
            Self::LessOrEqual(to) => value <= to.as_str(),
        }
    }
}

/// Which attributes a query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Attributes(Vec<String>),
    /// Return only the number of matching items.
    Count,
}

/// A store-native query: equality on the partition key plus an optional
/// range on the sort key, read one page at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQuery {
    pub table: String,
    pub partition_key_name: String,
    pub partition_key_value: String,
    pub sort_key_name: String,
    pub sort_condition: Option<SortKeyCondition>,
    pub projection: Projection,
    pub scan_forward: bool,
    /// Maximum number of items per page. `None` leaves paging to the store.
    pub limit: Option<usize>,
    /// Continuation token: the key of the last item already returned.
    pub exclusive_start_key: Option<Key>,
}

impl KeyQuery {
    pub fn new(
        table: impl Into<String>,
        partition_key_name: impl Into<String>,
        partition_key_value: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            partition_key_name: partition_key_name.into(),
            partition_key_value: partition_key_value.into(),
            sort_key_name: String::new(),
            sort_condition: None,
            projection: Projection::All,
            scan_forward: true,
            limit: None,
            exclusive_start_key: None,
        }
    }

    pub fn sort_key(mut self, name: impl Into<String>, condition: Option<SortKeyCondition>) -> Self {
        self.sort_key_name = name.into();
        self.sort_condition = condition;
        self
    }

    pub fn project<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Projection::Attributes(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn count_only(mut self) -> Self {
        self.projection = Projection::Count;
        self
    }

    pub fn scan_forward(mut self, forward: bool) -> Self {
        self.scan_forward = forward;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn starting_after(mut self, key: Key) -> Self {
        self.exclusive_start_key = Some(key);
        self
    }

    /// Renders the query in the expression syntax of DynamoDB-style stores,
    /// with `#name` / `:value` placeholders.
    pub fn render(&self) -> RenderedQuery {
        let mut names = BTreeMap::new();
        let mut values = BTreeMap::new();

        names.insert("#n".to_string(), self.partition_key_name.clone());
        values.insert(":n".to_string(), AttributeValue::S(self.partition_key_value.clone()));
        let mut expression = "#n = :n".to_string();

        if let Some(condition) = &self.sort_condition {
            names.insert("#v".to_string(), self.sort_key_name.clone());
            let clause = match condition {
                SortKeyCondition::Between(from, to) => {
                    values.insert(":from".to_string(), AttributeValue::S(from.clone()));
                    values.insert(":to".to_string(), AttributeValue::S(to.clone()));
                    "#v BETWEEN :from AND :to"
                }
                SortKeyCondition::GreaterOrEqual(from) => {
                    values.insert(":from".to_string(), AttributeValue::S(from.clone()));
                    "#v >= :from"
                }
                SortKeyCondition::LessOrEqual(to) => {
                    values.insert(":to".to_string(), AttributeValue::S(to.clone()));
                    "#v <= :to"
                }
            };
            expression.push_str(" AND ");
            expression.push_str(clause);
        }

        let (projection_expression, select) = match &self.projection {
            Projection::All => (None, None),
            Projection::Count => (None, Some("COUNT")),
            Projection::Attributes(attributes) => {
                let mut placeholders = Vec::with_capacity(attributes.len());
                for (i, attribute) in attributes.iter().enumerate() {
                    let placeholder = if attribute == &self.sort_key_name {
                        "#v".to_string()
                    } else if attribute == &self.partition_key_name {
                        "#n".to_string()
                    } else {
                        format!("#p{}", i)
                    };
                    names.insert(placeholder.clone(), attribute.clone());
                    placeholders.push(placeholder);
                }
                (Some(placeholders.join(", ")), None)
            }
        };

        RenderedQuery {
            table_name: self.table.clone(),
            key_condition_expression: expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            projection_expression,
            select,
            scan_index_forward: self.scan_forward,
            limit: self.limit,
            exclusive_start_key: self.exclusive_start_key.clone(),
        }
    }
}

/// A [`KeyQuery`] in the wire shape expected by expression-based stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub table_name: String,
    pub key_condition_expression: String,
    pub expression_attribute_names: BTreeMap<String, String>,
    pub expression_attribute_values: BTreeMap<String, AttributeValue>,
    pub projection_expression: Option<String>,
    pub select: Option<&'static str>,
    pub scan_index_forward: bool,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Key>,
}
