//! OData collection operations: query, create, update, delete.

use serde::Serialize;
use tracing::instrument;

use creatio_client::{RequestMethod, Response};

use crate::client::{CreatioClient, RequestOptions};
use crate::error::Result;

/// Query shaping for [`CreatioClient::get_collection_data`].
///
/// Path options (`record_id`, `value`, `property`, `only_count`) shape the
/// endpoint URL; the rest become `$`-prefixed query parameters.
///
/// # Example
///
/// ```rust,ignore
/// let options = QueryOptions::new()
///     .top(10)
///     .select("Id,Title")
///     .filter("Status/Name eq 'New'")
///     .order_by("CreatedOn desc");
/// let response = client.get_collection_data("Case", options).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    record_id: Option<String>,
    only_count: bool,
    count: Option<bool>,
    skip: Option<u64>,
    top: Option<u64>,
    select: Option<String>,
    expand: Option<String>,
    value: Option<String>,
    order_by: Option<String>,
    filter: Option<String>,
    property: Option<String>,
    extra: Vec<(String, String)>,
}

impl QueryOptions {
    /// Create empty query options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address one record: `{collection}({id})`.
    pub fn record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Ask only for the number of records: `{collection}/$count`.
    pub fn only_count(mut self) -> Self {
        self.only_count = true;
        self
    }

    /// Include the total match count alongside the data (`$count`).
    pub fn count(mut self, count: bool) -> Self {
        self.count = Some(count);
        self
    }

    /// Skip the first `n` records (`$skip`).
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Return at most `n` records (`$top`).
    pub fn top(mut self, n: u64) -> Self {
        self.top = Some(n);
        self
    }

    /// Fields to return, as a comma-separated string (`$select`).
    pub fn select(mut self, fields: impl Into<String>) -> Self {
        self.select = Some(fields.into());
        self
    }

    /// Fields to return, from a list (`$select`).
    pub fn select_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(join_fields(fields));
        self
    }

    /// Related entities to inline, as a comma-separated string (`$expand`).
    pub fn expand(mut self, relations: impl Into<String>) -> Self {
        self.expand = Some(relations.into());
        self
    }

    /// Related entities to inline, from a list (`$expand`).
    pub fn expand_fields<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand = Some(join_fields(relations));
        self
    }

    /// Fetch a single field's raw value: `/{field}/$value`.
    pub fn value(mut self, field: impl Into<String>) -> Self {
        self.value = Some(field.into());
        self
    }

    /// Sort order (`$orderby`).
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    /// Filter expression (`$filter`).
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Fetch a single property of a record: `/{property}`. Useful for
    /// binary columns exposed under a `/Data` suffix.
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Add a raw query parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Endpoint path for the given collection.
    pub(crate) fn path(&self, collection: &str) -> String {
        let mut path = format!("0/odata/{collection}");
        if let Some(id) = &self.record_id {
            path.push('(');
            path.push_str(id);
            path.push(')');
        }
        if let Some(field) = &self.value {
            path.push('/');
            path.push_str(field);
            path.push_str("/$value");
        }
        if let Some(property) = &self.property {
            path.push('/');
            path.push_str(property);
        } else if self.only_count {
            path.push_str("/$count");
        }
        path
    }

    /// Query parameters, `$`-prefixed where OData defines them.
    pub(crate) fn query_params(&self) -> Vec<(String, String)> {
        let mut params = self.extra.clone();
        if let Some(count) = self.count {
            params.push(("$count".to_string(), count.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("$skip".to_string(), skip.to_string()));
        }
        if let Some(top) = self.top {
            params.push(("$top".to_string(), top.to_string()));
        }
        if let Some(select) = &self.select {
            params.push(("$select".to_string(), select.clone()));
        }
        if let Some(expand) = &self.expand {
            params.push(("$expand".to_string(), expand.clone()));
        }
        if let Some(order_by) = &self.order_by {
            params.push(("$orderby".to_string(), order_by.clone()));
        }
        if let Some(filter) = &self.filter {
            params.push(("$filter".to_string(), filter.clone()));
        }
        params
    }
}

fn join_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fields
        .into_iter()
        .map(Into::into)
        .collect::<Vec<_>>()
        .join(",")
}

impl CreatioClient {
    /// Read records from a collection.
    #[instrument(skip(self, options))]
    pub async fn get_collection_data(
        &mut self,
        collection: &str,
        options: QueryOptions,
    ) -> Result<Response> {
        let endpoint = options.path(collection);
        let request_options = RequestOptions::new().queries(options.query_params());
        self.request(RequestMethod::Get, &endpoint, request_options)
            .await
    }

    /// Create a record in a collection.
    #[instrument(skip(self, data))]
    pub async fn add_collection_data<T: Serialize>(
        &mut self,
        collection: &str,
        data: &T,
    ) -> Result<Response> {
        let endpoint = format!("0/odata/{collection}");
        self.request(
            RequestMethod::Post,
            &endpoint,
            RequestOptions::new().json(data)?,
        )
        .await
    }

    /// Update fields of an existing record.
    #[instrument(skip(self, data))]
    pub async fn modify_collection_data<T: Serialize>(
        &mut self,
        collection: &str,
        record_id: &str,
        data: &T,
    ) -> Result<Response> {
        let endpoint = format!("0/odata/{collection}({record_id})");
        self.request(
            RequestMethod::Patch,
            &endpoint,
            RequestOptions::new().json(data)?,
        )
        .await
    }

    /// Delete a record.
    #[instrument(skip(self))]
    pub async fn delete_collection_data(
        &mut self,
        collection: &str,
        record_id: &str,
    ) -> Result<Response> {
        let endpoint = format!("0/odata/{collection}({record_id})");
        self.request(RequestMethod::Delete, &endpoint, RequestOptions::new())
            .await
    }
}
