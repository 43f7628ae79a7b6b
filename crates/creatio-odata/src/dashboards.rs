//! Dashboard export through the report service.
//!
//! Dashboards are stored as widget configurations with JSON documents
//! nested inside string values. Export means unwrapping that nesting,
//! translating the widget's grid configuration into an entity schema
//! query (ESQ), and feeding the ESQ to the Excel report endpoints.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use creatio_client::RequestMethod;

use crate::client::{CreatioClient, RequestOptions};
use crate::collections::QueryOptions;
use crate::error::{Error, ErrorKind, Result};
use crate::files::save_attachment;

impl CreatioClient {
    /// Export one dashboard widget's data to an Excel file in `dir`.
    ///
    /// `dashboard_name` is the widget key inside the dashboard's `Items`
    /// document. Returns the path of the written file; the name carries
    /// the widget caption and a timestamp.
    #[instrument(skip(self, dir))]
    pub async fn export_dashboard(
        &mut self,
        dashboard_id: &str,
        dashboard_name: &str,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let response = self
            .get_collection_data(
                "SysDashboard",
                QueryOptions::new().record_id(dashboard_id).value("Items"),
            )
            .await?;
        let text = response.text().await?;
        // The Items document is served with a UTF-8 BOM.
        let items: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))?;

        let widget = items.get(dashboard_name).ok_or_else(|| {
            Error::new(ErrorKind::Dashboard(format!(
                "dashboard {dashboard_id} has no widget named {dashboard_name:?}"
            )))
        })?;
        let parameters = widget.get("parameters").cloned().ok_or_else(|| {
            Error::new(ErrorKind::Dashboard(format!(
                "widget {dashboard_name:?} has no parameters"
            )))
        })?;
        let config = deep_unescape(parameters);

        let caption = config
            .get("caption")
            .and_then(|c| c.as_str())
            .unwrap_or(dashboard_name);
        let stamp = chrono::Local::now().format("%d_%m_%Y_%H_%M");
        let file_name = format!("{}_{stamp}", caption.to_lowercase().replace(' ', "_"));

        let esq = parse_to_esq(&config)?;
        // The report service expects the ESQ as an embedded JSON string.
        let payload = json!({ "esqSerialized": serde_json::to_string(&esq)? });

        let key_response = self
            .request(
                RequestMethod::Post,
                "0/rest/ReportService/GetExportToExcelKey",
                RequestOptions::new().json_value(payload),
            )
            .await?;
        let key_body: Value = key_response.json().await?;
        let key = key_body
            .pointer("/GetExportToExcelKeyResult/key")
            .and_then(|k| k.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::new(ErrorKind::Dashboard(
                    "could not obtain an export key for the dashboard".to_string(),
                ))
            })?
            .to_string();
        debug!(%key, "Export key obtained");

        let endpoint = format!("0/rest/ReportService/GetExportToExcelData/{key}/{file_name}");
        let data_response = self
            .request(RequestMethod::Get, &endpoint, RequestOptions::new())
            .await?;
        save_attachment(
            data_response,
            dir.as_ref(),
            Some(format!("{file_name}.xlsx")),
        )
        .await
    }
}

/// Recursively parse JSON documents hiding inside string values until the
/// structure contains no more embedded JSON.
pub(crate) fn deep_unescape(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, deep_unescape(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(deep_unescape).collect()),
        Value::String(s) => {
            let trimmed = s.trim();
            let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
                || (trimmed.starts_with('[') && trimmed.ends_with(']'));
            if looks_like_json {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(parsed) => deep_unescape(parsed),
                    Err(_) => Value::String(s),
                }
            } else {
                Value::String(s)
            }
        }
        other => other,
    }
}

/// Translate one serialized filter node (a filter group or a leaf filter)
/// into its ESQ form. Disabled, malformed, and unsupported nodes drop out
/// as `None`.
pub(crate) fn parse_filter_node(node: &Value) -> Option<Value> {
    if !node.get("isEnabled").and_then(Value::as_bool).unwrap_or(true) {
        return None;
    }

    match node.get("filterType").and_then(Value::as_i64) {
        // Filter group, recursive.
        Some(6) => {
            let mut items = Map::new();
            if let Some(children) = node.get("items").and_then(Value::as_object) {
                for (key, child) in children {
                    if let Some(parsed) = parse_filter_node(child) {
                        items.insert(key.clone(), parsed);
                    }
                }
            }
            if items.is_empty() {
                return None;
            }

            let mut group = Map::new();
            group.insert("items".to_string(), Value::Object(items));
            group.insert(
                "logicalOperation".to_string(),
                node.get("logicalOperation").cloned().unwrap_or(json!(0)),
            );
            group.insert(
                "isEnabled".to_string(),
                node.get("isEnabled").cloned().unwrap_or(json!(true)),
            );
            group.insert("filterType".to_string(), json!(6));
            if let Some(schema) = node.get("rootSchemaName") {
                group.insert("rootSchemaName".to_string(), schema.clone());
            }
            Some(Value::Object(group))
        }

        // Leaf filters are normalized to the In form.
        Some(4) | Some(1) => {
            let comparison = node.get("comparisonType")?;
            let left = node.get("leftExpression")?;
            let left_type = left.get("expressionType")?;
            let left_path = left.get("columnPath")?;

            let rights: Vec<Value> = node
                .get("rightExpressions")
                .and_then(Value::as_array)
                .map(|exprs| {
                    exprs
                        .iter()
                        .filter_map(|expr| {
                            let parameter = expr.get("parameter")?;
                            Some(json!({
                                "expressionType": expr.get("expressionType")?,
                                "parameter": {
                                    "dataValueType": parameter.get("dataValueType")?,
                                    "value": parameter.pointer("/value/value")?,
                                },
                            }))
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(json!({
                "filterType": 4,
                "comparisonType": comparison,
                "isEnabled": node.get("isEnabled").cloned().unwrap_or(json!(true)),
                "trimDateTimeParameterToDate": node
                    .get("trimDateTimeParameterToDate")
                    .cloned()
                    .unwrap_or(json!(false)),
                "leftExpression": {
                    "expressionType": left_type,
                    "columnPath": left_path,
                },
                "rightExpressions": rights,
            }))
        }

        _ => None,
    }
}

/// Translate one grid column configuration into an ESQ column. Aggregated
/// columns carry their sub-filters into the expression.
pub(crate) fn parse_column(column: &Value) -> Option<Value> {
    let column_path = column.get("metaPath")?.clone();

    let mut config = Map::new();
    config.insert("caption".to_string(), column.get("caption")?.clone());
    config.insert(
        "orderDirection".to_string(),
        column.get("orderDirection").cloned().unwrap_or(json!(0)),
    );
    config.insert(
        "orderPosition".to_string(),
        if column.get("orderDirection").is_some() {
            column.get("orderPosition").cloned().unwrap_or(json!(-1))
        } else {
            json!(-1)
        },
    );
    config.insert("isVisible".to_string(), json!(true));
    config.insert(
        "expression".to_string(),
        json!({ "expressionType": 0, "columnPath": column_path }),
    );

    let aggregation = column
        .get("aggregationType")
        .and_then(Value::as_i64)
        .filter(|t| *t != 0);
    if let Some(aggregation_type) = aggregation {
        let filter = column.get("serializedFilter")?;
        let mut items = Map::new();

        if filter.get("isEnabled").and_then(Value::as_bool).unwrap_or(true) {
            if let Some(children) = filter.get("items").and_then(Value::as_object) {
                for (key, child) in children {
                    if !child.get("isEnabled").and_then(Value::as_bool).unwrap_or(false) {
                        continue;
                    }
                    if let Some(parsed) = parse_filter_node(child) {
                        items.insert(key.clone(), parsed);
                    }
                }
            }
        }

        config.insert(
            "expression".to_string(),
            json!({
                "expressionType": 3,
                "functionType": 2,
                "aggregationType": aggregation_type,
                "columnPath": column_path,
                "subFilters": {
                    "items": items,
                    "logicalOperation": filter.get("logicalOperation")?,
                    "isEnabled": filter.get("isEnabled")?,
                    "filterType": filter.get("filterType")?,
                    "rootSchemaName": filter.get("rootSchemaName")?,
                },
            }),
        );
    }

    Some(Value::Object(config))
}

/// Build the serialized ESQ for a widget configuration.
///
/// Case widgets get an implicit "case is not closed" filter group wrapped
/// around the widget's own filters, matching what the dashboard UI shows.
pub(crate) fn parse_to_esq(config: &Value) -> Result<Value> {
    let schema = config
        .get("entitySchemaName")
        .and_then(|s| s.as_str())
        .ok_or_else(|| {
            Error::new(ErrorKind::Dashboard(
                "widget configuration has no entitySchemaName".to_string(),
            ))
        })?;

    let filters = config
        .get("filterData")
        .and_then(parse_filter_node)
        .unwrap_or(Value::Null);

    let filters = if schema == "Case" {
        json!({
            "items": {
                "0a0c11a3-1453-4a49-a06f-3536eef413e0": {
                    "items": {
                        "6f3c4586-90d0-4db5-8819-31029d341d38": filters,
                        "2dec8579-a7d5-49f0-a99b-1f2b8e0f9fbb": {
                            "items": {
                                "FilterStatus": {
                                    "filterType": 1,
                                    "comparisonType": 3,
                                    "isEnabled": true,
                                    "trimDateTimeParameterToDate": false,
                                    "leftExpression": {
                                        "expressionType": 0,
                                        "columnPath": "[Case:Id:Id].Status.IsFinal",
                                    },
                                    "rightExpression": {
                                        "expressionType": 2,
                                        "parameter": {
                                            "dataValueType": 1,
                                            "value": false,
                                        },
                                    },
                                },
                            },
                            "logicalOperation": 0,
                            "isEnabled": true,
                            "filterType": 6,
                        },
                    },
                    "logicalOperation": 0,
                    "isEnabled": true,
                    "filterType": 6,
                },
            },
            "logicalOperation": 0,
            "isEnabled": true,
            "filterType": 6,
        })
    } else {
        filters
    };

    let mut columns = Map::new();
    if let Some(items) = config.pointer("/gridConfig/items").and_then(Value::as_array) {
        for column in items {
            if let (Some(key), Some(parsed)) = (
                column.get("metaPath").and_then(|p| p.as_str()),
                parse_column(column),
            ) {
                columns.insert(key.to_string(), parsed);
            }
        }
    }

    Ok(json!({
        "rootSchemaName": schema,
        "operationType": 0,
        "includeProcessExecutionData": true,
        "filters": filters,
        "columns": { "items": columns },
        "isDistinct": false,
        "rowCount": -1,
        "isPageable": false,
        "useLocalization": true,
    }))
}
