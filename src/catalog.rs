use serde_json::Value;

use crate::client::FingridClient;
use crate::domain::DatasetDescriptor;
use crate::error::ExplorerError;

const REQUIRED_FIELDS: &[&str] = &[
    "id",
    "nameEn",
    "dataPeriodEn",
    "unitEn",
    "searchScore",
    "descriptionEn",
];

pub fn search<C: FingridClient>(
    client: &C,
    query: &str,
    api_key: &str,
) -> Result<Vec<DatasetDescriptor>, ExplorerError> {
    let raw = client.search_catalog(query, api_key)?;
    let results = parse_catalog(&raw)?;
    tracing::debug!(query, results = results.len(), "catalog.search");
    Ok(results)
}

/// A catalog body without `data` or without the listed row fields is how the
/// provider answers a rejected key.
pub fn parse_catalog(raw: &Value) -> Result<Vec<DatasetDescriptor>, ExplorerError> {
    let rows = raw
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| auth_error(raw, "data"))?;

    rows.iter()
        .map(|row| parse_descriptor(raw, row))
        .collect()
}

fn parse_descriptor(body: &Value, row: &Value) -> Result<DatasetDescriptor, ExplorerError> {
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|key| row.get(**key).is_none()) {
        return Err(auth_error(body, missing));
    }
    let id = match row.get("id") {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(value)) => value.clone(),
        _ => return Err(ExplorerError::Decode("dataset id is not a number".to_string())),
    };
    Ok(DatasetDescriptor {
        id: id.parse()?,
        name_en: text(row, "nameEn"),
        name_fi: text(row, "nameFi"),
        data_period_en: text(row, "dataPeriodEn"),
        data_period_fi: text(row, "dataPeriodFi"),
        unit_en: text(row, "unitEn"),
        unit_fi: text(row, "unitFi"),
        search_score: row
            .get("searchScore")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        description_en: text(row, "descriptionEn"),
        description_fi: text(row, "descriptionFi"),
    })
}

pub fn max_search_score(results: &[DatasetDescriptor]) -> Option<f64> {
    results
        .iter()
        .map(|item| item.search_score)
        .fold(None, |acc, score| match acc {
            Some(best) if best >= score => Some(best),
            _ => Some(score),
        })
}

fn text(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn auth_error(body: &Value, missing: &str) -> ExplorerError {
    let message = body
        .get("message")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .unwrap_or_else(|| format!("catalog response has no `{missing}` field"));
    ExplorerError::Auth(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parses_rows_in_provider_order() {
        let raw = json!({
            "data": [
                {"id": 75, "nameEn": "Wind power generation", "nameFi": "Tuulivoima",
                 "dataPeriodEn": "15 min", "unitEn": "MW", "searchScore": 12.5,
                 "descriptionEn": "Hourly wind"},
                {"id": 181, "nameEn": "Wind power production - real time data",
                 "dataPeriodEn": "3 min", "unitEn": "MW", "searchScore": 30.0,
                 "descriptionEn": "Real time"}
            ]
        });
        let results = parse_catalog(&raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id.as_str(), "75");
        assert_eq!(results[1].id.as_str(), "181");
        assert_eq!(results[0].name_fi, "Tuulivoima");
        assert_eq!(results[1].name_fi, "");
        assert_eq!(max_search_score(&results), Some(30.0));
    }

    #[test]
    fn missing_data_is_auth_error() {
        let raw = json!({"statusCode": 401, "message": "Access denied due to invalid subscription key."});
        assert_matches!(parse_catalog(&raw), Err(ExplorerError::Auth(msg)) if msg.contains("invalid subscription key"));
    }

    #[test]
    fn missing_row_field_is_auth_error() {
        let raw = json!({"data": [{"id": 1, "nameEn": "x"}]});
        assert_matches!(parse_catalog(&raw), Err(ExplorerError::Auth(_)));
    }

    #[test]
    fn empty_result_has_no_max_score() {
        let raw = json!({"data": []});
        let results = parse_catalog(&raw).unwrap();
        assert!(results.is_empty());
        assert_eq!(max_search_score(&results), None);
    }
}
