use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Read access to the external result store. Records are owned by the
/// extraction pipeline; this side only ever reads them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by its stable id.
    async fn get_by_id(&self, id: &str) -> Result<Option<Value>>;

    /// Find the first record whose source-file attribute contains the given
    /// canonical locator.
    async fn find_by_locator(&self, locator: &str) -> Result<Option<Value>>;
}

pub struct DynamoRecordStore {
    client: Client,
    table: String,
}

impl DynamoRecordStore {
    pub fn new(client: Client, table: String) -> Self {
        Self { client, table }
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("DocumentId", AttributeValue::S(id.to_string()))
            .send()
            .await?;
        Ok(response.item.as_ref().map(item_to_json))
    }

    async fn find_by_locator(&self, locator: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression("contains(#file, :value)")
            .expression_attribute_names("#file", "S3File")
            .expression_attribute_values(":value", AttributeValue::S(locator.to_string()))
            .limit(25)
            .send()
            .await?;
        Ok(response
            .items
            .as_ref()
            .and_then(|items| items.first())
            .map(item_to_json))
    }
}

/// Render a DynamoDB item as plain JSON so the rest of the system never sees
/// AttributeValue shapes.
pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Value {
    let map: Map<String, Value> = item
        .iter()
        .map(|(key, value)| (key.clone(), attribute_to_json(value)))
        .collect();
    Value::Object(map)
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(list) => Value::Array(list.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), attribute_to_json(nested)))
                .collect(),
        ),
        AttributeValue::Ss(set) => {
            Value::Array(set.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| number_to_json(n)).collect()),
        // Binary and unknown future variants have no JSON rendering here.
        _ => Value::Null,
    }
}

fn number_to_json(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(Number::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_to_json_nested_shapes() {
        let mut entity = HashMap::new();
        entity.insert("Text".to_string(), AttributeValue::S("metformin".into()));
        entity.insert("Score".to_string(), AttributeValue::N("0.99".into()));

        let mut item = HashMap::new();
        item.insert("DocumentId".to_string(), AttributeValue::S("doc-1".into()));
        item.insert("PageCount".to_string(), AttributeValue::N("3".into()));
        item.insert("Reviewed".to_string(), AttributeValue::Bool(false));
        item.insert("Missing".to_string(), AttributeValue::Null(true));
        item.insert(
            "Entities".to_string(),
            AttributeValue::L(vec![AttributeValue::M(entity)]),
        );

        let value = item_to_json(&item);
        assert_eq!(value["DocumentId"], json!("doc-1"));
        assert_eq!(value["PageCount"], json!(3));
        assert_eq!(value["Reviewed"], json!(false));
        assert_eq!(value["Missing"], json!(null));
        assert_eq!(value["Entities"][0]["Text"], json!("metformin"));
        assert_eq!(value["Entities"][0]["Score"], json!(0.99));
    }

    #[test]
    fn test_unparseable_number_kept_as_string() {
        let mut item = HashMap::new();
        item.insert("Weird".to_string(), AttributeValue::N("1e999".into()));
        let value = item_to_json(&item);
        // f64 overflow is not representable as JSON; the raw text survives.
        assert_eq!(value["Weird"], json!("1e999"));
    }
}
