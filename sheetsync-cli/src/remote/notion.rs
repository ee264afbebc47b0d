//! [`RecordStore`] over the Notion REST API.
//!
//! Databases are record-store databases, pages are records, page properties
//! are fields. Property JSON is translated to and from core values here and
//! nowhere else.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use sheetsync_core::{
    ComputedValue, DatabaseId, FieldDescriptor, FieldKind, FieldValue, NumberFormat, Record,
    RecordId, Schema,
};
use sheetsync_sync::{RecordStore, StoreError};

use super::{http_agent, malformed, send, HttpError};

pub const NOTION_API: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

const STORE: &str = "notion";
const PAGE_SIZE: u32 = 100;

pub struct NotionStore {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    schemas: Mutex<HashMap<DatabaseId, Schema>>,
    parents: Mutex<HashMap<RecordId, DatabaseId>>,
}

impl NotionStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            agent: http_agent(),
            base_url: NOTION_API.to_owned(),
            token: token.into(),
            schemas: Mutex::new(HashMap::new()),
            parents: Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}/{path}", self.base_url))
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Notion-Version", NOTION_VERSION)
    }

    fn call(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value, StoreError> {
        send(self.request(method, path), body).map_err(|e| e.into_store(STORE))
    }

    fn page(&self, id: &RecordId) -> Result<Value, StoreError> {
        let path = format!("pages/{}", urlencoding::encode(&id.0));
        match send(self.request("GET", &path), None) {
            Ok(page) => Ok(page),
            Err(HttpError::Status(404, _)) => Err(StoreError::NotFound(id.clone())),
            Err(err) => Err(err.into_store(STORE)),
        }
    }

    /// Schema of `database_id`, fetched once per process.
    fn cached_schema(&self, database_id: &DatabaseId) -> Result<Schema, StoreError> {
        if let Some(schema) = lock(&self.schemas).get(database_id) {
            return Ok(schema.clone());
        }
        self.get_schema(database_id)
    }

    /// Database a page belongs to; asks the API for pages not seen in a query.
    fn parent_of(&self, id: &RecordId) -> Result<DatabaseId, StoreError> {
        if let Some(db) = lock(&self.parents).get(id) {
            return Ok(db.clone());
        }
        let page = self.page(id)?;
        let db = page
            .pointer("/parent/database_id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(STORE, format!("page {id} has no parent database")))?;
        let db = DatabaseId::from(db);
        lock(&self.parents).insert(id.clone(), db.clone());
        Ok(db)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordStore for NotionStore {
    fn get_schema(&self, database_id: &DatabaseId) -> Result<Schema, StoreError> {
        let path = format!("databases/{}", urlencoding::encode(&database_id.0));
        let database = self.call("GET", &path, None)?;
        let properties = database
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed(STORE, "database has no properties"))?;
        let schema = schema_from_properties(properties);
        lock(&self.schemas).insert(database_id.clone(), schema.clone());
        Ok(schema)
    }

    fn query_all(&self, database_id: &DatabaseId) -> Result<Vec<Record>, StoreError> {
        let path = format!("databases/{}/query", urlencoding::encode(&database_id.0));
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }
            let page = self.call("POST", &path, Some(&body))?;
            let results = page
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed(STORE, "query response has no results"))?;
            for result in results {
                records.push(record_from_page(result)?);
            }
            cursor = match (page.get("has_more"), page.get("next_cursor")) {
                (Some(Value::Bool(true)), Some(Value::String(next))) => Some(next.clone()),
                _ => break,
            };
        }

        let mut parents = lock(&self.parents);
        for record in &records {
            parents.insert(record.id.clone(), database_id.clone());
        }
        tracing::debug!(database = %database_id, records = records.len(), "queried database");
        Ok(records)
    }

    fn create_record(
        &self,
        database_id: &DatabaseId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<RecordId, StoreError> {
        let schema = self.cached_schema(database_id)?;
        let body = json!({
            "parent": { "database_id": database_id.0 },
            "properties": properties_payload(&schema, fields),
        });
        let page = self.call("POST", "pages", Some(&body))?;
        let id = page
            .get("id")
            .and_then(Value::as_str)
            .map(RecordId::from)
            .ok_or_else(|| malformed(STORE, "created page has no id"))?;
        lock(&self.parents).insert(id.clone(), database_id.clone());
        Ok(id)
    }

    fn update_record(
        &self,
        id: &RecordId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StoreError> {
        let schema = self.cached_schema(&self.parent_of(id)?)?;
        let body = json!({ "properties": properties_payload(&schema, fields) });
        let path = format!("pages/{}", urlencoding::encode(&id.0));
        match send(self.request("PATCH", &path), Some(&body)) {
            Ok(_) => Ok(()),
            Err(HttpError::Status(404, _)) => Err(StoreError::NotFound(id.clone())),
            Err(err) => Err(err.into_store(STORE)),
        }
    }

    fn get_record_title(&self, id: &RecordId) -> Result<String, StoreError> {
        let page = self.page(id)?;
        page_title(&page).ok_or_else(|| malformed(STORE, format!("page {id} has no title")))
    }
}

// ---------------------------------------------------------------------------
// Property JSON → core
// ---------------------------------------------------------------------------

/// Schema in the order the API lists the properties.
pub(crate) fn schema_from_properties(properties: &Map<String, Value>) -> Schema {
    Schema::new(
        properties
            .iter()
            .map(|(name, property)| FieldDescriptor::new(name.clone(), kind_of(property)))
            .collect(),
    )
}

fn kind_of(property: &Value) -> FieldKind {
    let kind = property.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "title" => FieldKind::Title,
        "rich_text" => FieldKind::Text,
        "number" => FieldKind::Number(
            property
                .pointer("/number/format")
                .and_then(Value::as_str)
                .map(NumberFormat::from)
                .unwrap_or_default(),
        ),
        "checkbox" => FieldKind::Checkbox,
        "select" => FieldKind::Select(option_names(property.pointer("/select/options"))),
        "multi_select" => {
            FieldKind::MultiSelect(option_names(property.pointer("/multi_select/options")))
        }
        "formula" => FieldKind::Formula,
        "rollup" => FieldKind::Rollup,
        "relation" => FieldKind::Relation,
        other => FieldKind::Unsupported(other.to_owned()),
    }
}

fn option_names(options: Option<&Value>) -> Vec<String> {
    options
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn record_from_page(page: &Value) -> Result<Record, StoreError> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(STORE, "page without id"))?;
    let mut record = Record::new(id);
    if let Some(properties) = page.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            if let Some(value) = field_value(property) {
                record.fields.insert(name.clone(), value);
            }
        }
    }
    Ok(record)
}

/// `None` for property types the engine does not translate.
fn field_value(property: &Value) -> Option<FieldValue> {
    let kind = property.get("type")?.as_str()?;
    let body = property.get(kind)?;
    match kind {
        "title" | "rich_text" => Some(FieldValue::Text(plain_text(body))),
        "number" => Some(FieldValue::Number(body.as_f64())),
        "checkbox" => Some(FieldValue::Checkbox(body.as_bool().unwrap_or(false))),
        "select" => Some(FieldValue::Select(
            body.get("name").and_then(Value::as_str).map(str::to_owned),
        )),
        "multi_select" => Some(FieldValue::MultiSelect(option_names(Some(body)))),
        "formula" | "rollup" => Some(FieldValue::Computed(computed_value(body))),
        "relation" => Some(FieldValue::Relation(
            body.as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.get("id").and_then(Value::as_str))
                        .map(RecordId::from)
                        .collect()
                })
                .unwrap_or_default(),
        )),
        _ => None,
    }
}

fn computed_value(body: &Value) -> ComputedValue {
    let kind = body.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "number" => ComputedValue::Number(body.get("number").and_then(Value::as_f64)),
        "string" => ComputedValue::String(
            body.get("string").and_then(Value::as_str).map(str::to_owned),
        ),
        "boolean" => ComputedValue::Boolean(body.get("boolean").and_then(Value::as_bool)),
        "date" => ComputedValue::Date(
            body.pointer("/date/start")
                .and_then(Value::as_str)
                .map(str::to_owned),
        ),
        "array" => ComputedValue::Array,
        "error" => ComputedValue::Error(
            body.get("error")
                .map(|e| e.as_str().map(str::to_owned).unwrap_or_else(|| e.to_string()))
                .unwrap_or_default(),
        ),
        _ => ComputedValue::Unsupported,
    }
}

/// Concatenated plain text of a rich-text array; `""` when empty.
fn plain_text(segments: &Value) -> String {
    segments
        .as_array()
        .map(|segs| {
            segs.iter()
                .filter_map(|s| {
                    s.get("plain_text")
                        .or_else(|| s.pointer("/text/content"))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn page_title(page: &Value) -> Option<String> {
    page.get("properties")?
        .as_object()?
        .values()
        .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(|p| p.get("title"))
        .map(plain_text)
}

// ---------------------------------------------------------------------------
// Core → property JSON
// ---------------------------------------------------------------------------

/// Property payload for a create or update. Fields the schema does not know,
/// and values the store computes itself, are left out.
pub(crate) fn properties_payload(
    schema: &Schema,
    fields: &BTreeMap<String, FieldValue>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in fields {
        let Some(descriptor) = schema.get(name) else {
            tracing::debug!(field = %name, "field not in schema, not sent");
            continue;
        };
        if let Some(property) = property_json(&descriptor.kind, value) {
            out.insert(name.clone(), property);
        }
    }
    out
}

fn property_json(kind: &FieldKind, value: &FieldValue) -> Option<Value> {
    let text = |content: &str| json!([{ "text": { "content": content } }]);
    match (kind, value) {
        (FieldKind::Title, FieldValue::Text(s)) => Some(json!({ "title": text(s) })),
        (FieldKind::Text, FieldValue::Text(s)) => Some(json!({ "rich_text": text(s) })),
        (FieldKind::Number(_), FieldValue::Number(n)) => Some(json!({ "number": n })),
        (FieldKind::Checkbox, FieldValue::Checkbox(b)) => Some(json!({ "checkbox": b })),
        (FieldKind::Select(_), FieldValue::Select(Some(name))) => {
            Some(json!({ "select": { "name": name } }))
        }
        (FieldKind::Select(_), FieldValue::Select(None)) => Some(json!({ "select": null })),
        (FieldKind::MultiSelect(_), FieldValue::MultiSelect(names)) => {
            let options: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
            Some(json!({ "multi_select": options }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> Map<String, Value> {
        let value = json!({
            "Name": { "id": "title", "type": "title", "title": {} },
            "Amount": { "id": "a", "type": "number", "number": { "format": "dollar" } },
            "Status": { "id": "s", "type": "select",
                        "select": { "options": [{ "name": "Open" }, { "name": "Done" }] } },
            "Tags": { "id": "t", "type": "multi_select", "multi_select": { "options": [] } },
            "Due": { "id": "d", "type": "date", "date": {} }
        });
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn schema_keeps_declaration_order_and_kinds() {
        let schema = schema_from_properties(&properties());
        let names: Vec<_> = schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Name", "Amount", "Status", "Tags", "Due"]);
        assert_eq!(
            schema.get("Amount").map(|f| &f.kind),
            Some(&FieldKind::Number(NumberFormat::Dollar))
        );
        assert_eq!(
            schema.get("Status").map(|f| &f.kind),
            Some(&FieldKind::Select(vec!["Open".into(), "Done".into()]))
        );
        assert_eq!(
            schema.get("Due").map(|f| &f.kind),
            Some(&FieldKind::Unsupported("date".into()))
        );
    }

    #[test]
    fn page_properties_become_field_values() {
        let page = json!({
            "id": "page-1",
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": "Rent" }] },
                "Notes": { "type": "rich_text", "rich_text": [] },
                "Amount": { "type": "number", "number": 1200.5 },
                "Paid": { "type": "checkbox", "checkbox": true },
                "Status": { "type": "select", "select": null },
                "Total": { "type": "formula", "formula": { "type": "number", "number": null } },
                "Sum": { "type": "rollup", "rollup": { "type": "array", "array": [] } },
                "Owner": { "type": "relation", "relation": [{ "id": "page-9" }] },
                "Due": { "type": "date", "date": { "start": "2024-01-01" } }
            }
        });

        let record = record_from_page(&page).expect("record");
        assert_eq!(record.id, RecordId::from("page-1"));
        assert_eq!(record.text("Name"), Some("Rent"));
        assert_eq!(record.fields["Notes"], FieldValue::Text(String::new()));
        assert_eq!(record.fields["Amount"], FieldValue::Number(Some(1200.5)));
        assert_eq!(record.fields["Paid"], FieldValue::Checkbox(true));
        assert_eq!(record.fields["Status"], FieldValue::Select(None));
        assert_eq!(
            record.fields["Total"],
            FieldValue::Computed(ComputedValue::Number(None))
        );
        assert_eq!(record.fields["Sum"], FieldValue::Computed(ComputedValue::Array));
        assert_eq!(
            record.fields["Owner"],
            FieldValue::Relation(vec![RecordId::from("page-9")])
        );
        assert!(!record.fields.contains_key("Due"));
    }

    #[test]
    fn payload_uses_the_schema_kind_of_each_field() {
        let schema = schema_from_properties(&properties());
        let fields = BTreeMap::from([
            ("Name".to_string(), FieldValue::Text("Rent".into())),
            ("Amount".to_string(), FieldValue::Number(Some(12.5))),
            ("Status".to_string(), FieldValue::Select(Some("Open".into()))),
            ("Tags".to_string(), FieldValue::MultiSelect(vec!["a".into(), "b".into()])),
            ("Ghost".to_string(), FieldValue::Text("nobody".into())),
        ]);

        let payload = properties_payload(&schema, &fields);
        assert_eq!(payload["Name"], json!({ "title": [{ "text": { "content": "Rent" } }] }));
        assert_eq!(payload["Amount"], json!({ "number": 12.5 }));
        assert_eq!(payload["Status"], json!({ "select": { "name": "Open" } }));
        assert_eq!(
            payload["Tags"],
            json!({ "multi_select": [{ "name": "a" }, { "name": "b" }] })
        );
        assert!(!payload.contains_key("Ghost"));
    }

    #[test]
    fn title_is_read_from_the_title_property() {
        let page = json!({
            "id": "page-9",
            "properties": {
                "Budget": { "type": "number", "number": 3 },
                "Who": { "type": "title", "title": [
                    { "plain_text": "Ada " }, { "plain_text": "Lovelace" }
                ] }
            }
        });
        assert_eq!(page_title(&page).as_deref(), Some("Ada Lovelace"));
    }
}
