//! [`GridStore`] over the Google Sheets v4 REST API.

use serde_json::{json, Value};

use sheetsync_core::{CellValue, Grid, RangeRef};
use sheetsync_sync::store::{
    DetailedCell, FormatRule, FormattingDirective, GridStore, RenderMode, StoreError, WriteRows,
};

use super::{http_agent, malformed, send};

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const STORE: &str = "sheets";

pub struct SheetsStore {
    agent: ureq::Agent,
    base_url: String,
    spreadsheet_id: String,
    token: String,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            agent: http_agent(),
            base_url: SHEETS_API.to_owned(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    /// `suffix` is appended to the spreadsheet URL verbatim (`/values/..`,
    /// `:batchUpdate`, or empty).
    fn request(&self, method: &str, suffix: &str) -> ureq::Request {
        let url = format!(
            "{}/{}{suffix}",
            self.base_url,
            urlencoding::encode(&self.spreadsheet_id)
        );
        self.agent
            .request(method, &url)
            .set("Authorization", &format!("Bearer {}", self.token))
    }

    fn call(&self, request: ureq::Request, body: Option<&Value>) -> Result<Value, StoreError> {
        send(request, body).map_err(|e| e.into_store(STORE))
    }
}

fn values_path(range: &RangeRef) -> String {
    format!("/values/{}", urlencoding::encode(&range.0))
}

impl GridStore for SheetsStore {
    fn read_range(&self, range: &RangeRef, mode: RenderMode) -> Result<Grid, StoreError> {
        let option = match mode {
            RenderMode::Formatted => "FORMATTED_VALUE",
            RenderMode::Formula => "FORMULA",
        };
        let request = self
            .request("GET", &values_path(range))
            .query("valueRenderOption", option);
        let body = self.call(request, None)?;
        Ok(Grid::from_rows(rows_from_values(&body)))
    }

    fn read_grid_detailed(&self, range: &RangeRef) -> Result<Vec<Vec<DetailedCell>>, StoreError> {
        let request = self
            .request("GET", "")
            .query("ranges", &range.0)
            .query("includeGridData", "true")
            .query(
                "fields",
                "sheets.data.rowData.values(effectiveValue,formattedValue)",
            );
        let body = self.call(request, None)?;
        Ok(detailed_rows(&body))
    }

    fn write_range(&self, range: &RangeRef, rows: &WriteRows) -> Result<(), StoreError> {
        let request = self
            .request("PUT", &values_path(range))
            .query("valueInputOption", "USER_ENTERED");
        let body = json!({
            "range": range.0,
            "majorDimension": "ROWS",
            "values": write_payload(rows),
        });
        self.call(request, Some(&body))?;
        tracing::debug!(range = %range, rows = rows.len(), "wrote grid range");
        Ok(())
    }

    fn apply_formatting_rules(
        &self,
        sheet_id: i64,
        directives: &[FormattingDirective],
    ) -> Result<(), StoreError> {
        if directives.is_empty() {
            return Ok(());
        }
        let requests: Vec<Value> = directives
            .iter()
            .map(|d| formatting_request(sheet_id, d))
            .collect();
        let body = json!({ "requests": requests });
        self.call(self.request("POST", ":batchUpdate"), Some(&body))?;
        Ok(())
    }

    fn resolve_sheet_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        let request = self
            .request("GET", "")
            .query("fields", "sheets.properties(sheetId,title)");
        let body = self.call(request, None)?;
        let sheets = body
            .get("sheets")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(STORE, "spreadsheet has no sheets"))?;
        Ok(sheets.iter().find_map(|sheet| {
            let properties = sheet.get("properties")?;
            (properties.get("title")?.as_str()? == name)
                .then(|| properties.get("sheetId").and_then(Value::as_i64))
                .flatten()
        }))
    }
}

// ---------------------------------------------------------------------------
// Wire translation
// ---------------------------------------------------------------------------

fn cell_from_json(value: &Value) -> CellValue {
    match value {
        Value::String(s) if s.is_empty() => CellValue::Empty,
        Value::String(s) => CellValue::Text(s.clone()),
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
        Value::Bool(b) => CellValue::Bool(*b),
        _ => CellValue::Empty,
    }
}

/// `values` of a values-get answer; absent when the range is empty.
pub(crate) fn rows_from_values(body: &Value) -> Vec<Vec<CellValue>> {
    body.get("values")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_from_json).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Rows of the first grid block of a spreadsheet-get with grid data.
pub(crate) fn detailed_rows(body: &Value) -> Vec<Vec<DetailedCell>> {
    let Some(row_data) = body
        .pointer("/sheets/0/data/0/rowData")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    row_data
        .iter()
        .map(|row| {
            row.get("values")
                .and_then(Value::as_array)
                .map(|cells| cells.iter().map(detailed_cell).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn detailed_cell(cell: &Value) -> DetailedCell {
    let effective = cell.get("effectiveValue").and_then(|ev| {
        if let Some(n) = ev.get("numberValue").and_then(Value::as_f64) {
            Some(CellValue::Number(n))
        } else if let Some(s) = ev.get("stringValue").and_then(Value::as_str) {
            Some(CellValue::Text(s.to_owned()))
        } else {
            ev.get("boolValue").and_then(Value::as_bool).map(CellValue::Bool)
        }
    });
    DetailedCell {
        effective,
        formatted: cell
            .get("formattedValue")
            .and_then(Value::as_str)
            .map(str::to_owned),
    }
}

/// `null` leaves a cell untouched under `USER_ENTERED`.
pub(crate) fn write_payload(rows: &WriteRows) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    None => Value::Null,
                    Some(CellValue::Empty) => json!(""),
                    Some(CellValue::Text(s)) => json!(s),
                    Some(CellValue::Number(n)) => json!(n),
                    Some(CellValue::Bool(b)) => json!(b),
                })
                .collect()
        })
        .collect()
}

pub(crate) fn formatting_request(sheet_id: i64, directive: &FormattingDirective) -> Value {
    let column = directive.range.column;
    let range = json!({
        "sheetId": sheet_id,
        "startRowIndex": directive.range.start_row,
        "startColumnIndex": column,
        "endColumnIndex": column + 1,
    });
    match &directive.rule {
        FormatRule::OneOfList { options } => {
            let values: Vec<Value> = options
                .iter()
                .map(|o| json!({ "userEnteredValue": o }))
                .collect();
            json!({ "setDataValidation": {
                "range": range,
                "rule": {
                    "condition": { "type": "ONE_OF_LIST", "values": values },
                    "strict": true,
                    "showCustomUi": true,
                },
            }})
        }
        FormatRule::Boolean => json!({ "setDataValidation": {
            "range": range,
            "rule": { "condition": { "type": "BOOLEAN" }, "strict": true },
        }}),
        FormatRule::NumberPattern { pattern } => json!({ "repeatCell": {
            "range": range,
            "cell": { "userEnteredFormat": {
                "numberFormat": { "type": "NUMBER", "pattern": pattern },
            }},
            "fields": "userEnteredFormat.numberFormat",
        }}),
    }
}

#[cfg(test)]
mod tests {
    use sheetsync_sync::store::ColumnRange;

    use super::*;

    #[test]
    fn values_become_a_grid_with_header() {
        let body = json!({
            "range": "Tasks!A1:C3",
            "values": [["Title", "Done", "Cost"], ["Task A", "TRUE", "$1.00"], ["", "FALSE"]]
        });
        let grid = Grid::from_rows(rows_from_values(&body));
        assert_eq!(grid.header, ["Title", "Done", "Cost"]);
        assert_eq!(grid.cell(0, 2), &CellValue::Text("$1.00".into()));
        assert_eq!(grid.cell(1, 0), &CellValue::Empty);
        assert_eq!(grid.cell(1, 2), &CellValue::Empty);
    }

    #[test]
    fn empty_range_has_no_values_key() {
        assert!(rows_from_values(&json!({ "range": "Tasks!A1:C3" })).is_empty());
    }

    #[test]
    fn detailed_cells_keep_typed_and_formatted_values() {
        let body = json!({ "sheets": [{ "data": [{ "rowData": [
            { "values": [
                { "effectiveValue": { "stringValue": "Rate" }, "formattedValue": "Rate" },
                { "effectiveValue": { "numberValue": 0.25 }, "formattedValue": "25.0000%" }
            ]},
            {},
            { "values": [{ "effectiveValue": { "boolValue": true }, "formattedValue": "TRUE" }, {}] }
        ]}]}]});

        let rows = detailed_rows(&body);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1].value(), CellValue::Number(0.25));
        assert!(rows[1].is_empty());
        assert_eq!(rows[2][0].value(), CellValue::Bool(true));
        assert_eq!(rows[2][1].value(), CellValue::Empty);
    }

    #[test]
    fn masked_cells_are_sent_as_null() {
        let rows: WriteRows = vec![vec![
            Some(CellValue::from("Task")),
            None,
            Some(CellValue::Number(3.5)),
            Some(CellValue::Empty),
        ]];
        assert_eq!(
            write_payload(&rows),
            vec![vec![json!("Task"), Value::Null, json!(3.5), json!("")]]
        );
    }

    #[test]
    fn directives_target_one_column_below_the_header() {
        let directive = FormattingDirective {
            range: ColumnRange {
                sheet_id: 7,
                start_row: 1,
                column: 2,
            },
            rule: FormatRule::NumberPattern {
                pattern: "$#,##0.0000".into(),
            },
        };
        let request = formatting_request(7, &directive);
        assert_eq!(
            request.pointer("/repeatCell/range"),
            Some(&json!({
                "sheetId": 7, "startRowIndex": 1, "startColumnIndex": 2, "endColumnIndex": 3
            }))
        );
        assert_eq!(
            request.pointer("/repeatCell/cell/userEnteredFormat/numberFormat/pattern"),
            Some(&json!("$#,##0.0000"))
        );

        let select = FormattingDirective {
            rule: FormatRule::OneOfList {
                options: vec!["Open".into(), "Done".into()],
            },
            ..directive
        };
        let request = formatting_request(7, &select);
        assert_eq!(
            request.pointer("/setDataValidation/rule/condition/values/1/userEnteredValue"),
            Some(&json!("Done"))
        );
    }
}
