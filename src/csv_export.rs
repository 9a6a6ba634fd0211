//! Flattening normalized rows into CSV for download.

use serde_json::Value;

use crate::normalize::Record;

/// Serialize `rows` as CSV. The header is the union of all keys in the order
/// they are first seen; missing values and nulls are written as empty fields.
pub fn to_csv(rows: &[Record]) -> Result<Vec<u8>, csv::Error> {
    let mut header: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if header.is_empty() {
        return writer.into_inner().map_err(|e| e.into_error().into());
    }

    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(header.iter().map(|key| field(row.get(*key))))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

fn field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn writes_header_and_rows() {
        let rows = vec![
            record(json!({"TradDt": "2024-01-02", "TckrSymb": "INFY", "ClsPric": 1520.5})),
            record(json!({"TradDt": "2024-01-02", "TckrSymb": "TCS", "ClsPric": 3801})),
        ];

        let out = String::from_utf8(to_csv(&rows).unwrap()).unwrap();

        assert_eq!(
            out,
            "TradDt,TckrSymb,ClsPric\n2024-01-02,INFY,1520.5\n2024-01-02,TCS,3801\n"
        );
    }

    #[test]
    fn quotes_fields_and_fills_missing_columns() {
        let rows = vec![
            record(json!({"name": "A, B", "note": null})),
            record(json!({"name": "say \"hi\"", "extra": true})),
        ];

        let out = String::from_utf8(to_csv(&rows).unwrap()).unwrap();

        assert_eq!(
            out,
            "name,note,extra\n\"A, B\",,\n\"say \"\"hi\"\"\",,true\n"
        );
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(to_csv(&[]).unwrap().is_empty());
    }
}
