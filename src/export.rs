use std::io::Write;

use serde_json::{Map, Value as Json};

use crate::models::Table;

pub fn write_csv<W: Write>(table: &Table, writer: W) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(table.schema().names())?;
    for row in table.rows() {
        out.write_record(row.values().iter().map(|v| v.to_string()))?;
    }
    out.flush()?;
    Ok(())
}

pub fn to_json(table: &Table) -> serde_json::Result<Json> {
    let mut records = Vec::with_capacity(table.len());
    for row in table.rows() {
        let mut object = Map::new();
        for (field, value) in table.schema().fields().iter().zip(row.values()) {
            object.insert(field.name.clone(), serde_json::to_value(value)?);
        }
        records.push(Json::Object(object));
    }
    Ok(Json::Array(records))
}
