use rusqlite::types::ValueRef;
use serde_json::{Map, Number, Value};

/// A fetched record keyed by column name.
pub type Row = Map<String, Value>;

/// Convert the current rusqlite row into a [`Row`] using `columns` as keys.
pub(crate) fn to_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut out = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        out.insert(name.clone(), value_of(row.get_ref(idx)?));
    }
    Ok(out)
}

fn value_of(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        // Blobs only show up in image payloads; keep them readable rather than dropping them.
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn maps_each_sqlite_type() {
        let conn = Connection::open_in_memory().unwrap();
        let columns = vec![
            "n".to_string(),
            "i".to_string(),
            "r".to_string(),
            "t".to_string(),
        ];
        let row = conn
            .query_row("SELECT NULL AS n, 7 AS i, 1.5 AS r, 'abc' AS t", [], |r| {
                to_row(r, &columns)
            })
            .unwrap();
        assert_eq!(row["n"], Value::Null);
        assert_eq!(row["i"], Value::from(7));
        assert_eq!(row["r"], Value::from(1.5));
        assert_eq!(row["t"], Value::from("abc"));
    }
}
