//! The row/schema serializer.
//!
//! Layout of a single encoded row: a null bitmap (`ceil(|cols| / 8)` bytes,
//! bit `i` set iff column `i` is NULL) followed by each column's payload in
//! schema order. A `Rows` block on disk is a 4-byte row count followed by,
//! for each row, a 4-byte length prefix and the row's bytes.

use crate::error::EncodeError;
use crate::value::{Row, Value};
use relix_primitives::ColumnType;
use relix_schema::Schema;

fn bitmap_len(num_cols: usize) -> usize {
    (num_cols + 7) / 8
}

/// The maximum serialized width of a row conforming to `schema`: the null
/// bitmap plus the per-column fixed maxima.
pub fn calculate_row_size(schema: &Schema) -> usize {
    bitmap_len(schema.columns.len())
        + schema
            .columns
            .iter()
            .map(|c| c.col_type.max_encoded_len())
            .sum::<usize>()
}

/// Encodes a row against `schema`. Values for non-nullable columns must not
/// be `Value::Null`. Strings longer than their declared column's max length
/// are truncated, not rejected, matching the source's behavior.
pub fn encode_row(schema: &Schema, row: &Row) -> Result<Vec<u8>, EncodeError> {
    let mut bitmap = vec![0u8; bitmap_len(schema.columns.len())];
    let mut payload = Vec::with_capacity(calculate_row_size(schema));

    for (i, col) in schema.columns.iter().enumerate() {
        let value = row.get(&col.name).unwrap_or(&Value::Null);
        if value.is_null() {
            if !col.nullable {
                return Err(EncodeError::NullOnNotNullable(col.name.clone()));
            }
            bitmap[i / 8] |= 1 << (i % 8);
        }
        match col.col_type {
            ColumnType::Integer => {
                let v = match value {
                    Value::Integer(v) => *v,
                    Value::Null => 0,
                    _ => {
                        return Err(EncodeError::WrongType {
                            column: col.name.clone(),
                            expected: "INTEGER",
                        })
                    }
                };
                payload.extend_from_slice(&v.to_le_bytes());
            }
            ColumnType::Float => {
                let v = match value {
                    Value::Float(v) => *v,
                    Value::Integer(v) => *v as f64,
                    Value::Null => 0.0,
                    _ => {
                        return Err(EncodeError::WrongType {
                            column: col.name.clone(),
                            expected: "FLOAT",
                        })
                    }
                };
                payload.extend_from_slice(&v.to_le_bytes());
            }
            ColumnType::Char(n) => {
                let s = match value {
                    Value::Text(s) => s.as_str(),
                    Value::Null => "",
                    _ => {
                        return Err(EncodeError::WrongType {
                            column: col.name.clone(),
                            expected: "CHAR",
                        })
                    }
                };
                write_char(&mut payload, s, n as usize);
            }
            ColumnType::Varchar(n) => {
                let s = match value {
                    Value::Text(s) => s.as_str(),
                    Value::Null => "",
                    _ => {
                        return Err(EncodeError::WrongType {
                            column: col.name.clone(),
                            expected: "VARCHAR",
                        })
                    }
                };
                write_varchar(&mut payload, s, n as usize);
            }
        }
    }

    let mut out = bitmap;
    out.extend(payload);
    Ok(out)
}

fn write_char(out: &mut Vec<u8>, s: &str, max_len: usize) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(max_len);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + (max_len - take), 0u8);
}

fn write_varchar(out: &mut Vec<u8>, s: &str, max_len: usize) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(max_len);
    out.extend_from_slice(&(take as u16).to_le_bytes());
    out.extend_from_slice(&bytes[..take]);
}

/// Decodes a single row from `buf` against `schema`. Returns `None` if `buf`
/// does not hold enough bytes for a complete row (the caller is expected to
/// treat this the same as a truncated `Rows` block: stop, don't panic).
pub fn decode_row(schema: &Schema, buf: &[u8]) -> Option<Row> {
    let nbits = schema.columns.len();
    let blen = bitmap_len(nbits);
    if buf.len() < blen {
        return None;
    }
    let bitmap = &buf[..blen];
    let mut cursor = blen;
    let mut row = Row::new();

    for (i, col) in schema.columns.iter().enumerate() {
        let bit_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
        match col.col_type {
            ColumnType::Integer => {
                if buf.len() < cursor + 4 {
                    return None;
                }
                let raw = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
                cursor += 4;
                row.insert(col.name.clone(), if bit_null { Value::Null } else { Value::Integer(raw) });
            }
            ColumnType::Float => {
                if buf.len() < cursor + 8 {
                    return None;
                }
                let raw = f64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
                cursor += 8;
                row.insert(col.name.clone(), if bit_null { Value::Null } else { Value::Float(raw) });
            }
            ColumnType::Char(n) => {
                let n = n as usize;
                if buf.len() < cursor + n {
                    return None;
                }
                let raw = &buf[cursor..cursor + n];
                cursor += n;
                let trimmed = raw.iter().rev().skip_while(|&&b| b == 0).count();
                let s = String::from_utf8_lossy(&raw[..trimmed]).into_owned();
                // Open question #1: a CHAR value that decodes to the empty
                // string is indistinguishable from NULL and is reported as
                // NULL, regardless of the bitmap bit (see DESIGN.md).
                row.insert(col.name.clone(), if s.is_empty() { Value::Null } else { Value::Text(s) });
            }
            ColumnType::Varchar(max) => {
                if buf.len() < cursor + 2 {
                    return None;
                }
                let len = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
                cursor += 2;
                if len > max as usize || buf.len() < cursor + len {
                    return None;
                }
                let raw = &buf[cursor..cursor + len];
                cursor += len;
                let s = String::from_utf8_lossy(raw).into_owned();
                row.insert(col.name.clone(), if bit_null { Value::Null } else { Value::Text(s) });
            }
        }
    }
    Some(row)
}

/// Encodes a `Rows` block: count, then length-prefixed rows.
pub fn encode_rows_block(schema: &Schema, rows: &[Row]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    out.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    for row in rows {
        let encoded = encode_row(schema, row)?;
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
    }
    Ok(out)
}

/// Decodes a `Rows` block. If the buffer is truncated mid-way through, the
/// rows successfully decoded so far are returned rather than raising.
pub fn decode_rows_block(schema: &Schema, buf: &[u8]) -> Vec<Row> {
    if buf.len() < 4 {
        return Vec::new();
    }
    let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let mut rows = Vec::with_capacity(count.min(1 << 20));
    let mut cursor = 4;
    for _ in 0..count {
        if buf.len() < cursor + 4 {
            break;
        }
        let len = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if buf.len() < cursor + len {
            break;
        }
        match decode_row(schema, &buf[cursor..cursor + len]) {
            Some(row) => rows.push(row),
            None => break,
        }
        cursor += len;
    }
    rows
}
