//! Record format for intermediate and reduce output files.
//!
//! A file is a bare sequence of JSON objects, one [`KeyValue`] per line,
//! with nothing before, between or after them. Readers decode until the
//! stream ends or a record no longer parses, whichever comes first.

use std::io::{Read, Write};

use anyhow::{Context, Result};

use crate::KeyValue;

/// Append `records` to `writer`, one per line.
pub fn write_records<'a, W, I>(mut writer: W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a KeyValue>,
{
    for kv in records {
        serde_json::to_writer(&mut writer, kv)
            .with_context(|| format!("failed to encode record for key `{}`", kv.key))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Lazily decode records from `reader`.
///
/// A malformed or truncated record ends the stream; it is not reported.
pub fn read_records<R: Read>(reader: R) -> impl Iterator<Item = KeyValue> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<KeyValue>()
        .map_while(|record| record.ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(records: &[KeyValue]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_records(&mut buf, records).unwrap();
        buf
    }

    #[test]
    fn records_round_trip_in_order() {
        let records = vec![
            KeyValue::new("b", "1"),
            KeyValue::new("a", "2"),
            KeyValue::new("with \"quotes\"\nand newline", ""),
            KeyValue::new("a", "3"),
        ];
        let decoded: Vec<_> = read_records(encode(&records).as_slice()).collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn one_record_per_line() {
        let buf = encode(&[KeyValue::new("x", "1"), KeyValue::new("y", "2")]);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "{\"Key\":\"x\",\"Value\":\"1\"}\n{\"Key\":\"y\",\"Value\":\"2\"}\n");
    }

    #[test]
    fn empty_stream_decodes_to_nothing() {
        assert_eq!(read_records(&b""[..]).count(), 0);
    }

    #[test]
    fn decoding_stops_at_first_bad_record() {
        let mut buf = encode(&[KeyValue::new("x", "1")]);
        buf.extend_from_slice(b"{\"Key\":\"y\",\"Val");
        buf.extend_from_slice(&encode(&[KeyValue::new("z", "3")]));

        let decoded: Vec<_> = read_records(buf.as_slice()).collect();
        assert_eq!(decoded, vec![KeyValue::new("x", "1")]);
    }
}
