//! Prints the tag tree of a framed row without knowing its schema.
//!
//! ```text
//! cargo run --example inspect_row -- path/to/row.slim
//! RUST_LOG=slim_codec=trace cargo run --example inspect_row
//! ```

use std::fs;

use chrono::{TimeZone, Utc};
use slim_codec::model::{Row, SchemaBuilder};
use slim_codec::{encode_row_compressed, inspect_row, RecordValue, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Episode {
    title: String,
    number: u32,
    aired: Option<chrono::DateTime<Utc>>,
    tags: Vec<String>,
    guests: Vec<Guest>,
}

#[derive(Debug, Default)]
struct Guest {
    name: String,
    minutes: f64,
}

impl Row for Episode {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .scalar("t", "title", |r| &r.title, |r| &mut r.title)
            .scalar("n", "number", |r| &r.number, |r| &mut r.number)
            .nullable("a", "aired", |r| &r.aired, |r| &mut r.aired)
            .list("tg", "tags", |r| &r.tags, |r| &mut r.tags)
            .record_list("g", "guests", |r| &r.guests, |r| &mut r.guests);
    }
}

impl Row for Guest {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .scalar("n", "name", |r| &r.name, |r| &mut r.name)
            .scalar("m", "minutes", |r| &r.minutes, |r| &mut r.minutes);
    }
}

fn demo_row() -> Vec<u8> {
    let episode = Episode {
        title: "Pilot".to_string(),
        number: 1,
        aired: Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).single(),
        tags: vec!["intro".to_string(), "news".to_string()],
        guests: vec![
            Guest {
                name: "Ada".to_string(),
                minutes: 41.5,
            },
            Guest {
                name: "Grace".to_string(),
                minutes: 12.0,
            },
        ],
    };
    encode_row_compressed(&episode, 3).expect("Failed to encode demo row")
}

fn format_value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Text(s) => {
            let preview: String = s.chars().take(60).collect();
            if s.chars().count() > 60 {
                format!("\"{}...\"", preview)
            } else {
                format!("\"{}\"", preview)
            }
        }
        Value::Bytes(b) => format!("BYTES[{}]", b.len()),
        Value::DateTime(t) => format!("DATETIME({})", t.to_rfc3339()),
        Value::Duration(d) => format!("DURATION({}ms)", d.num_milliseconds()),
        Value::Guid(g) => format!("GUID({})", g),
        Value::Decimal(d) => format!("DECIMAL(m={}, s={})", d.mantissa(), d.scale()),
        Value::Enum(name) => format!("ENUM({})", name),
        Value::Array(wire, items) => format!("ARRAY<{:?}>[{}]", wire, items.len()),
        Value::List(wire, items) => format!("LIST<{:?}>[{}]", wire, items.len()),
        Value::Record(r) => format!("RECORD{{{}}}", r.len()),
        other => format!("{:?}", other),
    }
}

fn print_record(record: &RecordValue, indent: usize) {
    let pad = "  ".repeat(indent);
    for (tag, value) in record.iter() {
        println!("{}{} = {}", pad, tag, format_value(value));
        match value {
            Value::Record(inner) => print_record(inner, indent + 1),
            Value::Array(_, items) | Value::List(_, items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Record(inner) = item {
                        println!("{}  [{}]", pad, i);
                        print_record(inner, indent + 2);
                    }
                }
            }
            _ => {}
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let data = match std::env::args().nth(1) {
        Some(path) => {
            println!("Reading: {}", path);
            fs::read(&path).expect("Failed to read file")
        }
        None => {
            println!("No file given, using a built-in demo row");
            demo_row()
        }
    };
    println!("Size: {} bytes", data.len());

    let record = inspect_row(&data).expect("Failed to decode");

    println!("\n=== Row ({} tags) ===", record.len());
    print_record(&record, 0);
}
