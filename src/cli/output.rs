use eventlog::{Event, EventCursor, TimePartition};
use serde_json::{Value, json};

/// One JSON line per event. `cursor` resumes a listing right after it.
pub fn event_line(event: &Event) -> Value {
    json!({
        "uuid": event.uuid(),
        "type": event.event_type(),
        "timestamp": event.timestamp(),
        "date": event.date().to_rfc3339(),
        "checksum": event.checksum(),
        "payload": event.payload(),
        "cursor": EventCursor::after(event).to_string(),
    })
}

pub fn partition_line(partition: &TimePartition) -> Value {
    json!({
        "id": partition.id(),
        "start": partition.start(),
        "end": partition.end(),
        "type": partition.event_type(),
    })
}

pub fn emit(value: &Value) {
    println!("{}", value);
}
