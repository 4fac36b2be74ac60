//! Esquema Diesel del log de eventos durable. Reemplazable con `diesel
//! print-schema` una vez exista una base real contra la que generarlo.
#![cfg(feature = "postgres")]

diesel::table! {
    event_log (seq) {
        seq -> BigInt,
        aggregate_path -> Text,
        aggregate_id -> Jsonb,
        event_type -> Text,
        payload -> Jsonb,
        ts -> Timestamptz,
    }
}
