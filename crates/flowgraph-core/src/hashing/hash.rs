//! Hash helpers sobre BLAKE3, encapsulados para poder cambiar de algoritmo
//! sin tocar el resto del motor.
use blake3::Hasher;
use serde_json::Value;

use super::to_canonical_json;

pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

pub fn hash_value(v: &Value) -> String {
    hash_str(&to_canonical_json(v))
}
