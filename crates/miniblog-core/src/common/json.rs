//! Protobuf enum fields are stored as `i32`. These adapters render them by
//! name in JSON and accept either the name or the number on input.

pub mod service_status {
    use crate::proto::ServiceStatus;
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Name(String),
        Number(i32),
    }

    pub fn serialize<S: Serializer>(value: &i32, serializer: S) -> Result<S::Ok, S::Error> {
        match ServiceStatus::try_from(*value) {
            Ok(status) => serializer.serialize_str(status.as_str_name()),
            // Unknown values keep their number.
            Err(_) => serializer.serialize_i32(*value),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Name(name) => ServiceStatus::from_str_name(&name)
                .map(i32::from)
                .ok_or_else(|| de::Error::unknown_variant(&name, &["Healthy", "Unhealthy"])),
        }
    }
}
