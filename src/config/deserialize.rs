// ABOUTME: Custom serde deserializers for inventory fields.
// ABOUTME: Keeps YAML mapping order for ssh options, which ssh evaluates first-wins.

use serde::de::{Deserializer, MapAccess, Visitor};
use std::fmt;

/// Deserialize a string-to-string mapping as pairs in document order.
pub fn deserialize_ordered_options<'de, D>(
    deserializer: D,
) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(OrderedOptionsVisitor)
}

struct OrderedOptionsVisitor;

impl<'de> Visitor<'de> for OrderedOptionsVisitor {
    type Value = Vec<(String, String)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of ssh option names to string values")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut options: Vec<(String, String)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, String>()? {
            if options.iter().any(|(existing, _)| *existing == key) {
                return Err(serde::de::Error::custom(format!("duplicate ssh option: {key}")));
            }
            options.push((key, value));
        }
        Ok(options)
    }
}
