use serde::Deserialize;

/// LLM responses sometimes wrap JSON in prose or code fences; take the
/// first `{...}` span rather than requiring the whole response to parse.
pub fn parse_json_object<T: for<'de> Deserialize<'de>>(raw: &str) -> Option<T> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

/// Same idea as [`parse_json_object`] but for a top-level JSON array.
pub fn parse_json_array<T: for<'de> Deserialize<'de>>(raw: &str) -> Option<Vec<T>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let sample: Sample = parse_json_object("sure, here: {\"value\": 7} thanks").unwrap();
        assert_eq!(sample.value, 7);
    }

    #[test]
    fn extracts_array_from_surrounding_prose() {
        let samples: Vec<Sample> =
            parse_json_array("```json\n[{\"value\": 1}, {\"value\": 2}]\n```").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 2);
    }
}
