use log::debug;
use serde::Deserialize;

/// The two fields the station displays. Only ever constructed whole: a
/// chunk that yields one field but not the other yields nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub condition: String,
    pub temp: i32,
}

impl Observation {
    pub fn report(&self, location: &str) -> String {
        format!(
            "Current weather in {}:\n\tCondition: {}\n\tTemperature: {}",
            location, self.condition, self.temp
        )
    }
}

#[derive(Debug, Deserialize)]
struct InformerDoc {
    #[serde(default)]
    fact: Option<Fact>,
}

#[derive(Debug, Deserialize)]
struct Fact {
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    temp: Option<i32>,
}

/// Scans one raw chunk for a weather document. Chunk boundaries come from
/// the transport, so the chunk may hold an HTTP header prelude, a complete
/// JSON body, a truncated one, or nothing of interest; every case short of
/// a complete document with both fields yields `None`.
///
/// Each chunk is parsed on its own. A document split across two reads is
/// dropped by both, matching the deployed firmware.
pub fn scan_chunk(chunk: &[u8]) -> Option<Observation> {
    let start = chunk.iter().position(|&byte| byte == b'{')?;

    // One self-contained JSON value; trailing bytes after it are ignored.
    let mut de = serde_json::Deserializer::from_slice(&chunk[start..]);
    let doc = match InformerDoc::deserialize(&mut de) {
        Ok(doc) => doc,
        Err(err) => {
            debug!("chunk is not a parseable weather document: {err}");
            return None;
        }
    };

    let fact = doc.fact?;
    match (fact.condition, fact.temp) {
        (Some(condition), Some(temp)) => Some(Observation { condition, temp }),
        _ => {
            debug!("weather document is missing condition or temp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn chunk_without_an_object_yields_nothing() {
        let headers = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n";

        assert_eq!(scan_chunk(headers), None);
        assert_eq!(scan_chunk(b""), None);
    }

    #[test]
    fn complete_document_yields_both_fields() {
        let chunk = br#"{"fact":{"condition":"clear","temp":-5}}"#;

        let observation = scan_chunk(chunk).unwrap();

        assert_eq!(observation.condition, "clear");
        assert_eq!(observation.temp, -5);
    }

    #[test]
    fn missing_condition_discards_the_whole_observation() {
        assert_eq!(scan_chunk(br#"{"fact":{"temp":10}}"#), None);
    }

    #[test]
    fn missing_temp_discards_the_whole_observation() {
        assert_eq!(scan_chunk(br#"{"fact":{"condition":"cloudy"}}"#), None);
    }

    #[test]
    fn missing_fact_object_yields_nothing() {
        assert_eq!(scan_chunk(br#"{"now":1700000000}"#), None);
    }

    #[test]
    fn header_prelude_in_the_same_chunk_is_skipped() {
        let chunk =
            b"HTTP/1.1 200 OK\r\n\r\n{\"fact\":{\"condition\":\"overcast\",\"temp\":3}}";

        let observation = scan_chunk(chunk).unwrap();

        assert_eq!(observation.condition, "overcast");
        assert_eq!(observation.temp, 3);
    }

    #[test]
    fn trailing_bytes_after_the_document_are_ignored() {
        let chunk = br#"{"fact":{"condition":"snow","temp":-12}}trailing noise"#;

        let observation = scan_chunk(chunk).unwrap();

        assert_eq!(observation.condition, "snow");
        assert_eq!(observation.temp, -12);
    }

    #[test]
    fn truncated_document_yields_nothing() {
        assert_eq!(scan_chunk(br#"{"fact":{"condition":"clear","te"#), None);
    }

    #[test]
    fn unrelated_fields_in_the_payload_are_tolerated() {
        let chunk = br#"{"now":1700000000,"fact":{"temp":7,"feels_like":4,"icon":"bkn_d","condition":"cloudy","wind_speed":2.3},"forecast":{"date":"2026-08-07"}}"#;

        let observation = scan_chunk(chunk).unwrap();

        assert_eq!(observation.condition, "cloudy");
        assert_eq!(observation.temp, 7);
    }

    #[test]
    fn report_renders_the_two_display_lines() {
        let observation = Observation {
            condition: "clear".to_string(),
            temp: -5,
        };

        assert_eq!(
            observation.report("Saint-Petersburg"),
            "Current weather in Saint-Petersburg:\n\tCondition: clear\n\tTemperature: -5"
        );
    }
}
