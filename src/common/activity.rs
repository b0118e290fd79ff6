use serde_json::{Map, Value};

/// S3 prefix shared by activity summaries and unpacked archive entries.
pub const ACTIVITIES_PREFIX: &str = "activities";

/// One entry of the Garmin Connect activity search, kept verbatim so the
/// stored JSON carries every field the source returned, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    id: u64,
    fields: Map<String, Value>,
}

impl ActivitySummary {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        self.fields
            .get("activityName")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Deterministic S3 key whose existence marks the summary as synced.
    pub fn marker_key(&self) -> String {
        format!("{ACTIVITIES_PREFIX}/activity_{}.json", self.id)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.fields)
    }
}

impl TryFrom<Value> for ActivitySummary {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err("activity summary is not a JSON object".to_string());
        };

        // activityId normally arrives as a number, but tolerate a numeric string
        let id = match fields.get("activityId") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| "activity summary has no usable activityId".to_string())?;

        Ok(Self { id, fields })
    }
}

/// Reduce a display name to printable characters for log output.
pub fn printable(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
