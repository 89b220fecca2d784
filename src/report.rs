use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Free-form analyzer output. Each technique chooses its own keys.
pub type Payload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What pollers read back from the status sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: JobStatus,
    pub progress: u8,
    pub updated_at: String,
}

/// Outcome of one analyzer. Serialized as `{success, data}` or `{success, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "AnalyzerResultWire", try_from = "AnalyzerResultWire")]
pub enum AnalyzerResult {
    Success { data: Payload },
    Failure { error: String },
}

impl AnalyzerResult {
    pub fn success(data: Payload) -> Self {
        AnalyzerResult::Success { data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "analyzer failed without an error message".to_string()
        } else {
            error
        };
        AnalyzerResult::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalyzerResult::Success { .. })
    }

    pub fn data(&self) -> Option<&Payload> {
        match self {
            AnalyzerResult::Success { data } => Some(data),
            AnalyzerResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AnalyzerResult::Success { .. } => None,
            AnalyzerResult::Failure { error } => Some(error),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct AnalyzerResultWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<AnalyzerResult> for AnalyzerResultWire {
    fn from(r: AnalyzerResult) -> Self {
        match r {
            AnalyzerResult::Success { data } => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            AnalyzerResult::Failure { error } => Self {
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<AnalyzerResultWire> for AnalyzerResult {
    type Error = String;

    fn try_from(w: AnalyzerResultWire) -> Result<Self, Self::Error> {
        if w.success {
            Ok(AnalyzerResult::Success {
                data: w.data.unwrap_or_default(),
            })
        } else {
            match w.error {
                Some(error) => Ok(AnalyzerResult::Failure { error }),
                None => Err("failed analyzer entry is missing `error`".to_string()),
            }
        }
    }
}

/// Analyzer results keyed by name, kept in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: Vec<(String, AnalyzerResult)>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `name`, keeping its original position.
    pub fn insert(&mut self, name: impl Into<String>, result: AnalyzerResult) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = result;
        } else {
            self.entries.push((name, result));
        }
    }

    pub fn get(&self, name: &str) -> Option<&AnalyzerResult> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnalyzerResult)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|(_, r)| !r.is_success()).count()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, result) in &self.entries {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResultSetVisitor;

        impl<'de> Visitor<'de> for ResultSetVisitor {
            type Value = ResultSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of analyzer name to result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = ResultSet::new();
                while let Some((name, result)) = access.next_entry::<String, AnalyzerResult>()? {
                    set.insert(name, result);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ResultSetVisitor)
    }
}

/// The durable product of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub analysis_id: String,
    pub filename: String,
    pub timestamp: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,
    pub results: ResultSet,
}
