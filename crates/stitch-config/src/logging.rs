use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How build diagnostics and engine events are written to the log.
///
/// Names are matched without regard to case wherever they are read, so
/// `STITCH_LOG_FORMAT=JSON` and `log_format = "json"` agree.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case", try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, carrying build and context fields.
    Json,
    /// Single human-readable line per event.
    #[default]
    Compact,
}

impl LogFormat {
    /// Returns `true` when events carry machine-readable fields only.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

impl TryFrom<String> for LogFormat {
    type Error = LogFormatParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.trim().parse()
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::LogFormat;

    #[rstest]
    #[case::lower("json", LogFormat::Json)]
    #[case::upper("JSON", LogFormat::Json)]
    #[case::padded(" compact ", LogFormat::Compact)]
    fn names_parse_without_case(#[case] name: &str, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::try_from(name.to_owned()), Ok(expected));
    }

    #[rstest]
    fn unknown_names_are_rejected() {
        assert!(LogFormat::try_from("pretty".to_owned()).is_err());
    }

    #[rstest]
    fn only_json_is_structured() {
        assert!(LogFormat::Json.is_structured());
        assert!(!LogFormat::Compact.is_structured());
    }
}
