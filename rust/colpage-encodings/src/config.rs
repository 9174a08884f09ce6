use colpage_common::{Result, error::Error};

/// Per-column parameters the codecs need beyond the values themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingConfig {
    /// Width of a fixed-length byte array column. Required by every
    /// fixed-length byte array codec.
    pub type_length: Option<usize>,

    /// Maximum definition level of the column.
    pub max_definition_level: i16,

    /// Maximum repetition level of the column.
    pub max_repetition_level: i16,
}

impl EncodingConfig {
    pub fn with_type_length(&self, type_length: usize) -> Self {
        let mut config = self.clone();
        config.type_length = Some(type_length);
        config
    }

    pub fn with_max_definition_level(&self, level: i16) -> Self {
        let mut config = self.clone();
        config.max_definition_level = level;
        config
    }

    pub fn with_max_repetition_level(&self, level: i16) -> Self {
        let mut config = self.clone();
        config.max_repetition_level = level;
        config
    }

    /// Returns the fixed-length byte array width, failing if it was not set.
    pub fn require_type_length(&self) -> Result<usize> {
        self.type_length
            .ok_or_else(|| Error::invalid_arg("type_length", "must be set for fixed-length byte arrays"))
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            type_length: None,
            max_definition_level: 0,
            max_repetition_level: 0,
        }
    }
}
