//! Topic and device ID validation
//!
//! Publish topics must be concrete topic names, while the subscription side
//! accepts MQTT filters with `+` and `#` wildcards in their legal positions.

use thiserror::Error;

/// Maximum encoded length of an MQTT topic
const MAX_TOPIC_LEN: usize = 65_535;

/// Validate a concrete topic name used for publishing
pub fn validate_publish_topic(topic: &str) -> Result<(), ValidationError> {
    check_common(topic)?;

    if let Some(ch) = topic.chars().find(|c| *c == '+' || *c == '#') {
        return Err(ValidationError::WildcardInTopic(ch));
    }

    Ok(())
}

/// Validate a subscription topic filter
///
/// `#` must occupy the whole last level, `+` must occupy a whole level.
pub fn validate_topic_filter(filter: &str) -> Result<(), ValidationError> {
    check_common(filter)?;

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != last) {
            return Err(ValidationError::MisplacedMultiLevelWildcard(
                filter.to_string(),
            ));
        }
        if level.contains('+') && *level != "+" {
            return Err(ValidationError::MisplacedSingleLevelWildcard(
                filter.to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate a device identifier (must match `[a-zA-Z0-9._-]+`)
pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidDeviceIdChar(ch));
        }
    }

    Ok(())
}

fn check_common(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(ValidationError::TopicTooLong(topic.len()));
    }
    if topic.contains('\0') {
        return Err(ValidationError::NulInTopic);
    }
    Ok(())
}

/// Validation errors for topics and identifiers
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Topic cannot be empty")]
    EmptyTopic,
    #[error("Topic is {0} bytes, longer than the MQTT limit")]
    TopicTooLong(usize),
    #[error("Topic contains a NUL character")]
    NulInTopic,
    #[error("Publish topic contains wildcard '{0}'")]
    WildcardInTopic(char),
    #[error("'#' must be the entire last level of the filter: {0}")]
    MisplacedMultiLevelWildcard(String),
    #[error("'+' must occupy an entire filter level: {0}")]
    MisplacedSingleLevelWildcard(String),
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidDeviceIdChar(char),
}
