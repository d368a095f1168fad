//! Wire-protocol settings for a log stream endpoint

/// Tokens that shape the event stream of one endpoint
///
/// Different dashboard endpoints speak the same framing but may name the
/// data field, the end marker and the control tags differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    /// Field name of the data-carrying line (`data: <payload>`)
    pub data_field: String,
    /// Payload that marks "no more data" without being a control record
    pub end_sentinel: String,
    /// JSON field distinguishing control records from log records
    pub type_field: String,
    /// `type` value announcing an intentional server-side close
    pub disconnect_tag: String,
    /// `type` value announcing that the job finished
    pub completion_tag: String,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            data_field: "data".to_string(),
            end_sentinel: "[DONE]".to_string(),
            type_field: "type".to_string(),
            disconnect_tag: "disconnected".to_string(),
            completion_tag: "completed".to_string(),
        }
    }
}
