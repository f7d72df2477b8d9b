//! Outcome vocabulary and the worst-status fold.
//!
//! [`Status`] and [`ErrorCategory`] are the closed enumerations every other
//! crate records. [`fold_worst`] is the single aggregation rule shared by the
//! live per-model status and the historical calendar rollups, so the two can
//! never disagree about precedence.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::DurationMs;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Result of a single scenario check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Scenario passed.
    Ok,
    /// Scenario passed but exceeded the presentation speed threshold.
    Slow,
    /// Partial failure or unexpected behaviour.
    Degraded,
    /// Scenario failed with an error.
    Failed,
    /// Model or service not reachable.
    Unavailable,
    /// Model intentionally offline; not a failure.
    Cold,
}

impl Status {
    /// Every status, in declaration order.
    pub const ALL: [Status; 6] = [
        Status::Ok,
        Status::Slow,
        Status::Degraded,
        Status::Failed,
        Status::Unavailable,
        Status::Cold,
    ];

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Slow => "SLOW",
            Status::Degraded => "DEGRADED",
            Status::Failed => "FAILED",
            Status::Unavailable => "UNAVAILABLE",
            Status::Cold => "COLD",
        }
    }

    /// Parse the wire representation. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Statuses that advance a scenario's last-success watermark.
    pub fn is_passing(self) -> bool {
        matches!(self, Status::Ok | Status::Slow)
    }

    /// Statuses that make a run exit non-zero.
    pub fn is_fatal(self) -> bool {
        matches!(self, Status::Failed | Status::Unavailable)
    }

    /// Statuses listed in the recent-failures feed.
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failed | Status::Unavailable | Status::Degraded)
    }

    /// One-character console symbol.
    pub fn symbol(self) -> char {
        match self {
            Status::Ok => '✓',
            Status::Slow => '~',
            Status::Degraded => '⚠',
            Status::Failed => '✗',
            Status::Unavailable => '·',
            Status::Cold => '○',
        }
    }

    /// Apply the presentation-time speed threshold.
    ///
    /// An `OK` result slower than `threshold_ms` is shown as `SLOW`. All other
    /// statuses pass through, as does everything when no threshold is set.
    pub fn with_speed_threshold(
        self,
        duration_ms: DurationMs,
        threshold_ms: Option<DurationMs>,
    ) -> Self {
        match (self, threshold_ms) {
            (Status::Ok, Some(limit)) if duration_ms > limit => Status::Slow,
            _ => self,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Worst-status fold
// ---------------------------------------------------------------------------

/// Fold a multiset of statuses into the single worst one.
///
/// Precedence: `UNAVAILABLE`, `FAILED`, `DEGRADED`, `SLOW`. `COLD` is returned
/// only when every input is `COLD`; any other mix folds to `OK`. Returns
/// `None` for an empty input ("no data").
///
/// ```
/// use modelwatch_core::status::{fold_worst, Status};
///
/// assert_eq!(fold_worst([Status::Ok, Status::Slow, Status::Failed]), Some(Status::Failed));
/// assert_eq!(fold_worst([Status::Cold, Status::Ok]), Some(Status::Ok));
/// assert_eq!(fold_worst(Vec::<Status>::new()), None);
/// ```
pub fn fold_worst<I>(statuses: I) -> Option<Status>
where
    I: IntoIterator<Item = Status>,
{
    let mut seen = [false; Status::ALL.len()];
    let mut any = false;
    let mut all_cold = true;

    for status in statuses {
        any = true;
        all_cold &= status == Status::Cold;
        seen[status as usize] = true;
    }

    if !any {
        return None;
    }

    let precedence = [Status::Unavailable, Status::Failed, Status::Degraded, Status::Slow];
    if let Some(worst) = precedence.into_iter().find(|s| seen[*s as usize]) {
        return Some(worst);
    }

    Some(if all_cold { Status::Cold } else { Status::Ok })
}

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Root-cause classification of a failed scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    ModelNotLoaded,
    SerializationError,
    Timeout,
    ShapeMismatch,
    ValueError,
    ConnectionError,
    AuthError,
    ImportError,
    Unknown,
}

impl ErrorCategory {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::ModelNotLoaded => "MODEL_NOT_LOADED",
            ErrorCategory::SerializationError => "SERIALIZATION_ERROR",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::ShapeMismatch => "SHAPE_MISMATCH",
            ErrorCategory::ValueError => "VALUE_ERROR",
            ErrorCategory::ConnectionError => "CONNECTION_ERROR",
            ErrorCategory::AuthError => "AUTH_ERROR",
            ErrorCategory::ImportError => "IMPORT_ERROR",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered classification table. Patterns run against lower-cased text.
const ERROR_RULES: &[(&str, ErrorCategory)] = &[
    (r"not whitelisted|whitelist", ErrorCategory::SerializationError),
    (r"serializ|pickle|marshal", ErrorCategory::SerializationError),
    (r"timeout|timed out|deadline exceeded", ErrorCategory::Timeout),
    (r"connection|network|unreachable|refused", ErrorCategory::ConnectionError),
    (r"auth|api.key|unauthorized|forbidden|401|403", ErrorCategory::AuthError),
    (
        r"not loaded|not available|not deployed|not found.*model",
        ErrorCategory::ModelNotLoaded,
    ),
    (r"shape|dimension|size mismatch|expected.*got", ErrorCategory::ShapeMismatch),
    (r"nan|inf|invalid value|value error", ErrorCategory::ValueError),
    (r"import|module|no module named|cannot import", ErrorCategory::ImportError),
];

static ERROR_PATTERNS: LazyLock<Vec<(Regex, ErrorCategory)>> = LazyLock::new(|| {
    ERROR_RULES
        .iter()
        .map(|(pattern, category)| (Regex::new(pattern).expect("valid regex"), *category))
        .collect()
});

/// Classify free-text error details. First matching rule wins.
pub fn classify_error(text: &str) -> ErrorCategory {
    let lower = text.to_lowercase();
    ERROR_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Map a raw executor outcome to a stored status.
///
/// `SLOW` is never produced here; speed is judged at presentation time so the
/// threshold can be retuned without re-running tests.
pub fn determine_status(succeeded: bool, error_text: Option<&str>) -> Status {
    if succeeded {
        return Status::Ok;
    }
    match error_text.map(classify_error) {
        Some(ErrorCategory::ModelNotLoaded) => Status::Unavailable,
        _ => Status::Failed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- fold_worst --

    #[test]
    fn fold_precedence_cases() {
        assert_eq!(
            fold_worst([Status::Ok, Status::Slow, Status::Failed]),
            Some(Status::Failed)
        );
        assert_eq!(fold_worst([Status::Ok, Status::Slow]), Some(Status::Slow));
        assert_eq!(fold_worst([Status::Cold, Status::Cold]), Some(Status::Cold));
        assert_eq!(fold_worst([Status::Cold, Status::Ok]), Some(Status::Ok));
        assert_eq!(fold_worst(Vec::<Status>::new()), None);
    }

    #[test]
    fn fold_unavailable_outranks_failed() {
        assert_eq!(
            fold_worst([Status::Failed, Status::Unavailable, Status::Ok]),
            Some(Status::Unavailable)
        );
    }

    #[test]
    fn fold_cold_with_degraded_is_degraded() {
        assert_eq!(
            fold_worst([Status::Cold, Status::Degraded]),
            Some(Status::Degraded)
        );
    }

    #[test]
    fn fold_is_order_independent() {
        let statuses = [Status::Ok, Status::Cold, Status::Slow, Status::Degraded];
        let expected = fold_worst(statuses);
        // Every rotation and the reversed sequence fold identically.
        for shift in 0..statuses.len() {
            let mut rotated = statuses.to_vec();
            rotated.rotate_left(shift);
            assert_eq!(fold_worst(rotated.clone()), expected);
            rotated.reverse();
            assert_eq!(fold_worst(rotated), expected);
        }
    }

    #[test]
    fn fold_is_associative_over_partitions() {
        let left = [Status::Ok, Status::Cold];
        let right = [Status::Slow, Status::Ok];
        let whole = fold_worst(left.iter().chain(right.iter()).copied());
        let partial = [fold_worst(left), fold_worst(right)]
            .into_iter()
            .flatten();
        assert_eq!(fold_worst(partial), whole);
    }

    // -- Status helpers --

    #[test]
    fn status_parse_round_trips_wire_names() {
        for status in Status::ALL {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("ok"), None);
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&Status::Unavailable).expect("serialize");
        assert_eq!(json, "\"UNAVAILABLE\"");
    }

    #[test]
    fn speed_threshold_only_touches_ok() {
        assert_eq!(Status::Ok.with_speed_threshold(31_000, Some(30_000)), Status::Slow);
        assert_eq!(Status::Ok.with_speed_threshold(30_000, Some(30_000)), Status::Ok);
        assert_eq!(Status::Ok.with_speed_threshold(90_000, None), Status::Ok);
        assert_eq!(
            Status::Failed.with_speed_threshold(90_000, Some(1)),
            Status::Failed
        );
    }

    // -- classify_error --

    #[test]
    fn classify_examples() {
        assert_eq!(
            classify_error("Connection refused by host"),
            ErrorCategory::ConnectionError
        );
        assert_eq!(
            classify_error("tensor shape mismatch: expected [1,4] got [1,3]"),
            ErrorCategory::ShapeMismatch
        );
        assert_eq!(
            classify_error("totally novel message xyz"),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn classify_is_case_insensitive_and_ordered() {
        assert_eq!(
            classify_error("Request TIMED OUT while waiting"),
            ErrorCategory::Timeout
        );
        // "pickle" appears alongside a network word; serialization rule runs first.
        assert_eq!(
            classify_error("could not pickle object over network"),
            ErrorCategory::SerializationError
        );
        assert_eq!(
            classify_error("Model meta-llama/X is not deployed"),
            ErrorCategory::ModelNotLoaded
        );
        assert_eq!(
            classify_error("ModuleNotFoundError: No module named 'torch'"),
            ErrorCategory::ImportError
        );
    }

    // -- determine_status --

    #[test]
    fn determine_status_maps_outcomes() {
        assert_eq!(determine_status(true, None), Status::Ok);
        assert_eq!(determine_status(false, None), Status::Failed);
        assert_eq!(
            determine_status(false, Some("model is not loaded on any worker")),
            Status::Unavailable
        );
        assert_eq!(
            determine_status(false, Some("Connection refused")),
            Status::Failed
        );
    }
}
