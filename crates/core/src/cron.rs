use chrono::{DateTime, Utc};

/// Validate a cron expression and return the parsed representation.
pub fn validate_cron_expr(expr: &str) -> Result<croner::Cron, CronError> {
    croner::Cron::new(expr)
        .parse()
        .map_err(|e| CronError::InvalidExpression(format!("{e}")))
}

/// Validate a timezone string against the IANA timezone database.
pub fn validate_timezone(tz: &str) -> Result<chrono_tz::Tz, CronError> {
    tz.parse::<chrono_tz::Tz>()
        .map_err(|_| CronError::InvalidTimezone(tz.to_owned()))
}

/// Compute the next occurrence of a cron expression strictly after `after`,
/// evaluated in the given timezone.
///
/// Returns `None` if the expression has no future occurrences.
pub fn next_occurrence(
    cron: &croner::Cron,
    tz: chrono_tz::Tz,
    after: &DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let after_tz = after.with_timezone(&tz);
    cron.find_next_occurrence(&after_tz, false)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Errors from cron expression validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CronError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),
    /// The timezone string is not a valid IANA timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}
