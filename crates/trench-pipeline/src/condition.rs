//! Filter evaluation over torrent snapshots.
//!
//! A filter either matches or skips with a human-readable reason; a skip is
//! not an error. A property the client did not report is logged as a warning
//! and skips the filter.

use std::borrow::Cow;

use trench_types::Torrent;

use crate::model::{Filter, RangeCondition, StringCondition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Matched,
    Skipped(String),
}

impl FilterVerdict {
    pub fn is_matched(&self) -> bool {
        matches!(self, FilterVerdict::Matched)
    }
}

/// Evaluate one filter step against `torrent`.
pub fn evaluate_filter(filter: &Filter, torrent: &Torrent) -> FilterVerdict {
    match filter {
        Filter::Complete(expected) => {
            if torrent.is_completed == *expected {
                FilterVerdict::Matched
            } else {
                FilterVerdict::Skipped(format!(
                    "Torrent completion status is {}",
                    torrent.is_completed
                ))
            }
        }
        Filter::Label(c) => evaluate_string(torrent.label.as_deref(), c, "label"),
        Filter::Tracker(c) => evaluate_string(torrent.raw_str("tracker"), c, "tracker"),
        Filter::SavePath(c) => evaluate_string(torrent.save_path.as_deref(), c, "savePath"),
        Filter::Name(c) => evaluate_string(Some(&torrent.name), c, "name"),
        Filter::Progress(r) => evaluate_range(Some(torrent.progress * 100.0), r, "progress"),
        Filter::Ratio(r) => evaluate_range(Some(torrent.ratio), r, "ratio"),
        Filter::SeedTime(r) => evaluate_range(torrent.raw_f64("seeding_time"), r, "seedTime"),
        Filter::TimeActive(r) => evaluate_range(torrent.raw_f64("time_active"), r, "timeActive"),
    }
}

fn warn_missing(property: &str) {
    tracing::warn!(
        "Attempted to read undefined property {property} from torrent data. \
         The torrent client may not provide this property and will cause this trench to be skipped."
    );
}

type LiteralTest = fn(&str, &str) -> bool;

/// Check every present sub-condition in order; the first failure wins.
pub fn evaluate_string(value: Option<&str>, condition: &StringCondition, property: &str) -> FilterVerdict {
    let Some(value) = value else {
        warn_missing(property);
        return FilterVerdict::Skipped(format!("Torrent has no {property}"));
    };

    let text: Cow<'_, str> = if condition.case_insensitive {
        Cow::Owned(value.to_lowercase())
    } else {
        Cow::Borrowed(value)
    };

    // (literal, must hold, test, verb)
    let checks: [(Option<&str>, bool, LiteralTest, &str); 6] = [
        (condition.starts_with.as_deref(), true, |h, n| h.starts_with(n), "start with"),
        (condition.not_starts_with.as_deref(), false, |h, n| h.starts_with(n), "start with"),
        (condition.ends_with.as_deref(), true, |h, n| h.ends_with(n), "end with"),
        (condition.not_ends_with.as_deref(), false, |h, n| h.ends_with(n), "end with"),
        (condition.includes.as_deref(), true, |h, n| h.contains(n), "include"),
        (condition.not_includes.as_deref(), false, |h, n| h.contains(n), "include"),
    ];

    for (literal, must_hold, test, verb) in checks {
        let Some(literal) = literal else { continue };
        if test(&text, literal) != must_hold {
            let negation = if must_hold { "does not" } else { "does" };
            return FilterVerdict::Skipped(format!(
                "Torrent {property} {negation} {verb} string {literal}"
            ));
        }
    }

    if let Some(pattern) = &condition.pattern {
        if !pattern.is_match(&text) {
            return FilterVerdict::Skipped(format!(
                "Torrent {property} does not match regex {}",
                pattern.as_str()
            ));
        }
    }

    FilterVerdict::Matched
}

pub fn evaluate_range(value: Option<f64>, condition: &RangeCondition, property: &str) -> FilterVerdict {
    let Some(value) = value else {
        warn_missing(property);
        return FilterVerdict::Skipped(format!("Torrent has no property {property}"));
    };

    if let Some(gte) = condition.gte {
        if value < gte {
            return FilterVerdict::Skipped(format!(
                "Torrent {property} is not greater than or equal to {gte}"
            ));
        }
    }
    if let Some(lte) = condition.lte {
        if value > lte {
            return FilterVerdict::Skipped(format!(
                "Torrent {property} is not less than or equal to {lte}"
            ));
        }
    }
    FilterVerdict::Matched
}
