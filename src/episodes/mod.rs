//! Survival episode construction (age × calendar-period splitting)

mod splitter;

pub use splitter::{summarize_by_subject, Episode, EpisodeBuilder, EpisodeSet, SubjectSummary, TIME_EPSILON};
