//! Discrete health states and their scores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HealthError;

/// Health of a single check or of the whole system, ordered worst to best.
///
/// `Unknown` sorts first but is not "worse" than `Outage` in any
/// meaningful sense: it means no verdict has been reached yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// The check could not be evaluated.
    #[default]
    Unknown,
    /// The check fails and the dependency is unusable.
    Outage,
    /// The check fails but there is time before it becomes critical.
    Major,
    /// The check fails without impacting overall behavior.
    Minor,
    /// The check operates as expected.
    Ok,
}

impl State {
    /// All states, worst to best.
    pub const ALL: [State; 5] = [
        State::Unknown,
        State::Outage,
        State::Major,
        State::Minor,
        State::Ok,
    ];

    /// Health factor contributed by a check in this state.
    pub fn score(self) -> f64 {
        match self {
            State::Unknown => 0.0,
            State::Outage => 0.25,
            State::Major => 0.50,
            State::Minor => 0.75,
            State::Ok => 1.00,
        }
    }

    /// Map a normalized score in `[0, 1]` back to a state.
    ///
    /// Never returns `Unknown`: anything at or below `0.25` is an outage.
    pub fn for_score(score: f64) -> State {
        if score <= 0.25 {
            State::Outage
        } else if score <= 0.50 {
            State::Major
        } else if score <= 0.75 {
            State::Minor
        } else {
            State::Ok
        }
    }

    /// Whether this state carries an actual verdict.
    pub fn is_known(self) -> bool {
        self != State::Unknown
    }

    /// Lowercase token used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Unknown => "unknown",
            State::Outage => "outage",
            State::Major => "major",
            State::Minor => "minor",
            State::Ok => "ok",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HealthError::InvalidState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_representation() {
        assert_eq!(State::Unknown.to_string(), "unknown");
        assert_eq!(State::Outage.to_string(), "outage");
        assert_eq!(State::Major.to_string(), "major");
        assert_eq!(State::Minor.to_string(), "minor");
        assert_eq!(State::Ok.to_string(), "ok");

        assert_eq!(serde_json::to_string(&State::Ok).unwrap(), "\"ok\"");
        let parsed: State = serde_json::from_str("\"major\"").unwrap();
        assert_eq!(parsed, State::Major);
    }

    #[test]
    fn test_score() {
        assert_eq!(State::Unknown.score(), 0.0);
        assert_eq!(State::Outage.score(), 0.25);
        assert_eq!(State::Major.score(), 0.50);
        assert_eq!(State::Minor.score(), 0.75);
        assert_eq!(State::Ok.score(), 1.0);
    }

    #[test]
    fn test_for_score_buckets() {
        assert_eq!(State::for_score(0.0), State::Outage);
        assert_eq!(State::for_score(0.25), State::Outage);
        assert_eq!(State::for_score(0.26), State::Major);
        assert_eq!(State::for_score(0.50), State::Major);
        assert_eq!(State::for_score(0.75), State::Minor);
        assert_eq!(State::for_score(0.76), State::Ok);
        assert_eq!(State::for_score(1.0), State::Ok);
    }

    #[test]
    fn test_identity_for_known_states() {
        for state in [State::Outage, State::Major, State::Minor, State::Ok] {
            assert_eq!(State::for_score(state.score()), state);
        }

        // Unknown scores zero, which resolves to an outage
        assert_eq!(State::for_score(State::Unknown.score()), State::Outage);
    }

    #[test]
    fn test_ordering() {
        assert!(State::Unknown < State::Outage);
        assert!(State::Outage < State::Major);
        assert!(State::Minor < State::Ok);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("OK".parse::<State>().unwrap(), State::Ok);
        assert_eq!(" minor ".parse::<State>().unwrap(), State::Minor);
        assert!(matches!(
            "degraded".parse::<State>(),
            Err(HealthError::InvalidState(_))
        ));
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(State::default(), State::Unknown);
    }
}
