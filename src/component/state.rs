use serde::{Deserialize, Serialize};

/// Lifecycle stages, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Initializing,
    Created,
    ViewReady,
    Started,
    Resumed,
}

impl LifecycleState {
    /// The stage one step up, or `None` at the top.
    pub fn next(self) -> Option<Self> {
        match self {
            LifecycleState::Initializing => Some(LifecycleState::Created),
            LifecycleState::Created => Some(LifecycleState::ViewReady),
            LifecycleState::ViewReady => Some(LifecycleState::Started),
            LifecycleState::Started => Some(LifecycleState::Resumed),
            LifecycleState::Resumed => None,
        }
    }

    /// The stage one step down, or `None` at the bottom.
    pub fn prev(self) -> Option<Self> {
        match self {
            LifecycleState::Initializing => None,
            LifecycleState::Created => Some(LifecycleState::Initializing),
            LifecycleState::ViewReady => Some(LifecycleState::Created),
            LifecycleState::Started => Some(LifecycleState::ViewReady),
            LifecycleState::Resumed => Some(LifecycleState::Started),
        }
    }

    pub fn is_at_least(self, other: Self) -> bool {
        self >= other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Created => "created",
            LifecycleState::ViewReady => "view_ready",
            LifecycleState::Started => "started",
            LifecycleState::Resumed => "resumed",
        }
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(LifecycleState::Initializing),
            "created" => Ok(LifecycleState::Created),
            "view_ready" => Ok(LifecycleState::ViewReady),
            "started" => Ok(LifecycleState::Started),
            "resumed" => Ok(LifecycleState::Resumed),
            other => Err(format!("unknown lifecycle state '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_walk_in_order() {
        let mut seen = vec![LifecycleState::Initializing];
        while let Some(next) = seen.last().and_then(|s| s.next()) {
            seen.push(next);
        }
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(LifecycleState::Created.prev(), Some(LifecycleState::Initializing));
        assert_eq!(LifecycleState::Initializing.prev(), None);
    }

    #[test]
    fn parses_snake_case_names() {
        assert_eq!("view_ready".parse(), Ok(LifecycleState::ViewReady));
        assert!("paused".parse::<LifecycleState>().is_err());
    }
}
