/// Who performed a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Reviewer(String),
    Requester(String),
    System,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Reviewer(id) => write!(f, "reviewer:{id}"),
            Actor::Requester(id) => write!(f, "requester:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_display() {
        assert_eq!(Actor::Reviewer("alice".into()).to_string(), "reviewer:alice");
        assert_eq!(Actor::Requester("u-1".into()).to_string(), "requester:u-1");
        assert_eq!(Actor::System.to_string(), "system");
    }
}
