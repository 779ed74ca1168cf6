use std::fmt;

use serde::{Deserialize, Serialize};

/// User or host qualifier of a native store.
///
/// `Current` binds the store to the current user (or host); `Any` makes it
/// shared across all users (or hosts).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeToken {
    Current,
    Any,
}

impl ScopeToken {
    /// Directory-safe label, used by the file engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partition of preference storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Per-user preferences: current user, any host.
    User,
    /// System-wide preferences: any user, current host.
    System,
}

impl Scope {
    pub fn from_is_user(is_user: bool) -> Self {
        if is_user {
            Self::User
        } else {
            Self::System
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }

    /// The `(user, host)` tokens a store of this scope is bound to.
    pub fn tokens(&self) -> (ScopeToken, ScopeToken) {
        match self {
            Self::User => (ScopeToken::Current, ScopeToken::Any),
            Self::System => (ScopeToken::Any, ScopeToken::Current),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Identity of one native store: application name plus user and host tokens.
///
/// Two ids name the same store iff all three components match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId {
    pub name: String,
    pub user: ScopeToken,
    pub host: ScopeToken,
}

impl StoreId {
    /// Id of the store `name` in the given scope.
    pub fn new(name: impl Into<String>, scope: Scope) -> Self {
        let (user, host) = scope.tokens();
        Self {
            name: name.into(),
            user,
            host,
        }
    }

    /// The scope this id belongs to, if its tokens match one.
    pub fn scope(&self) -> Option<Scope> {
        match (self.user, self.host) {
            (ScopeToken::Current, ScopeToken::Any) => Some(Scope::User),
            (ScopeToken::Any, ScopeToken::Current) => Some(Scope::System),
            _ => None,
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.name, self.user, self.host)
    }
}
