/// Why the route guard did not evaluate a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSkipReason {
    Loading,
    NoUser,
    RoutesNotLoaded,
    AlreadyChecked,
}

impl GuardSkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::NoUser => "no_user",
            Self::RoutesNotLoaded => "routes_not_loaded",
            Self::AlreadyChecked => "already_checked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteGuardOutcome {
    Skipped(GuardSkipReason),
    Granted {
        path: String,
    },
    /// The denial prompt was opened and a redirect queued.
    Denied {
        path: String,
        redirect_to: String,
    },
}

impl RouteGuardOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}
