//! Role-based access policies over PID subtrees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pid::{Pid, ResourcePattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Resolve,
    Track,
    Revoke,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Resolve => "resolve",
            Action::Track => "track",
            Action::Revoke => "revoke",
        })
    }
}

/// Whoever is asking: a carrier, a locker operator, a support agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub roles: Vec<String>,
}

impl Requester {
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicy {
    pub id: String,
    pub subject_role: String,
    pub resource: ResourcePattern,
    pub allowed_actions: Vec<Action>,
    pub valid_from: DateTime<Utc>,
    /// Exclusive. `None` means open-ended.
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl AccessControlPolicy {
    /// True when this policy grants `action` on `pid` to `requester` at `now`.
    pub fn permits(
        &self,
        requester: &Requester,
        pid: &Pid,
        action: Action,
        now: DateTime<Utc>,
    ) -> bool {
        requester.has_role(&self.subject_role)
            && self.allowed_actions.contains(&action)
            && self.in_window(now)
            && self.resource.matches(pid)
    }

    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && self.valid_to.map_or(true, |end| now < end)
    }
}

/// First policy that grants the request, if any.
pub fn authorize<'a>(
    policies: &'a [AccessControlPolicy],
    requester: &Requester,
    pid: &Pid,
    action: Action,
    now: DateTime<Utc>,
) -> Option<&'a AccessControlPolicy> {
    policies
        .iter()
        .find(|p| p.permits(requester, pid, action, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::{encode, NormalizedAddress, Precision};
    use chrono::Duration;

    fn tokyo_pid() -> Pid {
        encode(
            &NormalizedAddress::new("JP").with_admin1("13").with_locality("SHIBUYA"),
            Precision::Locality,
        )
        .unwrap()
    }

    fn carrier_policy(now: DateTime<Utc>) -> AccessControlPolicy {
        AccessControlPolicy {
            id: "p1".into(),
            subject_role: "carrier".into(),
            resource: ResourcePattern::parse("JP-13-*").unwrap(),
            allowed_actions: vec![Action::Resolve, Action::Track],
            valid_from: now - Duration::hours(1),
            valid_to: Some(now + Duration::hours(1)),
        }
    }

    #[test]
    fn grants_matching_role_action_and_subtree() {
        let now = Utc::now();
        let carrier = Requester::new("yamato", ["carrier"]);
        let policies = [carrier_policy(now)];
        assert!(authorize(&policies, &carrier, &tokyo_pid(), Action::Resolve, now).is_some());
    }

    #[test]
    fn denies_everything_else() {
        let now = Utc::now();
        let policy = carrier_policy(now);
        let carrier = Requester::new("yamato", ["carrier"]);
        let shop = Requester::new("shop", ["merchant"]);
        let osaka = encode(&NormalizedAddress::new("JP").with_admin1("27"), Precision::Admin1).unwrap();

        assert!(!policy.permits(&shop, &tokyo_pid(), Action::Resolve, now));
        assert!(!policy.permits(&carrier, &tokyo_pid(), Action::Revoke, now));
        assert!(!policy.permits(&carrier, &osaka, Action::Resolve, now));
        assert!(!policy.permits(&carrier, &tokyo_pid(), Action::Resolve, now + Duration::hours(1)));
        assert!(!policy.permits(&carrier, &tokyo_pid(), Action::Resolve, now - Duration::hours(2)));
        assert!(authorize(&[], &carrier, &tokyo_pid(), Action::Resolve, now).is_none());
    }

    #[test]
    fn open_ended_window() {
        let now = Utc::now();
        let mut policy = carrier_policy(now);
        policy.valid_to = None;
        assert!(policy.in_window(now + Duration::days(3650)));
    }
}
