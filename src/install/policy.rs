// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Install policy evaluation.
//!
//! A denylist match, by exact `name@version` or by bare name, always denies,
//! even when the same identity also matches the allowlist. A non-empty
//! allowlist additionally requires a match; an empty allowlist means
//! "allow unless denied". Evaluated before the registry is ever consulted.

use crate::core::models::{InstallPlan, SkillReference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Denied { reason: String },
}

fn matches(list: &[String], reference: &SkillReference) -> bool {
    let identity = reference.identity();
    list.iter()
        .any(|entry| entry == &identity || entry == &reference.name)
}

pub fn evaluate(reference: &SkillReference, plan: &InstallPlan) -> PolicyDecision {
    // Deny precedence: a denylisted identity is rejected unconditionally.
    if matches(&plan.denylist, reference) {
        return PolicyDecision::Denied {
            reason: format!("'{}' matches the denylist", reference.identity()),
        };
    }

    if !plan.allowlist.is_empty() && !matches(&plan.allowlist, reference) {
        return PolicyDecision::Denied {
            reason: format!("'{}' is not on the allowlist", reference.identity()),
        };
    }

    PolicyDecision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> SkillReference {
        SkillReference::new("web-search", "1.0.0")
    }

    fn plan(allow: &[&str], deny: &[&str]) -> InstallPlan {
        InstallPlan {
            requested_by: "tester".to_string(),
            allowlist: allow.iter().map(|s| s.to_string()).collect(),
            denylist: deny.iter().map(|s| s.to_string()).collect(),
            ..InstallPlan::default()
        }
    }

    #[test]
    fn empty_lists_allow() {
        assert_eq!(evaluate(&reference(), &plan(&[], &[])), PolicyDecision::Allowed);
    }

    #[test]
    fn denylist_bare_name_denies() {
        let decision = evaluate(&reference(), &plan(&[], &["web-search"]));
        assert!(matches!(decision, PolicyDecision::Denied { .. }));
    }

    #[test]
    fn denylist_full_identity_denies() {
        let decision = evaluate(&reference(), &plan(&[], &["web-search@1.0.0"]));
        assert!(matches!(decision, PolicyDecision::Denied { .. }));
    }

    #[test]
    fn deny_takes_precedence_over_allow() {
        let decision = evaluate(&reference(), &plan(&["web-search"], &["web-search"]));
        assert!(matches!(decision, PolicyDecision::Denied { .. }));
    }

    #[test]
    fn nonempty_allowlist_requires_match() {
        let decision = evaluate(&reference(), &plan(&["other-skill"], &[]));
        assert!(matches!(decision, PolicyDecision::Denied { .. }));
        assert_eq!(
            evaluate(&reference(), &plan(&["web-search"], &[])),
            PolicyDecision::Allowed
        );
        assert_eq!(
            evaluate(&reference(), &plan(&["web-search@1.0.0"], &[])),
            PolicyDecision::Allowed
        );
    }

    #[test]
    fn denylist_other_version_does_not_deny() {
        assert_eq!(
            evaluate(&reference(), &plan(&[], &["web-search@2.0.0"])),
            PolicyDecision::Allowed
        );
    }
}
