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

//! Egress policy as an explicit gate.
//!
//! Rather than intercepting network primitives at runtime, `EgressGuard`
//! holds the allowlist and the worker consults it before any skill code
//! runs: every host a skill declares must pass, and the vetted list is
//! exported into the skill process environment. Fail-closed: a guard with
//! an empty allowlist blocks all hosts. This is an application-level gate,
//! not a network firewall.

use crate::core::errors::EgressError;
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone)]
pub struct EgressGuard {
    allowlist: Vec<String>,
}

impl EgressGuard {
    pub fn new(allowlist: &[String]) -> Self {
        Self {
            allowlist: allowlist
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Extracts a hostname from a string URL, a bare `host[:port]`, or a
    /// request-shaped JSON object carrying `hostname`, `host`, or `url`.
    pub fn extract_host(target: &Value) -> Option<String> {
        match target {
            Value::String(s) => host_of(s),
            Value::Object(obj) => {
                for key in ["hostname", "host", "url"] {
                    if let Some(Value::String(s)) = obj.get(key) {
                        if let Some(host) = host_of(s) {
                            return Some(host);
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// Permits only allowlisted hosts. An empty allowlist blocks every host.
    pub fn check_host(&self, host: &str) -> Result<(), EgressError> {
        let host = host.trim().to_ascii_lowercase();
        let host = host.split(':').next().unwrap_or(&host).to_string();
        if self.allowlist.iter().any(|allowed| *allowed == host) {
            Ok(())
        } else {
            Err(EgressError::Blocked(host))
        }
    }

    pub fn check_url(&self, url: &str) -> Result<(), EgressError> {
        let host = host_of(url).ok_or(EgressError::UnresolvableHost)?;
        self.check_host(&host)
    }

    pub fn check(&self, target: &Value) -> Result<(), EgressError> {
        let host = Self::extract_host(target).ok_or(EgressError::UnresolvableHost)?;
        self.check_host(&host)
    }
}

fn host_of(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(s) {
        if let Some(host) = url.host_str() {
            return Some(host.to_ascii_lowercase());
        }
    }
    // Bare host or host:port; retry with a scheme so Url does the parsing.
    Url::parse(&format!("https://{}", s))
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}
