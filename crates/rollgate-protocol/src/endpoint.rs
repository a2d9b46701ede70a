//! Invocation URL resolution.
//!
//! The configured template may reference `{endpoint}` (raw),
//! `{endpoint_encoded}` (percent-encoded for use inside a path segment),
//! and `{qualifier}`.

use rollgate_core::RuntimeRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    pub fn resolve(template: &str, runtime: &RuntimeRef) -> Self {
        let url = template
            .replace("{endpoint_encoded}", &encode_component(runtime.endpoint()))
            .replace("{endpoint}", runtime.endpoint())
            .replace("{qualifier}", &encode_component(runtime.qualifier()));
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '/' => out.push_str("%2F"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            ' ' => out.push_str("%20"),
            c => out.push(c),
        }
    }
    out
}
