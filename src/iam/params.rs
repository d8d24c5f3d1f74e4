//! Query parameters for IAM-style actions.

use std::collections::BTreeMap;

use crate::sigv4::uri_encode;

pub const ACTION: &str = "Action";

/// Unique parameter names mapped to string values, kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    /// Starts a parameter set for the given action.
    pub fn action(action: &str) -> Self {
        let mut params = Self::default();
        params.set(ACTION, action);
        params
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn set_opt(&mut self, name: &str, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(value) = value {
            self.set(name, value);
        }
        self
    }

    /// Flattens a list into `<prefix>.member.1` .. `<prefix>.member.N`.
    /// Indices start at 1 and are contiguous; an empty list adds nothing.
    pub fn set_members<S: AsRef<str>>(&mut self, prefix: &str, items: &[S]) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            self.set(&format!("{}.member.{}", prefix, i + 1), item.as_ref());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The value of `Action`, if set.
    pub fn action_name(&self) -> Option<&str> {
        self.get(ACTION).filter(|a| !a.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `k=v&...` with both sides percent-encoded, in key order.
    pub fn encode(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
