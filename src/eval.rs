//! Manifest strings with embedded variable references, e.g.
//! `c++ $in -o $out`, and the scopes used to expand them.

use crate::smallmap::SmallMap;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// A scope maps variable names to values during template expansion.
/// A given Template may be expanded against multiple scopes, searched
/// in order.
pub trait Scope {
    fn lookup(&self, var: &str) -> Option<Cow<str>>;
}

/// One chunk within a Template: either literal text or a variable reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk<T: AsRef<str>> {
    Text(T),
    Var(T),
}

/// A parsed but unexpanded variable-reference string, e.g. "cc $in -o $out".
/// Generic so the parser can produce Template<&str> borrowing the manifest
/// text, while rules store owned Template<String>.
#[derive(Debug, PartialEq)]
pub struct Template<T: AsRef<str>>(Vec<Chunk<T>>);

impl<T: AsRef<str>> Template<T> {
    pub fn new(chunks: Vec<Chunk<T>>) -> Self {
        Template(chunks)
    }

    /// Expand the template, resolving each variable against the first scope
    /// that knows it.  Unknown variables expand to the empty string.
    pub fn evaluate(&self, scopes: &[&dyn Scope]) -> String {
        let mut out = String::new();
        for chunk in &self.0 {
            match chunk {
                Chunk::Text(text) => out.push_str(text.as_ref()),
                Chunk::Var(var) => {
                    for scope in scopes {
                        if let Some(val) = scope.lookup(var.as_ref()) {
                            out.push_str(&val);
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

impl Template<&str> {
    pub fn into_owned(self) -> Template<String> {
        Template(
            self.0
                .into_iter()
                .map(|chunk| match chunk {
                    Chunk::Text(text) => Chunk::Text(text.to_owned()),
                    Chunk::Var(var) => Chunk::Var(var.to_owned()),
                })
                .collect(),
        )
    }
}

impl<T: AsRef<str>> fmt::Display for Template<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for chunk in &self.0 {
            match chunk {
                Chunk::Text(text) => write!(f, "{}", text.as_ref())?,
                Chunk::Var(var) => write!(f, "${{{}}}", var.as_ref())?,
            }
        }
        Ok(())
    }
}

impl Scope for HashMap<String, String> {
    fn lookup(&self, var: &str) -> Option<Cow<str>> {
        self.get(var).map(|val| Cow::Borrowed(val.as_str()))
    }
}

impl Scope for SmallMap<String, String> {
    fn lookup(&self, var: &str) -> Option<Cow<str>> {
        self.get(var).map(|val| Cow::Borrowed(val.as_str()))
    }
}
