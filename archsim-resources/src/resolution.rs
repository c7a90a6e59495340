// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Result of looking a resource up in one of the resource tables.
//!
//! A missing resource is an expected consequence of topology changes at
//! runtime and is therefore a value, not an error.

pub enum Resolution<T> {
    Resolved(T),
    NotFound(String),
}

impl<T> Resolution<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Resolution::Resolved(value) => Resolution::Resolved(f(value)),
            Resolution::NotFound(reason) => Resolution::NotFound(reason),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Resolution::Resolved(value) => Some(value),
            Resolution::NotFound(_) => None,
        }
    }
}

impl<T> std::fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Resolved(_) => write!(f, "Resolved"),
            Resolution::NotFound(reason) => write!(f, "NotFound({reason})"),
        }
    }
}
