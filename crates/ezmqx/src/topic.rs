// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic descriptor and topic-name grammar.
//!
//! A valid topic name starts with `/`, contains only `[a-zA-Z0-9-_./]`,
//! has no empty segment (`//`) and does not end with `/`.

use crate::endpoint::EndPoint;
use crate::error::{Error, ErrorKind, Result};
use std::fmt;

fn is_topic_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

/// Whether `name` satisfies the topic grammar.
pub fn is_valid_topic(name: &str) -> bool {
    name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("//")
        && name.chars().all(is_topic_char)
}

/// Check `name` against the topic grammar.
pub fn validate_topic(name: &str) -> Result<()> {
    if is_valid_topic(name) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::InvalidTopic,
            format!("'{name}' is not a valid topic name"),
        ))
    }
}

/// Immutable topic descriptor as stored by the naming service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
    data_model: String,
    secured: bool,
    endpoint: EndPoint,
}

impl Topic {
    /// Build a descriptor; fails with `InvalidTopic` on a malformed name.
    pub fn new(
        name: impl Into<String>,
        data_model: impl Into<String>,
        secured: bool,
        endpoint: EndPoint,
    ) -> Result<Self> {
        let name = name.into();
        validate_topic(&name)?;
        Ok(Self {
            name,
            data_model: data_model.into(),
            secured,
            endpoint,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data model (codec) id.
    pub fn data_model(&self) -> &str {
        &self.data_model
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn endpoint(&self) -> &EndPoint {
        &self.endpoint
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] @ {}{}",
            self.name,
            self.data_model,
            self.endpoint,
            if self.secured { " (secured)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_names() {
        for name in ["/a", "/robot/arm", "/a-b_c.d/E9", "/x/y/z/0"] {
            assert!(is_valid_topic(name), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["", "/", "a/b", "/a//b", "/a/", "/a b", "/a/b?", "//a", "/ü"] {
            assert!(!is_valid_topic(name), "{name} should be invalid");
        }
        assert_eq!(
            validate_topic("a/b").unwrap_err().kind(),
            ErrorKind::InvalidTopic
        );
    }

    #[test]
    fn topic_new_validates_name() {
        let ep = EndPoint::new("localhost", 5562);
        let topic = Topic::new("/robot/arm", "GTC_Robot_0.0.1", false, ep.clone()).unwrap();
        assert_eq!(topic.name(), "/robot/arm");
        assert_eq!(topic.data_model(), "GTC_Robot_0.0.1");
        assert!(!topic.is_secured());
        assert_eq!(topic.endpoint(), &ep);

        let err = Topic::new("robot", "m", false, ep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopic);
    }
}
