// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic lookup through the naming service.

use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::tns::TnsClient;
use crate::topic::{validate_topic, Topic};
use std::sync::Arc;

/// Resolves topic names to [`Topic`] descriptors.
pub struct TopicDiscovery {
    context: Arc<Context>,
}

impl TopicDiscovery {
    pub fn new(context: &Arc<Context>) -> Self {
        Self {
            context: Arc::clone(context),
        }
    }

    /// The topic registered under exactly `name`.
    pub fn query(&self, name: &str) -> Result<Topic> {
        self.lookup(name, false)?.into_iter().next().ok_or_else(|| {
            Error::new(ErrorKind::NoTopicMatched, format!("no topic matches '{name}'"))
        })
    }

    /// `name` and every topic below it. Empty when nothing matches.
    pub fn hierarchical_query(&self, name: &str) -> Result<Vec<Topic>> {
        self.lookup(name, true)
    }

    fn lookup(&self, name: &str, hierarchical: bool) -> Result<Vec<Topic>> {
        validate_topic(name)?;
        let topics = self.name_service()?.query(name, hierarchical)?;
        log::debug!(
            "[DISCOVERY] {} ({}) -> {} topic(s)",
            name,
            if hierarchical { "hierarchical" } else { "exact" },
            topics.len()
        );
        Ok(topics)
    }

    fn name_service(&self) -> Result<TnsClient> {
        if self.context.is_terminated() {
            return Err(Error::terminated("context"));
        }
        self.context.name_service()?.ok_or_else(|| {
            Error::new(
                ErrorKind::NameServiceUnavailable,
                "context has no naming service configured",
            )
        })
    }
}

impl std::fmt::Debug for TopicDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicDiscovery")
            .field("mode", &self.context.mode())
            .finish()
    }
}
