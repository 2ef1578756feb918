// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Secured-session key material.
//!
//! Every key is a fixed-length encoded string ([`KEY_LENGTH`] bytes).
//! Keys are length-checked here, before the transport ever sees them.
//! Secret keys are wiped from memory on drop.

use crate::config::KEY_LENGTH;
use crate::error::{Error, ErrorKind, Result};
use std::fmt;
use zeroize::Zeroizing;

/// Role a key plays in the session handshake (used in error messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    ServerSecret,
    ServerPublic,
    ClientPublic,
    ClientSecret,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServerSecret => "server secret key",
            Self::ServerPublic => "server public key",
            Self::ClientPublic => "client public key",
            Self::ClientSecret => "client secret key",
        })
    }
}

fn check_length(role: KeyRole, key: &str) -> Result<()> {
    if key.len() == KEY_LENGTH {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::InvalidKey,
            format!("{role} must be {KEY_LENGTH} bytes"),
        ))
    }
}

/// A length-checked public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(role: KeyRole, key: &str) -> Result<Self> {
        check_length(role, key)?;
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A length-checked secret key, zeroized on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<String>);

impl SecretKey {
    pub fn new(role: KeyRole, key: &str) -> Result<Self> {
        check_length(role, key)?;
        Ok(Self(Zeroizing::new(key.to_string())))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(****)")
    }
}

/// Client key pair applied to every secured subscription.
#[derive(Debug, Clone)]
pub struct ClientKeys {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl ClientKeys {
    pub fn new(public: &str, secret: &str) -> Result<Self> {
        Ok(Self {
            public: PublicKey::new(KeyRole::ClientPublic, public)?,
            secret: SecretKey::new(KeyRole::ClientSecret, secret)?,
        })
    }
}
