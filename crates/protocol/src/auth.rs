//! Client authentication methods.
//!
//! An [`AuthProvider`] names the method, supplies the opaque parameters that
//! travel in the client hello, and owns the static key pair the handshake
//! authenticates with.

use ciborium::Value;

use crate::error::Result;
use crate::keys::StaticKeyPair;

/// A client authentication method.
pub trait AuthProvider {
    /// Stable method identifier sent to the server.
    fn name(&self) -> &str;

    /// Method-specific parameters. `Value::Null` when the method has none.
    fn auth_params(&self) -> Value;

    /// The local static key pair used in the handshake.
    fn local_static_keypair(&self) -> &StaticKeyPair;
}

impl<P: AuthProvider + ?Sized> AuthProvider for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn auth_params(&self) -> Value {
        (**self).auth_params()
    }

    fn local_static_keypair(&self) -> &StaticKeyPair {
        (**self).local_static_keypair()
    }
}

/// Authentication by static key alone.
#[derive(Debug, Clone)]
pub struct StaticKeyAuthProvider {
    keypair: StaticKeyPair,
}

impl StaticKeyAuthProvider {
    /// Method name announced in the client hello.
    pub const METHOD: &'static str = "static_key";

    /// Creates a provider from an existing key pair.
    pub fn new(keypair: StaticKeyPair) -> Self {
        Self { keypair }
    }

    /// Creates a provider from a base64-encoded 32-byte private scalar.
    pub fn from_base64(static_private_key: &str) -> Result<Self> {
        Ok(Self::new(StaticKeyPair::from_base64(static_private_key)?))
    }
}

impl AuthProvider for StaticKeyAuthProvider {
    fn name(&self) -> &str {
        Self::METHOD
    }

    fn auth_params(&self) -> Value {
        Value::Null
    }

    fn local_static_keypair(&self) -> &StaticKeyPair {
        &self.keypair
    }
}
