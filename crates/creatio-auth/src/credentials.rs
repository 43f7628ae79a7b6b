//! Credential resolution.
//!
//! Credentials arrive from three places, in priority order: values passed
//! explicitly by the caller, environment variables, and credentials
//! remembered from an earlier successful authentication. Resolution picks
//! exactly one authentication track (session or OAuth) or fails before
//! any network traffic happens.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};

/// Environment variable for the session username.
pub const USERNAME_ENV: &str = "CREATIO_USERNAME";
/// Environment variable for the session password.
pub const PASSWORD_ENV: &str = "CREATIO_PASSWORD";
/// Environment variable for the OAuth client id.
pub const CLIENT_ID_ENV: &str = "CREATIO_CLIENT_ID";
/// Environment variable for the OAuth client secret.
pub const CLIENT_SECRET_ENV: &str = "CREATIO_CLIENT_SECRET";

/// Where a resolved credential pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Passed directly by the caller.
    Explicit,
    /// Read from `CREATIO_*` environment variables.
    Environment,
    /// Recalled from a previous successful authentication on the same
    /// client instance.
    Remembered,
}

/// A fully resolved credential pair for exactly one authentication track.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    /// Username and password for forms-based session login.
    Session {
        username: String,
        password: String,
        source: CredentialSource,
    },
    /// Client id and secret for the OAuth client-credentials grant.
    OAuth {
        client_id: String,
        client_secret: String,
        source: CredentialSource,
    },
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedCredentials::Session {
                username, source, ..
            } => f
                .debug_struct("Session")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field("source", source)
                .finish(),
            ResolvedCredentials::OAuth {
                client_id, source, ..
            } => f
                .debug_struct("OAuth")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("source", source)
                .finish(),
        }
    }
}

impl ResolvedCredentials {
    /// The identity half of the pair: username or client id. Used as the
    /// principal key in the credential store.
    pub fn principal(&self) -> &str {
        match self {
            ResolvedCredentials::Session { username, .. } => username,
            ResolvedCredentials::OAuth { client_id, .. } => client_id,
        }
    }

    /// Where the pair was resolved from.
    pub fn source(&self) -> CredentialSource {
        match self {
            ResolvedCredentials::Session { source, .. } => *source,
            ResolvedCredentials::OAuth { source, .. } => *source,
        }
    }

    /// Whether this pair selects the OAuth track.
    pub fn is_oauth(&self) -> bool {
        matches!(self, ResolvedCredentials::OAuth { .. })
    }

    /// Resolve credentials from explicit values and an environment
    /// snapshot (see [`EnvCredentials::capture`]).
    ///
    /// Explicit values win over environment variables field by field.
    /// Exactly one track must end up complete:
    ///
    /// - both tracks complete is [`ErrorKind::ConflictingCredentials`]
    /// - neither complete and nothing partial is
    ///   [`ErrorKind::MissingCredentials`]
    /// - half a pair (a username with no password, a client id with no
    ///   secret) is [`ErrorKind::InvalidCredentials`]
    /// - empty strings count as absent
    pub fn resolve_with_env(
        username: Option<&str>,
        password: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        env: &EnvCredentials,
    ) -> Result<Self> {
        Self::resolve_tiers(username, password, client_id, client_secret, env, [None; 4])
    }

    /// Like [`resolve_with_env`], with credentials remembered from an
    /// earlier successful `authenticate` as a last per-field tier: a bare
    /// username picks up the remembered password, and no fields at all
    /// reuse the whole remembered pair.
    ///
    /// The remembered tier is consulted only after resolution from
    /// explicit values and the environment alone has failed, so a complete
    /// fresh pair always replaces the remembered one, even across tracks.
    ///
    /// [`resolve_with_env`]: ResolvedCredentials::resolve_with_env
    pub fn resolve_with_remembered(
        username: Option<&str>,
        password: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        env: &EnvCredentials,
        remembered: Option<&ResolvedCredentials>,
    ) -> Result<Self> {
        let first =
            match Self::resolve_with_env(username, password, client_id, client_secret, env) {
                Ok(resolved) => return Ok(resolved),
                Err(e) => e,
            };

        let Some(remembered) = remembered else {
            return Err(first);
        };
        if !matches!(
            first.kind,
            ErrorKind::MissingCredentials | ErrorKind::InvalidCredentials(_)
        ) {
            return Err(first);
        }

        let recalled = match remembered {
            ResolvedCredentials::Session {
                username, password, ..
            } => [Some(username.as_str()), Some(password.as_str()), None, None],
            ResolvedCredentials::OAuth {
                client_id,
                client_secret,
                ..
            } => [
                None,
                None,
                Some(client_id.as_str()),
                Some(client_secret.as_str()),
            ],
        };
        Self::resolve_tiers(username, password, client_id, client_secret, env, recalled)
    }

    fn resolve_tiers(
        username: Option<&str>,
        password: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        env: &EnvCredentials,
        recalled: [Option<&str>; 4],
    ) -> Result<Self> {
        let pick = |explicit: Option<&str>,
                    from_env: Option<&str>,
                    remembered: Option<&str>|
         -> Option<(String, CredentialSource)> {
            [
                (explicit, CredentialSource::Explicit),
                (from_env, CredentialSource::Environment),
                (remembered, CredentialSource::Remembered),
            ]
            .into_iter()
            .find_map(|(value, source)| {
                value.filter(|s| !s.is_empty()).map(|v| (v.to_string(), source))
            })
        };

        let username = pick(username, env.username.as_deref(), recalled[0]);
        let password = pick(password, env.password.as_deref(), recalled[1]);
        let client_id = pick(client_id, env.client_id.as_deref(), recalled[2]);
        let client_secret = pick(client_secret, env.client_secret.as_deref(), recalled[3]);

        let session = match (username, password) {
            (Some((u, us)), Some((p, ps))) => Some(ResolvedCredentials::Session {
                username: u,
                password: p,
                // An explicit field anywhere makes the pair explicit.
                source: combine(us, ps),
            }),
            (Some(_), None) => {
                return Err(Error::new(ErrorKind::InvalidCredentials(
                    "username provided without a password".to_string(),
                )))
            }
            (None, Some(_)) => {
                return Err(Error::new(ErrorKind::InvalidCredentials(
                    "password provided without a username".to_string(),
                )))
            }
            (None, None) => None,
        };

        let oauth = match (client_id, client_secret) {
            (Some((i, is)), Some((s, ss))) => Some(ResolvedCredentials::OAuth {
                client_id: i,
                client_secret: s,
                source: combine(is, ss),
            }),
            (Some(_), None) => {
                return Err(Error::new(ErrorKind::InvalidCredentials(
                    "client_id provided without a client_secret".to_string(),
                )))
            }
            (None, Some(_)) => {
                return Err(Error::new(ErrorKind::InvalidCredentials(
                    "client_secret provided without a client_id".to_string(),
                )))
            }
            (None, None) => None,
        };

        match (session, oauth) {
            (Some(_), Some(_)) => Err(Error::new(ErrorKind::ConflictingCredentials)),
            // OAuth before session mirrors the precedence used elsewhere:
            // an OAuth pair always selects the token track.
            (None, Some(oauth)) => Ok(oauth),
            (Some(session), None) => Ok(session),
            (None, None) => Err(Error::new(ErrorKind::MissingCredentials)),
        }
    }
}

fn combine(a: CredentialSource, b: CredentialSource) -> CredentialSource {
    match (a, b) {
        (CredentialSource::Explicit, _) | (_, CredentialSource::Explicit) => {
            CredentialSource::Explicit
        }
        (CredentialSource::Environment, _) | (_, CredentialSource::Environment) => {
            CredentialSource::Environment
        }
        _ => CredentialSource::Remembered,
    }
}

/// Snapshot of the `CREATIO_*` credential environment variables.
#[derive(Default, Clone)]
pub struct EnvCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl EnvCredentials {
    /// Read the `CREATIO_*` variables from the process environment.
    pub fn capture() -> Self {
        let get = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            username: get(USERNAME_ENV),
            password: get(PASSWORD_ENV),
            client_id: get(CLIENT_ID_ENV),
            client_secret: get(CLIENT_SECRET_ENV),
        }
    }

    /// Build a snapshot from a key/value map. Test helper.
    pub fn from_map(vars: &BTreeMap<String, String>) -> Self {
        let get = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();
        Self {
            username: get(USERNAME_ENV),
            password: get(PASSWORD_ENV),
            client_id: get(CLIENT_ID_ENV),
            client_secret: get(CLIENT_SECRET_ENV),
        }
    }
}
