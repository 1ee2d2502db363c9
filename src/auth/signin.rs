//! Sign-in flows.
//!
//! One attempt runs through an explicit state machine:
//! `Started -> Dispatched -> {Rejected, Accepted} -> RoleResolved ->
//! Finalized`. Transitions are a pure function from (state, event) to
//! (state, commands); [`SignInFlow`] drives the machine, executing commands
//! against the store, the credential verifier, and the token issuer. The
//! pure part tests without a live store.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::credentials::CredentialVerifier;
use super::error::AuthError;
use super::tokens::{SessionToken, TokenIssuer};
use crate::user::{ProviderDefaults, Role, User, UserInfo, UserStore, normalize_email};

/// One submitted sign-in attempt.
#[derive(Debug, Clone)]
pub enum SignInAttempt {
    /// Email + password against stored credentials.
    Credentials { email: String, password: String },
    /// A trusted assertion from a configured identity provider.
    IdentityProvider {
        provider: String,
        subject: Option<String>,
        email: Option<String>,
        name: Option<String>,
    },
}

/// States of one sign-in attempt.
#[derive(Debug)]
pub enum SignInState {
    Started,
    Dispatched,
    Rejected,
    Accepted { user: User },
    RoleResolved { user: User, role: Role },
    Finalized { token: SessionToken, user: UserInfo },
}

/// Facts fed back into the machine.
#[derive(Debug)]
pub enum SignInEvent {
    Submitted(SignInAttempt),
    VerifierAccepted(User),
    VerifierRejected,
    ProviderResolved(User),
    RolePersisted { user: User, role: Role },
    TokenMinted { token: SessionToken, user: UserInfo },
}

/// Work the driver must perform next.
#[derive(Debug)]
pub enum SignInCommand {
    VerifyCredentials {
        email: String,
        password: String,
    },
    ResolveProviderUser {
        provider: String,
        subject: String,
        email: String,
        name: Option<String>,
    },
    PersistDefaultRole {
        user: User,
    },
    MintToken {
        user: User,
        role: Role,
    },
}

/// Pure transition function. No I/O.
pub fn step(state: SignInState, event: SignInEvent) -> (SignInState, Vec<SignInCommand>) {
    match (state, event) {
        (SignInState::Started, SignInEvent::Submitted(attempt)) => dispatch(attempt),
        (SignInState::Dispatched, SignInEvent::VerifierRejected) => (SignInState::Rejected, vec![]),
        (SignInState::Dispatched, SignInEvent::VerifierAccepted(user))
        | (SignInState::Dispatched, SignInEvent::ProviderResolved(user)) => accept(user),
        (SignInState::Accepted { .. }, SignInEvent::RolePersisted { user, role }) => (
            SignInState::RoleResolved {
                user: user.clone(),
                role,
            },
            vec![SignInCommand::MintToken { user, role }],
        ),
        (SignInState::RoleResolved { .. }, SignInEvent::TokenMinted { token, user }) => {
            (SignInState::Finalized { token, user }, vec![])
        }
        // Any out-of-order event ends the attempt.
        _ => (SignInState::Rejected, vec![]),
    }
}

fn dispatch(attempt: SignInAttempt) -> (SignInState, Vec<SignInCommand>) {
    match attempt {
        SignInAttempt::Credentials { email, password } => (
            SignInState::Dispatched,
            vec![SignInCommand::VerifyCredentials { email, password }],
        ),
        SignInAttempt::IdentityProvider {
            provider,
            subject,
            email,
            name,
        } => match (subject, email) {
            // The assertion must carry both a subject and an email.
            (Some(subject), Some(email)) if !subject.is_empty() && !email.is_empty() => (
                SignInState::Dispatched,
                vec![SignInCommand::ResolveProviderUser {
                    provider,
                    subject,
                    email,
                    name,
                }],
            ),
            _ => (SignInState::Rejected, vec![]),
        },
    }
}

fn accept(user: User) -> (SignInState, Vec<SignInCommand>) {
    if !user.is_active {
        return (SignInState::Rejected, vec![]);
    }

    match user.role {
        Some(role) => (
            SignInState::RoleResolved {
                user: user.clone(),
                role,
            },
            vec![SignInCommand::MintToken { user, role }],
        ),
        // A session is never finalized with an unset role: the default is
        // persisted before the token is minted.
        None => (
            SignInState::Accepted { user: user.clone() },
            vec![SignInCommand::PersistDefaultRole { user }],
        ),
    }
}

/// The outcome of a finalized attempt.
#[derive(Debug)]
pub struct SignInOutcome {
    pub token: SessionToken,
    pub user: UserInfo,
}

/// Drives sign-in attempts to completion.
pub struct SignInFlow {
    store: Arc<dyn UserStore>,
    verifier: CredentialVerifier,
    issuer: Arc<TokenIssuer>,
}

impl SignInFlow {
    pub fn new(
        store: Arc<dyn UserStore>,
        verifier: CredentialVerifier,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            store,
            verifier,
            issuer,
        }
    }

    /// Run one attempt through the machine.
    ///
    /// Rejections come back as `AuthError::RejectedCredentials` without
    /// revealing which sub-case occurred; store failures come back as
    /// `AuthError::Infrastructure`.
    #[instrument(skip(self, attempt))]
    pub async fn authenticate(&self, attempt: SignInAttempt) -> Result<SignInOutcome, AuthError> {
        let mut state = SignInState::Started;
        let mut events = VecDeque::from([SignInEvent::Submitted(attempt)]);

        while let Some(event) = events.pop_front() {
            let (next, commands) = step(state, event);
            state = next;
            for command in commands {
                events.push_back(self.run(command).await?);
            }
        }

        match state {
            SignInState::Finalized { token, user } => {
                info!(user_id = %user.id, "sign-in finalized");
                Ok(SignInOutcome { token, user })
            }
            SignInState::Rejected => Err(AuthError::RejectedCredentials),
            _ => Err(AuthError::Infrastructure(
                "sign-in flow stalled before finalizing".to_string(),
            )),
        }
    }

    async fn run(&self, command: SignInCommand) -> Result<SignInEvent, AuthError> {
        match command {
            SignInCommand::VerifyCredentials { email, password } => {
                match self.verifier.verify(&email, &password).await {
                    Ok(user) => Ok(SignInEvent::VerifierAccepted(user)),
                    Err(AuthError::RejectedCredentials) => Ok(SignInEvent::VerifierRejected),
                    Err(other) => Err(other),
                }
            }
            SignInCommand::ResolveProviderUser {
                provider,
                subject,
                email,
                name,
            } => {
                let email = normalize_email(&email);
                let display_name = name.unwrap_or_else(|| email.clone());
                let user = self
                    .store
                    .upsert_by_provider_subject(
                        &provider,
                        &subject,
                        ProviderDefaults {
                            email,
                            display_name,
                            role: Role::Employee,
                        },
                    )
                    .await
                    .map_err(|e| {
                        warn!(provider = %provider, error = %format!("{e:#}"), "provider user resolution failed");
                        AuthError::Infrastructure(format!("{e:#}"))
                    })?;
                Ok(SignInEvent::ProviderResolved(user))
            }
            SignInCommand::PersistDefaultRole { mut user } => {
                // Written durably before minting, so the mint reads its own
                // write within this attempt.
                self.store
                    .update_role(&user.id, Role::Employee)
                    .await
                    .map_err(|e| AuthError::Infrastructure(format!("{e:#}")))?;
                user.role = Some(Role::Employee);
                Ok(SignInEvent::RolePersisted {
                    user,
                    role: Role::Employee,
                })
            }
            SignInCommand::MintToken { user, role } => {
                if let Err(e) = self.store.touch_last_sign_in(&user.id).await {
                    warn!(user_id = %user.id, error = %format!("{e:#}"), "failed to stamp last sign-in");
                }
                let token = self.issuer.mint(&user, role)?;
                Ok(SignInEvent::TokenMinted {
                    token,
                    user: user.into(),
                })
            }
        }
    }
}
