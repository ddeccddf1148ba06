//! Challenge-response login state machine.
//!
//! The machine performs no I/O. The driver feeds it provider replies and
//! user input; it answers with either a request for input or a terminal
//! outcome.
//!
//! ```text
//! Start --initial reply--> Done
//!   |                       ^
//!   +--> Challenge(kind) ---+--> Challenge(next kind)  (fresh counter)
//!          |   ^
//!          v   | rejected, attempts < 3
//!        Submitted --rejected, attempts == 3--> ChallengeExhausted(kind)
//! ```

use std::collections::BTreeMap;

use super::{
    ChallengeAnswer, ChallengeKind, LoginError, ProviderError, ProviderResponse,
};

/// Attempts allowed per challenge round.
pub const MAX_CHALLENGE_ATTEMPTS: u8 = 3;

/// What the machine needs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    /// Ask the user for a value of this kind, then call
    /// [`LoginFlow::answer`].
    NeedInput(InputRequest),
    /// Login finished; holds the identity token.
    Done(String),
}

/// A request for one secret value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    /// Challenge being answered
    pub challenge: ChallengeKind,
    /// 1-based attempt number within this round
    pub attempt: u8,
    /// Provider message for the previous rejected attempt
    pub last_error: Option<String>,
}

#[derive(Debug)]
enum State {
    Start,
    Challenge {
        kind: ChallengeKind,
        session: String,
        attempts: u8,
    },
    Submitted {
        kind: ChallengeKind,
        session: String,
        attempts: u8,
    },
    Finished,
}

/// Pure login state machine for one user.
#[derive(Debug)]
pub struct LoginFlow {
    username: String,
    state: State,
}

impl LoginFlow {
    /// Begin a login for `username`.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: State::Start,
        }
    }

    /// User name this flow authenticates.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether the flow reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Feed the reply to the initial username/password submission.
    ///
    /// A `NotAuthorized` reply is terminal with no retry.
    pub fn on_initial(
        &mut self,
        reply: Result<ProviderResponse, ProviderError>,
    ) -> Result<LoginStep, LoginError> {
        if !matches!(self.state, State::Start) {
            return Err(self.fail(LoginError::OutOfOrder("initial reply")));
        }
        match reply {
            Ok(response) => self.advance(response),
            Err(ProviderError::NotAuthorized(_)) => Err(self.fail(LoginError::NotAuthorized)),
            Err(e) => Err(self.fail(LoginError::Provider(e.to_string()))),
        }
    }

    /// Supply the value requested by the last [`LoginStep::NeedInput`].
    ///
    /// Consumes the value into exactly one challenge submission and counts
    /// the attempt.
    pub fn answer(&mut self, value: String) -> Result<ChallengeAnswer, LoginError> {
        let State::Challenge {
            kind,
            session,
            attempts,
        } = std::mem::replace(&mut self.state, State::Finished)
        else {
            return Err(LoginError::OutOfOrder("answer"));
        };

        let responses = BTreeMap::from([
            ("USERNAME".to_string(), self.username.clone()),
            (kind.response_key().to_string(), value),
        ]);
        let answer = ChallengeAnswer {
            challenge: kind,
            session: session.clone(),
            responses,
        };
        self.state = State::Submitted {
            kind,
            session,
            attempts: attempts + 1,
        };
        Ok(answer)
    }

    /// Feed the reply to the last [`answer`](Self::answer).
    ///
    /// A provider rejection consumes one attempt of the current round; the
    /// round fails terminally once [`MAX_CHALLENGE_ATTEMPTS`] are used.
    pub fn on_challenge_reply(
        &mut self,
        reply: Result<ProviderResponse, ProviderError>,
    ) -> Result<LoginStep, LoginError> {
        let State::Submitted {
            kind,
            session,
            attempts,
        } = std::mem::replace(&mut self.state, State::Finished)
        else {
            return Err(LoginError::OutOfOrder("challenge reply"));
        };

        match reply {
            Ok(response) => self.advance(response),
            Err(e) if e.is_rejection() => {
                if attempts >= MAX_CHALLENGE_ATTEMPTS {
                    return Err(LoginError::ChallengeExhausted(kind));
                }
                self.state = State::Challenge {
                    kind,
                    session,
                    attempts,
                };
                Ok(LoginStep::NeedInput(InputRequest {
                    challenge: kind,
                    attempt: attempts + 1,
                    last_error: Some(e.to_string()),
                }))
            }
            Err(e) => Err(LoginError::Provider(e.to_string())),
        }
    }

    fn advance(&mut self, response: ProviderResponse) -> Result<LoginStep, LoginError> {
        match response {
            ProviderResponse::Authenticated(result) => {
                self.state = State::Finished;
                Ok(LoginStep::Done(result.id_token))
            }
            ProviderResponse::Challenge { name, session } => {
                let Some(kind) = ChallengeKind::from_name(&name) else {
                    return Err(self.fail(LoginError::UnsupportedChallenge(name)));
                };
                self.state = State::Challenge {
                    kind,
                    session,
                    attempts: 0,
                };
                Ok(LoginStep::NeedInput(InputRequest {
                    challenge: kind,
                    attempt: 1,
                    last_error: None,
                }))
            }
        }
    }

    fn fail(&mut self, error: LoginError) -> LoginError {
        self.state = State::Finished;
        error
    }
}
