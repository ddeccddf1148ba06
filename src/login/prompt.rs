//! Where login secrets come from.

use std::io::{self, BufRead, Write};

use super::ChallengeKind;

/// Kind of value being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Login name
    Username,
    /// Current password
    Password,
    /// Replacement password for `NEW_PASSWORD_REQUIRED`
    NewPassword,
    /// One-time code for an MFA challenge
    MfaCode(ChallengeKind),
}

impl InputKind {
    /// Input that answers `challenge`.
    #[must_use]
    pub fn for_challenge(challenge: ChallengeKind) -> Self {
        match challenge {
            ChallengeKind::NewPasswordRequired => Self::NewPassword,
            kind => Self::MfaCode(kind),
        }
    }

    /// Whether the value must be read without echo.
    #[must_use]
    pub fn is_secret(self) -> bool {
        matches!(self, Self::Password | Self::NewPassword)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Username => "Username",
            Self::Password => "Password",
            Self::NewPassword => "New password",
            Self::MfaCode(ChallengeKind::SmsMfa) => "SMS code",
            Self::MfaCode(_) => "Authenticator code",
        }
    }
}

/// Source of interactive input.
pub trait SecretPrompt: Send {
    /// Read one value. `previous_error` is the provider's reason for
    /// rejecting the last value of the same kind.
    fn read(&mut self, kind: InputKind, previous_error: Option<&str>) -> io::Result<String>;
}

impl<P: SecretPrompt + ?Sized> SecretPrompt for &mut P {
    fn read(&mut self, kind: InputKind, previous_error: Option<&str>) -> io::Result<String> {
        (**self).read(kind, previous_error)
    }
}

/// Reads from the terminal, writing labels to stderr so stdout stays clean
/// for command output. Passwords are read without echo; usernames and
/// one-time codes are visible.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    /// Create a console prompt.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SecretPrompt for ConsolePrompt {
    fn read(&mut self, kind: InputKind, previous_error: Option<&str>) -> io::Result<String> {
        let mut stderr = io::stderr().lock();
        if let Some(reason) = previous_error {
            writeln!(stderr, "{reason}")?;
        }
        if kind.is_secret() {
            drop(stderr);
            return rpassword::prompt_password(format!("{}: ", kind.label()));
        }
        write!(stderr, "{}: ", kind.label())?;
        stderr.flush()?;
        drop(stderr);

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Answers the first new-password request from a preset value and defers
/// everything else to an inner prompt.
pub struct PresetPrompt<P> {
    inner: P,
    new_password: Option<String>,
}

impl<P: SecretPrompt> PresetPrompt<P> {
    /// Wrap `inner` with no preset values.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            new_password: None,
        }
    }

    /// Preset the new password used for the first attempt.
    #[must_use]
    pub fn with_new_password(mut self, new_password: Option<String>) -> Self {
        self.new_password = new_password;
        self
    }
}

impl<P: SecretPrompt> SecretPrompt for PresetPrompt<P> {
    fn read(&mut self, kind: InputKind, previous_error: Option<&str>) -> io::Result<String> {
        if kind == InputKind::NewPassword {
            if let Some(preset) = self.new_password.take() {
                return Ok(preset);
            }
        }
        self.inner.read(kind, previous_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<String>);

    impl SecretPrompt for Scripted {
        fn read(&mut self, _kind: InputKind, _previous: Option<&str>) -> io::Result<String> {
            if self.0.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "script empty"));
            }
            Ok(self.0.remove(0))
        }
    }

    #[test]
    fn preset_new_password_is_used_once() {
        let mut prompt = PresetPrompt::new(Scripted(vec!["typed".into()]))
            .with_new_password(Some("preset".into()));

        assert_eq!(prompt.read(InputKind::NewPassword, None).unwrap(), "preset");
        assert_eq!(
            prompt.read(InputKind::NewPassword, Some("too weak")).unwrap(),
            "typed"
        );
    }

    #[test]
    fn preset_does_not_answer_mfa() {
        let mut prompt = PresetPrompt::new(Scripted(vec!["123456".into()]))
            .with_new_password(Some("preset".into()));
        assert_eq!(
            prompt
                .read(InputKind::MfaCode(ChallengeKind::SmsMfa), None)
                .unwrap(),
            "123456"
        );
    }

    #[test]
    fn challenge_maps_to_input_kind() {
        assert_eq!(
            InputKind::for_challenge(ChallengeKind::NewPasswordRequired),
            InputKind::NewPassword
        );
        assert_eq!(
            InputKind::for_challenge(ChallengeKind::SoftwareTokenMfa),
            InputKind::MfaCode(ChallengeKind::SoftwareTokenMfa)
        );
    }

    #[test]
    fn only_passwords_are_read_without_echo() {
        assert!(InputKind::Password.is_secret());
        assert!(InputKind::NewPassword.is_secret());
        assert!(!InputKind::Username.is_secret());
        assert!(!InputKind::MfaCode(ChallengeKind::SmsMfa).is_secret());
    }
}
