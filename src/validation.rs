use crate::types::{Credential, ProfileUpdate, SignUpForm};

pub const PASSWORD_MIN_CHARS: usize = 8;
pub const NICKNAME_MAX_CHARS: usize = 20;

/// Client-side form rule violations. Checked before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("email is required")]
    EmailRequired,
    #[error("email is malformed")]
    EmailMalformed,
    #[error("nickname is required")]
    NicknameRequired,
    #[error("nickname is longer than {NICKNAME_MAX_CHARS} characters")]
    NicknameTooLong,
    #[error("password is required")]
    PasswordRequired,
    #[error("password is shorter than {PASSWORD_MIN_CHARS} characters")]
    PasswordTooShort,
    #[error("password must mix letters, digits and special characters")]
    PasswordTooWeak,
    #[error("password confirmation does not match")]
    PasswordMismatch,
}

impl ValidationError {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmailRequired => "이메일은 필수 입력입니다.",
            Self::EmailMalformed => "이메일 형식으로 작성해 주세요.",
            Self::NicknameRequired => "닉네임은 필수 입력입니다.",
            Self::NicknameTooLong => "닉네임은 최대 20자까지 가능합니다.",
            Self::PasswordRequired => "비밀번호는 필수 입력입니다.",
            Self::PasswordTooShort => "비밀번호는 최소 8자 이상입니다.",
            Self::PasswordTooWeak => "비밀번호는 영문, 숫자, 특수문자를 모두 포함해야 합니다.",
            Self::PasswordMismatch => "비밀번호가 일치하지 않습니다.",
        }
    }
}

/// Validates an email address shape.
///
/// A valid address has exactly one `@`, a non-empty local part, a dotted
/// domain whose labels are non-empty, and no whitespace.
#[must_use]
pub fn is_valid_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

fn check_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if !is_valid_email(email) {
        return Err(ValidationError::EmailMalformed);
    }
    Ok(())
}

/// Password complexity: at least 8 characters, drawn only from ASCII letters,
/// digits and ASCII punctuation, with at least one of each class.
pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ValidationError::PasswordTooShort);
    }
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation());
    let letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let special = password.chars().any(|c| c.is_ascii_punctuation());
    if !(allowed && letter && digit && special) {
        return Err(ValidationError::PasswordTooWeak);
    }
    Ok(())
}

fn check_nickname(nickname: &str) -> Result<(), ValidationError> {
    if nickname.trim().is_empty() {
        return Err(ValidationError::NicknameRequired);
    }
    if nickname.chars().count() > NICKNAME_MAX_CHARS {
        return Err(ValidationError::NicknameTooLong);
    }
    Ok(())
}

/// Sign-in only checks presence and email shape; complexity rules apply at sign-up.
pub fn validate_sign_in(credential: &Credential) -> Result<(), ValidationError> {
    check_email(&credential.email)?;
    if credential.password().is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    Ok(())
}

pub fn validate_sign_up(form: &SignUpForm) -> Result<(), ValidationError> {
    check_email(&form.email)?;
    check_nickname(&form.nickname)?;
    check_password(&form.password)?;
    if form.password != form.password_confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn validate_profile_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    match &update.nickname {
        Some(nickname) => check_nickname(nickname),
        None => Ok(()),
    }
}
