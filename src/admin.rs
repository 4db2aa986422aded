use crate::config::AdminConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use constant_time_eq::constant_time_eq;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

const PBKDF2_ROUNDS: u32 = 100_000;
const DIGEST_LEN: usize = 32;

fn derive(password: &str, salt: &str) -> String {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut digest);
    hex::encode(digest)
}

/// Produce a `<salt>$<digest>` PBKDF2-HMAC-SHA256 string for the admin password setting.
/// The salt is 32 hex characters, used as ASCII bytes.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    format!("{salt}${}", derive(password, &salt))
}

/// Check a password against a stored `<salt>$<digest>` hash. Values without a `$` are
/// treated as plain text.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) if !salt.is_empty() && !expected.contains('$') => {
            let expected = expected.to_ascii_lowercase();
            constant_time_eq(derive(password, salt).as_bytes(), expected.as_bytes())
        }
        Some(_) => {
            log::warn!("Unsupported admin password hash format; expected <salt>$<hex digest>");
            false
        }
        None => constant_time_eq(password.as_bytes(), stored.as_bytes()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    /// No `Authorization` header was sent
    Missing,
    Denied { username: String },
    /// Admin credentials are not configured, so nobody can log in
    Disabled,
}

/// Per-request HTTP Basic check against the configured admin account.
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    credentials: Option<(String, String)>,
}

impl AdminAuth {
    pub fn from_config(config: Option<&AdminConfig>) -> Self {
        let credentials = config.and_then(|c| match (&c.username, &c.password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user.clone(), password.clone()))
            }
            _ => None,
        });
        Self { credentials }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn check(&self, authorization: Option<&str>) -> AuthOutcome {
        let Some((expected_user, stored_password)) = &self.credentials else {
            return AuthOutcome::Disabled;
        };
        let Some(header) = authorization else {
            return AuthOutcome::Missing;
        };
        let Some((username, password)) = parse_basic(header) else {
            return AuthOutcome::Denied {
                username: String::new(),
            };
        };

        let user_ok = constant_time_eq(username.as_bytes(), expected_user.as_bytes());
        let password_ok = verify_password(&password, stored_password);
        if user_ok && password_ok {
            AuthOutcome::Granted
        } else {
            AuthOutcome::Denied { username }
        }
    }
}

fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
