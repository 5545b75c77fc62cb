//! Signature Provider
//!
//! Everything needed to open an authenticated stream connection: the
//! session cookie token, the randomized client token, and the per-connection
//! signature string.
//!
//! The signing algorithm itself is platform-proprietary and externally
//! supplied. It is modeled as the [`Signer`] capability so the rest of the
//! system can run against a stub in tests and swap implementations when the
//! upstream algorithm changes.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use url::Url;

/// Alphabet the client token is drawn from.
const CLIENT_TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789=_";

/// Default client token length.
pub const DEFAULT_CLIENT_TOKEN_LEN: usize = 107;

/// Cookie name carrying the session token.
const SESSION_COOKIE: &str = "ttwid";

/// Query parameters folded into the signature input, in signing order.
/// Missing parameters are treated as empty strings.
const SIGNED_PARAMS: [&str; 13] = [
    "live_id",
    "aid",
    "version_code",
    "webcast_sdk_version",
    "room_id",
    "sub_room_id",
    "sub_channel_id",
    "did_rule",
    "user_unique_id",
    "device_platform",
    "device_type",
    "ac",
    "identity",
];

/// Signature layer errors
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The landing page did not yield a session cookie
    #[error("session token unavailable: {0}")]
    SessionTokenUnavailable(String),

    /// The candidate URL could not be parsed
    #[error("invalid candidate url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The signing backend could not be invoked
    #[error("signing function unavailable: {0}")]
    SigningUnavailable(String),

    /// The signing backend returned something other than a signature string
    #[error("signing function returned an invalid result: {0}")]
    SigningResultInvalid(String),
}

/// Externally supplied signing capability.
///
/// Takes the lower-hex digest of the joined signature input and returns the
/// platform's proof string.
pub trait Signer: Send + Sync {
    fn sign(&self, digest: &str) -> Result<String, SignatureError>;
}

/// Adapter turning a closure into a [`Signer`]. Handy for tests and for
/// embedding callers that already have a signing function in hand.
pub struct FnSigner<F>(pub F);

impl<F> Signer for FnSigner<F>
where
    F: Fn(&str) -> Result<String, SignatureError> + Send + Sync,
{
    fn sign(&self, digest: &str) -> Result<String, SignatureError> {
        (self.0)(digest)
    }
}

/// Signer backed by an external command.
///
/// The digest is appended as the final argument and the trimmed stdout is
/// taken as the signature. This is the production seam for the upstream
/// signing script.
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
}

impl CommandSigner {
    pub fn new(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }
}

impl Signer for CommandSigner {
    fn sign(&self, digest: &str) -> Result<String, SignatureError> {
        if self.program.is_empty() {
            return Err(SignatureError::SigningUnavailable(
                "empty sign command".to_string(),
            ));
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(digest)
            .output()
            .map_err(|e| SignatureError::SigningUnavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(SignatureError::SigningUnavailable(format!(
                "sign command exited with {}",
                output.status
            )));
        }

        let signature = String::from_utf8(output.stdout)
            .map_err(|_| {
                SignatureError::SigningResultInvalid("non-utf8 output".to_string())
            })?
            .trim()
            .to_string();

        if signature.is_empty() {
            return Err(SignatureError::SigningResultInvalid(
                "empty output".to_string(),
            ));
        }

        Ok(signature)
    }
}

/// Signer used when no signing backend is configured; always unavailable.
pub struct UnavailableSigner;

impl Signer for UnavailableSigner {
    fn sign(&self, _digest: &str) -> Result<String, SignatureError> {
        Err(SignatureError::SigningUnavailable(
            "no signing backend configured".to_string(),
        ))
    }
}

/// Fetch the session token from the platform's landing page.
///
/// Scans the response's `Set-Cookie` headers for the session cookie. The
/// caller caches the result for the process lifetime.
pub async fn fetch_session_token(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<String, SignatureError> {
    let response = client
        .get(base_url)
        .send()
        .await
        .map_err(|e| SignatureError::SessionTokenUnavailable(e.to_string()))?;

    let prefix = format!("{SESSION_COOKIE}=");
    for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
        let Ok(cookie) = value.to_str() else { continue };
        if let Some(rest) = cookie.strip_prefix(&prefix) {
            let token = rest.split(';').next().unwrap_or(rest);
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }

    Err(SignatureError::SessionTokenUnavailable(format!(
        "no {SESSION_COOKIE} cookie in response from {base_url}"
    )))
}

/// Produce a random client token over the fixed 64-character alphabet.
///
/// No uniqueness guarantee; collisions are acceptable and unchecked.
pub fn generate_client_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CLIENT_TOKEN_ALPHABET.len());
            CLIENT_TOKEN_ALPHABET[idx] as char
        })
        .collect()
}

/// Build the canonical signature input for a candidate connection URL:
/// the tracked parameters joined as `key=value` pairs, comma-separated, in
/// signing order.
pub fn signature_input(candidate_url: &str) -> Result<String, SignatureError> {
    let url = Url::parse(candidate_url)?;
    let params: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let joined = SIGNED_PARAMS
        .iter()
        .map(|key| {
            let value = params.get(*key).map(String::as_str).unwrap_or("");
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(",");

    Ok(joined)
}

/// Compute the signature for a candidate connection URL.
///
/// Hashes the canonical input (lower-hex md5) and hands the digest to the
/// supplied signing capability.
pub fn generate_signature(
    candidate_url: &str,
    signer: &dyn Signer,
) -> Result<String, SignatureError> {
    let input = signature_input(candidate_url)?;
    let digest = format!("{:x}", md5::compute(input.as_bytes()));

    let signature = signer.sign(&digest)?;
    if signature.is_empty() {
        return Err(SignatureError::SigningResultInvalid(
            "empty signature".to_string(),
        ));
    }

    Ok(signature)
}

/// Compute the signature off the async runtime, bounded by `limit`.
///
/// Signers may block (the command signer waits on a child process), so the
/// call runs on the blocking pool. On timeout the abandoned task finishes
/// on its own when the signer returns; its result is discarded.
pub async fn sign_with_timeout(
    candidate_url: String,
    signer: Arc<dyn Signer>,
    limit: Duration,
) -> Result<String, SignatureError> {
    let task =
        tokio::task::spawn_blocking(move || generate_signature(&candidate_url, signer.as_ref()));

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(SignatureError::SigningUnavailable(format!(
            "signing task failed: {e}"
        ))),
        Err(_) => Err(SignatureError::SigningUnavailable(format!(
            "signing timed out after {limit:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const CANDIDATE: &str = "wss://example.com/push/?room_id=123&aid=6383&version_code=190500&webcast_sdk_version=1.3.0&live_id=1&device_platform=web&device_type=windows&ac=wifi&identity=audience&timestamp=1700000000000&sign=";

    #[test]
    fn test_client_token_length_and_alphabet() {
        let token = generate_client_token(DEFAULT_CLIENT_TOKEN_LEN);
        assert_eq!(token.len(), DEFAULT_CLIENT_TOKEN_LEN);
        assert!(token
            .bytes()
            .all(|b| CLIENT_TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_client_token_custom_length() {
        assert_eq!(generate_client_token(16).len(), 16);
        assert_eq!(generate_client_token(0).len(), 0);
    }

    #[test]
    fn test_signature_input_order_and_missing_params() {
        let input = signature_input(CANDIDATE).unwrap();

        // Fixed order, missing params joined as empty values.
        assert!(input.starts_with("live_id=1,aid=6383,version_code=190500"));
        assert!(input.contains("sub_room_id=,sub_channel_id=,did_rule=,user_unique_id="));
        assert!(input.ends_with("device_platform=web,device_type=windows,ac=wifi,identity=audience"));
    }

    #[test]
    fn test_untracked_params_do_not_affect_input() {
        let base = signature_input(CANDIDATE).unwrap();
        let with_extra =
            signature_input(&format!("{CANDIDATE}&timestamp=999&compress=gzip")).unwrap();
        assert_eq!(base, with_extra);
    }

    #[test]
    fn test_tracked_param_changes_input() {
        let base = signature_input(CANDIDATE).unwrap();
        let changed = signature_input(&CANDIDATE.replace("room_id=123", "room_id=124")).unwrap();
        assert_ne!(base, changed);
    }

    #[test]
    fn test_generate_signature_passes_hex_digest_to_signer() {
        let seen = Mutex::new(String::new());
        let signer = FnSigner(|digest: &str| {
            *seen.lock().unwrap() = digest.to_string();
            Ok("signed".to_string())
        });

        let signature = generate_signature(CANDIDATE, &signer).unwrap();
        assert_eq!(signature, "signed");

        let digest = seen.lock().unwrap().clone();
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let expected = format!("{:x}", md5::compute(signature_input(CANDIDATE).unwrap()));
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_generate_signature_rejects_empty_result() {
        let signer = FnSigner(|_: &str| Ok(String::new()));
        let result = generate_signature(CANDIDATE, &signer);
        assert!(matches!(result, Err(SignatureError::SigningResultInvalid(_))));
    }

    #[test]
    fn test_unavailable_signer() {
        let result = generate_signature(CANDIDATE, &UnavailableSigner);
        assert!(matches!(result, Err(SignatureError::SigningUnavailable(_))));
    }

    #[test]
    fn test_command_signer_rejects_empty_command() {
        let signer = CommandSigner::new("   ");
        assert!(matches!(
            signer.sign("abc"),
            Err(SignatureError::SigningUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_signer_does_not_stall_the_runtime() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let signer: Arc<dyn Signer> = Arc::new(FnSigner(|_: &str| {
            std::thread::sleep(Duration::from_millis(200));
            Ok("sig".to_string())
        }));

        // On the current-thread test runtime this timer can only fire while
        // the signer runs if the blocking work is off the runtime thread.
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let signature =
            sign_with_timeout(CANDIDATE.to_string(), signer, Duration::from_secs(5)).await;
        assert_eq!(signature.unwrap(), "sig");
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_signing_timeout_is_reported() {
        let signer: Arc<dyn Signer> = Arc::new(FnSigner(|_: &str| {
            std::thread::sleep(Duration::from_millis(300));
            Ok("late".to_string())
        }));

        let result =
            sign_with_timeout(CANDIDATE.to_string(), signer, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SignatureError::SigningUnavailable(_))));
    }
}
