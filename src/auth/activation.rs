use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};

/// Validity window of a freshly issued activation code.
pub const ACTIVATION_CODE_TTL: Duration = Duration::hours(24);

const ACTIVATION_CODE_BYTES: usize = 8;

#[derive(Debug, Clone)]
pub struct ActivationCode {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

pub fn generate() -> ActivationCode {
    ActivationCode {
        code: random_hex(ACTIVATION_CODE_BYTES),
        expires_at: OffsetDateTime::now_utc() + ACTIVATION_CODE_TTL,
    }
}

/// Lowercase hex of `bytes` bytes drawn from the OS CSPRNG.
///
/// Panics if the OS entropy source is unavailable.
pub(crate) fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_sixteen_hex_chars() {
        let ActivationCode { code, .. } = generate();
        assert_eq!(code.len(), 16);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn expiry_is_a_day_out() {
        let before = OffsetDateTime::now_utc();
        let ActivationCode { expires_at, .. } = generate();
        let after = OffsetDateTime::now_utc();
        assert!(expires_at >= before + ACTIVATION_CODE_TTL);
        assert!(expires_at <= after + ACTIVATION_CODE_TTL);
    }

    #[test]
    fn codes_do_not_repeat() {
        assert_ne!(generate().code, generate().code);
    }

    #[test]
    fn random_hex_doubles_length() {
        assert_eq!(random_hex(24).len(), 48);
    }
}
