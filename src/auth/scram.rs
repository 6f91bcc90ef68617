//! SCRAM-SHA-256 Client (RFC 7677)
//!
//! Three-step ladder: client-first message, challenge response with the
//! client proof, server-signature verification. PBKDF2 is the one-block
//! case (dkLen = hash length), built directly on the HMAC primitive.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const CLIENT_KEY_LABEL: &[u8] = b"Client Key";
const SERVER_KEY_LABEL: &[u8] = b"Server Key";
/// base64("n,,") - the GS2 header echoed in the final message.
const CHANNEL_BINDING: &str = "c=biws";
const NONCE_LEN: usize = 24;

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// PBKDF2-HMAC-SHA-256 producing exactly one hash block.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut block = Vec::with_capacity(salt.len() + 4);
    block.extend_from_slice(salt);
    block.extend_from_slice(&1u32.to_be_bytes());

    let mut u = hmac_sha256(password, &block);
    let mut out = u;
    for _ in 1..iterations {
        u = hmac_sha256(password, &u);
        for (o, b) in out.iter_mut().zip(u.iter()) {
            *o ^= b;
        }
    }
    out
}

/// SASL-escape a username: `=` and `,` are reserved.
fn saslname(user: &str) -> String {
    user.replace('=', "=3D").replace(',', "=2C")
}

/// Outcome of one challenge step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Send this message and wait for the next challenge.
    NeedsMore(String),
    /// Server signature verified.
    Success,
    Failed(String),
}

enum State {
    AwaitingServerFirst,
    AwaitingServerFinal { server_signature: [u8; 32] },
    Done,
}

/// One authentication exchange. Single-use.
pub struct ScramClient {
    user: String,
    password: String,
    client_nonce: String,
    client_first_bare: String,
    state: State,
}

impl ScramClient {
    pub fn new(user: &str, password: &str) -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        Self::with_nonce(user, password, &nonce)
    }

    /// Fixed-nonce constructor; the RFC vectors need it.
    pub fn with_nonce(user: &str, password: &str, nonce: &str) -> Self {
        let client_first_bare = format!("n={},r={}", saslname(user), nonce);
        Self {
            user: user.to_string(),
            password: password.to_string(),
            client_nonce: nonce.to_string(),
            client_first_bare,
            state: State::AwaitingServerFirst,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// `n,,n=<user>,r=<nonce>` - the opening message.
    pub fn first_message(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Feed the next server message.
    pub fn on_challenge(&mut self, challenge: &str) -> AuthStep {
        match &self.state {
            State::AwaitingServerFirst => self.on_server_first(challenge),
            State::AwaitingServerFinal { server_signature } => {
                let expect = *server_signature;
                self.state = State::Done;
                self.on_server_final(challenge, &expect)
            }
            State::Done => AuthStep::Failed("exchange already finished".to_string()),
        }
    }

    fn on_server_first(&mut self, challenge: &str) -> AuthStep {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in challenge.split(',') {
            match attr.split_once('=') {
                Some(("r", v)) => nonce = Some(v.to_string()),
                Some(("s", v)) => salt = B64.decode(v).ok(),
                Some(("i", v)) => iterations = v.parse::<u32>().ok(),
                _ => {}
            }
        }
        let (nonce, salt, iterations) = match (nonce, salt, iterations) {
            (Some(n), Some(s), Some(i)) if i > 0 => (n, s, i),
            _ => return self.fail("malformed server-first message"),
        };
        if !nonce.starts_with(self.client_nonce.as_str()) {
            return self.fail("server nonce does not extend client nonce");
        }

        let salted = hi(self.password.as_bytes(), &salt, iterations);
        let client_key = hmac_sha256(&salted, CLIENT_KEY_LABEL);
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();

        let without_proof = format!("{CHANNEL_BINDING},r={nonce}");
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, challenge, without_proof
        );
        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let mut proof = client_key;
        for (p, s) in proof.iter_mut().zip(client_signature.iter()) {
            *p ^= s;
        }

        let server_key = hmac_sha256(&salted, SERVER_KEY_LABEL);
        let server_signature = hmac_sha256(&server_key, auth_message.as_bytes());
        self.state = State::AwaitingServerFinal { server_signature };

        AuthStep::NeedsMore(format!("{},p={}", without_proof, B64.encode(proof)))
    }

    fn on_server_final(&mut self, challenge: &str, expect: &[u8; 32]) -> AuthStep {
        if let Some(err) = challenge.strip_prefix("e=") {
            return AuthStep::Failed(format!("server error: {err}"));
        }
        let got = match challenge.strip_prefix("v=").map(|v| B64.decode(v)) {
            Some(Ok(sig)) => sig,
            _ => return AuthStep::Failed("malformed server-final message".to_string()),
        };
        if got == expect {
            debug!(user = %self.user, "scram exchange verified");
            AuthStep::Success
        } else {
            AuthStep::Failed("server signature mismatch".to_string())
        }
    }

    fn fail(&mut self, reason: &str) -> AuthStep {
        self.state = State::Done;
        AuthStep::Failed(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256 vectors pinning the digest the whole module rides on,
    /// including the exact 64-byte block boundary.
    #[test]
    fn test_sha256_vectors() {
        let cases: &[(&str, &str)] = &[
            (
                "",
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            ),
            (
                "abc",
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            ),
            (
                // Exactly one 64-byte block: exercises the padding path.
                "1234567890123456789012345678901234567890123456789012345678901234",
                "676491965ed3ec50cb7a63ee96315480a95c54426b0b72bca8a0d4ad1285ad55",
            ),
            (
                "123456789012345678901234567890123456789012345678901234567890123",
                // 63 bytes: one short of the block.
                "03c3a70e99ed5eeccd80f73771fcf1ece643d939d9ecc76f25544b0233f708e9",
            ),
        ];
        for (input, expect) in cases {
            let digest = Sha256::digest(input.as_bytes());
            assert_eq!(hex::encode(digest), *expect, "input {input:?}");
        }
    }

    /// The full RFC 7677 example: user "user", password "pencil".
    #[test]
    fn test_rfc7677_exchange() {
        let mut client = ScramClient::with_nonce("user", "pencil", "rOprNGfwEbeRWgbNEkqO");
        assert_eq!(client.first_message(), "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let challenge = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                         s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let step = client.on_challenge(challenge);
        assert_eq!(
            step,
            AuthStep::NeedsMore(
                "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                 p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
                    .to_string()
            )
        );

        let step = client.on_challenge("v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=");
        assert_eq!(step, AuthStep::Success);
    }

    #[test]
    fn test_forged_server_signature_rejected() {
        let mut client = ScramClient::with_nonce("user", "pencil", "rOprNGfwEbeRWgbNEkqO");
        let challenge = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                         s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        assert!(matches!(
            client.on_challenge(challenge),
            AuthStep::NeedsMore(_)
        ));
        assert!(matches!(
            client.on_challenge("v=AAAATRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4="),
            AuthStep::Failed(_)
        ));
    }

    #[test]
    fn test_server_error_reported() {
        let mut client = ScramClient::with_nonce("user", "pencil", "rOprNGfwEbeRWgbNEkqO");
        let challenge = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                         s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let _ = client.on_challenge(challenge);
        assert!(matches!(
            client.on_challenge("e=invalid-proof"),
            AuthStep::Failed(_)
        ));
    }

    #[test]
    fn test_nonce_must_extend_clients() {
        let mut client = ScramClient::with_nonce("user", "pencil", "clientnonce");
        let step =
            client.on_challenge("r=entirely-different,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096");
        assert!(matches!(step, AuthStep::Failed(_)));
    }

    #[test]
    fn test_saslname_escaping() {
        let client = ScramClient::with_nonce("a=b,c", "pw", "n");
        assert_eq!(client.first_message(), "n,,n=a=3Db=2Cc,r=n");
    }

    #[test]
    fn test_random_nonce_shape() {
        let client = ScramClient::new("user", "pw");
        let msg = client.first_message();
        let nonce = msg.rsplit("r=").next().unwrap();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
