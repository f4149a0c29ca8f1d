//! Token issuance, verification and refresh.

mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, encode, Algorithm, EncodingKey, Header};
use proptest::prelude::*;
use uuid::Uuid;

use common::{authority, authority_with, fixture_keys, identity, other_keys, FIXTURE_PUBLIC};
use credential_authority::token::TokenClaims;
use credential_authority::{ErrorKind, Identity};

/// Assemble a token from raw header/payload JSON, RS256-signed with the fixture key.
fn forge(header: &serde_json::Value, payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
    let message = format!("{header}.{payload}");
    let keys = fixture_keys();
    let signature = crypto::sign(message.as_bytes(), keys.encoding_key(), Algorithm::RS256).unwrap();
    format!("{message}.{signature}")
}

fn claims_json(identity: &Identity, exp: i64) -> serde_json::Value {
    serde_json::json!({
        "sub": identity.user_id,
        "aud": identity.app_id,
        "iss": "credential-authority-test",
        "iat": 1000,
        "nbf": 1000,
        "exp": exp,
        "nonce": 1,
    })
}

#[test]
fn test_verify_within_lifetime_and_after_expiry() {
    let authority = authority();
    let id = identity();
    let token = authority.issue_token(&id, 1000, 2000, 42).unwrap();

    assert_eq!(authority.verify_token(&token, 1500).unwrap(), id);

    let err = authority.verify_token(&token, 2500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenExpired);
}

#[test]
fn test_expiry_is_exclusive() {
    let authority = authority();
    let token = authority.issue_token(&identity(), 1000, 2000, 1).unwrap();

    assert!(authority.verify_token(&token, 1999).is_ok());
    let err = authority.verify_token(&token, 2000).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenExpired);
}

#[test]
fn test_header_carries_rs256_and_kid() {
    let keys = fixture_keys();
    let kid = keys.kid().to_string();
    let token = authority_with(keys)
        .issue_token(&identity(), 1000, 2000, 1)
        .unwrap();

    let header = jsonwebtoken::decode_header(&token).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.kid.as_deref(), Some(kid.as_str()));
}

#[test]
fn test_claims_are_typed() {
    let authority = authority();
    let id = identity();
    let token = authority.issue_token(&id, 1000, 2000, 99).unwrap();

    let claims: TokenClaims = authority.verify_claims(&token, 1500).unwrap();
    assert_eq!(claims.sub, id.user_id);
    assert_eq!(claims.aud, id.app_id);
    assert_eq!(claims.iss, authority.issuer());
    assert_eq!(claims.nonce, 99);
}

#[test]
fn test_same_second_tokens_differ_by_nonce() {
    let authority = authority();
    let id = identity();
    let first = authority.issue_token(&id, 1000, 2000, 1).unwrap();
    let second = authority.issue_token(&id, 1000, 2000, 2).unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_expiry_must_follow_issue_time() {
    let err = authority()
        .issue_token(&identity(), 2000, 2000, 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_token_from_other_key_rejected() {
    let token = authority_with(other_keys())
        .issue_token(&identity(), 1000, 2000, 1)
        .unwrap();

    let err = authority().verify_token(&token, 1500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
}

#[test]
fn test_hs256_with_public_key_as_secret_rejected() {
    let id = identity();
    let claims = TokenClaims::new(&id, "attacker", 1000, 2000, 1);
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(FIXTURE_PUBLIC.as_bytes()),
    )
    .unwrap();

    let err = authority().verify_token(&token, 1500).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::InvalidSignature | ErrorKind::UnexpectedSigningMethod
    ));
}

#[test]
fn test_unexpected_algorithm_tag_rejected() {
    let id = identity();
    let token = forge(
        &serde_json::json!({"alg": "RS384", "typ": "JWT"}),
        &claims_json(&id, 2000),
    );

    let err = authority().verify_token(&token, 1500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedSigningMethod);
}

#[test]
fn test_unsigned_token_rejected() {
    let id = identity();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims_json(&id, 2000)).unwrap());
    let token = format!("{header}.{payload}.");

    let err = authority().verify_token(&token, 1500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
}

#[test]
fn test_malformed_claims_rejected() {
    let token = forge(
        &serde_json::json!({"alg": "RS256", "typ": "JWT"}),
        &serde_json::json!({"sub": "not-a-uuid", "exp": 2000}),
    );

    let err = authority().verify_token(&token, 1500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedClaims);
}

#[test]
fn test_claims_checked_before_expiry() {
    let token = forge(
        &serde_json::json!({"alg": "RS256"}),
        &serde_json::json!({"exp": 1}),
    );

    let err = authority().verify_token(&token, 1500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedClaims);
}

#[test]
fn test_structurally_malformed_tokens() {
    let authority = authority();
    for token in ["", "abc", "a.b", "a.b.c.d", "...", "!!.??.**"] {
        let err = authority.verify_token(token, 1500).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSignature, "token {token:?}");
    }
}

#[test]
fn test_tampered_payload_rejected() {
    let authority = authority();
    let token = authority.issue_token(&identity(), 1000, 2000, 1).unwrap();
    let mut parts: Vec<&str> = token.split('.').collect();
    let forged_payload =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims_json(&identity(), 2000)).unwrap());
    parts[1] = &forged_payload;

    let err = authority.verify_token(&parts.join("."), 1500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
}

#[test]
fn test_refresh_issues_distinct_token_with_extended_expiry() {
    let authority = authority();
    let id = identity();
    let original = authority.issue_token(&id, 1000, 2000, 7).unwrap();

    let refreshed = authority.refresh_token(&original, 1500, 3600).unwrap();

    assert_ne!(refreshed.token, original);
    assert_eq!(refreshed.identity, id);
    assert_eq!(refreshed.expires_at, 5100);
    assert_eq!(authority.verify_token(&refreshed.token, 4000).unwrap(), id);

    // The original keeps its own lifetime.
    assert_eq!(authority.verify_token(&original, 1999).unwrap(), id);
    assert_eq!(
        authority.verify_token(&original, 2000).unwrap_err().kind(),
        ErrorKind::TokenExpired
    );
}

#[test]
fn test_refresh_of_expired_token_fails() {
    let authority = authority();
    let token = authority.issue_token(&identity(), 1000, 2000, 7).unwrap();

    let err = authority.refresh_token(&token, 2500, 3600).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenExpired);
}

#[test]
fn test_refresh_of_foreign_token_fails() {
    let token = authority_with(other_keys())
        .issue_token(&identity(), 1000, 2000, 7)
        .unwrap();

    let err = authority().refresh_token(&token, 1500, 3600).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A token verifies to its identity strictly before expiry and never after.
    #[test]
    fn prop_verify_respects_lifetime(
        user in any::<u128>(),
        app in any::<u128>(),
        issued in 0i64..1_000_000_000,
        lifetime in 1i64..1_000_000,
        probe in 0i64..2_000_000,
        nonce in any::<u64>(),
    ) {
        let id = Identity::new(Uuid::from_u128(user), Uuid::from_u128(app));
        let authority = authority();
        let expires_at = issued + lifetime;
        let token = authority.issue_token(&id, issued, expires_at, nonce).unwrap();

        let now = issued + probe;
        match authority.verify_token(&token, now) {
            Ok(verified) => {
                prop_assert!(now < expires_at);
                prop_assert_eq!(verified, id);
            }
            Err(e) => {
                prop_assert!(now >= expires_at);
                prop_assert_eq!(e.kind(), ErrorKind::TokenExpired);
            }
        }
    }

    /// Flipping any single character of a token never yields a different identity.
    #[test]
    fn prop_tampering_never_forges(index in any::<prop::sample::Index>()) {
        let authority = authority();
        let id = identity();
        let token = authority.issue_token(&id, 1000, 2000, 1).unwrap();

        let mut bytes = token.into_bytes();
        let at = index.index(bytes.len());
        bytes[at] = if bytes[at] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        if let Ok(verified) = authority.verify_token(&tampered, 1500) {
            prop_assert_eq!(verified, id);
        }
    }
}
