use super::*;
use crate::state::test_helpers::{TEST_JWT_SECRET, expired_token, token_for, unix_now};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::json;

fn verifier() -> JwtVerifier {
    JwtVerifier::new(TEST_JWT_SECRET)
}

#[test]
fn valid_token_yields_user_id() {
    let token = token_for("user-1");
    assert_eq!(verifier().verify(&token).unwrap(), "user-1");
}

#[test]
fn expired_token_is_rejected_as_expired() {
    let token = expired_token("user-1");
    assert!(matches!(verifier().verify(&token), Err(VerifyError::Expired)));
}

#[test]
fn wrong_secret_is_rejected() {
    let token = token_for("user-1");
    let other = JwtVerifier::new(b"some-other-secret");
    assert!(matches!(other.verify(&token), Err(VerifyError::Rejected(_))));
}

#[test]
fn garbage_token_is_rejected() {
    assert!(matches!(verifier().verify("not.a.jwt"), Err(VerifyError::Rejected(_))));
    assert!(matches!(verifier().verify(""), Err(VerifyError::Missing)));
}

#[test]
fn token_without_user_id_is_rejected() {
    let claims = json!({ "sub": "user-1", "exp": unix_now() + 3600 });
    let token =
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_JWT_SECRET)).unwrap();
    assert!(matches!(verifier().verify(&token), Err(VerifyError::MissingUserId)));

    let claims = json!({ "userId": "", "exp": unix_now() + 3600 });
    let token =
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_JWT_SECRET)).unwrap();
    assert!(matches!(verifier().verify(&token), Err(VerifyError::MissingUserId)));
}

#[test]
fn token_without_expiry_is_rejected() {
    let claims = json!({ "userId": "user-1" });
    let token =
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_JWT_SECRET)).unwrap();
    assert!(matches!(verifier().verify(&token), Err(VerifyError::Rejected(_))));
}
