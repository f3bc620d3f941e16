use super::*;
use axum::http::{Request, StatusCode, header::COOKIE};
use jsonwebtoken::{EncodingKey, Header, encode};

const SECRET: &str = "supersecretjwtsecretforunittesting123";

fn claims(exp: usize) -> SessionClaims {
    SessionClaims {
        sub: "user_2abcDEF".to_string(),
        exp,
        email: Some("buyer@example.com".to_string()),
        email_verified: Some(true),
    }
}

fn sign(claims: &SessionClaims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn parts_with(header: Option<(&str, String)>, verifier: Option<JwtVerifier>) -> Parts {
    let mut builder = Request::builder().uri("/api/me/access");
    if let Some((name, value)) = header {
        builder = builder.header(name, value);
    }
    let (mut parts, _) = builder.body(()).unwrap().into_parts();
    if let Some(verifier) = verifier {
        parts.extensions.insert(Arc::new(verifier));
    }
    parts
}

#[test]
fn test_verify_hs256_success() {
    let verifier = JwtVerifier::from_secret(SECRET, None);
    let token = sign(&claims(9_999_999_999), SECRET);

    let user = verifier.verify(&token).expect("Valid token should pass");
    assert_eq!(user.user_id, "user_2abcDEF");
    assert_eq!(user.email.as_deref(), Some("buyer@example.com"));
    assert!(user.email_verified);
}

#[test]
fn test_verify_expired() {
    let verifier = JwtVerifier::from_secret(SECRET, None);
    let token = sign(&claims(1), SECRET);
    assert!(verifier.verify(&token).is_err());
}

#[test]
fn test_verify_invalid_signature() {
    let verifier = JwtVerifier::from_secret(SECRET, None);
    let token = sign(&claims(9_999_999_999), "wrongsecret");
    assert!(verifier.verify(&token).is_err());
}

#[test]
fn test_verify_enforces_issuer() {
    let verifier = JwtVerifier::from_secret(SECRET, Some("https://clerk.example.com"));
    let token = sign(&claims(9_999_999_999), SECRET);
    assert!(verifier.verify(&token).is_err());
}

#[test]
fn test_invalid_pem_is_rejected() {
    assert!(JwtVerifier::from_rsa_pem("not a key", None).is_err());
}

#[tokio::test]
async fn test_extractor_reads_bearer_header() {
    let token = sign(&claims(9_999_999_999), SECRET);
    let mut parts = parts_with(
        Some(("authorization", format!("Bearer {token}"))),
        Some(JwtVerifier::from_secret(SECRET, None)),
    );

    let user = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(user.user_id, "user_2abcDEF");
}

#[tokio::test]
async fn test_extractor_falls_back_to_session_cookie() {
    let token = sign(&claims(9_999_999_999), SECRET);
    let mut parts = parts_with(
        Some((COOKIE.as_str(), format!("theme=dark; {SESSION_COOKIE}={token}"))),
        Some(JwtVerifier::from_secret(SECRET, None)),
    );

    let user = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(user.email.as_deref(), Some("buyer@example.com"));
}

#[tokio::test]
async fn test_extractor_rejects_missing_token() {
    let mut parts = parts_with(None, Some(JwtVerifier::from_secret(SECRET, None)));

    let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_maybe_auth_user_is_none_for_bad_token() {
    let mut parts = parts_with(
        Some(("authorization", "Bearer garbage".to_string())),
        Some(JwtVerifier::from_secret(SECRET, None)),
    );

    let MaybeAuthUser(user) = MaybeAuthUser::from_request_parts(&mut parts, &())
        .await
        .unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_missing_verifier_is_server_error() {
    let mut parts = parts_with(None, None);

    let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
}
