use super::*;

#[test]
fn known_codes_decode() {
    let raw = r#"{ "code": "not_found", "message": "no such user" }"#;
    let err: ApiError = serde_json::from_str(raw).expect("decode");
    assert_eq!(err.code, ErrorCode::NotFound);

    let raw = r#"{ "code": "unauthorized", "message": "token expired" }"#;
    let err: ApiError = serde_json::from_str(raw).expect("decode");
    assert_eq!(err.code, ErrorCode::Unauthorized);
    assert_eq!(err.to_string(), "token expired (Unauthorized)");
}

#[test]
fn unknown_codes_keep_the_message() {
    let raw = r#"{ "code": "rate_limited", "message": "slow down" }"#;
    let err: ApiError = serde_json::from_str(raw).expect("decode");
    assert_eq!(err.code, ErrorCode::Other);
    assert_eq!(err.message, "slow down");
}
