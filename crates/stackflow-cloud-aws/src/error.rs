//! AWS error classification
//!
//! SDK errors are mapped onto gateway error kinds by their `.code()`. The
//! message text is kept for the report but never inspected.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use stackflow_cloud::{ErrorKind, GatewayError};

/// Codes for resources that are still referenced by something else
const CONFLICT_CODES: &[&str] = &[
    "DependencyViolation",
    "IncorrectState",
    "IncorrectInstanceState",
    "InvalidGroup.InUse",
    "InvalidNetworkInterface.InUse",
    "Resource.AlreadyAssociated",
    "DeleteConflict",
    "BucketNotEmpty",
    "OperationAborted",
    "ConcurrentModification",
    // a concurrent create won; the next existence check finds it
    "InvalidGroup.Duplicate",
    "InvalidKeyPair.Duplicate",
    "EntityAlreadyExists",
    "BucketAlreadyOwnedByYou",
];

/// Codes for resources the provider refuses to remove
const PROTECTED_CODES: &[&str] = &["OperationNotPermitted", "CannotDelete", "UnmodifiableEntity"];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "SlowDown",
    "TooManyRequestsException",
];

const TIMEOUT_CODES: &[&str] = &["RequestTimeout", "RequestTimeoutException"];

/// Rejected requests. Permission errors are included: retrying cannot fix them.
const VALIDATION_CODES: &[&str] = &[
    "MissingParameter",
    "ValidationError",
    "MalformedPolicyDocument",
    "InvalidBucketName",
    "BucketAlreadyExists",
    "Unsupported",
    "UnsupportedOperation",
    "UnauthorizedOperation",
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
];

/// Map a provider error code onto an error kind
pub fn classify_code(code: Option<&str>) -> ErrorKind {
    let Some(code) = code else {
        return ErrorKind::Unknown;
    };

    if code.ends_with(".NotFound") || code.starts_with("NoSuch") || code == "NotFound" {
        ErrorKind::NotFound
    } else if CONFLICT_CODES.contains(&code) {
        ErrorKind::Conflict
    } else if PROTECTED_CODES.contains(&code) {
        ErrorKind::Protected
    } else if THROTTLING_CODES.contains(&code) {
        ErrorKind::RateLimited
    } else if TIMEOUT_CODES.contains(&code) {
        ErrorKind::Timeout
    } else if VALIDATION_CODES.contains(&code)
        || code.starts_with("InvalidParameter")
        || code.starts_with("InvalidInput")
        || code.ends_with(".Malformed")
        || code.ends_with(".Range")
    {
        ErrorKind::Validation
    } else {
        ErrorKind::Unknown
    }
}

/// Convert an SDK error from any service client
pub fn from_sdk<E, R>(what: &str, err: SdkError<E, R>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    if let SdkError::TimeoutError(_) = err {
        return GatewayError::new(ErrorKind::Timeout, format!("{what}: request timed out"));
    }

    let kind = classify_code(err.code());
    let detail = match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        _ => DisplayErrorContext(&err).to_string(),
    };
    GatewayError::new(kind, format!("{what}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes() {
        for code in [
            "InvalidVpcID.NotFound",
            "InvalidSubnetID.NotFound",
            "InvalidKeyPair.NotFound",
            "NoSuchBucket",
            "NoSuchEntity",
            "NoSuchTagSet",
            "NotFound",
        ] {
            assert_eq!(classify_code(Some(code)), ErrorKind::NotFound, "{code}");
        }
    }

    #[test]
    fn test_in_use_is_conflict() {
        assert_eq!(classify_code(Some("DependencyViolation")), ErrorKind::Conflict);
        assert_eq!(classify_code(Some("BucketNotEmpty")), ErrorKind::Conflict);
        assert_eq!(classify_code(Some("DeleteConflict")), ErrorKind::Conflict);
        assert!(classify_code(Some("InvalidGroup.InUse")).is_transient());
    }

    #[test]
    fn test_protected_codes() {
        assert_eq!(classify_code(Some("CannotDelete")), ErrorKind::Protected);
        assert_eq!(classify_code(Some("OperationNotPermitted")), ErrorKind::Protected);
    }

    #[test]
    fn test_throttling_codes() {
        for code in THROTTLING_CODES {
            assert_eq!(classify_code(Some(code)), ErrorKind::RateLimited, "{code}");
        }
    }

    #[test]
    fn test_validation_codes() {
        for code in [
            "InvalidParameterValue",
            "InvalidParameterCombination",
            "InvalidSubnet.Range",
            "InvalidAMIID.Malformed",
            "UnauthorizedOperation",
            "MalformedPolicyDocument",
        ] {
            assert_eq!(classify_code(Some(code)), ErrorKind::Validation, "{code}");
        }
        // a missing image is not a malformed request
        assert_eq!(classify_code(Some("InvalidAMIID.NotFound")), ErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(classify_code(Some("InternalError")), ErrorKind::Unknown);
        assert_eq!(classify_code(None), ErrorKind::Unknown);
    }
}
