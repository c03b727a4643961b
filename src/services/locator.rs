use percent_encoding::percent_decode_str;

/// Canonical scheme prefix for stored-object locators.
const LOCATOR_SCHEME: &str = "s3://";

/// Turn a free-form object reference into the canonical `s3://bucket/key` locator.
///
/// Accepts whatever callers put in a `key` query parameter: a bare key, a
/// percent-encoded key, a `/`-prefixed path, a `bucket/key` pair, or an
/// already-canonical locator. Total over all inputs; the worst case is an
/// empty string, never an error.
pub fn normalize_object_locator(input: &str, bucket: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    // Malformed escape sequences are not fatal; keep the raw value.
    let decoded = match percent_decode_str(input).decode_utf8() {
        Ok(value) => value.into_owned(),
        Err(_) => input.to_string(),
    };

    if decoded.starts_with(LOCATOR_SCHEME) {
        return decoded;
    }

    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }

    let bucket_prefix = format!("{bucket}/");
    if trimmed.starts_with(&bucket_prefix) {
        return format!("{LOCATOR_SCHEME}{trimmed}");
    }

    format!("{LOCATOR_SCHEME}{bucket}/{trimmed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET: &str = "medcode-dev";

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_object_locator("", BUCKET), "");
    }

    #[test]
    fn test_bare_key() {
        assert_eq!(
            normalize_object_locator("uploads/1-report.pdf", BUCKET),
            "s3://medcode-dev/uploads/1-report.pdf"
        );
    }

    #[test]
    fn test_strips_leading_slashes() {
        assert_eq!(
            normalize_object_locator("///uploads/1-report.pdf", BUCKET),
            "s3://medcode-dev/uploads/1-report.pdf"
        );
        assert_eq!(normalize_object_locator("///", BUCKET), "");
    }

    #[test]
    fn test_percent_encoded_key() {
        assert_eq!(
            normalize_object_locator("uploads%2F1-report.pdf", BUCKET),
            "s3://medcode-dev/uploads/1-report.pdf"
        );
    }

    #[test]
    fn test_malformed_escape_kept_verbatim() {
        // "%FF" decodes to invalid UTF-8; the raw input is kept.
        assert_eq!(
            normalize_object_locator("bad%FFkey", BUCKET),
            "s3://medcode-dev/bad%FFkey"
        );
    }

    #[test]
    fn test_already_canonical_unchanged() {
        assert_eq!(
            normalize_object_locator("s3://other-bucket/key.pdf", BUCKET),
            "s3://other-bucket/key.pdf"
        );
    }

    #[test]
    fn test_bucket_prefixed_key() {
        assert_eq!(
            normalize_object_locator("medcode-dev/uploads/1-report.pdf", BUCKET),
            "s3://medcode-dev/uploads/1-report.pdf"
        );
    }

    #[test]
    fn test_idempotent_once_canonical() {
        let once = normalize_object_locator("/uploads/scan%20a.png", BUCKET);
        assert_eq!(normalize_object_locator(&once, BUCKET), once);
    }
}
