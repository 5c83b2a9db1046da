//! Session `Set-Cookie` value construction.
//!
//! Attributes are always emitted lowercase and in the order expires, max-age, domain, path,
//! secure, httponly.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use time::{
    Duration, OffsetDateTime, UtcOffset, error::Format, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::store::CookieParams;

/// Expiry date used to make caches treat a response as already stale.
pub const PAST_EXPIRES: &str = "Thu, 19 Nov 1981 08:52:00 GMT";

const URLENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Form-style url encoding: alphanumerics and `-_.` pass through, space becomes `+`.
pub fn urlencode(value: &str) -> String {
    // A literal "%20" in the input is encoded as "%2520", so this only rewrites spaces.
    utf8_percent_encode(value, URLENCODE)
        .to_string()
        .replace("%20", "+")
}

/// Formats `at` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: OffsetDateTime) -> Result<String, Format> {
    at.to_offset(UtcOffset::UTC).format(HTTP_DATE)
}

/// Builds the session `Set-Cookie` value, emitting only attributes whose source value is set.
pub fn session_cookie(
    name: &str,
    id: &str,
    params: &CookieParams,
    now: OffsetDateTime,
) -> Result<String, Format> {
    let mut cookie = format!("{}={}", urlencode(name), urlencode(id));

    if params.lifetime > 0 {
        let expires = http_date(now + Duration::seconds(i64::from(params.lifetime)))?;
        cookie.push_str(&format!("; expires={expires}; max-age={}", params.lifetime));
    }

    if !params.domain.is_empty() {
        cookie.push_str(&format!("; domain={}", params.domain));
    }

    if !params.path.is_empty() {
        cookie.push_str(&format!("; path={}", params.path));
    }

    if params.secure {
        cookie.push_str("; secure");
    }

    if params.http_only {
        cookie.push_str("; httponly");
    }

    Ok(cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).expect("timestamp in range")
    }

    fn date(unix: i64) -> String {
        http_date(at(unix)).expect("date formats")
    }

    #[test]
    fn http_date_formats_imf_fixdate() {
        assert_eq!(date(784_111_777), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(date(1_000_000), "Mon, 12 Jan 1970 13:46:40 GMT");
        assert_eq!(date(0), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn http_date_normalizes_offset() {
        let shifted = at(784_111_777).to_offset(UtcOffset::from_hms(5, 30, 0).expect("offset"));
        assert_eq!(
            http_date(shifted).expect("date formats"),
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
    }

    #[test]
    fn past_expires_is_an_http_date() {
        assert_eq!(date(375_007_920), PAST_EXPIRES);
    }

    #[test]
    fn urlencode_matches_form_encoding() {
        assert_eq!(urlencode("abc-_.XYZ09"), "abc-_.XYZ09");
        assert_eq!(urlencode("a b"), "a+b");
        assert_eq!(urlencode("a+b=c;d"), "a%2Bb%3Dc%3Bd");
        assert_eq!(urlencode("~*"), "%7E%2A");
        assert_eq!(urlencode("%20"), "%2520");
        assert_eq!(urlencode("é"), "%C3%A9");
    }

    #[test]
    fn bare_cookie_has_no_attributes() {
        let cookie = session_cookie("SESSID", "abc123", &CookieParams::default(), at(1_000_000))
            .expect("cookie builds");
        assert_eq!(cookie, "SESSID=abc123");
    }

    #[test]
    fn all_attributes_in_order() {
        let params = CookieParams {
            lifetime: 3600,
            path: "/app".into(),
            domain: "example.com".into(),
            secure: true,
            http_only: true,
        };
        let cookie =
            session_cookie("SESSID", "xyz", &params, at(1_000_000)).expect("cookie builds");
        assert_eq!(
            cookie,
            "SESSID=xyz; expires=Mon, 12 Jan 1970 14:46:40 GMT; max-age=3600; \
             domain=example.com; path=/app; secure; httponly"
        );
    }

    #[test]
    fn only_truthy_attributes_are_emitted() {
        let params = CookieParams {
            path: "/".into(),
            http_only: true,
            ..CookieParams::default()
        };
        let cookie =
            session_cookie("my sid", "a/b", &params, at(1_000_000)).expect("cookie builds");
        assert_eq!(cookie, "my+sid=a%2Fb; path=/; httponly");
    }
}
