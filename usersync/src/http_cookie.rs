//! Reading and writing the uid cookie on HTTP headers.

use crate::codec::Decoder;
use crate::config::HostCookie;
use crate::cookie::{Cookie, UID_COOKIE_NAME};
use chrono::Utc;
use http::header::{COOKIE, InvalidHeaderValue, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

const MIN_SAME_SITE_CHROME_VERSION: u32 = 67;
const SAME_SITE_COOKIE_NAME: &str = "SSCookie";
const SAME_SITE_ATTRIBUTES: &str = "; Secure; SameSite=None";

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn request_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// Builds the request's cookie: opted out if the host's opt-out cookie is set, otherwise
/// decoded from the uid cookie, with the host's own id merged in.
pub fn read_cookie(headers: &HeaderMap, decoder: &dyn Decoder, host: &HostCookie) -> Cookie {
    if let Some(optout) = &host.optout_cookie
        && !optout.name.is_empty()
        && request_cookie(headers, &optout.name) == Some(optout.value.as_str())
    {
        return Cookie::opted_out();
    }

    let mut cookie = request_cookie(headers, UID_COOKIE_NAME)
        .map(|encoded| decoder.decode(encoded))
        .unwrap_or_default();
    sync_host_cookie(headers, &mut cookie, host);
    cookie
}

/// Copies the host's own id cookie into the uid cookie under the host family.
pub fn sync_host_cookie(headers: &HeaderMap, cookie: &mut Cookie, host: &HostCookie) {
    if host.cookie_name.is_empty() || host.family.is_empty() {
        return;
    }
    let Some(host_uid) = request_cookie(headers, &host.cookie_name) else {
        return;
    };
    if cookie.get_uid(&host.family).map(|(uid, _)| uid) != Some(host_uid)
        && let Err(e) = cookie.sync(&host.family, host_uid)
    {
        tracing::debug!(family = %host.family, error = %e, "host cookie not synced");
    }
}

/// Appends the `Set-Cookie` header persisting `encoded`. Browsers that accept
/// `SameSite=None` also get the `SSCookie=1` marker cookie.
pub fn write_cookie(
    headers: &mut HeaderMap,
    encoded: &str,
    host: &HostCookie,
    set_site_cookie: bool,
) -> Result<(), InvalidHeaderValue> {
    let expires = (Utc::now() + host.ttl()).format("%a, %d %b %Y %H:%M:%S GMT");
    let mut value = format!("{UID_COOKIE_NAME}={encoded}; Path=/");
    if !host.domain.is_empty() {
        value.push_str(&format!("; Domain={}", host.domain));
    }
    value.push_str(&format!("; Expires={expires}"));
    if set_site_cookie {
        value.push_str(SAME_SITE_ATTRIBUTES);
    }
    headers.append(SET_COOKIE, HeaderValue::from_str(&value)?);

    if set_site_cookie {
        let marker =
            format!("{SAME_SITE_COOKIE_NAME}=1; Path=/; Expires={expires}{SAME_SITE_ATTRIBUTES}");
        headers.append(SET_COOKIE, HeaderValue::from_str(&marker)?);
    }
    Ok(())
}

fn browser_major_version(user_agent: &str, browser: &str) -> Option<u32> {
    let start = user_agent.find(browser)? + browser.len();
    let digits: String = user_agent[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// True for browsers that accept `SameSite=None` cookies.
pub fn site_cookie_check(user_agent: &str) -> bool {
    ["Chrome/", "CriOS/"].iter().any(|browser| {
        browser_major_version(user_agent, browser)
            .is_some_and(|version| version >= MIN_SAME_SITE_CHROME_VERSION)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Base64Decoder, Base64Encoder, Encoder};
    use crate::config::OptOutCookie;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    fn host() -> HostCookie {
        HostCookie {
            domain: "example.com".into(),
            family: "host".into(),
            cookie_name: "hostid".into(),
            optout_cookie: Some(OptOutCookie {
                name: "optout".into(),
                value: "true".into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_cookie() {
        let headers = headers("a=1; uids=abc==; c=\"quoted\"");
        assert_eq!(request_cookie(&headers, "a"), Some("1"));
        assert_eq!(request_cookie(&headers, "uids"), Some("abc=="));
        assert_eq!(request_cookie(&headers, "c"), Some("quoted"));
        assert_eq!(request_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie() {
        let mut cookie = Cookie::new();
        cookie.sync("adnxs", "123").unwrap();
        let encoded = Base64Encoder.encode(&cookie).unwrap();

        let read = read_cookie(
            &headers(&format!("uids={encoded}; hostid=h1")),
            &Base64Decoder::default(),
            &host(),
        );
        assert_eq!(read.get_uid("adnxs"), Some(("123", true)));
        assert_eq!(read.get_uid("host"), Some(("h1", true)));

        let read = read_cookie(&HeaderMap::new(), &Base64Decoder::default(), &host());
        assert_eq!(read, Cookie::new());
    }

    #[test]
    fn test_read_cookie_opted_out() {
        let read = read_cookie(
            &headers("optout=true; hostid=h1"),
            &Base64Decoder::default(),
            &host(),
        );
        assert!(!read.allow_syncs());
        assert!(read.entries().is_empty());

        let read = read_cookie(
            &headers("optout=false"),
            &Base64Decoder::default(),
            &host(),
        );
        assert!(read.allow_syncs());
    }

    #[test]
    fn test_write_cookie() {
        let mut headers = HeaderMap::new();
        write_cookie(&mut headers, "abc", &host(), true).unwrap();
        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values[0].starts_with("uids=abc; Path=/; Domain=example.com; Expires="));
        assert!(values[0].ends_with(" GMT; Secure; SameSite=None"));
        assert!(values[1].starts_with("SSCookie=1; Path=/; Expires="));
        assert!(values[1].ends_with(" GMT; Secure; SameSite=None"));

        let mut headers = HeaderMap::new();
        write_cookie(&mut headers, "abc", &HostCookie::default(), false).unwrap();
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 1);
        let value = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(value.starts_with("uids=abc; Path=/; Expires="));
        assert!(value.ends_with(" GMT"));
    }

    #[test]
    fn test_site_cookie_check() {
        assert!(site_cookie_check(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        ));
        assert!(site_cookie_check(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 12_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/69.0.3497.105 Mobile/15E148 Safari/605.1"
        ));
        assert!(!site_cookie_check(
            "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/66.0.3359.117 Safari/537.36"
        ));
        assert!(!site_cookie_check(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14) Gecko/20100101 Firefox/63.0"
        ));
    }
}
