//! Sync url templates.
//!
//! Templates are composed once at startup: host-level macros (`{{.ExternalURL}}`,
//! `{{.SyncerKey}}`, `{{.SyncType}}`, `{{.UserMacro}}`, `{{.RedirectURL}}`) are
//! replaced with literal values, leaving only the privacy macros to be filled in
//! per request.

use crate::config::{SyncerEndpoint, UserSyncConfig};
use crate::privacy::PrivacyMacros;
use std::fmt;
use url::Url;
use url::form_urlencoded::byte_serialize;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template: {template}: unclosed action at offset {offset}")]
    Unclosed { template: String, offset: usize },
    #[error("template: {template}: malformed action \"{action}\"")]
    Malformed { template: String, action: String },
    #[error("template: {template}: can't evaluate field {field}")]
    UnknownField { template: String, field: String },
    #[error("composed url \"{0}\" is invalid")]
    InvalidUrl(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Gdpr,
    GdprConsent,
    UsPrivacy,
    Gpp,
    GppSid,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "GDPR" => Some(Field::Gdpr),
            "GDPRConsent" => Some(Field::GdprConsent),
            "USPrivacy" => Some(Field::UsPrivacy),
            "GPP" => Some(Field::Gpp),
            "GPPSID" => Some(Field::GppSid),
            _ => None,
        }
    }

    fn value<'a>(&self, macros: &'a PrivacyMacros) -> &'a str {
        match self {
            Field::Gdpr => &macros.gdpr,
            Field::GdprConsent => &macros.gdpr_consent,
            Field::UsPrivacy => &macros.us_privacy,
            Field::Gpp => &macros.gpp,
            Field::GppSid => &macros.gpp_sid,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
}

/// A `{{ ... }}` action found in template text.
struct Action<'a> {
    start: usize,
    end: usize,
    inner: &'a str,
}

/// Finds the next `{{ ... }}` at or after `from`. `Err` holds the offset of an unclosed `{{`.
fn next_action(text: &str, from: usize) -> Result<Option<Action<'_>>, usize> {
    let Some(open) = text[from..].find("{{") else {
        return Ok(None);
    };
    let start = from + open;
    let Some(close) = text[start + 2..].find("}}") else {
        return Err(start);
    };
    let close = start + 2 + close;
    Ok(Some(Action {
        start,
        end: close + 2,
        inner: text[start + 2..close].trim(),
    }))
}

fn query_escape(text: &str) -> String {
    byte_serialize(text.as_bytes()).collect()
}

/// Query-escapes everything except `{{.Field}}` placeholders.
pub fn escape_template(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Ok(Some(action)) = next_action(text, pos) {
        if !action.inner.starts_with('.') {
            out.push_str(&query_escape(&text[pos..action.start + 2]));
            pos = action.start + 2;
            continue;
        }
        out.push_str(&query_escape(&text[pos..action.start]));
        out.push_str(&text[action.start..action.end]);
        pos = action.end;
    }
    out.push_str(&query_escape(&text[pos..]));
    out
}

/// Replaces every `{{.name}}` (surrounding whitespace allowed) with `value`, taken literally.
pub fn replace_macro(text: &str, name: &str, value: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Ok(Some(action)) = next_action(text, pos) {
        out.push_str(&text[pos..action.start]);
        match action.inner.strip_prefix('.') {
            Some(field) if field == name => out.push_str(value),
            _ => out.push_str(&text[action.start..action.end]),
        }
        pos = action.end;
    }
    out.push_str(&text[pos..]);
    out
}

/// A parsed sync url with privacy placeholders left to fill in.
#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template").field("name", &self.name).finish()
    }
}

impl Template {
    pub fn parse(name: &str, text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut pos = 0;
        loop {
            let action = match next_action(text, pos) {
                Ok(Some(action)) => action,
                Ok(None) => break,
                Err(offset) => {
                    return Err(TemplateError::Unclosed {
                        template: name.to_string(),
                        offset,
                    });
                }
            };
            if action.start > pos {
                segments.push(Segment::Text(text[pos..action.start].to_string()));
            }
            let Some(field_name) = action.inner.strip_prefix('.') else {
                return Err(TemplateError::Malformed {
                    template: name.to_string(),
                    action: action.inner.to_string(),
                });
            };
            let Some(field) = Field::from_name(field_name) else {
                return Err(TemplateError::UnknownField {
                    template: name.to_string(),
                    field: field_name.to_string(),
                });
            };
            segments.push(Segment::Field(field));
            pos = action.end;
        }
        if pos < text.len() {
            segments.push(Segment::Text(text[pos..].to_string()));
        }
        Ok(Template {
            name: name.to_string(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, macros: &PrivacyMacros) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(field.value(macros)),
            }
        }
        out
    }

    /// Renders with stand-in privacy values and checks the result is an absolute url.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let rendered = self.render(&PrivacyMacros::placeholders());
        match Url::parse(&rendered) {
            Ok(url) if !url.cannot_be_a_base() => Ok(()),
            _ => Err(TemplateError::InvalidUrl(rendered)),
        }
    }
}

/// External url sources, most specific first.
pub struct ExternalUrls<'a> {
    pub syncer: &'a str,
    pub user_sync: &'a str,
    pub host: &'a str,
}

fn choose_external_url<'a>(endpoint: &'a SyncerEndpoint, urls: &ExternalUrls<'a>) -> &'a str {
    [
        endpoint.external_url.as_str(),
        urls.syncer,
        urls.user_sync,
        urls.host,
    ]
    .into_iter()
    .find(|url| !url.is_empty())
    .unwrap_or_default()
}

/// Builds the per-request template for one endpoint of a syncer.
pub fn compose_template(
    key: &str,
    sync_type_value: &str,
    user_sync: &UserSyncConfig,
    external_urls: &ExternalUrls<'_>,
    endpoint: &SyncerEndpoint,
) -> Result<Template, TemplateError> {
    let redirect_template = if endpoint.redirect_url.is_empty() {
        user_sync.redirect_url.as_str()
    } else {
        endpoint.redirect_url.as_str()
    };

    let external_url = choose_external_url(endpoint, external_urls);
    let mut redirect_url = replace_macro(redirect_template, "SyncerKey", key);
    redirect_url = replace_macro(&redirect_url, "BidderName", key);
    redirect_url = replace_macro(&redirect_url, "SyncType", sync_type_value);
    redirect_url = replace_macro(&redirect_url, "UserMacro", &endpoint.user_macro);
    redirect_url = replace_macro(&redirect_url, "ExternalURL", external_url);
    let redirect_url = escape_template(&redirect_url);

    let url = replace_macro(&endpoint.url, "RedirectURL", &redirect_url);

    let name = format!("{}_usersync_url", key.to_lowercase());
    Template::parse(&name, &url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn macros() -> PrivacyMacros {
        PrivacyMacros {
            gdpr: "A".into(),
            gdpr_consent: "B".into(),
            us_privacy: "C".into(),
            gpp: "D".into(),
            gpp_sid: "E".into(),
        }
    }

    const NO_EXTERNAL_URLS: ExternalUrls<'static> = ExternalUrls {
        syncer: "",
        user_sync: "",
        host: "",
    };

    #[test]
    fn test_escape_template() {
        assert_eq!(escape_template("{{.Macro}}"), "{{.Macro}}");
        assert_eq!(escape_template("/a"), "%2Fa");
        assert_eq!(escape_template("&a{{.Macro1}}"), "%26a{{.Macro1}}");
        assert_eq!(
            escape_template("{{.Macro1}}&a{{.Macro2}}"),
            "{{.Macro1}}%26a{{.Macro2}}"
        );
        assert_eq!(escape_template("{{.Macro1}}&a"), "{{.Macro1}}%26a");
        assert_eq!(
            escape_template("&a{{.Macro1}}/b{{.Macro2}}&c"),
            "%26a{{.Macro1}}%2Fb{{.Macro2}}%26c"
        );
        assert_eq!(escape_template("{{.Macro&}}"), "{{.Macro&}}");
    }

    #[test]
    fn test_replace_macro_tolerates_whitespace() {
        assert_eq!(
            replace_macro("a={{ .SyncerKey }}&b={{.SyncerKey}}&c={{.GDPR}}", "SyncerKey", "k"),
            "a=k&b=k&c={{.GDPR}}"
        );
        // values are inserted literally
        assert_eq!(replace_macro("{{.UserMacro}}", "UserMacro", "$UID$"), "$UID$");
    }

    #[test]
    fn test_parse_and_render() {
        let template = Template::parse(
            "test",
            "https://a.com/?gdpr={{.GDPR}}&c={{ .GDPRConsent }}&us={{.USPrivacy}}&gpp={{.GPP}}&sid={{.GPPSID}}",
        )
        .unwrap();
        assert_eq!(
            template.render(&macros()),
            "https://a.com/?gdpr=A&c=B&us=C&gpp=D&sid=E"
        );
        assert_eq!(template.name(), "test");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Template::parse("test", "invalid:{{.DoesNotExist}}").unwrap_err(),
            TemplateError::UnknownField {
                template: "test".into(),
                field: "DoesNotExist".into()
            }
        );
        assert_eq!(
            Template::parse("test", "a{{.GDPR").unwrap_err(),
            TemplateError::Unclosed {
                template: "test".into(),
                offset: 1
            }
        );
        assert!(matches!(
            Template::parse("test", "{{GDPR}}"),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let not_a_url = Template::parse(
            "test",
            "not-a-url,gdpr:{{.GDPR}},gdprconsent:{{.GDPRConsent}},ccpa:{{.USPrivacy}}",
        )
        .unwrap();
        assert_eq!(
            not_a_url.validate().unwrap_err().to_string(),
            "composed url \"not-a-url,gdpr:anyGDPR,gdprconsent:anyGDPRConsent,ccpa:anyCCPAConsent\" is invalid"
        );

        let valid = Template::parse(
            "test",
            "http://server.com/sync?gdpr={{.GDPR}}&gdprconsent={{.GDPRConsent}}&ccpa={{.USPrivacy}}",
        )
        .unwrap();
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn test_compose_without_redirect_macro() {
        let user_sync = UserSyncConfig {
            external_url: "externalURL".into(),
            redirect_url: "redirectURL".into(),
            ..Default::default()
        };
        let endpoint = SyncerEndpoint {
            url: "hasNoMacros,gdpr={{.GDPR}}".into(),
            ..Default::default()
        };
        let template =
            compose_template("anyKey", "x", &user_sync, &NO_EXTERNAL_URLS, &endpoint).unwrap();
        assert_eq!(template.render(&macros()), "hasNoMacros,gdpr=A");
        assert_eq!(template.name(), "anykey_usersync_url");
    }

    #[test]
    fn test_compose_all_macros() {
        let user_sync = UserSyncConfig {
            external_url: "externalURL".into(),
            redirect_url: "redirectURL".into(),
            ..Default::default()
        };
        let endpoint = SyncerEndpoint {
            url: "https://bidder.com/sync?redirect={{.RedirectURL}}".into(),
            redirect_url:
                "{{.ExternalURL}}/setuid?bidder={{.SyncerKey}}&f={{.SyncType}}&gdpr={{.GDPR}}&uid={{.UserMacro}}"
                    .into(),
            external_url: "http://host.com".into(),
            user_macro: "$UID$".into(),
        };
        let template =
            compose_template("anyKey", "x", &user_sync, &NO_EXTERNAL_URLS, &endpoint).unwrap();
        assert_eq!(
            template.render(&macros()),
            "https://bidder.com/sync?redirect=http%3A%2F%2Fhost.com%2Fsetuid%3Fbidder%3DanyKey%26f%3Dx%26gdpr%3DA%26uid%3D%24UID%24"
        );
    }

    #[test]
    fn test_external_url_precedence() {
        let user_sync = UserSyncConfig {
            redirect_url: "{{.ExternalURL}}".into(),
            ..Default::default()
        };
        let mut endpoint = SyncerEndpoint {
            url: "{{.RedirectURL}}".into(),
            ..Default::default()
        };
        let urls = ExternalUrls {
            syncer: "syncer",
            user_sync: "usersync",
            host: "host",
        };

        let render = |endpoint: &SyncerEndpoint, urls: &ExternalUrls<'_>| {
            compose_template("k", "b", &user_sync, urls, endpoint)
                .unwrap()
                .render(&PrivacyMacros::default())
        };

        assert_eq!(render(&endpoint, &urls), "syncer");
        assert_eq!(
            render(&endpoint, &ExternalUrls { syncer: "", ..urls }),
            "usersync"
        );
        assert_eq!(
            render(
                &endpoint,
                &ExternalUrls {
                    syncer: "",
                    user_sync: "",
                    host: "host"
                }
            ),
            "host"
        );
        endpoint.external_url = "endpoint".into();
        assert_eq!(render(&endpoint, &urls), "endpoint");
    }
}
